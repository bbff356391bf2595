//! Configuration loading and validation for deskhand.
//!
//! Loads `~/.deskhand/config.toml` with environment variable overrides and
//! validates everything at startup. The resulting [`AppConfig`] is an
//! immutable value: components copy what they need out of it once, and
//! per-run model settings are snapshotted by the model gateway.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure. Maps directly to `config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key for the model provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// System prompt prepended to every run
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    #[serde(default)]
    pub provider: ProviderConfig,

    #[serde(default)]
    pub models: ModelsConfig,

    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub gateway: GatewayConfig,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub memory: MemoryConfig,

    #[serde(default)]
    pub workspace: WorkspaceConfig,

    /// Recurring jobs declared in the config file, registered at startup
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub schedules: Vec<ScheduleEntryConfig>,
}

fn default_system_prompt() -> String {
    "You are deskhand, a personal assistant. Think step by step. \
     Use the available tools when they help, and answer plainly when you are done."
        .into()
}

fn default_true() -> bool {
    true
}

fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("provider", &self.provider)
            .field("models", &self.models)
            .field("engine", &self.engine)
            .field("gateway", &self.gateway)
            .field("scheduler", &self.scheduler)
            .field("memory", &self.memory)
            .field("workspace", &self.workspace)
            .field("schedules", &self.schedules)
            .finish()
    }
}

// ── Provider ──

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_provider_name")]
    pub name: String,

    /// OpenAI-compatible base URL
    #[serde(default = "default_api_url")]
    pub api_url: String,
}

fn default_provider_name() -> String {
    "openrouter".into()
}
fn default_api_url() -> String {
    "https://openrouter.ai/api/v1".into()
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            name: default_provider_name(),
            api_url: default_api_url(),
        }
    }
}

// ── Model routing ──

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsConfig {
    /// Model used for interactive reasoning
    #[serde(default = "default_primary_model")]
    pub primary: String,

    /// Cheaper model for background work (scheduler, single-turn jobs)
    #[serde(default = "default_fast_model")]
    pub fast: String,

    /// Substitute used under rate-limit pressure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emergency: Option<String>,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Per-model-call timeout enforced by the gateway
    #[serde(default = "default_call_timeout")]
    pub call_timeout_secs: u64,

    #[serde(default)]
    pub emergency_mode: EmergencyModeConfig,
}

fn default_primary_model() -> String {
    "openai/gpt-4o".into()
}
fn default_fast_model() -> String {
    "openai/gpt-4o-mini".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    4096
}
fn default_call_timeout() -> u64 {
    120
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            primary: default_primary_model(),
            fast: default_fast_model(),
            emergency: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            call_timeout_secs: default_call_timeout(),
            emergency_mode: EmergencyModeConfig::default(),
        }
    }
}

/// Degraded mode: after enough rate-limit hits in a window, every call is
/// routed to the emergency model until the cooldown expires.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmergencyModeConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_rate_limit_threshold")]
    pub rate_limit_threshold: u32,

    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
}

fn default_rate_limit_threshold() -> u32 {
    3
}
fn default_window_secs() -> u64 {
    60
}
fn default_cooldown_secs() -> u64 {
    300
}

impl Default for EmergencyModeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            rate_limit_threshold: default_rate_limit_threshold(),
            window_secs: default_window_secs(),
            cooldown_secs: default_cooldown_secs(),
        }
    }
}

// ── Engine ──

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: f64,
}

fn default_max_iterations() -> u32 {
    10
}
fn default_timeout_seconds() -> f64 {
    300.0
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

// ── Gateway ──

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,

    /// Sessions whose chat history is kept in memory
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,

    /// Messages retained per session
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

fn default_port() -> u16 {
    8787
}
fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_max_sessions() -> usize {
    256
}
fn default_history_limit() -> usize {
    40
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            max_sessions: default_max_sessions(),
            history_limit: default_history_limit(),
        }
    }
}

// ── Scheduler ──

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// JSONL file holding durable jobs; in-memory only when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jobs_path: Option<PathBuf>,

    #[serde(default = "default_max_log_records")]
    pub max_log_records: usize,

    #[serde(default = "default_job_max_iterations")]
    pub default_max_iterations: u32,

    #[serde(default = "default_timeout_seconds")]
    pub default_timeout_seconds: f64,
}

fn default_poll_interval() -> u64 {
    5
}
fn default_max_log_records() -> usize {
    500
}
fn default_job_max_iterations() -> u32 {
    5
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_secs: default_poll_interval(),
            jobs_path: None,
            max_log_records: default_max_log_records(),
            default_max_iterations: default_job_max_iterations(),
            default_timeout_seconds: default_timeout_seconds(),
        }
    }
}

/// A recurring job declared in `config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleEntryConfig {
    pub name: String,
    pub prompt: String,

    /// 5-field cron expression (mutually exclusive with `interval_secs`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cron: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval_secs: Option<u64>,

    #[serde(default = "default_true")]
    pub use_react_loop: bool,
}

// ── Memory ──

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// "in_memory" or "file"
    #[serde(default = "default_memory_backend")]
    pub backend: String,

    /// JSONL path for the file backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    /// Maximum facts returned by a recall
    #[serde(default = "default_recall_limit")]
    pub recall_limit: usize,
}

fn default_memory_backend() -> String {
    "file".into()
}
fn default_recall_limit() -> usize {
    5
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            backend: default_memory_backend(),
            path: None,
            recall_limit: default_recall_limit(),
        }
    }
}

// ── Workspace ──

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    /// Root for file skills; defaults to `~/.deskhand/workspace`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,

    #[serde(default = "default_forbidden_paths")]
    pub forbidden_paths: Vec<String>,

    #[serde(default = "default_code_timeout")]
    pub code_timeout_secs: u64,

    #[serde(default = "default_python_bin")]
    pub python_bin: String,
}

fn default_forbidden_paths() -> Vec<String> {
    vec![
        "/etc".into(),
        "/root".into(),
        "~/.ssh".into(),
        "~/.deskhand/config.toml".into(),
    ]
}
fn default_code_timeout() -> u64 {
    30
}
fn default_python_bin() -> String {
    "python3".into()
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            root: None,
            forbidden_paths: default_forbidden_paths(),
            code_timeout_secs: default_code_timeout(),
            python_bin: default_python_bin(),
        }
    }
}

impl AppConfig {
    /// Load configuration from `~/.deskhand/config.toml`.
    ///
    /// Environment overrides:
    /// - `DESKHAND_API_KEY`, then `OPENROUTER_API_KEY`, then `OPENAI_API_KEY`
    /// - `DESKHAND_PROVIDER_URL`
    /// - `DESKHAND_MODEL` (primary model)
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Fill the API key, provider URL and primary model from the environment.
    pub fn apply_env_overrides(&mut self) {
        if self.api_key.is_none() {
            self.api_key = std::env::var("DESKHAND_API_KEY")
                .ok()
                .or_else(|| std::env::var("OPENROUTER_API_KEY").ok())
                .or_else(|| std::env::var("OPENAI_API_KEY").ok());
        }
        if let Ok(url) = std::env::var("DESKHAND_PROVIDER_URL") {
            self.provider.api_url = url;
        }
        if let Ok(model) = std::env::var("DESKHAND_MODEL") {
            self.models.primary = model;
        }
    }

    pub fn config_dir() -> PathBuf {
        dirs_home().join(".deskhand")
    }

    /// Effective workspace root for file and code skills.
    pub fn workspace_root(&self) -> PathBuf {
        self.workspace
            .root
            .clone()
            .unwrap_or_else(|| Self::config_dir().join("workspace"))
    }

    /// Effective path of the JSONL fact store.
    pub fn memory_path(&self) -> PathBuf {
        self.memory
            .path
            .clone()
            .unwrap_or_else(|| Self::config_dir().join("memory.jsonl"))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let models = &self.models;
        if !(0.0..=2.0).contains(&models.temperature) {
            return Err(ConfigError::ValidationError(
                "models.temperature must be between 0.0 and 2.0".into(),
            ));
        }
        if models.call_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "models.call_timeout_secs must be > 0".into(),
            ));
        }
        if models.emergency_mode.enabled {
            if models.emergency.is_none() {
                return Err(ConfigError::ValidationError(
                    "models.emergency_mode is enabled but models.emergency is not set".into(),
                ));
            }
            if models.emergency_mode.rate_limit_threshold == 0 {
                return Err(ConfigError::ValidationError(
                    "models.emergency_mode.rate_limit_threshold must be >= 1".into(),
                ));
            }
        }

        check_budget("engine", self.engine.max_iterations, self.engine.timeout_seconds)?;
        check_budget(
            "scheduler",
            self.scheduler.default_max_iterations,
            self.scheduler.default_timeout_seconds,
        )?;

        if self.scheduler.poll_interval_secs == 0 {
            return Err(ConfigError::ValidationError(
                "scheduler.poll_interval_secs must be > 0".into(),
            ));
        }

        if !matches!(self.memory.backend.as_str(), "in_memory" | "file") {
            return Err(ConfigError::ValidationError(format!(
                "memory.backend must be \"in_memory\" or \"file\", got \"{}\"",
                self.memory.backend
            )));
        }

        for entry in &self.schedules {
            match (&entry.cron, entry.interval_secs) {
                (Some(_), None) | (None, Some(_)) => {}
                _ => {
                    return Err(ConfigError::ValidationError(format!(
                        "schedule '{}' needs exactly one of cron or interval_secs",
                        entry.name
                    )));
                }
            }
            if entry.interval_secs == Some(0) {
                return Err(ConfigError::ValidationError(format!(
                    "schedule '{}' has a zero interval",
                    entry.name
                )));
            }
        }

        Ok(())
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Generate a default config TOML string (for `init`).
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

fn check_budget(section: &str, max_iterations: u32, timeout_seconds: f64) -> Result<(), ConfigError> {
    if max_iterations == 0 {
        return Err(ConfigError::ValidationError(format!(
            "{section}: max_iterations must be >= 1"
        )));
    }
    if !timeout_seconds.is_finite() || timeout_seconds <= 0.0 {
        return Err(ConfigError::ValidationError(format!(
            "{section}: timeout_seconds must be > 0"
        )));
    }
    Ok(())
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            system_prompt: default_system_prompt(),
            provider: ProviderConfig::default(),
            models: ModelsConfig::default(),
            engine: EngineConfig::default(),
            gateway: GatewayConfig::default(),
            scheduler: SchedulerConfig::default(),
            memory: MemoryConfig::default(),
            workspace: WorkspaceConfig::default(),
            schedules: Vec::new(),
        }
    }
}

fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
