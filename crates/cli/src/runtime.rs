//! Process wiring: config → provider → skills → engine → scheduler.

use anyhow::{Context, anyhow};
use deskhand_agent::ReactEngine;
use deskhand_config::AppConfig;
use deskhand_core::event::EventBus;
use deskhand_core::memory::MemoryBackend;
use deskhand_core::provider::Provider;
use deskhand_core::schedule::JobScheduler;
use deskhand_memory::{FileBackend, InMemoryBackend};
use deskhand_providers::{ModelGateway, OpenAiCompatProvider};
use deskhand_scheduler::SchedulerService;
use deskhand_security::WorkspaceSandbox;
use deskhand_tools::{ToolDeps, default_registry};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Load the config from `path`, or from the default location.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<AppConfig> {
    match path {
        Some(path) => {
            let mut config = AppConfig::load_from(path)?;
            config.apply_env_overrides();
            config.validate()?;
            Ok(config)
        }
        None => Ok(AppConfig::load()?),
    }
}

/// Where the config file lives for this invocation.
pub fn config_file(path: Option<&Path>) -> PathBuf {
    path.map(Path::to_path_buf)
        .unwrap_or_else(|| AppConfig::config_dir().join("config.toml"))
}

/// Everything shared by the commands that execute prompts.
pub struct Runtime {
    pub config: AppConfig,
    pub engine: Arc<ReactEngine>,
    pub scheduler: Option<Arc<SchedulerService>>,
    pub event_bus: Arc<EventBus>,
}

impl Runtime {
    pub fn build(config: AppConfig) -> anyhow::Result<Self> {
        let api_key = config.api_key.clone().ok_or_else(|| {
            anyhow!(
                "No API key configured. Set DESKHAND_API_KEY (or OPENROUTER_API_KEY / \
                 OPENAI_API_KEY), or add api_key to the config file"
            )
        })?;
        let provider: Arc<dyn Provider> = Arc::new(OpenAiCompatProvider::new(
            config.provider.name.clone(),
            config.provider.api_url.clone(),
            api_key,
        ));

        let event_bus = Arc::new(EventBus::default());

        let scheduler = config.scheduler.enabled.then(|| {
            Arc::new(
                SchedulerService::from_config(&config.scheduler).with_event_bus(event_bus.clone()),
            )
        });

        let sandbox = WorkspaceSandbox::new(
            config.workspace_root(),
            config.workspace.forbidden_paths.clone(),
        );
        sandbox.ensure_root().with_context(|| {
            format!("Failed to create workspace {}", sandbox.root().display())
        })?;

        let memory: Arc<dyn MemoryBackend> = match config.memory.backend.as_str() {
            "in_memory" => Arc::new(InMemoryBackend::new()),
            _ => Arc::new(FileBackend::open(config.memory_path())),
        };

        let tools = default_registry(ToolDeps {
            memory,
            scheduler: scheduler
                .clone()
                .map(|s| s as Arc<dyn JobScheduler>),
            sandbox,
            python_bin: config.workspace.python_bin.clone(),
            code_timeout: Duration::from_secs(config.workspace.code_timeout_secs),
            recall_limit: config.memory.recall_limit,
        });

        let gateway = Arc::new(ModelGateway::from_config(provider, &config.models));
        let engine = Arc::new(
            ReactEngine::new(gateway, Arc::new(tools))
                .with_system_prompt(config.system_prompt.clone())
                .with_event_bus(event_bus.clone()),
        );

        info!(
            provider = %config.provider.name,
            model = %config.models.primary,
            tools = engine.tools().len(),
            scheduler = scheduler.is_some(),
            "Runtime ready"
        );

        Ok(Self {
            config,
            engine,
            scheduler,
            event_bus,
        })
    }
}
