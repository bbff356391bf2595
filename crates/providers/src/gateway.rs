//! The model gateway.
//!
//! Wraps a [`Provider`] with three concerns the engine should not carry:
//!
//! - **Role routing.** A run asks for a [`ModelRole`] once, at its start,
//!   and gets a [`ModelSelection`] snapshot. Later routing changes never
//!   reach a run already in flight.
//! - **Per-call timeout.** Every provider call is bounded by
//!   `call_timeout`; an expiry surfaces as `ProviderError::Timeout`.
//! - **Emergency mode.** Rate-limit hits are counted in a sliding window.
//!   Once the threshold is reached, every call goes to the emergency model
//!   until the cooldown passes. Independently, a rate-limited call is
//!   retried once against the emergency model when one is configured.

use deskhand_config::ModelsConfig;
use deskhand_core::error::ProviderError;
use deskhand_core::message::Message;
use deskhand_core::provider::{Provider, ProviderRequest, ProviderResponse, ToolDefinition};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Which class of model a unit of work wants.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelRole {
    /// Interactive reasoning
    #[default]
    Primary,
    /// Cheaper background work
    Fast,
}

/// The routing table: role → model id plus sampling settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRouting {
    pub primary: String,
    pub fast: String,
    #[serde(default)]
    pub emergency: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl From<&ModelsConfig> for ModelRouting {
    fn from(config: &ModelsConfig) -> Self {
        Self {
            primary: config.primary.clone(),
            fast: config.fast.clone(),
            emergency: config.emergency.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }
}

/// Model settings frozen for the duration of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSelection {
    pub role: ModelRole,
    pub model: String,
    pub emergency_model: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Sliding-window rate-limit pressure tracker.
pub struct EmergencyMode {
    threshold: u32,
    window: Duration,
    cooldown: Duration,
    state: Mutex<PressureState>,
}

#[derive(Default)]
struct PressureState {
    hits: VecDeque<Instant>,
    active_until: Option<Instant>,
}

impl EmergencyMode {
    pub fn new(threshold: u32, window: Duration, cooldown: Duration) -> Self {
        Self {
            threshold: threshold.max(1),
            window,
            cooldown,
            state: Mutex::new(PressureState::default()),
        }
    }

    /// Record one rate-limit hit. Returns true if this hit switched
    /// emergency mode on.
    pub fn record_rate_limit(&self) -> bool {
        let now = Instant::now();
        let Ok(mut state) = self.state.lock() else {
            return false;
        };

        while let Some(front) = state.hits.front() {
            if now.duration_since(*front) > self.window {
                state.hits.pop_front();
            } else {
                break;
            }
        }
        state.hits.push_back(now);

        let already_active = state.active_until.is_some_and(|until| now < until);
        if !already_active && state.hits.len() as u32 >= self.threshold {
            state.active_until = Some(now + self.cooldown);
            state.hits.clear();
            return true;
        }
        false
    }

    pub fn is_active(&self) -> bool {
        let now = Instant::now();
        self.state
            .lock()
            .map(|s| s.active_until.is_some_and(|until| now < until))
            .unwrap_or(false)
    }
}

pub struct ModelGateway {
    provider: Arc<dyn Provider>,
    routing: RwLock<ModelRouting>,
    call_timeout: Duration,
    emergency: Option<EmergencyMode>,
}

impl ModelGateway {
    pub fn new(provider: Arc<dyn Provider>, routing: ModelRouting) -> Self {
        Self {
            provider,
            routing: RwLock::new(routing),
            call_timeout: Duration::from_secs(120),
            emergency: None,
        }
    }

    /// Build from the `[models]` config section.
    pub fn from_config(provider: Arc<dyn Provider>, config: &ModelsConfig) -> Self {
        let mut gateway = Self::new(provider, ModelRouting::from(config))
            .with_call_timeout(Duration::from_secs(config.call_timeout_secs));
        let em = &config.emergency_mode;
        if em.enabled {
            gateway = gateway.with_emergency_mode(EmergencyMode::new(
                em.rate_limit_threshold,
                Duration::from_secs(em.window_secs),
                Duration::from_secs(em.cooldown_secs),
            ));
        }
        gateway
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn with_emergency_mode(mut self, emergency: EmergencyMode) -> Self {
        self.emergency = Some(emergency);
        self
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn call_timeout(&self) -> Duration {
        self.call_timeout
    }

    pub fn emergency_active(&self) -> bool {
        self.emergency.as_ref().is_some_and(|e| e.is_active())
    }

    /// Current routing table.
    pub fn routing(&self) -> ModelRouting {
        match self.routing.read() {
            Ok(r) => r.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Replace the routing table. Runs that already hold a selection keep it.
    pub fn set_routing(&self, routing: ModelRouting) {
        info!(primary = %routing.primary, fast = %routing.fast, "Model routing updated");
        match self.routing.write() {
            Ok(mut r) => *r = routing,
            Err(poisoned) => *poisoned.into_inner() = routing,
        }
    }

    /// Resolve `role` against the current routing table.
    pub fn select(&self, role: ModelRole) -> ModelSelection {
        let routing = self.routing();
        let model = match role {
            ModelRole::Primary => routing.primary,
            ModelRole::Fast => routing.fast,
        };
        ModelSelection {
            role,
            model,
            emergency_model: routing.emergency,
            temperature: routing.temperature,
            max_tokens: routing.max_tokens,
        }
    }

    /// One model call under `selection`.
    pub async fn generate(
        &self,
        selection: &ModelSelection,
        messages: Vec<Message>,
        tools: Vec<ToolDefinition>,
    ) -> Result<ProviderResponse, ProviderError> {
        let model = match (&selection.emergency_model, self.emergency_active()) {
            (Some(emergency), true) => {
                debug!(model = %emergency, "Emergency mode active, substituting model");
                emergency.clone()
            }
            _ => selection.model.clone(),
        };

        let request = ProviderRequest {
            model,
            messages,
            temperature: selection.temperature,
            max_tokens: Some(selection.max_tokens),
            tools,
        };

        match self.call(request.clone()).await {
            Err(e) if e.is_rate_limited() => {
                if let Some(emergency) = &self.emergency {
                    if emergency.record_rate_limit() {
                        warn!(
                            provider = %self.provider.name(),
                            "Rate-limit threshold reached, entering emergency mode"
                        );
                    }
                }
                match &selection.emergency_model {
                    Some(fallback) if *fallback != request.model => {
                        warn!(from = %request.model, to = %fallback, "Rate limited, retrying on emergency model");
                        self.call(ProviderRequest {
                            model: fallback.clone(),
                            ..request
                        })
                        .await
                    }
                    _ => Err(e),
                }
            }
            other => other,
        }
    }

    async fn call(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let model = request.model.clone();
        match tokio::time::timeout(self.call_timeout, self.provider.complete(request)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(model = %model, timeout_secs = self.call_timeout.as_secs(), "Model call timed out");
                Err(ProviderError::Timeout(format!(
                    "model call to {model} exceeded {}s",
                    self.call_timeout.as_secs()
                )))
            }
        }
    }
}
