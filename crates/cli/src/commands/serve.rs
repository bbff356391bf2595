//! `deskhand serve` - HTTP gateway plus the scheduler loop.

use deskhand_gateway::ApiState;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::runtime::{Runtime, load_config};

pub async fn run(config_path: Option<&Path>, port_override: Option<u16>) -> anyhow::Result<()> {
    let mut config = load_config(config_path)?;
    if let Some(port) = port_override {
        config.gateway.port = port;
    }

    let runtime = Runtime::build(config)?;
    let config = &runtime.config;
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);

    let mut state = ApiState::new(runtime.engine.clone(), runtime.event_bus.clone())
        .with_sessions(config.gateway.max_sessions, config.gateway.history_limit)
        .with_defaults(config.engine.clone());

    let _scheduler_loop = match &runtime.scheduler {
        Some(scheduler) => {
            let errors = scheduler.load_config_schedules(&config.schedules).await;
            for err in &errors {
                warn!("Schedule load error: {err}");
            }
            info!(
                loaded = config.schedules.len() - errors.len(),
                total = config.schedules.len(),
                "Config schedules loaded"
            );
            state = state.with_scheduler(scheduler.clone());
            Some(scheduler.start(runtime.engine.clone()))
        }
        None => None,
    };

    println!("deskhand gateway");
    println!("   Listening: http://{addr}");
    println!("   Model:     {}", config.models.primary);
    println!(
        "   Scheduler: {}",
        if runtime.scheduler.is_some() { "enabled" } else { "disabled" }
    );

    deskhand_gateway::serve(&addr, Arc::new(state)).await?;
    Ok(())
}
