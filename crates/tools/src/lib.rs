//! Built-in skills for deskhand.
//!
//! Every skill receives the [`RuntimeContext`](deskhand_core::RuntimeContext)
//! of the run that called it. Two policies hang off that context:
//!
//! - the memory skills never touch the fact store from a scheduler run
//! - the scheduling skills refuse to create or modify jobs from a scheduler
//!   run, so a ghost run cannot schedule more ghost runs

pub mod code_runner;
pub mod file_read;
pub mod file_write;
pub mod memory;
pub mod schedule;

use deskhand_core::memory::MemoryBackend;
use deskhand_core::schedule::JobScheduler;
use deskhand_core::tool::ToolRegistry;
use deskhand_security::WorkspaceSandbox;
use std::sync::Arc;
use std::time::Duration;

pub use code_runner::CodeRunnerTool;
pub use file_read::FileReadTool;
pub use file_write::FileWriteTool;
pub use memory::{MemoryRecallTool, MemorySaveTool, SCHEDULER_MEMORY_NOTICE};
pub use schedule::{
    DeleteScheduledTaskTool, ListScheduledTasksTool, PauseScheduledTaskTool,
    ResumeScheduledTaskTool, ScheduleIntervalTaskTool, ScheduleTaskTool,
};

/// Everything the built-in skills need from the outside world.
pub struct ToolDeps {
    pub memory: Arc<dyn MemoryBackend>,
    pub scheduler: Option<Arc<dyn JobScheduler>>,
    pub sandbox: WorkspaceSandbox,
    pub python_bin: String,
    pub code_timeout: Duration,
    pub recall_limit: usize,
}

/// Create a registry with every built-in skill.
///
/// The scheduling skills are only registered when a scheduler is supplied.
pub fn default_registry(deps: ToolDeps) -> ToolRegistry {
    let mut registry = ToolRegistry::new();

    registry.register(Box::new(MemoryRecallTool::new(
        deps.memory.clone(),
        deps.recall_limit,
    )));
    registry.register(Box::new(MemorySaveTool::new(deps.memory)));
    registry.register(Box::new(FileReadTool::new(deps.sandbox.clone())));
    registry.register(Box::new(FileWriteTool::new(deps.sandbox.clone())));
    registry.register(Box::new(CodeRunnerTool::new(
        deps.sandbox,
        deps.python_bin,
        deps.code_timeout,
    )));

    if let Some(scheduler) = deps.scheduler {
        registry.register(Box::new(ScheduleTaskTool::new(scheduler.clone())));
        registry.register(Box::new(ScheduleIntervalTaskTool::new(scheduler.clone())));
        registry.register(Box::new(ListScheduledTasksTool::new(scheduler.clone())));
        registry.register(Box::new(PauseScheduledTaskTool::new(scheduler.clone())));
        registry.register(Box::new(ResumeScheduledTaskTool::new(scheduler.clone())));
        registry.register(Box::new(DeleteScheduledTaskTool::new(scheduler)));
    }

    tracing::debug!(tools = registry.len(), "Built default tool registry");
    registry
}
