//! # deskhand core
//!
//! Domain types, traits and error definitions shared by every deskhand crate.
//! Nothing in here talks to the network or the filesystem; the other crates
//! implement these traits and depend inward on this one.
//!
//! The pieces that matter most:
//! - [`RuntimeContext`]: who triggered the current unit of work, passed
//!   explicitly down to every tool invocation
//! - [`ToolRegistry`]: name → tool lookup plus argument validation
//! - [`Provider`]: the opaque model capability
//! - [`JobScheduler`]: the scheduling contract used by the schedule skills

pub mod context;
pub mod error;
pub mod event;
pub mod memory;
pub mod message;
pub mod provider;
pub mod schedule;
pub mod tool;

pub use context::{EntityType, RuntimeContext};
pub use error::{Error, Result};
pub use event::{DomainEvent, EventBus};
pub use memory::{MemoryBackend, MemoryEntry, MemoryQuery};
pub use message::{Conversation, Message, MessageToolCall, Role};
pub use provider::{Provider, ProviderRequest, ProviderResponse, ToolDefinition, Usage};
pub use schedule::{JobScheduler, ScheduleRequest, ScheduledJob, Trigger};
pub use tool::{Tool, ToolCall, ToolRegistry, ToolResult};
