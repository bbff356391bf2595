//! Domain event bus.
//!
//! Process-wide notifications (runs finishing, tools executing, jobs
//! firing) published over a `tokio::sync::broadcast` channel. The HTTP
//! `/v1/logs` feed subscribes to it. Per-run engine events do not go
//! through here; they travel on the run's own channel.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    /// A tool was executed inside some run
    ToolExecuted {
        session_id: String,
        tool_name: String,
        success: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// A ReAct run reached a terminal state
    RunFinished {
        session_id: String,
        entity_type: String,
        termination_reason: String,
        iterations: u32,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// A job was registered with the scheduler
    JobScheduled {
        job_id: String,
        trigger: String,
        timestamp: DateTime<Utc>,
    },

    /// A scheduled job fired and its run finished
    JobFired {
        job_id: String,
        ghost_session_id: String,
        success: bool,
        timestamp: DateTime<Utc>,
    },

    /// An error occurred
    ErrorOccurred {
        context: String,
        error_message: String,
        timestamp: DateTime<Utc>,
    },
}

impl DomainEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::ToolExecuted { .. } => "tool_executed",
            Self::RunFinished { .. } => "run_finished",
            Self::JobScheduled { .. } => "job_scheduled",
            Self::JobFired { .. } => "job_fired",
            Self::ErrorOccurred { .. } => "error_occurred",
        }
    }
}

/// A broadcast-based event bus for domain events.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // No subscribers is fine.
        let _ = self.sender.send(Arc::new(event));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn event_bus_publish_subscribe() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.publish(DomainEvent::JobFired {
            job_id: "j1".into(),
            ghost_session_id: "ghost_scheduler_j1".into(),
            success: true,
            timestamp: Utc::now(),
        });

        let event = rx.recv().await.unwrap();
        match event.as_ref() {
            DomainEvent::JobFired { job_id, success, .. } => {
                assert_eq!(job_id, "j1");
                assert!(success);
            }
            _ => panic!("Expected JobFired event"),
        }
    }

    #[test]
    fn event_bus_no_subscribers_doesnt_panic() {
        let bus = EventBus::new(16);
        bus.publish(DomainEvent::ErrorOccurred {
            context: "test".into(),
            error_message: "no subscribers".into(),
            timestamp: Utc::now(),
        });
    }

    #[test]
    fn serialized_tag_matches_event_type() {
        let event = DomainEvent::ToolExecuted {
            session_id: "s".into(),
            tool_name: "file_read".into(),
            success: false,
            duration_ms: 3,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], event.event_type());
    }
}
