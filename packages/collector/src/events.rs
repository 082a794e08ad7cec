//! Progress events emitted during batch execution.
//!
//! Events flow over a `tokio::sync::broadcast` channel so a UI (or the demo
//! binary) can follow live progress without touching the database.

use serde::{Deserialize, Serialize};

/// Facts about batch/task progress, suitable for live UI updates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CollectorEvent {
    BatchStarted {
        batch_id: String,
        task_count: usize,
    },

    TaskStarted {
        batch_id: String,
        task_id: i64,
        source_name: String,
    },

    /// Free-form progress line, mirrored into the task's progress log.
    TaskProgress {
        batch_id: String,
        task_id: i64,
        message: String,
    },

    TaskCompleted {
        batch_id: String,
        task_id: i64,
        items_found: usize,
    },

    TaskFailed {
        batch_id: String,
        task_id: i64,
        error: String,
    },

    TaskCancelled {
        batch_id: String,
        task_id: i64,
    },

    ReportGenerated {
        batch_id: String,
        title: String,
        item_count: usize,
    },

    BatchFinished {
        batch_id: String,
    },
}

impl CollectorEvent {
    pub fn batch_id(&self) -> &str {
        match self {
            CollectorEvent::BatchStarted { batch_id, .. }
            | CollectorEvent::TaskStarted { batch_id, .. }
            | CollectorEvent::TaskProgress { batch_id, .. }
            | CollectorEvent::TaskCompleted { batch_id, .. }
            | CollectorEvent::TaskFailed { batch_id, .. }
            | CollectorEvent::TaskCancelled { batch_id, .. }
            | CollectorEvent::ReportGenerated { batch_id, .. }
            | CollectorEvent::BatchFinished { batch_id } => batch_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization_tag() {
        let event = CollectorEvent::TaskCompleted {
            batch_id: "abc123".into(),
            task_id: 7,
            items_found: 3,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "task_completed");
        assert_eq!(json["items_found"], 3);
    }
}
