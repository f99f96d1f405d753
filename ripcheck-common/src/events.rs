//! Event types for progress observers
//!
//! The validation pipeline never reacts to its own events; it only emits them
//! so a front end can track the current directory, the current file and the
//! issues found so far.

use crate::severity::Severity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::broadcast;

/// Pipeline progress events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ValidationEvent {
    /// Validation of a rip directory began
    DirectoryStarted {
        directory: PathBuf,
        timestamp: DateTime<Utc>,
    },

    /// A file is being probed and hashed
    FileStarted {
        path: PathBuf,
        timestamp: DateTime<Utc>,
    },

    /// The pipeline entered a new stage
    StateChanged {
        directory: PathBuf,
        state: String,
        timestamp: DateTime<Utc>,
    },

    /// An issue was recorded against a subject
    IssueAdded {
        subject: String,
        severity: Severity,
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// Validation of a rip directory finished
    DirectoryFinished {
        directory: PathBuf,
        status: Severity,
        trailer: String,
        timestamp: DateTime<Utc>,
    },
}

/// Broadcast channel for [`ValidationEvent`]s
///
/// Emitting never blocks; with no subscribers events are dropped.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ValidationEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus buffering up to `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<ValidationEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: ValidationEvent,
    ) -> Result<usize, broadcast::error::SendError<ValidationEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: ValidationEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
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

    #[test]
    fn test_emit_without_subscribers() {
        let bus = EventBus::new(8);
        assert!(bus
            .emit(ValidationEvent::FileStarted {
                path: PathBuf::from("a.flac"),
                timestamp: Utc::now(),
            })
            .is_err());
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_subscriber_receives_events() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        bus.emit_lossy(ValidationEvent::DirectoryStarted {
            directory: PathBuf::from("/music/rip"),
            timestamp: Utc::now(),
        });

        match rx.try_recv().unwrap() {
            ValidationEvent::DirectoryStarted { directory, .. } => {
                assert_eq!(directory, PathBuf::from("/music/rip"));
            }
            other => panic!("Unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = ValidationEvent::IssueAdded {
            subject: "01 - Intro.flac".to_string(),
            severity: Severity::Warning,
            message: "Track has no title".to_string(),
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "IssueAdded");
        assert_eq!(json["severity"], "WARNING");
    }
}
