//! Data models for ripcheck

pub mod history;
pub mod rip_unit;

pub use history::{HistoryEntry, HistoryRecord};
pub use rip_unit::{QueuedRename, RenameTarget, RipUnit, StateTransition, ValidationState};
