//! Test Helper Utilities
//!
//! Shared fixtures for ripcheck integration tests

#![allow(dead_code)]

pub mod eac_log;
pub mod flac_builder;
pub mod rip_fixture;
pub mod verify_server;

pub use eac_log::{clean_log, LoggedTrack};
pub use flac_builder::{write_flac, TrackConfig};
pub use rip_fixture::RipFixture;
pub use verify_server::spawn_verify_server;
