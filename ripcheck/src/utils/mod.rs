//! Utility modules for ripcheck

pub mod pcm_decoder;

pub use pcm_decoder::{digest_pcm, PcmDigests};
