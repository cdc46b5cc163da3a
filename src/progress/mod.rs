//! Playback position persistence: server checkpoints plus a local fallback cache.

pub mod checkpoint;
pub mod store;

pub use checkpoint::{duration_to_seconds, CheckpointClient, CheckpointRequest};
pub use store::{LocalStore, StoreError, WatchProgress};
