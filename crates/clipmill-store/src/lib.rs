//! Persistence layer for the clipping pipeline.
//!
//! This crate provides:
//! - `VideoStore` / `ClipStore` traits with state-machine enforcement
//! - In-memory implementations used by workers and tests

pub mod error;
pub mod memory;
pub mod stores;

pub use error::{StoreError, StoreResult};
pub use memory::{MemoryClipStore, MemoryVideoStore};
pub use stores::{ClipStore, VideoStore};
