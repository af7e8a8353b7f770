//! Storage quota and retention enforcement over the output directory.

mod cleaner;
mod types;

pub use cleaner::StorageCleaner;
pub use types::{
    CleanupError, EvictedFile, EvictionReason, EvictionReport, SkippedFile, StoragePolicy,
};
