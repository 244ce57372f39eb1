//! Key-value stores.
//!
//! A store holds the metadata documents and payloads of a hierarchy.
//! Wrap a store in a [`StoreHierarchy`](super::StoreHierarchy) to use it as hierarchy storage.

mod filesystem_store;
mod memory_store;

pub use filesystem_store::{FilesystemStore, FilesystemStoreCreateError};
pub use memory_store::MemoryStore;
