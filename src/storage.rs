//! Hierarchy storage.
//!
//! The serialisation layer only needs an abstract capability contract from the storage engine: [`HierarchyStorageTraits`].
//! It covers enumerating and classifying nodes, reading and writing attributes, creating groups, datasets and links, and resolving paths.
//!
//! [`StoreHierarchy`] implements that contract on top of a key-value [store].
//! Every node has a JSON metadata document at `<path>/__node.json` and datasets keep their payload at `<path>/__data.json`.
//! Node names cannot start with `__`, so these keys never collide with children.
//!
//! This module defines the abstract store interfaces and includes a [`MemoryStore`](store::MemoryStore) and a [`FilesystemStore`](store::FilesystemStore).

mod hierarchy;
mod storage_sync;
pub mod store;
mod store_key;
mod store_prefix;

use std::sync::Arc;

use thiserror::Error;

use crate::node::{NodeName, NodeNameError, NodePath, NodePathError};

pub use hierarchy::{
    Attributes, DatasetProperties, HierarchyStorageTraits, NodeMetadata, StoreHierarchy,
};
pub use store_key::{StoreKey, StoreKeyError, StoreKeys};
pub use store_prefix::{StorePrefix, StorePrefixError, StorePrefixes};

pub use self::storage_sync::{
    discover_children, erase_node, node_exists, ListableStorageTraits, ReadableStorageTraits,
    ReadableWritableListableStorageTraits, ReadableWritableStorageTraits, StoreKeysPrefixes,
    WritableStorageTraits,
};

/// Bytes retrieved from a store.
pub type Bytes = Vec<u8>;

/// Bytes retrieved from a store, or [`None`] if the key does not exist.
pub type MaybeBytes = Option<Bytes>;

/// [`Arc`] wrapped readable storage.
pub type ReadableStorage = Arc<dyn ReadableStorageTraits>;

/// [`Arc`] wrapped readable, writable, and listable storage.
pub type ReadableWritableListableStorage = Arc<dyn ReadableWritableListableStorageTraits>;

/// [`Arc`] wrapped hierarchy storage.
pub type HierarchyStorage = Arc<dyn HierarchyStorageTraits>;

/// The name of the metadata document of a node.
pub const METADATA_KEY_NAME: &str = "__node.json";

/// The name of the payload of a dataset node.
pub const DATA_KEY_NAME: &str = "__data.json";

/// A storage error.
#[derive(Debug, Error)]
pub enum StorageError {
    /// A write operation was attempted on a read only store.
    #[error("a write operation was attempted on a read only store")]
    ReadOnly,
    /// An IO error.
    #[error(transparent)]
    IOError(#[from] std::io::Error),
    /// An error parsing the metadata for a key.
    #[error("error parsing metadata for {0}: {1}")]
    InvalidMetadata(StoreKey, String),
    /// An invalid store prefix.
    #[error("invalid store prefix {0}")]
    StorePrefixError(#[from] StorePrefixError),
    /// An invalid store key.
    #[error("invalid store key {0}")]
    InvalidStoreKey(#[from] StoreKeyError),
    /// An invalid node path.
    #[error("invalid node path {0}")]
    NodePathError(#[from] NodePathError),
    /// An invalid node name.
    #[error("invalid node name {0}")]
    NodeNameError(#[from] NodeNameError),
    /// There is no node at the path.
    #[error("node {0} does not exist")]
    NodeNotFound(NodePath),
    /// A node already exists at the path.
    #[error("node {0} already exists")]
    NodeExists(NodePath),
    /// The node is not a group.
    #[error("node {0} is not a group")]
    NotAGroup(NodePath),
    /// The node is not a dataset.
    #[error("node {0} is not a dataset")]
    NotADataset(NodePath),
    /// Too many links were followed while resolving a path.
    #[error("too many links followed resolving {0}")]
    LinkResolution(NodePath),
    /// The requested method is not supported.
    #[error("{0}")]
    Unsupported(String),
    /// Any other error.
    #[error("{0}")]
    Other(String),
}

impl From<&str> for StorageError {
    fn from(err: &str) -> Self {
        Self::Other(err.to_string())
    }
}

impl From<String> for StorageError {
    fn from(err: String) -> Self {
        Self::Other(err)
    }
}

/// Return the name of the node a store prefix refers to.
///
/// # Errors
/// Returns [`NodeNameError`] if the last component of the prefix is not a valid node name.
pub fn prefix_node_name(prefix: &StorePrefix) -> Result<NodeName, NodeNameError> {
    let name = prefix
        .as_str()
        .strip_suffix('/')
        .unwrap_or(prefix.as_str())
        .rsplit('/')
        .next()
        .unwrap_or_default();
    NodeName::new(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_names() {
        let prefix = StorePrefix::new("a/b/").unwrap();
        assert_eq!(prefix_node_name(&prefix).unwrap().as_str(), "b");
        assert!(prefix_node_name(&StorePrefix::root()).is_err());
    }
}
