use derive_more::{Display, From};
use thiserror::Error;

use crate::node::NodePath;

use super::{StorePrefix, DATA_KEY_NAME, METADATA_KEY_NAME};

/// A store key.
///
/// A key is a non-empty string which neither starts nor ends with `/`.
/// The keys of a hierarchy are the files of its nodes, see [`StoreKey::node_metadata`] and [`StoreKey::node_data`].
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Display)]
pub struct StoreKey(String);

/// An invalid store key.
#[derive(Debug, From, Error)]
#[error("invalid store key {0}")]
pub struct StoreKeyError(String);

/// A list of [`StoreKey`].
pub type StoreKeys = Vec<StoreKey>;

impl StoreKey {
    /// Create a new store key from `key`.
    ///
    /// # Errors
    /// Returns [`StoreKeyError`] if `key` is not valid according to [`StoreKey::validate()`].
    pub fn new(key: impl Into<String>) -> Result<Self, StoreKeyError> {
        let key = key.into();
        if Self::validate(&key) {
            Ok(Self(key))
        } else {
            Err(StoreKeyError(key))
        }
    }

    fn node_file(path: &NodePath, name: &str) -> Self {
        Self(StorePrefix::from(path).as_str().to_string() + name)
    }

    /// The key of the metadata document of the node at `path`.
    #[must_use]
    pub fn node_metadata(path: &NodePath) -> Self {
        Self::node_file(path, METADATA_KEY_NAME)
    }

    /// The key of the payload of the dataset at `path`.
    #[must_use]
    pub fn node_data(path: &NodePath) -> Self {
        Self::node_file(path, DATA_KEY_NAME)
    }

    /// Extracts a string slice of the underlying key [String].
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Validates a key.
    #[must_use]
    pub fn validate(key: &str) -> bool {
        !key.starts_with('/') && !key.ends_with('/') && !key.is_empty()
    }

    /// Returns true if the key has prefix `prefix`.
    #[must_use]
    pub fn has_prefix(&self, prefix: &StorePrefix) -> bool {
        self.0.starts_with(prefix.as_str())
    }

    /// Returns the prefix of the directory holding this key.
    #[must_use]
    pub fn parent(&self) -> StorePrefix {
        match self.0.rfind('/') {
            Some(index) => StorePrefix::from_trusted(&self.0[..=index]),
            None => StorePrefix::root(),
        }
    }
}

impl TryFrom<&str> for StoreKey {
    type Error = StoreKeyError;

    fn try_from(key: &str) -> Result<Self, Self::Error> {
        Self::new(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_key() {
        assert_eq!(StoreKey::new("a").unwrap().to_string(), "a");
        assert!(StoreKey::new("a/").is_err());
        assert!(StoreKey::new("/a").is_err());
        assert!(StoreKey::new("").is_err());
        assert_eq!(
            StoreKey::new("a/").unwrap_err().to_string(),
            "invalid store key a/"
        );
        assert_eq!(StoreKey::new("a").unwrap().parent(), StorePrefix::root());
        assert!(StoreKey::new("a/b/c")
            .unwrap()
            .has_prefix(&StorePrefix::new("a/b/").unwrap()));
    }

    #[test]
    fn store_key_node_files() {
        let root = NodePath::root();
        let path = NodePath::new("/a/b").unwrap();
        assert_eq!(StoreKey::node_metadata(&root).as_str(), "__node.json");
        assert_eq!(StoreKey::node_metadata(&path).as_str(), "a/b/__node.json");
        assert_eq!(StoreKey::node_data(&path).as_str(), "a/b/__data.json");
        assert_eq!(
            StoreKey::node_data(&path).parent(),
            StorePrefix::from(&path)
        );
    }
}
