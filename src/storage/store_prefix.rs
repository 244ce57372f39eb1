use derive_more::{Display, From};
use thiserror::Error;

use crate::node::NodePath;

/// A store prefix.
///
/// A prefix is either empty (the root) or ends with `/`; it never starts with `/`.
/// Every node of a hierarchy maps to a prefix, e.g. `/a/b` maps to `a/b/`.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Display)]
pub struct StorePrefix(String);

/// An invalid store prefix.
#[derive(Debug, Error, From)]
#[error("invalid store prefix {0}")]
pub struct StorePrefixError(String);

/// A list of [`StorePrefix`].
pub type StorePrefixes = Vec<StorePrefix>;

impl StorePrefix {
    /// Create a new store prefix from `prefix`.
    ///
    /// # Errors
    /// Returns [`StorePrefixError`] if `prefix` is not valid according to [`StorePrefix::validate`()].
    pub fn new(prefix: impl Into<String>) -> Result<Self, StorePrefixError> {
        let prefix = prefix.into();
        if Self::validate(&prefix) {
            Ok(Self(prefix))
        } else {
            Err(StorePrefixError(prefix))
        }
    }

    pub(crate) fn from_trusted(prefix: &str) -> Self {
        debug_assert!(Self::validate(prefix));
        Self(prefix.to_string())
    }

    /// The root prefix.
    #[must_use]
    pub const fn root() -> Self {
        Self(String::new())
    }

    /// Extracts a string slice containing the prefix `String`.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Validates a prefix:
    /// - the root prefix is the empty string, otherwise
    /// - a prefix ends with a trailing `/` and does not start with `/`.
    #[must_use]
    pub fn validate(prefix: &str) -> bool {
        prefix.is_empty() || (prefix.ends_with('/') && !prefix.starts_with('/'))
    }

    /// Returns the prefix of the parent, if it has one.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        let trimmed = self.0.strip_suffix('/')?;
        match trimmed.rfind('/') {
            Some(index) => Some(Self(trimmed[..=index].to_string())),
            None => Some(Self::root()),
        }
    }
}

impl TryFrom<&str> for StorePrefix {
    type Error = StorePrefixError;

    fn try_from(prefix: &str) -> Result<Self, StorePrefixError> {
        Self::new(prefix)
    }
}

impl From<&NodePath> for StorePrefix {
    fn from(path: &NodePath) -> Self {
        if path.is_root() {
            Self::root()
        } else {
            let path = path.as_str();
            Self(path.strip_prefix('/').unwrap_or(path).to_string() + "/")
        }
    }
}
