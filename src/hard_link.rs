//! Hard links.

use crate::{error::PreserveError, node::NodePath, storage::HierarchyStorageTraits};

#[derive(Clone, Debug, PartialEq, Eq)]
enum HardLinkTarget {
    Path(String),
    Node(NodePath),
}

/// A hard link to another node of the same hierarchy, created when written.
///
/// The target is either a stored node or an absolute path resolved at write time.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HardLink {
    target: Option<HardLinkTarget>,
}

impl HardLink {
    /// Create a hard link to the node at the absolute path `path`.
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            target: Some(HardLinkTarget::Path(path.into())),
        }
    }

    /// Create a hard link to a stored node.
    #[must_use]
    pub fn to_node(node: NodePath) -> Self {
        Self {
            target: Some(HardLinkTarget::Node(node)),
        }
    }

    /// The path given at creation, if any.
    #[must_use]
    pub fn path(&self) -> Option<&str> {
        match &self.target {
            Some(HardLinkTarget::Path(path)) => Some(path),
            _ => None,
        }
    }

    /// The stored node given at creation, if any.
    #[must_use]
    pub fn node(&self) -> Option<&NodePath> {
        match &self.target {
            Some(HardLinkTarget::Node(node)) => Some(node),
            _ => None,
        }
    }

    /// Resolve the node the link points to in `storage`.
    ///
    /// # Errors
    /// Returns [`PreserveError::NoReservedLocation`] if the link has no target, or a storage error if the target does not exist.
    pub fn resolve<TStorage: ?Sized + HierarchyStorageTraits>(
        &self,
        storage: &TStorage,
    ) -> Result<NodePath, PreserveError> {
        let path = match &self.target {
            Some(HardLinkTarget::Node(node)) => node.clone(),
            Some(HardLinkTarget::Path(path)) if !path.is_empty() => {
                NodePath::root().join(path)?
            }
            _ => return Err(PreserveError::NoReservedLocation("hard link".to_string())),
        };
        Ok(storage.resolve(&path)?)
    }
}
