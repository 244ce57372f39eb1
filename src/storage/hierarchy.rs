use std::sync::Arc;

use derive_more::{Deref, From};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    config::global_config,
    node::{NodeKind, NodeName, NodePath},
};

use super::{
    discover_children, erase_node, prefix_node_name, ReadableWritableListableStorageTraits,
    StorageError, StoreKey,
};

/// Node attributes.
pub type Attributes = Map<String, Value>;

/// The options a dataset was created with, such as `shape`, `dtype` and `fillvalue`.
#[derive(Clone, Debug, Default, PartialEq, Deref, From, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DatasetProperties(Map<String, Value>);

impl DatasetProperties {
    /// Create dataset properties from a map of options.
    #[must_use]
    pub fn new(properties: Map<String, Value>) -> Self {
        Self(properties)
    }

    /// Consume the properties and return the underlying map.
    #[must_use]
    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }

    /// The shape of the dataset, if known.
    #[must_use]
    pub fn shape(&self) -> Option<Vec<u64>> {
        self.0
            .get("shape")?
            .as_array()?
            .iter()
            .map(Value::as_u64)
            .collect()
    }

    /// The element type of the dataset, if known.
    #[must_use]
    pub fn dtype(&self) -> Option<&str> {
        self.0.get("dtype")?.as_str()
    }

    /// The fill value of the dataset, if set.
    #[must_use]
    pub fn fill_value(&self) -> Option<&Value> {
        self.0.get("fillvalue")
    }
}

/// The metadata document of a node in a key-value store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node_type", rename_all = "snake_case")]
pub enum NodeMetadata {
    /// A group.
    Group {
        /// Group attributes.
        #[serde(default)]
        attributes: Attributes,
    },
    /// A dataset. The payload is stored separately.
    Dataset {
        /// The options given at creation.
        #[serde(default)]
        properties: DatasetProperties,
        /// Dataset attributes.
        #[serde(default)]
        attributes: Attributes,
    },
    /// An alias of another node.
    HardLink {
        /// The resolved path of the node.
        target: NodePath,
    },
    /// A reference to another node by path, which may dangle.
    SoftLink {
        /// The path of the node, relative to the parent of the link or absolute.
        target: String,
    },
}

impl NodeMetadata {
    fn kind(&self) -> Option<NodeKind> {
        match self {
            Self::Group { .. } => Some(NodeKind::Group),
            Self::Dataset { .. } => Some(NodeKind::Dataset),
            Self::HardLink { .. } | Self::SoftLink { .. } => None,
        }
    }
}

/// The capabilities the serialisation layer needs from a hierarchical storage engine.
///
/// Nodes are addressed by [`NodePath`]. Every method follows links in each path component,
/// except [`erase_node`](HierarchyStorageTraits::erase_node) which removes a link rather than its target.
pub trait HierarchyStorageTraits: Send + Sync {
    /// Classify the node at `path`, or return [`None`] if there is no node.
    ///
    /// # Errors
    /// Returns a [`StorageError`] if there is an underlying storage error.
    fn node_kind(&self, path: &NodePath) -> Result<Option<NodeKind>, StorageError>;

    /// Returns the names of the children of the group at `path`, sorted.
    ///
    /// # Errors
    /// Returns [`StorageError::NotAGroup`] if the node is not a group.
    fn children(&self, path: &NodePath) -> Result<Vec<NodeName>, StorageError>;

    /// Read the attributes of a node.
    ///
    /// # Errors
    /// Returns a [`StorageError`] if the node does not exist.
    fn attributes(&self, path: &NodePath) -> Result<Attributes, StorageError>;

    /// Replace the attributes of a node.
    ///
    /// # Errors
    /// Returns a [`StorageError`] if the node does not exist.
    fn set_attributes(&self, path: &NodePath, attributes: Attributes) -> Result<(), StorageError>;

    /// Create an empty group at `path`.
    ///
    /// # Errors
    /// Returns [`StorageError::NodeExists`] if there is a node at `path`, or [`StorageError::NotAGroup`] if the parent is not a group.
    fn create_group(&self, path: &NodePath) -> Result<(), StorageError>;

    /// Create a dataset at `path` with creation options `properties` and payload `data`.
    ///
    /// # Errors
    /// Returns [`StorageError::NodeExists`] if there is a node at `path`, or [`StorageError::NotAGroup`] if the parent is not a group.
    fn create_dataset(
        &self,
        path: &NodePath,
        properties: &DatasetProperties,
        data: &Value,
    ) -> Result<(), StorageError>;

    /// Read the creation options of a dataset.
    ///
    /// # Errors
    /// Returns [`StorageError::NotADataset`] if the node is not a dataset.
    fn dataset_properties(&self, path: &NodePath) -> Result<DatasetProperties, StorageError>;

    /// Read the payload of a dataset, [`Value::Null`] if it is empty.
    ///
    /// # Errors
    /// Returns [`StorageError::NotADataset`] if the node is not a dataset.
    fn dataset_data(&self, path: &NodePath) -> Result<Value, StorageError>;

    /// Make `path` an alias of the existing node `target`.
    ///
    /// # Errors
    /// Returns a [`StorageError`] if `target` does not exist or `path` cannot be created.
    fn create_hard_link(&self, path: &NodePath, target: &NodePath) -> Result<(), StorageError>;

    /// Make `path` refer to `target` by name.
    ///
    /// # Errors
    /// Returns a [`StorageError`] if `path` cannot be created.
    fn create_soft_link(&self, path: &NodePath, target: &str) -> Result<(), StorageError>;

    /// Resolve the links along `path`, returning the location of the node.
    ///
    /// # Errors
    /// Returns [`StorageError::NodeNotFound`] if there is no node, or [`StorageError::LinkResolution`] if too many links are followed.
    fn resolve(&self, path: &NodePath) -> Result<NodePath, StorageError>;

    /// Remove a node and its descendants.
    ///
    /// # Errors
    /// Returns [`StorageError::NodeNotFound`] if there is no node.
    fn erase_node(&self, path: &NodePath) -> Result<(), StorageError>;

    /// Returns true if there is a node at `path`.
    ///
    /// # Errors
    /// Returns a [`StorageError`] if there is an underlying storage error.
    fn exists(&self, path: &NodePath) -> Result<bool, StorageError> {
        Ok(self.node_kind(path)?.is_some())
    }
}

/// A hierarchy stored in a key-value store.
pub struct StoreHierarchy<TStorage: ?Sized> {
    storage: Arc<TStorage>,
}

impl<TStorage: ?Sized> Clone for StoreHierarchy<TStorage> {
    fn clone(&self) -> Self {
        Self {
            storage: self.storage.clone(),
        }
    }
}

impl<TStorage: ?Sized> std::fmt::Debug for StoreHierarchy<TStorage> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreHierarchy").finish_non_exhaustive()
    }
}

impl<TStorage: ?Sized + ReadableWritableListableStorageTraits> StoreHierarchy<TStorage> {
    /// Create a hierarchy in `storage`.
    #[must_use]
    pub fn new(storage: Arc<TStorage>) -> Self {
        Self { storage }
    }

    /// Returns the underlying store.
    #[must_use]
    pub fn storage(&self) -> &Arc<TStorage> {
        &self.storage
    }

    /// Read the metadata document at `path` without following links.
    ///
    /// The root is an empty group until its document is written.
    ///
    /// # Errors
    /// Returns [`StorageError::InvalidMetadata`] if the document cannot be parsed.
    pub fn metadata(&self, path: &NodePath) -> Result<Option<NodeMetadata>, StorageError> {
        let key = StoreKey::node_metadata(path);
        match self.storage.get(&key)? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|err| StorageError::InvalidMetadata(key, err.to_string())),
            None if path.is_root() => Ok(Some(NodeMetadata::Group {
                attributes: Attributes::default(),
            })),
            None => Ok(None),
        }
    }

    fn set_metadata(&self, path: &NodePath, metadata: &NodeMetadata) -> Result<(), StorageError> {
        let key = StoreKey::node_metadata(path);
        let pretty = global_config().pretty_metadata();
        let bytes = if pretty {
            serde_json::to_vec_pretty(metadata)
        } else {
            serde_json::to_vec(metadata)
        }
        .map_err(|err| StorageError::InvalidMetadata(key.clone(), err.to_string()))?;
        self.storage.set(&key, &bytes)
    }

    fn resolve_within(
        &self,
        path: &NodePath,
        hops: &mut usize,
        limit: usize,
    ) -> Result<NodePath, StorageError> {
        let mut current = NodePath::root();
        for component in path.components() {
            let mut candidate = current.child(&NodeName::new(component)?);
            loop {
                let next = match self.metadata(&candidate)? {
                    None => return Err(StorageError::NodeNotFound(path.clone())),
                    Some(NodeMetadata::HardLink { target }) => target,
                    Some(NodeMetadata::SoftLink { target }) => current.join(&target)?,
                    Some(_) => break,
                };
                *hops += 1;
                if *hops > limit {
                    return Err(StorageError::LinkResolution(path.clone()));
                }
                candidate = self.resolve_within(&next, hops, limit)?;
            }
            current = candidate;
        }
        Ok(current)
    }

    /// Resolve the location of a node about to be created at `path`.
    fn resolve_new(&self, path: &NodePath) -> Result<NodePath, StorageError> {
        let parent = path
            .parent()
            .ok_or_else(|| StorageError::NodeExists(path.clone()))?;
        let parent = self.resolve(&parent)?;
        if !matches!(self.metadata(&parent)?, Some(NodeMetadata::Group { .. })) {
            return Err(StorageError::NotAGroup(parent));
        }
        let location = parent.child(&NodeName::new(path.name())?);
        if self.metadata(&location)?.is_some() {
            return Err(StorageError::NodeExists(path.clone()));
        }
        Ok(location)
    }

    fn resolved_metadata(&self, path: &NodePath) -> Result<(NodePath, NodeMetadata), StorageError> {
        let location = self.resolve(path)?;
        let metadata = self
            .metadata(&location)?
            .ok_or_else(|| StorageError::NodeNotFound(path.clone()))?;
        Ok((location, metadata))
    }
}

impl<TStorage: ?Sized + ReadableWritableListableStorageTraits> HierarchyStorageTraits
    for StoreHierarchy<TStorage>
{
    fn node_kind(&self, path: &NodePath) -> Result<Option<NodeKind>, StorageError> {
        match self.resolved_metadata(path) {
            Ok((_, metadata)) => Ok(metadata.kind()),
            Err(StorageError::NodeNotFound(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn children(&self, path: &NodePath) -> Result<Vec<NodeName>, StorageError> {
        let (location, metadata) = self.resolved_metadata(path)?;
        if metadata.kind() != Some(NodeKind::Group) {
            return Err(StorageError::NotAGroup(path.clone()));
        }
        discover_children(&*self.storage, &location)?
            .iter()
            .map(|prefix| prefix_node_name(prefix).map_err(StorageError::from))
            .collect()
    }

    fn attributes(&self, path: &NodePath) -> Result<Attributes, StorageError> {
        match self.resolved_metadata(path)?.1 {
            NodeMetadata::Group { attributes } | NodeMetadata::Dataset { attributes, .. } => {
                Ok(attributes)
            }
            NodeMetadata::HardLink { .. } | NodeMetadata::SoftLink { .. } => {
                Err(StorageError::NodeNotFound(path.clone()))
            }
        }
    }

    fn set_attributes(&self, path: &NodePath, attributes: Attributes) -> Result<(), StorageError> {
        let (location, metadata) = self.resolved_metadata(path)?;
        let metadata = match metadata {
            NodeMetadata::Group { .. } => NodeMetadata::Group { attributes },
            NodeMetadata::Dataset { properties, .. } => NodeMetadata::Dataset {
                properties,
                attributes,
            },
            NodeMetadata::HardLink { .. } | NodeMetadata::SoftLink { .. } => {
                return Err(StorageError::NodeNotFound(path.clone()))
            }
        };
        self.set_metadata(&location, &metadata)
    }

    fn create_group(&self, path: &NodePath) -> Result<(), StorageError> {
        let location = self.resolve_new(path)?;
        self.set_metadata(
            &location,
            &NodeMetadata::Group {
                attributes: Attributes::default(),
            },
        )
    }

    fn create_dataset(
        &self,
        path: &NodePath,
        properties: &DatasetProperties,
        data: &Value,
    ) -> Result<(), StorageError> {
        let location = self.resolve_new(path)?;
        if !data.is_null() {
            let key = StoreKey::node_data(&location);
            let bytes = serde_json::to_vec(data)
                .map_err(|err| StorageError::InvalidMetadata(key.clone(), err.to_string()))?;
            self.storage.set(&key, &bytes)?;
        }
        self.set_metadata(
            &location,
            &NodeMetadata::Dataset {
                properties: properties.clone(),
                attributes: Attributes::default(),
            },
        )
    }

    fn dataset_properties(&self, path: &NodePath) -> Result<DatasetProperties, StorageError> {
        match self.resolved_metadata(path)?.1 {
            NodeMetadata::Dataset { properties, .. } => Ok(properties),
            _ => Err(StorageError::NotADataset(path.clone())),
        }
    }

    fn dataset_data(&self, path: &NodePath) -> Result<Value, StorageError> {
        let (location, metadata) = self.resolved_metadata(path)?;
        if !matches!(metadata, NodeMetadata::Dataset { .. }) {
            return Err(StorageError::NotADataset(path.clone()));
        }
        let key = StoreKey::node_data(&location);
        match self.storage.get(&key)? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map_err(|err| StorageError::InvalidMetadata(key, err.to_string())),
            None => Ok(Value::Null),
        }
    }

    fn create_hard_link(&self, path: &NodePath, target: &NodePath) -> Result<(), StorageError> {
        let target = self.resolve(target)?;
        let location = self.resolve_new(path)?;
        self.set_metadata(&location, &NodeMetadata::HardLink { target })
    }

    fn create_soft_link(&self, path: &NodePath, target: &str) -> Result<(), StorageError> {
        let location = self.resolve_new(path)?;
        self.set_metadata(
            &location,
            &NodeMetadata::SoftLink {
                target: target.to_string(),
            },
        )
    }

    fn resolve(&self, path: &NodePath) -> Result<NodePath, StorageError> {
        let limit = global_config().link_resolution_limit();
        let mut hops = 0;
        self.resolve_within(path, &mut hops, limit)
    }

    fn erase_node(&self, path: &NodePath) -> Result<(), StorageError> {
        let location = match path.parent() {
            Some(parent) => self.resolve(&parent)?.child(&NodeName::new(path.name())?),
            None => NodePath::root(),
        };
        if self.metadata(&location)?.is_none() {
            return Err(StorageError::NodeNotFound(path.clone()));
        }
        tracing::debug!(%path, %location, "erasing node");
        erase_node(&*self.storage, &location)
    }
}
