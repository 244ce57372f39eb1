//! Stored groups.
//!
//! A [`PreserveGroup`] is a handle on a group in hierarchy storage bound to a [`RegistryContainer`].
//! Members are dumped on [`set`](PreserveGroup::set) and loaded on [`get`](PreserveGroup::get).
//!
//! A [`PreserveFile`] is the root group of a storage session.
//!
//! ```
//! # use std::sync::Arc;
//! # use hpreserve::{builtin::new_registry_list, group::PreserveFile, item::Item};
//! let file = PreserveFile::in_memory(new_registry_list([]))?;
//! file.set("nothing", Item::native(()))?;
//! assert!(file.get("nothing")?.downcast_ref::<()>().is_some());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod preserve_file;

pub use preserve_file::{open, PreserveFile};

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::{
    container::{
        infer_dtype, infer_shape, is_attribute_writable, Container, DatasetContainer,
        DatasetValue, GroupContainer, ALLOWED_DATASET_KEYS, ATTR_NAMESPACE, ATTR_ON_DEMAND,
        RESERVED_ATTRIBUTES,
    },
    error::PreserveError,
    item::Item,
    node::{Node, NodeKind, NodeName, NodePath},
    on_demand::{MemberWriter, OnDemandWrapper},
    registry_container::RegistryContainer,
    storage::{Attributes, DatasetProperties, HierarchyStorage, StorageError},
};

/// A stored group bound to the registries used to dump and load its members.
#[derive(Clone)]
pub struct PreserveGroup {
    storage: HierarchyStorage,
    path: NodePath,
    registries: Arc<RegistryContainer>,
}

impl std::fmt::Debug for PreserveGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreserveGroup")
            .field("path", &self.path)
            .field("registries", &self.registries)
            .finish_non_exhaustive()
    }
}

impl PreserveGroup {
    /// Open the group at `path`.
    ///
    /// # Errors
    /// Returns a [`StorageError`] if there is no group at `path`.
    pub fn new(
        storage: HierarchyStorage,
        path: NodePath,
        registries: Arc<RegistryContainer>,
    ) -> Result<Self, PreserveError> {
        match storage.node_kind(&path)? {
            Some(NodeKind::Group) => Ok(Self {
                storage,
                path,
                registries,
            }),
            Some(NodeKind::Dataset) => Err(StorageError::NotAGroup(path).into()),
            None => Err(StorageError::NodeNotFound(path).into()),
        }
    }

    /// The path of the group.
    #[must_use]
    pub fn path(&self) -> &NodePath {
        &self.path
    }

    /// The underlying storage.
    #[must_use]
    pub fn storage(&self) -> &HierarchyStorage {
        &self.storage
    }

    /// The registries members are dumped and loaded with.
    #[must_use]
    pub fn registries(&self) -> &Arc<RegistryContainer> {
        &self.registries
    }

    /// The path of the member `key`.
    ///
    /// # Errors
    /// Returns [`PreserveError::NodeName`] if `key` is not a valid node name.
    pub fn child_path(&self, key: &str) -> Result<NodePath, PreserveError> {
        Ok(self.path.child(&NodeName::new(key)?))
    }

    /// Read and load the member `key`.
    ///
    /// Members without provenance are returned as [`Item::Node`] handles.
    ///
    /// # Errors
    /// Returns a [`PreserveError`] if the member does not exist or cannot be read or loaded.
    pub fn get(&self, key: &str) -> Result<Item, PreserveError> {
        match self.read(key)? {
            node @ Item::Node(_) => Ok(node),
            item => self.registries.load(item),
        }
    }

    /// Read the member `key` without loading it.
    ///
    /// A member stamped by a dumper is returned as a [`Container`].
    /// An unstamped group is returned as an [`Item::Node`] handle, which can be opened with [`group`](PreserveGroup::group).
    /// An unstamped dataset is also returned as an [`Item::Node`] handle, with a warning.
    ///
    /// # Errors
    /// Returns [`PreserveError::UnknownNamespace`] if the member was dumped by a registry not in [`registries`](PreserveGroup::registries),
    /// or a storage error if the member does not exist.
    pub fn read(&self, key: &str) -> Result<Item, PreserveError> {
        let path = self.child_path(key)?;
        let kind = self
            .storage
            .node_kind(&path)?
            .ok_or_else(|| StorageError::NodeNotFound(path.clone()))?;
        let attributes = self.storage.attributes(&path)?;
        let namespace = attributes
            .get(ATTR_NAMESPACE)
            .and_then(Value::as_str)
            .map(str::to_string);
        match namespace.as_deref() {
            None => {
                if kind == NodeKind::Dataset {
                    tracing::warn!(%path, "no type information about dataset, returning a node handle");
                }
                Ok(Item::Node(path))
            }
            Some(namespace) if !self.registries.contains_namespace(namespace) => {
                Err(PreserveError::UnknownNamespace(namespace.to_string()))
            }
            Some(_) => Ok(Item::Container(read_container(
                &self.storage,
                &self.registries,
                &path,
                kind,
                attributes,
            )?)),
        }
    }

    /// Returns a wrapper which gets the member `key` when called.
    #[must_use]
    pub fn lazy(&self, key: &str) -> OnDemandWrapper<Item> {
        let group = self.clone();
        let key = key.to_string();
        OnDemandWrapper::new(move || group.get(&key))
    }

    /// Dump `item` and write it as the member `key`.
    ///
    /// # Errors
    /// Returns a [`PreserveError`] if the item cannot be dumped or written, or the member already exists.
    pub fn set(&self, key: &str, item: Item) -> Result<(), PreserveError> {
        let item = self.registries.dump(item)?;
        self.write(key, item)
    }

    /// Write a dumped item as the member `key`.
    ///
    /// - Containers are created with their attributes and provenance, and group members are written recursively.
    ///   On-demand groups with a hook are handed a [`MemberWriter`] instead.
    /// - Delayed containers reserve the member location without writing anything.
    /// - Hard links and stored nodes create a hard link, soft links create a soft link.
    /// - Arrays create an unstamped dataset.
    ///
    /// # Errors
    /// Returns [`PreserveError::NotWritable`] for native values and on-demand wrappers,
    /// [`PreserveError::AttributeNotWritable`] if an attribute cannot be stored,
    /// or a storage error, e.g. if the member already exists.
    pub fn write(&self, key: &str, item: Item) -> Result<(), PreserveError> {
        let path = self.child_path(key)?;
        match item {
            Item::Container(container) => self.write_container(&path, container),
            Item::Delayed(delayed) => {
                tracing::debug!(%path, "reserving location for delayed container");
                delayed.reserve(self.clone(), key);
                Ok(())
            }
            Item::HardLink(link) => {
                let target = link.resolve(self.storage.as_ref())?;
                Ok(self.storage.create_hard_link(&path, &target)?)
            }
            Item::Node(target) => Ok(self.storage.create_hard_link(&path, &target)?),
            Item::SoftLink(link) => Ok(self.storage.create_soft_link(&path, link.target())?),
            Item::Array(array) => {
                Ok(self
                    .storage
                    .create_dataset(&path, &array.properties(), array.data())?)
            }
            Item::OnDemand(_) | Item::Native(_) => {
                Err(PreserveError::NotWritable(item.kind().to_string()))
            }
        }
    }

    fn write_container(&self, path: &NodePath, container: Container) -> Result<(), PreserveError> {
        let mut attributes = checked_attributes(container.attrs())?;
        container
            .provenance()
            .write_to_attributes(&mut attributes);
        if container.is_on_demand() {
            attributes.insert(ATTR_ON_DEMAND.to_string(), Value::Bool(true));
        }

        match container {
            Container::Group(mut group) => {
                self.storage.create_group(path)?;
                self.storage.set_attributes(path, attributes)?;
                let stored = Self {
                    storage: self.storage.clone(),
                    path: path.clone(),
                    registries: self.registries.clone(),
                };
                match group.take_hook() {
                    Some(hook) if group.is_on_demand() => hook.call(MemberWriter::new(stored)),
                    _ => group
                        .into_iter()
                        .try_for_each(|(key, member)| stored.write(&key, member)),
                }
            }
            Container::Dataset(dataset) => {
                let (properties, data) = dataset_properties(&dataset)?;
                self.storage.create_dataset(path, &properties, &data)?;
                self.storage.set_attributes(path, attributes)?;
                Ok(())
            }
        }
    }

    /// Remove the member `key` and its descendants.
    ///
    /// # Errors
    /// Returns a storage error if the member does not exist.
    pub fn remove(&self, key: &str) -> Result<(), PreserveError> {
        Ok(self.storage.erase_node(&self.child_path(key)?)?)
    }

    /// The member names, sorted.
    ///
    /// # Errors
    /// Returns a storage error if the members cannot be listed.
    pub fn keys(&self) -> Result<Vec<String>, PreserveError> {
        Ok(self
            .storage
            .children(&self.path)?
            .into_iter()
            .map(|name| name.as_str().to_string())
            .collect())
    }

    /// The number of members.
    ///
    /// # Errors
    /// Returns a storage error if the members cannot be listed.
    pub fn len(&self) -> Result<usize, PreserveError> {
        Ok(self.storage.children(&self.path)?.len())
    }

    /// Returns true if the group has no members.
    ///
    /// # Errors
    /// Returns a storage error if the members cannot be listed.
    pub fn is_empty(&self) -> Result<bool, PreserveError> {
        Ok(self.len()? == 0)
    }

    /// Returns true if the group has the member `key`.
    ///
    /// # Errors
    /// Returns [`PreserveError::NodeName`] if `key` is not a valid node name, or a storage error.
    pub fn contains_key(&self, key: &str) -> Result<bool, PreserveError> {
        Ok(self.storage.exists(&self.child_path(key)?)?)
    }

    /// Create the group `name` and return a handle on it.
    ///
    /// # Errors
    /// Returns a storage error if a member `name` exists.
    pub fn create_group(&self, name: &str) -> Result<PreserveGroup, PreserveError> {
        let path = self.child_path(name)?;
        self.storage.create_group(&path)?;
        Ok(Self {
            storage: self.storage.clone(),
            path,
            registries: self.registries.clone(),
        })
    }

    /// Return a handle on the group `name`, creating it if it does not exist.
    ///
    /// # Errors
    /// Returns [`StorageError::NotAGroup`] if the member `name` is a dataset.
    pub fn require_group(&self, name: &str) -> Result<PreserveGroup, PreserveError> {
        if self.contains_key(name)? {
            self.group(name)
        } else {
            self.create_group(name)
        }
    }

    /// Return a handle on the existing group `name`.
    ///
    /// # Errors
    /// Returns a storage error if there is no group `name`.
    pub fn group(&self, name: &str) -> Result<PreserveGroup, PreserveError> {
        Self::new(
            self.storage.clone(),
            self.child_path(name)?,
            self.registries.clone(),
        )
    }

    /// Return a tree representation of the hierarchy below this group.
    ///
    /// # Errors
    /// Returns a storage error if the hierarchy cannot be listed.
    pub fn hierarchy_tree(&self) -> Result<String, PreserveError> {
        Ok(Node::new_with_storage(self.storage.as_ref(), &self.path)?.hierarchy_tree())
    }
}

/// Check that every attribute can be stored and none is reserved.
fn checked_attributes(attributes: &Attributes) -> Result<Attributes, PreserveError> {
    for (name, value) in attributes {
        if RESERVED_ATTRIBUTES.contains(&name.as_str()) || !is_attribute_writable(value) {
            return Err(PreserveError::AttributeNotWritable {
                name: name.clone(),
                value: value.to_string(),
            });
        }
    }
    Ok(attributes.clone())
}

/// Split the options of a dataset into its stored properties and payload.
///
/// On-demand options are materialised.
/// The shape and element type are inferred from the payload unless given.
fn dataset_properties(
    dataset: &DatasetContainer,
) -> Result<(DatasetProperties, Value), PreserveError> {
    let mut properties = Map::new();
    let mut data = Value::Null;
    for (key, value) in dataset.iter() {
        let value = value.materialise()?;
        if key == "data" {
            data = value;
        } else {
            properties.insert(key.to_string(), value);
        }
    }
    if !properties.contains_key("shape") {
        if let Some(shape) = infer_shape(&data) {
            properties.insert("shape".to_string(), Value::from(shape));
        }
    }
    if !properties.contains_key("dtype") {
        if let Some(dtype) = infer_dtype(&data) {
            properties.insert("dtype".to_string(), Value::from(dtype));
        }
    }
    properties.remove("size");
    Ok((DatasetProperties::new(properties), data))
}

/// Read the node at `path` into a container.
///
/// Stored dataset properties become dataset options, and `size` is derived from the shape.
/// The members of on-demand groups and the data of on-demand datasets are read when called.
fn read_container(
    storage: &HierarchyStorage,
    registries: &Arc<RegistryContainer>,
    path: &NodePath,
    kind: NodeKind,
    attributes: Attributes,
) -> Result<Container, PreserveError> {
    match kind {
        NodeKind::Group => {
            let mut group = GroupContainer::with_attributes(attributes);
            for name in storage.children(path)? {
                let child = path.child(&name);
                let member = if group.is_on_demand() {
                    let storage = storage.clone();
                    let registries = registries.clone();
                    Item::OnDemand(OnDemandWrapper::new(move || {
                        let container = read_node(&storage, &registries, &child)?;
                        registries.load(Item::Container(container))
                    }))
                } else {
                    Item::Container(read_node(storage, registries, &child)?)
                };
                group.insert(name.as_str(), member);
            }
            Ok(Container::Group(group))
        }
        NodeKind::Dataset => {
            let mut dataset = DatasetContainer::with_attributes(attributes);
            let properties = storage.dataset_properties(path)?;
            let data = if dataset.is_on_demand() {
                let storage = storage.clone();
                let path = path.clone();
                DatasetValue::OnDemand(OnDemandWrapper::new(move || {
                    Ok(storage.dataset_data(&path)?)
                }))
            } else {
                DatasetValue::Value(storage.dataset_data(path)?)
            };
            dataset.insert("data", data)?;
            for (key, value) in properties.iter() {
                let key = key.as_str();
                if ALLOWED_DATASET_KEYS.contains(&key) && !matches!(key, "attrs" | "data") {
                    dataset.insert(key, value.clone())?;
                }
            }
            if let Some(shape) = properties.shape() {
                let size: u64 = shape.iter().product();
                dataset.insert("size", Value::from(size))?;
            }
            Ok(Container::Dataset(dataset))
        }
    }
}

fn read_node(
    storage: &HierarchyStorage,
    registries: &Arc<RegistryContainer>,
    path: &NodePath,
) -> Result<Container, PreserveError> {
    let kind = storage
        .node_kind(path)?
        .ok_or_else(|| StorageError::NodeNotFound(path.clone()))?;
    let attributes = storage.attributes(path)?;
    read_container(storage, registries, path, kind, attributes)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::{
        container::Provenance,
        hard_link::HardLink,
        item::{ArrayData, SoftLink},
        registry::Registry,
        storage::{store::MemoryStore, StoreHierarchy},
    };

    use super::*;

    fn root(registries: RegistryContainer) -> PreserveGroup {
        let storage: HierarchyStorage = Arc::new(StoreHierarchy::new(Arc::new(MemoryStore::new())));
        PreserveGroup::new(storage, NodePath::root(), Arc::new(registries)).unwrap()
    }

    #[test]
    fn group_write_read_containers() -> Result<(), PreserveError> {
        let root = root(RegistryContainer::from_registries([Registry::new("R")]));
        let mut dataset = DatasetContainer::with_data(json!([[1, 2], [3, 4]]));
        dataset.attrs_mut().insert("units".to_string(), json!("m"));
        dataset.set_provenance(Provenance::stamped("R", "Grid", Some(2)));
        let group = GroupContainer::new().with_member("grid", dataset);
        root.write("g", group.into())?;

        assert_eq!(root.keys()?, ["g"]);
        assert!(matches!(root.read("g")?, Item::Node(_)));
        let Item::Container(Container::Dataset(grid)) = root.group("g")?.read("grid")? else {
            panic!("grid is stamped, so it is read as a container");
        };
        assert_eq!(grid.attrs().get("units"), Some(&json!("m")));
        assert_eq!(
            grid.get("shape").and_then(DatasetValue::as_value),
            Some(&json!([2, 2]))
        );
        assert_eq!(
            grid.get("size").and_then(DatasetValue::as_value),
            Some(&json!(4))
        );
        assert_eq!(
            grid.get("dtype").and_then(DatasetValue::as_value),
            Some(&json!("uint64"))
        );
        assert_eq!(grid.provenance().version(), Some(2));
        Ok(())
    }

    #[test]
    fn group_unknown_namespace() -> Result<(), PreserveError> {
        let root = root(RegistryContainer::new());
        let mut dataset = DatasetContainer::with_data(json!(1));
        dataset.set_provenance(Provenance::stamped("R", "Int", None));
        root.write("x", dataset.into())?;
        assert!(matches!(root.read("x"), Err(PreserveError::UnknownNamespace(_))));
        Ok(())
    }

    #[test]
    fn group_attributes_checked() {
        let root = root(RegistryContainer::new());
        let mut group = GroupContainer::new();
        group.attrs_mut().insert("bad".to_string(), json!({"nested": 1}));
        assert!(matches!(
            root.write("g", group.into()),
            Err(PreserveError::AttributeNotWritable { .. })
        ));
        let mut group = GroupContainer::new();
        group.attrs_mut().insert(ATTR_NAMESPACE.to_string(), json!("R"));
        assert!(matches!(
            root.write("h", group.into()),
            Err(PreserveError::AttributeNotWritable { .. })
        ));
    }

    #[test]
    fn group_links_and_arrays() -> Result<(), PreserveError> {
        let root = root(RegistryContainer::new());
        root.write("array", ArrayData::new(json!([1.5, 2.5])).into())?;
        root.set("hard", HardLink::new("/array").into())?;
        root.set("soft", SoftLink::new("array").into())?;
        let storage = root.storage();
        assert_eq!(storage.dataset_data(&NodePath::new("/hard")?)?, json!([1.5, 2.5]));
        assert_eq!(storage.dataset_data(&NodePath::new("/soft")?)?, json!([1.5, 2.5]));
        assert!(matches!(
            root.set("missing", HardLink::default().into()),
            Err(PreserveError::NoReservedLocation(_))
        ));
        assert!(matches!(
            root.write("native", Item::native(1_u8)),
            Err(PreserveError::NotWritable(_))
        ));
        Ok(())
    }

    #[test]
    fn group_navigation() -> Result<(), PreserveError> {
        let root = root(RegistryContainer::new());
        let a = root.create_group("a")?;
        assert_eq!(a.path().as_str(), "/a");
        assert!(root.create_group("a").is_err());
        let b = a.require_group("b")?;
        assert_eq!(a.require_group("b")?.path(), b.path());
        assert!(root.contains_key("a")?);
        assert_eq!(a.len()?, 1);
        root.remove("a")?;
        assert!(root.is_empty()?);
        assert!(root.group("a").is_err());
        Ok(())
    }
}
