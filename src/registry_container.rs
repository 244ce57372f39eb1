//! The dispatcher: an ordered sequence of registries.
//!
//! [`RegistryContainer::dump`] converts native values to containers with the first registry that has a dumper for the exact type.
//! [`RegistryContainer::load`] converts stamped containers back with the loader selected by the namespace, label and version of the container.

use std::{
    any::{Any, TypeId},
    collections::HashMap,
    ops::Add,
    sync::{Arc, Weak},
};

use parking_lot::{Mutex, RwLock};

use crate::{
    container::{Container, Provenance},
    delayed::{DelayedContainer, DelayedState},
    error::PreserveError,
    item::{Item, NativeValue},
    registry::Registry,
    version::Version,
};

/// An ordered sequence of registries with per-type version locks.
///
/// Registry names are unique: adding a registry with the name of a registry already in the container replaces it in place.
#[derive(Default)]
pub struct RegistryContainer {
    registries: Vec<Arc<Registry>>,
    version_lock: RwLock<HashMap<TypeId, Option<Version>>>,
    delayed_refs: Mutex<Vec<Weak<Mutex<DelayedState>>>>,
}

impl RegistryContainer {
    /// Create an empty container.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a container holding `registries` in order.
    #[must_use]
    pub fn from_registries<I>(registries: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Arc<Registry>>,
    {
        let mut container = Self::new();
        container.extend(registries);
        container
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.registries
            .iter()
            .position(|registry| registry.name() == name)
    }

    fn replace_existing(&mut self, registry: Arc<Registry>) -> Result<(), Arc<Registry>> {
        match self.position(registry.name()) {
            Some(index) => {
                tracing::warn!(
                    registry = registry.name(),
                    "registry with existing name is being registered"
                );
                self.registries[index] = registry;
                Ok(())
            }
            None => Err(registry),
        }
    }

    /// Append a registry.
    pub fn push(&mut self, registry: impl Into<Arc<Registry>>) {
        if let Err(registry) = self.replace_existing(registry.into()) {
            self.registries.push(registry);
        }
    }

    /// Insert a registry at `index`, or at the end if `index` is out of bounds.
    pub fn insert(&mut self, index: usize, registry: impl Into<Arc<Registry>>) {
        if let Err(registry) = self.replace_existing(registry.into()) {
            let index = index.min(self.registries.len());
            self.registries.insert(index, registry);
        }
    }

    /// Remove and return the registry at `index`.
    pub fn remove(&mut self, index: usize) -> Option<Arc<Registry>> {
        (index < self.registries.len()).then(|| self.registries.remove(index))
    }

    /// Returns the registry at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Arc<Registry>> {
        self.registries.get(index)
    }

    /// Returns the registry named `name`.
    #[must_use]
    pub fn get_by_name(&self, name: &str) -> Option<&Arc<Registry>> {
        self.registries
            .iter()
            .find(|registry| registry.name() == name)
    }

    /// Returns true if a registry is named `name`.
    #[must_use]
    pub fn contains_namespace(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// The number of registries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.registries.len()
    }

    /// Returns true if there are no registries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.registries.is_empty()
    }

    /// The registries in order.
    pub fn iter(&self) -> std::slice::Iter<'_, Arc<Registry>> {
        self.registries.iter()
    }

    /// Append `registries`.
    pub fn extend<I>(&mut self, registries: I)
    where
        I: IntoIterator,
        I::Item: Into<Arc<Registry>>,
    {
        for registry in registries {
            self.push(registry);
        }
    }

    /// Always dump values of type `T` with the dumper of `version`.
    pub fn lock_version<T: Any>(&self, version: Option<Version>) {
        self.lock_version_id(TypeId::of::<T>(), version);
    }

    /// Always dump values with type `type_id` with the dumper of `version`.
    pub fn lock_version_id(&self, type_id: TypeId, version: Option<Version>) {
        self.version_lock.write().insert(type_id, version);
    }

    /// Remove the version lock of `T`.
    pub fn unlock_version<T: Any>(&self) {
        self.version_lock.write().remove(&TypeId::of::<T>());
    }

    /// The locked version of `T`, if locked.
    #[must_use]
    pub fn locked_version<T: Any>(&self) -> Option<Option<Version>> {
        self.version_lock.read().get(&TypeId::of::<T>()).copied()
    }

    /// Convert `item` into a form that can be written.
    ///
    /// - Hard links, soft links, stored nodes and arrays are returned unchanged.
    /// - Delayed containers are tracked and returned unchanged.
    /// - Containers are returned with the members of non on-demand groups dumped.
    /// - Native values are dumped by the first registry with a dumper for their exact type.
    ///   The dumper version is the locked version if the type is locked, otherwise the unversioned dumper or the largest version.
    ///   The resulting container is stamped with the registry name, dumper label and version.
    ///
    /// # Errors
    /// Returns [`PreserveError::NotDumpable`] if no registry can dump a value or `item` is an on-demand wrapper,
    /// [`PreserveError::NoSuchVersion`] if a locked version has no dumper,
    /// [`PreserveError::InvalidDumperOutput`] if a dumper does not return a container,
    /// or any error of a dumper.
    pub fn dump(&self, item: Item) -> Result<Item, PreserveError> {
        match item {
            Item::HardLink(_) | Item::SoftLink(_) | Item::Node(_) | Item::Array(_) => Ok(item),
            Item::Delayed(delayed) => {
                self.track_delayed(&delayed);
                Ok(Item::Delayed(delayed))
            }
            Item::Container(container) => Ok(Item::Container(self.dump_members(container)?)),
            Item::Native(native) => {
                let container = self.convert(&native)?;
                Ok(Item::Container(self.dump_members(container)?))
            }
            Item::OnDemand(_) => Err(PreserveError::NotDumpable(item.kind().to_string())),
        }
    }

    fn dump_members(&self, container: Container) -> Result<Container, PreserveError> {
        match container {
            Container::Group(group) if !group.is_on_demand() => Ok(Container::Group(
                group.try_map_members(|_, member| self.dump(member))?,
            )),
            container => Ok(container),
        }
    }

    fn convert(&self, native: &NativeValue) -> Result<Container, PreserveError> {
        let type_id = native.type_id();
        let type_name = native.type_name();
        let (registry, dumpers) = self
            .registries
            .iter()
            .find_map(|registry| registry.dumpers(type_id).map(|dumpers| (registry, dumpers)))
            .ok_or_else(|| PreserveError::NotDumpable(type_name.to_string()))?;

        let locked = self.version_lock.read().get(&type_id).copied();
        let (version, dumper) = match locked {
            Some(version) => (
                version,
                dumpers
                    .get(version)
                    .ok_or_else(|| PreserveError::NoSuchVersion {
                        type_name: type_name.to_string(),
                        version: version.into(),
                    })?,
            ),
            None => dumpers
                .default_version()
                .ok_or_else(|| PreserveError::NotDumpable(type_name.to_string()))?,
        };
        tracing::debug!(
            namespace = registry.name(),
            label = dumper.label(),
            version = ?version,
            locked = locked.is_some(),
            "dumping {type_name}"
        );

        match dumper.dump(native.as_any())? {
            Item::Container(mut container) => {
                container.set_provenance(Provenance::stamped(
                    registry.name(),
                    dumper.label(),
                    version,
                ));
                Ok(container)
            }
            _ => Err(PreserveError::InvalidDumperOutput {
                label: dumper.label().to_string(),
                version: version.into(),
            }),
        }
    }

    /// Convert a container back into the value it was dumped from.
    ///
    /// - On-demand wrappers are returned unchanged.
    /// - The members of a group are loaded before the group itself.
    /// - Unstamped containers are returned with their members loaded.
    /// - Stamped containers are passed to the loader selected by [`Registry::select_loader`], and its result is returned unchecked.
    ///
    /// # Errors
    /// Returns [`PreserveError::NotLoadable`] if `item` or a group member is not a container,
    /// [`PreserveError::UnknownNamespace`] if no registry has the namespace of a container,
    /// [`PreserveError::LabelNotInNamespace`] or [`PreserveError::NoSuitableLoader`] if there is no loader,
    /// or any error of a loader.
    pub fn load(&self, item: Item) -> Result<Item, PreserveError> {
        let container = match item {
            Item::OnDemand(_) => return Ok(item),
            Item::Container(container) => container,
            item => return Err(PreserveError::NotLoadable(item.kind().to_string())),
        };
        let container = match container {
            Container::Group(group) => {
                Container::Group(group.try_map_members(|_, member| self.load(member))?)
            }
            dataset @ Container::Dataset(_) => dataset,
        };

        let provenance = container.provenance();
        let Some(namespace) = provenance.namespace() else {
            return Ok(Item::Container(container));
        };
        let registry = self
            .get_by_name(namespace)
            .ok_or_else(|| PreserveError::UnknownNamespace(namespace.to_string()))?;
        let label = provenance.label().unwrap_or_default();
        let version = provenance.version();
        let (selector, loader) = registry.select_loader(label, version)?;
        tracing::debug!(
            namespace,
            label,
            version = ?version,
            %selector,
            "loading"
        );
        loader(container)
    }

    pub(crate) fn track_delayed(&self, delayed: &DelayedContainer) {
        let mut delayed_refs = self.delayed_refs.lock();
        delayed_refs.push(delayed.downgrade());
        tracing::debug!("number of delayed containers is {}", delayed_refs.len());
    }

    /// Warn about delayed containers dumped by this container that were never written.
    ///
    /// Dropped and written containers are no longer tracked afterwards.
    /// Returns the number of unwritten delayed containers.
    pub fn warn_delayed(&self) -> usize {
        let mut delayed_refs = self.delayed_refs.lock();
        tracing::debug!(
            "number of delayed containers on close is {}",
            delayed_refs.len()
        );
        let mut unwritten = 0;
        delayed_refs.retain(|delayed| {
            let Some(state) = delayed.upgrade() else {
                return false;
            };
            let state = state.lock();
            if state.is_written() {
                return false;
            }
            unwritten += 1;
            match state.location_path() {
                Some(location) => tracing::warn!("delayed container {location} has not been written"),
                None => tracing::warn!("delayed container without a location has not been written"),
            }
            true
        });
        unwritten
    }
}

impl Clone for RegistryContainer {
    /// Clone the registries and version locks. Delayed containers are not tracked by the clone.
    fn clone(&self) -> Self {
        Self {
            registries: self.registries.clone(),
            version_lock: RwLock::new(self.version_lock.read().clone()),
            delayed_refs: Mutex::default(),
        }
    }
}

impl std::fmt::Debug for RegistryContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.registries.iter().map(|registry| registry.name()))
            .finish()
    }
}

impl Add for RegistryContainer {
    type Output = RegistryContainer;

    /// Concatenate the registries of two containers into a new container.
    fn add(self, other: RegistryContainer) -> RegistryContainer {
        &self + &other
    }
}

impl Add for &RegistryContainer {
    type Output = RegistryContainer;

    fn add(self, other: &RegistryContainer) -> RegistryContainer {
        let mut container = RegistryContainer::from_registries(self.registries.iter().cloned());
        container.extend(other.registries.iter().cloned());
        container
    }
}

impl FromIterator<Registry> for RegistryContainer {
    fn from_iter<T: IntoIterator<Item = Registry>>(iter: T) -> Self {
        Self::from_registries(iter)
    }
}

impl<'a> IntoIterator for &'a RegistryContainer {
    type Item = &'a Arc<Registry>;
    type IntoIter = std::slice::Iter<'a, Arc<Registry>>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::{
        container::{DatasetContainer, GroupContainer},
        version::VersionSelector,
    };

    use super::*;

    #[derive(Debug, PartialEq)]
    struct Point(i64, i64);

    fn point_registry(name: &str, label: &str, versions: &[Option<Version>]) -> Registry {
        let mut registry = Registry::new(name);
        for version in versions {
            registry
                .dumper::<Point, _>(label, *version, |point| {
                    Ok(DatasetContainer::with_data(json!([point.0, point.1])).into())
                })
                .unwrap();
        }
        registry
            .loader(label, VersionSelector::Any, |container| {
                let data = container
                    .as_dataset()
                    .and_then(|dataset| dataset.data()?.as_value().cloned())
                    .ok_or("missing data")?;
                let x = data[0].as_i64().ok_or("invalid x")?;
                let y = data[1].as_i64().ok_or("invalid y")?;
                Ok(Item::native(Point(x, y)))
            })
            .unwrap();
        registry
    }

    fn dumped_provenance(container: &RegistryContainer) -> Result<Provenance, PreserveError> {
        let item = container.dump(Item::native(Point(3, 4)))?;
        Ok(item.as_container().unwrap().provenance().clone())
    }

    #[test]
    fn dump_stamps_provenance() -> Result<(), PreserveError> {
        let container = RegistryContainer::from_registries([point_registry("R", "Point", &[Some(1)])]);
        let provenance = dumped_provenance(&container)?;
        assert_eq!(provenance, Provenance::stamped("R", "Point", Some(1)));
        Ok(())
    }

    #[test]
    fn dump_version_lock() -> Result<(), PreserveError> {
        let versions = [Some(1), Some(2), Some(5)];
        let container = RegistryContainer::from_registries([point_registry("R", "Point", &versions)]);
        assert_eq!(dumped_provenance(&container)?.version(), Some(5));

        container.lock_version::<Point>(Some(2));
        assert_eq!(container.locked_version::<Point>(), Some(Some(2)));
        assert_eq!(dumped_provenance(&container)?.version(), Some(2));

        container.lock_version::<Point>(Some(10));
        assert!(matches!(
            dumped_provenance(&container),
            Err(PreserveError::NoSuchVersion { .. })
        ));

        container.unlock_version::<Point>();
        assert_eq!(dumped_provenance(&container)?.version(), Some(5));
        Ok(())
    }

    #[test]
    fn dump_first_registry_wins() -> Result<(), PreserveError> {
        let a = Arc::new(point_registry("A", "PointA", &[None]));
        let b = Arc::new(point_registry("B", "PointB", &[None]));
        let container = RegistryContainer::from_registries([a.clone(), b.clone()]);
        assert_eq!(dumped_provenance(&container)?.label(), Some("PointA"));
        let container = RegistryContainer::from_registries([b, a]);
        assert_eq!(dumped_provenance(&container)?.label(), Some("PointB"));
        Ok(())
    }

    #[test]
    fn dump_errors() {
        let mut registry = Registry::new("R");
        registry
            .dumper::<Point, _>("Point", None, |_| Ok(Item::native(0_u8)))
            .unwrap();
        let container = RegistryContainer::from_registries([registry]);
        assert!(matches!(
            container.dump(Item::native(Point(0, 0))),
            Err(PreserveError::InvalidDumperOutput { .. })
        ));
        assert!(matches!(
            container.dump(Item::native(0_u8)),
            Err(PreserveError::NotDumpable(_))
        ));
    }

    #[test]
    fn dump_recurses_into_groups() -> Result<(), PreserveError> {
        let container = RegistryContainer::from_registries([point_registry("R", "Point", &[None])]);
        let group = GroupContainer::new()
            .with_member("p", Item::native(Point(1, 2)))
            .with_member("nested", GroupContainer::new().with_member("q", Item::native(Point(3, 4))));
        let dumped = container.dump(group.into())?.into_container().unwrap();
        let group = dumped.into_group().unwrap();
        assert!(!group.provenance().is_stamped());
        let Some(Item::Container(p)) = group.get("p") else {
            panic!("p was not dumped");
        };
        assert_eq!(p.provenance().label(), Some("Point"));
        let Some(Item::Container(Container::Group(nested))) = group.get("nested") else {
            panic!("nested was not kept");
        };
        assert!(matches!(nested.get("q"), Some(Item::Container(_))));
        Ok(())
    }

    #[test]
    fn load_round_trip() -> Result<(), PreserveError> {
        let container = RegistryContainer::from_registries([point_registry("R", "Point", &[Some(1)])]);
        let dumped = container.dump(Item::native(Point(3, 4)))?;
        let loaded = container.load(dumped)?;
        assert_eq!(loaded.downcast_ref::<Point>(), Some(&Point(3, 4)));
        Ok(())
    }

    #[test]
    fn load_errors() -> Result<(), PreserveError> {
        let container = RegistryContainer::from_registries([point_registry("R", "Point", &[None])]);
        assert!(matches!(
            container.load(Item::native(0_u8)),
            Err(PreserveError::NotLoadable(_))
        ));

        let mut dataset = DatasetContainer::new();
        dataset.set_provenance(Provenance::stamped("S", "Point", None));
        assert!(matches!(
            container.load(dataset.clone().into()),
            Err(PreserveError::UnknownNamespace(_))
        ));

        dataset.set_provenance(Provenance::stamped("R", "Line", None));
        assert!(matches!(
            container.load(dataset.into()),
            Err(PreserveError::LabelNotInNamespace { .. })
        ));

        let unstamped = container.load(DatasetContainer::with_data(json!(1)).into())?;
        assert!(matches!(unstamped, Item::Container(Container::Dataset(_))));
        Ok(())
    }

    #[test]
    fn registry_sequence() {
        let mut container = RegistryContainer::new();
        container.push(Registry::new("A"));
        container.push(Registry::new("B"));
        container.insert(0, Registry::new("C"));
        let names = |container: &RegistryContainer| {
            container
                .iter()
                .map(|registry| registry.name().to_string())
                .collect::<Vec<_>>()
        };
        assert_eq!(names(&container), ["C", "A", "B"]);

        let mut replacement = Registry::new("A");
        replacement.freeze();
        container.push(replacement);
        assert_eq!(names(&container), ["C", "A", "B"]);
        assert!(container.get(1).unwrap().is_frozen());

        assert_eq!(container.remove(0).unwrap().name(), "C");
        assert!(container.remove(5).is_none());
        assert!(container.contains_namespace("B"));
        assert!(!container.contains_namespace("C"));

        let other = RegistryContainer::from_registries([Registry::new("D")]);
        let sum = &container + &other;
        assert_eq!(names(&sum), ["A", "B", "D"]);
        assert_eq!(container.len(), 2);
    }

    #[test]
    fn delayed_tracking() -> Result<(), PreserveError> {
        let container = RegistryContainer::new();
        let written = DelayedContainer::new();
        let unwritten = DelayedContainer::new();
        container.dump(written.clone().into())?;
        container.dump(unwritten.clone().into())?;
        {
            let dropped = DelayedContainer::new();
            container.dump(dropped.into())?;
        }
        written.write_container(Item::native(()))?;
        assert_eq!(container.warn_delayed(), 1);
        unwritten.write_container(Item::native(()))?;
        assert_eq!(container.warn_delayed(), 0);
        Ok(())
    }
}
