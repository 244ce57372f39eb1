//! Registries of dumpers and loaders.
//!
//! A [`Registry`] holds the conversion knowledge for a family of types:
//! dumpers keyed by the exact type they convert and a version, and loaders keyed by label and [`VersionSelector`].
//!
//! Types are identified by their [`TypeId`], so a dumper registered for `T` is only used for values of type exactly `T`.
//!
//! ```
//! # use hpreserve::{container::DatasetContainer, registry::Registry, version::VersionSelector, item::Item};
//! struct Point(i64, i64);
//!
//! let mut registry = Registry::new("R");
//! registry.dumper::<Point, _>("Point", Some(1), |point| {
//!     Ok(DatasetContainer::with_data(vec![point.0, point.1]).into())
//! })?;
//! registry.loader("Point", VersionSelector::Version(1), |_container| {
//!     Ok(Item::native(Point(0, 0)))
//! })?;
//! registry.freeze();
//! assert!(registry.dumper::<Point, _>("Point", Some(2), |_| Err("unused".into())).is_err());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::{
    any::{Any, TypeId},
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use thiserror::Error;

use crate::{
    container::{Container, GroupContainer},
    error::PreserveError,
    item::Item,
    on_demand::{OnDemandHook, OnDemandSource},
    version::{Version, VersionSelector},
};

/// A type-erased dump function.
pub type DumpFn = Arc<dyn Fn(&dyn Any) -> Result<Item, PreserveError> + Send + Sync>;

/// A load function.
pub type LoadFn = Arc<dyn Fn(Container) -> Result<Item, PreserveError> + Send + Sync>;

/// Registration on a frozen registry.
#[derive(Debug, Error)]
#[error("registry {0} is frozen")]
pub struct RegistryFrozenError(String);

/// A dump function and the label it stamps.
#[derive(Clone)]
pub struct Dumper {
    label: String,
    func: DumpFn,
}

impl Dumper {
    /// The label stamped on dumped containers.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Dump `value`.
    ///
    /// # Errors
    /// Returns any error of the dump function.
    pub fn dump(&self, value: &dyn Any) -> Result<Item, PreserveError> {
        (self.func)(value)
    }
}

impl std::fmt::Debug for Dumper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dumper")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

/// The dumpers of one type, by version.
#[derive(Clone, Debug)]
pub struct TypeDumpers {
    type_name: &'static str,
    versions: BTreeMap<Option<Version>, Dumper>,
}

impl TypeDumpers {
    /// The name of the type.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// The registered versions, [`None`] first then ascending.
    pub fn versions(&self) -> impl Iterator<Item = Option<Version>> + '_ {
        self.versions.keys().copied()
    }

    /// The dumper for `version`.
    #[must_use]
    pub fn get(&self, version: Option<Version>) -> Option<&Dumper> {
        self.versions.get(&version)
    }

    /// The version used without a version lock: unversioned if registered, else the largest version.
    #[must_use]
    pub fn default_version(&self) -> Option<(Option<Version>, &Dumper)> {
        self.versions
            .get_key_value(&None)
            .or_else(|| self.versions.last_key_value())
            .map(|(version, dumper)| (*version, dumper))
    }
}

/// A registry of dumpers and loaders, identified by its name.
///
/// The name is stamped as the namespace of every container dumped by the registry.
pub struct Registry {
    name: String,
    frozen: bool,
    dumpers: HashMap<TypeId, TypeDumpers>,
    loaders: HashMap<String, HashMap<VersionSelector, LoadFn>>,
}

impl Registry {
    /// Create an empty registry named `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            frozen: false,
            dumpers: HashMap::new(),
            loaders: HashMap::new(),
        }
    }

    /// The name of the registry.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Prevent further registration. Irreversible.
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    /// Returns true if the registry is frozen.
    #[must_use]
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    fn check_frozen(&self) -> Result<(), RegistryFrozenError> {
        if self.frozen {
            Err(RegistryFrozenError(self.name.clone()))
        } else {
            Ok(())
        }
    }

    /// Register a dumper for values of type `T`, replacing any dumper of `T` with the same version.
    ///
    /// `version` is [`None`] for an unversioned dumper, which is preferred over versioned dumpers unless the version is locked.
    /// The dumper must return a [`Container`] item.
    ///
    /// # Errors
    /// Returns [`RegistryFrozenError`] if the registry is frozen.
    pub fn dumper<T, F>(
        &mut self,
        label: &str,
        version: Option<Version>,
        dumper: F,
    ) -> Result<(), RegistryFrozenError>
    where
        T: Any,
        F: Fn(&T) -> Result<Item, PreserveError> + Send + Sync + 'static,
    {
        self.check_frozen()?;
        self.insert_dumper::<T, F>(label, version, dumper);
        Ok(())
    }

    pub(crate) fn insert_dumper<T, F>(&mut self, label: &str, version: Option<Version>, dumper: F)
    where
        T: Any,
        F: Fn(&T) -> Result<Item, PreserveError> + Send + Sync + 'static,
    {
        let type_name = std::any::type_name::<T>();
        let func: DumpFn = Arc::new(move |value: &dyn Any| match value.downcast_ref::<T>() {
            Some(value) => dumper(value),
            None => Err(PreserveError::NotDumpable(type_name.to_string())),
        });
        self.dumpers
            .entry(TypeId::of::<T>())
            .or_insert_with(|| TypeDumpers {
                type_name,
                versions: BTreeMap::new(),
            })
            .versions
            .insert(
                version,
                Dumper {
                    label: label.to_string(),
                    func,
                },
            );
    }

    /// Register an on-demand dumper for shared objects of type `T`.
    ///
    /// The dumper is registered for [`Arc<T>`], so values are dumped with `Item::native(Arc::new(value))` and version locks apply to [`Arc<T>`].
    /// The group returned by `dumper` is marked on-demand.
    /// When it is written, the object is attached to the stored group with [`OnDemandSource::attach`], and writes its own members.
    /// The dumped group does not keep the object alive, so the caller holds on to its [`Arc`] until the group is written.
    ///
    /// # Errors
    /// Returns [`RegistryFrozenError`] if the registry is frozen.
    pub fn on_demand_dumper<T, F>(
        &mut self,
        label: &str,
        version: Option<Version>,
        dumper: F,
    ) -> Result<(), RegistryFrozenError>
    where
        T: OnDemandSource + 'static,
        F: Fn(&T) -> Result<GroupContainer, PreserveError> + Send + Sync + 'static,
    {
        self.dumper::<Arc<T>, _>(label, version, move |source| {
            let mut group = dumper(source.as_ref())?;
            group.set_on_demand(true);
            group.set_hook(OnDemandHook::from_source(source));
            Ok(group.into())
        })
    }

    /// Register a loader for containers stamped with `label`, replacing any loader with the same selector.
    ///
    /// # Errors
    /// Returns [`RegistryFrozenError`] if the registry is frozen.
    pub fn loader<F>(
        &mut self,
        label: &str,
        selector: impl Into<VersionSelector>,
        loader: F,
    ) -> Result<(), RegistryFrozenError>
    where
        F: Fn(Container) -> Result<Item, PreserveError> + Send + Sync + 'static,
    {
        self.check_frozen()?;
        self.insert_loader(label, selector.into(), loader);
        Ok(())
    }

    pub(crate) fn insert_loader<F>(&mut self, label: &str, selector: VersionSelector, loader: F)
    where
        F: Fn(Container) -> Result<Item, PreserveError> + Send + Sync + 'static,
    {
        self.loaders
            .entry(label.to_string())
            .or_default()
            .insert(selector, Arc::new(loader));
    }

    /// The dumpers of the type `type_id`.
    #[must_use]
    pub fn dumpers(&self, type_id: TypeId) -> Option<&TypeDumpers> {
        self.dumpers.get(&type_id)
    }

    /// Returns true if the registry has a dumper for `T`.
    #[must_use]
    pub fn has_dumper<T: Any>(&self) -> bool {
        self.dumpers.contains_key(&TypeId::of::<T>())
    }

    /// The types with dumpers.
    pub fn dumped_types(&self) -> impl Iterator<Item = (TypeId, &TypeDumpers)> {
        self.dumpers.iter().map(|(type_id, dumpers)| (*type_id, dumpers))
    }

    /// The labels with loaders.
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.loaders.keys().map(String::as_str)
    }

    /// Returns true if the registry has a loader for `label` and `selector`.
    #[must_use]
    pub fn has_loader(&self, label: &str, selector: VersionSelector) -> bool {
        self.loaders
            .get(label)
            .is_some_and(|loaders| loaders.contains_key(&selector))
    }

    /// Select the loader for a container stamped with `label` and `version`.
    ///
    /// The selectors are tried in order: [`Unversioned`](VersionSelector::Unversioned) (only if `version` is [`None`]),
    /// [`All`](VersionSelector::All), the exact version, [`Any`](VersionSelector::Any).
    ///
    /// # Errors
    /// Returns [`PreserveError::LabelNotInNamespace`] if `label` has no loaders, or [`PreserveError::NoSuitableLoader`] if no selector matches.
    pub fn select_loader(
        &self,
        label: &str,
        version: Option<Version>,
    ) -> Result<(VersionSelector, &LoadFn), PreserveError> {
        let loaders =
            self.loaders
                .get(label)
                .ok_or_else(|| PreserveError::LabelNotInNamespace {
                    label: label.to_string(),
                    namespace: self.name.clone(),
                })?;
        let candidates = [
            version.is_none().then_some(VersionSelector::Unversioned),
            Some(VersionSelector::All),
            version.map(VersionSelector::Version),
            Some(VersionSelector::Any),
        ];
        candidates
            .into_iter()
            .flatten()
            .find_map(|selector| loaders.get(&selector).map(|loader| (selector, loader)))
            .ok_or_else(|| PreserveError::NoSuitableLoader {
                label: label.to_string(),
                version: version.into(),
            })
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut types: Vec<&str> = self.dumpers.values().map(TypeDumpers::type_name).collect();
        types.sort_unstable();
        let mut labels: Vec<&str> = self.labels().collect();
        labels.sort_unstable();
        f.debug_struct("Registry")
            .field("name", &self.name)
            .field("frozen", &self.frozen)
            .field("dumpers", &types)
            .field("loaders", &labels)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::container::DatasetContainer;

    use super::*;

    struct Point;

    fn loader_registry(selectors: &[VersionSelector]) -> Registry {
        let mut registry = Registry::new("R");
        for selector in selectors {
            let selector = *selector;
            registry
                .loader("Point", selector, move |_| Ok(Item::native(selector)))
                .unwrap();
        }
        registry
    }

    fn selected(registry: &Registry, version: Option<Version>) -> Result<VersionSelector, PreserveError> {
        registry.select_loader("Point", version).map(|(selector, _)| selector)
    }

    #[test]
    fn registry_loader_precedence() -> Result<(), PreserveError> {
        use VersionSelector::{All, Any, Unversioned};
        let registry = loader_registry(&[Unversioned, All, VersionSelector::Version(3), Any]);
        assert_eq!(selected(&registry, Some(3))?, All);
        assert_eq!(selected(&registry, None)?, Unversioned);

        let registry = loader_registry(&[Unversioned, VersionSelector::Version(3), Any]);
        assert_eq!(selected(&registry, Some(3))?, VersionSelector::Version(3));
        assert_eq!(selected(&registry, Some(99))?, Any);

        let registry = loader_registry(&[VersionSelector::Version(3)]);
        assert!(matches!(
            selected(&registry, Some(99)),
            Err(PreserveError::NoSuitableLoader { .. })
        ));
        assert!(matches!(
            selected(&registry, None),
            Err(PreserveError::NoSuitableLoader { .. })
        ));
        assert!(matches!(
            registry.select_loader("Line", Some(3)),
            Err(PreserveError::LabelNotInNamespace { .. })
        ));
        Ok(())
    }

    #[test]
    fn registry_default_version() -> Result<(), RegistryFrozenError> {
        let dump = |_: &Point| Ok(DatasetContainer::with_data(json!(0)).into());
        let mut registry = Registry::new("R");
        for version in [2, 5, 1] {
            registry.dumper::<Point, _>("Point", Some(version), dump)?;
        }
        let dumpers = registry.dumpers(TypeId::of::<Point>()).unwrap();
        assert_eq!(dumpers.default_version().unwrap().0, Some(5));
        assert_eq!(dumpers.versions().collect::<Vec<_>>(), [Some(1), Some(2), Some(5)]);

        registry.dumper::<Point, _>("Point", None, dump)?;
        let dumpers = registry.dumpers(TypeId::of::<Point>()).unwrap();
        assert_eq!(dumpers.default_version().unwrap().0, None);
        Ok(())
    }

    #[test]
    fn registry_frozen() -> Result<(), RegistryFrozenError> {
        let mut registry = Registry::new("R");
        registry.freeze();
        assert!(registry.is_frozen());
        assert!(registry
            .dumper::<Point, _>("Point", None, |_| Err("unused".into()))
            .is_err());
        assert!(registry
            .loader("Point", VersionSelector::Any, |_| Err("unused".into()))
            .is_err());
        assert!(!registry.has_dumper::<Point>());
        assert_eq!(registry.labels().count(), 0);
        Ok(())
    }

    #[test]
    fn registry_dumper_downcasts() -> Result<(), Box<dyn std::error::Error>> {
        let mut registry = Registry::new("R");
        registry.dumper::<i32, _>("Int", None, |value| {
            Ok(DatasetContainer::with_data(json!(value)).into())
        })?;
        let dumper = registry.dumpers(TypeId::of::<i32>()).unwrap().get(None).unwrap();
        assert_eq!(dumper.label(), "Int");
        assert!(dumper.dump(&4_i32).is_ok());
        assert!(matches!(
            dumper.dump(&4_i64),
            Err(PreserveError::NotDumpable(_))
        ));
        Ok(())
    }
}
