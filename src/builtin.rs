//! Builtin registries.
//!
//! The builtin registries handle values every file can hold, and are placed ahead of user registries by [`new_registry_list`].

use crate::{
    container::DatasetContainer,
    item::Item,
    registry::Registry,
    registry_container::RegistryContainer,
    version::VersionSelector,
};

/// The namespace of the registry handling the unit value.
pub const UNIT_NAMESPACE: &str = "builtin: unit";

/// The label stamped on the unit value.
pub const UNIT_LABEL: &str = "None";

fn unit_registry() -> Registry {
    let mut registry = Registry::new(UNIT_NAMESPACE);
    registry.insert_dumper::<(), _>(UNIT_LABEL, None, |_| Ok(DatasetContainer::new().into()));
    registry.insert_loader(UNIT_LABEL, VersionSelector::Unversioned, |_container| {
        Ok(Item::native(()))
    });
    registry.freeze();
    registry
}

/// Create the builtin registries.
///
/// Every call returns new registries.
#[must_use]
pub fn builtin_registries() -> Vec<Registry> {
    vec![unit_registry()]
}

/// Returns true if `namespace` is the name of a builtin registry.
#[must_use]
pub fn is_builtin(namespace: &str) -> bool {
    namespace == UNIT_NAMESPACE
}

/// Create a [`RegistryContainer`] holding the builtin registries followed by `registries`.
#[must_use]
pub fn new_registry_list(registries: impl IntoIterator<Item = Registry>) -> RegistryContainer {
    let mut container = RegistryContainer::from_registries(builtin_registries());
    container.extend(registries);
    container
}
