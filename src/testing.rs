//! Helpers for testing dumpers and loaders against every version.
//!
//! Each helper returns copies of a [`RegistryContainer`] with different version locks,
//! so a test can round trip values through every combination of dumper versions.
//!
//! ```
//! # use hpreserve::{builtin::new_registry_list, container::DatasetContainer, item::Item, registry::Registry, testing::single_locked};
//! let mut registry = Registry::new("R");
//! for version in [1, 2] {
//!     registry.dumper::<u8, _>("u8", Some(version), |value| {
//!         Ok(DatasetContainer::with_data(*value).into())
//!     })?;
//! }
//! let registries = new_registry_list([registry]);
//! let versions: Vec<_> = single_locked(&registries, true)
//!     .map(|locked| locked.locked_version::<u8>())
//!     .collect();
//! assert_eq!(versions, [Some(Some(1)), Some(Some(2))]);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::any::TypeId;

use itertools::Itertools;

use crate::{builtin::is_builtin, registry_container::RegistryContainer, version::Version};

/// The dumpable types of `container` and the versions of the dumpers each type is dumped with.
///
/// Only the first registry with a dumper for a type is considered.
fn type_versions(
    container: &RegistryContainer,
    skip_builtin: bool,
) -> Vec<(TypeId, Vec<Option<Version>>)> {
    let mut seen = Vec::new();
    let mut types = Vec::new();
    for registry in container {
        let mut dumped: Vec<_> = registry.dumped_types().collect();
        dumped.sort_by_key(|(_, dumpers)| dumpers.type_name());
        for (type_id, dumpers) in dumped {
            if seen.contains(&type_id) {
                continue;
            }
            seen.push(type_id);
            if !(skip_builtin && is_builtin(registry.name())) {
                types.push((type_id, dumpers.versions().collect()));
            }
        }
    }
    types
}

/// Yield one copy of `container` per dumpable type and dumper version, with only that version locked.
///
/// Types of builtin registries are skipped if `skip_builtin` is true.
pub fn single_locked(
    container: &RegistryContainer,
    skip_builtin: bool,
) -> impl Iterator<Item = RegistryContainer> + '_ {
    type_versions(container, skip_builtin)
        .into_iter()
        .flat_map(|(type_id, versions)| {
            versions.into_iter().map(move |version| (type_id, version))
        })
        .map(|(type_id, version)| {
            let locked = container.clone();
            locked.lock_version_id(type_id, version);
            locked
        })
}

/// Yield one copy of `container` per combination of dumper versions across every dumpable type.
///
/// Types of builtin registries are skipped if `skip_builtin` is true.
pub fn all_locked(
    container: &RegistryContainer,
    skip_builtin: bool,
) -> impl Iterator<Item = RegistryContainer> + '_ {
    let types = type_versions(container, skip_builtin);
    let type_ids: Vec<TypeId> = types.iter().map(|(type_id, _)| *type_id).collect();
    types
        .into_iter()
        .map(|(_, versions)| versions)
        .multi_cartesian_product()
        .map(move |versions| {
            let locked = container.clone();
            for (type_id, version) in type_ids.iter().zip(versions) {
                locked.lock_version_id(*type_id, version);
            }
            locked
        })
}
