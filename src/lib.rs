//! A rust library for versioned serialisation of native objects into a hierarchy of groups and datasets.
//!
//! Values are converted by **dumpers** into [`Container`](container::Container)s, stamped with the namespace, label and version of the dumper, and written to hierarchy [`storage`].
//! Reading a container back dispatches on its stamp to a **loader**, which rebuilds the value.
//! Dumpers and loaders are held by [`Registry`](registry::Registry)s, and an ordered [`RegistryContainer`](registry_container::RegistryContainer) decides which registry converts what.
//!
//! ## Getting Started
//! - [`registry::Registry`] describes how to register dumpers and loaders, and how versions are selected.
//! - [`group::PreserveFile`] and [`group::PreserveGroup`] read and write values.
//! - [`delayed::DelayedContainer`] and [`on_demand`] cover values that are written after their parent, or read when needed.
//!
//! ## Example
//! ```rust
//! # use hpreserve::{
//! #     builtin::new_registry_list, container::DatasetContainer, group::PreserveFile, item::Item,
//! #     registry::Registry, version::VersionSelector,
//! # };
//! #[derive(Debug, PartialEq)]
//! struct Point(i64, i64);
//!
//! let mut registry = Registry::new("R");
//! registry.dumper::<Point, _>("Point", Some(1), |point| {
//!     Ok(DatasetContainer::with_data(vec![point.0, point.1]).into())
//! })?;
//! registry.loader("Point", VersionSelector::Version(1), |container| {
//!     let data = container.into_dataset().ok().and_then(|dataset| {
//!         dataset.data()?.as_value()?.as_array().cloned()
//!     });
//!     match data.as_deref() {
//!         Some([x, y]) => Ok(Item::native(Point(
//!             x.as_i64().unwrap_or_default(),
//!             y.as_i64().unwrap_or_default(),
//!         ))),
//!         _ => Err("invalid point".into()),
//!     }
//! })?;
//!
//! let file = PreserveFile::in_memory(new_registry_list([registry]))?;
//! file.set("p", Item::native(Point(3, 4)))?;
//! println!("{}", file.hierarchy_tree()?);
//! assert_eq!(file.get("p")?.downcast_ref::<Point>(), Some(&Point(3, 4)));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Logging
//! Dispatch decisions are logged with [`tracing`].
//! Unwritten delayed containers are reported as warnings when a [`PreserveFile`](group::PreserveFile) is closed, see [`config::Config`].
//!
//! ## Licence
//! `hpreserve` is licensed under either of the Apache License, Version 2.0 or the MIT license, at your option.

#![warn(unused_variables)]
#![warn(dead_code)]
#![deny(missing_docs)]
// #![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![deny(clippy::missing_panics_doc)]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

pub mod builtin;
pub mod config;
pub mod container;
pub mod delayed;
pub mod error;
pub mod group;
pub mod hard_link;
pub mod item;
pub mod node;
pub mod on_demand;
pub mod registry;
pub mod registry_container;
pub mod storage;
pub mod testing;
pub mod version;

pub use crate::{
    container::{Container, DatasetContainer, GroupContainer},
    delayed::DelayedContainer,
    error::PreserveError,
    group::{PreserveFile, PreserveGroup},
    hard_link::HardLink,
    item::Item,
    registry::Registry,
    registry_container::RegistryContainer,
    version::{Version, VersionSelector},
};
