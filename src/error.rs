//! Serialisation errors.

use thiserror::Error;

use crate::{
    container::InvalidDatasetOptionError,
    node::{NodeNameError, NodePathError},
    registry::RegistryFrozenError,
    storage::{store::FilesystemStoreCreateError, StorageError},
    version::VersionSelector,
};

/// An error dumping, loading, reading or writing an item.
#[derive(Debug, Error)]
pub enum PreserveError {
    /// No registry has a dumper for the type.
    #[error("{0} is not something that can be dumped")]
    NotDumpable(String),
    /// The version lock of a type names a version without a dumper.
    #[error("{type_name} does not have version {version}")]
    NoSuchVersion {
        /// The name of the type.
        type_name: String,
        /// The locked version.
        version: VersionSelector,
    },
    /// A dumper returned something other than a container.
    #[error("dumper for {label} with version {version} returned an item that is not a container")]
    InvalidDumperOutput {
        /// The label of the dumper.
        label: String,
        /// The version of the dumper.
        version: VersionSelector,
    },
    /// Only containers can be loaded.
    #[error("{0} is not something that can be loaded")]
    NotLoadable(String),
    /// The namespace of a container is not the name of any registry.
    #[error("unknown namespace {0}")]
    UnknownNamespace(String),
    /// The registry has no loader for the label.
    #[error("label {label} not in namespace {namespace}")]
    LabelNotInNamespace {
        /// The label of the container.
        label: String,
        /// The namespace of the container.
        namespace: String,
    },
    /// No loader of the label accepts the version.
    #[error("cannot find suitable loader for label {label} with version {version}")]
    NoSuitableLoader {
        /// The label of the container.
        label: String,
        /// The version of the container.
        version: VersionSelector,
    },
    /// A dataset option outside of the allowed options.
    #[error(transparent)]
    InvalidDatasetOption(#[from] InvalidDatasetOptionError),
    /// An attribute cannot be stored.
    #[error("attribute {name}={value} cannot be written")]
    AttributeNotWritable {
        /// The attribute name.
        name: String,
        /// The attribute value.
        value: String,
    },
    /// A hard link or delayed container has no location.
    #[error("no location defined for {0}")]
    NoReservedLocation(String),
    /// The object of an on-demand group was dropped before the group was written.
    #[error("the on-demand source of {0} has been dropped")]
    OnDemandSourceDropped(String),
    /// The item was not dumped before writing.
    #[error("{0} cannot be written, it has not been dumped")]
    NotWritable(String),
    /// Registration on a frozen registry.
    #[error(transparent)]
    RegistryFrozen(#[from] RegistryFrozenError),
    /// A storage error.
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// The filesystem store could not be created.
    #[error(transparent)]
    FilesystemStoreCreate(#[from] FilesystemStoreCreateError),
    /// An invalid node path.
    #[error(transparent)]
    NodePath(#[from] NodePathError),
    /// An invalid node name.
    #[error(transparent)]
    NodeName(#[from] NodeNameError),
    /// Any other error, typically raised by a dumper or loader.
    #[error("{0}")]
    Other(String),
}

impl From<&str> for PreserveError {
    fn from(err: &str) -> Self {
        Self::Other(err.to_string())
    }
}

impl From<String> for PreserveError {
    fn from(err: String) -> Self {
        Self::Other(err)
    }
}
