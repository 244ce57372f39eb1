use std::{ops::Deref, path::Path, sync::Arc};

use crate::{
    config::global_config,
    error::PreserveError,
    node::NodePath,
    registry_container::RegistryContainer,
    storage::{
        store::{FilesystemStore, MemoryStore},
        HierarchyStorage, StoreHierarchy,
    },
};

use super::PreserveGroup;

/// The root group of a storage session.
///
/// Closing the file, or dropping it, reports delayed containers that were placed but never written.
#[derive(Debug)]
pub struct PreserveFile {
    root: PreserveGroup,
    closed: bool,
}

impl PreserveFile {
    /// Open the root group of `storage`.
    ///
    /// # Errors
    /// Returns a storage error if the root of `storage` is not a group.
    pub fn new(
        storage: HierarchyStorage,
        registries: impl Into<Arc<RegistryContainer>>,
    ) -> Result<Self, PreserveError> {
        let root = PreserveGroup::new(storage, NodePath::root(), registries.into())?;
        Ok(Self {
            root,
            closed: false,
        })
    }

    /// Open a file backed by a [`MemoryStore`].
    ///
    /// # Errors
    /// Returns a [`PreserveError`] if the root group cannot be opened.
    pub fn in_memory(registries: impl Into<Arc<RegistryContainer>>) -> Result<Self, PreserveError> {
        let storage: HierarchyStorage = Arc::new(StoreHierarchy::new(Arc::new(MemoryStore::new())));
        Self::new(storage, registries)
    }

    /// The root group.
    #[must_use]
    pub fn root(&self) -> &PreserveGroup {
        &self.root
    }

    /// Close the file and return the number of delayed containers that were placed but never written.
    pub fn close(mut self) -> usize {
        self.closed = true;
        self.report_delayed()
    }

    fn report_delayed(&self) -> usize {
        if global_config().warn_unwritten_delayed() {
            self.root.registries().warn_delayed()
        } else {
            0
        }
    }
}

impl Deref for PreserveFile {
    type Target = PreserveGroup;

    fn deref(&self) -> &Self::Target {
        &self.root
    }
}

impl Drop for PreserveFile {
    fn drop(&mut self) {
        if !self.closed {
            self.report_delayed();
        }
    }
}

/// Open a file backed by a [`FilesystemStore`] at `base_path`, creating the directory if needed.
///
/// # Errors
/// Returns a [`PreserveError`] if the store cannot be created at `base_path`.
pub fn open<P: AsRef<Path>>(
    base_path: P,
    registries: impl Into<Arc<RegistryContainer>>,
) -> Result<PreserveFile, PreserveError> {
    let store = Arc::new(FilesystemStore::new(base_path)?);
    let storage: HierarchyStorage = Arc::new(StoreHierarchy::new(store));
    PreserveFile::new(storage, registries)
}
