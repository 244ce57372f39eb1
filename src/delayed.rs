//! Delayed writes.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::{error::PreserveError, group::PreserveGroup, item::Item, node::NodePath};

#[derive(Debug, Default)]
pub(crate) struct DelayedState {
    location: Option<(PreserveGroup, String)>,
    written: bool,
}

impl DelayedState {
    pub(crate) fn is_written(&self) -> bool {
        self.written
    }

    pub(crate) fn location_path(&self) -> Option<String> {
        self.location
            .as_ref()
            .map(|(group, key)| format!("{key} in {}", group.path()))
    }
}

/// A placeholder reserving a location for a container that does not exist yet.
///
/// Writing a group holding a [`DelayedContainer`] records the member location instead of writing anything.
/// A later [`write_container`](DelayedContainer::write_container) dumps and writes the value there.
///
/// Clones share the same location and state.
#[derive(Clone, Debug, Default)]
pub struct DelayedContainer {
    state: Arc<Mutex<DelayedState>>,
}

impl DelayedContainer {
    /// Create a delayed container without a location.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Dump `item` and write it to the reserved location.
    ///
    /// If no location has been reserved, nothing is written.
    /// Either way the container is marked written, and later calls are ignored.
    ///
    /// # Errors
    /// Returns a [`PreserveError`] if `item` cannot be dumped or written.
    /// The container is not marked written in that case.
    pub fn write_container(&self, item: Item) -> Result<(), PreserveError> {
        let location = {
            let state = self.state.lock();
            if state.written {
                tracing::debug!(
                    location = state.location_path(),
                    "delayed container already written, ignoring"
                );
                return Ok(());
            }
            state.location.clone()
        };
        match location {
            Some((group, key)) => group.set(&key, item)?,
            None => tracing::debug!("delayed container has no reserved location, nothing written"),
        }
        self.state.lock().written = true;
        Ok(())
    }

    /// Returns true once [`write_container`](DelayedContainer::write_container) has succeeded.
    #[must_use]
    pub fn is_written(&self) -> bool {
        self.state.lock().written
    }

    /// The path of the reserved location, if one has been reserved.
    ///
    /// # Errors
    /// Returns [`PreserveError::NodeName`] if the reserved key is not a valid node name.
    pub fn location(&self) -> Result<Option<NodePath>, PreserveError> {
        let state = self.state.lock();
        state
            .location
            .as_ref()
            .map(|(group, key)| group.child_path(key))
            .transpose()
    }

    pub(crate) fn reserve(&self, group: PreserveGroup, key: &str) {
        self.state.lock().location = Some((group, key.to_string()));
    }

    pub(crate) fn downgrade(&self) -> Weak<Mutex<DelayedState>> {
        Arc::downgrade(&self.state)
    }
}
