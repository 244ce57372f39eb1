//! On-demand materialisation.
//!
//! Reading an on-demand group yields [`OnDemandWrapper`]s instead of loaded members, and reading an on-demand dataset yields a wrapper instead of its data.
//! Nothing is read from storage until a wrapper is called.
//!
//! Writing works the other way around.
//! An object dumped with [`Registry::on_demand_dumper`](crate::registry::Registry::on_demand_dumper) is not written wholesale.
//! When its group is created, the object is handed a [`MemberWriter`] bound to that group and pushes its members itself, now or later.
//! The dumped group only observes the object, it does not keep it alive.
//! If the object is dropped before its group is written, writing the group fails.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::{
    error::PreserveError, group::PreserveGroup, item::Item,
};

/// A value materialised each time the wrapper is called.
///
/// Results are not cached; the holder of the wrapper caches if needed.
pub struct OnDemandWrapper<T = Item> {
    thunk: Arc<dyn Fn() -> Result<T, PreserveError> + Send + Sync>,
}

impl<T> OnDemandWrapper<T> {
    /// Create a wrapper around `thunk`.
    pub fn new(thunk: impl Fn() -> Result<T, PreserveError> + Send + Sync + 'static) -> Self {
        Self {
            thunk: Arc::new(thunk),
        }
    }

    /// Materialise the value.
    ///
    /// # Errors
    /// Returns any error of the wrapped thunk, typically a storage or load error.
    pub fn call(&self) -> Result<T, PreserveError> {
        (self.thunk)()
    }
}

impl<T> Clone for OnDemandWrapper<T> {
    fn clone(&self) -> Self {
        Self {
            thunk: self.thunk.clone(),
        }
    }
}

impl<T> std::fmt::Debug for OnDemandWrapper<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("OnDemandWrapper")
    }
}

/// Dumps and writes individual members into a stored group.
#[derive(Clone, Debug)]
pub struct MemberWriter {
    group: PreserveGroup,
}

impl MemberWriter {
    pub(crate) fn new(group: PreserveGroup) -> Self {
        Self { group }
    }

    /// The stored group members are written to.
    #[must_use]
    pub fn group(&self) -> &PreserveGroup {
        &self.group
    }

    /// Dump `item` and write it as member `key`, replacing an existing member.
    ///
    /// A node handle on the member itself leaves the member as it is.
    ///
    /// # Errors
    /// Returns a [`PreserveError`] if the item cannot be dumped or written.
    pub fn write(&self, key: &str, item: Item) -> Result<(), PreserveError> {
        if self.group.contains_key(key)? {
            if let Item::Node(target) = &item {
                let storage = self.group.storage();
                if storage.resolve(target)? == storage.resolve(&self.group.child_path(key)?)? {
                    return Ok(());
                }
            }
            self.group.remove(key)?;
        }
        self.group.set(key, item)
    }
}

/// An object that writes its own members when dumped as an on-demand group.
pub trait OnDemandSource: Send + Sync {
    /// Called once the group of the object has been created.
    ///
    /// Typically the object writes its current members and keeps `writer` to write later updates.
    ///
    /// # Errors
    /// Returns a [`PreserveError`] if writing a member fails.
    fn attach(&self, writer: MemberWriter) -> Result<(), PreserveError>;
}

/// Called with a [`MemberWriter`] when an on-demand group is written.
pub struct OnDemandHook(Box<dyn FnOnce(MemberWriter) -> Result<(), PreserveError> + Send>);

impl OnDemandHook {
    /// Create a hook from a closure.
    pub fn new(hook: impl FnOnce(MemberWriter) -> Result<(), PreserveError> + Send + 'static) -> Self {
        Self(Box::new(hook))
    }

    /// Create a hook which attaches the writer to `source`.
    ///
    /// The hook does not keep `source` alive.
    ///
    /// # Errors
    /// Calling the hook returns [`PreserveError::OnDemandSourceDropped`] if `source` has been dropped.
    #[must_use]
    pub fn from_source<T: OnDemandSource + 'static>(source: &Arc<T>) -> Self {
        let source = Arc::downgrade(source);
        Self::new(move |writer| {
            let path = writer.group().path();
            let Some(source) = source.upgrade() else {
                tracing::debug!(group = %path, "on-demand source is gone");
                return Err(PreserveError::OnDemandSourceDropped(path.to_string()));
            };
            tracing::debug!(group = %path, "attaching on-demand source");
            source.attach(writer)
        })
    }

    pub(crate) fn call(self, writer: MemberWriter) -> Result<(), PreserveError> {
        (self.0)(writer)
    }
}

impl std::fmt::Debug for OnDemandHook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("OnDemandHook")
    }
}

/// Tracks whether an on-demand source has been written, and routes member updates to storage once it has.
#[derive(Debug, Default)]
pub struct OnDemandMembers {
    writer: Mutex<Option<MemberWriter>>,
}

impl OnDemandMembers {
    /// Create members which have not been written.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep `writer` for later updates.
    pub fn attach(&self, writer: MemberWriter) {
        *self.writer.lock() = Some(writer);
    }

    /// Returns true once a writer has been attached.
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.writer.lock().is_some()
    }

    /// The attached writer.
    #[must_use]
    pub fn writer(&self) -> Option<MemberWriter> {
        self.writer.lock().clone()
    }

    /// Prepare the member `key` for storing on the owner.
    ///
    /// Before the owner is written, `item` is returned unchanged.
    /// Afterwards, an on-demand `item` is materialised first, then it is written to storage and a wrapper reading it back is returned.
    /// Wrapping the returned item again rewrites the same member.
    ///
    /// # Errors
    /// Returns a [`PreserveError`] if the item cannot be materialised, dumped or written.
    pub fn wrap(&self, key: &str, item: Item) -> Result<Item, PreserveError> {
        let Some(writer) = self.writer() else {
            return Ok(item);
        };
        let item = match item {
            Item::OnDemand(wrapper) => wrapper.call()?,
            item => item,
        };
        writer.write(key, item)?;
        Ok(Item::OnDemand(writer.group().lazy(key)))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn on_demand_wrapper_is_not_cached() -> Result<(), PreserveError> {
        let calls = Arc::new(AtomicUsize::new(0));
        let wrapper = {
            let calls = calls.clone();
            OnDemandWrapper::new(move || Ok(calls.fetch_add(1, Ordering::SeqCst)))
        };
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(wrapper.call()?, 0);
        assert_eq!(wrapper.clone().call()?, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        Ok(())
    }

    #[test]
    fn on_demand_members_unattached() -> Result<(), PreserveError> {
        let members = OnDemandMembers::new();
        assert!(!members.is_attached());
        let item = members.wrap("x", Item::native(1_u8))?;
        assert_eq!(item.downcast_ref::<u8>(), Some(&1));
        Ok(())
    }
}
