use indexmap::IndexMap;

use crate::{
    error::PreserveError,
    item::Item,
    on_demand::OnDemandHook,
    storage::Attributes,
};

use super::{take_on_demand, Provenance};

/// The in-memory form of a group: named members plus attributes.
///
/// Members keep their insertion order.
#[derive(Debug, Default)]
pub struct GroupContainer {
    attrs: Attributes,
    provenance: Provenance,
    on_demand: bool,
    members: IndexMap<String, Item>,
    hook: Option<OnDemandHook>,
}

impl GroupContainer {
    /// Create an empty group.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty group with attributes.
    ///
    /// Reserved attributes are removed from `attrs` and set the provenance and on-demand flag instead.
    #[must_use]
    pub fn with_attributes(mut attrs: Attributes) -> Self {
        let provenance = Provenance::take_from_attributes(&mut attrs);
        let on_demand = take_on_demand(&mut attrs);
        Self {
            attrs,
            provenance,
            on_demand,
            ..Self::default()
        }
    }

    /// Create an empty on-demand group.
    ///
    /// When written, the members of an on-demand group are not written with it.
    /// Instead, its [`OnDemandHook`] is given a [`MemberWriter`](crate::on_demand::MemberWriter) to write members piecemeal.
    #[must_use]
    pub fn on_demand() -> Self {
        Self {
            on_demand: true,
            ..Self::default()
        }
    }

    /// Add a member, returning `self`.
    #[must_use]
    pub fn with_member(mut self, key: impl Into<String>, item: impl Into<Item>) -> Self {
        self.insert(key, item);
        self
    }

    /// The attributes.
    #[must_use]
    pub fn attrs(&self) -> &Attributes {
        &self.attrs
    }

    /// Mutable access to the attributes.
    pub fn attrs_mut(&mut self) -> &mut Attributes {
        &mut self.attrs
    }

    /// The provenance.
    #[must_use]
    pub fn provenance(&self) -> &Provenance {
        &self.provenance
    }

    /// Replace the provenance.
    pub fn set_provenance(&mut self, provenance: Provenance) {
        self.provenance = provenance;
    }

    /// Returns true if the group is on-demand.
    #[must_use]
    pub fn is_on_demand(&self) -> bool {
        self.on_demand
    }

    /// Set the on-demand flag.
    pub fn set_on_demand(&mut self, on_demand: bool) {
        self.on_demand = on_demand;
    }

    /// Set the hook called with a member writer when the group is written.
    pub fn set_hook(&mut self, hook: OnDemandHook) {
        self.hook = Some(hook);
    }

    /// Remove the on-demand hook.
    pub fn take_hook(&mut self) -> Option<OnDemandHook> {
        self.hook.take()
    }

    /// Insert a member, returning the previous member with the same key.
    pub fn insert(&mut self, key: impl Into<String>, item: impl Into<Item>) -> Option<Item> {
        self.members.insert(key.into(), item.into())
    }

    /// Returns the member `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Item> {
        self.members.get(key)
    }

    /// Returns the member `key` mutably.
    pub fn get_mut(&mut self, key: &str) -> Option<&mut Item> {
        self.members.get_mut(key)
    }

    /// Remove and return the member `key`, preserving the order of the other members.
    pub fn remove(&mut self, key: &str) -> Option<Item> {
        self.members.shift_remove(key)
    }

    /// Returns true if the group has the member `key`.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.members.contains_key(key)
    }

    /// The number of members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Returns true if the group has no members.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// The member names in order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.members.keys().map(String::as_str)
    }

    /// The members in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Item)> {
        self.members.iter().map(|(key, item)| (key.as_str(), item))
    }

    /// Replace every member with the result of `f`, stopping at the first error.
    ///
    /// # Errors
    /// Returns the first error returned by `f`.
    pub fn try_map_members<F>(mut self, mut f: F) -> Result<Self, PreserveError>
    where
        F: FnMut(&str, Item) -> Result<Item, PreserveError>,
    {
        self.members = std::mem::take(&mut self.members)
            .into_iter()
            .map(|(key, item)| {
                let item = f(&key, item)?;
                Ok((key, item))
            })
            .collect::<Result<_, PreserveError>>()?;
        Ok(self)
    }
}

impl IntoIterator for GroupContainer {
    type Item = (String, Item);
    type IntoIter = indexmap::map::IntoIter<String, Item>;

    fn into_iter(self) -> Self::IntoIter {
        self.members.into_iter()
    }
}
