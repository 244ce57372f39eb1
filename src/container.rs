//! Containers.
//!
//! A container is the in-memory form of a stored node: a [`GroupContainer`] holds named members, a [`DatasetContainer`] holds dataset options.
//! Both carry attributes, a [`Provenance`] stamped when they are dumped, and an on-demand flag.
//!
//! The provenance and on-demand flag are stored in the reserved attributes [`ATTR_NAMESPACE`], [`ATTR_LABEL`], [`ATTR_VERSION`] and [`ATTR_ON_DEMAND`].

mod dataset_container;
mod group_container;

pub use dataset_container::{
    infer_dtype, infer_shape, DatasetContainer, DatasetValue, InvalidDatasetOptionError,
    ALLOWED_DATASET_KEYS,
};
pub use group_container::GroupContainer;

use serde_json::Value;

use crate::{
    storage::Attributes,
    version::{Version, VersionSelector},
};

/// The attribute holding the namespace of a stored node.
pub const ATTR_NAMESPACE: &str = "_hpreserve_namespace";

/// The attribute holding the label of a stored node.
pub const ATTR_LABEL: &str = "_hpreserve_label";

/// The attribute holding the version of a stored node.
pub const ATTR_VERSION: &str = "_hpreserve_version";

/// The attribute flagging a stored node as on-demand.
pub const ATTR_ON_DEMAND: &str = "_hpreserve_on_demand";

/// The attributes reserved for provenance. They cannot be set by users.
pub const RESERVED_ATTRIBUTES: [&str; 4] = [ATTR_NAMESPACE, ATTR_LABEL, ATTR_VERSION, ATTR_ON_DEMAND];

/// Returns true if `value` can be stored as an attribute.
///
/// Numbers, strings, booleans and (nested) arrays of these are writable.
#[must_use]
pub fn is_attribute_writable(value: &Value) -> bool {
    match value {
        Value::Bool(_) | Value::Number(_) | Value::String(_) => true,
        Value::Array(elements) => elements.iter().all(is_attribute_writable),
        Value::Null | Value::Object(_) => false,
    }
}

/// Where a container came from: the registry, label and version of its dumper.
///
/// A container is unstamped until it is dumped.
/// A stamped container always has a label.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Provenance {
    namespace: Option<String>,
    label: Option<String>,
    version: Option<Version>,
}

impl Provenance {
    /// Create a stamped provenance.
    #[must_use]
    pub fn stamped(namespace: &str, label: &str, version: Option<Version>) -> Self {
        Self {
            namespace: Some(namespace.to_string()),
            label: Some(label.to_string()),
            version,
        }
    }

    /// Remove the provenance attributes from `attributes`.
    ///
    /// Attributes of an unexpected type are dropped.
    #[must_use]
    pub fn take_from_attributes(attributes: &mut Attributes) -> Self {
        let take_string = |attributes: &mut Attributes, key: &str| match attributes.remove(key) {
            Some(Value::String(string)) => Some(string),
            _ => None,
        };
        let namespace = take_string(attributes, ATTR_NAMESPACE);
        let label = take_string(attributes, ATTR_LABEL);
        let version = attributes
            .remove(ATTR_VERSION)
            .as_ref()
            .and_then(Value::as_u64);
        Self {
            namespace,
            label,
            version,
        }
    }

    /// Write the provenance into `attributes`, skipping unset fields.
    pub fn write_to_attributes(&self, attributes: &mut Attributes) {
        if let Some(label) = &self.label {
            attributes.insert(ATTR_LABEL.to_string(), Value::from(label.as_str()));
        }
        if let Some(namespace) = &self.namespace {
            attributes.insert(ATTR_NAMESPACE.to_string(), Value::from(namespace.as_str()));
        }
        if let Some(version) = self.version {
            attributes.insert(ATTR_VERSION.to_string(), Value::from(version));
        }
    }

    /// The namespace, which is the name of the registry of the dumper.
    #[must_use]
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// The label of the dumper.
    #[must_use]
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// The version of the dumper.
    #[must_use]
    pub fn version(&self) -> Option<Version> {
        self.version
    }

    /// The version of the dumper as a [`VersionSelector`].
    #[must_use]
    pub fn version_selector(&self) -> VersionSelector {
        self.version.into()
    }

    /// Returns true if the container has been stamped by a dumper.
    #[must_use]
    pub fn is_stamped(&self) -> bool {
        self.namespace.is_some()
    }
}

/// Remove the on-demand flag from `attributes`.
pub(crate) fn take_on_demand(attributes: &mut Attributes) -> bool {
    match attributes.remove(ATTR_ON_DEMAND) {
        Some(Value::Bool(flag)) => flag,
        Some(Value::Number(number)) => number.as_u64().is_some_and(|number| number != 0),
        _ => false,
    }
}

/// A group or a dataset.
#[derive(Debug)]
pub enum Container {
    /// A group.
    Group(GroupContainer),
    /// A dataset.
    Dataset(DatasetContainer),
}

impl Container {
    /// The attributes, excluding the reserved attributes.
    #[must_use]
    pub fn attrs(&self) -> &Attributes {
        match self {
            Self::Group(group) => group.attrs(),
            Self::Dataset(dataset) => dataset.attrs(),
        }
    }

    /// Mutable access to the attributes.
    pub fn attrs_mut(&mut self) -> &mut Attributes {
        match self {
            Self::Group(group) => group.attrs_mut(),
            Self::Dataset(dataset) => dataset.attrs_mut(),
        }
    }

    /// The provenance.
    #[must_use]
    pub fn provenance(&self) -> &Provenance {
        match self {
            Self::Group(group) => group.provenance(),
            Self::Dataset(dataset) => dataset.provenance(),
        }
    }

    /// Replace the provenance.
    pub fn set_provenance(&mut self, provenance: Provenance) {
        match self {
            Self::Group(group) => group.set_provenance(provenance),
            Self::Dataset(dataset) => dataset.set_provenance(provenance),
        }
    }

    /// Returns true if the members or data of the container are materialised on demand.
    #[must_use]
    pub fn is_on_demand(&self) -> bool {
        match self {
            Self::Group(group) => group.is_on_demand(),
            Self::Dataset(dataset) => dataset.is_on_demand(),
        }
    }

    /// The number of members of a group, or options of a dataset.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Group(group) => group.len(),
            Self::Dataset(dataset) => dataset.len(),
        }
    }

    /// Returns true if the container has no members or options.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true if the container has the member or option `key`.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        match self {
            Self::Group(group) => group.contains_key(key),
            Self::Dataset(dataset) => dataset.contains_key(key),
        }
    }

    /// The member names of a group, or option names of a dataset.
    #[must_use]
    pub fn keys(&self) -> Vec<&str> {
        match self {
            Self::Group(group) => group.keys().collect(),
            Self::Dataset(dataset) => dataset.keys().collect(),
        }
    }

    /// Returns the group, if this is a group.
    #[must_use]
    pub fn as_group(&self) -> Option<&GroupContainer> {
        match self {
            Self::Group(group) => Some(group),
            Self::Dataset(_) => None,
        }
    }

    /// Returns the dataset, if this is a dataset.
    #[must_use]
    pub fn as_dataset(&self) -> Option<&DatasetContainer> {
        match self {
            Self::Group(_) => None,
            Self::Dataset(dataset) => Some(dataset),
        }
    }

    /// Convert into a group, or return `self` if it is not a group.
    ///
    /// # Errors
    /// Returns the container unchanged if it is a dataset.
    pub fn into_group(self) -> Result<GroupContainer, Self> {
        match self {
            Self::Group(group) => Ok(group),
            dataset @ Self::Dataset(_) => Err(dataset),
        }
    }

    /// Convert into a dataset, or return `self` if it is not a dataset.
    ///
    /// # Errors
    /// Returns the container unchanged if it is a group.
    pub fn into_dataset(self) -> Result<DatasetContainer, Self> {
        match self {
            Self::Dataset(dataset) => Ok(dataset),
            group @ Self::Group(_) => Err(group),
        }
    }
}

impl From<GroupContainer> for Container {
    fn from(group: GroupContainer) -> Self {
        Self::Group(group)
    }
}

impl From<DatasetContainer> for Container {
    fn from(dataset: DatasetContainer) -> Self {
        Self::Dataset(dataset)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn attribute_writability() {
        assert!(is_attribute_writable(&json!(1)));
        assert!(is_attribute_writable(&json!("a")));
        assert!(is_attribute_writable(&json!([[1.5, 2.0], [3.0, 4.0]])));
        assert!(!is_attribute_writable(&json!(null)));
        assert!(!is_attribute_writable(&json!({"a": 1})));
        assert!(!is_attribute_writable(&json!([1, null])));
    }

    #[test]
    fn provenance_attributes() {
        let provenance = Provenance::stamped("R", "Point", Some(1));
        let mut attributes = Attributes::new();
        attributes.insert("units".to_string(), json!("m"));
        provenance.write_to_attributes(&mut attributes);
        attributes.insert(ATTR_ON_DEMAND.to_string(), json!(true));
        assert_eq!(attributes.len(), 5);

        assert_eq!(Provenance::take_from_attributes(&mut attributes), provenance);
        assert!(take_on_demand(&mut attributes));
        assert_eq!(attributes.len(), 1);
        assert!(Provenance::take_from_attributes(&mut attributes) == Provenance::default());
    }

    #[test]
    fn container_accessors() {
        let mut container = Container::from(DatasetContainer::with_data(json!([3, 4])));
        container.set_provenance(Provenance::stamped("R", "Point", Some(1)));
        assert_eq!(container.provenance().label(), Some("Point"));
        assert_eq!(container.keys(), ["data"]);
        assert!(container.as_group().is_none());
        assert!(container.into_group().is_err());
    }
}
