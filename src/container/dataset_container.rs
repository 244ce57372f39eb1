use indexmap::IndexMap;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::{error::PreserveError, on_demand::OnDemandWrapper, storage::Attributes};

use super::{take_on_demand, Provenance};

/// The options a dataset container accepts.
pub const ALLOWED_DATASET_KEYS: [&str; 14] = [
    "attrs",
    "shape",
    "dtype",
    "data",
    "chunks",
    "maxshape",
    "fillvalue",
    "size",
    "compression",
    "compression_opts",
    "scaleoffset",
    "shuffle",
    "fletcher32",
    "track_times",
];

/// An option outside of [`ALLOWED_DATASET_KEYS`].
#[derive(Debug, Error)]
#[error("{0} is not a valid dataset option")]
pub struct InvalidDatasetOptionError(String);

impl InvalidDatasetOptionError {
    /// The rejected option.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.0
    }
}

/// The value of a dataset option.
#[derive(Clone, Debug)]
pub enum DatasetValue {
    /// A value.
    Value(Value),
    /// A value read from storage when called.
    OnDemand(OnDemandWrapper<Value>),
}

impl DatasetValue {
    /// Returns the value, unless it is on-demand.
    #[must_use]
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Value(value) => Some(value),
            Self::OnDemand(_) => None,
        }
    }

    /// Returns the value, reading it from storage if it is on-demand.
    ///
    /// # Errors
    /// Returns a [`PreserveError`] if an on-demand value cannot be read.
    pub fn materialise(&self) -> Result<Value, PreserveError> {
        match self {
            Self::Value(value) => Ok(value.clone()),
            Self::OnDemand(wrapper) => wrapper.call(),
        }
    }
}

impl From<Value> for DatasetValue {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl From<OnDemandWrapper<Value>> for DatasetValue {
    fn from(wrapper: OnDemandWrapper<Value>) -> Self {
        Self::OnDemand(wrapper)
    }
}

/// The in-memory form of a dataset: creation options, including the `data` payload, plus attributes.
///
/// Only [`ALLOWED_DATASET_KEYS`] are accepted as options.
/// The `attrs` option replaces the attributes rather than being stored as an option.
#[derive(Clone, Debug, Default)]
pub struct DatasetContainer {
    attrs: Attributes,
    provenance: Provenance,
    on_demand: bool,
    options: IndexMap<String, DatasetValue>,
}

impl DatasetContainer {
    /// Create a dataset without options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a dataset without options with attributes.
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
            options: IndexMap::new(),
        }
    }

    /// Create a dataset holding `data`.
    #[must_use]
    pub fn with_data(data: impl Into<Value>) -> Self {
        let mut dataset = Self::new();
        dataset
            .options
            .insert("data".to_string(), DatasetValue::Value(data.into()));
        dataset
    }

    /// Create a dataset from a map of options.
    ///
    /// # Errors
    /// Returns [`InvalidDatasetOptionError`] if an option is not allowed.
    pub fn from_options(options: Map<String, Value>) -> Result<Self, InvalidDatasetOptionError> {
        let mut dataset = Self::new();
        for (key, value) in options {
            dataset.insert(&key, value)?;
        }
        Ok(dataset)
    }

    /// Set an option, returning `self`.
    ///
    /// # Errors
    /// Returns [`InvalidDatasetOptionError`] if the option is not allowed.
    pub fn with_option(
        mut self,
        key: &str,
        value: impl Into<DatasetValue>,
    ) -> Result<Self, InvalidDatasetOptionError> {
        self.insert(key, value)?;
        Ok(self)
    }

    /// Set an option, returning the previous value of the option.
    ///
    /// Setting `attrs` to an object replaces the attributes.
    ///
    /// # Errors
    /// Returns [`InvalidDatasetOptionError`] if the option is not allowed, or `attrs` is not an object.
    pub fn insert(
        &mut self,
        key: &str,
        value: impl Into<DatasetValue>,
    ) -> Result<Option<DatasetValue>, InvalidDatasetOptionError> {
        if !ALLOWED_DATASET_KEYS.contains(&key) {
            return Err(InvalidDatasetOptionError(key.to_string()));
        }
        match (key, value.into()) {
            ("attrs", DatasetValue::Value(Value::Object(attrs))) => {
                self.attrs = attrs;
                Ok(None)
            }
            ("attrs", _) => Err(InvalidDatasetOptionError(key.to_string())),
            (key, value) => Ok(self.options.insert(key.to_string(), value)),
        }
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

    /// Returns true if the data of the dataset is read on demand.
    #[must_use]
    pub fn is_on_demand(&self) -> bool {
        self.on_demand
    }

    /// Set the on-demand flag.
    pub fn set_on_demand(&mut self, on_demand: bool) {
        self.on_demand = on_demand;
    }

    /// Returns the option `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&DatasetValue> {
        self.options.get(key)
    }

    /// Returns the `data` option.
    #[must_use]
    pub fn data(&self) -> Option<&DatasetValue> {
        self.get("data")
    }

    /// Remove and return the option `key`.
    pub fn remove(&mut self, key: &str) -> Option<DatasetValue> {
        self.options.shift_remove(key)
    }

    /// Returns true if the option `key` is set.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.options.contains_key(key)
    }

    /// The number of options set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.options.len()
    }

    /// Returns true if no options are set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
    }

    /// The names of the options set.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.options.keys().map(String::as_str)
    }

    /// The options set.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &DatasetValue)> {
        self.options.iter().map(|(key, value)| (key.as_str(), value))
    }
}

/// Infer the shape of `data`: the lengths of nested arrays, empty for a scalar.
///
/// Returns [`None`] for `null` and ragged arrays.
#[must_use]
pub fn infer_shape(data: &Value) -> Option<Vec<u64>> {
    match data {
        Value::Null => None,
        Value::Array(elements) => {
            let mut shape = vec![elements.len() as u64];
            if let Some(first) = elements.first() {
                let inner = infer_shape(first)?;
                if elements
                    .iter()
                    .skip(1)
                    .any(|element| infer_shape(element).as_ref() != Some(&inner))
                {
                    return None;
                }
                shape.extend(inner);
            }
            Some(shape)
        }
        _ => Some(Vec::new()),
    }
}

/// Infer the element type of `data` from its first element.
#[must_use]
pub fn infer_dtype(data: &Value) -> Option<&'static str> {
    match data {
        Value::Null | Value::Object(_) => None,
        Value::Bool(_) => Some("bool"),
        Value::Number(number) if number.is_f64() => Some("float64"),
        Value::Number(number) if number.is_u64() => Some("uint64"),
        Value::Number(_) => Some("int64"),
        Value::String(_) => Some("str"),
        Value::Array(elements) => elements.first().and_then(infer_dtype),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn dataset_allowed_options() -> Result<(), Box<dyn std::error::Error>> {
        let mut dataset = DatasetContainer::with_data(json!([3, 4]));
        dataset.insert("chunks", json!([2]))?;
        dataset.insert("compression", json!("gzip"))?;
        assert_eq!(dataset.len(), 3);
        assert_eq!(
            dataset.data().and_then(DatasetValue::as_value),
            Some(&json!([3, 4]))
        );

        let err = dataset.insert("colour", json!("red")).unwrap_err();
        assert_eq!(err.key(), "colour");
        assert!(!dataset.contains_key("colour"));
        Ok(())
    }

    #[test]
    fn dataset_attrs_option() -> Result<(), Box<dyn std::error::Error>> {
        let mut dataset = DatasetContainer::new();
        dataset.insert("attrs", json!({"units": "m"}))?;
        assert!(dataset.is_empty());
        assert_eq!(dataset.attrs().get("units"), Some(&json!("m")));
        assert!(dataset.insert("attrs", json!(1)).is_err());
        Ok(())
    }

    #[test]
    fn dataset_from_options() {
        let options = json!({"data": [1, 2], "shuffle": true});
        assert!(DatasetContainer::from_options(options.as_object().unwrap().clone()).is_ok());
        let options = json!({"data": [1, 2], "bogus": true});
        assert!(DatasetContainer::from_options(options.as_object().unwrap().clone()).is_err());
    }

    #[test]
    fn dataset_infer() {
        assert_eq!(infer_shape(&json!([[1, 2, 3], [4, 5, 6]])), Some(vec![2, 3]));
        assert_eq!(infer_shape(&json!(1.5)), Some(vec![]));
        assert_eq!(infer_shape(&json!([])), Some(vec![0]));
        assert_eq!(infer_shape(&json!([[1], [2, 3]])), None);
        assert_eq!(infer_shape(&json!(null)), None);
        assert_eq!(infer_dtype(&json!([[1.5]])), Some("float64"));
        assert_eq!(infer_dtype(&json!([-1])), Some("int64"));
        assert_eq!(infer_dtype(&json!("a")), Some("str"));
        assert_eq!(infer_dtype(&json!([])), None);
    }
}
