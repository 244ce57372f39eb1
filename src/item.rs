//! Items: anything that can be a member of a group.
//!
//! An [`Item`] is either a native value, a [`Container`] produced by a dumper or read from storage, or something storage represents directly:
//! raw arrays, links and handles of stored nodes.

use std::any::{Any, TypeId};

use serde_json::Value;

use crate::{
    container::{infer_dtype, infer_shape, Container, DatasetContainer, GroupContainer},
    delayed::DelayedContainer,
    hard_link::HardLink,
    node::NodePath,
    on_demand::OnDemandWrapper,
    storage::DatasetProperties,
};

/// A native value, dumped by the registry dumper of its type.
pub struct NativeValue {
    value: Box<dyn Any>,
    type_name: &'static str,
}

impl NativeValue {
    /// Wrap `value`.
    #[must_use]
    pub fn new<T: Any>(value: T) -> Self {
        Self {
            value: Box::new(value),
            type_name: std::any::type_name::<T>(),
        }
    }

    /// The [`TypeId`] of the wrapped value.
    #[must_use]
    pub fn type_id(&self) -> TypeId {
        (*self.value).type_id()
    }

    /// The name of the type of the wrapped value.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// The wrapped value.
    #[must_use]
    pub fn as_any(&self) -> &dyn Any {
        self.value.as_ref()
    }

    /// Returns the wrapped value if it is a `T`.
    #[must_use]
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref()
    }

    /// Unwrap the value if it is a `T`.
    ///
    /// # Errors
    /// Returns `self` if the value is not a `T`.
    pub fn downcast<T: Any>(self) -> Result<T, Self> {
        let type_name = self.type_name;
        self.value
            .downcast()
            .map(|value| *value)
            .map_err(|value| Self { value, type_name })
    }
}

impl std::fmt::Debug for NativeValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "NativeValue({})", self.type_name)
    }
}

/// A raw array written as a dataset without conversion.
#[derive(Clone, Debug, PartialEq)]
pub struct ArrayData {
    data: Value,
    dtype: Option<String>,
}

impl ArrayData {
    /// Create an array holding `data`. Its element type is inferred from the data.
    #[must_use]
    pub fn new(data: impl Into<Value>) -> Self {
        Self {
            data: data.into(),
            dtype: None,
        }
    }

    /// Set the element type.
    #[must_use]
    pub fn with_dtype(mut self, dtype: impl Into<String>) -> Self {
        self.dtype = Some(dtype.into());
        self
    }

    /// The array data.
    #[must_use]
    pub fn data(&self) -> &Value {
        &self.data
    }

    /// The element type.
    #[must_use]
    pub fn dtype(&self) -> Option<&str> {
        self.dtype.as_deref().or_else(|| infer_dtype(&self.data))
    }

    /// The shape of the array.
    #[must_use]
    pub fn shape(&self) -> Option<Vec<u64>> {
        infer_shape(&self.data)
    }

    /// The dataset properties of the array.
    #[must_use]
    pub fn properties(&self) -> DatasetProperties {
        let mut properties = serde_json::Map::new();
        if let Some(shape) = self.shape() {
            properties.insert("shape".to_string(), Value::from(shape));
        }
        if let Some(dtype) = self.dtype() {
            properties.insert("dtype".to_string(), Value::from(dtype));
        }
        DatasetProperties::new(properties)
    }
}

/// A link to another node by path, which may dangle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SoftLink(String);

impl SoftLink {
    /// Create a soft link to `target`, an absolute path or a path relative to the parent of the link.
    #[must_use]
    pub fn new(target: impl Into<String>) -> Self {
        Self(target.into())
    }

    /// The target path.
    #[must_use]
    pub fn target(&self) -> &str {
        &self.0
    }
}

/// A member of a group.
#[derive(Debug)]
pub enum Item {
    /// A group or dataset.
    Container(Container),
    /// A placeholder for a container written later.
    Delayed(DelayedContainer),
    /// A hard link to another node.
    HardLink(HardLink),
    /// A soft link to another node.
    SoftLink(SoftLink),
    /// A stored node. Writing it creates a hard link.
    Node(NodePath),
    /// A raw array.
    Array(ArrayData),
    /// A member materialised when called.
    OnDemand(OnDemandWrapper<Item>),
    /// A native value.
    Native(NativeValue),
}

impl Item {
    /// Wrap a native value.
    #[must_use]
    pub fn native<T: Any>(value: T) -> Self {
        Self::Native(NativeValue::new(value))
    }

    /// A short description of the kind of item.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Container(Container::Group(_)) => "group container",
            Self::Container(Container::Dataset(_)) => "dataset container",
            Self::Delayed(_) => "delayed container",
            Self::HardLink(_) => "hard link",
            Self::SoftLink(_) => "soft link",
            Self::Node(_) => "stored node",
            Self::Array(_) => "array",
            Self::OnDemand(_) => "on-demand wrapper",
            Self::Native(native) => native.type_name(),
        }
    }

    /// Returns the native value if it is a `T`.
    #[must_use]
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        match self {
            Self::Native(native) => native.downcast_ref(),
            _ => None,
        }
    }

    /// Unwrap the native value if it is a `T`.
    ///
    /// # Errors
    /// Returns `self` if the item is not a native `T`.
    pub fn downcast<T: Any>(self) -> Result<T, Self> {
        match self {
            Self::Native(native) => native.downcast().map_err(Self::Native),
            other => Err(other),
        }
    }

    /// Returns the container, if this is a container.
    #[must_use]
    pub fn as_container(&self) -> Option<&Container> {
        match self {
            Self::Container(container) => Some(container),
            _ => None,
        }
    }

    /// Convert into a container.
    ///
    /// # Errors
    /// Returns `self` if this is not a container.
    pub fn into_container(self) -> Result<Container, Self> {
        match self {
            Self::Container(container) => Ok(container),
            other => Err(other),
        }
    }

    /// Returns true if this is an on-demand wrapper.
    #[must_use]
    pub fn is_on_demand(&self) -> bool {
        matches!(self, Self::OnDemand(_))
    }
}

impl From<Container> for Item {
    fn from(container: Container) -> Self {
        Self::Container(container)
    }
}

impl From<GroupContainer> for Item {
    fn from(group: GroupContainer) -> Self {
        Self::Container(Container::Group(group))
    }
}

impl From<DatasetContainer> for Item {
    fn from(dataset: DatasetContainer) -> Self {
        Self::Container(Container::Dataset(dataset))
    }
}

impl From<DelayedContainer> for Item {
    fn from(delayed: DelayedContainer) -> Self {
        Self::Delayed(delayed)
    }
}

impl From<HardLink> for Item {
    fn from(link: HardLink) -> Self {
        Self::HardLink(link)
    }
}

impl From<SoftLink> for Item {
    fn from(link: SoftLink) -> Self {
        Self::SoftLink(link)
    }
}

impl From<NodePath> for Item {
    fn from(path: NodePath) -> Self {
        Self::Node(path)
    }
}

impl From<ArrayData> for Item {
    fn from(array: ArrayData) -> Self {
        Self::Array(array)
    }
}

impl From<OnDemandWrapper<Item>> for Item {
    fn from(wrapper: OnDemandWrapper<Item>) -> Self {
        Self::OnDemand(wrapper)
    }
}

impl From<NativeValue> for Item {
    fn from(native: NativeValue) -> Self {
        Self::Native(native)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[derive(Debug, PartialEq)]
    struct Point(i64, i64);

    #[test]
    fn native_downcast() {
        let item = Item::native(Point(3, 4));
        assert_eq!(item.kind(), std::any::type_name::<Point>());
        assert_eq!(item.downcast_ref::<Point>(), Some(&Point(3, 4)));
        assert!(item.downcast_ref::<i64>().is_none());
        let item = item.downcast::<i64>().unwrap_err();
        assert_eq!(item.downcast::<Point>().unwrap(), Point(3, 4));
    }

    #[test]
    fn native_type_id() {
        let native = NativeValue::new(Point(0, 0));
        assert_eq!(native.type_id(), TypeId::of::<Point>());
        assert!(native.as_any().is::<Point>());
    }

    #[test]
    fn array_properties() {
        let array = ArrayData::new(json!([[1.0, 2.0], [3.0, 4.0]]));
        assert_eq!(array.shape(), Some(vec![2, 2]));
        let properties = array.properties();
        assert_eq!(properties.shape(), Some(vec![2, 2]));
        assert_eq!(properties.dtype(), Some("float64"));
        let array = ArrayData::new(json!([1, 2])).with_dtype("int8");
        assert_eq!(array.dtype(), Some("int8"));
    }
}
