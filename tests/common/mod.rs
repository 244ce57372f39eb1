#![allow(dead_code)]

use hpreserve::{
    container::{Container, GroupContainer},
    item::{ArrayData, Item},
    registry::Registry,
    DatasetContainer, PreserveError, VersionSelector,
};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    pub x: i64,
    pub y: i64,
}

impl Point {
    pub fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }
}

fn dataset_value(container: &Container) -> Option<&Value> {
    container.as_dataset()?.data()?.as_value()
}

fn member_i64(group: &GroupContainer, key: &str) -> Option<i64> {
    dataset_value(group.get(key)?.as_container()?)?.as_i64()
}

/// A registry `R` dumping [`Point`] as `[x, y]` (version 1) or a group with `x` and `y` members (version 2).
pub fn point_registry() -> Result<Registry, PreserveError> {
    let mut registry = Registry::new("R");
    registry.dumper::<Point, _>("Point", Some(1), |point| {
        Ok(DatasetContainer::with_data(vec![point.x, point.y]).into())
    })?;
    registry.dumper::<Point, _>("Point", Some(2), |point| {
        Ok(GroupContainer::new()
            .with_member("x", ArrayData::new(point.x))
            .with_member("y", ArrayData::new(point.y))
            .into())
    })?;
    registry.loader("Point", VersionSelector::Version(1), |container| {
        match dataset_value(&container).and_then(Value::as_array).map(Vec::as_slice) {
            Some([x, y]) => Ok(Item::native(Point::new(
                x.as_i64().unwrap_or_default(),
                y.as_i64().unwrap_or_default(),
            ))),
            _ => Err("point dataset must hold two values".into()),
        }
    })?;
    registry.loader("Point", VersionSelector::Version(2), |container| {
        let point = container
            .as_group()
            .and_then(|group| Some(Point::new(member_i64(group, "x")?, member_i64(group, "y")?)));
        point
            .map(Item::native)
            .ok_or_else(|| "point group must have x and y".into())
    })?;
    registry.freeze();
    Ok(registry)
}
