mod common;

use std::error::Error;

use common::{point_registry, Point};
use hpreserve::{
    builtin::{new_registry_list, UNIT_NAMESPACE},
    container::{ATTR_LABEL, ATTR_NAMESPACE, ATTR_VERSION},
    group::{self, PreserveFile},
    item::{ArrayData, SoftLink},
    node::NodePath,
    storage::HierarchyStorageTraits,
    testing::{all_locked, single_locked},
    GroupContainer, HardLink, Item, PreserveError,
};
use serde_json::json;

fn point_file() -> Result<PreserveFile, PreserveError> {
    PreserveFile::in_memory(new_registry_list([point_registry()?]))
}

#[test]
fn point_locked_version() -> Result<(), Box<dyn Error>> {
    let file = point_file()?;
    file.registries().lock_version::<Point>(Some(1));
    file.set("p", Item::native(Point::new(3, 4)))?;

    let path = NodePath::new("/p")?;
    let attributes = file.storage().attributes(&path)?;
    assert_eq!(attributes.get(ATTR_NAMESPACE), Some(&json!("R")));
    assert_eq!(attributes.get(ATTR_LABEL), Some(&json!("Point")));
    assert_eq!(attributes.get(ATTR_VERSION), Some(&json!(1)));
    assert_eq!(file.storage().dataset_data(&path)?, json!([3, 4]));

    assert_eq!(
        file.get("p")?.downcast_ref::<Point>(),
        Some(&Point::new(3, 4))
    );
    Ok(())
}

#[test]
fn point_default_version() -> Result<(), Box<dyn Error>> {
    let file = point_file()?;
    file.set("p", Item::native(Point::new(-1, 7)))?;

    let attributes = file.storage().attributes(&NodePath::new("/p")?)?;
    assert_eq!(attributes.get(ATTR_VERSION), Some(&json!(2)));
    assert_eq!(file.group("p")?.keys()?, ["x", "y"]);
    assert_eq!(
        file.get("p")?.downcast::<Point>().ok(),
        Some(Point::new(-1, 7))
    );
    Ok(())
}

#[test]
fn point_every_version() -> Result<(), Box<dyn Error>> {
    let registries = new_registry_list([point_registry()?]);
    let mut versions = Vec::new();
    for locked in single_locked(&registries, true).chain(all_locked(&registries, false)) {
        versions.push(locked.locked_version::<Point>());
        let file = PreserveFile::in_memory(locked)?;
        file.set("p", Item::native(Point::new(5, 6)))?;
        assert_eq!(
            file.get("p")?.downcast_ref::<Point>(),
            Some(&Point::new(5, 6))
        );
    }
    assert_eq!(
        versions,
        [Some(Some(1)), Some(Some(2)), Some(Some(1)), Some(Some(2))]
    );
    Ok(())
}

#[test]
fn group_members_dumped() -> Result<(), Box<dyn Error>> {
    let file = point_file()?;
    let group = GroupContainer::new()
        .with_member("a", Item::native(Point::new(1, 2)))
        .with_member("nothing", Item::native(()))
        .with_member("array", ArrayData::new(vec![1.5, 2.5]));
    file.set("g", group.into())?;

    // an unstamped group is returned as a node handle
    let Item::Node(path) = file.get("g")? else {
        panic!("g has no provenance");
    };
    assert_eq!(path.as_str(), "/g");

    let g = file.group("g")?;
    assert_eq!(
        g.get("a")?.downcast_ref::<Point>(),
        Some(&Point::new(1, 2))
    );
    assert!(g.get("nothing")?.downcast_ref::<()>().is_some());
    let nothing = g.storage().attributes(&NodePath::new("/g/nothing")?)?;
    assert_eq!(nothing.get(ATTR_NAMESPACE), Some(&json!(UNIT_NAMESPACE)));
    assert!(matches!(g.get("array")?, Item::Node(_)));
    Ok(())
}

#[test]
fn links() -> Result<(), Box<dyn Error>> {
    let file = point_file()?;
    file.set("p", Item::native(Point::new(3, 4)))?;
    file.set("hard", HardLink::new("/p").into())?;
    file.set("soft", SoftLink::new("p").into())?;
    file.create_group("g")?;
    let Item::Node(g) = file.get("g")? else {
        panic!("g has no provenance");
    };
    file.set("g_link", g.into())?;

    assert_eq!(
        file.get("hard")?.downcast_ref::<Point>(),
        Some(&Point::new(3, 4))
    );
    assert_eq!(
        file.get("soft")?.downcast_ref::<Point>(),
        Some(&Point::new(3, 4))
    );
    file.group("g_link")?.create_group("inner")?;
    assert!(file.group("g")?.contains_key("inner")?);
    Ok(())
}

#[test]
fn errors() -> Result<(), Box<dyn Error>> {
    let file = point_file()?;
    assert!(matches!(
        file.set("x", Item::native(1.5_f32)),
        Err(PreserveError::NotDumpable(_))
    ));
    assert!(!file.contains_key("x")?);

    file.registries().lock_version::<Point>(Some(3));
    assert!(matches!(
        file.set("p", Item::native(Point::new(0, 0))),
        Err(PreserveError::NoSuchVersion { .. })
    ));
    file.registries().unlock_version::<Point>();

    file.set("p", Item::native(Point::new(0, 0)))?;
    assert!(file.set("p", Item::native(Point::new(0, 0))).is_err());
    assert!(file.get("missing").is_err());

    let unknown = PreserveFile::new(file.storage().clone(), new_registry_list([]))?;
    assert!(matches!(
        unknown.get("p"),
        Err(PreserveError::UnknownNamespace(namespace)) if namespace == "R"
    ));
    Ok(())
}

#[test]
fn filesystem_round_trip() -> Result<(), Box<dyn Error>> {
    let path = tempfile::TempDir::new()?;
    {
        let file = group::open(path.path(), new_registry_list([point_registry()?]))?;
        file.registries().lock_version::<Point>(Some(1));
        file.set("p", Item::native(Point::new(8, 9)))?;
        file.create_group("g")?.set("q", Item::native(Point::new(1, 1)))?;
        assert_eq!(file.close(), 0);
    }
    assert!(path.path().join("p").join("__node.json").exists());
    assert!(path.path().join("p").join("__data.json").exists());

    let file = group::open(path.path(), new_registry_list([point_registry()?]))?;
    assert_eq!(
        file.get("p")?.downcast_ref::<Point>(),
        Some(&Point::new(8, 9))
    );
    assert_eq!(
        file.group("g")?.get("q")?.downcast_ref::<Point>(),
        Some(&Point::new(1, 1))
    );
    Ok(())
}

#[test]
fn hierarchy_tree() -> Result<(), Box<dyn Error>> {
    let file = point_file()?;
    file.registries().lock_version::<Point>(Some(1));
    file.create_group("a")?
        .set("p", Item::native(Point::new(1, 2)))?;
    file.create_group("b")?;
    let tree = file.hierarchy_tree()?;
    assert!(tree.starts_with("/\n"));
    assert!(tree.contains("  a\n    p [2] uint64\n"));
    assert!(tree.contains("  b\n"));
    Ok(())
}
