mod common;

use std::error::Error;

use common::{point_registry, Point};
use hpreserve::{
    builtin::new_registry_list, node::NodePath, DelayedContainer, GroupContainer, Item,
    PreserveFile,
};

#[test]
fn delayed_write() -> Result<(), Box<dyn Error>> {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();

    let file = PreserveFile::in_memory(new_registry_list([point_registry()?]))?;
    let delayed = DelayedContainer::new();
    let group = GroupContainer::new()
        .with_member("now", Item::native(Point::new(0, 1)))
        .with_member("later", delayed.clone());
    file.set("g", group.into())?;

    let g = file.group("g")?;
    assert_eq!(g.keys()?, ["now"]);
    assert_eq!(delayed.location()?, Some(NodePath::new("/g/later")?));
    assert!(!delayed.is_written());

    delayed.write_container(Item::native(Point::new(2, 3)))?;
    assert!(delayed.is_written());
    assert_eq!(
        g.get("later")?.downcast_ref::<Point>(),
        Some(&Point::new(2, 3))
    );

    // later writes are ignored
    delayed.write_container(Item::native(Point::new(4, 5)))?;
    assert_eq!(
        g.get("later")?.downcast_ref::<Point>(),
        Some(&Point::new(2, 3))
    );

    assert_eq!(file.close(), 0);
    Ok(())
}

#[test]
fn delayed_never_written() -> Result<(), Box<dyn Error>> {
    let file = PreserveFile::in_memory(new_registry_list([point_registry()?]))?;
    let first = DelayedContainer::new();
    let second = DelayedContainer::new();
    file.set("first", first.clone().into())?;
    file.create_group("g")?.set("second", second.clone().into())?;
    assert!(!file.contains_key("first")?);
    assert_eq!(file.close(), 2);
    Ok(())
}

#[test]
fn delayed_dropped_is_not_reported() -> Result<(), Box<dyn Error>> {
    let file = PreserveFile::in_memory(new_registry_list([point_registry()?]))?;
    let delayed = DelayedContainer::new();
    file.set("d", delayed.clone().into())?;
    drop(delayed);
    assert_eq!(file.close(), 0);
    Ok(())
}

#[test]
fn delayed_failed_write_can_retry() -> Result<(), Box<dyn Error>> {
    let file = PreserveFile::in_memory(new_registry_list([point_registry()?]))?;
    let delayed = DelayedContainer::new();
    file.set("d", delayed.clone().into())?;
    assert!(delayed.write_container(Item::native("not dumpable")).is_err());
    assert!(!delayed.is_written());
    delayed.write_container(Item::native(Point::new(1, 1)))?;
    assert!(delayed.is_written());
    assert!(file.get("d")?.downcast_ref::<Point>().is_some());
    Ok(())
}
