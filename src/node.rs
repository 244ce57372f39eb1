//! Hierarchy nodes.
//!
//! A node in a hierarchy is either a group or a dataset, identified by its [`NodePath`].
//!
//! A [`Node`] has an associated [`NodePath`], [`NodeKind`], and children.
//!
//! The [`Node::hierarchy_tree`] function can be used to create a string representation of the hierarchy below a node.

mod node_name;
mod node_path;

pub use node_name::{NodeName, NodeNameError};
pub use node_path::{NodePath, NodePathError};

use derive_more::Display;

use crate::storage::{DatasetProperties, HierarchyStorageTraits, StorageError};

/// The shape of a stored node.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// A group, which may have children.
    #[display("group")]
    Group,
    /// A dataset, which holds array or scalar data.
    #[display("dataset")]
    Dataset,
}

/// A hierarchy node.
#[derive(Debug)]
pub struct Node {
    /// Node path.
    path: NodePath,
    /// The dataset properties, if the node is a dataset.
    properties: Option<DatasetProperties>,
    /// Node children.
    ///
    /// Only group nodes can have children.
    children: Vec<Node>,
}

impl Node {
    /// Read the node at `path` and all of its descendants from `storage`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the node does not exist or there is a failure to list child nodes.
    pub fn new_with_storage<TStorage: ?Sized + HierarchyStorageTraits>(
        storage: &TStorage,
        path: &NodePath,
    ) -> Result<Self, StorageError> {
        match storage.node_kind(path)? {
            None => Err(StorageError::NodeNotFound(path.clone())),
            Some(NodeKind::Dataset) => Ok(Self {
                path: path.clone(),
                properties: Some(storage.dataset_properties(path)?),
                children: Vec::new(),
            }),
            Some(NodeKind::Group) => {
                let children = storage
                    .children(path)?
                    .iter()
                    .map(|name| Self::new_with_storage(storage, &path.child(name)))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Self {
                    path: path.clone(),
                    properties: None,
                    children,
                })
            }
        }
    }

    /// Returns the path of the node.
    #[must_use]
    pub fn path(&self) -> &NodePath {
        &self.path
    }

    /// Returns the kind of the node.
    #[must_use]
    pub fn kind(&self) -> NodeKind {
        if self.properties.is_some() {
            NodeKind::Dataset
        } else {
            NodeKind::Group
        }
    }

    /// Returns the children of the node.
    #[must_use]
    pub fn children(&self) -> &[Node] {
        &self.children
    }

    /// Return a tree representation of a hierarchy as a string.
    ///
    /// Datasets are annotated with their shape and element type, where known.
    /// For example:
    /// ```text
    /// /
    ///   a
    ///     baz [100] float64
    ///     foo [2]
    ///   b
    /// ```
    #[must_use]
    pub fn hierarchy_tree(&self) -> String {
        fn print_node(name: &str, string: &mut String, properties: Option<&DatasetProperties>) {
            string.push_str(name);
            if let Some(properties) = properties {
                if let Some(shape) = properties.shape() {
                    string.push_str(&format!(" {shape:?}"));
                }
                if let Some(dtype) = properties.dtype() {
                    string.push_str(&format!(" {dtype}"));
                }
            }
            string.push('\n');
        }

        fn update_tree(string: &mut String, children: &[Node], depth: usize) {
            for child in children {
                string.push_str(&" ".repeat(depth * 2));
                print_node(child.path.name(), string, child.properties.as_ref());
                update_tree(string, &child.children, depth + 1);
            }
        }

        let mut string = String::default();
        let name = if self.path.is_root() {
            "/"
        } else {
            self.path.name()
        };
        print_node(name, &mut string, self.properties.as_ref());
        update_tree(&mut string, &self.children, 1);
        string
    }
}
