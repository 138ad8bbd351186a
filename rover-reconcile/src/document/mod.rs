mod markup;
mod memory;

pub use markup::{MarkupNode, escape, is_valid_name, parse_fragment, write_close_tag, write_node, write_open_tag};
pub use memory::{MemoryDocument, MutationStats};

use crate::error::DocumentError;

/// Handle to a node of a [`Document`].
///
/// The generation lets a document reject handles to nodes it has since
/// removed, even when the slot was reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Element,
    Text,
    /// The document itself; its first element child is the document root.
    Document,
}

impl NodeKind {
    /// Element and document nodes may host a mounted tree.
    pub fn is_mountable(self) -> bool {
        matches!(self, NodeKind::Element | NodeKind::Document)
    }
}

/// Capability set the reconciler needs from a DOM-like document.
///
/// Mutating markup operations return the handles of the top-level nodes they
/// created so callers can cache them right away.
pub trait Document: 'static {
    /// Kind of a live node, `None` once the node has been removed.
    fn kind(&self, node: NodeId) -> Option<NodeKind>;

    fn parent(&self, node: NodeId) -> Option<NodeId>;

    fn first_child(&self, node: NodeId) -> Option<NodeId>;

    fn next_sibling(&self, node: NodeId) -> Option<NodeId>;

    fn get_attribute(&self, node: NodeId, name: &str) -> Option<&str>;

    fn set_attribute(&mut self, node: NodeId, name: &str, value: &str);

    fn remove_attribute(&mut self, node: NodeId, name: &str);

    /// Replace every child of `parent` with the nodes described by `markup`.
    fn insert_markup(&mut self, parent: NodeId, markup: &str) -> Result<Vec<NodeId>, DocumentError>;

    /// Append the nodes described by `markup` after the last child of `parent`.
    fn append_markup(&mut self, parent: NodeId, markup: &str) -> Result<Vec<NodeId>, DocumentError>;

    /// Put the nodes described by `markup` where `node` is and drop `node`.
    fn replace_with_markup(&mut self, node: NodeId, markup: &str) -> Result<Vec<NodeId>, DocumentError>;

    fn set_text_content(&mut self, node: NodeId, text: &str);

    fn remove_node(&mut self, node: NodeId);

    fn clear_children(&mut self, node: NodeId);

    /// Outer markup of `node` (inner markup for the document node).
    fn serialize(&self, node: NodeId) -> String;

    /// Inclusive containment test.
    fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(candidate) = current {
            if candidate == ancestor {
                return true;
            }
            current = self.parent(candidate);
        }
        false
    }

    /// Top node of a mounted tree inside `container`: the first child of an
    /// element, or the first element child of a document.
    fn root_element(&self, container: NodeId) -> Option<NodeId> {
        let mut child = self.first_child(container);
        if self.kind(container) != Some(NodeKind::Document) {
            return child;
        }
        while let Some(node) = child {
            if self.kind(node) == Some(NodeKind::Element) {
                return Some(node);
            }
            child = self.next_sibling(node);
        }
        None
    }
}
