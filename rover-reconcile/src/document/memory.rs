use super::markup::{self, MarkupNode};
use super::{Document, NodeId, NodeKind};
use crate::error::DocumentError;

/// Counters for assertions about how much a render touched the document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MutationStats {
    /// Calls that changed attributes, text or structure.
    pub mutations: usize,
    /// Nodes created, either directly or by parsing markup.
    pub nodes_created: usize,
}

#[derive(Debug, Clone)]
enum NodeData {
    Element {
        tag: String,
        attributes: Vec<(String, String)>,
    },
    Text(String),
    Document,
}

#[derive(Debug, Clone)]
struct Slot {
    generation: u32,
    data: Option<NodeData>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// Arena-backed DOM-like document.
///
/// Slots are recycled through a free list; each reuse bumps the slot's
/// generation so handles to removed nodes stay dead.
#[derive(Debug, Clone)]
pub struct MemoryDocument {
    slots: Vec<Slot>,
    free_list: Vec<u32>,
    root: NodeId,
    stats: MutationStats,
}

impl MemoryDocument {
    pub fn new() -> Self {
        let mut document = Self {
            slots: Vec::new(),
            free_list: Vec::new(),
            root: NodeId {
                index: 0,
                generation: 0,
            },
            stats: MutationStats::default(),
        };
        document.root = document.alloc(NodeData::Document);
        document.stats = MutationStats::default();
        document
    }

    /// The document node.
    pub fn document_node(&self) -> NodeId {
        self.root
    }

    pub fn stats(&self) -> MutationStats {
        self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats = MutationStats::default();
    }

    /// Create a detached element.
    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.alloc(NodeData::Element {
            tag: tag.to_string(),
            attributes: Vec::new(),
        })
    }

    /// Create a detached text node.
    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.alloc(NodeData::Text(text.to_string()))
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), DocumentError> {
        self.check_parent(parent)?;
        self.check_live(child)?;
        self.detach(child);
        self.slots[child.index as usize].parent = Some(parent);
        self.slots[parent.index as usize].children.push(child);
        self.stats.mutations += 1;
        Ok(())
    }

    pub fn children(&self, node: NodeId) -> &[NodeId] {
        match self.slot(node) {
            Some(slot) => &slot.children,
            None => &[],
        }
    }

    pub fn tag(&self, node: NodeId) -> Option<&str> {
        match self.slot(node)?.data.as_ref()? {
            NodeData::Element { tag, .. } => Some(tag),
            _ => None,
        }
    }

    pub fn text(&self, node: NodeId) -> Option<&str> {
        match self.slot(node)?.data.as_ref()? {
            NodeData::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Inner markup of `node`.
    pub fn inner_markup(&self, node: NodeId) -> String {
        let mut out = String::new();
        for &child in self.children(node) {
            self.write(&mut out, child);
        }
        out
    }

    /// First node, in document order, whose attribute `name` equals `value`.
    pub fn find_by_attribute(&self, name: &str, value: &str) -> Option<NodeId> {
        let mut stack = vec![self.root];
        while let Some(node) = stack.pop() {
            if self.get_attribute(node, name) == Some(value) {
                return Some(node);
            }
            stack.extend(self.children(node).iter().rev().copied());
        }
        None
    }

    /// Number of live nodes, the document node included.
    pub fn node_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.data.is_some()).count()
    }

    fn alloc(&mut self, data: NodeData) -> NodeId {
        self.stats.nodes_created += 1;
        if let Some(index) = self.free_list.pop() {
            let slot = &mut self.slots[index as usize];
            slot.generation += 1;
            slot.data = Some(data);
            slot.parent = None;
            slot.children.clear();
            return NodeId {
                index,
                generation: slot.generation,
            };
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            data: Some(data),
            parent: None,
            children: Vec::new(),
        });
        NodeId {
            index,
            generation: 0,
        }
    }

    fn slot(&self, node: NodeId) -> Option<&Slot> {
        self.slots
            .get(node.index as usize)
            .filter(|slot| slot.generation == node.generation && slot.data.is_some())
    }

    fn slot_mut(&mut self, node: NodeId) -> Option<&mut Slot> {
        self.slots
            .get_mut(node.index as usize)
            .filter(|slot| slot.generation == node.generation && slot.data.is_some())
    }

    fn check_live(&self, node: NodeId) -> Result<(), DocumentError> {
        self.slot(node).map(|_| ()).ok_or(DocumentError::StaleNode(node))
    }

    fn check_parent(&self, node: NodeId) -> Result<(), DocumentError> {
        match self.kind(node) {
            None => Err(DocumentError::StaleNode(node)),
            Some(NodeKind::Text) => Err(DocumentError::NotAParent(node)),
            Some(_) => Ok(()),
        }
    }

    fn detach(&mut self, node: NodeId) {
        let parent = self.slot_mut(node).and_then(|slot| slot.parent.take());
        if let Some(parent) = parent {
            if let Some(slot) = self.slot_mut(parent) {
                slot.children.retain(|&child| child != node);
            }
        }
    }

    /// Free `node` and its whole subtree.
    fn release(&mut self, node: NodeId) {
        let mut stack = vec![node];
        while let Some(current) = stack.pop() {
            if let Some(slot) = self.slot_mut(current) {
                slot.data = None;
                slot.parent = None;
                stack.append(&mut slot.children);
                self.free_list.push(current.index);
            }
        }
    }

    /// Create nodes for `nodes` with `parent` as their parent. The caller
    /// places the returned handles in the parent's child list.
    fn build(&mut self, parent: NodeId, nodes: Vec<MarkupNode>) -> Vec<NodeId> {
        let mut created = Vec::with_capacity(nodes.len());
        for node in nodes {
            let id = match node {
                MarkupNode::Text(text) => self.alloc(NodeData::Text(text)),
                MarkupNode::Element {
                    tag,
                    attributes,
                    children,
                } => {
                    let id = self.alloc(NodeData::Element { tag, attributes });
                    let kids = self.build(id, children);
                    self.slots[id.index as usize].children = kids;
                    id
                }
            };
            self.slots[id.index as usize].parent = Some(parent);
            created.push(id);
        }
        created
    }

    fn write(&self, out: &mut String, node: NodeId) {
        let Some(slot) = self.slot(node) else {
            return;
        };
        match slot.data.as_ref() {
            Some(NodeData::Text(text)) => out.push_str(&markup::escape(text)),
            Some(NodeData::Element { tag, attributes }) => {
                markup::write_open_tag(
                    out,
                    tag,
                    attributes.iter().map(|(k, v)| (k.as_str(), v.as_str())),
                );
                for &child in &slot.children {
                    self.write(out, child);
                }
                markup::write_close_tag(out, tag);
            }
            Some(NodeData::Document) => {
                for &child in &slot.children {
                    self.write(out, child);
                }
            }
            None => {}
        }
    }
}

impl Default for MemoryDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl Document for MemoryDocument {
    fn kind(&self, node: NodeId) -> Option<NodeKind> {
        match self.slot(node)?.data.as_ref()? {
            NodeData::Element { .. } => Some(NodeKind::Element),
            NodeData::Text(_) => Some(NodeKind::Text),
            NodeData::Document => Some(NodeKind::Document),
        }
    }

    fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.slot(node)?.parent
    }

    fn first_child(&self, node: NodeId) -> Option<NodeId> {
        self.slot(node)?.children.first().copied()
    }

    fn next_sibling(&self, node: NodeId) -> Option<NodeId> {
        let parent = self.parent(node)?;
        let siblings = &self.slot(parent)?.children;
        let position = siblings.iter().position(|&sibling| sibling == node)?;
        siblings.get(position + 1).copied()
    }

    fn get_attribute(&self, node: NodeId, name: &str) -> Option<&str> {
        match self.slot(node)?.data.as_ref()? {
            NodeData::Element { attributes, .. } => attributes
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.as_str()),
            _ => None,
        }
    }

    fn set_attribute(&mut self, node: NodeId, name: &str, value: &str) {
        let Some(Slot {
            data: Some(NodeData::Element { attributes, .. }),
            ..
        }) = self.slot_mut(node)
        else {
            return;
        };
        match attributes.iter_mut().find(|(key, _)| key == name) {
            Some((_, existing)) => *existing = value.to_string(),
            None => attributes.push((name.to_string(), value.to_string())),
        }
        self.stats.mutations += 1;
    }

    fn remove_attribute(&mut self, node: NodeId, name: &str) {
        let Some(Slot {
            data: Some(NodeData::Element { attributes, .. }),
            ..
        }) = self.slot_mut(node)
        else {
            return;
        };
        let before = attributes.len();
        attributes.retain(|(key, _)| key != name);
        if attributes.len() != before {
            self.stats.mutations += 1;
        }
    }

    fn insert_markup(&mut self, parent: NodeId, markup: &str) -> Result<Vec<NodeId>, DocumentError> {
        self.check_parent(parent)?;
        let nodes = markup::parse_fragment(markup)?;
        let old = std::mem::take(&mut self.slots[parent.index as usize].children);
        for child in old {
            self.release(child);
        }
        let created = self.build(parent, nodes);
        self.slots[parent.index as usize].children = created.clone();
        self.stats.mutations += 1;
        Ok(created)
    }

    fn append_markup(&mut self, parent: NodeId, markup: &str) -> Result<Vec<NodeId>, DocumentError> {
        self.check_parent(parent)?;
        let nodes = markup::parse_fragment(markup)?;
        let created = self.build(parent, nodes);
        self.slots[parent.index as usize]
            .children
            .extend(created.iter().copied());
        self.stats.mutations += 1;
        Ok(created)
    }

    fn replace_with_markup(&mut self, node: NodeId, markup: &str) -> Result<Vec<NodeId>, DocumentError> {
        self.check_live(node)?;
        let parent = self.parent(node).ok_or(DocumentError::StaleNode(node))?;
        let position = self.slots[parent.index as usize]
            .children
            .iter()
            .position(|&child| child == node)
            .ok_or(DocumentError::StaleNode(node))?;
        let nodes = markup::parse_fragment(markup)?;

        let created = self.build(parent, nodes);
        self.slots[parent.index as usize]
            .children
            .splice(position..=position, created.iter().copied());
        self.slots[node.index as usize].parent = None;
        self.release(node);
        self.stats.mutations += 1;
        Ok(created)
    }

    fn set_text_content(&mut self, node: NodeId, text: &str) {
        match self.kind(node) {
            Some(NodeKind::Text) => {
                if let Some(slot) = self.slot_mut(node) {
                    slot.data = Some(NodeData::Text(text.to_string()));
                }
            }
            Some(NodeKind::Element) => {
                let old = std::mem::take(&mut self.slots[node.index as usize].children);
                for child in old {
                    self.release(child);
                }
                if !text.is_empty() {
                    let child = self.alloc(NodeData::Text(text.to_string()));
                    self.slots[child.index as usize].parent = Some(node);
                    self.slots[node.index as usize].children.push(child);
                }
            }
            _ => return,
        }
        self.stats.mutations += 1;
    }

    fn remove_node(&mut self, node: NodeId) {
        if self.slot(node).is_none() || node == self.root {
            return;
        }
        self.detach(node);
        self.release(node);
        self.stats.mutations += 1;
    }

    fn clear_children(&mut self, node: NodeId) {
        let Some(slot) = self.slot_mut(node) else {
            return;
        };
        if slot.children.is_empty() {
            return;
        }
        let old = std::mem::take(&mut slot.children);
        for child in old {
            self.release(child);
        }
        self.stats.mutations += 1;
    }

    fn serialize(&self, node: NodeId) -> String {
        let mut out = String::new();
        self.write(&mut out, node);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn container(doc: &mut MemoryDocument) -> NodeId {
        let body = doc.create_element("body");
        let root = doc.document_node();
        doc.append_child(root, body).unwrap();
        body
    }

    #[test]
    fn test_insert_markup_and_serialize() {
        let mut doc = MemoryDocument::new();
        let body = container(&mut doc);
        let created = doc
            .insert_markup(body, r#"<div id="a"><span>hi</span></div>"#)
            .unwrap();

        assert_eq!(created.len(), 1);
        assert_eq!(doc.serialize(created[0]), r#"<div id="a"><span>hi</span></div>"#);
        assert_eq!(doc.inner_markup(body), doc.serialize(created[0]));
        assert_eq!(doc.get_attribute(created[0], "id"), Some("a"));
    }

    #[test]
    fn test_removed_handles_are_dead_after_slot_reuse() {
        let mut doc = MemoryDocument::new();
        let body = container(&mut doc);
        let first = doc.insert_markup(body, "<p></p>").unwrap()[0];
        let second = doc.insert_markup(body, "<p></p>").unwrap()[0];

        assert_eq!(first.index, second.index);
        assert_ne!(first, second);
        assert_eq!(doc.kind(first), None);
        assert_eq!(doc.kind(second), Some(NodeKind::Element));
    }

    #[test]
    fn test_sibling_navigation() {
        let mut doc = MemoryDocument::new();
        let body = container(&mut doc);
        let created = doc.insert_markup(body, "<a></a><b></b>text").unwrap();

        assert_eq!(doc.first_child(body), Some(created[0]));
        assert_eq!(doc.next_sibling(created[0]), Some(created[1]));
        assert_eq!(doc.next_sibling(created[1]), Some(created[2]));
        assert_eq!(doc.next_sibling(created[2]), None);
        assert_eq!(doc.kind(created[2]), Some(NodeKind::Text));
    }

    #[test]
    fn test_replace_with_markup_keeps_position() {
        let mut doc = MemoryDocument::new();
        let body = container(&mut doc);
        let created = doc.insert_markup(body, "<a></a><b></b><c></c>").unwrap();

        let replacement = doc.replace_with_markup(created[1], "<i>x</i>").unwrap();
        assert_eq!(doc.inner_markup(body), "<a></a><i>x</i><c></c>");
        assert_eq!(doc.parent(replacement[0]), Some(body));
        assert_eq!(doc.kind(created[1]), None);
    }

    #[test]
    fn test_replace_last_child() {
        let mut doc = MemoryDocument::new();
        let body = container(&mut doc);
        let created = doc.insert_markup(body, "<a></a><b></b>").unwrap();

        doc.replace_with_markup(created[1], "<c></c>").unwrap();
        assert_eq!(doc.inner_markup(body), "<a></a><c></c>");
    }

    #[test]
    fn test_stats_track_mutations_and_creation() {
        let mut doc = MemoryDocument::new();
        let body = container(&mut doc);
        doc.reset_stats();

        let created = doc.insert_markup(body, "<div><span>x</span></div>").unwrap();
        assert_eq!(doc.stats().nodes_created, 3);
        assert_eq!(doc.stats().mutations, 1);

        doc.set_attribute(created[0], "class", "on");
        doc.remove_attribute(created[0], "missing");
        assert_eq!(doc.stats().mutations, 2);

        doc.clear_children(body);
        doc.clear_children(body);
        assert_eq!(doc.stats().mutations, 3);
        assert_eq!(doc.inner_markup(body), "");
    }

    #[test]
    fn test_set_text_content_on_element() {
        let mut doc = MemoryDocument::new();
        let body = container(&mut doc);
        let div = doc.insert_markup(body, "<div><b>old</b></div>").unwrap()[0];

        doc.set_text_content(div, "new & improved");
        assert_eq!(doc.serialize(div), "<div>new &amp; improved</div>");
    }

    #[test]
    fn test_text_nodes_cannot_be_parents() {
        let mut doc = MemoryDocument::new();
        let text = doc.create_text("hi");
        let err = doc.insert_markup(text, "<b></b>").unwrap_err();
        assert_eq!(err, DocumentError::NotAParent(text));
    }

    #[test]
    fn test_find_by_attribute_and_contains() {
        let mut doc = MemoryDocument::new();
        let body = container(&mut doc);
        doc.insert_markup(body, r#"<div><p data-k="1"></p></div>"#).unwrap();

        let p = doc.find_by_attribute("data-k", "1").unwrap();
        assert!(doc.contains(body, p));
        assert!(doc.contains(doc.document_node(), p));
        assert!(!doc.contains(p, body));
    }

    #[test]
    fn test_root_element_of_document_skips_text() {
        let mut doc = MemoryDocument::new();
        let root = doc.document_node();
        doc.insert_markup(root, "\n<html><body></body></html>").unwrap();

        let html = doc.root_element(root).unwrap();
        assert_eq!(doc.tag(html), Some("html"));
    }
}
