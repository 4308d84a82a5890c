//! Arena-backed DOM used for shadow roots and the live document.
//!
//! Nodes are addressed by [`NodeId`]. Freed slots are recycled, but each
//! reuse bumps the slot's generation, so an id still names exactly one node
//! for as long as the `Dom` lives: comparing ids is how widgets tell whether
//! "the same element" is still in the tree.

use crate::error::{Result, WidgetError};
use crate::markup::{Element, Markup};

/// Stable handle to a node in a [`Dom`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    index: usize,
    generation: u32,
}

#[derive(Debug, Clone)]
enum NodeKind {
    Element {
        tag: String,
        attrs: Vec<(String, String)>,
    },
    Text(String),
}

#[derive(Debug, Clone)]
struct NodeData {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

#[derive(Debug, Clone)]
struct Slot {
    generation: u32,
    data: Option<NodeData>,
}

/// A tree of element and text nodes with a fixed root element
#[derive(Debug, Clone)]
pub struct Dom {
    slots: Vec<Slot>,
    free: Vec<usize>,
    live: usize,
    root: NodeId,
}

impl Dom {
    /// Create a tree whose root is an element with the given tag
    pub fn new(root_tag: impl Into<String>) -> Self {
        let root = NodeData {
            kind: NodeKind::Element {
                tag: root_tag.into(),
                attrs: Vec::new(),
            },
            parent: None,
            children: Vec::new(),
        };
        Self {
            slots: vec![Slot {
                generation: 0,
                data: Some(root),
            }],
            free: Vec::new(),
            live: 1,
            root: NodeId {
                index: 0,
                generation: 0,
            },
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    fn node(&self, id: NodeId) -> Result<&NodeData> {
        self.slots
            .get(id.index)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.data.as_ref())
            .ok_or(WidgetError::NodeNotFound(id))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut NodeData> {
        self.slots
            .get_mut(id.index)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.data.as_mut())
            .ok_or(WidgetError::NodeNotFound(id))
    }

    fn alloc(&mut self, kind: NodeKind) -> NodeId {
        let data = Some(NodeData {
            kind,
            parent: None,
            children: Vec::new(),
        });
        self.live += 1;

        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index];
            slot.data = data;
            return NodeId {
                index,
                generation: slot.generation,
            };
        }

        self.slots.push(Slot {
            generation: 0,
            data,
        });
        NodeId {
            index: self.slots.len() - 1,
            generation: 0,
        }
    }

    fn free(&mut self, id: NodeId) {
        let Some(slot) = self.slots.get_mut(id.index) else {
            return;
        };
        if slot.generation != id.generation || slot.data.take().is_none() {
            return;
        }
        // A slot whose generation would wrap is retired instead of reused
        match slot.generation.checked_add(1) {
            Some(next) => {
                slot.generation = next;
                self.free.push(id.index);
            }
            None => tracing::trace!(index = id.index, "retiring exhausted node slot"),
        }
        self.live -= 1;
    }

    /// Number of slots the arena has allocated, live or free
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Whether the id refers to a node that has not been removed
    pub fn contains(&self, id: NodeId) -> bool {
        self.node(id).is_ok()
    }

    /// Number of live nodes, root included
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Create a detached element
    pub fn create_element(&mut self, tag: impl Into<String>) -> NodeId {
        self.alloc(NodeKind::Element {
            tag: tag.into(),
            attrs: Vec::new(),
        })
    }

    /// Create a detached text node
    pub fn create_text(&mut self, text: impl Into<String>) -> NodeId {
        self.alloc(NodeKind::Text(text.into()))
    }

    /// Build a detached subtree from markup
    pub fn build(&mut self, markup: &Markup) -> NodeId {
        match markup {
            Markup::Text(text) => self.create_text(text.clone()),
            Markup::Element(el) => self.build_element(el),
        }
    }

    fn build_element(&mut self, el: &Element) -> NodeId {
        let id = self.alloc(NodeKind::Element {
            tag: el.tag.clone(),
            attrs: el.attrs.clone(),
        });
        for child in &el.children {
            let child_id = self.build(child);
            if let Ok(child_node) = self.node_mut(child_id) {
                child_node.parent = Some(id);
            }
            if let Ok(node) = self.node_mut(id) {
                node.children.push(child_id);
            }
        }
        id
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).ok().and_then(|n| n.parent)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.node(id).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    /// Tag name, or `None` for text nodes and removed nodes
    pub fn tag(&self, id: NodeId) -> Option<&str> {
        match &self.node(id).ok()?.kind {
            NodeKind::Element { tag, .. } => Some(tag.as_str()),
            NodeKind::Text(_) => None,
        }
    }

    /// Text content of a text node
    pub fn text(&self, id: NodeId) -> Option<&str> {
        match &self.node(id).ok()?.kind {
            NodeKind::Text(text) => Some(text.as_str()),
            NodeKind::Element { .. } => None,
        }
    }

    pub fn is_text(&self, id: NodeId) -> bool {
        self.text(id).is_some()
    }

    pub fn set_text(&mut self, id: NodeId, value: impl Into<String>) -> Result<()> {
        match &mut self.node_mut(id)?.kind {
            NodeKind::Text(text) => {
                *text = value.into();
                Ok(())
            }
            NodeKind::Element { .. } => Err(WidgetError::NotText(id)),
        }
    }

    /// Concatenated text of all descendant text nodes
    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        for node in self.descendants(id) {
            if let Some(text) = self.text(node) {
                out.push_str(text);
            }
        }
        out
    }

    /// Replace all children with a single text node (or none for "")
    pub fn set_text_content(&mut self, id: NodeId, value: &str) -> Result<()> {
        self.clear_children(id)?;
        if !value.is_empty() {
            let text = self.create_text(value);
            self.append_child(id, text)?;
        }
        Ok(())
    }

    pub fn attrs(&self, id: NodeId) -> &[(String, String)] {
        match self.node(id).map(|n| &n.kind) {
            Ok(NodeKind::Element { attrs, .. }) => attrs.as_slice(),
            _ => &[],
        }
    }

    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        self.attrs(id)
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    fn attrs_mut(&mut self, id: NodeId) -> Result<&mut Vec<(String, String)>> {
        match &mut self.node_mut(id)?.kind {
            NodeKind::Element { attrs, .. } => Ok(attrs),
            NodeKind::Text(_) => Err(WidgetError::NotAnElement(id)),
        }
    }

    /// Set an attribute. Returns the previous value.
    pub fn set_attr(
        &mut self,
        id: NodeId,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<Option<String>> {
        let name = name.into();
        let value = value.into();
        let attrs = self.attrs_mut(id)?;
        match attrs.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => Ok(Some(std::mem::replace(&mut slot.1, value))),
            None => {
                attrs.push((name, value));
                Ok(None)
            }
        }
    }

    /// Remove an attribute. Returns the removed value.
    pub fn remove_attr(&mut self, id: NodeId, name: &str) -> Result<Option<String>> {
        let attrs = self.attrs_mut(id)?;
        let index = attrs.iter().position(|(n, _)| n == name);
        Ok(index.map(|index| attrs.remove(index).1))
    }

    pub fn has_class(&self, id: NodeId, class: &str) -> bool {
        self.attr(id, "class")
            .map(|classes| classes.split_ascii_whitespace().any(|c| c == class))
            .unwrap_or(false)
    }

    fn is_ancestor_or_self(&self, ancestor: NodeId, mut node: NodeId) -> bool {
        loop {
            if node == ancestor {
                return true;
            }
            match self.parent(node) {
                Some(parent) => node = parent,
                None => return false,
            }
        }
    }

    /// Detach a node from its parent, keeping its subtree alive
    pub fn detach(&mut self, id: NodeId) -> Result<()> {
        let parent = self.node(id)?.parent;
        if let Some(parent) = parent {
            self.node_mut(parent)?.children.retain(|c| *c != id);
            self.node_mut(id)?.parent = None;
        }
        Ok(())
    }

    /// Insert `child` into `parent` before `reference` (append when `None`).
    /// A child that is already attached elsewhere is moved.
    pub fn insert_before(
        &mut self,
        parent: NodeId,
        child: NodeId,
        reference: Option<NodeId>,
    ) -> Result<()> {
        self.node(parent)?;
        if self.is_ancestor_or_self(child, parent) {
            return Err(WidgetError::HierarchyRequest { parent, child });
        }
        if Some(child) == reference {
            return Ok(());
        }

        self.detach(child)?;

        let siblings = &mut self.node_mut(parent)?.children;
        let index = reference
            .and_then(|r| siblings.iter().position(|c| *c == r))
            .unwrap_or(siblings.len());
        siblings.insert(index, child);
        self.node_mut(child)?.parent = Some(parent);
        Ok(())
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        self.insert_before(parent, child, None)
    }

    /// Detach and free a node with its whole subtree
    pub fn remove(&mut self, id: NodeId) -> Result<()> {
        if id == self.root {
            return self.clear_children(id);
        }
        self.detach(id)?;
        let doomed = self.descendants(id);
        for node in doomed {
            self.free(node);
        }
        Ok(())
    }

    pub fn clear_children(&mut self, id: NodeId) -> Result<()> {
        let children = self.node(id)?.children.clone();
        for child in children {
            self.remove(child)?;
        }
        Ok(())
    }

    /// The node and all its descendants in document order
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(node) = stack.pop() {
            if !self.contains(node) {
                continue;
            }
            out.push(node);
            stack.extend(self.children(node).iter().rev());
        }
        out
    }

    /// First element (in document order, starting at `from`) matching `pred`
    pub fn find_first(&self, from: NodeId, pred: impl Fn(&Dom, NodeId) -> bool) -> Option<NodeId> {
        self.descendants(from)
            .into_iter()
            .find(|node| self.tag(*node).is_some() && pred(self, *node))
    }

    pub fn find_by_id(&self, id: &str) -> Option<NodeId> {
        self.find_first(self.root, |dom, node| dom.attr(node, "id") == Some(id))
    }

    pub fn find_by_class(&self, from: NodeId, class: &str) -> Option<NodeId> {
        self.find_first(from, |dom, node| dom.has_class(node, class))
    }

    /// Snapshot a subtree back into owned markup
    pub fn to_markup(&self, id: NodeId) -> Option<Markup> {
        let node = self.node(id).ok()?;
        match &node.kind {
            NodeKind::Text(text) => Some(Markup::Text(text.clone())),
            NodeKind::Element { tag, attrs } => Some(Markup::Element(Element {
                tag: tag.clone(),
                attrs: attrs.clone(),
                children: node
                    .children
                    .iter()
                    .filter_map(|c| self.to_markup(*c))
                    .collect(),
            })),
        }
    }

    /// Serialized children of a node
    pub fn inner_html(&self, id: NodeId) -> String {
        let children: Vec<Markup> = self
            .children(id)
            .iter()
            .filter_map(|c| self.to_markup(*c))
            .collect();
        crate::markup::render(&children)
    }
}
