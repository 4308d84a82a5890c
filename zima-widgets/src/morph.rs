//! Structural patching of a node's children against new markup.
//!
//! Old children are reconciled with the new ones position by position.
//! Nodes that match (same kind, same tag, same `id`) are updated in place
//! and keep their [`NodeId`]; keyed elements further down the sibling list
//! are moved up instead of being rebuilt. Everything else is created or
//! removed.

use crate::dom::{Dom, NodeId};
use crate::error::Result;
use crate::markup::{Element, Markup};

/// An attribute that changed on a surviving element
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeChange {
    pub node: NodeId,
    pub name: String,
    pub old: Option<String>,
    pub new: Option<String>,
}

/// Summary of what a patch touched
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Patch {
    /// Subtrees built from markup
    pub created: usize,
    /// Subtrees dropped from the document
    pub removed: usize,
    /// Keyed elements moved to a new position
    pub moved: usize,
    /// Surviving nodes whose text or attributes changed
    pub updated: usize,
    pub attribute_changes: Vec<AttributeChange>,
}

impl Patch {
    /// True when the document already matched the markup
    pub fn is_noop(&self) -> bool {
        self.created == 0 && self.removed == 0 && self.moved == 0 && self.updated == 0
    }
}

/// Make the children of `target` match `new_children`, reusing nodes where possible
pub fn morph_children(dom: &mut Dom, target: NodeId, new_children: &[Markup]) -> Result<Patch> {
    let mut patch = Patch::default();
    morph_into(dom, target, new_children, &mut patch)?;
    Ok(patch)
}

fn morph_into(
    dom: &mut Dom,
    target: NodeId,
    new_children: &[Markup],
    patch: &mut Patch,
) -> Result<()> {
    for (index, new) in new_children.iter().enumerate() {
        let current = dom.children(target).get(index).copied();

        if let Some(old) = current {
            if compatible(dom, old, new) {
                morph_node(dom, old, new, patch)?;
                continue;
            }
        }

        if let Some(keyed) = keyed_sibling(dom, target, index + 1, new) {
            dom.insert_before(target, keyed, current)?;
            patch.moved += 1;
            morph_node(dom, keyed, new, patch)?;
            continue;
        }

        let node = dom.build(new);
        dom.insert_before(target, node, current)?;
        patch.created += 1;
    }

    let surplus: Vec<NodeId> = dom
        .children(target)
        .iter()
        .skip(new_children.len())
        .copied()
        .collect();
    for node in surplus {
        dom.remove(node)?;
        patch.removed += 1;
    }

    Ok(())
}

fn compatible(dom: &Dom, old: NodeId, new: &Markup) -> bool {
    match new {
        Markup::Text(_) => dom.is_text(old),
        Markup::Element(el) => {
            dom.tag(old) == Some(el.tag.as_str()) && dom.attr(old, "id") == el.get_attr("id")
        }
    }
}

/// Find a later sibling carrying the same `id` as the new element
fn keyed_sibling(dom: &Dom, target: NodeId, from: usize, new: &Markup) -> Option<NodeId> {
    let el = new.as_element()?;
    let key = el.get_attr("id")?;
    dom.children(target)
        .iter()
        .skip(from)
        .copied()
        .find(|c| dom.tag(*c) == Some(el.tag.as_str()) && dom.attr(*c, "id") == Some(key))
}

fn morph_node(dom: &mut Dom, old: NodeId, new: &Markup, patch: &mut Patch) -> Result<()> {
    match new {
        Markup::Text(text) => {
            if dom.text(old) != Some(text.as_str()) {
                dom.set_text(old, text.clone())?;
                patch.updated += 1;
            }
            Ok(())
        }
        Markup::Element(el) => {
            if sync_attributes(dom, old, el, patch)? {
                patch.updated += 1;
            }
            morph_into(dom, old, &el.children, patch)
        }
    }
}

fn sync_attributes(dom: &mut Dom, node: NodeId, el: &Element, patch: &mut Patch) -> Result<bool> {
    let mut changed = false;

    let stale: Vec<String> = dom
        .attrs(node)
        .iter()
        .filter(|(name, _)| el.get_attr(name).is_none())
        .map(|(name, _)| name.clone())
        .collect();
    for name in stale {
        let old = dom.remove_attr(node, &name)?;
        patch.attribute_changes.push(AttributeChange {
            node,
            name,
            old,
            new: None,
        });
        changed = true;
    }

    for (name, value) in &el.attrs {
        if dom.attr(node, name) == Some(value.as_str()) {
            continue;
        }
        let old = dom.set_attr(node, name.clone(), value.clone())?;
        patch.attribute_changes.push(AttributeChange {
            node,
            name: name.clone(),
            old,
            new: Some(value.clone()),
        });
        changed = true;
    }

    Ok(changed)
}
