//! Page host for the live document.
//!
//! The live document patches server fragments into its content container;
//! the page then does what the platform does for custom elements found in
//! that tree. Nodes whose tag is defined in the [`Registry`] are upgraded
//! (every attribute delivered once, then `connected`). Attribute changes
//! from later patches reach the element that is already there, and
//! elements whose node was removed are disconnected and dropped.

use std::collections::BTreeMap;

use crate::dom::{Dom, NodeId};
use crate::element::{CustomElement, ElementHost, HostEvent, Registry};
use crate::error::{Result, WidgetError};
use crate::live::{self, Handled, LiveDocument, Socket, Viewport};
use crate::morph::Patch;
use crate::protocol::ServerMessage;
use crate::table::{self, Alerts, HttpClient, RemoteTable, TableRenderer};
use crate::textarea::{self, EventSink, TrackedTextarea};

type Upgraded = ElementHost<Box<dyn CustomElement>>;

/// Define `data-table` and `tracked-textarea` with the given constructors
pub fn define_widgets<H, R, A, E>(
    registry: &mut Registry,
    table: impl Fn() -> RemoteTable<H, R, A> + 'static,
    textarea: impl Fn() -> TrackedTextarea<E> + 'static,
) -> Result<()>
where
    H: HttpClient + 'static,
    R: TableRenderer + 'static,
    A: Alerts + 'static,
    E: EventSink + 'static,
{
    registry.define(table::TAG, move || Box::new(table()))?;
    registry.define(textarea::TAG, move || Box::new(textarea()))?;
    Ok(())
}

pub struct Page<S, V> {
    registry: Registry,
    document: ElementHost<LiveDocument<S, V>>,
    elements: BTreeMap<NodeId, Upgraded>,
}

impl<S: Socket, V: Viewport> Page<S, V> {
    pub fn new(registry: Registry, document: LiveDocument<S, V>) -> Self {
        Self {
            registry,
            document: ElementHost::new(live::TAG, document),
            elements: BTreeMap::new(),
        }
    }

    /// Attach the document; it announces itself to the server
    pub fn connect(&mut self) {
        self.document.connect();
    }

    pub fn document(&self) -> &LiveDocument<S, V> {
        self.document.element()
    }

    pub fn dom(&self) -> &Dom {
        self.document.element().dom()
    }

    /// Apply a server message, then bring the upgraded elements in line
    pub fn on_message(&mut self, message: ServerMessage) -> Result<Handled> {
        let handled = self.document.element_mut().on_message(message)?;
        if let Handled::Patched(patch) = &handled {
            self.sync(patch);
        }
        Ok(handled)
    }

    /// The upgraded element living at `node`
    pub fn element(&self, node: NodeId) -> Option<&Upgraded> {
        self.elements.get(&node)
    }

    /// Rendered shadow tree of the element at `node`
    pub fn shadow(&self, node: NodeId) -> Option<&Dom> {
        self.element(node)?.element().shadow_root()
    }

    /// Number of upgraded elements currently in the document
    pub fn upgraded(&self) -> usize {
        self.elements.len()
    }

    /// Deliver a user or transport event to the element at `node`
    pub fn dispatch(&mut self, node: NodeId, event: &HostEvent) -> Result<()> {
        let host = self
            .elements
            .get_mut(&node)
            .ok_or(WidgetError::NodeNotFound(node))?;
        host.element_mut().handle_event(event);
        Ok(())
    }

    fn sync(&mut self, patch: &Patch) {
        let dom = self.document.element().dom();

        self.elements.retain(|node, host| {
            if dom.contains(*node) {
                return true;
            }
            tracing::debug!(tag = %host.tag(), "custom element removed");
            host.disconnect();
            false
        });

        for change in &patch.attribute_changes {
            let Some(host) = self.elements.get_mut(&change.node) else {
                continue;
            };
            match &change.new {
                Some(value) => host.set_attribute(&change.name, value.as_str()),
                None => host.remove_attribute(&change.name),
            }
        }

        let content = self.document.element().content();
        for node in dom.descendants(content) {
            if self.elements.contains_key(&node) {
                continue;
            }
            let Some(tag) = dom.tag(node).filter(|tag| self.registry.is_defined(tag)) else {
                continue;
            };
            let mut host = match self.registry.create(tag) {
                Ok(host) => host,
                Err(e) => {
                    tracing::warn!(tag, error = %e, "failed to upgrade custom element");
                    continue;
                }
            };
            for (name, value) in dom.attrs(node) {
                host.set_attribute(name, value.as_str());
            }
            host.connect();
            tracing::debug!(tag, ?node, "custom element upgraded");
            self.elements.insert(node, host);
        }
    }
}
