//! Live document widget.
//!
//! Keeps a notebook view in sync with server-pushed fragments. Each update
//! is patched into the content container so untouched nodes keep their
//! identity; the element marked `scroll-focus` is scrolled into view once
//! per distinct element. User actions go back as socket messages.

use std::collections::BTreeSet;

use crate::dom::{Dom, NodeId};
use crate::element::CustomElement;
use crate::error::Result;
use crate::markup::parse_fragment;
use crate::morph::{morph_children, Patch};
use crate::protocol::{ClientMessage, ServerMessage};

pub const TAG: &str = "live-document";
pub const CONTENT_ID: &str = "content";
pub const SCROLL_FOCUS_CLASS: &str = "scroll-focus";

const PLACEHOLDER: &str = "Loading...";

/// Outbound half of the persistent connection
pub trait Socket {
    fn emit(&mut self, message: ClientMessage);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollBehavior {
    Smooth,
    Instant,
}

pub trait Viewport {
    fn scroll_into_view(&mut self, dom: &Dom, node: NodeId, behavior: ScrollBehavior);
}

/// A key press with its modifier state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyEvent {
    pub key: String,
    pub ctrl: bool,
    pub alt: bool,
    pub shift: bool,
    pub meta: bool,
}

impl KeyEvent {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..Self::default()
        }
    }

    pub fn ctrl(mut self) -> Self {
        self.ctrl = true;
        self
    }

    pub fn alt(mut self) -> Self {
        self.alt = true;
        self
    }

    pub fn shift(mut self) -> Self {
        self.shift = true;
        self
    }

    pub fn meta(mut self) -> Self {
        self.meta = true;
        self
    }

    /// `Ctrl+Alt+Shift+Meta+<key>` with absent modifiers left out.
    /// `None` for a bare modifier press.
    pub fn combo(&self) -> Option<String> {
        if matches!(
            self.key.as_str(),
            "Control" | "Alt" | "Shift" | "Meta" | "AltGraph" | ""
        ) {
            return None;
        }

        let mut combo = String::new();
        for (held, prefix) in [
            (self.ctrl, "Ctrl+"),
            (self.alt, "Alt+"),
            (self.shift, "Shift+"),
            (self.meta, "Meta+"),
        ] {
            if held {
                combo.push_str(prefix);
            }
        }
        combo.push_str(&self.key);
        Some(combo)
    }
}

/// What a server message did to the document
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Handled {
    Patched(Patch),
    CodeSaved(String),
}

pub struct LiveDocument<S, V> {
    socket: S,
    viewport: V,
    dom: Dom,
    content: NodeId,
    last_scrolled: Option<NodeId>,
    saved: BTreeSet<String>,
}

impl<S: Socket, V: Viewport> LiveDocument<S, V> {
    pub fn new(socket: S, viewport: V) -> Self {
        let mut dom = Dom::new("#shadow-root");
        let root = dom.root();
        let content = dom.create_element("div");
        let placeholder = dom.create_text(PLACEHOLDER);
        // Freshly created nodes cannot fail to attach
        let _ = dom.set_attr(content, "id", CONTENT_ID);
        let _ = dom.append_child(content, placeholder);
        let _ = dom.append_child(root, content);

        Self {
            socket,
            viewport,
            dom,
            content,
            last_scrolled: None,
            saved: BTreeSet::new(),
        }
    }

    pub fn dom(&self) -> &Dom {
        &self.dom
    }

    /// The container server fragments are patched into
    pub fn content(&self) -> NodeId {
        self.content
    }

    pub fn socket(&self) -> &S {
        &self.socket
    }

    pub fn viewport(&self) -> &V {
        &self.viewport
    }

    /// Cells whose code the server has confirmed as saved at least once
    pub fn saved_cells(&self) -> &BTreeSet<String> {
        &self.saved
    }

    pub fn on_message(&mut self, message: ServerMessage) -> Result<Handled> {
        match message {
            ServerMessage::Update(html) => self.apply_update(&html).map(Handled::Patched),
            ServerMessage::CodeSaved { cell_id } => {
                tracing::debug!(cell_id = %cell_id, "code saved");
                self.saved.insert(cell_id.clone());
                Ok(Handled::CodeSaved(cell_id))
            }
        }
    }

    /// Patch a pushed fragment into the content container
    pub fn apply_update(&mut self, html: &str) -> Result<Patch> {
        let fragment = parse_fragment(html)?;
        let patch = morph_children(&mut self.dom, self.content, &fragment)?;
        tracing::trace!(
            created = patch.created,
            removed = patch.removed,
            updated = patch.updated,
            "document patched"
        );
        self.scroll_to_focus();
        Ok(patch)
    }

    fn scroll_to_focus(&mut self) {
        let Some(target) = self.dom.find_by_class(self.content, SCROLL_FOCUS_CLASS) else {
            return;
        };
        if self.last_scrolled == Some(target) {
            return;
        }
        tracing::debug!(?target, "scrolling focus element into view");
        self.viewport
            .scroll_into_view(&self.dom, target, ScrollBehavior::Smooth);
        self.last_scrolled = Some(target);
    }

    pub fn key_down(&mut self, event: &KeyEvent) {
        if let Some(key) = event.combo() {
            self.socket.emit(ClientMessage::Keydown { key });
        }
    }

    pub fn run_cell(&mut self, cell_id: &str) {
        self.socket.emit(ClientMessage::RunCell {
            cell_id: cell_id.to_string(),
        });
    }

    pub fn save_code(&mut self, cell_id: &str, content: &str) {
        self.socket.emit(ClientMessage::SaveCode {
            cell_id: cell_id.to_string(),
            content: content.to_string(),
        });
    }
}

impl<S: Socket, V: Viewport> CustomElement for LiveDocument<S, V> {
    fn observed_attributes(&self) -> &'static [&'static str] {
        &[]
    }

    fn connected(&mut self) {
        tracing::debug!("live document connected");
        self.socket.emit(ClientMessage::Loaded {});
    }

    fn attribute_changed(&mut self, _name: &str, _old: Option<&str>, _new: Option<&str>) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::ElementHost;

    #[derive(Default)]
    struct FakeSocket {
        sent: Vec<ClientMessage>,
    }

    impl Socket for FakeSocket {
        fn emit(&mut self, message: ClientMessage) {
            self.sent.push(message);
        }
    }

    #[derive(Default)]
    struct FakeViewport {
        scrolled: Vec<(NodeId, ScrollBehavior)>,
    }

    impl Viewport for FakeViewport {
        fn scroll_into_view(&mut self, _dom: &Dom, node: NodeId, behavior: ScrollBehavior) {
            self.scrolled.push((node, behavior));
        }
    }

    type Doc = LiveDocument<FakeSocket, FakeViewport>;

    fn doc() -> Doc {
        LiveDocument::new(FakeSocket::default(), FakeViewport::default())
    }

    #[test]
    fn connecting_announces_loaded() {
        let mut host = ElementHost::new(TAG, doc());
        host.connect();
        assert_eq!(host.element().socket().sent, vec![ClientMessage::Loaded {}]);
    }

    #[test]
    fn starts_with_placeholder() {
        let doc = doc();
        assert_eq!(doc.dom().text_content(doc.content()), PLACEHOLDER);
        assert_eq!(doc.dom().find_by_id(CONTENT_ID), Some(doc.content()));
    }

    #[test]
    fn update_replaces_only_content_children() {
        let mut doc = doc();
        let content = doc.content();
        doc.on_message(ServerMessage::Update("<h1>Zima Notebook</h1>".into()))
            .unwrap();

        assert_eq!(doc.content(), content);
        assert_eq!(doc.dom().inner_html(content), "<h1>Zima Notebook</h1>");
        assert_eq!(doc.dom().attr(content, "id"), Some(CONTENT_ID));
    }

    #[test]
    fn repeated_focus_element_scrolls_once() {
        let mut doc = doc();
        let html = r#"<div class="cell">a</div><div class="cell scroll-focus">b</div>"#;

        doc.apply_update(html).unwrap();
        doc.apply_update(html).unwrap();
        doc.apply_update(r#"<div class="cell">a</div><div class="cell scroll-focus">b2</div>"#)
            .unwrap();

        let scrolled = &doc.viewport().scrolled;
        assert_eq!(scrolled.len(), 1);
        assert_eq!(scrolled[0].1, ScrollBehavior::Smooth);
    }

    #[test]
    fn new_focus_element_scrolls_again() {
        let mut doc = doc();
        doc.apply_update(r#"<div id="a" class="scroll-focus">a</div><div id="b">b</div>"#)
            .unwrap();
        doc.apply_update(r#"<div id="a">a</div><div id="b" class="scroll-focus">b</div>"#)
            .unwrap();
        doc.apply_update(r#"<div id="a">a</div><div id="b" class="scroll-focus">b</div>"#)
            .unwrap();

        let targets: Vec<NodeId> = doc.viewport().scrolled.iter().map(|(n, _)| *n).collect();
        assert_eq!(targets.len(), 2);
        assert_eq!(targets[1], doc.dom().find_by_id("b").unwrap());
    }

    #[test]
    fn malformed_update_leaves_document_untouched() {
        let mut doc = doc();
        doc.apply_update("<p>ok</p>").unwrap();
        assert!(doc.apply_update("<p a=\"1\" a=\"2\">").is_err());
        assert_eq!(doc.dom().inner_html(doc.content()), "<p>ok</p>");
    }

    #[test]
    fn ctrl_alt_key_combo() {
        let mut doc = doc();
        doc.key_down(&KeyEvent::new("s").ctrl().alt());
        assert_eq!(
            doc.socket().sent,
            vec![ClientMessage::Keydown {
                key: "Ctrl+Alt+s".into()
            }]
        );
    }

    #[test]
    fn combo_orders_all_modifiers() {
        let event = KeyEvent::new("Enter").meta().shift().alt().ctrl();
        assert_eq!(event.combo().as_deref(), Some("Ctrl+Alt+Shift+Meta+Enter"));
        assert_eq!(KeyEvent::new("x").combo().as_deref(), Some("x"));
    }

    #[test]
    fn bare_modifiers_are_not_sent() {
        let mut doc = doc();
        doc.key_down(&KeyEvent::new("Control").ctrl());
        assert!(doc.socket().sent.is_empty());
    }

    #[test]
    fn cell_actions_are_forwarded() {
        let mut doc = doc();
        doc.run_cell("a1");
        doc.save_code("a1", "ls -la");
        assert_eq!(
            doc.socket().sent,
            vec![
                ClientMessage::RunCell {
                    cell_id: "a1".into()
                },
                ClientMessage::SaveCode {
                    cell_id: "a1".into(),
                    content: "ls -la".into()
                },
            ]
        );
    }

    #[test]
    fn code_saved_is_recorded() {
        let mut doc = doc();
        let handled = doc
            .on_message(ServerMessage::CodeSaved {
                cell_id: "a1".into(),
            })
            .unwrap();
        assert_eq!(handled, Handled::CodeSaved("a1".into()));
        assert!(doc.saved_cells().contains("a1"));
    }

    #[test]
    fn repeated_saves_are_kept_once_per_cell() {
        let mut doc = doc();
        for cell_id in ["b2", "a1", "b2", "a1", "a1"] {
            doc.on_message(ServerMessage::CodeSaved {
                cell_id: cell_id.into(),
            })
            .unwrap();
        }
        let saved: Vec<&str> = doc.saved_cells().iter().map(String::as_str).collect();
        assert_eq!(saved, vec!["a1", "b2"]);
    }
}
