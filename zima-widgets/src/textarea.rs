//! Tracked textarea widget.
//!
//! A text box fed from the `text` attribute that remembers whether the
//! user's content diverged from the last server value. While edited, later
//! `text` updates do not clobber the local content.

use serde_json::Value;

use crate::dom::{Dom, NodeId};
use crate::element::{CustomElement, HostEvent};
use crate::event::EventDescriptor;

pub const TAG: &str = "tracked-textarea";
pub const TEXT: &str = "text";
pub const FOCUS: &str = "focus";
pub const MODIFY_EVENT: &str = "modify-event";
pub const FOCUS_EVENT: &str = "focus-event";

/// Detail key carrying the field content on modify events
pub const CONTENT_KEY: &str = "content";

const OBSERVED: &[&str] = &[TEXT, FOCUS, MODIFY_EVENT, FOCUS_EVENT];

/// Receives the widget's configured events
pub trait EventSink {
    fn dispatch(&mut self, name: &str, detail: Value);
}

pub struct TrackedTextarea<E> {
    events: E,
    shadow: Dom,
    field: NodeId,
    value: String,
    server_value: String,
    edited: bool,
    focused: bool,
    modify_event: Option<EventDescriptor>,
    focus_event: Option<EventDescriptor>,
}

impl<E: EventSink> TrackedTextarea<E> {
    pub fn new(events: E) -> Self {
        let mut shadow = Dom::new("#shadow-root");
        let root = shadow.root();
        let field = shadow.create_element("textarea");
        // A fresh element always attaches
        let _ = shadow.append_child(root, field);

        Self {
            events,
            shadow,
            field,
            value: String::new(),
            server_value: String::new(),
            edited: false,
            focused: false,
            modify_event: None,
            focus_event: None,
        }
    }

    /// Current field content
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Last value provided through the `text` attribute
    pub fn server_value(&self) -> &str {
        &self.server_value
    }

    pub fn is_edited(&self) -> bool {
        self.edited
    }

    pub fn is_focused(&self) -> bool {
        self.focused
    }

    pub fn shadow(&self) -> &Dom {
        &self.shadow
    }

    pub fn events(&self) -> &E {
        &self.events
    }

    pub fn modify_event(&self) -> Option<&EventDescriptor> {
        self.modify_event.as_ref()
    }

    pub fn focus_event(&self) -> Option<&EventDescriptor> {
        self.focus_event.as_ref()
    }

    fn set_field(&mut self, value: &str) {
        self.value = value.to_string();
        if let Err(e) = self.shadow.set_text_content(self.field, value) {
            tracing::warn!(error = %e, "failed to render textarea content");
        }
        self.sync_edited_marker();
    }

    fn sync_edited_marker(&mut self) {
        let result = if self.edited {
            self.shadow.set_attr(self.field, "data-edited", "true").map(|_| ())
        } else {
            self.shadow.remove_attr(self.field, "data-edited").map(|_| ())
        };
        if let Err(e) = result {
            tracing::warn!(error = %e, "failed to mark textarea edit state");
        }
    }

    fn server_text_changed(&mut self, text: &str) {
        self.server_value = text.to_string();
        if !self.edited {
            self.set_field(text);
        } else if self.value == self.server_value {
            tracing::debug!("server caught up with local edits");
            self.edited = false;
            self.sync_edited_marker();
        }
    }

    /// User typed; `value` is the complete new content
    pub fn input(&mut self, value: &str) {
        self.edited = value != self.server_value;
        self.set_field(value);

        if let Some(descriptor) = &self.modify_event {
            let detail = descriptor.detail_with(CONTENT_KEY, self.value.clone());
            self.events.dispatch(&descriptor.name, detail);
        }
    }

    /// The field received focus
    pub fn focus_gained(&mut self) {
        self.focused = true;
        if let Some(descriptor) = &self.focus_event {
            self.events.dispatch(&descriptor.name, descriptor.detail());
        }
    }

    pub fn blur(&mut self) {
        self.focused = false;
    }

    fn parse_descriptor(attribute: &str, value: Option<&str>) -> Option<EventDescriptor> {
        let value = value.filter(|v| !v.trim().is_empty())?;
        match EventDescriptor::parse(value, attribute) {
            Ok(descriptor) => Some(descriptor),
            Err(e) => {
                tracing::warn!(error = %e, attribute, "ignoring malformed event descriptor");
                None
            }
        }
    }
}

impl<E: EventSink> CustomElement for TrackedTextarea<E> {
    fn observed_attributes(&self) -> &'static [&'static str] {
        OBSERVED
    }

    fn attribute_changed(&mut self, name: &str, _old: Option<&str>, new: Option<&str>) {
        match name {
            TEXT => self.server_text_changed(new.unwrap_or_default()),
            FOCUS => {
                if new == Some("true") {
                    if !self.focused {
                        self.focus_gained();
                    }
                } else {
                    self.blur();
                }
            }
            MODIFY_EVENT => self.modify_event = Self::parse_descriptor(MODIFY_EVENT, new),
            FOCUS_EVENT => self.focus_event = Self::parse_descriptor(FOCUS_EVENT, new),
            _ => {}
        }
    }

    fn handle_event(&mut self, event: &HostEvent) {
        match event {
            HostEvent::Input(value) => self.input(value),
            HostEvent::Focus => {
                if !self.focused {
                    self.focus_gained();
                }
            }
            HostEvent::Blur => self.blur(),
            HostEvent::Columns { .. } => {}
        }
    }

    fn shadow_root(&self) -> Option<&Dom> {
        Some(&self.shadow)
    }
}
