//! Custom element lifecycle and registration.
//!
//! A widget implements [`CustomElement`]; an [`ElementHost`] owns the
//! element's attribute map and delivers lifecycle callbacks the way the
//! platform does: attribute changes only for observed names (with old and
//! new value, also when they are equal), `connected` once per insertion.

use std::collections::BTreeMap;
use std::fmt;

use crate::dom::Dom;
use crate::error::{Result, WidgetError};
use crate::table::FetchTicket;

/// Names the platform reserves even though they contain a hyphen
const RESERVED_NAMES: &[&str] = &[
    "annotation-xml",
    "color-profile",
    "font-face",
    "font-face-src",
    "font-face-uri",
    "font-face-format",
    "font-face-name",
    "missing-glyph",
];

/// Something the page delivers to an upgraded element besides attributes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    /// The user edited the element's field; carries the full new content
    Input(String),
    Focus,
    Blur,
    /// Response to a column request the element issued
    Columns {
        ticket: FetchTicket,
        result: std::result::Result<Vec<String>, String>,
    },
}

/// Lifecycle hooks of a custom element
pub trait CustomElement {
    /// Attributes whose changes are delivered to `attribute_changed`
    fn observed_attributes(&self) -> &'static [&'static str];

    fn connected(&mut self) {}

    fn disconnected(&mut self) {}

    fn attribute_changed(&mut self, name: &str, old: Option<&str>, new: Option<&str>);

    fn handle_event(&mut self, _event: &HostEvent) {}

    /// The element's rendered shadow tree, if it has one
    fn shadow_root(&self) -> Option<&Dom> {
        None
    }
}

impl<E: CustomElement + ?Sized> CustomElement for Box<E> {
    fn observed_attributes(&self) -> &'static [&'static str] {
        (**self).observed_attributes()
    }

    fn connected(&mut self) {
        (**self).connected()
    }

    fn disconnected(&mut self) {
        (**self).disconnected()
    }

    fn attribute_changed(&mut self, name: &str, old: Option<&str>, new: Option<&str>) {
        (**self).attribute_changed(name, old, new)
    }

    fn handle_event(&mut self, event: &HostEvent) {
        (**self).handle_event(event)
    }

    fn shadow_root(&self) -> Option<&Dom> {
        (**self).shadow_root()
    }
}

/// An element instance: tag, attributes and the widget behind them
pub struct ElementHost<E> {
    tag: String,
    attributes: BTreeMap<String, String>,
    connected: bool,
    element: E,
}

impl<E: CustomElement> ElementHost<E> {
    pub fn new(tag: impl Into<String>, element: E) -> Self {
        Self {
            tag: tag.into(),
            attributes: BTreeMap::new(),
            connected: false,
            element,
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn get_attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn set_attribute(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        let old = self.attributes.insert(name.to_string(), value.clone());
        self.notify(name, old.as_deref(), Some(&value));
    }

    pub fn remove_attribute(&mut self, name: &str) {
        if let Some(old) = self.attributes.remove(name) {
            self.notify(name, Some(&old), None);
        }
    }

    fn notify(&mut self, name: &str, old: Option<&str>, new: Option<&str>) {
        if self.element.observed_attributes().contains(&name) {
            tracing::trace!(tag = %self.tag, attribute = name, "attribute changed");
            self.element.attribute_changed(name, old, new);
        }
    }

    /// Insert into the page. Repeated calls while connected are ignored.
    pub fn connect(&mut self) {
        if !self.connected {
            self.connected = true;
            self.element.connected();
        }
    }

    pub fn disconnect(&mut self) {
        if self.connected {
            self.connected = false;
            self.element.disconnected();
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn element(&self) -> &E {
        &self.element
    }

    pub fn element_mut(&mut self) -> &mut E {
        &mut self.element
    }
}

impl<E> fmt::Debug for ElementHost<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElementHost")
            .field("tag", &self.tag)
            .field("attributes", &self.attributes)
            .field("connected", &self.connected)
            .finish_non_exhaustive()
    }
}

type Constructor = Box<dyn Fn() -> Box<dyn CustomElement>>;

/// Tag name to constructor map
#[derive(Default)]
pub struct Registry {
    definitions: BTreeMap<String, Constructor>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a constructor under a custom element name
    pub fn define<F>(&mut self, name: &str, constructor: F) -> Result<()>
    where
        F: Fn() -> Box<dyn CustomElement> + 'static,
    {
        validate_name(name)?;
        if self.definitions.contains_key(name) {
            return Err(WidgetError::AlreadyDefined(name.to_string()));
        }
        tracing::debug!(name, "custom element defined");
        self.definitions.insert(name.to_string(), Box::new(constructor));
        Ok(())
    }

    pub fn is_defined(&self, name: &str) -> bool {
        self.definitions.contains_key(name)
    }

    /// Construct a fresh, disconnected instance
    pub fn create(&self, name: &str) -> Result<ElementHost<Box<dyn CustomElement>>> {
        let constructor = self
            .definitions
            .get(name)
            .ok_or_else(|| WidgetError::NotDefined(name.to_string()))?;
        Ok(ElementHost::new(name, constructor()))
    }
}

/// Check a custom element name against the platform rules
pub fn validate_name(name: &str) -> Result<()> {
    let invalid = |reason| {
        Err(WidgetError::InvalidElementName {
            name: name.to_string(),
            reason,
        })
    };

    if !name.starts_with(|c: char| c.is_ascii_lowercase()) {
        return invalid("must start with a lowercase ASCII letter");
    }
    if !name.contains('-') {
        return invalid("must contain a hyphen");
    }
    if name.chars().any(|c| c.is_ascii_uppercase()) {
        return invalid("must not contain uppercase ASCII letters");
    }
    if name
        .chars()
        .any(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_') || !c.is_ascii()))
    {
        return invalid("contains a character not allowed in element names");
    }
    if RESERVED_NAMES.contains(&name) {
        return invalid("name is reserved");
    }
    Ok(())
}
