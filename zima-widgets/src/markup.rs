//! Owned markup trees: builder, serializer and fragment parser.
//!
//! The server renders notebook fragments with [`Element`] and the live
//! document parses them back with [`parse_fragment`]. Serialization always
//! closes void elements (`<hr/>`), so every rendered fragment is also
//! well-formed XML and round-trips through the parser.

use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::{Result, WidgetError};

/// Elements that never have children or an end tag
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source",
    "track", "wbr",
];

/// Check whether a tag is a void element
pub fn is_void(tag: &str) -> bool {
    VOID_ELEMENTS.contains(&tag)
}

/// A node of an owned markup tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Markup {
    Element(Element),
    Text(String),
}

/// An element with ordered attributes and children
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub tag: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<Markup>,
}

impl Element {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Builder: set an attribute, replacing an earlier value
    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        let value = value.into();
        match self.attrs.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.attrs.push((name, value)),
        }
        self
    }

    /// Builder: append a class token
    pub fn class(mut self, class: impl AsRef<str>) -> Self {
        let class = class.as_ref();
        match self.attrs.iter_mut().find(|(n, _)| n == "class") {
            Some((_, existing)) if !existing.is_empty() => {
                existing.push(' ');
                existing.push_str(class);
            }
            Some((_, existing)) => existing.push_str(class),
            None => self.attrs.push(("class".into(), class.to_string())),
        }
        self
    }

    /// Builder: set the `id` attribute
    pub fn id(self, id: impl Into<String>) -> Self {
        self.attr("id", id)
    }

    /// Builder: append a child
    pub fn child(mut self, child: impl Into<Markup>) -> Self {
        self.children.push(child.into());
        self
    }

    /// Builder: append several children
    pub fn children<I, M>(mut self, children: I) -> Self
    where
        I: IntoIterator<Item = M>,
        M: Into<Markup>,
    {
        self.children.extend(children.into_iter().map(Into::into));
        self
    }

    /// Builder: append a text child
    pub fn text(self, text: impl Into<String>) -> Self {
        self.child(Markup::Text(text.into()))
    }

    /// Look up an attribute value
    pub fn get_attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Serialize this element and its subtree
    pub fn to_html(&self) -> String {
        let mut out = String::new();
        write_element(self, &mut out);
        out
    }
}

impl Markup {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Self::Element(el) => Some(el),
            Self::Text(_) => None,
        }
    }

    pub fn to_html(&self) -> String {
        let mut out = String::new();
        write_markup(self, &mut out);
        out
    }
}

impl From<Element> for Markup {
    fn from(el: Element) -> Self {
        Self::Element(el)
    }
}

impl From<&str> for Markup {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for Markup {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

/// Serialize a sequence of sibling nodes
pub fn render(nodes: &[Markup]) -> String {
    let mut out = String::new();
    for node in nodes {
        write_markup(node, &mut out);
    }
    out
}

fn write_markup(node: &Markup, out: &mut String) {
    match node {
        Markup::Element(el) => write_element(el, out),
        Markup::Text(text) => out.push_str(&escape(text.as_str())),
    }
}

fn write_element(el: &Element, out: &mut String) {
    out.push('<');
    out.push_str(&el.tag);
    for (name, value) in &el.attrs {
        out.push(' ');
        out.push_str(name);
        out.push_str("=\"");
        out.push_str(&escape(value.as_str()));
        out.push('"');
    }

    if is_void(&el.tag) {
        out.push_str("/>");
        return;
    }

    out.push('>');
    for child in &el.children {
        write_markup(child, out);
    }
    out.push_str("</");
    out.push_str(&el.tag);
    out.push('>');
}

/// Parse an HTML fragment into sibling nodes.
///
/// Tolerates unclosed void elements, stray end tags and unknown entities
/// (kept verbatim). Comments, doctypes and processing instructions are
/// dropped.
pub fn parse_fragment(html: &str) -> Result<Vec<Markup>> {
    let mut reader = Reader::from_str(html);
    reader.trim_text(false);
    reader.check_end_names(false);

    let mut roots: Vec<Markup> = Vec::new();
    let mut stack: Vec<Element> = Vec::new();

    loop {
        let event = reader
            .read_event()
            .map_err(|e| WidgetError::markup(reader.buffer_position(), e.to_string()))?;

        match event {
            Event::Start(start) => {
                let el = start_element(&start, reader.buffer_position())?;
                if is_void(&el.tag) {
                    push_node(&mut stack, &mut roots, Markup::Element(el));
                } else {
                    stack.push(el);
                }
            }
            Event::Empty(start) => {
                let el = start_element(&start, reader.buffer_position())?;
                push_node(&mut stack, &mut roots, Markup::Element(el));
            }
            Event::End(end) => {
                let tag = String::from_utf8_lossy(end.name().as_ref()).to_ascii_lowercase();
                if is_void(&tag) {
                    continue;
                }
                // Close up to the matching open element; ignore stray end tags
                if let Some(depth) = stack.iter().rposition(|el| el.tag == tag) {
                    while stack.len() > depth {
                        close_top(&mut stack, &mut roots);
                    }
                } else {
                    tracing::debug!(tag = %tag, "ignoring stray end tag");
                }
            }
            Event::Text(text) => {
                let content = match text.unescape() {
                    Ok(content) => content.into_owned(),
                    Err(_) => String::from_utf8_lossy(&text).into_owned(),
                };
                if !content.is_empty() {
                    push_text(&mut stack, &mut roots, content);
                }
            }
            Event::CData(data) => {
                push_text(&mut stack, &mut roots, String::from_utf8_lossy(&data).into_owned());
            }
            Event::Eof => break,
            _ => {}
        }
    }

    while !stack.is_empty() {
        close_top(&mut stack, &mut roots);
    }

    Ok(roots)
}

fn start_element(start: &BytesStart<'_>, position: usize) -> Result<Element> {
    let tag = String::from_utf8_lossy(start.name().as_ref()).to_ascii_lowercase();
    let mut el = Element::new(tag);

    for attr in start.html_attributes() {
        let attr = attr.map_err(|e| WidgetError::markup(position, e.to_string()))?;
        let name = String::from_utf8_lossy(attr.key.as_ref()).to_ascii_lowercase();
        let value = match attr.unescape_value() {
            Ok(value) => value.into_owned(),
            Err(_) => String::from_utf8_lossy(&attr.value).into_owned(),
        };
        el = el.attr(name, value);
    }

    Ok(el)
}

fn push_node(stack: &mut [Element], roots: &mut Vec<Markup>, node: Markup) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(node),
        None => roots.push(node),
    }
}

fn push_text(stack: &mut [Element], roots: &mut Vec<Markup>, text: String) {
    let siblings = match stack.last_mut() {
        Some(parent) => &mut parent.children,
        None => roots,
    };
    // Adjacent text (e.g. around CDATA) collapses into one node like the DOM does
    if let Some(Markup::Text(existing)) = siblings.last_mut() {
        existing.push_str(&text);
    } else {
        siblings.push(Markup::Text(text));
    }
}

fn close_top(stack: &mut Vec<Element>, roots: &mut Vec<Markup>) {
    if let Some(el) = stack.pop() {
        push_node(stack, roots, Markup::Element(el));
    }
}
