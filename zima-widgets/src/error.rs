/// Structured error types for zima-widgets.
///
/// Widgets never panic on bad input from the page or the server; every
/// failure surfaces as a `WidgetError` that the host can log or display.

use thiserror::Error;

use crate::dom::NodeId;

/// Main error type for widget operations
#[derive(Error, Debug)]
pub enum WidgetError {
    /// Markup fragment could not be parsed
    #[error("Markup error at byte {position}: {reason}")]
    Markup { position: usize, reason: String },

    /// JSON parsing or serialization failed
    #[error("JSON error at {context}: {source}")]
    Json {
        context: String,
        source: serde_json::Error,
    },

    /// Node id does not refer to a live node
    #[error("Node {0:?} does not exist")]
    NodeNotFound(NodeId),

    /// Operation requires an element but the node is text
    #[error("Node {0:?} is not an element")]
    NotAnElement(NodeId),

    /// Operation requires a text node but the node is an element
    #[error("Node {0:?} is not a text node")]
    NotText(NodeId),

    /// Inserting the node would create a cycle
    #[error("Cannot insert node {child:?} under its own descendant {parent:?}")]
    HierarchyRequest { parent: NodeId, child: NodeId },

    /// Custom element name does not follow the naming rules
    #[error("Invalid custom element name '{name}': {reason}")]
    InvalidElementName { name: String, reason: &'static str },

    /// Custom element name registered twice
    #[error("Custom element '{0}' is already defined")]
    AlreadyDefined(String),

    /// Custom element name never registered
    #[error("Custom element '{0}' is not defined")]
    NotDefined(String),

    /// Request parameter could not be interpreted
    #[error("Invalid parameter '{name}': {value:?}")]
    InvalidParameter { name: String, value: String },
}

/// Result type alias for widget operations
pub type Result<T> = std::result::Result<T, WidgetError>;

impl WidgetError {
    /// Create a JSON error with context
    pub fn json(context: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Json {
            context: context.into(),
            source,
        }
    }

    /// Create a markup error
    pub fn markup(position: usize, reason: impl Into<String>) -> Self {
        Self::Markup {
            position,
            reason: reason.into(),
        }
    }

    /// Create an invalid parameter error
    pub fn invalid_parameter(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name: name.into(),
            value: value.into(),
        }
    }
}
