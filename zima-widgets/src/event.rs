//! Typed descriptors for events a widget emits on behalf of its page.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, WidgetError};

/// Named event plus caller-supplied parameters.
///
/// Pages configure it as JSON in an attribute, e.g.
/// `{"name": "code-edit", "params": {"cell_id": "a1"}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventDescriptor {
    pub name: String,
    #[serde(default)]
    pub params: Map<String, Value>,
}

impl EventDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Map::new(),
        }
    }

    /// Builder: add a parameter
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Parse the JSON form carried in an attribute
    pub fn parse(attribute: &str, context: &str) -> Result<Self> {
        serde_json::from_str(attribute).map_err(|e| WidgetError::json(context, e))
    }

    /// Event detail: the parameters alone
    pub fn detail(&self) -> Value {
        Value::Object(self.params.clone())
    }

    /// Event detail: the parameters plus one extra field (which wins on collision)
    pub fn detail_with(&self, key: &str, value: impl Into<Value>) -> Value {
        let mut params = self.params.clone();
        params.insert(key.to_string(), value.into());
        Value::Object(params)
    }

    /// Attribute form of the descriptor
    pub fn to_attribute(&self) -> String {
        Value::from(self).to_string()
    }
}

impl From<&EventDescriptor> for Value {
    fn from(descriptor: &EventDescriptor) -> Self {
        serde_json::json!({
            "name": descriptor.name,
            "params": descriptor.params,
        })
    }
}

impl FromStr for EventDescriptor {
    type Err = WidgetError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s, "event descriptor")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_name_and_params() {
        let descriptor: EventDescriptor =
            r#"{"name": "code-edit", "params": {"cell_id": "a1"}}"#.parse().unwrap();
        assert_eq!(descriptor.name, "code-edit");
        assert_eq!(descriptor.params["cell_id"], json!("a1"));
    }

    #[test]
    fn params_default_to_empty() {
        let descriptor: EventDescriptor = r#"{"name": "focused"}"#.parse().unwrap();
        assert!(descriptor.params.is_empty());
        assert_eq!(descriptor.detail(), json!({}));
    }

    #[test]
    fn malformed_json_is_an_error() {
        let err = EventDescriptor::parse("{name:", "modify-event").unwrap_err();
        assert!(err.to_string().contains("modify-event"));
        assert!("[1, 2]".parse::<EventDescriptor>().is_err());
    }

    #[test]
    fn detail_with_adds_content() {
        let descriptor = EventDescriptor::new("code-edit")
            .with_param("cell_id", "a1")
            .with_param("content", "stale");
        assert_eq!(
            descriptor.detail_with("content", "ls"),
            json!({"cell_id": "a1", "content": "ls"})
        );
    }

    #[test]
    fn attribute_form_parses_back() {
        let descriptor = EventDescriptor::new("focused").with_param("cell_id", "b2");
        let parsed: EventDescriptor = descriptor.to_attribute().parse().unwrap();
        assert_eq!(parsed, descriptor);
    }
}
