//! Messages exchanged with the notebook server over the persistent socket.
//!
//! Every frame is a JSON object `{"event": <name>, "data": <payload>}`.

use serde::{Deserialize, Serialize};

use crate::error::{Result, WidgetError};

/// Client to server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Execute a cell
    RunCell { cell_id: String },
    /// Persist edited cell code
    SaveCode { cell_id: String, content: String },
    /// Key combination, e.g. `Ctrl+Alt+s`
    Keydown { key: String },
    /// Sent once after connecting
    Loaded {},
}

/// Server to client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Full document fragment for the content container
    Update(String),
    /// Code of a cell was written to the notebook
    CodeSaved { cell_id: String },
}

impl ClientMessage {
    pub fn name(&self) -> &'static str {
        match self {
            Self::RunCell { .. } => "run_cell",
            Self::SaveCode { .. } => "save_code",
            Self::Keydown { .. } => "keydown",
            Self::Loaded {} => "loaded",
        }
    }

    pub fn to_frame(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| WidgetError::json("client frame", e))
    }

    pub fn from_frame(frame: &str) -> Result<Self> {
        serde_json::from_str(frame).map_err(|e| WidgetError::json("client frame", e))
    }
}

impl ServerMessage {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Update(_) => "update",
            Self::CodeSaved { .. } => "code_saved",
        }
    }

    pub fn to_frame(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| WidgetError::json("server frame", e))
    }

    pub fn from_frame(frame: &str) -> Result<Self> {
        serde_json::from_str(frame).map_err(|e| WidgetError::json("server frame", e))
    }
}
