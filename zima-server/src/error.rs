//! Error types for zima-server

use std::path::PathBuf;

use thiserror::Error;
use zima_widgets::WidgetError;

pub type ServerResult<T> = Result<T, ServerError>;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("IO error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Notebook parse error: {0}")]
    Parse(String),

    #[error("Cell not found: {0}")]
    CellNotFound(String),

    #[error("Table not found: {cell}/{table}")]
    TableNotFound { cell: String, table: String },

    #[error("Invalid {what}: {value:?}")]
    InvalidName { what: &'static str, value: String },

    #[error("Notebook is already open in another process (lock held on {path:?})")]
    Locked { path: PathBuf },

    #[error("Cell already running: {0}")]
    AlreadyRunning(String),

    #[error("Cell timed out after {seconds} seconds")]
    Timeout { seconds: u64 },

    #[error("CSV error in {path:?}: {source}")]
    Csv { path: PathBuf, source: csv::Error },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Widget(#[from] WidgetError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Server IO error: {0}")]
    Server(#[from] std::io::Error),
}

impl ServerError {
    /// Attach a path to an IO failure
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn csv(path: impl Into<PathBuf>, source: csv::Error) -> Self {
        Self::Csv {
            path: path.into(),
            source,
        }
    }
}
