//! zima-server: notebook server
//!
//! Owns the notebook file and its data directory, runs cells through a
//! [`CellExecutor`], serves table pages and pushes rendered notebook
//! fragments to connected live documents.

pub mod auth;
pub mod error;
pub mod executor;
pub mod http;
pub mod notebook;
pub mod render;
pub mod state;
pub mod table_source;
pub mod updates;

pub use error::{ServerError, ServerResult};
pub use executor::{CellExecutor, MockExecutor, RunOutcome, RunRequest, ShellExecutor};
pub use http::{build_router, run_server, ServerConfig};
pub use notebook::{CellStatus, Notebook};
pub use state::AppState;
pub use table_source::CsvTable;
