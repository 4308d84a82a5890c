//! Health check endpoint

use axum::extract::State;
use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub notebook: String,
    pub cells: usize,
}

/// GET /health
async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let notebook = state.notebook().read().await;
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        notebook: notebook.path().display().to_string(),
        cells: notebook.cells().len(),
    })
}

/// Health routes
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::MockExecutor;
    use crate::notebook::Notebook;
    use std::sync::Arc;

    #[tokio::test]
    async fn health_reports_cell_count() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nb.zima");
        std::fs::write(&path, "#%cell a\ntrue\n#%cell b\ntrue\n").unwrap();
        let state = AppState::new(Notebook::open(&path).unwrap(), Arc::new(MockExecutor::new()), "t");

        let Json(body) = health(State(state)).await;
        assert_eq!(body.status, "ok");
        assert_eq!(body.cells, 2);
    }
}
