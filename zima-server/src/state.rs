//! Application state shared across handlers and background tasks

use std::sync::Arc;

use tokio::sync::{broadcast, RwLock};
use tracing::Instrument;

use crate::error::ServerResult;
use crate::executor::{CellExecutor, RunOutcome};
use crate::notebook::Notebook;
use crate::render::render_notebook;

/// Rendered fragments kept for slow sockets before they lag
const UPDATE_CHANNEL_CAPACITY: usize = 16;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    notebook: RwLock<Notebook>,
    executor: Arc<dyn CellExecutor>,
    token: String,
    updates: broadcast::Sender<String>,
}

impl AppState {
    pub fn new(notebook: Notebook, executor: Arc<dyn CellExecutor>, token: impl Into<String>) -> Self {
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(AppStateInner {
                notebook: RwLock::new(notebook),
                executor,
                token: token.into(),
                updates,
            }),
        }
    }

    pub fn notebook(&self) -> &RwLock<Notebook> {
        &self.inner.notebook
    }

    pub fn token(&self) -> &str {
        &self.inner.token
    }

    /// Receive every rendered fragment published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.inner.updates.subscribe()
    }

    /// Send a rendered fragment to all connected sockets
    pub fn publish(&self, html: String) -> usize {
        // No subscribers is not an error
        self.inner.updates.send(html).unwrap_or(0)
    }

    pub async fn render(&self) -> String {
        render_notebook(&*self.inner.notebook.read().await)
    }

    pub async fn save_code(&self, cell_id: &str, code: &str) -> ServerResult<()> {
        self.inner
            .notebook
            .write()
            .await
            .modify_cell_code(cell_id, code)
    }

    /// Run a cell to completion and record the result
    pub async fn execute_cell(&self, cell_id: &str) -> ServerResult<RunOutcome> {
        let request = self.inner.notebook.write().await.begin_run(cell_id)?;
        let span = tracing::info_span!("cell_run", run_id = %request.run_id, cell_id = %cell_id);

        tracing::info!(parent: &span, "cell run started");
        self.inner.notebook.write().await.mark_running(cell_id);

        let result = self
            .inner
            .executor
            .execute(&request)
            .instrument(span.clone())
            .await;
        match &result {
            Ok(outcome) => tracing::info!(
                parent: &span,
                success = outcome.success,
                exit_code = ?outcome.exit_code,
                "cell run finished"
            ),
            Err(e) => tracing::warn!(parent: &span, error = %e, "cell run failed"),
        }

        self.inner
            .notebook
            .write()
            .await
            .finish_run(&request, &result)?;
        result
    }

    /// Start a cell in the background. Fails right away when the cell is
    /// unknown or already running.
    pub async fn spawn_cell(&self, cell_id: &str) -> ServerResult<()> {
        {
            let notebook = self.inner.notebook.read().await;
            let record = notebook.record(cell_id)?;
            if record.status.is_active() {
                return Err(crate::error::ServerError::AlreadyRunning(cell_id.to_string()));
            }
        }

        let state = self.clone();
        let cell_id = cell_id.to_string();
        tokio::spawn(async move {
            if let Err(e) = state.execute_cell(&cell_id).await {
                tracing::debug!(cell_id = %cell_id, error = %e, "background run ended with error");
            }
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::MockExecutor;
    use crate::notebook::CellStatus;
    use tempfile::TempDir;

    fn state(dir: &TempDir, executor: Arc<MockExecutor>) -> AppState {
        let path = dir.path().join("nb.zima");
        std::fs::write(&path, "#%cell a\necho hi\n").unwrap();
        AppState::new(Notebook::open(path).unwrap(), executor, "tok")
    }

    #[tokio::test]
    async fn execute_records_success() {
        let dir = TempDir::new().unwrap();
        let executor = Arc::new(MockExecutor::new());
        let state = state(&dir, executor.clone());

        let outcome = state.execute_cell("a").await.unwrap();
        assert!(outcome.success);
        assert_eq!(executor.runs(), vec!["a"]);

        let notebook = state.notebook().read().await;
        assert_eq!(notebook.record("a").unwrap().status, CellStatus::Succeeded);
    }

    #[tokio::test]
    async fn execute_records_failure() {
        let dir = TempDir::new().unwrap();
        let executor = Arc::new(MockExecutor::new());
        executor.add_outcome(RunOutcome::exited(1));
        let state = state(&dir, executor);

        state.execute_cell("a").await.unwrap();
        let notebook = state.notebook().read().await;
        assert_eq!(notebook.record("a").unwrap().status, CellStatus::Failed);
    }

    #[tokio::test]
    async fn unknown_cell_is_rejected() {
        let dir = TempDir::new().unwrap();
        let state = state(&dir, Arc::new(MockExecutor::new()));
        assert!(state.spawn_cell("nope").await.is_err());
        assert!(state.execute_cell("nope").await.is_err());
    }

    #[tokio::test]
    async fn save_code_rewrites_notebook() {
        let dir = TempDir::new().unwrap();
        let state = state(&dir, Arc::new(MockExecutor::new()));
        state.save_code("a", "echo bye").await.unwrap();
        assert!(state.render().await.contains("echo bye"));
    }

    #[tokio::test]
    async fn published_updates_reach_subscribers() {
        let dir = TempDir::new().unwrap();
        let state = state(&dir, Arc::new(MockExecutor::new()));
        assert_eq!(state.publish("ignored".into()), 0);

        let mut rx = state.subscribe();
        assert_eq!(state.publish("<p>x</p>".into()), 1);
        assert_eq!(rx.recv().await.unwrap(), "<p>x</p>");
    }
}
