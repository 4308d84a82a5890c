//! Cell execution
//!
//! Provides a trait for running a cell's script, with:
//! - Shell implementation using tokio::process
//! - Mock implementation for testing
//! - Timeout enforcement

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use uuid::Uuid;

use crate::error::{ServerError, ServerResult};

/// Default cell timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 600;

/// Environment variable pointing a run at its output directory
pub const OUTPUT_DIR_ENV: &str = "ZIMA_OUTPUT_DIR";

/// Everything an executor needs to run one cell
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub run_id: Uuid,
    pub cell_id: String,
    /// Preamble and cell code joined by a newline
    pub script: String,
    pub code_hash: String,
    pub preamble_hash: String,
    pub workdir: PathBuf,
    pub output_dir: PathBuf,
    /// Combined stdout and stderr of the run
    pub pending_log: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOutcome {
    pub success: bool,
    pub exit_code: Option<i32>,
}

impl RunOutcome {
    pub fn exited(code: i32) -> Self {
        Self {
            success: code == 0,
            exit_code: Some(code),
        }
    }
}

/// Trait for cell execution (testable)
#[async_trait]
pub trait CellExecutor: Send + Sync {
    async fn execute(&self, request: &RunRequest) -> ServerResult<RunOutcome>;
}

/// Runs cells as `<shell> -c <script>`
#[derive(Debug, Clone)]
pub struct ShellExecutor {
    shell: String,
    timeout: Duration,
}

impl Default for ShellExecutor {
    fn default() -> Self {
        Self::new("sh", Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }
}

impl ShellExecutor {
    pub fn new(shell: impl Into<String>, timeout: Duration) -> Self {
        Self {
            shell: shell.into(),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl CellExecutor for ShellExecutor {
    async fn execute(&self, request: &RunRequest) -> ServerResult<RunOutcome> {
        // Tables from the previous run would otherwise linger
        if request.output_dir.exists() {
            tokio::fs::remove_dir_all(&request.output_dir)
                .await
                .map_err(|e| ServerError::io(&request.output_dir, e))?;
        }
        tokio::fs::create_dir_all(&request.output_dir)
            .await
            .map_err(|e| ServerError::io(&request.output_dir, e))?;

        let log = std::fs::File::create(&request.pending_log)
            .map_err(|e| ServerError::io(&request.pending_log, e))?;
        let log_err = log
            .try_clone()
            .map_err(|e| ServerError::io(&request.pending_log, e))?;

        let mut child = Command::new(&self.shell)
            .arg("-c")
            .arg(&request.script)
            .current_dir(&request.workdir)
            .env(OUTPUT_DIR_ENV, &request.output_dir)
            .env("ZIMA_CELL_ID", &request.cell_id)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err))
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ServerError::io(&request.workdir, e))?;

        tracing::debug!(
            run_id = %request.run_id,
            cell_id = %request.cell_id,
            pid = child.id(),
            "cell process started"
        );

        let waited = tokio::time::timeout(self.timeout, child.wait()).await;
        match waited {
            Ok(status) => {
                let status = status.map_err(|e| ServerError::io(&request.workdir, e))?;
                Ok(RunOutcome {
                    success: status.success(),
                    exit_code: status.code(),
                })
            }
            Err(_) => {
                tracing::warn!(cell_id = %request.cell_id, "cell timed out, killing");
                if let Err(e) = child.kill().await {
                    tracing::error!(cell_id = %request.cell_id, error = %e, "failed to kill cell process");
                }
                Err(ServerError::Timeout {
                    seconds: self.timeout.as_secs(),
                })
            }
        }
    }
}

/// Mock executor for testing: records runs and returns queued outcomes
#[derive(Default)]
pub struct MockExecutor {
    outcomes: Mutex<Vec<RunOutcome>>,
    tables: Mutex<Vec<(String, String)>>,
    runs: Mutex<Vec<String>>,
}

impl MockExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Outcome for the next run; runs without a queued outcome succeed
    pub fn add_outcome(&self, outcome: RunOutcome) {
        self.outcomes.lock().unwrap().push(outcome);
    }

    /// CSV table written into the output directory of every run
    pub fn add_table(&self, name: impl Into<String>, csv: impl Into<String>) {
        self.tables.lock().unwrap().push((name.into(), csv.into()));
    }

    /// Cell ids run so far, in order
    pub fn runs(&self) -> Vec<String> {
        self.runs.lock().unwrap().clone()
    }
}

#[async_trait]
impl CellExecutor for MockExecutor {
    async fn execute(&self, request: &RunRequest) -> ServerResult<RunOutcome> {
        self.runs.lock().unwrap().push(request.cell_id.clone());

        let tables = self.tables.lock().unwrap().clone();
        if !tables.is_empty() {
            std::fs::create_dir_all(&request.output_dir)
                .map_err(|e| ServerError::io(&request.output_dir, e))?;
            for (name, csv) in tables {
                let path = request.output_dir.join(format!("{name}.csv"));
                std::fs::write(&path, csv).map_err(|e| ServerError::io(&path, e))?;
            }
        }

        let mut outcomes = self.outcomes.lock().unwrap();
        if outcomes.is_empty() {
            Ok(RunOutcome::exited(0))
        } else {
            Ok(outcomes.remove(0))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn request(dir: &TempDir, script: &str) -> RunRequest {
        RunRequest {
            run_id: Uuid::new_v4(),
            cell_id: "a1".into(),
            script: script.into(),
            code_hash: String::new(),
            preamble_hash: String::new(),
            workdir: dir.path().to_path_buf(),
            output_dir: dir.path().join("out"),
            pending_log: dir.path().join("a1.pending.log"),
        }
    }

    #[tokio::test]
    async fn shell_run_captures_output() {
        let dir = TempDir::new().unwrap();
        let req = request(&dir, "X=hello\necho $X; echo oops >&2");
        let outcome = ShellExecutor::default().execute(&req).await.unwrap();

        assert!(outcome.success);
        let log = std::fs::read_to_string(&req.pending_log).unwrap();
        assert!(log.contains("hello"));
        assert!(log.contains("oops"));
    }

    #[tokio::test]
    async fn shell_run_reports_exit_code() {
        let dir = TempDir::new().unwrap();
        let outcome = ShellExecutor::default()
            .execute(&request(&dir, "exit 3"))
            .await
            .unwrap();
        assert_eq!(outcome, RunOutcome::exited(3));
    }

    #[tokio::test]
    async fn shell_run_writes_tables_to_output_dir() {
        let dir = TempDir::new().unwrap();
        let req = request(&dir, "printf 'a,b\\n1,2\\n' > \"$ZIMA_OUTPUT_DIR/t.csv\"");
        ShellExecutor::default().execute(&req).await.unwrap();
        assert!(req.output_dir.join("t.csv").is_file());
    }

    #[tokio::test]
    async fn stale_outputs_are_cleared() {
        let dir = TempDir::new().unwrap();
        let req = request(&dir, "true");
        std::fs::create_dir_all(&req.output_dir).unwrap();
        std::fs::write(req.output_dir.join("old.csv"), "a\n").unwrap();

        ShellExecutor::default().execute(&req).await.unwrap();
        assert!(!req.output_dir.join("old.csv").exists());
    }

    #[tokio::test]
    async fn shell_run_times_out() {
        let dir = TempDir::new().unwrap();
        let executor = ShellExecutor::new("sh", Duration::from_millis(100));
        let result = executor.execute(&request(&dir, "sleep 5")).await;
        assert!(matches!(result, Err(ServerError::Timeout { .. })));
    }

    #[tokio::test]
    async fn mock_executor_returns_queued_outcomes() {
        let dir = TempDir::new().unwrap();
        let mock = MockExecutor::new();
        mock.add_outcome(RunOutcome::exited(1));

        let req = request(&dir, "ignored");
        assert!(!mock.execute(&req).await.unwrap().success);
        assert!(mock.execute(&req).await.unwrap().success);
        assert_eq!(mock.runs(), vec!["a1", "a1"]);
    }
}
