//! Notebook runtime: the parsed file plus per-cell run state.
//!
//! Run state lives next to the notebook in `<notebook>.data/`:
//! - `state.json` with the status and hashes of the last run per cell
//! - `logs/<cell>.pending.log` and `logs/<cell>.current.log`
//! - `outputs/<cell>/` where a run drops its CSV tables
//! - `lock`, held by the process that has the notebook open

pub mod format;
pub mod lock;

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::error::{ServerError, ServerResult};
use crate::executor::{RunOutcome, RunRequest};
use lock::DataDirLock;
pub use format::{content_hash, validate_cell_id, CellDef, CellHeader, NotebookDef};

static TABLE_NAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").unwrap());

const TABLE_EXTENSION: &str = "csv";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellStatus {
    #[default]
    Idle,
    Queued,
    Running,
    Succeeded,
    Failed,
}

impl CellStatus {
    pub fn is_active(self) -> bool {
        matches!(self, Self::Queued | Self::Running)
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }
}

/// Persisted run state of one cell
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CellRecord {
    pub status: CellStatus,
    pub last_started: Option<DateTime<Utc>>,
    pub last_finished: Option<DateTime<Utc>>,
    /// Hashes of the code and preamble of the last successful run
    pub code_hash: Option<String>,
    pub preamble_hash: Option<String>,
}

/// Whether a cell's last successful run used the current code and preamble
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Freshness {
    pub preamble: bool,
    pub code: bool,
}

impl Freshness {
    pub fn is_fresh(&self) -> bool {
        self.preamble && self.code
    }

    pub fn stale_reasons(&self) -> Vec<&'static str> {
        let mut reasons = Vec::new();
        if !self.preamble {
            reasons.push("preamble");
        }
        if !self.code {
            reasons.push("code");
        }
        reasons
    }
}

pub struct Notebook {
    path: PathBuf,
    data_dir: PathBuf,
    def: NotebookDef,
    preamble_hash: String,
    modified: Option<SystemTime>,
    records: BTreeMap<String, CellRecord>,
    _lock: DataDirLock,
}

impl Notebook {
    /// Load a notebook file and its run state, creating the data directory.
    /// The data directory stays locked until the notebook is dropped.
    pub fn open(path: impl Into<PathBuf>) -> ServerResult<Self> {
        let path = path.into();
        let data_dir = data_dir_for(&path);

        for dir in [data_dir.join("logs"), data_dir.join("outputs")] {
            std::fs::create_dir_all(&dir).map_err(|e| ServerError::io(&dir, e))?;
        }
        let lock = DataDirLock::acquire(&data_dir)?;

        let mut notebook = Self {
            path,
            data_dir,
            def: NotebookDef::default(),
            preamble_hash: String::new(),
            modified: None,
            records: BTreeMap::new(),
            _lock: lock,
        };
        notebook.records = notebook.load_records();
        notebook.reload()?;

        tracing::info!(
            path = %notebook.path.display(),
            cells = notebook.def.cells.len(),
            "notebook opened"
        );
        Ok(notebook)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn def(&self) -> &NotebookDef {
        &self.def
    }

    pub fn cells(&self) -> &[CellDef] {
        &self.def.cells
    }

    pub fn cell(&self, id: &str) -> ServerResult<&CellDef> {
        self.def
            .cell(id)
            .ok_or_else(|| ServerError::CellNotFound(id.to_string()))
    }

    pub fn record(&self, id: &str) -> ServerResult<&CellRecord> {
        self.cell(id)?;
        self.records
            .get(id)
            .ok_or_else(|| ServerError::CellNotFound(id.to_string()))
    }

    /// Re-read the notebook file
    pub fn reload(&mut self) -> ServerResult<()> {
        let text = std::fs::read_to_string(&self.path).map_err(|e| ServerError::io(&self.path, e))?;
        let def = NotebookDef::parse(&text)?;

        self.preamble_hash = def.preamble_hash();
        self.modified = modified_time(&self.path);

        let ids: Vec<&str> = def.cells.iter().map(|c| c.id.as_str()).collect();
        self.records.retain(|id, _| ids.contains(&id.as_str()));
        for id in ids {
            self.records.entry(id.to_string()).or_default();
        }

        self.def = def;
        Ok(())
    }

    /// Reload when the file changed on disk since the last read
    pub fn reload_if_changed(&mut self) -> ServerResult<bool> {
        let modified = modified_time(&self.path);
        if modified.is_none() || modified == self.modified {
            return Ok(false);
        }
        tracing::info!(path = %self.path.display(), "notebook changed on disk, reloading");
        // A broken edit is reported once; the next attempt waits for another write.
        self.modified = modified;
        self.reload()?;
        Ok(true)
    }

    /// Replace a cell's code and rewrite the notebook file atomically
    pub fn modify_cell_code(&mut self, id: &str, code: &str) -> ServerResult<()> {
        let updated = self.def.with_cell_code(id, code)?;
        write_atomic(&self.path, &updated.to_text())?;
        tracing::debug!(cell_id = %id, "cell code saved");
        self.reload()
    }

    pub fn freshness(&self, id: &str) -> ServerResult<Freshness> {
        let cell = self.cell(id)?;
        let record = self.record(id)?;
        Ok(Freshness {
            preamble: record.preamble_hash.as_deref() == Some(self.preamble_hash.as_str()),
            code: record.code_hash.as_deref() == Some(cell.code_hash().as_str()),
        })
    }

    /// Cell that was started most recently
    pub fn last_started(&self) -> Option<&str> {
        self.def
            .cells
            .iter()
            .filter_map(|c| {
                let started = self.records.get(&c.id)?.last_started?;
                Some((started, c.id.as_str()))
            })
            .max_by_key(|(started, _)| *started)
            .map(|(_, id)| id)
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }

    pub fn current_log(&self, id: &str) -> PathBuf {
        self.logs_dir().join(format!("{id}.current.log"))
    }

    pub fn pending_log(&self, id: &str) -> PathBuf {
        self.logs_dir().join(format!("{id}.pending.log"))
    }

    pub fn output_dir(&self, id: &str) -> PathBuf {
        self.data_dir.join("outputs").join(id)
    }

    /// Names of the CSV tables a cell produced, sorted
    pub fn table_names(&self, id: &str) -> ServerResult<Vec<String>> {
        self.cell(id)?;
        let dir = self.output_dir(id);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut names: Vec<String> = WalkDir::new(&dir)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| {
                entry.path().extension().and_then(|e| e.to_str()) == Some(TABLE_EXTENSION)
            })
            .filter_map(|entry| {
                entry
                    .path()
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .map(str::to_string)
            })
            .filter(|name| TABLE_NAME_RE.is_match(name))
            .collect();
        names.sort();
        Ok(names)
    }

    /// File backing a table; the name is checked so it cannot leave the output directory
    pub fn table_path(&self, id: &str, table: &str) -> ServerResult<PathBuf> {
        self.cell(id)?;
        if !TABLE_NAME_RE.is_match(table) {
            return Err(ServerError::InvalidName {
                what: "table name",
                value: table.to_string(),
            });
        }

        let path = self
            .output_dir(id)
            .join(format!("{table}.{TABLE_EXTENSION}"));
        if !path.is_file() {
            return Err(ServerError::TableNotFound {
                cell: id.to_string(),
                table: table.to_string(),
            });
        }
        Ok(path)
    }

    /// Cells whose `refresh_every` interval elapsed since they were last started
    pub fn due_for_refresh(&self, now: DateTime<Utc>) -> Vec<String> {
        self.def
            .cells
            .iter()
            .filter_map(|cell| {
                let every = cell.header.refresh_every?;
                let record = self.records.get(&cell.id)?;
                if record.status.is_active() {
                    return None;
                }
                let due = match record.last_started {
                    None => true,
                    Some(started) => now
                        .signed_duration_since(started)
                        .to_std()
                        .map(|elapsed| elapsed >= every)
                        .unwrap_or(false),
                };
                due.then(|| cell.id.clone())
            })
            .collect()
    }

    /// Queue a run. Fails when the cell is already queued or running.
    pub fn begin_run(&mut self, id: &str) -> ServerResult<RunRequest> {
        let cell = self.cell(id)?.clone();
        let request = RunRequest {
            run_id: uuid::Uuid::new_v4(),
            cell_id: cell.id.clone(),
            script: format!("{}\n{}", self.def.preamble, cell.code),
            code_hash: cell.code_hash(),
            preamble_hash: self.preamble_hash.clone(),
            workdir: self.workdir(),
            output_dir: self.output_dir(id),
            pending_log: self.pending_log(id),
        };

        let record = self.records.entry(cell.id).or_default();
        if record.status.is_active() {
            return Err(ServerError::AlreadyRunning(id.to_string()));
        }
        record.status = CellStatus::Queued;
        record.last_started = Some(Utc::now());
        Ok(request)
    }

    pub fn mark_running(&mut self, id: &str) {
        if let Some(record) = self.records.get_mut(id) {
            record.status = CellStatus::Running;
        }
    }

    /// Record the result of a run. A successful run promotes its pending log
    /// and marks the cell fresh for the code and preamble it ran with.
    pub fn finish_run(
        &mut self,
        request: &RunRequest,
        result: &ServerResult<RunOutcome>,
    ) -> ServerResult<()> {
        let id = request.cell_id.as_str();
        let mut succeeded = matches!(result, Ok(outcome) if outcome.success);

        if succeeded && request.pending_log.exists() {
            let current = self.current_log(id);
            if let Err(e) = std::fs::rename(&request.pending_log, &current) {
                tracing::warn!(
                    cell_id = %id,
                    path = %current.display(),
                    error = %e,
                    "could not promote run log, recording run as failed"
                );
                succeeded = false;
            }
        }

        let Some(record) = self.records.get_mut(id) else {
            tracing::debug!(cell_id = %id, "cell removed while running");
            return Ok(());
        };
        record.last_finished = Some(Utc::now());
        if succeeded {
            record.status = CellStatus::Succeeded;
            record.code_hash = Some(request.code_hash.clone());
            record.preamble_hash = Some(request.preamble_hash.clone());
        } else {
            record.status = CellStatus::Failed;
        }

        self.save_records()
    }

    fn workdir(&self) -> PathBuf {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    fn state_path(&self) -> PathBuf {
        self.data_dir.join("state.json")
    }

    fn load_records(&self) -> BTreeMap<String, CellRecord> {
        let path = self.state_path();
        let Ok(text) = std::fs::read_to_string(&path) else {
            return BTreeMap::new();
        };

        match serde_json::from_str::<BTreeMap<String, CellRecord>>(&text) {
            Ok(mut records) => {
                for (id, record) in records.iter_mut() {
                    if record.status.is_active() {
                        tracing::warn!(cell_id = %id, "run was interrupted by a restart");
                        record.status = CellStatus::Failed;
                    }
                }
                records
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable cell state");
                BTreeMap::new()
            }
        }
    }

    fn save_records(&self) -> ServerResult<()> {
        let text = serde_json::to_string_pretty(&self.records)?;
        write_atomic(&self.state_path(), &text)
    }
}

fn data_dir_for(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".data");
    PathBuf::from(name)
}

fn modified_time(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Write through a temp file in the same directory, then rename over `path`
pub fn write_atomic(path: &Path, contents: &str) -> ServerResult<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut file = tempfile::NamedTempFile::new_in(dir).map_err(|e| ServerError::io(dir, e))?;
    file.write_all(contents.as_bytes())
        .map_err(|e| ServerError::io(file.path(), e))?;
    file.persist(path)
        .map_err(|e| ServerError::io(path, e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE: &str = "export A=1\n#%cell first\necho $A\n#%cell second refresh_every=60\nls\n";

    fn notebook(dir: &TempDir) -> Notebook {
        let path = dir.path().join("nb.zima");
        std::fs::write(&path, SAMPLE).unwrap();
        Notebook::open(path).unwrap()
    }

    fn succeed(nb: &mut Notebook, id: &str) {
        let request = nb.begin_run(id).unwrap();
        std::fs::write(&request.pending_log, "done\n").unwrap();
        nb.finish_run(&request, &Ok(RunOutcome::exited(0))).unwrap();
    }

    #[test]
    fn open_creates_data_dir() {
        let dir = TempDir::new().unwrap();
        let nb = notebook(&dir);
        assert!(dir.path().join("nb.zima.data/logs").is_dir());
        assert!(dir.path().join("nb.zima.data/outputs").is_dir());
        assert_eq!(nb.cells().len(), 2);
        assert_eq!(nb.record("first").unwrap().status, CellStatus::Idle);
    }

    #[test]
    fn never_run_cells_are_stale() {
        let dir = TempDir::new().unwrap();
        let nb = notebook(&dir);
        let freshness = nb.freshness("first").unwrap();
        assert!(!freshness.is_fresh());
        assert_eq!(freshness.stale_reasons(), vec!["preamble", "code"]);
    }

    #[test]
    fn successful_run_marks_fresh_and_promotes_log() {
        let dir = TempDir::new().unwrap();
        let mut nb = notebook(&dir);
        succeed(&mut nb, "first");

        assert!(nb.freshness("first").unwrap().is_fresh());
        assert_eq!(nb.record("first").unwrap().status, CellStatus::Succeeded);
        assert!(nb.current_log("first").exists());
        assert!(!nb.pending_log("first").exists());
    }

    #[test]
    fn failed_run_keeps_pending_log() {
        let dir = TempDir::new().unwrap();
        let mut nb = notebook(&dir);
        let request = nb.begin_run("first").unwrap();
        std::fs::write(&request.pending_log, "boom\n").unwrap();
        nb.finish_run(&request, &Ok(RunOutcome::exited(2))).unwrap();

        assert_eq!(nb.record("first").unwrap().status, CellStatus::Failed);
        assert!(nb.pending_log("first").exists());
        assert!(!nb.freshness("first").unwrap().code);
    }

    #[test]
    fn editing_code_makes_cell_stale() {
        let dir = TempDir::new().unwrap();
        let mut nb = notebook(&dir);
        succeed(&mut nb, "first");

        nb.modify_cell_code("first", "echo changed").unwrap();
        let freshness = nb.freshness("first").unwrap();
        assert!(freshness.preamble);
        assert!(!freshness.code);
        assert_eq!(freshness.stale_reasons(), vec!["code"]);

        let on_disk = std::fs::read_to_string(nb.path()).unwrap();
        assert!(on_disk.contains("#%cell first\necho changed\n"));
        assert!(on_disk.starts_with("export A=1\n"));
    }

    #[test]
    fn modify_unknown_cell_leaves_file_untouched() {
        let dir = TempDir::new().unwrap();
        let mut nb = notebook(&dir);
        assert!(matches!(
            nb.modify_cell_code("nope", "ls"),
            Err(ServerError::CellNotFound(_))
        ));
        assert_eq!(std::fs::read_to_string(nb.path()).unwrap(), SAMPLE);
    }

    #[test]
    fn second_run_while_active_is_refused() {
        let dir = TempDir::new().unwrap();
        let mut nb = notebook(&dir);
        nb.begin_run("first").unwrap();
        assert!(matches!(
            nb.begin_run("first"),
            Err(ServerError::AlreadyRunning(_))
        ));
    }

    #[test]
    fn run_script_joins_preamble_and_code() {
        let dir = TempDir::new().unwrap();
        let mut nb = notebook(&dir);
        let request = nb.begin_run("first").unwrap();
        assert_eq!(request.script, "export A=1\necho $A");
        assert_eq!(request.output_dir, nb.output_dir("first"));
        assert_eq!(request.workdir, dir.path());
    }

    #[test]
    fn last_started_tracks_most_recent_cell() {
        let dir = TempDir::new().unwrap();
        let mut nb = notebook(&dir);
        assert_eq!(nb.last_started(), None);
        succeed(&mut nb, "first");
        std::thread::sleep(std::time::Duration::from_millis(5));
        succeed(&mut nb, "second");
        assert_eq!(nb.last_started(), Some("second"));
    }

    #[test]
    fn state_survives_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let mut nb = notebook(&dir);
            succeed(&mut nb, "first");
        }
        let nb = Notebook::open(dir.path().join("nb.zima")).unwrap();
        assert_eq!(nb.record("first").unwrap().status, CellStatus::Succeeded);
        assert!(nb.freshness("first").unwrap().is_fresh());
    }

    #[test]
    fn refresh_schedule_respects_interval() {
        let dir = TempDir::new().unwrap();
        let mut nb = notebook(&dir);
        let now = Utc::now();
        assert_eq!(nb.due_for_refresh(now), vec!["second".to_string()]);

        succeed(&mut nb, "second");
        assert!(nb.due_for_refresh(Utc::now()).is_empty());
        let later = Utc::now() + chrono::Duration::seconds(61);
        assert_eq!(nb.due_for_refresh(later), vec!["second".to_string()]);
    }

    #[test]
    fn tables_are_listed_and_resolved() {
        let dir = TempDir::new().unwrap();
        let nb = notebook(&dir);
        let out = nb.output_dir("first");
        std::fs::create_dir_all(&out).unwrap();
        std::fs::write(out.join("zeta.csv"), "a\n1\n").unwrap();
        std::fs::write(out.join("alpha.csv"), "a\n1\n").unwrap();
        std::fs::write(out.join("notes.txt"), "skip").unwrap();

        assert_eq!(nb.table_names("first").unwrap(), vec!["alpha", "zeta"]);
        assert!(nb.table_path("first", "alpha").is_ok());
        assert!(matches!(
            nb.table_path("first", "missing"),
            Err(ServerError::TableNotFound { .. })
        ));
        assert!(matches!(
            nb.table_path("first", "../state"),
            Err(ServerError::InvalidName { .. })
        ));
    }

    #[test]
    fn unpromotable_log_fails_the_run_and_frees_the_cell() {
        let dir = TempDir::new().unwrap();
        let mut nb = notebook(&dir);
        std::fs::create_dir_all(nb.current_log("first").join("blocker")).unwrap();

        let request = nb.begin_run("first").unwrap();
        std::fs::write(&request.pending_log, "done\n").unwrap();
        nb.finish_run(&request, &Ok(RunOutcome::exited(0))).unwrap();

        let record = nb.record("first").unwrap();
        assert_eq!(record.status, CellStatus::Failed);
        assert!(record.code_hash.is_none());
        assert!(request.pending_log.exists());
        assert!(nb.begin_run("first").is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn second_open_of_same_notebook_is_refused() {
        let dir = TempDir::new().unwrap();
        let nb = notebook(&dir);
        assert!(matches!(
            Notebook::open(nb.path().to_path_buf()),
            Err(ServerError::Locked { .. })
        ));

        let path = nb.path().to_path_buf();
        drop(nb);
        assert!(Notebook::open(path).is_ok());
    }

    #[test]
    fn broken_edit_is_reported_once() {
        let dir = TempDir::new().unwrap();
        let mut nb = notebook(&dir);
        std::thread::sleep(std::time::Duration::from_millis(20));
        std::fs::write(nb.path(), "#%cell bad refresh_every=soon\necho\n").unwrap();

        assert!(nb.reload_if_changed().is_err());
        assert!(!nb.reload_if_changed().unwrap());
        assert_eq!(nb.cells().len(), 2);

        std::thread::sleep(std::time::Duration::from_millis(20));
        std::fs::write(nb.path(), "#%cell fixed\necho\n").unwrap();
        assert!(nb.reload_if_changed().unwrap());
        assert_eq!(nb.cells().len(), 1);
    }

    #[test]
    fn reload_picks_up_external_edits() {
        let dir = TempDir::new().unwrap();
        let mut nb = notebook(&dir);
        std::thread::sleep(std::time::Duration::from_millis(20));
        std::fs::write(nb.path(), "#%cell only\npwd\n").unwrap();
        nb.reload().unwrap();
        assert_eq!(nb.cells().len(), 1);
        assert!(nb.record("first").is_err());
        assert_eq!(nb.record("only").unwrap().status, CellStatus::Idle);
    }
}
