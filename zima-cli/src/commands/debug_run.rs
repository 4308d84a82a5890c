//! `zima debug-run-cell`: run one cell in the foreground

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use zima_server::{AppState, Notebook, ShellExecutor};

use crate::config::ZimaConfig;

#[derive(Parser, Debug)]
pub struct DebugRunArgs {
    /// Notebook file
    pub notebook: PathBuf,

    /// Id of the cell to run
    pub cell: String,
}

pub async fn run_debug_cell(args: DebugRunArgs) -> Result<()> {
    let config = ZimaConfig::load()?;
    let notebook = Notebook::open(&args.notebook)
        .with_context(|| format!("Failed to open notebook {}", args.notebook.display()))?;

    let executor = ShellExecutor::new(
        config.executor.shell.clone(),
        Duration::from_secs(config.executor.timeout_secs),
    );
    let state = AppState::new(notebook, Arc::new(executor), "");

    let outcome = state
        .execute_cell(&args.cell)
        .await
        .with_context(|| format!("Failed to run cell {}", args.cell))?;

    let notebook = state.notebook().read().await;
    let log = if outcome.success {
        notebook.current_log(&args.cell)
    } else {
        notebook.pending_log(&args.cell)
    };
    eprintln!("log: {}", log.display());

    if !outcome.success {
        match outcome.exit_code {
            Some(code) => bail!("cell {} exited with status {}", args.cell, code),
            None => bail!("cell {} was terminated by a signal", args.cell),
        }
    }

    for table in notebook.table_names(&args.cell)? {
        println!("{table}");
    }
    Ok(())
}
