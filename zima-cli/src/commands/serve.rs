//! `zima run-server`: serve a notebook to browsers
//!
//! Flags override `config.toml`; the token is created on first start.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use zima_server::auth::{config_dir, load_or_create_token, token_path};
use zima_server::{run_server, AppState, Notebook, ServerConfig, ShellExecutor};

use crate::config::ZimaConfig;

/// Arguments for the run-server command
#[derive(Parser, Debug)]
pub struct ServeArgs {
    /// Notebook file to serve
    pub notebook: PathBuf,

    /// Port to listen on (default: 7400)
    #[arg(long, short = 'p')]
    pub port: Option<u16>,

    /// Address to bind to (default: 127.0.0.1)
    #[arg(long, short = 'b')]
    pub bind: Option<IpAddr>,

    /// Allow permissive CORS (all origins) - use with caution
    #[arg(long)]
    pub cors_permissive: bool,

    /// Kill cell runs after this many seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,
}

impl ServeArgs {
    /// Server settings from flags, falling back to the config file
    pub fn server_config(&self, config: &ZimaConfig) -> ServerConfig {
        let bind = self.bind.unwrap_or(config.server.bind);
        let port = self.port.unwrap_or(config.server.port);
        ServerConfig {
            bind_addr: SocketAddr::new(bind, port),
            cors_permissive: self.cors_permissive || config.server.cors_permissive,
            update_interval: Duration::from_millis(config.server.update_interval_ms.max(10)),
        }
    }

    pub fn executor(&self, config: &ZimaConfig) -> ShellExecutor {
        let timeout = self.timeout.unwrap_or(config.executor.timeout_secs);
        ShellExecutor::new(config.executor.shell.clone(), Duration::from_secs(timeout))
    }
}

/// Run the notebook server (blocks until shutdown)
pub async fn run_serve(args: ServeArgs) -> Result<()> {
    let config = ZimaConfig::load()?;
    let server_config = args.server_config(&config);

    let notebook = Notebook::open(&args.notebook)
        .with_context(|| format!("Failed to open notebook {}", args.notebook.display()))?;

    let dir = config_dir()?;
    let token = load_or_create_token(&dir).context("Failed to load API token")?;

    tracing::info!(
        notebook = %args.notebook.display(),
        token_file = %token_path(&dir).display(),
        "Log in at http://{}/login with the API token (`zima token` prints it)",
        server_config.bind_addr
    );

    let state = AppState::new(notebook, Arc::new(args.executor(&config)), token);
    run_server(state, server_config).await.context("Server error")?;

    Ok(())
}
