//! zima CLI - live notebooks served to the browser
//!
//! - `run-server`: serve a notebook with live updates and table data
//! - `debug-run-cell`: run a single cell in the foreground
//! - `token`: print or regenerate the login token
//! - `completions`: shell completion scripts

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};

mod commands;
mod config;
mod tracing_setup;

use tracing_setup::TracingConfig;

#[derive(Parser, Debug)]
#[command(
    name = "zima",
    author,
    version,
    about = "Notebook server: run shell cells, browse their tables, watch results live",
    long_about = "Serve a plain-text notebook to the browser. Cells run as shell scripts, \
                  CSV files they write show up as server-side paged tables, and every \
                  connected page is kept in sync over a WebSocket."
)]
struct Cli {
    /// Debug logging (RUST_LOG still wins when set)
    #[arg(long, global = true)]
    debug: bool,

    /// Export traces over OTLP (needs the `telemetry` feature)
    #[arg(long, global = true)]
    otel: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run notebook server
    RunServer(commands::serve::ServeArgs),
    /// Run a single cell of a notebook
    DebugRunCell(commands::debug_run::DebugRunArgs),
    /// Print the API token used to log in (created on first use)
    Token(commands::token::TokenArgs),
    /// Generate shell completion scripts
    Completions(CompletionsArgs),
}

#[derive(Parser, Debug)]
struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    shell: Shell,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
#[allow(clippy::enum_variant_names)] // PowerShell is a proper noun, not a suffix
enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    tracing_setup::init(&TracingConfig {
        debug: cli.debug,
        otel: cli.otel,
    })
    .ok();
    config::load_dotenv();

    let result = match cli.command {
        Commands::RunServer(args) => commands::run_serve(args).await,
        Commands::DebugRunCell(args) => commands::run_debug_cell(args).await,
        Commands::Token(args) => commands::run_token(args),
        Commands::Completions(args) => run_completions(args),
    };

    tracing_setup::shutdown_otel();
    result
}

fn run_completions(args: CompletionsArgs) -> Result<()> {
    use clap::CommandFactory;
    use clap_complete::{generate, Shell as CompletionShell};
    use std::io;

    let mut cmd = Cli::command();
    let bin_name = cmd.get_name().to_string();

    let shell = match args.shell {
        Shell::Bash => CompletionShell::Bash,
        Shell::Zsh => CompletionShell::Zsh,
        Shell::Fish => CompletionShell::Fish,
        Shell::PowerShell => CompletionShell::PowerShell,
        Shell::Elvish => CompletionShell::Elvish,
    };

    generate(shell, &mut cmd, bin_name, &mut io::stdout());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_server_defaults() {
        let cli = Cli::parse_from(["zima", "run-server", "nb.zima"]);
        match cli.command {
            Commands::RunServer(args) => {
                assert_eq!(args.notebook.to_str(), Some("nb.zima"));
                assert_eq!(args.port, None);
                assert!(!args.cors_permissive);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn debug_flag_is_global() {
        let cli = Cli::parse_from(["zima", "token", "--debug"]);
        assert!(cli.debug);
    }
}
