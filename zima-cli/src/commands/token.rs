//! `zima token`: print or regenerate the API token

use anyhow::{Context, Result};
use clap::Parser;
use zima_server::auth::{config_dir, load_or_create_token, regenerate_token, token_path};

#[derive(Parser, Debug)]
pub struct TokenArgs {
    /// Replace the token; browsers must log in again
    #[arg(long)]
    pub regenerate: bool,
}

pub fn run_token(args: TokenArgs) -> Result<()> {
    let dir = config_dir()?;
    let token = if args.regenerate {
        let token = regenerate_token(&dir).context("Failed to write new token")?;
        tracing::info!(path = %token_path(&dir).display(), "API token regenerated");
        token
    } else {
        load_or_create_token(&dir).context("Failed to load API token")?
    };

    println!("{token}");
    Ok(())
}
