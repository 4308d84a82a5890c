//! Subcommand implementations

pub mod debug_run;
pub mod serve;
pub mod token;

pub use debug_run::run_debug_cell;
pub use serve::run_serve;
pub use token::run_token;
