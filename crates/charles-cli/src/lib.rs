//! CLI argument model for the `charles` binary.
//!
//! Parses flags and `CHARLES_*` environment variables and validates them into
//! the runtime's `BotRuntimeConfig`.

pub mod cli_args;
pub mod runtime_config;

pub use cli_args::Cli;
pub use runtime_config::build_runtime_config;
