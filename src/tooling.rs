//! Tooling & Integration Layer
//!
//! Command-line entry points and process signal handling.

pub mod cli;
pub mod signal;

pub use cli::{Cli, CliContext, Commands};
