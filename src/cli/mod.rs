//! Command-line interface: argument parsing and subcommand runners.

pub mod args;
pub mod commands;

pub use args::{Cli, Commands};
