//! CLI argument parsing using clap.

use clap::{
    Parser, Subcommand,
    builder::styling::{AnsiColor, Effects, Styles},
};
use std::path::PathBuf;

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

/// Live command-unit host
#[derive(Parser, Debug)]
#[command(
    name = "hotcmd",
    version = env!("CARGO_PKG_VERSION"),
    about = "Live command-unit host",
    long_about = "Load command units, reload them when their definitions change, \
                  and dispatch typed commands to them.",
    next_line_help = true,
    styles = clap_cargo_style()
)]
pub struct Cli {
    /// Path to custom settings.toml file
    #[arg(short, long, global = true, env = "HOTCMD_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Set up .hotcmd directory with default configuration and a sample unit
    Init {
        /// Force overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Display active settings
    Config,

    /// Load units once and list the commands they register
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,

        /// Load only these units instead of the configured ones
        #[arg(short, long = "unit", value_name = "ID")]
        units: Vec<String>,
    },

    /// Start the interactive console with hot reload
    Run {
        /// Do not watch unit definitions for changes
        #[arg(long)]
        no_watch: bool,

        /// Load only these units instead of the configured ones
        #[arg(short, long = "unit", value_name = "ID")]
        units: Vec<String>,
    },
}
