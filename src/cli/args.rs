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

/// Cross-file symbol linker
#[derive(Parser)]
#[command(
    name = "crosslink",
    version = env!("CARGO_PKG_VERSION"),
    about = "Link symbols across files and track import dependencies",
    long_about = "Extract symbols from Go, Python, JavaScript and TypeScript sources,\nresolve imports between files and report the resulting dependency graph.",
    styles = clap_cargo_style()
)]
pub struct Cli {
    /// Path to custom settings.toml file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize project
    #[command(about = "Set up .crosslink directory with default configuration")]
    Init {
        /// Force overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Index a directory and print linking statistics
    #[command(about = "Index a directory and report what was linked")]
    Index {
        /// Directory to index
        #[arg(value_name = "DIR", default_value = ".")]
        dir: PathBuf,

        /// List files whose extraction failed
        #[arg(long)]
        show_failures: bool,
    },

    /// Show what a file imports and what imports it
    #[command(
        about = "Show dependencies and dependents of one file",
        after_help = "Examples:\n  crosslink deps . cmd/server/main.go\n  crosslink deps ./web src/app.ts"
    )]
    Deps {
        /// Directory to index
        #[arg(value_name = "DIR")]
        dir: PathBuf,

        /// File to inspect, relative to DIR or absolute
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Print the import graph in DOT format
    #[command(
        about = "Print the dependency graph as Graphviz DOT",
        after_help = "Example:\n  crosslink graph . | dot -Tsvg > deps.svg"
    )]
    Graph {
        #[arg(value_name = "DIR", default_value = ".")]
        dir: PathBuf,
    },

    /// Dump linker internals
    #[command(about = "Print debug information about the linked index")]
    Debug {
        #[arg(value_name = "DIR", default_value = ".")]
        dir: PathBuf,

        /// Output JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Verify registry and graph invariants
    #[command(about = "Check registry consistency and dependency graph symmetry")]
    Check {
        #[arg(value_name = "DIR", default_value = ".")]
        dir: PathBuf,
    },

    /// Show current configuration settings
    #[command(about = "Display active settings from .crosslink/settings.toml")]
    Config,
}
