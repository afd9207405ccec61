use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "threadmux", version, about = "Parallel terminal thread manager")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the session manager over a project root until interrupted
    Run {
        /// Project root to scan into the channel tree
        root: PathBuf,
    },
    /// Scan a root and print the channel tree as JSON
    Scan { root: PathBuf },
    /// Probe git and list branches for a path
    Branches { path: PathBuf },
}
