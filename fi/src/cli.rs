//! CLI argument parsing for fileindex

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "fi")]
#[command(author, version, about = "Git-repository file indexer", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Index a repository and write the metadata map
    Index {
        /// Repository root to walk
        #[arg(required = true)]
        path: PathBuf,

        /// Output file (default: index.json)
        #[arg(short, long, default_value = "index.json")]
        output: PathBuf,

        /// Skip files larger than this many kilobytes
        #[arg(long, default_value = "1024")]
        max_file_kb: u64,

        /// Include dotfiles
        #[arg(long)]
        hidden: bool,
    },

    /// Print summary statistics for an index file
    Stats {
        /// Index file to inspect
        #[arg(required = true)]
        index: PathBuf,
    },

    /// Print the prompt-ready listing for an index file
    Show {
        /// Index file to render
        #[arg(required = true)]
        index: PathBuf,
    },
}
