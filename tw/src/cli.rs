//! CLI argument parsing for taskweave

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "tw")]
#[command(author, version, about = "LLM task-orchestration runtime", long_about = None)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the interactive REPL (the default)
    Repl {
        /// Initial input processed before the prompt appears
        task: Option<String>,
    },

    /// Invoke an atomic template: `tw task name key=value …`
    Task {
        /// Template identifier and key=value arguments
        #[arg(required = true, trailing_var_arg = true)]
        spec: Vec<String>,
    },

    /// Evaluate a workflow expression
    Eval {
        /// S-expression source
        #[arg(required = true)]
        expr: String,
    },

    /// Index a repository for context retrieval
    Index {
        /// Repository root to walk
        path: PathBuf,

        /// Output file (default: .taskweave-index.json)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}
