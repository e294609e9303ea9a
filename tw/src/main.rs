//! Taskweave - LLM task-orchestration runtime
//!
//! CLI entry point: REPL, one-shot template invocation, workflow evaluation,
//! and repository indexing.

use clap::Parser;
use eyre::{Context, Result};
use tracing::info;

use taskweave::cli::{Cli, Command};
use taskweave::config::Config;
use taskweave::domain::{TaskResult, TaskStatus};
use taskweave::repl;

fn setup_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into()))
        .with_writer(std::io::stderr)
        .init();
}

/// 0 on COMPLETE, 1 on TASK_FAILURE, 2 on RESOURCE_EXHAUSTION
fn exit_code_for(result: &TaskResult) -> i32 {
    match result.status {
        TaskStatus::Complete | TaskStatus::Partial => 0,
        _ => result.error().map(|e| e.exit_code()).unwrap_or(1),
    }
}

async fn run_one_shot(config: &Config, input: String) -> Result<i32> {
    let mut dispatcher = repl::build_dispatcher(config)?;
    let result = dispatcher.dispatch(&input).await;

    if result.status == TaskStatus::Complete || result.status == TaskStatus::Partial {
        println!("{}", result.content);
    } else if let Some(error) = result.error() {
        eprintln!("{}", error);
    }
    Ok(exit_code_for(&result))
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_logging();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    let code = match cli.command {
        None | Some(Command::Repl { task: None }) => {
            repl::run_interactive(&config, None).await?;
            0
        }
        Some(Command::Repl { task }) => {
            repl::run_interactive(&config, task).await?;
            0
        }
        Some(Command::Task { spec }) => run_one_shot(&config, format!("/task {}", spec.join(" "))).await?,
        Some(Command::Eval { expr }) => run_one_shot(&config, expr).await?,
        Some(Command::Index { path, output }) => {
            let output = output.unwrap_or_else(|| repl::INDEX_FILE.into());
            let index = fileindex::index_repository(&path, &fileindex::IndexOptions::default())
                .context(format!("Failed to index {}", path.display()))?;
            index
                .save(&output)
                .context(format!("Failed to write {}", output.display()))?;
            info!(files = index.len(), "index written");
            println!("Indexed {} files to {}", index.len(), output.display());
            0
        }
    };

    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}
