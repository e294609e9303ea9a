use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use tracing::info;

use fileindex::cli::{Cli, Command};
use fileindex::{GlobalIndex, IndexOptions, index_repository};

fn setup_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    setup_logging();

    let cli = Cli::parse();

    match cli.command {
        Command::Index {
            path,
            output,
            max_file_kb,
            hidden,
        } => {
            let options = IndexOptions {
                max_file_bytes: max_file_kb * 1024,
                include_hidden: hidden,
            };
            let index =
                index_repository(&path, &options).context(format!("Failed to index {}", path.display()))?;
            index
                .save(&output)
                .context(format!("Failed to write {}", output.display()))?;
            info!(files = index.len(), "index written");
            println!(
                "{} Indexed {} files to {}",
                "✓".green(),
                index.len().to_string().cyan(),
                output.display()
            );
        }
        Command::Stats { index } => {
            let index = GlobalIndex::load(&index).context("Failed to load index")?;
            println!("Files: {}", index.len());
            println!("Listing bytes: {}", index.format_for_matching().len());
        }
        Command::Show { index } => {
            let index = GlobalIndex::load(&index).context("Failed to load index")?;
            print!("{}", index.format_for_matching());
        }
    }

    Ok(())
}
