//! Interactive REPL
//!
//! Free text chats, `(` starts a workflow expression, `/task` invokes atomic
//! templates, `/plan` asks for a plan. Slash commands for session control.

mod session;

pub use session::ReplSession;

use eyre::Result;

use crate::config::Config;
use crate::dispatcher::Dispatcher;
use crate::llm::create_provider;

/// Index file picked up from the working directory at startup
pub const INDEX_FILE: &str = ".taskweave-index.json";

/// Build a dispatcher rooted at the current directory
///
/// Loads a previously written index file when one is present.
pub fn build_dispatcher(config: &Config) -> Result<Dispatcher> {
    if std::env::var(&config.llm.api_key_env).is_err() {
        return Err(eyre::eyre!(
            "LLM API key not found. Set the {} environment variable.",
            config.llm.api_key_env
        ));
    }

    let provider = create_provider(&config.llm).map_err(|e| eyre::eyre!("Failed to create provider: {}", e))?;
    let root = std::env::current_dir()?;
    let index_path = root.join(INDEX_FILE);

    let dispatcher = Dispatcher::new(provider, config.clone(), root)
        .map_err(|e| eyre::eyre!("Failed to initialise runtime: {}", e))?;

    if index_path.exists() {
        match fileindex::GlobalIndex::load(&index_path) {
            Ok(index) => dispatcher.memory().update_global_index(index),
            Err(e) => tracing::warn!("Failed to load {}: {}", index_path.display(), e),
        }
    }

    Ok(dispatcher)
}

/// Run the interactive REPL
pub async fn run_interactive(config: &Config, initial_task: Option<String>) -> Result<()> {
    let dispatcher = build_dispatcher(config)?;
    let mut session = ReplSession::new(dispatcher);
    session.run(initial_task).await
}
