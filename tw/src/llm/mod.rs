//! Model-provider abstraction
//!
//! Defines the provider-agnostic wire types and the [`ModelProvider`] trait
//! the Handler dispatches through, plus the Anthropic adapter and a scripted
//! mock for tests and offline runs.

use std::sync::Arc;

use tracing::debug;

mod anthropic;
mod error;
pub mod mock;
mod provider;
mod types;

pub use anthropic::AnthropicProvider;
pub use error::ProviderError;
pub use provider::ModelProvider;
pub use types::{
    ChatMessage, ProviderRequest, ProviderResponse, Role, StopReason, TokenUsage, ToolCall, ToolDefinition,
};

use crate::config::LlmConfig;

/// Create a provider from the `provider` option in config
///
/// Currently supports "anthropic".
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn ModelProvider>, ProviderError> {
    debug!(provider = %config.provider, model = %config.model, "create_provider: called");
    match config.provider.as_str() {
        "anthropic" => Ok(Arc::new(AnthropicProvider::from_config(config)?)),
        other => Err(ProviderError::InvalidResponse(format!(
            "Unknown provider: '{}'. Supported: anthropic",
            other
        ))),
    }
}
