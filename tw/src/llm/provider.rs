//! ModelProvider trait definition

use async_trait::async_trait;

use super::{ProviderError, ProviderRequest, ProviderResponse};

/// Stateless LLM access - the Handler owns all conversation state
///
/// One call per request; the provider never retains messages between calls.
/// Token estimation is advisory: providers with a real tokenizer override it,
/// everything else uses the character heuristic.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Send one completion request
    async fn send_message(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError>;

    /// Context-window size in tokens for a model identifier
    fn context_window(&self, model: &str) -> u32;

    /// Estimate the token count of a text
    ///
    /// Default heuristic: one token per four characters, rounded up.
    fn estimate_tokens(&self, text: &str) -> u32 {
        (text.chars().count() as u32).div_ceil(4)
    }
}
