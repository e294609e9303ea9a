//! Scripted provider for tests and offline development
//!
//! Returns queued responses in order and records every request it receives,
//! so tests can assert both what the runtime sent and that nothing was sent
//! at all (the context-enforcement property).

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use super::{ModelProvider, ProviderError, ProviderRequest, ProviderResponse};

/// Default context window reported by the mock
pub const MOCK_CONTEXT_WINDOW: u32 = 8_000;

pub struct MockProvider {
    responses: Mutex<Vec<ProviderResponse>>,
    requests: Mutex<Vec<ProviderRequest>>,
    call_count: AtomicUsize,
    context_window: u32,
}

impl MockProvider {
    /// Provider that plays back `responses` in order
    pub fn new(responses: Vec<ProviderResponse>) -> Self {
        Self {
            responses: Mutex::new(responses),
            requests: Mutex::new(Vec::new()),
            call_count: AtomicUsize::new(0),
            context_window: MOCK_CONTEXT_WINDOW,
        }
    }

    /// Override the reported context window
    pub fn with_context_window(mut self, tokens: u32) -> Self {
        self.context_window = tokens;
        self
    }

    /// Number of send_message calls observed
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Copies of every request received, in order
    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelProvider for MockProvider {
    async fn send_message(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        self.requests.lock().unwrap().push(request);
        let idx = self.call_count.fetch_add(1, Ordering::SeqCst);
        let mut responses = self.responses.lock().unwrap();
        if idx < responses.len() {
            Ok(responses[idx].clone())
        } else if let Some(last) = responses.last_mut() {
            // Keep replaying the final response; lets tests model a provider
            // that issues tool calls indefinitely
            Ok(last.clone())
        } else {
            Err(ProviderError::InvalidResponse("no scripted responses left".to_string()))
        }
    }

    fn context_window(&self, _model: &str) -> u32 {
        self.context_window
    }
}
