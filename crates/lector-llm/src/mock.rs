//! Test-only mock LLM provider.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::LlmError;
use crate::provider::{ChatStream, LlmProvider, Message};

#[derive(Debug, Clone)]
pub struct MockProvider {
    pub default_response: String,
    embedding: Option<Vec<f32>>,
    pub fail_chat: bool,
    pub fail_embed: bool,
    /// Stream this many deltas, then fail mid-stream.
    fail_after: Option<usize>,
    /// Milliseconds to sleep before returning a response.
    pub delay_ms: u64,
    chat_calls: Arc<AtomicUsize>,
    embed_calls: Arc<AtomicUsize>,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self {
            default_response: "mock response".into(),
            embedding: None,
            fail_chat: false,
            fail_embed: false,
            fail_after: None,
            delay_ms: 0,
            chat_calls: Arc::new(AtomicUsize::new(0)),
            embed_calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl MockProvider {
    #[must_use]
    pub fn with_response(mut self, response: impl Into<String>) -> Self {
        self.default_response = response.into();
        self
    }

    /// Enable embeddings, returning the given vector for every input.
    #[must_use]
    pub fn with_embeddings(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    #[must_use]
    pub fn failing_chat(mut self) -> Self {
        self.fail_chat = true;
        self
    }

    /// Chat streams yield `n` deltas of the response, then an error item.
    #[must_use]
    pub fn failing_after(mut self, n: usize) -> Self {
        self.fail_after = Some(n);
        self
    }

    #[must_use]
    pub fn failing_embed(mut self) -> Self {
        self.fail_embed = true;
        self
    }

    #[must_use]
    pub fn with_delay(mut self, ms: u64) -> Self {
        self.delay_ms = ms;
        self
    }

    #[must_use]
    pub fn chat_calls(&self) -> usize {
        self.chat_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn embed_calls(&self) -> usize {
        self.embed_calls.load(Ordering::SeqCst)
    }
}

impl LlmProvider for MockProvider {
    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "mock"
    }

    async fn chat(&self, _messages: &[Message]) -> Result<String, LlmError> {
        self.chat_calls.fetch_add(1, Ordering::SeqCst);
        if self.delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
        }
        if self.fail_chat {
            return Err(LlmError::Other("mock LLM error".into()));
        }
        Ok(self.default_response.clone())
    }

    async fn chat_stream(&self, messages: &[Message]) -> Result<ChatStream, LlmError> {
        if let Some(n) = self.fail_after {
            self.chat_calls.fetch_add(1, Ordering::SeqCst);
            let mut chunks: Vec<Result<String, LlmError>> = self
                .default_response
                .split_inclusive(' ')
                .take(n)
                .map(|s| Ok(s.to_string()))
                .collect();
            chunks.push(Err(LlmError::Stream("mock stream interrupted".into())));
            return Ok(Box::pin(tokio_stream::iter(chunks)));
        }

        let response = self.chat(messages).await?;
        let chunks: Vec<_> = response
            .split_inclusive(' ')
            .map(|s| Ok(s.to_string()))
            .collect();
        Ok(Box::pin(tokio_stream::iter(chunks)))
    }

    fn supports_streaming(&self) -> bool {
        true
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>, LlmError> {
        self.embed_calls.fetch_add(1, Ordering::SeqCst);
        if self.delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
        }
        if self.fail_embed {
            return Err(LlmError::ModelLoad("mock embedding backend down".into()));
        }
        self.embedding
            .clone()
            .ok_or(LlmError::EmbedUnsupported { provider: "mock" })
    }

    fn supports_embeddings(&self) -> bool {
        self.embedding.is_some()
    }
}
