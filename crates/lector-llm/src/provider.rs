use std::pin::Pin;

use futures_core::Stream;
use serde::{Deserialize, Serialize};

use crate::error::LlmError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Ordered stream of text deltas produced by a streaming chat call.
pub type ChatStream = Pin<Box<dyn Stream<Item = Result<String, LlmError>> + Send>>;

pub trait LlmProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Send messages to the LLM and return the full assistant response.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider fails to communicate or the response
    /// is invalid.
    fn chat(&self, messages: &[Message])
    -> impl Future<Output = Result<String, LlmError>> + Send;

    /// Send messages and stream the assistant response as text deltas.
    ///
    /// # Errors
    ///
    /// Returns an error if the streaming request cannot be started. Errors
    /// after the first delta surface as stream items.
    fn chat_stream(
        &self,
        messages: &[Message],
    ) -> impl Future<Output = Result<ChatStream, LlmError>> + Send;

    fn supports_streaming(&self) -> bool {
        false
    }

    /// Produce an embedding vector for the given text.
    ///
    /// Output is raw model output; callers needing unit vectors normalize
    /// via [`crate::Embedder`].
    ///
    /// # Errors
    ///
    /// Returns an error if the backend does not support embeddings or the
    /// request fails.
    fn embed(&self, text: &str) -> impl Future<Output = Result<Vec<f32>, LlmError>> + Send;

    fn supports_embeddings(&self) -> bool {
        false
    }
}
