//! LLM provider abstraction and the shared embedding layer.

pub mod embedder;
pub mod error;
#[cfg(feature = "candle")]
pub mod local;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod ollama;
pub mod provider;

pub use embedder::Embedder;
pub use error::LlmError;
pub use provider::LlmProvider;
