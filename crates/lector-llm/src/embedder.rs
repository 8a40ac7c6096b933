//! Shared embedding layer: batching, truncation, unit-length normalization,
//! and one-time lazy initialization of the underlying model.

use std::sync::Arc;

use tokio::sync::OnceCell;

use crate::error::LlmError;
use crate::provider::LlmProvider;

/// Input longer than this many chars is silently truncated before encoding.
pub const DEFAULT_MAX_CHARS: usize = 8000;

/// Embeds text through a shared provider, producing L2-normalized vectors of
/// a fixed dimension.
///
/// The first call probes the backend once to learn the vector dimension and
/// verify the model is usable; concurrent first callers await the same probe
/// instead of racing. A failed probe surfaces as [`LlmError::ModelLoad`] and
/// is not retried within the call.
pub struct Embedder<P> {
    provider: Arc<P>,
    max_chars: usize,
    dimension: OnceCell<usize>,
}

impl<P> std::fmt::Debug for Embedder<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Embedder")
            .field("max_chars", &self.max_chars)
            .field("dimension", &self.dimension.get())
            .finish_non_exhaustive()
    }
}

impl<P: LlmProvider> Embedder<P> {
    #[must_use]
    pub fn new(provider: Arc<P>) -> Self {
        Self {
            provider,
            max_chars: DEFAULT_MAX_CHARS,
            dimension: OnceCell::new(),
        }
    }

    #[must_use]
    pub fn with_max_chars(mut self, max_chars: usize) -> Self {
        self.max_chars = max_chars;
        self
    }

    /// Vector dimension of the backend, probing it on first use.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::ModelLoad`] if the backend cannot be initialized.
    pub async fn dimension(&self) -> Result<usize, LlmError> {
        self.ensure_ready().await
    }

    async fn ensure_ready(&self) -> Result<usize, LlmError> {
        self.dimension
            .get_or_try_init(|| async {
                let probe = self
                    .provider
                    .embed("dimension probe")
                    .await
                    .map_err(|e| LlmError::ModelLoad(format!("embedding probe failed: {e}")))?;
                if probe.is_empty() {
                    return Err(LlmError::ModelLoad(
                        "embedding probe returned an empty vector".into(),
                    ));
                }
                tracing::debug!(dimension = probe.len(), "embedding backend ready");
                Ok(probe.len())
            })
            .await
            .copied()
    }

    /// Embed a batch of texts, order-preserving, one unit vector per input.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::ModelLoad`] if initialization fails, or the
    /// backend error for an individual text.
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
        let dimension = self.ensure_ready().await?;
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            let mut vector = self.provider.embed(truncate_chars(text, self.max_chars)).await?;
            if vector.len() != dimension {
                return Err(LlmError::Inference(format!(
                    "embedding dimension drift: expected {dimension}, got {}",
                    vector.len()
                )));
            }
            l2_normalize(&mut vector);
            vectors.push(vector);
        }
        Ok(vectors)
    }

    /// Embed a single text (query-time path).
    ///
    /// # Errors
    ///
    /// Same failure modes as [`Self::embed_batch`].
    pub async fn embed_one(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        let texts = [text.to_owned()];
        let mut batch = self.embed_batch(&texts).await?;
        batch.pop().ok_or(LlmError::EmptyResponse {
            provider: "embedder",
        })
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

fn l2_normalize(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in vector.iter_mut() {
            *x /= norm;
        }
    }
}
