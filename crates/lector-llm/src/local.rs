//! Local BERT embedding backend via candle and HuggingFace Hub.
//!
//! Chat is not supported here; this backend only exists so ingestion can run
//! without a remote embedding service.

use std::sync::Arc;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use tokenizers::Tokenizer;
use tokio::sync::OnceCell;

use crate::error::LlmError;
use crate::provider::{ChatStream, LlmProvider, Message};

#[derive(Clone)]
pub struct BertEmbedModel {
    model: Arc<BertModel>,
    tokenizer: Tokenizer,
    device: Device,
}

impl std::fmt::Debug for BertEmbedModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BertEmbedModel")
            .field("device", &self.device)
            .finish_non_exhaustive()
    }
}

impl BertEmbedModel {
    /// Download and load a BERT embedding model from `HuggingFace` Hub.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::ModelLoad`] if the download or weight loading
    /// fails.
    pub fn load(repo_id: &str, device: &Device) -> Result<Self, LlmError> {
        let api = hf_hub::api::sync::Api::new().map_err(|e| {
            LlmError::ModelLoad(format!("failed to create HuggingFace API client: {e}"))
        })?;
        let repo = api.model(repo_id.to_owned());

        let config_path = repo.get("config.json").map_err(|e| {
            LlmError::ModelLoad(format!("failed to download config.json from {repo_id}: {e}"))
        })?;
        let tokenizer_path = repo.get("tokenizer.json").map_err(|e| {
            LlmError::ModelLoad(format!(
                "failed to download tokenizer.json from {repo_id}: {e}"
            ))
        })?;
        let weights_path = repo.get("model.safetensors").map_err(|e| {
            LlmError::ModelLoad(format!(
                "failed to download model.safetensors from {repo_id}: {e}"
            ))
        })?;

        let config_str = std::fs::read_to_string(&config_path)
            .map_err(|e| LlmError::ModelLoad(format!("failed to read BERT config: {e}")))?;
        let config: BertConfig = serde_json::from_str(&config_str)?;

        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| LlmError::ModelLoad(format!("failed to load tokenizer: {e}")))?;

        // SAFETY: file is a valid safetensors downloaded from hf-hub, not modified during
        // VarBuilder lifetime
        let vb =
            unsafe { VarBuilder::from_mmaped_safetensors(&[weights_path], DType::F32, device)? };

        let model = BertModel::load(vb, &config)?;

        Ok(Self {
            model: Arc::new(model),
            tokenizer,
            device: device.clone(),
        })
    }

    /// Embed one text: mean pooling over the sequence, then L2 norm.
    ///
    /// # Errors
    ///
    /// Returns an error if tokenization or the forward pass fails.
    pub fn embed_sync(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| LlmError::Inference(format!("tokenizer encode failed: {e}")))?;

        let token_ids = encoding.get_ids();
        let token_type_ids: Vec<u32> = vec![0; token_ids.len()];

        let input_ids = Tensor::new(token_ids, &self.device)?.unsqueeze(0)?;
        let token_type_ids = Tensor::new(token_type_ids.as_slice(), &self.device)?.unsqueeze(0)?;

        let embeddings = self.model.forward(&input_ids, &token_type_ids, None)?;

        let seq_len = embeddings.dim(1)?;
        let sum = embeddings.sum(1)?;
        let mean_pooled = (sum
            / f64::from(
                u32::try_from(seq_len)
                    .map_err(|e| LlmError::Inference(format!("sequence length overflow: {e}")))?,
            ))?;

        let norm = mean_pooled.sqr()?.sum_keepdim(1)?.sqrt()?;
        let normalized = mean_pooled.broadcast_div(&norm)?.squeeze(0)?;

        normalized.to_vec1::<f32>().map_err(LlmError::Candle)
    }
}

/// Embedding-only provider that loads the model lazily on first use.
///
/// Concurrent first callers await the same load; a failed load is reported
/// to every waiter and retried on the next call.
pub struct LocalEmbedder {
    repo_id: String,
    device: Device,
    model: OnceCell<BertEmbedModel>,
}

impl std::fmt::Debug for LocalEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalEmbedder")
            .field("repo_id", &self.repo_id)
            .field("loaded", &self.model.initialized())
            .finish_non_exhaustive()
    }
}

impl LocalEmbedder {
    #[must_use]
    pub fn new(repo_id: impl Into<String>, device: Device) -> Self {
        Self {
            repo_id: repo_id.into(),
            device,
            model: OnceCell::new(),
        }
    }

    async fn model(&self) -> Result<&BertEmbedModel, LlmError> {
        self.model
            .get_or_try_init(|| async {
                let repo_id = self.repo_id.clone();
                let device = self.device.clone();
                tracing::info!(repo_id, "loading local embedding model");
                tokio::task::spawn_blocking(move || BertEmbedModel::load(&repo_id, &device))
                    .await
                    .map_err(|e| LlmError::ModelLoad(format!("model load task failed: {e}")))?
            })
            .await
    }
}

impl LlmProvider for LocalEmbedder {
    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "candle-embed"
    }

    async fn chat(&self, _messages: &[Message]) -> Result<String, LlmError> {
        Err(LlmError::Other(
            "chat is not supported by the local embedding backend".into(),
        ))
    }

    async fn chat_stream(&self, _messages: &[Message]) -> Result<ChatStream, LlmError> {
        Err(LlmError::Other(
            "chat is not supported by the local embedding backend".into(),
        ))
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        let model = self.model().await?.clone();
        let text = text.to_owned();
        tokio::task::spawn_blocking(move || model.embed_sync(&text))
            .await
            .map_err(|e| LlmError::Inference(format!("embedding task failed: {e}")))?
    }

    fn supports_embeddings(&self) -> bool {
        true
    }
}
