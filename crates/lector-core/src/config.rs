//! Configuration: TOML file with `LECTOR_*` environment overrides.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::chunker::ChunkerConfig;
use crate::error::PipelineError;
use crate::retriever::RetrieverConfig;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub ollama: OllamaConfig,
    pub qdrant: QdrantConfig,
    pub chunking: ChunkingConfig,
    pub retrieval: RetrievalConfig,
    pub embedding: EmbeddingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Bearer token required on mutating endpoints; `None` disables auth.
    pub auth_token: Option<String>,
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 8080,
            auth_token: None,
            max_body_bytes: 64 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OllamaConfig {
    pub host: String,
    pub model: String,
    pub embedding_model: String,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            host: "http://localhost:11434".to_owned(),
            model: "llama3.2".to_owned(),
            embedding_model: "nomic-embed-text".to_owned(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QdrantConfig {
    pub url: String,
    pub collection: String,
}

impl Default for QdrantConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:6334".to_owned(),
            collection: "lector_chunks".to_owned(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub max_size: usize,
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        let defaults = ChunkerConfig::default();
        Self {
            max_size: defaults.max_size,
            overlap: defaults.overlap,
        }
    }
}

impl From<&ChunkingConfig> for ChunkerConfig {
    fn from(c: &ChunkingConfig) -> Self {
        Self {
            max_size: c.max_size,
            overlap: c.overlap,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
    pub similarity_floor: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        let defaults = RetrieverConfig::default();
        Self {
            top_k: defaults.top_k,
            similarity_floor: defaults.similarity_floor,
        }
    }
}

impl From<&RetrievalConfig> for RetrieverConfig {
    fn from(c: &RetrievalConfig) -> Self {
        Self {
            top_k: c.top_k,
            similarity_floor: c.similarity_floor,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Inputs longer than this many chars are truncated before encoding.
    pub max_chars: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            max_chars: lector_llm::embedder::DEFAULT_MAX_CHARS,
        }
    }
}

impl Config {
    /// Read config from a TOML file, then apply environment overrides.
    /// A missing file is not an error; defaults are used.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] if the file exists but cannot be
    /// read or parsed.
    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let mut config = if path.exists() {
            let raw = std::fs::read_to_string(path)
                .map_err(|e| PipelineError::Config(format!("reading {}: {e}", path.display())))?;
            toml::from_str(&raw)
                .map_err(|e| PipelineError::Config(format!("parsing {}: {e}", path.display())))?
        } else {
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("LECTOR_SERVER_HOST") {
            self.server.host = v;
        }
        if let Ok(v) = std::env::var("LECTOR_SERVER_PORT")
            && let Ok(port) = v.parse::<u16>()
        {
            self.server.port = port;
        }
        if let Ok(v) = std::env::var("LECTOR_AUTH_TOKEN") {
            self.server.auth_token = Some(v);
        }
        if let Ok(v) = std::env::var("LECTOR_OLLAMA_HOST") {
            self.ollama.host = v;
        }
        if let Ok(v) = std::env::var("LECTOR_OLLAMA_MODEL") {
            self.ollama.model = v;
        }
        if let Ok(v) = std::env::var("LECTOR_EMBEDDING_MODEL") {
            self.ollama.embedding_model = v;
        }
        if let Ok(v) = std::env::var("LECTOR_QDRANT_URL") {
            self.qdrant.url = v;
        }
        if let Ok(v) = std::env::var("LECTOR_QDRANT_COLLECTION") {
            self.qdrant.collection = v;
        }
        if let Ok(v) = std::env::var("LECTOR_CHUNK_MAX_SIZE")
            && let Ok(size) = v.parse::<usize>()
        {
            self.chunking.max_size = size;
        }
        if let Ok(v) = std::env::var("LECTOR_CHUNK_OVERLAP")
            && let Ok(overlap) = v.parse::<usize>()
        {
            self.chunking.overlap = overlap;
        }
        if let Ok(v) = std::env::var("LECTOR_TOP_K")
            && let Ok(top_k) = v.parse::<usize>()
        {
            self.retrieval.top_k = top_k;
        }
        if let Ok(v) = std::env::var("LECTOR_SIMILARITY_FLOOR")
            && let Ok(floor) = v.parse::<f32>()
        {
            self.retrieval.similarity_floor = floor;
        }
        if let Ok(v) = std::env::var("LECTOR_EMBED_MAX_CHARS")
            && let Ok(max_chars) = v.parse::<usize>()
        {
            self.embedding.max_chars = max_chars;
        }
    }
}
