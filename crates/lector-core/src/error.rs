use lector_llm::LlmError;
use lector_store::StoreError;

/// Stage of the ingest state machine that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestStage {
    Extract,
    Chunk,
    Embed,
    Store,
}

impl IngestStage {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Extract => "extract",
            Self::Chunk => "chunk",
            Self::Embed => "embed",
            Self::Store => "store",
        }
    }
}

impl std::fmt::Display for IngestStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ChunkerError {
    #[error("invalid chunker config: {0}")]
    InvalidConfig(String),
}

#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("file too large: {0} bytes")]
    FileTooLarge(u64),

    #[cfg(feature = "pdf")]
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
}

/// Ingest failure carrying the stage at which the state machine stopped.
///
/// After this error is returned no partial chunk set remains visible to
/// retrieval; the orchestrator deletes partially-written chunks before
/// reporting failure.
#[derive(Debug, thiserror::Error)]
#[error("ingest failed during {stage} stage: {source}")]
pub struct IngestError {
    pub stage: IngestStage,
    #[source]
    pub source: IngestFailure,
}

impl IngestError {
    #[must_use]
    pub fn new(stage: IngestStage, source: impl Into<IngestFailure>) -> Self {
        Self {
            stage,
            source: source.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum IngestFailure {
    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error(transparent)]
    Chunker(#[from] ChunkerError),

    #[error(transparent)]
    Embedding(#[from] LlmError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error("embedding unavailable: {0}")]
    Embedding(#[from] LlmError),

    #[error("vector store error: {0}")]
    Store(#[from] StoreError),

    #[error("generation failed: {0}")]
    Generation(String),

    #[error("config error: {0}")]
    Config(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ingest_error_reports_stage() {
        let err = IngestError::new(
            IngestStage::Store,
            StoreError::Write("connection refused".into()),
        );
        let msg = err.to_string();
        assert!(msg.contains("store stage"), "{msg}");
    }

    #[test]
    fn stage_names_are_lowercase() {
        assert_eq!(IngestStage::Extract.as_str(), "extract");
        assert_eq!(IngestStage::Chunk.as_str(), "chunk");
        assert_eq!(IngestStage::Embed.as_str(), "embed");
        assert_eq!(IngestStage::Store.as_str(), "store");
    }
}
