use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One stored chunk: the unit of retrieval.
///
/// Records are created once at ingest and never mutated. Re-ingesting the
/// same source yields a fresh document id and a disjoint set of records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub id: String,
    pub document_id: String,
    pub chunk_index: usize,
    pub text: String,
    /// Unit-length vector; dot product against another unit vector is the
    /// cosine similarity.
    pub embedding: Vec<f32>,
    pub source_name: String,
    pub page: Option<u32>,
    pub created_at: DateTime<Utc>,
}

impl ChunkRecord {
    #[must_use]
    pub fn new(
        document_id: impl Into<String>,
        chunk_index: usize,
        text: impl Into<String>,
        embedding: Vec<f32>,
        source_name: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            document_id: document_id.into(),
            chunk_index,
            text: text.into(),
            embedding,
            source_name: source_name.into(),
            page: None,
            created_at: Utc::now(),
        }
    }

    /// Attach the 1-based page number the chunk starts on, when known.
    #[must_use]
    pub fn with_page(mut self, page: Option<u32>) -> Self {
        self.page = page;
        self
    }
}

/// A chunk returned by similarity search, with its cosine score in [-1, 1].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalMatch {
    pub document_id: String,
    pub chunk_index: usize,
    pub text: String,
    pub source_name: String,
    pub score: f32,
}
