//! Vector store capability interface with in-memory and Qdrant backends.

pub mod error;
pub mod memory;
pub mod qdrant;
pub mod record;

use std::future::Future;
use std::pin::Pin;

pub use error::StoreError;
pub use memory::InMemoryVectorStore;
pub use qdrant::QdrantVectorStore;
pub use record::{ChunkRecord, RetrievalMatch};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Persisted chunk-vector store.
///
/// Backends differ only in implementation, never in contract: search results
/// are sorted by descending similarity with ties broken by ascending chunk
/// index, records below the similarity floor are excluded, and
/// `delete_document` is an idempotent no-op for unknown ids.
pub trait VectorStore: Send + Sync {
    /// Insert or replace records, idempotent by chunk id.
    fn upsert(&self, records: Vec<ChunkRecord>) -> BoxFuture<'_, Result<(), StoreError>>;

    /// Top-k similarity search over all documents.
    fn search(
        &self,
        query: Vec<f32>,
        top_k: usize,
        similarity_floor: f32,
    ) -> BoxFuture<'_, Result<Vec<RetrievalMatch>, StoreError>>;

    /// Remove every chunk belonging to a document.
    fn delete_document(&self, document_id: &str) -> BoxFuture<'_, Result<(), StoreError>>;

    /// Number of stored chunks for a document.
    fn count_document(&self, document_id: &str) -> BoxFuture<'_, Result<usize, StoreError>>;
}

/// Canonical result ordering: descending score, ties by ascending chunk index.
pub(crate) fn sort_matches(matches: &mut [RetrievalMatch]) {
    matches.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.chunk_index.cmp(&b.chunk_index))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mk(score: f32, chunk_index: usize) -> RetrievalMatch {
        RetrievalMatch {
            document_id: "d".into(),
            chunk_index,
            text: String::new(),
            source_name: "s".into(),
            score,
        }
    }

    #[test]
    fn sort_descending_by_score() {
        let mut matches = vec![mk(0.2, 0), mk(0.9, 1), mk(0.5, 2)];
        sort_matches(&mut matches);
        let scores: Vec<f32> = matches.iter().map(|m| m.score).collect();
        assert_eq!(scores, vec![0.9, 0.5, 0.2]);
    }

    #[test]
    fn ties_break_by_ascending_chunk_index() {
        let mut matches = vec![mk(0.5, 7), mk(0.5, 2), mk(0.5, 4)];
        sort_matches(&mut matches);
        let indices: Vec<usize> = matches.iter().map(|m| m.chunk_index).collect();
        assert_eq!(indices, vec![2, 4, 7]);
    }
}
