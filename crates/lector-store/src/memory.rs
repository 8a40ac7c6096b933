//! In-process brute-force vector store, used for tests and single-node runs.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::StoreError;
use crate::record::{ChunkRecord, RetrievalMatch};
use crate::{BoxFuture, VectorStore, sort_matches};

pub struct InMemoryVectorStore {
    points: RwLock<HashMap<String, ChunkRecord>>,
}

impl InMemoryVectorStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            points: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryVectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryVectorStore")
            .finish_non_exhaustive()
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

impl VectorStore for InMemoryVectorStore {
    fn upsert(&self, records: Vec<ChunkRecord>) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(async move {
            let mut points = self
                .points
                .write()
                .map_err(|e| StoreError::Write(e.to_string()))?;
            for record in records {
                points.insert(record.id.clone(), record);
            }
            Ok(())
        })
    }

    fn search(
        &self,
        query: Vec<f32>,
        top_k: usize,
        similarity_floor: f32,
    ) -> BoxFuture<'_, Result<Vec<RetrievalMatch>, StoreError>> {
        Box::pin(async move {
            let points = self
                .points
                .read()
                .map_err(|e| StoreError::Search(e.to_string()))?;

            let mut matches: Vec<RetrievalMatch> = points
                .values()
                .map(|record| RetrievalMatch {
                    document_id: record.document_id.clone(),
                    chunk_index: record.chunk_index,
                    text: record.text.clone(),
                    source_name: record.source_name.clone(),
                    score: cosine_similarity(&query, &record.embedding),
                })
                .filter(|m| m.score >= similarity_floor)
                .collect();

            sort_matches(&mut matches);
            matches.truncate(top_k);
            Ok(matches)
        })
    }

    fn delete_document(&self, document_id: &str) -> BoxFuture<'_, Result<(), StoreError>> {
        let document_id = document_id.to_owned();
        Box::pin(async move {
            let mut points = self
                .points
                .write()
                .map_err(|e| StoreError::Delete(e.to_string()))?;
            points.retain(|_, record| record.document_id != document_id);
            Ok(())
        })
    }

    fn count_document(&self, document_id: &str) -> BoxFuture<'_, Result<usize, StoreError>> {
        let document_id = document_id.to_owned();
        Box::pin(async move {
            let points = self
                .points
                .read()
                .map_err(|e| StoreError::Search(e.to_string()))?;
            Ok(points
                .values()
                .filter(|record| record.document_id == document_id)
                .count())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(doc: &str, idx: usize, embedding: Vec<f32>) -> ChunkRecord {
        ChunkRecord::new(doc, idx, format!("chunk {idx}"), embedding, "test.pdf")
    }

    #[tokio::test]
    async fn search_orders_by_descending_similarity() {
        let store = InMemoryVectorStore::new();
        store
            .upsert(vec![
                record("d1", 0, vec![0.0, 1.0]),
                record("d1", 1, vec![1.0, 0.0]),
                record("d1", 2, vec![0.7, 0.7]),
            ])
            .await
            .unwrap();

        let matches = store.search(vec![1.0, 0.0], 10, -1.0).await.unwrap();
        assert_eq!(matches.len(), 3);
        assert_eq!(matches[0].chunk_index, 1);
        assert!((matches[0].score - 1.0).abs() < 1e-6);
        assert!(matches[0].score >= matches[1].score);
        assert!(matches[1].score >= matches[2].score);
    }

    #[tokio::test]
    async fn equal_scores_order_by_chunk_index() {
        let store = InMemoryVectorStore::new();
        store
            .upsert(vec![
                record("d1", 5, vec![1.0, 0.0]),
                record("d1", 1, vec![1.0, 0.0]),
                record("d1", 3, vec![1.0, 0.0]),
            ])
            .await
            .unwrap();

        let matches = store.search(vec![1.0, 0.0], 10, 0.0).await.unwrap();
        let indices: Vec<usize> = matches.iter().map(|m| m.chunk_index).collect();
        assert_eq!(indices, vec![1, 3, 5]);
    }

    #[tokio::test]
    async fn floor_excludes_weak_matches_within_top_k() {
        let store = InMemoryVectorStore::new();
        store
            .upsert(vec![
                record("d1", 0, vec![1.0, 0.0]),
                record("d1", 1, vec![0.0, 1.0]),
            ])
            .await
            .unwrap();

        let matches = store.search(vec![1.0, 0.0], 10, 0.5).await.unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].chunk_index, 0);
    }

    #[tokio::test]
    async fn nothing_above_floor_is_empty_not_error() {
        let store = InMemoryVectorStore::new();
        store
            .upsert(vec![record("d1", 0, vec![0.0, 1.0])])
            .await
            .unwrap();

        let matches = store.search(vec![1.0, 0.0], 5, 0.9).await.unwrap();
        assert!(matches.is_empty());
    }

    #[tokio::test]
    async fn search_on_empty_store_is_empty() {
        let store = InMemoryVectorStore::new();
        let matches = store.search(vec![1.0, 0.0], 5, 0.1).await.unwrap();
        assert!(matches.is_empty());
    }

    #[tokio::test]
    async fn upsert_is_idempotent_by_chunk_id() {
        let store = InMemoryVectorStore::new();
        let r = record("d1", 0, vec![1.0, 0.0]);
        store.upsert(vec![r.clone()]).await.unwrap();
        store.upsert(vec![r]).await.unwrap();

        assert_eq!(store.count_document("d1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn delete_document_removes_all_chunks() {
        let store = InMemoryVectorStore::new();
        store
            .upsert(vec![
                record("d1", 0, vec![1.0, 0.0]),
                record("d1", 1, vec![0.9, 0.1]),
                record("d2", 0, vec![0.5, 0.5]),
            ])
            .await
            .unwrap();

        store.delete_document("d1").await.unwrap();
        assert_eq!(store.count_document("d1").await.unwrap(), 0);
        assert_eq!(store.count_document("d2").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn delete_unknown_document_is_noop() {
        let store = InMemoryVectorStore::new();
        store.delete_document("ghost").await.unwrap();
        store.delete_document("ghost").await.unwrap();
    }

    #[tokio::test]
    async fn top_k_truncates_results() {
        let store = InMemoryVectorStore::new();
        store
            .upsert(vec![
                record("d1", 0, vec![1.0, 0.0]),
                record("d1", 1, vec![0.9, 0.1]),
                record("d1", 2, vec![0.8, 0.2]),
                record("d1", 3, vec![0.7, 0.3]),
            ])
            .await
            .unwrap();

        let matches = store.search(vec![1.0, 0.0], 2, 0.0).await.unwrap();
        assert_eq!(matches.len(), 2);
    }

    #[test]
    fn cosine_similarity_orthogonal() {
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < f32::EPSILON);
    }

    #[test]
    fn cosine_similarity_zero_vector() {
        assert!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]).abs() < f32::EPSILON);
    }
}
