//! Question-side retrieval: embed the question, search the store.

use std::sync::Arc;

use lector_llm::embedder::Embedder;
use lector_llm::provider::LlmProvider;
use lector_store::{RetrievalMatch, VectorStore};

use crate::error::PipelineError;

#[derive(Debug, Clone)]
pub struct RetrieverConfig {
    /// Maximum matches returned per question.
    pub top_k: usize,
    /// Minimum cosine similarity to accept.
    pub similarity_floor: f32,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            similarity_floor: 0.1,
        }
    }
}

pub struct Retriever<P: LlmProvider> {
    embedder: Arc<Embedder<P>>,
    store: Arc<dyn VectorStore>,
    config: RetrieverConfig,
}

impl<P: LlmProvider> Retriever<P> {
    pub fn new(
        embedder: Arc<Embedder<P>>,
        store: Arc<dyn VectorStore>,
        config: RetrieverConfig,
    ) -> Self {
        Self {
            embedder,
            store,
            config,
        }
    }

    /// Retrieve the chunks most similar to `question`, best first.
    ///
    /// An empty result is not an error; it means nothing cleared the
    /// similarity floor.
    ///
    /// # Errors
    ///
    /// Returns an error if embedding the question or searching the store
    /// fails.
    pub async fn retrieve(
        &self,
        question: &str,
        top_k: Option<usize>,
    ) -> Result<Vec<RetrievalMatch>, PipelineError> {
        let query = self.embedder.embed_one(question).await?;
        let top_k = top_k.unwrap_or(self.config.top_k);

        let matches = self
            .store
            .search(query, top_k, self.config.similarity_floor)
            .await?;

        tracing::debug!(
            matches = matches.len(),
            top_k,
            floor = self.config.similarity_floor,
            "retrieval complete"
        );

        Ok(matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lector_llm::mock::MockProvider;
    use lector_store::ChunkRecord;
    use lector_store::memory::InMemoryVectorStore;

    fn embedder_with(vector: Vec<f32>) -> Arc<Embedder<MockProvider>> {
        let provider = Arc::new(MockProvider::default().with_embeddings(vector));
        Arc::new(Embedder::new(provider))
    }

    #[tokio::test]
    async fn retrieves_matching_chunks_best_first() {
        let store = Arc::new(InMemoryVectorStore::new());
        store
            .upsert(vec![
                ChunkRecord::new("doc-1", 0, "close match", vec![1.0, 0.0], "a.txt"),
                ChunkRecord::new("doc-1", 1, "orthogonal", vec![0.0, 1.0], "a.txt"),
            ])
            .await
            .unwrap();

        let retriever = Retriever::new(
            embedder_with(vec![1.0, 0.0]),
            store,
            RetrieverConfig::default(),
        );
        let matches = retriever.retrieve("question", None).await.unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].text, "close match");
    }

    #[tokio::test]
    async fn empty_store_gives_empty_matches() {
        let store = Arc::new(InMemoryVectorStore::new());
        let retriever = Retriever::new(
            embedder_with(vec![1.0, 0.0]),
            store,
            RetrieverConfig::default(),
        );
        let matches = retriever.retrieve("anything", None).await.unwrap();
        assert!(matches.is_empty());
    }

    #[tokio::test]
    async fn explicit_top_k_overrides_config() {
        let store = Arc::new(InMemoryVectorStore::new());
        let records: Vec<ChunkRecord> = (0..4)
            .map(|i| ChunkRecord::new("doc-1", i, format!("chunk {i}"), vec![1.0, 0.0], "a.txt"))
            .collect();
        store.upsert(records).await.unwrap();

        let retriever = Retriever::new(
            embedder_with(vec![1.0, 0.0]),
            store,
            RetrieverConfig::default(),
        );
        let matches = retriever.retrieve("q", Some(2)).await.unwrap();
        assert_eq!(matches.len(), 2);
    }

    #[tokio::test]
    async fn embed_failure_propagates() {
        let provider = Arc::new(MockProvider::default().failing_embed());
        let embedder = Arc::new(Embedder::new(provider));
        let store = Arc::new(InMemoryVectorStore::new());

        let retriever = Retriever::new(embedder, store, RetrieverConfig::default());
        let result = retriever.retrieve("q", None).await;
        assert!(matches!(result, Err(PipelineError::Embedding(_))));
    }
}
