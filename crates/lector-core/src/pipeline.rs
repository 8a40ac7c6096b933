//! Pipeline orchestrator: ties chunking, embedding, storage, retrieval
//! and generation together.
//!
//! Ingest runs Extract -> Chunk -> Embed -> Store; a failure at any stage
//! reports that stage and leaves no partial chunk set visible (chunks
//! written before a store failure are deleted before the error returns).
//! Ask runs Retrieve -> Generate; generation failures terminate the
//! answer stream without retracting already-delivered text.

use std::path::Path;
use std::sync::Arc;

use lector_llm::embedder::Embedder;
use lector_llm::provider::LlmProvider;
use lector_store::{ChunkRecord, VectorStore};
use serde::Serialize;
use uuid::Uuid;

use crate::answer::{AnswerGenerator, AnswerStream, AskOutcome};
use crate::chunker::Chunker;
use crate::document::{LoadedDocument, loader_for};
use crate::error::{IngestError, IngestStage, PipelineError};
use crate::retriever::{Retriever, RetrieverConfig};

/// Successful ingest result.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestReceipt {
    pub document_id: String,
    pub source_name: String,
    pub chunk_count: usize,
}

/// `C` generates answers; `E` produces embeddings. They are usually the
/// same provider but may differ (e.g. local embeddings, remote chat).
pub struct Pipeline<C: LlmProvider + 'static, E: LlmProvider> {
    chunker: Chunker,
    embedder: Arc<Embedder<E>>,
    store: Arc<dyn VectorStore>,
    retriever: Retriever<E>,
    generator: AnswerGenerator<C>,
}

impl<C: LlmProvider + 'static, E: LlmProvider> Pipeline<C, E> {
    pub fn new(
        chat_provider: Arc<C>,
        embedder: Arc<Embedder<E>>,
        store: Arc<dyn VectorStore>,
        chunker: Chunker,
        retrieval: RetrieverConfig,
    ) -> Self {
        let retriever = Retriever::new(Arc::clone(&embedder), Arc::clone(&store), retrieval);
        Self {
            chunker,
            embedder,
            store,
            retriever,
            generator: AnswerGenerator::new(chat_provider),
        }
    }

    /// Ingest already-extracted text under a fresh document id.
    ///
    /// Re-ingesting the same text mints a new id; no deduplication happens
    /// at this layer.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError`] labeled with the failing stage. On a store
    /// failure any partially-written chunks are deleted first.
    pub async fn ingest_text(
        &self,
        text: &str,
        source_name: &str,
    ) -> Result<IngestReceipt, IngestError> {
        self.ingest_extracted(text, source_name, &[]).await
    }

    /// Ingest an already-loaded document, labeling each chunk with the
    /// page it starts on when the loader reported page offsets.
    ///
    /// # Errors
    ///
    /// Same as [`Self::ingest_text`].
    pub async fn ingest_document(
        &self,
        document: &LoadedDocument,
    ) -> Result<IngestReceipt, IngestError> {
        self.ingest_extracted(
            &document.content,
            &document.source_name,
            &document.page_offsets,
        )
        .await
    }

    async fn ingest_extracted(
        &self,
        text: &str,
        source_name: &str,
        page_offsets: &[usize],
    ) -> Result<IngestReceipt, IngestError> {
        let document_id = Uuid::new_v4().to_string();

        let chunks = self.chunker.chunk(text);
        if chunks.is_empty() {
            tracing::info!(document_id, source_name, "nothing to ingest, text is empty");
            return Ok(IngestReceipt {
                document_id,
                source_name: source_name.to_owned(),
                chunk_count: 0,
            });
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self
            .embedder
            .embed_batch(&texts)
            .await
            .map_err(|e| IngestError::new(IngestStage::Embed, e))?;

        let records: Vec<ChunkRecord> = chunks
            .iter()
            .zip(vectors)
            .map(|(chunk, embedding)| {
                ChunkRecord::new(&document_id, chunk.index, &chunk.text, embedding, source_name)
                    .with_page(page_number(chunk.start, page_offsets))
            })
            .collect();

        let chunk_count = records.len();
        if let Err(e) = self.store.upsert(records).await {
            // All-or-nothing: wipe whatever the failed write left behind
            // so retrieval never sees a partial document.
            if let Err(cleanup) = self.store.delete_document(&document_id).await {
                tracing::warn!(document_id, error = %cleanup, "rollback after failed ingest also failed");
            }
            return Err(IngestError::new(IngestStage::Store, e));
        }

        tracing::info!(document_id, source_name, chunk_count, "document ingested");
        Ok(IngestReceipt {
            document_id,
            source_name: source_name.to_owned(),
            chunk_count,
        })
    }

    /// Load a file (by extension) and ingest its text.
    ///
    /// # Errors
    ///
    /// Unsupported formats and load failures report the `extract` stage;
    /// later failures report theirs.
    pub async fn ingest_file(&self, path: &Path) -> Result<IngestReceipt, IngestError> {
        let loader = loader_for(path).map_err(|e| IngestError::new(IngestStage::Extract, e))?;
        let document = loader
            .load(path)
            .await
            .map_err(|e| IngestError::new(IngestStage::Extract, e))?;

        self.ingest_document(&document).await
    }

    /// Remove every chunk of a document. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns an error if the store delete fails.
    pub async fn delete_document(&self, document_id: &str) -> Result<(), PipelineError> {
        if document_id.trim().is_empty() {
            return Err(PipelineError::InvalidInput(
                "document id must not be empty".into(),
            ));
        }
        self.store.delete_document(document_id).await?;
        tracing::info!(document_id, "document deleted");
        Ok(())
    }

    /// Answer a question as a stream of events.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidInput`] for an empty question or a
    /// zero `top_k`, and retrieval errors if the question cannot be
    /// embedded or the store searched. Generation errors arrive on the
    /// stream itself.
    pub async fn ask_stream(
        &self,
        question: &str,
        top_k: Option<usize>,
    ) -> Result<AnswerStream, PipelineError> {
        validate_ask(question, top_k)?;
        let matches = self.retriever.retrieve(question, top_k).await?;
        Ok(self.generator.generate(question, matches))
    }

    /// Answer a question as one aggregate outcome.
    ///
    /// # Errors
    ///
    /// Same as [`Self::ask_stream`], plus [`PipelineError::Generation`]
    /// when the model fails mid-answer.
    pub async fn ask(
        &self,
        question: &str,
        top_k: Option<usize>,
    ) -> Result<AskOutcome, PipelineError> {
        validate_ask(question, top_k)?;
        let matches = self.retriever.retrieve(question, top_k).await?;
        self.generator.generate_aggregate(question, matches).await
    }
}

/// 1-based page a chunk starts on: one more than the number of page
/// boundaries at or before the chunk start. `None` without page structure.
fn page_number(start: usize, page_offsets: &[usize]) -> Option<u32> {
    if page_offsets.is_empty() {
        return None;
    }
    let page = page_offsets.partition_point(|&offset| offset <= start) + 1;
    Some(u32::try_from(page).unwrap_or(u32::MAX))
}

fn validate_ask(question: &str, top_k: Option<usize>) -> Result<(), PipelineError> {
    if question.trim().is_empty() {
        return Err(PipelineError::InvalidInput(
            "question must not be empty".into(),
        ));
    }
    if top_k == Some(0) {
        return Err(PipelineError::InvalidInput("top_k must be >= 1".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunker::ChunkerConfig;
    use lector_llm::mock::MockProvider;
    use lector_store::error::StoreError;
    use lector_store::memory::InMemoryVectorStore;
    use lector_store::{BoxFuture, RetrievalMatch};
    use std::sync::atomic::{AtomicBool, Ordering};

    fn pipeline_with(
        provider: MockProvider,
        store: Arc<dyn VectorStore>,
    ) -> Pipeline<MockProvider, MockProvider> {
        let provider = Arc::new(provider);
        Pipeline::new(
            Arc::clone(&provider),
            Arc::new(Embedder::new(provider)),
            store,
            Chunker::new(ChunkerConfig::default()).unwrap(),
            RetrieverConfig::default(),
        )
    }

    #[tokio::test]
    async fn ingest_stores_all_chunks() {
        let store = Arc::new(InMemoryVectorStore::new());
        let pipeline = pipeline_with(
            MockProvider::default().with_embeddings(vec![1.0, 0.0]),
            Arc::clone(&store) as Arc<dyn VectorStore>,
        );

        let receipt = pipeline
            .ingest_text("Some document text worth keeping.", "doc.txt")
            .await
            .unwrap();
        assert_eq!(receipt.chunk_count, 1);
        assert_eq!(
            store.count_document(&receipt.document_id).await.unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn empty_text_ingests_zero_chunks() {
        let store = Arc::new(InMemoryVectorStore::new());
        let pipeline = pipeline_with(
            MockProvider::default().with_embeddings(vec![1.0, 0.0]),
            store,
        );

        let receipt = pipeline.ingest_text("   \n  ", "blank.txt").await.unwrap();
        assert_eq!(receipt.chunk_count, 0);
    }

    #[tokio::test]
    async fn reingest_mints_fresh_document_id() {
        let store = Arc::new(InMemoryVectorStore::new());
        let pipeline = pipeline_with(
            MockProvider::default().with_embeddings(vec![1.0, 0.0]),
            store,
        );

        let first = pipeline.ingest_text("same text", "a.txt").await.unwrap();
        let second = pipeline.ingest_text("same text", "a.txt").await.unwrap();
        assert_ne!(first.document_id, second.document_id);
    }

    #[tokio::test]
    async fn embed_failure_reports_embed_stage() {
        let store = Arc::new(InMemoryVectorStore::new());
        let pipeline = pipeline_with(MockProvider::default().failing_embed(), store);

        let err = pipeline.ingest_text("text", "a.txt").await.unwrap_err();
        assert_eq!(err.stage, IngestStage::Embed);
    }

    #[tokio::test]
    async fn unsupported_extension_reports_extract_stage() {
        let store = Arc::new(InMemoryVectorStore::new());
        let pipeline = pipeline_with(
            MockProvider::default().with_embeddings(vec![1.0, 0.0]),
            store,
        );

        let err = pipeline
            .ingest_file(Path::new("image.png"))
            .await
            .unwrap_err();
        assert_eq!(err.stage, IngestStage::Extract);
    }

    #[tokio::test]
    async fn ingest_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("notes.txt");
        std::fs::write(&file, "Notes about the weather today.").unwrap();

        let store = Arc::new(InMemoryVectorStore::new());
        let pipeline = pipeline_with(
            MockProvider::default().with_embeddings(vec![1.0, 0.0]),
            Arc::clone(&store) as Arc<dyn VectorStore>,
        );

        let receipt = pipeline.ingest_file(&file).await.unwrap();
        assert_eq!(receipt.source_name, "notes.txt");
        assert_eq!(receipt.chunk_count, 1);
    }

    #[tokio::test]
    async fn empty_question_rejected_before_any_stage() {
        let store = Arc::new(InMemoryVectorStore::new());
        let provider = MockProvider::default().with_embeddings(vec![1.0, 0.0]);
        let pipeline = pipeline_with(provider, store);

        let result = pipeline.ask("   ", None).await;
        assert!(matches!(result, Err(PipelineError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn zero_top_k_rejected() {
        let store = Arc::new(InMemoryVectorStore::new());
        let pipeline = pipeline_with(
            MockProvider::default().with_embeddings(vec![1.0, 0.0]),
            store,
        );

        let result = pipeline.ask("question", Some(0)).await;
        assert!(matches!(result, Err(PipelineError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn ask_without_documents_returns_no_context() {
        let store = Arc::new(InMemoryVectorStore::new());
        let pipeline = pipeline_with(
            MockProvider::default().with_embeddings(vec![1.0, 0.0]),
            store,
        );

        let outcome = pipeline.ask("anything at all?", None).await.unwrap();
        assert!(outcome.no_context);
    }

    #[tokio::test]
    async fn ingest_then_ask_end_to_end() {
        let store = Arc::new(InMemoryVectorStore::new());
        let provider = MockProvider::default()
            .with_embeddings(vec![1.0, 0.0])
            .with_response("grounded answer");
        let pipeline = pipeline_with(provider, store);

        let receipt = pipeline
            .ingest_text("The capital of France is Paris.", "facts.txt")
            .await
            .unwrap();

        let outcome = pipeline.ask("capital of France?", None).await.unwrap();
        assert_eq!(outcome.answer, "grounded answer");
        assert!(!outcome.no_context);
        assert_eq!(outcome.sources[0].document_id, receipt.document_id);
    }

    #[test]
    fn page_number_is_none_without_page_structure() {
        assert_eq!(page_number(0, &[]), None);
        assert_eq!(page_number(5000, &[]), None);
    }

    #[test]
    fn page_number_counts_boundaries_at_or_before_start() {
        let offsets = [602, 1204];
        assert_eq!(page_number(0, &offsets), Some(1));
        assert_eq!(page_number(601, &offsets), Some(1));
        assert_eq!(page_number(602, &offsets), Some(2));
        assert_eq!(page_number(1203, &offsets), Some(2));
        assert_eq!(page_number(1204, &offsets), Some(3));
    }

    /// Store that keeps every upserted record, to inspect what ingest wrote.
    struct CapturingStore {
        records: std::sync::Mutex<Vec<ChunkRecord>>,
    }

    impl VectorStore for CapturingStore {
        fn upsert(&self, records: Vec<ChunkRecord>) -> BoxFuture<'_, Result<(), StoreError>> {
            self.records.lock().unwrap().extend(records);
            Box::pin(async { Ok(()) })
        }

        fn search(
            &self,
            _query: Vec<f32>,
            _top_k: usize,
            _similarity_floor: f32,
        ) -> BoxFuture<'_, Result<Vec<RetrievalMatch>, StoreError>> {
            Box::pin(async { Ok(Vec::new()) })
        }

        fn delete_document(&self, _document_id: &str) -> BoxFuture<'_, Result<(), StoreError>> {
            Box::pin(async { Ok(()) })
        }

        fn count_document(&self, _document_id: &str) -> BoxFuture<'_, Result<usize, StoreError>> {
            Box::pin(async { Ok(0) })
        }
    }

    #[tokio::test]
    async fn paged_document_labels_chunks_with_start_page() {
        let store = Arc::new(CapturingStore {
            records: std::sync::Mutex::new(Vec::new()),
        });
        let pipeline = pipeline_with(
            MockProvider::default().with_embeddings(vec![1.0, 0.0]),
            Arc::clone(&store) as Arc<dyn VectorStore>,
        );

        // Three 600-char pages joined with paragraph breaks; pages 2 and 3
        // begin at char offsets 602 and 1204.
        let page = "x".repeat(600);
        let document = LoadedDocument {
            content: format!("{page}\n\n{page}\n\n{page}"),
            source_name: "paper.pdf".to_owned(),
            content_type: "application/pdf".to_owned(),
            page_offsets: vec![602, 1204],
        };

        pipeline.ingest_document(&document).await.unwrap();

        let records = store.records.lock().unwrap();
        let pages: Vec<Option<u32>> = records.iter().map(|r| r.page).collect();
        assert_eq!(pages, vec![Some(1), Some(1), Some(2)]);
    }

    #[tokio::test]
    async fn text_ingest_leaves_page_unset() {
        let store = Arc::new(CapturingStore {
            records: std::sync::Mutex::new(Vec::new()),
        });
        let pipeline = pipeline_with(
            MockProvider::default().with_embeddings(vec![1.0, 0.0]),
            Arc::clone(&store) as Arc<dyn VectorStore>,
        );

        pipeline.ingest_text("plain prose", "notes.txt").await.unwrap();

        let records = store.records.lock().unwrap();
        assert!(records.iter().all(|r| r.page.is_none()));
    }

    /// Store that rejects writes, to observe the rollback path.
    struct FailingStore {
        deleted: AtomicBool,
    }

    impl VectorStore for FailingStore {
        fn upsert(&self, _records: Vec<ChunkRecord>) -> BoxFuture<'_, Result<(), StoreError>> {
            Box::pin(async { Err(StoreError::Write("disk full".into())) })
        }

        fn search(
            &self,
            _query: Vec<f32>,
            _top_k: usize,
            _similarity_floor: f32,
        ) -> BoxFuture<'_, Result<Vec<RetrievalMatch>, StoreError>> {
            Box::pin(async { Ok(Vec::new()) })
        }

        fn delete_document(&self, _document_id: &str) -> BoxFuture<'_, Result<(), StoreError>> {
            self.deleted.store(true, Ordering::SeqCst);
            Box::pin(async { Ok(()) })
        }

        fn count_document(&self, _document_id: &str) -> BoxFuture<'_, Result<usize, StoreError>> {
            Box::pin(async { Ok(0) })
        }
    }

    #[tokio::test]
    async fn store_failure_rolls_back_and_reports_store_stage() {
        let store = Arc::new(FailingStore {
            deleted: AtomicBool::new(false),
        });
        let pipeline = pipeline_with(
            MockProvider::default().with_embeddings(vec![1.0, 0.0]),
            Arc::clone(&store) as Arc<dyn VectorStore>,
        );

        let err = pipeline.ingest_text("text", "a.txt").await.unwrap_err();
        assert_eq!(err.stage, IngestStage::Store);
        assert!(store.deleted.load(Ordering::SeqCst));
    }
}
