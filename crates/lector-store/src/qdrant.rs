//! Qdrant-backed vector store: one collection, cosine distance, keyword
//! index on `document_id` for per-document deletes.

use std::collections::HashMap;

use qdrant_client::Qdrant;
use qdrant_client::qdrant::{
    Condition, CreateCollectionBuilder, CreateFieldIndexCollectionBuilder, DeletePointsBuilder,
    Distance, FieldType, Filter, PointStruct, ScrollPointsBuilder, SearchPointsBuilder,
    UpsertPointsBuilder, VectorParamsBuilder, value::Kind,
};

use crate::error::StoreError;
use crate::record::{ChunkRecord, RetrievalMatch};
use crate::{BoxFuture, VectorStore, sort_matches};

const UPSERT_BATCH: usize = 128;

pub struct QdrantVectorStore {
    client: Qdrant,
    collection: String,
}

impl std::fmt::Debug for QdrantVectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QdrantVectorStore")
            .field("collection", &self.collection)
            .finish_non_exhaustive()
    }
}

impl QdrantVectorStore {
    /// Connect to Qdrant at the given URL.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Connection`] if the client cannot be created.
    pub fn new(url: &str, collection: impl Into<String>) -> Result<Self, StoreError> {
        let client = Qdrant::from_url(url)
            .build()
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        Ok(Self {
            client,
            collection: collection.into(),
        })
    }

    /// Ensure the collection exists with cosine vectors of the given size,
    /// plus a keyword index on `document_id`.
    ///
    /// Idempotent: no-op if the collection already exists.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Connection`] if Qdrant cannot be reached or
    /// collection creation fails.
    pub async fn ensure_collection(&self, vector_size: u64) -> Result<(), StoreError> {
        let exists = self
            .client
            .collection_exists(&self.collection)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        if exists {
            return Ok(());
        }

        tracing::info!(collection = %self.collection, vector_size, "creating qdrant collection");
        self.client
            .create_collection(
                CreateCollectionBuilder::new(&self.collection)
                    .vectors_config(VectorParamsBuilder::new(vector_size, Distance::Cosine)),
            )
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        self.client
            .create_field_index(CreateFieldIndexCollectionBuilder::new(
                &self.collection,
                "document_id",
                FieldType::Keyword,
            ))
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        Ok(())
    }
}

fn record_to_point(record: &ChunkRecord) -> Result<PointStruct, StoreError> {
    let payload: HashMap<String, qdrant_client::qdrant::Value> =
        serde_json::from_value(serde_json::json!({
            "document_id": record.document_id,
            "chunk_index": record.chunk_index,
            "text": record.text,
            "source_name": record.source_name,
            "page": record.page,
            "created_at": record.created_at.to_rfc3339(),
        }))
        .map_err(|e| StoreError::Serialization(e.to_string()))?;

    Ok(PointStruct::new(
        record.id.clone(),
        record.embedding.clone(),
        payload,
    ))
}

fn payload_str(payload: &HashMap<String, qdrant_client::qdrant::Value>, key: &str) -> Option<String> {
    match payload.get(key)?.kind.as_ref()? {
        Kind::StringValue(s) => Some(s.clone()),
        _ => None,
    }
}

fn payload_int(payload: &HashMap<String, qdrant_client::qdrant::Value>, key: &str) -> Option<i64> {
    match payload.get(key)?.kind.as_ref()? {
        Kind::IntegerValue(i) => Some(*i),
        _ => None,
    }
}

fn document_filter(document_id: &str) -> Filter {
    Filter::must([Condition::matches("document_id", document_id.to_owned())])
}

impl VectorStore for QdrantVectorStore {
    fn upsert(&self, records: Vec<ChunkRecord>) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(async move {
            let mut committed: Vec<String> = Vec::new();

            for batch in records.chunks(UPSERT_BATCH) {
                let points: Vec<PointStruct> =
                    batch.iter().map(record_to_point).collect::<Result<_, _>>()?;

                if let Err(e) = self
                    .client
                    .upsert_points(UpsertPointsBuilder::new(&self.collection, points))
                    .await
                {
                    // Report exactly which ids are durable before the failure.
                    if committed.is_empty() {
                        return Err(StoreError::Write(e.to_string()));
                    }
                    return Err(StoreError::PartialWrite {
                        committed,
                        reason: e.to_string(),
                    });
                }

                committed.extend(batch.iter().map(|r| r.id.clone()));
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
            let limit = top_k as u64;
            let builder = SearchPointsBuilder::new(&self.collection, query, limit)
                .with_payload(true)
                .score_threshold(similarity_floor);

            let results = self
                .client
                .search_points(builder)
                .await
                .map_err(|e| StoreError::Search(e.to_string()))?;

            let mut matches: Vec<RetrievalMatch> = results
                .result
                .into_iter()
                .filter_map(|point| {
                    let payload = &point.payload;
                    Some(RetrievalMatch {
                        document_id: payload_str(payload, "document_id")?,
                        chunk_index: usize::try_from(payload_int(payload, "chunk_index")?).ok()?,
                        text: payload_str(payload, "text")?,
                        source_name: payload_str(payload, "source_name")?,
                        score: point.score,
                    })
                })
                .collect();

            // Qdrant orders by score; re-sort for the chunk-index tie-break.
            sort_matches(&mut matches);
            Ok(matches)
        })
    }

    fn delete_document(&self, document_id: &str) -> BoxFuture<'_, Result<(), StoreError>> {
        let document_id = document_id.to_owned();
        Box::pin(async move {
            self.client
                .delete_points(
                    DeletePointsBuilder::new(&self.collection)
                        .points(document_filter(&document_id)),
                )
                .await
                .map_err(|e| StoreError::Delete(e.to_string()))?;
            Ok(())
        })
    }

    fn count_document(&self, document_id: &str) -> BoxFuture<'_, Result<usize, StoreError>> {
        let document_id = document_id.to_owned();
        Box::pin(async move {
            let mut count = 0usize;
            let mut offset = None;

            loop {
                let mut builder = ScrollPointsBuilder::new(&self.collection)
                    .filter(document_filter(&document_id))
                    .with_payload(false)
                    .with_vectors(false)
                    .limit(256);
                if let Some(off) = offset {
                    builder = builder.offset(off);
                }

                let response = self
                    .client
                    .scroll(builder)
                    .await
                    .map_err(|e| StoreError::Search(e.to_string()))?;

                count += response.result.len();
                match response.next_page_offset {
                    Some(next) => offset = Some(next),
                    None => break,
                }
            }

            Ok(count)
        })
    }
}
