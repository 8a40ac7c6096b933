//! Core ingestion and question-answering pipeline.
//!
//! Documents flow through chunking, embedding, and vector storage on
//! ingest; questions flow through embedding, retrieval, and grounded
//! answer generation on ask. [`Pipeline`] ties the stages together.

pub mod answer;
pub mod chunker;
pub mod config;
pub mod document;
pub mod error;
pub mod pipeline;
pub mod retriever;

pub use answer::{AnswerEvent, AnswerGenerator, AnswerStream, AskOutcome, SourceRef};
pub use chunker::{Chunk, Chunker, ChunkerConfig};
pub use config::Config;
pub use document::{DocumentLoader, LoadedDocument, TextLoader};
pub use error::{ChunkerError, DocumentError, IngestError, IngestStage, PipelineError};
pub use pipeline::{IngestReceipt, Pipeline};
pub use retriever::{Retriever, RetrieverConfig};

#[cfg(feature = "pdf")]
pub use document::PdfLoader;
