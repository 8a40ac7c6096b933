//! Grounded answer generation over retrieved chunks.
//!
//! The generator never calls the language model without context: an empty
//! match set yields a single `NoContext` terminal event. Failures during
//! generation terminate the stream with an `Error` event; text already
//! delivered stays delivered.

use std::fmt::Write as _;
use std::pin::Pin;
use std::sync::Arc;

use lector_llm::provider::{LlmProvider, Message};
use lector_store::RetrievalMatch;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{Stream, StreamExt};

use crate::error::PipelineError;

const SYSTEM_PROMPT: &str = "You are a document question answering assistant. \
Answer using only the information in the provided context. \
If the context does not contain the answer, say you cannot find it \
in the ingested documents. Do not use outside knowledge.";

/// Provenance of one retrieved chunk, attached to the terminal event.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceRef {
    pub document_id: String,
    pub chunk_index: usize,
    pub similarity: f32,
    pub source_name: String,
}

impl From<&RetrievalMatch> for SourceRef {
    fn from(m: &RetrievalMatch) -> Self {
        Self {
            document_id: m.document_id.clone(),
            chunk_index: m.chunk_index,
            similarity: m.score,
            source_name: m.source_name.clone(),
        }
    }
}

/// One event of an answer stream. Exactly one terminal variant
/// (`Done`, `NoContext`, or `Error`) closes every stream.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnswerEvent {
    Content { text: String },
    Done { sources: Vec<SourceRef> },
    NoContext,
    Error { message: String },
}

pub type AnswerStream = Pin<Box<dyn Stream<Item = AnswerEvent> + Send>>;

/// Aggregate (non-streaming) result of an ask.
#[derive(Debug, Clone, Serialize)]
pub struct AskOutcome {
    pub answer: String,
    pub sources: Vec<SourceRef>,
    pub no_context: bool,
}

pub struct AnswerGenerator<P: LlmProvider> {
    provider: Arc<P>,
}

impl<P: LlmProvider + 'static> AnswerGenerator<P> {
    pub fn new(provider: Arc<P>) -> Self {
        Self { provider }
    }

    /// Stream an answer grounded in `matches`.
    ///
    /// Token deltas arrive as `Content` events in generation order,
    /// followed by exactly one terminal event.
    pub fn generate(&self, question: &str, matches: Vec<RetrievalMatch>) -> AnswerStream {
        if matches.is_empty() {
            return Box::pin(tokio_stream::once(AnswerEvent::NoContext));
        }

        let messages = build_messages(question, &matches);
        let sources: Vec<SourceRef> = matches.iter().map(SourceRef::from).collect();
        let provider = Arc::clone(&self.provider);

        let (tx, rx) = mpsc::channel(32);
        tokio::spawn(async move {
            if provider.supports_streaming() {
                stream_answer(provider.as_ref(), &messages, sources, &tx).await;
            } else {
                match provider.chat(&messages).await {
                    Ok(text) => {
                        if tx.send(AnswerEvent::Content { text }).await.is_ok() {
                            let _ = tx.send(AnswerEvent::Done { sources }).await;
                        }
                    }
                    Err(e) => {
                        let _ = tx
                            .send(AnswerEvent::Error {
                                message: e.to_string(),
                            })
                            .await;
                    }
                }
            }
        });

        Box::pin(ReceiverStream::new(rx))
    }

    /// Non-streaming variant: drain the stream into one outcome.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Generation`] if the stream terminates with
    /// an error event.
    pub async fn generate_aggregate(
        &self,
        question: &str,
        matches: Vec<RetrievalMatch>,
    ) -> Result<AskOutcome, PipelineError> {
        let mut stream = self.generate(question, matches);
        let mut answer = String::new();

        while let Some(event) = stream.next().await {
            match event {
                AnswerEvent::Content { text } => answer.push_str(&text),
                AnswerEvent::Done { sources } => {
                    return Ok(AskOutcome {
                        answer,
                        sources,
                        no_context: false,
                    });
                }
                AnswerEvent::NoContext => {
                    return Ok(AskOutcome {
                        answer: String::new(),
                        sources: Vec::new(),
                        no_context: true,
                    });
                }
                AnswerEvent::Error { message } => {
                    return Err(PipelineError::Generation(message));
                }
            }
        }

        Err(PipelineError::Generation(
            "answer stream ended without a terminal event".into(),
        ))
    }
}

async fn stream_answer<P: LlmProvider>(
    provider: &P,
    messages: &[Message],
    sources: Vec<SourceRef>,
    tx: &mpsc::Sender<AnswerEvent>,
) {
    let mut stream = match provider.chat_stream(messages).await {
        Ok(stream) => stream,
        Err(e) => {
            let _ = tx
                .send(AnswerEvent::Error {
                    message: e.to_string(),
                })
                .await;
            return;
        }
    };

    while let Some(item) = stream.next().await {
        match item {
            Ok(text) => {
                // Receiver dropped means the caller disconnected; stop
                // pulling from the model.
                if tx.send(AnswerEvent::Content { text }).await.is_err() {
                    tracing::debug!("answer stream receiver dropped, aborting generation");
                    return;
                }
            }
            Err(e) => {
                let _ = tx
                    .send(AnswerEvent::Error {
                        message: e.to_string(),
                    })
                    .await;
                return;
            }
        }
    }

    let _ = tx.send(AnswerEvent::Done { sources }).await;
}

/// Build the grounded prompt: context chunks in retrieval order, then the
/// question.
fn build_messages(question: &str, matches: &[RetrievalMatch]) -> Vec<Message> {
    let mut context = String::new();
    for m in matches {
        let _ = writeln!(context, "[{} #{}]", m.source_name, m.chunk_index);
        context.push_str(&m.text);
        context.push_str("\n\n");
    }

    let user = format!("Context:\n{context}Question: {question}");
    vec![Message::system(SYSTEM_PROMPT), Message::user(user)]
}
