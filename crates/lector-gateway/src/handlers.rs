use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use tokio_stream::StreamExt;

use lector_core::answer::SourceRef;
use lector_core::error::{IngestStage, PipelineError};
use lector_llm::provider::LlmProvider;

use super::server::AppState;

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct IngestPayload {
    pub text: String,
    pub source_name: String,
}

#[derive(serde::Deserialize)]
pub(crate) struct AskPayload {
    pub question: String,
    #[serde(default, alias = "topK")]
    pub top_k: Option<usize>,
}

#[derive(serde::Deserialize)]
pub(crate) struct AskQuery {
    pub question: String,
    #[serde(default, alias = "topK")]
    pub top_k: Option<usize>,
}

#[derive(serde::Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    uptime_secs: u64,
}

#[derive(serde::Serialize)]
struct IngestFailureResponse {
    reason: String,
    stage: &'static str,
}

#[derive(serde::Serialize)]
struct AskResponse {
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    answer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sources: Option<Vec<SourceRef>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
}

impl AskResponse {
    fn failure(reason: impl Into<String>) -> Self {
        Self {
            ok: false,
            answer: None,
            sources: None,
            reason: Some(reason.into()),
        }
    }
}

pub(crate) async fn health_handler<C: LlmProvider + 'static, E: LlmProvider>(
    State(state): State<AppState<C, E>>,
) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.started_at.elapsed().as_secs(),
    })
}

pub(crate) async fn ingest_handler<C: LlmProvider + 'static, E: LlmProvider>(
    State(state): State<AppState<C, E>>,
    Json(payload): Json<IngestPayload>,
) -> Response {
    match state
        .pipeline
        .ingest_text(&payload.text, &payload.source_name)
        .await
    {
        Ok(receipt) => Json(receipt).into_response(),
        Err(e) => {
            let status = match e.stage {
                IngestStage::Extract | IngestStage::Chunk => StatusCode::BAD_REQUEST,
                IngestStage::Embed => StatusCode::SERVICE_UNAVAILABLE,
                IngestStage::Store => StatusCode::BAD_GATEWAY,
            };
            let body = IngestFailureResponse {
                reason: e.source.to_string(),
                stage: e.stage.as_str(),
            };
            (status, Json(body)).into_response()
        }
    }
}

pub(crate) async fn delete_document_handler<C: LlmProvider + 'static, E: LlmProvider>(
    State(state): State<AppState<C, E>>,
    Path(document_id): Path<String>,
) -> Response {
    match state.pipeline.delete_document(&document_id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => pipeline_error_response(&e),
    }
}

pub(crate) async fn ask_handler<C: LlmProvider + 'static, E: LlmProvider>(
    State(state): State<AppState<C, E>>,
    Json(payload): Json<AskPayload>,
) -> Response {
    match state.pipeline.ask(&payload.question, payload.top_k).await {
        Ok(outcome) => {
            if outcome.no_context {
                Json(AskResponse {
                    ok: true,
                    answer: None,
                    sources: None,
                    reason: Some("no relevant context found".to_owned()),
                })
                .into_response()
            } else {
                Json(AskResponse {
                    ok: true,
                    answer: Some(outcome.answer),
                    sources: Some(outcome.sources),
                    reason: None,
                })
                .into_response()
            }
        }
        Err(e) => pipeline_error_response(&e),
    }
}

/// Server-sent events: each answer event as one `data:` frame, ending with
/// a terminal `done`, `no_context`, or `error` event.
pub(crate) async fn ask_stream_handler<C: LlmProvider + 'static, E: LlmProvider>(
    State(state): State<AppState<C, E>>,
    Query(query): Query<AskQuery>,
) -> Response {
    match state.pipeline.ask_stream(&query.question, query.top_k).await {
        Ok(stream) => {
            let events = stream.map(|event| Event::default().json_data(&event));
            Sse::new(events)
                .keep_alive(KeepAlive::default())
                .into_response()
        }
        Err(e) => pipeline_error_response(&e),
    }
}

fn pipeline_error_response(error: &PipelineError) -> Response {
    let status = match error {
        PipelineError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        PipelineError::Embedding(_) => StatusCode::SERVICE_UNAVAILABLE,
        PipelineError::Store(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(AskResponse::failure(error.to_string()))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ingest_payload_deserializes_camel_case() {
        let json = r#"{"text":"hello","sourceName":"a.txt"}"#;
        let payload: IngestPayload = serde_json::from_str(json).unwrap();
        assert_eq!(payload.text, "hello");
        assert_eq!(payload.source_name, "a.txt");
    }

    #[test]
    fn ask_payload_accepts_both_top_k_spellings() {
        let a: AskPayload = serde_json::from_str(r#"{"question":"q","topK":3}"#).unwrap();
        assert_eq!(a.top_k, Some(3));
        let b: AskPayload = serde_json::from_str(r#"{"question":"q","top_k":7}"#).unwrap();
        assert_eq!(b.top_k, Some(7));
        let c: AskPayload = serde_json::from_str(r#"{"question":"q"}"#).unwrap();
        assert_eq!(c.top_k, None);
    }

    #[test]
    fn ask_response_omits_absent_fields() {
        let json = serde_json::to_string(&AskResponse::failure("boom")).unwrap();
        assert!(!json.contains("answer"));
        assert!(!json.contains("sources"));
        assert!(json.contains("\"ok\":false"));
    }
}
