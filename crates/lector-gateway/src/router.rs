use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use subtle::ConstantTimeEq;
use tower_http::limit::RequestBodyLimitLayer;

use lector_llm::provider::LlmProvider;

use super::handlers::{
    ask_handler, ask_stream_handler, delete_document_handler, health_handler, ingest_handler,
};
use super::server::AppState;

#[derive(Clone)]
struct AuthConfig {
    token: Option<String>,
}

pub(crate) fn build_router<C: LlmProvider + 'static, E: LlmProvider + 'static>(
    state: AppState<C, E>,
    auth_token: Option<String>,
    max_body_size: usize,
) -> Router {
    let auth_cfg = AuthConfig { token: auth_token };

    // Mutating endpoints sit behind bearer auth; asking and health do not.
    // The body limit covers every route.
    let protected = Router::new()
        .route("/ingest", post(ingest_handler::<C, E>))
        .route("/documents/{id}", delete(delete_document_handler::<C, E>))
        .layer(middleware::from_fn_with_state(auth_cfg, auth_middleware));

    Router::new()
        .route("/health", get(health_handler::<C, E>))
        .route("/ask", post(ask_handler::<C, E>))
        .route("/ask-stream", get(ask_stream_handler::<C, E>))
        .merge(protected)
        .layer(RequestBodyLimitLayer::new(max_body_size))
        .with_state(state)
}

async fn auth_middleware(
    axum::extract::State(cfg): axum::extract::State<AuthConfig>,
    req: Request<Body>,
    next: Next,
) -> Response {
    if let Some(ref expected) = cfg.token {
        let auth_header = req
            .headers()
            .get("authorization")
            .and_then(|v| v.to_str().ok());

        let token = auth_header
            .and_then(|v| v.strip_prefix("Bearer "))
            .unwrap_or("");

        // Hash both values to fixed-length digests to avoid leaking token length
        let token_hash = blake3::hash(token.as_bytes());
        let expected_hash = blake3::hash(expected.as_bytes());
        if !bool::from(token_hash.as_bytes().ct_eq(expected_hash.as_bytes())) {
            return StatusCode::UNAUTHORIZED.into_response();
        }
    }

    next.run(req).await
}
