use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use lector_core::Pipeline;
use lector_llm::provider::LlmProvider;
use tokio::sync::watch;

use crate::error::GatewayError;
use crate::router::build_router;

pub(crate) struct AppState<C: LlmProvider + 'static, E: LlmProvider> {
    pub pipeline: Arc<Pipeline<C, E>>,
    pub started_at: Instant,
}

impl<C: LlmProvider + 'static, E: LlmProvider> Clone for AppState<C, E> {
    fn clone(&self) -> Self {
        Self {
            pipeline: Arc::clone(&self.pipeline),
            started_at: self.started_at,
        }
    }
}

pub struct GatewayServer<C: LlmProvider + 'static, E: LlmProvider + 'static> {
    addr: SocketAddr,
    auth_token: Option<String>,
    max_body_size: usize,
    pipeline: Arc<Pipeline<C, E>>,
    shutdown_rx: watch::Receiver<bool>,
}

impl<C: LlmProvider + 'static, E: LlmProvider + 'static> GatewayServer<C, E> {
    #[must_use]
    pub fn new(
        bind: &str,
        port: u16,
        pipeline: Arc<Pipeline<C, E>>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        let addr: SocketAddr = format!("{bind}:{port}").parse().unwrap_or_else(|e| {
            tracing::warn!("invalid bind '{bind}': {e}, falling back to 127.0.0.1:{port}");
            SocketAddr::from(([127, 0, 0, 1], port))
        });

        if bind == "0.0.0.0" {
            tracing::warn!("gateway binding to 0.0.0.0 — ensure this is intended for production");
        }

        Self {
            addr,
            auth_token: None,
            max_body_size: 64 * 1024 * 1024,
            pipeline,
            shutdown_rx,
        }
    }

    #[must_use]
    pub fn with_auth(mut self, token: Option<String>) -> Self {
        self.auth_token = token;
        self
    }

    #[must_use]
    pub fn with_max_body_size(mut self, size: usize) -> Self {
        self.max_body_size = size;
        self
    }

    /// Start the HTTP gateway server.
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails to bind or encounters a fatal
    /// I/O error.
    pub async fn serve(self) -> Result<(), GatewayError> {
        let state = AppState {
            pipeline: self.pipeline,
            started_at: Instant::now(),
        };

        let router = build_router(state, self.auth_token, self.max_body_size);

        let listener = tokio::net::TcpListener::bind(self.addr)
            .await
            .map_err(|e| GatewayError::Bind(self.addr.to_string(), e))?;
        tracing::info!("gateway listening on {}", self.addr);

        let mut shutdown_rx = self.shutdown_rx;
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                while !*shutdown_rx.borrow_and_update() {
                    if shutdown_rx.changed().await.is_err() {
                        std::future::pending::<()>().await;
                    }
                }
                tracing::info!("gateway shutting down");
            })
            .await
            .map_err(|e| GatewayError::Server(format!("{e}")))?;

        Ok(())
    }
}
