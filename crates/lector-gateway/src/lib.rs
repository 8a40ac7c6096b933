//! HTTP gateway: ingest, delete, and ask endpoints with bearer auth and
//! SSE answer streaming.

mod error;
mod handlers;
mod router;
mod server;

pub use error::GatewayError;
pub use server::GatewayServer;
