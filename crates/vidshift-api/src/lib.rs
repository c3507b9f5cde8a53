//! Axum HTTP/WebSocket host for vidshift.
//!
//! Submits uploads to the job service, exposes job status and cancellation,
//! and relays realtime progress over WebSocket.

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod routes;
pub mod state;
pub mod ws;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
