//! HTTP API server.
//!
//! This module provides:
//! - REST API (versions 1 and 2) using axum
//! - WebSocket stream of broker messages
//! - Health and metrics endpoints
//! - Optional frontend bundle

mod app;
mod error;
mod frontend;
mod messages;
pub mod metrics;
mod observability;
mod rest;
pub mod types;
mod v2;

pub use app::Server;
pub use error::ApiError;
pub use metrics::init_metrics;
pub use observability::{init_tracing, TracingConfig};
pub use rest::{create_rest_router, ApiState, ApiVersion, HealthResponse};
