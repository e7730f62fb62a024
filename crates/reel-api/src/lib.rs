//! Axum HTTP API server.
//!
//! Exposes generation and merge jobs, health/readiness probes, Prometheus
//! metrics and the storage root under `/static`.

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
