// src/lib.rs
// Public library surface for integration tests (and potential reuse).

pub mod api;
pub mod client;
pub mod config;
pub mod context;
pub mod data;
pub mod events;
pub mod generate;
pub mod progress;
pub mod sources;
pub mod telemetry;

// ---- Re-exports for stable public API ----
pub use crate::api::{create_router, create_router_with};
pub use crate::client::RecommendationsClient;
pub use crate::config::AppConfig;
pub use crate::context::{Context, ContextAggregator};
pub use crate::events::{Event, EventList, Location, RecommendationsRequest, RecommendationsResponse};
pub use crate::generate::{GenerationExhausted, RecommendationGenerator};

use axum::Router;

/// Build the application router from the current environment. Used by the
/// binary and by integration tests driving the app in-process.
pub fn app() -> anyhow::Result<Router> {
    let config = AppConfig::from_env()?;
    Ok(create_router(config))
}
