// src/sources/mod.rs
pub mod festivals;
pub mod listings;
pub mod weather;

use std::time::Duration;

pub use festivals::{FestivalItem, FestivalsSource};
pub use listings::{ListingItem, ListingsSource};
pub use weather::{WeatherSnapshot, WeatherSource};

/// Typed failure every adapter converts its faults into. Nothing else is
/// allowed past an adapter boundary.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("source unavailable: {0}")]
    Unavailable(String),
    #[error("source call exceeded its {0:?} budget")]
    Timeout(Duration),
    #[error("source returned an unusable payload: {0}")]
    InvalidResponse(String),
    #[error("source rate limit hit")]
    RateLimited,
}

impl SourceError {
    /// Map a transport-level error onto the taxonomy.
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return SourceError::Timeout(crate::config::SOURCE_TIMEOUT);
        }
        if err.status() == Some(reqwest::StatusCode::TOO_MANY_REQUESTS) {
            return SourceError::RateLimited;
        }
        if err.is_decode() {
            return SourceError::InvalidResponse(err.to_string());
        }
        SourceError::Unavailable(err.to_string())
    }
}

/// Classify a non-success HTTP status.
pub(crate) fn status_error(status: reqwest::StatusCode) -> SourceError {
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        SourceError::RateLimited
    } else {
        SourceError::Unavailable(format!("upstream returned {status}"))
    }
}

/// Shared HTTP client for adapters; connect/request budgets keep any single
/// call inside the aggregator's per-source bound.
pub(crate) fn source_http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .user_agent("whatson/0.1 (+local activity recommender)")
        .connect_timeout(Duration::from_secs(4))
        .timeout(crate::config::SOURCE_TIMEOUT)
        .build()
        .expect("reqwest client")
}
