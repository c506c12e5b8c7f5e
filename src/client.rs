//! Client-side request coordination for the recommendation endpoint.
//!
//! Sits in front of the (expensive) pipeline from the caller's side:
//! identical requests inside the TTL window are served from a local cache,
//! and concurrent identical requests are coalesced into one underlying
//! call. Everything handed back is an owned deep copy, so a caller
//! mutating its result cannot corrupt the cached one.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use metrics::counter;
use tokio::sync::watch;

use crate::events::{RecommendationsRequest, RecommendationsResponse};

/// Recommended TTL for completed responses.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, thiserror::Error)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("server returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("server response failed validation: {0}")]
    Validation(String),
}

type SharedResult = Result<RecommendationsResponse, ClientError>;

/// The wire seam, separated so tests can count and script underlying calls.
#[async_trait]
pub trait RecommendTransport: Send + Sync {
    async fn fetch(&self, request: &RecommendationsRequest) -> SharedResult;
}

/// Real HTTP transport against the unary recommendation endpoint.
pub struct HttpTransport {
    http: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(base_url: String) -> Self {
        let http = reqwest::Client::builder()
            .user_agent("whatson-client/0.1")
            .connect_timeout(Duration::from_secs(4))
            .build()
            .expect("reqwest client");
        Self { http, base_url }
    }
}

#[async_trait]
impl RecommendTransport for HttpTransport {
    async fn fetch(&self, request: &RecommendationsRequest) -> SharedResult {
        let url = format!("{}/events/recommendations", self.base_url);
        let resp = self
            .http
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(ClientError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let body: RecommendationsResponse = resp
            .json()
            .await
            .map_err(|e| ClientError::Validation(e.to_string()))?;
        // Never let a malformed event past the client boundary.
        for event in &body.events {
            event
                .validate()
                .map_err(|e| ClientError::Validation(format!("event '{}': {e}", event.name)))?;
        }
        Ok(body)
    }
}

/// Injected clock so TTL behavior is deterministic under test.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> u64;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }
}

struct CacheEntry {
    stored_at_ms: u64,
    response: RecommendationsResponse,
}

struct CoordinatorState {
    cache: HashMap<String, CacheEntry>,
    in_flight: HashMap<String, watch::Receiver<Option<SharedResult>>>,
}

/// Removes the in-flight entry when the leader finishes or is dropped, so
/// later callers fall through to the cache instead of a dead handle.
struct InFlightGuard {
    key: String,
    state: Arc<Mutex<CoordinatorState>>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if let Ok(mut st) = self.state.lock() {
            st.in_flight.remove(&self.key);
        }
    }
}

pub struct RecommendationsClient<T: RecommendTransport> {
    transport: T,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    state: Arc<Mutex<CoordinatorState>>,
}

enum Role {
    Leader(watch::Sender<Option<SharedResult>>, InFlightGuard),
    Follower(watch::Receiver<Option<SharedResult>>),
}

impl RecommendationsClient<HttpTransport> {
    pub fn new(base_url: String) -> Self {
        Self::with_parts(HttpTransport::new(base_url), Arc::new(SystemClock), DEFAULT_CACHE_TTL)
    }

    /// Base URL from `RECOMMENDER_API_BASE`, defaulting to the local server.
    pub fn from_env() -> Self {
        let base_url = std::env::var("RECOMMENDER_API_BASE")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| "http://localhost:8000".to_string());
        Self::new(base_url)
    }
}

impl<T: RecommendTransport> RecommendationsClient<T> {
    pub fn with_parts(transport: T, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            transport,
            clock,
            ttl,
            state: Arc::new(Mutex::new(CoordinatorState {
                cache: HashMap::new(),
                in_flight: HashMap::new(),
            })),
        }
    }

    /// Canonical cache key over the request's semantic fields.
    fn cache_key(request: &RecommendationsRequest) -> String {
        format!(
            "n={}|prefs={}",
            request.number_events,
            request.response_preferences.as_deref().unwrap_or("")
        )
    }

    pub async fn fetch(&self, request: &RecommendationsRequest) -> SharedResult {
        let key = Self::cache_key(request);

        let role = {
            let mut st = self.state.lock().expect("coordinator state poisoned");
            let now = self.clock.now_millis();

            if let Some(entry) = st.cache.get(&key) {
                if now.saturating_sub(entry.stored_at_ms) < self.ttl.as_millis() as u64 {
                    tracing::debug!(%key, "client cache hit");
                    counter!("client_cache_hits_total").increment(1);
                    return Ok(entry.response.clone());
                }
                st.cache.remove(&key);
            }
            counter!("client_cache_misses_total").increment(1);

            if let Some(rx) = st.in_flight.get(&key) {
                tracing::debug!(%key, "attaching to in-flight request");
                Role::Follower(rx.clone())
            } else {
                let (tx, rx) = watch::channel(None);
                st.in_flight.insert(key.clone(), rx);
                let guard = InFlightGuard {
                    key: key.clone(),
                    state: Arc::clone(&self.state),
                };
                Role::Leader(tx, guard)
            }
        };

        match role {
            Role::Follower(mut rx) => {
                let outcome = rx
                    .wait_for(|v| v.is_some())
                    .await
                    .map_err(|_| ClientError::Transport("coalesced request was abandoned".into()))?
                    .clone();
                outcome.expect("checked is_some above")
            }
            Role::Leader(tx, guard) => {
                let result = self.transport.fetch(request).await;

                {
                    let mut st = self.state.lock().expect("coordinator state poisoned");
                    if let Ok(response) = &result {
                        st.cache.insert(
                            key,
                            CacheEntry {
                                stored_at_ms: self.clock.now_millis(),
                                response: response.clone(),
                            },
                        );
                    }
                }
                // Registry entry must be gone before followers observe the
                // value, so post-completion callers see the cache instead.
                drop(guard);
                let _ = tx.send(Some(result.clone()));
                result
            }
        }
    }
}
