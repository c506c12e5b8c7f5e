use axum::{routing::get, Router};
use metrics::describe_counter;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

/// One-time metrics registration (so series show up on /metrics).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "sources_failed_total",
            "Source adapter calls that failed or timed out."
        );
        describe_counter!(
            "sources_invalid_payload_total",
            "Source payloads rejected at the boundary."
        );
        describe_counter!(
            "generate_cascade_attempts_total",
            "Model backend attempts across all cascades."
        );
        describe_counter!(
            "generate_validation_rejects_total",
            "Backend responses rejected by structural validation."
        );
        describe_counter!(
            "generate_cascade_exhausted_total",
            "Generation calls where every candidate failed."
        );
        describe_counter!(
            "recommend_requests_total",
            "Recommendation pipeline runs, by transport."
        );
        describe_counter!(
            "client_cache_hits_total",
            "Coordinator lookups answered from the response cache."
        );
        describe_counter!(
            "client_cache_misses_total",
            "Coordinator lookups that fell through to a fetch or coalesce."
        );
    });
}

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Initialize the Prometheus recorder. Call once from the binary.
    pub fn init() -> Self {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .expect("prometheus: install recorder");
        ensure_metrics_described();
        Self { handle }
    }

    /// Router exposing `/metrics` in the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}
