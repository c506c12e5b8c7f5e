//! Recommendation generation: an ordered cascade of model backends tried in
//! turn until one yields output that survives structural validation.
//!
//! The cascade is strictly sequential. Order encodes preference, and paid
//! backends must not be called twice for one request.

pub mod backend;
pub mod headline;

use std::sync::Arc;

use metrics::counter;

use crate::config::{AppConfig, BACKEND_TIMEOUT};
use crate::context::Context;
use crate::events::{Event, EventList};
use crate::progress::{ProgressSender, Stage};

pub use backend::{BackendError, CompletionRequest, MockBackend, ModelBackend, OpenAiChatBackend};

/// Every candidate failed. Fatal to the generation call; the call site
/// decides whether that becomes an error response or a fixed fallback.
#[derive(Debug, thiserror::Error)]
#[error("all {attempts} model candidates failed; last error: {last_error}")]
pub struct GenerationExhausted {
    pub attempts: usize,
    pub last_error: String,
}

/// Try each backend in order; first structurally valid response wins.
/// Backend faults and validation rejects are absorbed, logged, and advance
/// the cascade. Returns the accepted value and the winning model's name.
///
/// When a progress sender is supplied, its consumer dropping aborts the
/// cascade, including any in-flight backend call, so an abandoned request
/// never spends on further candidates.
pub async fn run_cascade<T, F>(
    backends: &[Arc<dyn ModelBackend>],
    request: &CompletionRequest,
    progress: Option<&ProgressSender>,
    mut accept: F,
) -> Result<(T, String), GenerationExhausted>
where
    F: FnMut(&str) -> Result<T, String>,
{
    let mut last_error = String::from("no model candidates configured");
    let mut attempts = 0;

    for backend in backends {
        if progress.is_some_and(ProgressSender::is_cancelled) {
            last_error = "request cancelled by the caller".to_string();
            break;
        }
        attempts += 1;
        counter!("generate_cascade_attempts_total").increment(1);

        let call = tokio::time::timeout(BACKEND_TIMEOUT, backend.complete(request));
        let outcome = match progress {
            Some(p) => tokio::select! {
                out = call => Some(out),
                () = p.cancelled() => None,
            },
            None => Some(call.await),
        };
        let Some(result) = outcome else {
            tracing::debug!(model = backend.name(), "consumer gone; abandoning in-flight backend call");
            last_error = "request cancelled by the caller".to_string();
            break;
        };

        let raw = match result {
            Ok(Ok(raw)) => raw,
            Ok(Err(err)) => {
                tracing::warn!(model = backend.name(), error = %err, "backend failed; trying next candidate");
                last_error = format!("{}: {err}", backend.name());
                continue;
            }
            Err(_) => {
                tracing::warn!(model = backend.name(), "backend exceeded {BACKEND_TIMEOUT:?}; trying next candidate");
                last_error = format!("{}: timed out", backend.name());
                continue;
            }
        };

        match accept(&raw) {
            Ok(value) => {
                return Ok((value, backend.name().to_string()));
            }
            Err(reason) => {
                tracing::warn!(model = backend.name(), %reason, "backend output rejected; trying next candidate");
                counter!("generate_validation_rejects_total").increment(1);
                last_error = format!("{}: {reason}", backend.name());
            }
        }
    }

    counter!("generate_cascade_exhausted_total").increment(1);
    Err(GenerationExhausted {
        attempts,
        last_error,
    })
}

/// Models habitually wrap JSON in Markdown fences; strip them before parsing.
pub(crate) fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

pub struct RecommendationGenerator {
    backends: Vec<Arc<dyn ModelBackend>>,
}

impl RecommendationGenerator {
    pub fn new(backends: Vec<Arc<dyn ModelBackend>>) -> Self {
        Self { backends }
    }

    /// One backend handle per configured model candidate, in cascade order.
    pub fn from_config(config: &AppConfig) -> Self {
        let api_key = config.openai_api_key.clone().unwrap_or_default();
        let backends = config
            .model_candidates
            .iter()
            .map(|model| {
                Arc::new(OpenAiChatBackend::new(api_key.clone(), model.clone()))
                    as Arc<dyn ModelBackend>
            })
            .collect();
        Self::new(backends)
    }

    pub fn backends(&self) -> &[Arc<dyn ModelBackend>] {
        &self.backends
    }

    /// Turn a Context into a ranked event list. Emits the `generating` stage;
    /// terminal stages belong to the caller, which owns response assembly.
    pub async fn generate(
        &self,
        context: &Context,
        max_events: usize,
        progress: &ProgressSender,
    ) -> Result<(Vec<Event>, String), GenerationExhausted> {
        progress.send(Stage::Generating, "Asking the model for suggestions");

        let request = build_recommendation_request(context, max_events);
        let (mut events, model_used) =
            run_cascade(&self.backends, &request, Some(progress), parse_event_list).await?;
        events.truncate(max_events);
        Ok((events, model_used))
    }
}

/// Parse and validate one backend response as a ranked event list.
fn parse_event_list(raw: &str) -> Result<Vec<Event>, String> {
    let list: EventList = serde_json::from_str(strip_code_fences(raw))
        .map_err(|e| format!("not a valid EventList: {e}"))?;
    list.into_ranked_events().map_err(|e| e.to_string())
}

/// Deterministic prompt for the structured recommendation flow. Runs cold
/// (temperature 0.2); the creative headline flow has its own request.
fn build_recommendation_request(context: &Context, max_events: usize) -> CompletionRequest {
    let context_json = serde_json::to_string_pretty(context)
        .unwrap_or_else(|_| format!("{context:?}"));
    CompletionRequest {
        system: concat!(
            "You transform contextual information into structured event recommendations ",
            "that reflect the caller's preferences. Reply with a JSON object of the form ",
            r#"{"events": [{"name", "description", "emoji", "location", "event_score", "link"}]}. "#,
            "`location` is a [latitude, longitude] pair of numbers. ",
            "`emoji` must contain exactly ONE emoji character that best represents the event. ",
            "`event_score` is 0-10: 9-10 for strong alignment with the stated preferences, ",
            "6-8 for partial alignment, 0-5 for weak or fallback options. ",
            "Do not return events that conflict with the stated preferences unless no aligned options exist."
        )
        .to_string(),
        user: format!(
            "Context:\n{context_json}\n\nPrioritize the user's stated preferences when choosing events. \
             Return up to {max_events} high-quality, preference-aligned events, best first. \
             Remember: use exactly one emoji per event."
        ),
        temperature: 0.2,
        max_tokens: 2048,
        json_output: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_fences_are_stripped() {
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```\n{}\n```"), "{}");
        assert_eq!(strip_code_fences("  {\"a\":1} "), "{\"a\":1}");
    }

    #[test]
    fn parse_rejects_score_out_of_range() {
        let raw = r#"{"events": [{"name": "X", "emoji": "🎭", "location": [1.0, 2.0], "event_score": 11.0}]}"#;
        let err = parse_event_list(raw).unwrap_err();
        assert!(err.contains("outside"), "unexpected error: {err}");
    }

    #[test]
    fn parse_sorts_descending_by_score() {
        let raw = r#"{"events": [
            {"name": "Low", "emoji": "🎭", "location": [1.0, 2.0], "event_score": 3.0},
            {"name": "High", "emoji": "🎵", "location": {"x": 1.0, "y": 2.0}, "event_score": 9.0}
        ]}"#;
        let events = parse_event_list(raw).unwrap();
        assert_eq!(events[0].name, "High");
        assert_eq!(events[1].name, "Low");
    }
}
