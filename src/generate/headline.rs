//! Headline flow: one short, upbeat sentence for the day. Reuses the
//! cascade-and-validate pattern at a higher temperature, and never surfaces
//! a hard error: exhaustion falls back to a fixed sentence with a
//! diagnostic note.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{run_cascade, CompletionRequest, ModelBackend};
use crate::sources::WeatherSnapshot;

/// Served whenever every candidate fails; always a valid 3-7 word sentence.
pub const DEFAULT_HEADLINE: &str = "Make the most of your day!";

const MIN_WORDS: usize = 3;
const MAX_WORDS: usize = 7;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeadlineMetadata {
    pub model: Option<String>,
    #[serde(rename = "generatedAt")]
    pub generated_at: DateTime<Utc>,
    pub weather: Option<WeatherSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeadlineResponse {
    pub sentence: String,
    pub metadata: HeadlineMetadata,
}

/// Strip wrapping quotes and collapse internal whitespace.
pub fn normalize_headline(raw: &str) -> String {
    let quotes: &[char] = &['"', '\'', '`', '\u{201c}', '\u{201d}', '\u{2018}', '\u{2019}'];
    let trimmed = raw.trim().trim_matches(quotes).trim();
    trimmed.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn accept_headline(raw: &str) -> Result<String, String> {
    let sentence = normalize_headline(raw);
    let words = sentence.split_whitespace().count();
    if !(MIN_WORDS..=MAX_WORDS).contains(&words) {
        return Err(format!(
            "sentence has {words} words, expected {MIN_WORDS}..={MAX_WORDS}"
        ));
    }
    Ok(sentence)
}

fn build_headline_request(
    city: &str,
    seasonal_hint: &str,
    weather: Option<&WeatherSnapshot>,
) -> CompletionRequest {
    let conditions = weather
        .map(|w| {
            format!(
                "description={}, temperature={}C, wind={} m/s",
                w.description.as_deref().unwrap_or("unknown"),
                w.temperature.map_or("unknown".into(), |t| t.to_string()),
                w.wind_speed.map_or("unknown".into(), |s| s.to_string()),
            )
        })
        .unwrap_or_else(|| "unknown".to_string());

    CompletionRequest {
        system: format!(
            "You write ONE short upbeat sentence of {MIN_WORDS} to {MAX_WORDS} words \
             suggesting how to enjoy the day in {city}. Plain text, no quotes, no emoji."
        ),
        user: format!("Season: {seasonal_hint}. Current weather: {conditions}."),
        temperature: 0.9,
        max_tokens: 40,
        json_output: false,
    }
}

/// Generate the headline, falling back to [`DEFAULT_HEADLINE`] on cascade
/// exhaustion. Infallible by design; failures only show up in `notes`.
pub async fn generate_headline(
    backends: &[Arc<dyn ModelBackend>],
    city: &str,
    seasonal_hint: &str,
    weather: Option<WeatherSnapshot>,
) -> HeadlineResponse {
    let request = build_headline_request(city, seasonal_hint, weather.as_ref());

    match run_cascade(backends, &request, None, accept_headline).await {
        Ok((sentence, model)) => HeadlineResponse {
            sentence,
            metadata: HeadlineMetadata {
                model: Some(model),
                generated_at: Utc::now(),
                weather,
                notes: None,
            },
        },
        Err(err) => {
            tracing::warn!(error = %err, "headline cascade exhausted; serving default sentence");
            HeadlineResponse {
                sentence: DEFAULT_HEADLINE.to_string(),
                metadata: HeadlineMetadata {
                    model: None,
                    generated_at: Utc::now(),
                    weather,
                    notes: Some(err.to_string()),
                },
            }
        }
    }
}
