// src/config.rs
use std::env;
use std::time::Duration;

/// Per-adapter network budget. Keeps the aggregator's fan-in from stalling
/// on one slow feed.
pub const SOURCE_TIMEOUT: Duration = Duration::from_secs(10);
/// Budget for a single model-backend call.
pub const BACKEND_TIMEOUT: Duration = Duration::from_secs(30);

const DEFAULT_MODEL: &str = "gpt-4.1-mini";
const DEFAULT_FALLBACKS: [&str; 3] = ["gpt-4.1", "gpt-4o-mini", "gpt-4o"];

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// `MOCK=1`: no network calls, fixture events only.
    pub mock_mode: bool,
    pub city: String,
    pub country_code: String,
    /// Ordered model cascade, primary first, deduplicated.
    pub model_candidates: Vec<String>,
    pub openai_api_key: Option<String>,
    pub weather_api_key: Option<String>,
    pub festivals_api_key: Option<String>,
    pub festivals_secret_key: Option<String>,
    pub festivals_default_festival: Option<String>,
    pub listings_feed_url: Option<String>,
    pub bind_addr: String,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let model_candidates = build_model_candidates(
            env::var("OPENAI_MODEL").ok().as_deref(),
            env::var("OPENAI_MODEL_FALLBACKS").ok().as_deref(),
        );
        if model_candidates.is_empty() {
            anyhow::bail!("no model candidates configured; set OPENAI_MODEL or OPENAI_MODEL_FALLBACKS");
        }

        Ok(Self {
            mock_mode: env::var("MOCK").map(|v| v == "1").unwrap_or(false),
            city: env_or("DEFAULT_CITY", "Edinburgh"),
            country_code: env_or("DEFAULT_COUNTRY_CODE", "GB"),
            model_candidates,
            openai_api_key: non_empty_env("OPENAI_API_KEY"),
            weather_api_key: non_empty_env("OPENWEATHERMAP_API_KEY"),
            festivals_api_key: non_empty_env("FESTIVALS_API_KEY"),
            festivals_secret_key: non_empty_env("FESTIVALS_SECRET_KEY"),
            festivals_default_festival: non_empty_env("FESTIVALS_DEFAULT_FESTIVAL"),
            listings_feed_url: non_empty_env("LISTINGS_FEED_URL"),
            bind_addr: env_or("BIND_ADDR", "0.0.0.0:8000"),
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Ordered candidate list: configured primary (or the default model), then
/// configured fallbacks (or the default fallbacks), duplicates removed
/// while preserving first occurrence.
pub fn build_model_candidates(primary: Option<&str>, fallbacks: Option<&str>) -> Vec<String> {
    let mut models: Vec<String> = Vec::new();
    match primary {
        Some(raw) if !raw.trim().is_empty() => models.extend(split_models(raw)),
        _ => models.push(DEFAULT_MODEL.to_string()),
    }
    match fallbacks {
        Some(raw) if !raw.trim().is_empty() => models.extend(split_models(raw)),
        _ => models.extend(DEFAULT_FALLBACKS.iter().map(|m| m.to_string())),
    }

    let mut deduped = Vec::with_capacity(models.len());
    for model in models {
        if !deduped.contains(&model) {
            deduped.push(model);
        }
    }
    deduped
}

/// Split a comma- or whitespace-separated list of model names.
fn split_models(raw: &str) -> Vec<String> {
    raw.replace(',', " ")
        .split_whitespace()
        .map(|chunk| chunk.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_config_env() {
        for key in [
            "MOCK",
            "DEFAULT_CITY",
            "DEFAULT_COUNTRY_CODE",
            "OPENAI_MODEL",
            "OPENAI_MODEL_FALLBACKS",
            "OPENAI_API_KEY",
            "OPENWEATHERMAP_API_KEY",
            "FESTIVALS_API_KEY",
            "FESTIVALS_SECRET_KEY",
            "FESTIVALS_DEFAULT_FESTIVAL",
            "LISTINGS_FEED_URL",
            "BIND_ADDR",
        ] {
            env::remove_var(key);
        }
    }

    #[test]
    #[serial]
    fn from_env_defaults() {
        clear_config_env();
        let config = AppConfig::from_env().unwrap();
        assert!(!config.mock_mode);
        assert_eq!(config.city, "Edinburgh");
        assert_eq!(config.country_code, "GB");
        assert_eq!(config.bind_addr, "0.0.0.0:8000");
        assert_eq!(config.model_candidates[0], "gpt-4.1-mini");
        assert!(config.openai_api_key.is_none());
    }

    #[test]
    #[serial]
    fn from_env_reads_overrides() {
        clear_config_env();
        env::set_var("MOCK", "1");
        env::set_var("DEFAULT_CITY", "Glasgow");
        env::set_var("OPENAI_MODEL", "custom-model");
        let config = AppConfig::from_env().unwrap();
        assert!(config.mock_mode);
        assert_eq!(config.city, "Glasgow");
        assert_eq!(config.model_candidates[0], "custom-model");
        clear_config_env();
    }

    #[test]
    fn defaults_when_nothing_configured() {
        let models = build_model_candidates(None, None);
        assert_eq!(models, vec!["gpt-4.1-mini", "gpt-4.1", "gpt-4o-mini", "gpt-4o"]);
    }

    #[test]
    fn primary_override_keeps_default_fallbacks() {
        let models = build_model_candidates(Some("custom-model"), None);
        assert_eq!(models[0], "custom-model");
        assert!(models.contains(&"gpt-4o".to_string()));
    }

    #[test]
    fn comma_and_whitespace_lists_are_split_and_deduped() {
        let models = build_model_candidates(Some("a, b"), Some("b c  a"));
        assert_eq!(models, vec!["a", "b", "c"]);
    }
}
