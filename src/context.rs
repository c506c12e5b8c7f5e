//! Context aggregation: fan out to every source adapter concurrently, fold
//! whatever came back into one immutable [`Context`] snapshot.
//!
//! The aggregator itself never fails. A source that errors or times out
//! just leaves its fragment empty; partial results are always usable.

use std::sync::Arc;

use chrono::{Datelike, NaiveDate};
use metrics::counter;
use serde::Serialize;

use crate::config::{AppConfig, SOURCE_TIMEOUT};
use crate::progress::{ProgressSender, Stage};
use crate::sources::{
    festivals::FestivalsApi, listings::ListingsFeed, weather::OpenWeatherMap, FestivalItem,
    FestivalsSource, ListingItem, ListingsSource, SourceError, WeatherSnapshot, WeatherSource,
};

/// Aggregated snapshot used as the sole input to generation. Built once,
/// never mutated afterwards.
#[derive(Debug, Clone, Serialize)]
pub struct Context {
    pub requested_date: NaiveDate,
    pub city: String,
    pub country_code: String,
    /// Trimmed, lowercased preference text; empty means "no preference".
    pub preferences: String,
    pub seasonal_hint: &'static str,
    pub weather: Option<WeatherSnapshot>,
    pub festivals: Vec<FestivalItem>,
    pub listings: Vec<ListingItem>,
}

/// Pure derivation from the month of the requested date.
pub fn seasonal_hint(date: NaiveDate) -> &'static str {
    match date.month() {
        12 | 1 | 2 => "winter",
        3..=5 => "spring",
        6..=8 => "summer",
        _ => "autumn",
    }
}

pub fn normalize_preferences(raw: Option<&str>) -> String {
    raw.unwrap_or_default().trim().to_lowercase()
}

pub struct ContextAggregator {
    weather: Arc<dyn WeatherSource>,
    festivals: Arc<dyn FestivalsSource>,
    listings: Option<Arc<dyn ListingsSource>>,
    city: String,
    country_code: String,
}

impl ContextAggregator {
    pub fn new(
        weather: Arc<dyn WeatherSource>,
        festivals: Arc<dyn FestivalsSource>,
        listings: Option<Arc<dyn ListingsSource>>,
        city: String,
        country_code: String,
    ) -> Self {
        Self {
            weather,
            festivals,
            listings,
            city,
            country_code,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        let weather = Arc::new(OpenWeatherMap::new(
            config.weather_api_key.clone().unwrap_or_default(),
            config.city.clone(),
            config.country_code.clone(),
        ));
        let festivals = Arc::new(FestivalsApi::new(
            config.festivals_api_key.clone().unwrap_or_default(),
            config.festivals_secret_key.clone().unwrap_or_default(),
            config.festivals_default_festival.clone(),
        ));
        let listings: Option<Arc<dyn ListingsSource>> = config
            .listings_feed_url
            .clone()
            .map(|url| Arc::new(ListingsFeed::new(url)) as Arc<dyn ListingsSource>);
        Self::new(
            weather,
            festivals,
            listings,
            config.city.clone(),
            config.country_code.clone(),
        )
    }

    /// Time-bounded weather fetch on its own, used by the headline flow.
    pub async fn weather_snapshot(&self) -> Option<WeatherSnapshot> {
        absorb("weather", bounded(self.weather.fetch()).await)
    }

    /// Gather all fragments concurrently, reporting a stage transition
    /// before and after each adapter call. Every call is bounded by
    /// [`SOURCE_TIMEOUT`], so the fan-in cannot stall on one slow feed.
    pub async fn gather(
        &self,
        preferences: Option<&str>,
        target_date: NaiveDate,
        progress: &ProgressSender,
    ) -> Context {
        let weather_task = async {
            if !progress.send(Stage::FetchingWeather, "Checking the forecast") {
                return None;
            }
            // Consumer dropping mid-fetch aborts the in-flight call.
            let outcome = tokio::select! {
                out = bounded(self.weather.fetch()) => out,
                () = progress.cancelled() => return None,
            };
            let fragment = absorb("weather", outcome);
            progress.send(Stage::WeatherComplete, "Weather ready");
            fragment
        };

        let festivals_task = async {
            if !progress.send(Stage::FetchingFestivals, "Looking up festival listings") {
                return Vec::new();
            }
            let outcome = tokio::select! {
                out = bounded(self.festivals.fetch(target_date)) => out,
                () = progress.cancelled() => return Vec::new(),
            };
            let fragment = absorb("festivals", outcome).unwrap_or_default();
            progress.send(
                Stage::FestivalsComplete,
                format!("Found {} festival events", fragment.len()),
            );
            fragment
        };

        let listings_task = async {
            if !progress.send(Stage::FetchingListings, "Collecting local listings") {
                return Vec::new();
            }
            let fragment = match &self.listings {
                Some(listings) => {
                    let outcome = tokio::select! {
                        out = bounded(listings.fetch()) => out,
                        () = progress.cancelled() => return Vec::new(),
                    };
                    absorb("listings", outcome).unwrap_or_default()
                }
                None => Vec::new(),
            };
            progress.send(
                Stage::ListingsComplete,
                format!("Found {} listings", fragment.len()),
            );
            fragment
        };

        let (weather, festivals, listings) =
            tokio::join!(weather_task, festivals_task, listings_task);

        progress.send(Stage::ContextComplete, "Context assembled");

        Context {
            requested_date: target_date,
            city: self.city.clone(),
            country_code: self.country_code.clone(),
            preferences: normalize_preferences(preferences),
            seasonal_hint: seasonal_hint(target_date),
            weather,
            festivals,
            listings,
        }
    }
}

/// Apply the per-call budget on top of whatever the adapter does internally.
async fn bounded<T>(
    fut: impl std::future::Future<Output = Result<T, SourceError>>,
) -> Result<T, SourceError> {
    match tokio::time::timeout(SOURCE_TIMEOUT, fut).await {
        Ok(result) => result,
        Err(_) => Err(SourceError::Timeout(SOURCE_TIMEOUT)),
    }
}

/// Source failures degrade the Context instead of aborting the request.
fn absorb<T>(source: &'static str, outcome: Result<T, SourceError>) -> Option<T> {
    match outcome {
        Ok(fragment) => Some(fragment),
        Err(err) => {
            tracing::warn!(source, error = %err, "source fetch failed; continuing without it");
            counter!("sources_failed_total", "source" => source).increment(1);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn seasonal_hint_covers_all_quarters() {
        assert_eq!(seasonal_hint(date(2025, 1, 15)), "winter");
        assert_eq!(seasonal_hint(date(2025, 4, 1)), "spring");
        assert_eq!(seasonal_hint(date(2025, 7, 31)), "summer");
        assert_eq!(seasonal_hint(date(2025, 10, 2)), "autumn");
        assert_eq!(seasonal_hint(date(2025, 12, 25)), "winter");
    }

    #[test]
    fn preferences_are_trimmed_and_lowercased() {
        assert_eq!(normalize_preferences(Some("  Outdoor AND Free ")), "outdoor and free");
        assert_eq!(normalize_preferences(None), "");
    }
}
