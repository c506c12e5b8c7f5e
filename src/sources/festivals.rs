//! Festival listings adapter. The upstream API wants every request path
//! signed with an HMAC-SHA1 of the query string, appended as `signature=`.

use async_trait::async_trait;
use chrono::NaiveDate;
use hmac::{Hmac, Mac};
use metrics::counter;
use serde::{Deserialize, Serialize};
use sha1::Sha1;

use super::{status_error, SourceError};

const API_BASE_URL: &str = "https://api.edinburghfestivalcity.com";
const EVENTS_ENDPOINT: &str = "/events";
const DEFAULT_LIMIT: u32 = 25;

/// One scheduled festival event, normalized for the Context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FestivalItem {
    pub name: String,
    pub venue: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub category: Option<String>,
}

#[async_trait]
pub trait FestivalsSource: Send + Sync {
    async fn fetch(&self, date: NaiveDate) -> Result<Vec<FestivalItem>, SourceError>;
    fn name(&self) -> &'static str;
}

pub struct FestivalsApi {
    http: reqwest::Client,
    api_key: String,
    secret_key: String,
    festival: Option<String>,
    limit: u32,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct RawFestival {
    title: Option<String>,
    #[serde(default)]
    venue: Option<RawVenue>,
    #[serde(default)]
    performances: Vec<RawPerformance>,
    #[serde(default)]
    genre_tags: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawVenue {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawPerformance {
    start: Option<String>,
    end: Option<String>,
}

impl FestivalsApi {
    pub fn new(api_key: String, secret_key: String, festival: Option<String>) -> Self {
        Self {
            http: super::source_http_client(),
            api_key,
            secret_key,
            festival,
            limit: DEFAULT_LIMIT,
            base_url: API_BASE_URL.to_string(),
        }
    }

    /// `path?query` plus the `signature=` parameter the API verifies.
    fn signed_path(&self, date: NaiveDate) -> Result<String, SourceError> {
        let mut params: Vec<(&str, String)> = Vec::new();
        if let Some(festival) = &self.festival {
            params.push(("festival", festival.clone()));
        }
        params.push(("limit", self.limit.to_string()));
        params.push(("date_from", format!("{date} 00:00:00")));
        params.push(("date_to", format!("{date} 23:59:59")));
        params.push(("key", self.api_key.clone()));

        let url = reqwest::Url::parse_with_params(&format!("{}{EVENTS_ENDPOINT}", self.base_url), &params)
            .map_err(|e| SourceError::Unavailable(format!("bad festivals url: {e}")))?;
        let path_and_query = match url.query() {
            Some(q) => format!("{}?{}", url.path(), q),
            None => url.path().to_string(),
        };

        let mut mac = Hmac::<Sha1>::new_from_slice(self.secret_key.as_bytes())
            .map_err(|e| SourceError::Unavailable(format!("bad festivals secret: {e}")))?;
        mac.update(path_and_query.as_bytes());
        let signature = hex_digest(&mac.finalize().into_bytes());

        Ok(format!("{path_and_query}&signature={signature}"))
    }
}

fn hex_digest(bytes: &[u8]) -> String {
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut acc, b| {
        use std::fmt::Write;
        let _ = write!(acc, "{b:02x}");
        acc
    })
}

fn normalize_item(raw: RawFestival) -> Option<FestivalItem> {
    let name = raw.title.filter(|t| !t.trim().is_empty())?;
    let first_performance = raw.performances.first();
    Some(FestivalItem {
        name,
        venue: raw.venue.and_then(|v| v.name),
        start_time: first_performance.and_then(|p| p.start.clone()),
        end_time: first_performance.and_then(|p| p.end.clone()),
        category: raw.genre_tags.and_then(|tags| {
            tags.split(',')
                .map(|t| t.trim().to_lowercase())
                .find(|t| !t.is_empty())
        }),
    })
}

#[async_trait]
impl FestivalsSource for FestivalsApi {
    async fn fetch(&self, date: NaiveDate) -> Result<Vec<FestivalItem>, SourceError> {
        if self.api_key.is_empty() || self.secret_key.is_empty() {
            return Err(SourceError::Unavailable(
                "FESTIVALS_API_KEY and FESTIVALS_SECRET_KEY must be set".to_string(),
            ));
        }

        let url = format!("{}{}", self.base_url, self.signed_path(date)?);
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(SourceError::from_reqwest)?;
        if !resp.status().is_success() {
            return Err(status_error(resp.status()));
        }

        // The API returns a bare JSON array; anything else is unusable.
        let raw: Vec<RawFestival> = resp.json().await.map_err(|e| {
            counter!("sources_invalid_payload_total", "source" => "festivals").increment(1);
            SourceError::from_reqwest(e)
        })?;

        // Items without a title are skipped, never fatal.
        Ok(raw.into_iter().filter_map(normalize_item).collect())
    }

    fn name(&self) -> &'static str {
        "festivals"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signed_path_appends_hmac_signature() {
        let api = FestivalsApi::new("key123".into(), "secret".into(), Some("fringe".into()));
        let date = NaiveDate::from_ymd_opt(2025, 8, 15).unwrap();
        let path = api.signed_path(date).unwrap();

        assert!(path.starts_with("/events?festival=fringe&limit=25&date_from=2025-08-15"));
        let (query, signature) = path.rsplit_once("&signature=").unwrap();

        let mut mac = Hmac::<Sha1>::new_from_slice(b"secret").unwrap();
        mac.update(query.as_bytes());
        assert_eq!(signature, hex_digest(&mac.finalize().into_bytes()));
    }

    #[test]
    fn normalize_skips_untitled_items_and_picks_first_performance() {
        let raw: Vec<RawFestival> = serde_json::from_str(
            r#"[
                {"title": "Late Night Cabaret",
                 "venue": {"name": "The Caves"},
                 "performances": [{"start": "2025-08-15 22:00:00", "end": "2025-08-15 23:30:00"},
                                  {"start": "2025-08-16 22:00:00", "end": null}],
                 "genre_tags": "Cabaret, Comedy"},
                {"title": null, "venue": null}
            ]"#,
        )
        .unwrap();

        let items: Vec<FestivalItem> = raw.into_iter().filter_map(normalize_item).collect();
        assert_eq!(items.len(), 1);
        let item = &items[0];
        assert_eq!(item.name, "Late Night Cabaret");
        assert_eq!(item.venue.as_deref(), Some("The Caves"));
        assert_eq!(item.start_time.as_deref(), Some("2025-08-15 22:00:00"));
        assert_eq!(item.category.as_deref(), Some("cabaret"));
    }
}
