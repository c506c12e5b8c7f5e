//! Scraped-listings adapter. The scraping itself happens elsewhere; this
//! side only consumes its JSON feed and validates the shape at the boundary.

use async_trait::async_trait;
use metrics::counter;
use serde::{Deserialize, Serialize};

use super::{status_error, SourceError};

/// One scraped listing, normalized for the Context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingItem {
    pub name: String,
    pub venue_location: Option<String>,
    pub start_time: Option<String>,
    pub url: Option<String>,
    pub description: Option<String>,
    /// Which scraper produced the listing, e.g. "eventbrite".
    pub source: String,
}

#[async_trait]
pub trait ListingsSource: Send + Sync {
    async fn fetch(&self) -> Result<Vec<ListingItem>, SourceError>;
    fn name(&self) -> &'static str;
}

pub struct ListingsFeed {
    http: reqwest::Client,
    feed_url: String,
}

#[derive(Debug, Deserialize)]
struct RawListing {
    name: Option<String>,
    #[serde(default)]
    venue_location: Option<String>,
    #[serde(default)]
    start_time: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    source: Option<String>,
}

impl ListingsFeed {
    pub fn new(feed_url: String) -> Self {
        Self {
            http: super::source_http_client(),
            feed_url,
        }
    }
}

fn normalize_item(raw: RawListing) -> Option<ListingItem> {
    let name = raw.name.filter(|n| !n.trim().is_empty())?;
    Some(ListingItem {
        name,
        venue_location: raw.venue_location,
        start_time: raw.start_time,
        url: raw.url,
        description: raw.description,
        source: raw.source.unwrap_or_else(|| "listings".to_string()),
    })
}

#[async_trait]
impl ListingsSource for ListingsFeed {
    async fn fetch(&self) -> Result<Vec<ListingItem>, SourceError> {
        let resp = self
            .http
            .get(&self.feed_url)
            .send()
            .await
            .map_err(SourceError::from_reqwest)?;
        if !resp.status().is_success() {
            return Err(status_error(resp.status()));
        }

        let raw: Vec<RawListing> = resp.json().await.map_err(|e| {
            counter!("sources_invalid_payload_total", "source" => "listings").increment(1);
            SourceError::from_reqwest(e)
        })?;

        Ok(raw.into_iter().filter_map(normalize_item).collect())
    }

    fn name(&self) -> &'static str {
        "listings"
    }
}
