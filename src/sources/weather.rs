//! Weather adapter: geocodes the configured city, then fetches current
//! conditions from OpenWeatherMap. Both hops share the adapter's time budget.

use async_trait::async_trait;
use metrics::counter;
use serde::{Deserialize, Serialize};

use super::{status_error, SourceError};

/// Normalized weather fragment. Every field is independently optional; the
/// upstream payload omits whole sections when it has nothing to say.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WeatherSnapshot {
    pub description: Option<String>,
    pub temperature: Option<f64>,
    pub feels_like: Option<f64>,
    pub humidity: Option<f64>,
    pub wind_speed: Option<f64>,
    pub cloudiness: Option<f64>,
}

#[async_trait]
pub trait WeatherSource: Send + Sync {
    async fn fetch(&self) -> Result<WeatherSnapshot, SourceError>;
    fn name(&self) -> &'static str;
}

pub struct OpenWeatherMap {
    http: reqwest::Client,
    api_key: String,
    city: String,
    country_code: String,
    geo_url: String,
    weather_url: String,
}

#[derive(Debug, Deserialize)]
struct GeoHit {
    lat: f64,
    lon: f64,
}

#[derive(Debug, Deserialize)]
struct WeatherBody {
    #[serde(default)]
    cod: Option<serde_json::Value>,
    #[serde(default)]
    weather: Vec<WeatherDesc>,
    #[serde(default)]
    main: Option<MainSection>,
    #[serde(default)]
    wind: Option<WindSection>,
    #[serde(default)]
    clouds: Option<CloudsSection>,
}

#[derive(Debug, Deserialize)]
struct WeatherDesc {
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MainSection {
    temp: Option<f64>,
    feels_like: Option<f64>,
    humidity: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct WindSection {
    speed: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct CloudsSection {
    all: Option<f64>,
}

impl OpenWeatherMap {
    pub fn new(api_key: String, city: String, country_code: String) -> Self {
        Self {
            http: super::source_http_client(),
            api_key,
            city,
            country_code,
            geo_url: "https://api.openweathermap.org/geo/1.0/direct".to_string(),
            weather_url: "https://api.openweathermap.org/data/2.5/weather".to_string(),
        }
    }

    async fn geocode(&self) -> Result<GeoHit, SourceError> {
        let resp = self
            .http
            .get(&self.geo_url)
            .query(&[
                ("q", format!("{},{}", self.city, self.country_code)),
                ("limit", "1".to_string()),
                ("appid", self.api_key.clone()),
            ])
            .send()
            .await
            .map_err(SourceError::from_reqwest)?;
        if !resp.status().is_success() {
            return Err(status_error(resp.status()));
        }
        let hits: Vec<GeoHit> = resp.json().await.map_err(SourceError::from_reqwest)?;
        hits.into_iter().next().ok_or_else(|| {
            SourceError::InvalidResponse(format!(
                "no coordinates returned for '{},{}'",
                self.city, self.country_code
            ))
        })
    }
}

#[async_trait]
impl WeatherSource for OpenWeatherMap {
    async fn fetch(&self) -> Result<WeatherSnapshot, SourceError> {
        if self.api_key.is_empty() {
            return Err(SourceError::Unavailable(
                "OPENWEATHERMAP_API_KEY is not configured".to_string(),
            ));
        }

        let coords = self.geocode().await?;

        let resp = self
            .http
            .get(&self.weather_url)
            .query(&[
                ("lat", coords.lat.to_string()),
                ("lon", coords.lon.to_string()),
                ("units", "metric".to_string()),
                ("appid", self.api_key.clone()),
            ])
            .send()
            .await
            .map_err(SourceError::from_reqwest)?;
        if !resp.status().is_success() {
            return Err(status_error(resp.status()));
        }
        let body: WeatherBody = resp.json().await.map_err(SourceError::from_reqwest)?;

        // The weather API reports errors via `cod` in the body, not the status.
        if let Some(cod) = &body.cod {
            let ok = matches!(cod, serde_json::Value::Number(n) if n.as_i64() == Some(200))
                || matches!(cod, serde_json::Value::String(s) if s == "200");
            if !ok {
                counter!("sources_invalid_payload_total", "source" => "weather").increment(1);
                return Err(SourceError::InvalidResponse(format!(
                    "weather API error cod={cod}"
                )));
            }
        }

        Ok(WeatherSnapshot {
            description: body.weather.into_iter().find_map(|w| w.description),
            temperature: body.main.as_ref().and_then(|m| m.temp),
            feels_like: body.main.as_ref().and_then(|m| m.feels_like),
            humidity: body.main.as_ref().and_then(|m| m.humidity),
            wind_speed: body.wind.as_ref().and_then(|w| w.speed),
            cloudiness: body.clouds.as_ref().and_then(|c| c.all),
        })
    }

    fn name(&self) -> &'static str {
        "weather"
    }
}
