//! Event schema shared by the pipeline, the HTTP surface, and the client.
//!
//! External payloads (model output, server responses) are decoded into these
//! types at the boundary and validated before anything downstream sees them.

use serde::de::{self, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::ser::SerializeTuple;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Canonical coordinates: an ordered `(latitude, longitude)` pair.
///
/// Two wire encodings are accepted: a bare two-element array, and a legacy
/// `{"x": lat, "y": lon}` object. Both normalize here; nothing past the
/// boundary ever sees the object form. Serializes as the pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Location {
    pub lat: f64,
    pub lon: f64,
}

impl Location {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    pub fn is_finite(&self) -> bool {
        self.lat.is_finite() && self.lon.is_finite()
    }
}

impl Serialize for Location {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut tup = serializer.serialize_tuple(2)?;
        tup.serialize_element(&self.lat)?;
        tup.serialize_element(&self.lon)?;
        tup.end()
    }
}

impl<'de> Deserialize<'de> for Location {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct LocationVisitor;

        impl<'de> Visitor<'de> for LocationVisitor {
            type Value = Location;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a [lat, lon] pair or an {x, y} object")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Location, A::Error> {
                let lat: f64 = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(0, &self))?;
                let lon: f64 = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(1, &self))?;
                if seq.next_element::<f64>()?.is_some() {
                    return Err(de::Error::invalid_length(3, &self));
                }
                Ok(Location { lat, lon })
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Location, A::Error> {
                let mut x: Option<f64> = None;
                let mut y: Option<f64> = None;
                while let Some(key) = map.next_key::<String>()? {
                    match key.as_str() {
                        "x" => x = Some(map.next_value()?),
                        "y" => y = Some(map.next_value()?),
                        _ => {
                            let _ = map.next_value::<de::IgnoredAny>()?;
                        }
                    }
                }
                let lat = x.ok_or_else(|| de::Error::missing_field("x"))?;
                let lon = y.ok_or_else(|| de::Error::missing_field("y"))?;
                Ok(Location { lat, lon })
            }
        }

        deserializer.deserialize_any(LocationVisitor)
    }
}

/// One suggested activity. Immutable once added to a response list; list
/// order carries rank (descending by `event_score`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub emoji: String,
    pub location: Location,
    pub event_score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum InvalidEvent {
    #[error("event name is empty")]
    EmptyName,
    #[error("event_score {0} outside [0, 10]")]
    ScoreOutOfRange(f64),
    #[error("emoji field has {0} characters, expected 1..=10")]
    BadEmojiLength(usize),
    #[error("emoji field contains markup character {0:?}")]
    MarkupInEmoji(char),
    #[error("location is not a finite coordinate pair")]
    NonFiniteLocation,
}

impl Event {
    /// Structural checks applied to every event coming off a model backend
    /// or out of a server response.
    pub fn validate(&self) -> Result<(), InvalidEvent> {
        if self.name.trim().is_empty() {
            return Err(InvalidEvent::EmptyName);
        }
        if !(0.0..=10.0).contains(&self.event_score) || !self.event_score.is_finite() {
            return Err(InvalidEvent::ScoreOutOfRange(self.event_score));
        }
        let emoji_chars = self.emoji.chars().count();
        if !(1..=10).contains(&emoji_chars) {
            return Err(InvalidEvent::BadEmojiLength(emoji_chars));
        }
        if let Some(bad) = self.emoji.chars().find(|c| matches!(c, '<' | '>' | '&')) {
            return Err(InvalidEvent::MarkupInEmoji(bad));
        }
        if !self.location.is_finite() {
            return Err(InvalidEvent::NonFiniteLocation);
        }
        Ok(())
    }
}

/// Structured-output envelope the model backends are asked to produce.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventList {
    pub events: Vec<Event>,
}

impl EventList {
    /// Validate every member and re-sort descending by score. Returns the
    /// first structural defect, which callers treat as a backend failure.
    pub fn into_ranked_events(self) -> Result<Vec<Event>, InvalidEvent> {
        for event in &self.events {
            event.validate()?;
        }
        let mut events = self.events;
        events.sort_by(|a, b| {
            b.event_score
                .partial_cmp(&a.event_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(events)
    }
}

fn default_number_events() -> u32 {
    8
}

/// Body of `POST /events/recommendations` (unary and streaming).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationsRequest {
    #[serde(default = "default_number_events")]
    pub number_events: u32,
    #[serde(default)]
    pub response_preferences: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationsResponse {
    pub events: Vec<Event>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn location_decodes_pair_form() {
        let loc: Location = serde_json::from_str("[55.95, -3.19]").unwrap();
        assert_eq!(loc, Location::new(55.95, -3.19));
    }

    #[test]
    fn location_decodes_xy_object_form() {
        let loc: Location = serde_json::from_str(r#"{"x": 55.95, "y": -3.19}"#).unwrap();
        assert_eq!(loc, Location::new(55.95, -3.19));
    }

    #[test]
    fn location_serializes_as_pair() {
        let json = serde_json::to_string(&Location::new(1.0, 2.0)).unwrap();
        assert_eq!(json, "[1.0,2.0]");
    }

    #[test]
    fn location_rejects_three_element_array() {
        assert!(serde_json::from_str::<Location>("[1.0, 2.0, 3.0]").is_err());
    }

    fn sample_event() -> Event {
        Event {
            name: "Calton Hill Sketch Walk".into(),
            description: "Urban sketching meetup.".into(),
            emoji: "\u{270f}\u{fe0f}".into(),
            location: Location::new(55.955, -3.182),
            event_score: 8.0,
            link: None,
        }
    }

    #[test]
    fn validate_accepts_well_formed_event() {
        assert_eq!(sample_event().validate(), Ok(()));
    }

    #[test]
    fn validate_rejects_empty_name() {
        let mut ev = sample_event();
        ev.name = "  ".into();
        assert_eq!(ev.validate(), Err(InvalidEvent::EmptyName));
    }

    #[test]
    fn validate_rejects_out_of_range_score() {
        let mut ev = sample_event();
        ev.event_score = 10.5;
        assert_eq!(ev.validate(), Err(InvalidEvent::ScoreOutOfRange(10.5)));
    }

    #[test]
    fn validate_rejects_markup_in_emoji() {
        let mut ev = sample_event();
        ev.emoji = "<b>".into();
        assert_eq!(ev.validate(), Err(InvalidEvent::MarkupInEmoji('<')));
    }

    #[test]
    fn ranked_events_sort_descending_by_score() {
        let mut a = sample_event();
        a.event_score = 6.0;
        let mut b = sample_event();
        b.event_score = 9.5;
        let list = EventList {
            events: vec![a, b.clone()],
        };
        let ranked = list.into_ranked_events().unwrap();
        assert_eq!(ranked[0], b);
        assert!(ranked[0].event_score >= ranked[1].event_score);
    }
}
