//! Bundled fixture events, served verbatim in mock mode.

use once_cell::sync::Lazy;

use crate::events::{Event, Location};

static MOCK_EVENTS: Lazy<Vec<Event>> = Lazy::new(|| {
    vec![
        Event {
            name: "Sunrise Arthurs Seat Hike".into(),
            description: "Catch the sunrise over Edinburgh with a guided early morning climb."
                .into(),
            emoji: "\u{1f304}".into(),
            location: Location::new(55.9441, -3.1618),
            event_score: 9.2,
            link: Some(
                "https://www.visitscotland.com/info/events/edinburgh-sunrise-hike-p123456".into(),
            ),
        },
        Event {
            name: "Leith Street Food Market".into(),
            description: "Sample dishes from 20+ local vendors, live music, and craft stalls."
                .into(),
            emoji: "\u{1f35c}".into(),
            location: Location::new(55.9762, -3.1699),
            event_score: 8.7,
            link: Some("https://edinburghmarkets.com/leith-street-food".into()),
        },
        Event {
            name: "Meadows Community Yoga".into(),
            description: "Free outdoor yoga session suitable for all levels - bring a mat!".into(),
            emoji: "\u{1f9d8}".into(),
            location: Location::new(55.9408, -3.1928),
            event_score: 8.1,
            link: Some("https://facebook.com/events/edinburgh-meadows-yoga".into()),
        },
        Event {
            name: "Portobello Beach Cleanup".into(),
            description: "Join local volunteers to help clean the shoreline followed by coffee."
                .into(),
            emoji: "\u{1f9f9}".into(),
            location: Location::new(55.9533, -3.1136),
            event_score: 8.9,
            link: Some("https://keepedinburghbeautiful.org/portobello-cleanup".into()),
        },
        Event {
            name: "Stockbridge Farmers Market".into(),
            description: "Weekly market with artisan produce, fresh bakes, and local crafts."
                .into(),
            emoji: "\u{1f9fa}".into(),
            location: Location::new(55.9586, -3.2095),
            event_score: 8.4,
            link: Some("https://stockbridgefarmersmarket.co.uk".into()),
        },
        Event {
            name: "Water of Leith Cycle".into(),
            description: "Guided family-friendly cycle along Water of Leith walkway.".into(),
            emoji: "\u{1f6b4}".into(),
            location: Location::new(55.9421, -3.2755),
            event_score: 7.8,
            link: None,
        },
        Event {
            name: "Calton Hill Sketch Walk".into(),
            description: "Urban sketching meetup - bring pencils and capture the skyline.".into(),
            emoji: "\u{270f}\u{fe0f}".into(),
            location: Location::new(55.9552, -3.1822),
            event_score: 8.0,
            link: None,
        },
        Event {
            name: "Grassmarket Storytelling Night".into(),
            description: "Local storytellers share Scottish folklore by candlelight.".into(),
            emoji: "\u{1f4d6}".into(),
            location: Location::new(55.9473, -3.1955),
            event_score: 8.6,
            link: None,
        },
    ]
});

/// Return the fixture events up to `limit`, in their bundled order.
pub fn get_mock_events(limit: usize) -> Vec<Event> {
    MOCK_EVENTS.iter().take(limit).cloned().collect()
}

/// Mock-mode preference filter: keep fixtures whose name or description
/// mention the normalized preference text, falling back to the unfiltered
/// set when nothing matches.
pub fn filter_by_preferences(events: Vec<Event>, preferences: &str) -> Vec<Event> {
    let needle = preferences.trim().to_lowercase();
    if needle.is_empty() {
        return events;
    }
    let filtered: Vec<Event> = events
        .iter()
        .filter(|ev| {
            ev.name.to_lowercase().contains(&needle)
                || ev.description.to_lowercase().contains(&needle)
        })
        .cloned()
        .collect();
    if filtered.is_empty() {
        events
    } else {
        filtered
    }
}
