//! Cascade behavior of the recommendation generator, observed through
//! scripted backend doubles that record call order.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::NaiveDate;
use serde_json::json;

use whatson::context::Context;
use whatson::generate::{
    BackendError, CompletionRequest, ModelBackend, RecommendationGenerator,
};
use whatson::progress::ProgressSender;

struct ScriptedBackend {
    name: &'static str,
    /// `None` simulates a backend fault; `Some` is returned verbatim.
    output: Option<String>,
    log: Arc<Mutex<Vec<&'static str>>>,
}

#[async_trait::async_trait]
impl ModelBackend for ScriptedBackend {
    fn name(&self) -> &str {
        self.name
    }

    async fn complete(&self, _request: &CompletionRequest) -> Result<String, BackendError> {
        self.log.lock().unwrap().push(self.name);
        match &self.output {
            Some(raw) => Ok(raw.clone()),
            None => Err(BackendError::Unavailable("scripted failure".into())),
        }
    }
}

fn backend(
    name: &'static str,
    output: Option<String>,
    log: &Arc<Mutex<Vec<&'static str>>>,
) -> Arc<dyn ModelBackend> {
    Arc::new(ScriptedBackend {
        name,
        output,
        log: Arc::clone(log),
    })
}

/// Records the call, then stalls before failing, so a test can observe
/// what happens to the cascade while a backend call is in flight.
struct SlowBackend {
    name: &'static str,
    delay: Duration,
    log: Arc<Mutex<Vec<&'static str>>>,
}

#[async_trait::async_trait]
impl ModelBackend for SlowBackend {
    fn name(&self) -> &str {
        self.name
    }

    async fn complete(&self, _request: &CompletionRequest) -> Result<String, BackendError> {
        self.log.lock().unwrap().push(self.name);
        tokio::time::sleep(self.delay).await;
        Err(BackendError::Unavailable("scripted failure".into()))
    }
}

/// Five well-formed fixture events with deliberately unsorted scores.
fn five_event_payload() -> String {
    json!({
        "events": [
            {"name": "Canal Walk", "description": "Towpath stroll", "emoji": "🚶",
             "location": [55.94, -3.22], "event_score": 7.0},
            {"name": "Open-Air Ceilidh", "description": "Free dancing on the Meadows", "emoji": "💃",
             "location": [55.94, -3.19], "event_score": 9.5},
            {"name": "Botanics Picnic", "description": "Free gardens, bring a blanket", "emoji": "🧺",
             "location": {"x": 55.965, "y": -3.21}, "event_score": 8.2},
            {"name": "Harbour Dip", "description": "Cold water swim", "emoji": "🏊",
             "location": [55.98, -3.17], "event_score": 6.1},
            {"name": "Hill Race", "description": "Informal fell run", "emoji": "🏃",
             "location": [55.944, -3.16], "event_score": 8.9}
        ]
    })
    .to_string()
}

fn test_context() -> Context {
    Context {
        requested_date: NaiveDate::from_ymd_opt(2025, 10, 2).unwrap(),
        city: "Edinburgh".into(),
        country_code: "GB".into(),
        preferences: "outdoor and free".into(),
        seasonal_hint: "autumn",
        weather: None,
        festivals: Vec::new(),
        listings: Vec::new(),
    }
}

#[tokio::test]
async fn cascade_attempts_candidates_in_order_until_one_validates() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let generator = RecommendationGenerator::new(vec![
        backend("first", None, &log),
        backend("second", Some("this is not json".into()), &log),
        backend("third", Some(five_event_payload()), &log),
    ]);

    let (progress, _rx) = ProgressSender::channel();
    let (events, model_used) = generator
        .generate(&test_context(), 3, &progress)
        .await
        .expect("third candidate should succeed");

    assert_eq!(*log.lock().unwrap(), vec!["first", "second", "third"]);
    assert_eq!(model_used, "third");

    // Exactly three events, all in range, sorted descending.
    assert_eq!(events.len(), 3);
    assert_eq!(events[0].name, "Open-Air Ceilidh");
    for pair in events.windows(2) {
        assert!(pair[0].event_score >= pair[1].event_score);
    }
    for event in &events {
        assert!((0.0..=10.0).contains(&event.event_score));
        assert!(!event.name.is_empty());
    }
}

#[tokio::test]
async fn first_valid_candidate_short_circuits_the_cascade() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let generator = RecommendationGenerator::new(vec![
        backend("first", Some(five_event_payload()), &log),
        backend("second", Some(five_event_payload()), &log),
    ]);

    let (progress, _rx) = ProgressSender::channel();
    let (_, model_used) = generator
        .generate(&test_context(), 5, &progress)
        .await
        .unwrap();

    assert_eq!(model_used, "first");
    assert_eq!(*log.lock().unwrap(), vec!["first"]);
}

#[tokio::test]
async fn out_of_range_score_advances_the_cascade() {
    let bad = json!({
        "events": [{"name": "Broken", "emoji": "🎭", "location": [1.0, 2.0], "event_score": 11.0}]
    })
    .to_string();

    let log = Arc::new(Mutex::new(Vec::new()));
    let generator = RecommendationGenerator::new(vec![
        backend("bad", Some(bad), &log),
        backend("good", Some(five_event_payload()), &log),
    ]);

    let (progress, _rx) = ProgressSender::channel();
    let (_, model_used) = generator
        .generate(&test_context(), 2, &progress)
        .await
        .unwrap();

    assert_eq!(model_used, "good");
    assert_eq!(*log.lock().unwrap(), vec!["bad", "good"]);
}

#[tokio::test]
async fn dropped_consumer_stops_the_cascade_mid_flight() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let backends: Vec<Arc<dyn ModelBackend>> = ["one", "two", "three", "four"]
        .into_iter()
        .map(|name| {
            Arc::new(SlowBackend {
                name,
                delay: Duration::from_millis(500),
                log: Arc::clone(&log),
            }) as Arc<dyn ModelBackend>
        })
        .collect();
    let generator = RecommendationGenerator::new(backends);

    let (progress, rx) = ProgressSender::channel();
    let task = tokio::spawn(async move {
        generator.generate(&test_context(), 3, &progress).await
    });

    // Let the first backend call get under way, then walk away.
    tokio::time::sleep(Duration::from_millis(50)).await;
    drop(rx);

    let err = task.await.unwrap().expect_err("cascade should be abandoned");
    assert!(err.last_error.contains("cancelled"), "{}", err.last_error);
    assert_eq!(
        *log.lock().unwrap(),
        vec!["one"],
        "no further backends may be attempted once the consumer is gone"
    );
}

#[tokio::test]
async fn exhausted_cascade_surfaces_the_last_error() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let generator =
        RecommendationGenerator::new(vec![backend("a", None, &log), backend("b", None, &log)]);

    let (progress, _rx) = ProgressSender::channel();
    let err = generator
        .generate(&test_context(), 3, &progress)
        .await
        .expect_err("every candidate fails");

    assert_eq!(err.attempts, 2);
    assert!(err.last_error.contains("scripted failure"), "{}", err.last_error);
    assert_eq!(*log.lock().unwrap(), vec!["a", "b"]);
}
