//! Integration tests for the progress-streaming endpoint: frame order,
//! progress monotonicity, and terminal-frame semantics.

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use whatson::{create_router, AppConfig};

fn mock_config() -> AppConfig {
    AppConfig {
        mock_mode: true,
        city: "Edinburgh".into(),
        country_code: "GB".into(),
        model_candidates: vec!["gpt-4.1-mini".into()],
        openai_api_key: None,
        weather_api_key: None,
        festivals_api_key: None,
        festivals_secret_key: None,
        festivals_default_festival: None,
        listings_feed_url: None,
        bind_addr: "127.0.0.1:0".into(),
    }
}

/// One parsed SSE frame: (event name, decoded data payload).
fn parse_sse(body: &str) -> Vec<(String, Value)> {
    let mut frames = Vec::new();
    for block in body.split("\n\n").filter(|b| !b.trim().is_empty()) {
        let mut name = String::new();
        let mut data = String::new();
        for line in block.lines() {
            if let Some(rest) = line.strip_prefix("event:") {
                name = rest.trim().to_string();
            } else if let Some(rest) = line.strip_prefix("data:") {
                data.push_str(rest.trim());
            }
        }
        if name.is_empty() && data.is_empty() {
            continue; // keep-alive comment block
        }
        let value: Value = serde_json::from_str(&data).unwrap_or(Value::Null);
        frames.push((name, value));
    }
    frames
}

async fn stream_frames(app: &Router, payload: Value) -> Vec<(String, Value)> {
    let req = Request::builder()
        .method("POST")
        .uri("/events/recommendations/stream")
        .header("content-type", "application/json")
        .body(Body::from(payload.to_string()))
        .expect("request build");

    let resp = app.clone().oneshot(req).await.expect("router response");
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = resp.into_body().collect().await.expect("body").to_bytes();
    parse_sse(&String::from_utf8_lossy(&bytes))
}

#[tokio::test]
async fn stream_emits_ordered_frames_ending_with_complete() {
    let app = create_router(mock_config());
    let frames = stream_frames(&app, json!({ "number_events": 3 })).await;

    assert!(frames.len() >= 2, "expected at least started + complete");

    // First frame is the started stage at 0.
    let (first_name, first) = &frames[0];
    assert_eq!(first_name, "progress");
    assert_eq!(first["status"], "started");
    assert_eq!(first["progress"], 0);

    // Progress never decreases across the sequence.
    let mut last = 0u64;
    for (_, frame) in &frames {
        let p = frame["progress"].as_u64().expect("progress field");
        assert!(p >= last, "progress went backwards");
        last = p;
    }
    assert_eq!(last, 100);

    // Terminal frame is named `complete`, carries the events, and nothing
    // follows it.
    let (last_name, last_frame) = frames.last().unwrap();
    assert_eq!(last_name, "complete");
    assert_eq!(last_frame["status"], "complete");
    assert_eq!(last_frame["events"].as_array().unwrap().len(), 3);
    assert_eq!(
        frames.iter().filter(|(n, _)| n == "complete" || n == "error").count(),
        1,
        "exactly one terminal frame"
    );
}

#[tokio::test]
async fn invalid_request_streams_single_error_frame() {
    let app = create_router(mock_config());
    let frames = stream_frames(&app, json!({ "number_events": 0 })).await;

    assert_eq!(frames.len(), 1);
    let (name, frame) = &frames[0];
    assert_eq!(name, "error");
    assert_eq!(frame["status"], "error");
    assert!(frame["message"].as_str().unwrap().contains("number_events"));
}
