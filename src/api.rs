use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::sse::{self, KeepAlive, Sse},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::stream::Stream;
use metrics::counter;
use serde::Serialize;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::StreamExt;
use tower_http::cors::CorsLayer;

use crate::config::AppConfig;
use crate::context::{seasonal_hint, ContextAggregator};
use crate::data;
use crate::events::{Event, RecommendationsRequest, RecommendationsResponse};
use crate::generate::headline::{self, HeadlineMetadata, HeadlineResponse};
use crate::generate::RecommendationGenerator;
use crate::progress::{PipelineEvent, ProgressSender, Stage};

const MAX_NUMBER_EVENTS: u32 = 25;

#[derive(Clone)]
pub struct AppState {
    config: Arc<AppConfig>,
    aggregator: Arc<ContextAggregator>,
    generator: Arc<RecommendationGenerator>,
}

/// Build the router with adapters and backends derived from the config.
pub fn create_router(config: AppConfig) -> Router {
    let aggregator = ContextAggregator::from_config(&config);
    let generator = RecommendationGenerator::from_config(&config);
    create_router_with(config, aggregator, generator)
}

/// Build the router around injected pipeline components (used by tests to
/// substitute source and backend doubles).
pub fn create_router_with(
    config: AppConfig,
    aggregator: ContextAggregator,
    generator: RecommendationGenerator,
) -> Router {
    let state = AppState {
        config: Arc::new(config),
        aggregator: Arc::new(aggregator),
        generator: Arc::new(generator),
    };

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/events/recommendations", post(recommendations))
        .route("/events/recommendations/stream", post(recommendations_stream))
        .route("/events/headline", get(headline_handler))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    events: Vec<Event>,
}

fn bad_request(message: impl Into<String>) -> Response {
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(ErrorBody {
            error: message.into(),
            events: Vec::new(),
        }),
    )
        .into_response()
}

fn validate_request(req: &RecommendationsRequest) -> Result<usize, String> {
    if req.number_events == 0 {
        return Err("number_events must be greater than zero".to_string());
    }
    if req.number_events > MAX_NUMBER_EVENTS {
        return Err(format!("number_events must be at most {MAX_NUMBER_EVENTS}"));
    }
    Ok(req.number_events as usize)
}

/// Run aggregation + generation, emitting stages on `progress` and finishing
/// with a terminal frame. Shared by the unary and streaming handlers.
async fn run_pipeline(state: AppState, request: RecommendationsRequest, progress: ProgressSender) {
    let number_events = request.number_events as usize;
    let preferences = request.response_preferences.as_deref();

    progress.send(Stage::Started, "Starting recommendation pipeline");

    // Mock mode: no network, no backends, deterministic fixtures.
    if state.config.mock_mode {
        progress.send(Stage::Generating, "Serving fixture events");
        let events = data::get_mock_events(number_events);
        let mut events =
            data::filter_by_preferences(events, preferences.unwrap_or_default());
        events.sort_by(|a, b| {
            b.event_score
                .partial_cmp(&a.event_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        progress.complete("Recommendations ready", events, None);
        return;
    }

    let target_date = chrono::Utc::now().date_naive();
    let context = state
        .aggregator
        .gather(preferences, target_date, &progress)
        .await;

    // Consumer gone: unwind before spending on a model call.
    if progress.is_cancelled() {
        tracing::debug!("pipeline cancelled before generation");
        return;
    }

    match state
        .generator
        .generate(&context, number_events, &progress)
        .await
    {
        Ok((events, model_used)) => {
            progress.complete("Recommendations ready", events, Some(model_used));
        }
        Err(err) => {
            progress.fail(err.to_string());
        }
    }
}

/// `POST /events/recommendations` — unary path.
async fn recommendations(
    State(state): State<AppState>,
    Json(request): Json<RecommendationsRequest>,
) -> Response {
    counter!("recommend_requests_total", "transport" => "unary").increment(1);

    if let Err(message) = validate_request(&request) {
        return bad_request(message);
    }

    let (tx, mut rx) = ProgressSender::channel();
    run_pipeline(state, request, tx).await;

    // The pipeline has finished; the terminal frame is the last one queued.
    let mut terminal = None;
    while let Ok(event) = rx.try_recv() {
        match event {
            PipelineEvent::Progress(_) => {}
            other => terminal = Some(other),
        }
    }

    match terminal {
        Some(PipelineEvent::Completed { events, .. }) => {
            Json(RecommendationsResponse { events }).into_response()
        }
        Some(PipelineEvent::Failed(update)) => (
            StatusCode::BAD_GATEWAY,
            Json(ErrorBody {
                error: update.message,
                events: Vec::new(),
            }),
        )
            .into_response(),
        _ => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorBody {
                error: "pipeline produced no terminal frame".to_string(),
                events: Vec::new(),
            }),
        )
            .into_response(),
    }
}

#[derive(Serialize)]
struct CompleteFrame {
    status: Stage,
    message: String,
    progress: u8,
    events: Vec<Event>,
    model_used: Option<String>,
}

#[derive(Serialize)]
struct ErrorFrame {
    status: Stage,
    message: String,
}

fn sse_frame(event: PipelineEvent) -> Result<sse::Event, Infallible> {
    let frame = match event {
        PipelineEvent::Progress(update) => sse::Event::default()
            .event("progress")
            .json_data(&update),
        PipelineEvent::Completed {
            update,
            events,
            model_used,
        } => sse::Event::default().event("complete").json_data(&CompleteFrame {
            status: update.status,
            message: update.message,
            progress: update.progress,
            events,
            model_used,
        }),
        PipelineEvent::Failed(update) => sse::Event::default().event("error").json_data(&ErrorFrame {
            status: update.status,
            message: update.message,
        }),
    };
    // Serialization of our own types cannot fail; fall back to a bare frame.
    Ok(frame.unwrap_or_default())
}

/// `POST /events/recommendations/stream` — progress-streaming path.
///
/// Frames are emitted in pipeline order; `complete`/`error` are terminal
/// and the stream closes after them. Dropping the connection cancels the
/// pipeline task at its next stage boundary.
async fn recommendations_stream(
    State(state): State<AppState>,
    Json(request): Json<RecommendationsRequest>,
) -> Sse<impl Stream<Item = Result<sse::Event, Infallible>>> {
    counter!("recommend_requests_total", "transport" => "stream").increment(1);

    let (tx, rx) = ProgressSender::channel();
    match validate_request(&request) {
        Ok(_) => {
            tokio::spawn(run_pipeline(state, request, tx));
        }
        Err(message) => {
            // Terminal error frame; dropping the sender ends the stream.
            tx.fail(message);
        }
    }

    let stream = UnboundedReceiverStream::new(rx).map(sse_frame);
    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// `GET /events/headline` — short creative sentence about the day.
/// Never a hard error: cascade exhaustion falls back to a fixed sentence
/// reported via `metadata.notes`, still HTTP 200.
async fn headline_handler(State(state): State<AppState>) -> Json<HeadlineResponse> {
    let today = chrono::Utc::now().date_naive();

    if state.config.mock_mode {
        return Json(HeadlineResponse {
            sentence: headline::DEFAULT_HEADLINE.to_string(),
            metadata: HeadlineMetadata {
                model: None,
                generated_at: chrono::Utc::now(),
                weather: None,
                notes: Some("mock mode".to_string()),
            },
        });
    }

    let weather = state.aggregator.weather_snapshot().await;
    let response = headline::generate_headline(
        state.generator.backends(),
        &state.config.city,
        seasonal_hint(today),
        weather,
    )
    .await;
    Json(response)
}
