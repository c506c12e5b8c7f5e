//! Progress reporting: an append-only channel of stage transitions.
//!
//! The pipeline (producer) pushes one frame per stage; the streaming
//! endpoint (single consumer per request) drains them in emission order.
//! Percentages are monotonically non-decreasing for one request, starting
//! at 0 (`started`) and ending at 100 (`complete`/`error`).

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU8, Ordering};
use tokio::sync::mpsc;

use crate::events::Event;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Started,
    FetchingWeather,
    WeatherComplete,
    FetchingFestivals,
    FestivalsComplete,
    FetchingListings,
    ListingsComplete,
    ContextComplete,
    Generating,
    Complete,
    Error,
}

impl Stage {
    /// Nominal completion percentage for the stage. The sender clamps these
    /// so the emitted sequence never decreases even if stages race.
    fn percent(self) -> u8 {
        match self {
            Stage::Started => 0,
            Stage::FetchingWeather => 5,
            Stage::WeatherComplete => 20,
            Stage::FetchingFestivals => 25,
            Stage::FestivalsComplete => 40,
            Stage::FetchingListings => 45,
            Stage::ListingsComplete => 60,
            Stage::ContextComplete => 65,
            Stage::Generating => 70,
            Stage::Complete | Stage::Error => 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub status: Stage,
    pub message: String,
    pub progress: u8,
}

/// One frame on the progress channel. Terminal variants end the sequence
/// and carry the assembled response (or the failure message) with them so
/// the consumer never has to join two channels.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    Progress(ProgressUpdate),
    Completed {
        update: ProgressUpdate,
        events: Vec<Event>,
        model_used: Option<String>,
    },
    Failed(ProgressUpdate),
}

/// Producer half of the progress channel.
///
/// Sends return `false` once the consumer has gone away; the pipeline
/// treats that as caller-initiated cancellation and unwinds at the next
/// stage boundary.
pub struct ProgressSender {
    tx: mpsc::UnboundedSender<PipelineEvent>,
    high_water: AtomicU8,
}

impl ProgressSender {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<PipelineEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx,
                high_water: AtomicU8::new(0),
            },
            rx,
        )
    }

    fn update_for(&self, status: Stage, message: String) -> ProgressUpdate {
        let previous = self.high_water.fetch_max(status.percent(), Ordering::AcqRel);
        let progress = previous.max(status.percent());
        let update = ProgressUpdate {
            status,
            message,
            progress,
        };
        tracing::debug!(status = ?update.status, progress = update.progress, "pipeline stage");
        update
    }

    /// Emit a non-terminal stage transition.
    pub fn send(&self, status: Stage, message: impl Into<String>) -> bool {
        debug_assert!(!matches!(status, Stage::Complete | Stage::Error));
        let update = self.update_for(status, message.into());
        self.tx.send(PipelineEvent::Progress(update)).is_ok()
    }

    /// Emit the terminal `complete` frame carrying the response.
    pub fn complete(
        &self,
        message: impl Into<String>,
        events: Vec<Event>,
        model_used: Option<String>,
    ) -> bool {
        let update = self.update_for(Stage::Complete, message.into());
        self.tx
            .send(PipelineEvent::Completed {
                update,
                events,
                model_used,
            })
            .is_ok()
    }

    /// Emit the terminal `error` frame.
    pub fn fail(&self, message: impl Into<String>) -> bool {
        let update = self.update_for(Stage::Error, message.into());
        self.tx.send(PipelineEvent::Failed(update)).is_ok()
    }

    /// True once the consumer has dropped its receiver.
    pub fn is_cancelled(&self) -> bool {
        self.tx.is_closed()
    }

    /// Resolves when the consumer drops its receiver. Raced against
    /// in-flight network calls so cancellation aborts them instead of
    /// merely discarding their results.
    pub async fn cancelled(&self) {
        self.tx.closed().await;
    }
}
