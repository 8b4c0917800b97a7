//! A geolocation source that replays a recorded trace.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use super::{GeolocationSource, LocationFailure, PositionSample, SourceEvent};
use crate::error::{Error, Result};
use crate::geo::Coordinate;

/// Accuracy assigned to trace fixes that do not carry one.
const DEFAULT_ACCURACY_METERS: f64 = 10.0;

/// One line of a recorded trace, as read from JSON.
///
/// ```json
/// [
///   {"latitude": 12.9716, "longitude": 77.5946, "accuracyMeters": 8.0},
///   {"error": "timeout"}
/// ]
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ReplayEntry {
    /// A position fix.
    Fix {
        /// Latitude in degrees.
        latitude: f64,
        /// Longitude in degrees.
        longitude: f64,
        /// Accuracy radius in meters.
        #[serde(default, rename = "accuracyMeters")]
        accuracy_meters: Option<f64>,
        /// Capture time; replay time is used when absent.
        #[serde(default)]
        timestamp: Option<i64>,
    },
    /// A reported failure.
    Failure {
        /// The failure kind.
        error: LocationFailure,
    },
}

impl ReplayEntry {
    fn into_event(self) -> Result<SourceEvent> {
        match self {
            Self::Fix {
                latitude,
                longitude,
                accuracy_meters,
                timestamp,
            } => {
                let coordinate = Coordinate::new(latitude, longitude)?;
                let accuracy = accuracy_meters.unwrap_or(DEFAULT_ACCURACY_METERS);
                let at = timestamp.unwrap_or_else(|| Utc::now().timestamp_millis());
                Ok(SourceEvent::Sample(PositionSample::new(coordinate, accuracy, at)))
            }
            Self::Failure { error } => Ok(SourceEvent::Failure(error)),
        }
    }
}

/// Replays a fixed sequence of events at a steady interval.
#[derive(Debug)]
pub struct ReplaySource {
    events: Vec<SourceEvent>,
    interval: Duration,
    task: Option<JoinHandle<()>>,
}

impl ReplaySource {
    /// Create a source that emits `events` in order, `interval` apart.
    #[must_use]
    pub fn new(events: Vec<SourceEvent>, interval: Duration) -> Self {
        Self {
            events,
            interval,
            task: None,
        }
    }

    /// Load a trace from a JSON array of [`ReplayEntry`] values.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not valid JSON, or
    /// contains an out-of-range coordinate.
    pub fn from_json_file(path: impl AsRef<Path>, interval: Duration) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&text, interval)
    }

    /// Parse a trace from JSON text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a valid trace.
    pub fn from_json(text: &str, interval: Duration) -> Result<Self> {
        let entries: Vec<ReplayEntry> = serde_json::from_str(text)?;
        let events = entries
            .into_iter()
            .map(ReplayEntry::into_event)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(events, interval))
    }

    /// Number of events in the trace.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Check if the trace is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[async_trait]
impl GeolocationSource for ReplaySource {
    fn name(&self) -> &'static str {
        "replay"
    }

    async fn start(&mut self, tx: mpsc::Sender<SourceEvent>) -> Result<()> {
        if self.is_running() {
            return Err(Error::internal("replay source already started"));
        }

        let events = self.events.clone();
        let interval = self.interval;
        self.task = Some(tokio::spawn(async move {
            for (index, event) in events.into_iter().enumerate() {
                if index > 0 && !interval.is_zero() {
                    tokio::time::sleep(interval).await;
                }
                trace!(index, "replaying event");
                if tx.send(event).await.is_err() {
                    debug!("replay receiver closed");
                    return;
                }
            }
            debug!("replay finished");
        }));
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }
}
