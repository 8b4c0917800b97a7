//! Position samples, geolocation sources and the tracking service.
//!
//! A [`GeolocationSource`] wraps the platform's continuous-position
//! primitive and pushes [`SourceEvent`]s through a channel. The
//! [`LocationTracker`] owns the single subscription and publishes the latest
//! sample to any number of [`LocationReader`]s.

mod replay;
mod tracker;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::Result;
use crate::geo::Coordinate;

pub use replay::{ReplayEntry, ReplaySource};
pub use tracker::{
    load_last_known, LocationReader, LocationState, LocationTracker, TrackingStatus, Visibility,
};

/// One position fix reported by the platform.
///
/// Samples are immutable; a newer sample supersedes an older one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionSample {
    /// Where the device was.
    pub coordinate: Coordinate,
    /// Reported horizontal accuracy radius in meters.
    pub accuracy_meters: f64,
    /// Capture time in milliseconds since the Unix epoch.
    pub captured_at_epoch_ms: i64,
}

impl PositionSample {
    /// Create a sample with an explicit capture time.
    #[must_use]
    pub fn new(coordinate: Coordinate, accuracy_meters: f64, captured_at_epoch_ms: i64) -> Self {
        Self {
            coordinate,
            accuracy_meters,
            captured_at_epoch_ms,
        }
    }

    /// Create a sample captured now.
    #[must_use]
    pub fn now(coordinate: Coordinate, accuracy_meters: f64) -> Self {
        Self::new(coordinate, accuracy_meters, Utc::now().timestamp_millis())
    }

    /// Capture time as a `DateTime`, if representable.
    #[must_use]
    pub fn captured_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.captured_at_epoch_ms).single()
    }
}

/// Why the platform could not provide a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationFailure {
    /// The user or platform denied location access.
    PermissionDenied,
    /// No fix could be obtained.
    PositionUnavailable,
    /// The platform gave up waiting for a fix.
    Timeout,
    /// The host has no geolocation capability.
    Unsupported,
}

impl std::fmt::Display for LocationFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PermissionDenied => write!(f, "permission denied"),
            Self::PositionUnavailable => write!(f, "position unavailable"),
            Self::Timeout => write!(f, "timed out"),
            Self::Unsupported => write!(f, "geolocation unsupported"),
        }
    }
}

/// An item pushed by a geolocation source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SourceEvent {
    /// A new position fix.
    Sample(PositionSample),
    /// A transient or permanent failure to obtain a fix.
    Failure(LocationFailure),
}

/// A platform-specific continuous position provider.
///
/// `start` registers the long-lived subscription and returns promptly;
/// events then arrive through the channel in platform order. Senders must
/// never block the platform callback: use `try_send` from callbacks, or send
/// from a task the source owns.
#[async_trait]
pub trait GeolocationSource: Send + Sync + std::fmt::Debug {
    /// The name of this source (for logging/debugging).
    fn name(&self) -> &'static str;

    /// Start delivering events through `tx`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LocationUnavailable`](crate::Error::LocationUnavailable)
    /// when the platform refuses access up front.
    async fn start(&mut self, tx: mpsc::Sender<SourceEvent>) -> Result<()>;

    /// Cancel the subscription. No events are sent after this returns.
    ///
    /// # Errors
    ///
    /// Returns an error if the source fails to stop cleanly.
    fn stop(&mut self) -> Result<()>;

    /// Check if the source is currently delivering events.
    fn is_running(&self) -> bool;
}
