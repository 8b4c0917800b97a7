//! The location tracking service.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use super::{GeolocationSource, LocationFailure, PositionSample, SourceEvent};
use crate::config::TrackingConfig;
use crate::error::{Error, Result};
use crate::geo::Coordinate;
use crate::store::{self, collections, DocumentStore};

/// Whether the hosting context is visible to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    /// The app is in the foreground.
    Foreground,
    /// The app has been backgrounded.
    Background,
}

/// The value published to readers: last-known sample plus the most recent
/// failure, replaced as a whole on every change.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LocationState {
    /// The latest committed sample, kept across transient failures.
    pub sample: Option<PositionSample>,
    /// The failure reported since the last good sample, if any.
    pub last_error: Option<LocationFailure>,
    /// Number of samples committed since the tracker was created.
    pub samples_committed: u64,
}

/// Read-only view of the current location.
///
/// Clone one into every component that needs the position. Reads never
/// observe a partially updated sample.
#[derive(Debug, Clone)]
pub struct LocationReader {
    rx: watch::Receiver<LocationState>,
}

impl LocationReader {
    /// A reader pinned to a fixed sample, for one-shot tools and tests.
    #[must_use]
    pub fn pinned(sample: Option<PositionSample>) -> Self {
        let (_tx, rx) = watch::channel(LocationState {
            sample,
            last_error: None,
            samples_committed: u64::from(sample.is_some()),
        });
        Self { rx }
    }

    /// The full published state.
    #[must_use]
    pub fn state(&self) -> LocationState {
        *self.rx.borrow()
    }

    /// The latest committed sample.
    #[must_use]
    pub fn latest(&self) -> Option<PositionSample> {
        self.rx.borrow().sample
    }

    /// The latest sample, or an error naming the refused operation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LocationRequired`] if no sample was ever committed.
    pub fn require(&self, operation: &'static str) -> Result<PositionSample> {
        self.latest().ok_or(Error::LocationRequired { operation })
    }

    /// Wait for the next published change.
    ///
    /// Returns `None` once the tracker has been dropped.
    pub async fn changed(&mut self) -> Option<LocationState> {
        self.rx.changed().await.ok()?;
        Some(*self.rx.borrow_and_update())
    }
}

/// A point-in-time summary of the tracker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackingStatus {
    /// A subscription is currently active.
    pub active: bool,
    /// Tracking was paused by a background transition.
    pub suspended: bool,
    /// The last explicit call was `stop_tracking`.
    pub stopped_explicitly: bool,
    /// Published location state.
    pub location: LocationState,
}

/// Last-known location document persisted per user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LastKnownLocation {
    latitude: f64,
    longitude: f64,
    accuracy_meters: f64,
    timestamp: i64,
}

impl From<&PositionSample> for LastKnownLocation {
    fn from(sample: &PositionSample) -> Self {
        Self {
            latitude: sample.coordinate.latitude,
            longitude: sample.coordinate.longitude,
            accuracy_meters: sample.accuracy_meters,
            timestamp: sample.captured_at_epoch_ms,
        }
    }
}

impl From<LastKnownLocation> for PositionSample {
    fn from(doc: LastKnownLocation) -> Self {
        PositionSample::new(
            Coordinate {
                latitude: doc.latitude,
                longitude: doc.longitude,
            },
            doc.accuracy_meters,
            doc.timestamp,
        )
    }
}

/// Read the last-known location persisted for `user_id`.
///
/// # Errors
///
/// Returns an error if the read fails or the document is malformed.
pub async fn load_last_known(
    store: &dyn DocumentStore,
    user_id: &str,
) -> Result<Option<PositionSample>> {
    let doc: Option<LastKnownLocation> =
        store::load(store, collections::LOCATIONS, user_id).await?;
    Ok(doc
        .map(PositionSample::from)
        .filter(|sample| sample.coordinate.is_valid()))
}

#[derive(Debug)]
struct Persistence {
    store: Arc<dyn DocumentStore>,
    user_id: String,
}

#[derive(Debug)]
struct Session {
    pump: JoinHandle<()>,
    persister: Option<JoinHandle<()>>,
}

/// Owns the geolocation subscription and publishes the current location.
///
/// This is the only writer of the current location.
#[derive(Debug)]
pub struct LocationTracker {
    source: Box<dyn GeolocationSource>,
    state: Arc<watch::Sender<LocationState>>,
    persistence: Option<Arc<Persistence>>,
    persist_enabled: bool,
    channel_capacity: usize,
    auto_resume: bool,
    session: Option<Session>,
    suspended: bool,
    stopped_explicitly: bool,
}

impl LocationTracker {
    /// Create a tracker over `source`. Tracking does not start until
    /// [`start_tracking`](Self::start_tracking) is called.
    #[must_use]
    pub fn new(source: Box<dyn GeolocationSource>, config: &TrackingConfig) -> Self {
        let (state, _) = watch::channel(LocationState::default());
        Self {
            source,
            state: Arc::new(state),
            persistence: None,
            persist_enabled: config.persist_locations,
            channel_capacity: config.channel_capacity.max(1),
            auto_resume: config.auto_resume_on_foreground,
            session: None,
            suspended: false,
            stopped_explicitly: false,
        }
    }

    /// Persist every committed sample as `user_id`'s last-known location.
    ///
    /// Persistence is best-effort: failures are logged and tracking goes on.
    /// Ignored when `persist_locations` is disabled in the configuration.
    #[must_use]
    pub fn with_persistence(
        mut self,
        store: Arc<dyn DocumentStore>,
        user_id: impl Into<String>,
    ) -> Self {
        self.persistence = Some(Arc::new(Persistence {
            store,
            user_id: user_id.into(),
        }));
        self
    }

    /// A new reader of the current location.
    #[must_use]
    pub fn reader(&self) -> LocationReader {
        LocationReader {
            rx: self.state.subscribe(),
        }
    }

    /// Check if a subscription is active.
    #[must_use]
    pub fn is_tracking(&self) -> bool {
        self.session.is_some()
    }

    /// Number of live subscriptions to the source (0 or 1).
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        usize::from(self.session.is_some())
    }

    /// Snapshot of the tracker state.
    #[must_use]
    pub fn status(&self) -> TrackingStatus {
        TrackingStatus {
            active: self.is_tracking(),
            suspended: self.suspended,
            stopped_explicitly: self.stopped_explicitly,
            location: *self.state.borrow(),
        }
    }

    /// Start tracking. A no-op if already tracking.
    ///
    /// An explicit start overrides any background suspension.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LocationUnavailable`] if the source refuses to start.
    /// The previous sample, if any, stays published.
    pub async fn start_tracking(&mut self) -> Result<()> {
        self.stopped_explicitly = false;
        self.suspended = false;
        self.subscribe().await
    }

    /// Stop tracking. A no-op if not tracking.
    ///
    /// Once this returns no further sample is committed or persisted.
    /// Visibility changes will not resume tracking until the next explicit
    /// start.
    ///
    /// # Errors
    ///
    /// Returns an error if the source fails to stop cleanly; the
    /// subscription is cancelled regardless.
    pub async fn stop_tracking(&mut self) -> Result<()> {
        self.stopped_explicitly = true;
        self.suspended = false;
        self.unsubscribe().await
    }

    /// React to the hosting context being shown or hidden.
    ///
    /// Backgrounding suspends an active subscription; foregrounding resumes
    /// only a subscription that was suspended this way.
    ///
    /// # Errors
    ///
    /// Returns an error if resuming or suspending the source fails.
    pub async fn on_visibility_change(&mut self, visibility: Visibility) -> Result<()> {
        match visibility {
            Visibility::Background => {
                if self.session.is_some() {
                    debug!("suspending tracking while backgrounded");
                    self.suspended = true;
                    self.unsubscribe().await?;
                }
            }
            Visibility::Foreground => {
                if self.suspended && !self.stopped_explicitly && self.auto_resume {
                    debug!("resuming tracking in foreground");
                    self.suspended = false;
                    self.subscribe().await?;
                }
            }
        }
        Ok(())
    }

    async fn subscribe(&mut self) -> Result<()> {
        if self.session.is_some() {
            trace!("tracking already active");
            return Ok(());
        }

        let (tx, rx) = mpsc::channel(self.channel_capacity);
        if let Err(e) = self.source.start(tx).await {
            if let Error::LocationUnavailable { reason } = &e {
                let reason = *reason;
                self.state.send_modify(|s| s.last_error = Some(reason));
            }
            warn!(source = self.source.name(), "failed to start tracking: {e}");
            return Err(e);
        }

        let (persist_tx, persist_rx) = watch::channel(None);
        let persister = self
            .persistence
            .clone()
            .filter(|_| self.persist_enabled)
            .map(|persistence| tokio::spawn(persist_loop(persist_rx, persistence)));
        let pump = tokio::spawn(pump_loop(rx, Arc::clone(&self.state), persist_tx));

        self.session = Some(Session { pump, persister });
        info!(source = self.source.name(), "location tracking started");
        Ok(())
    }

    async fn unsubscribe(&mut self) -> Result<()> {
        let Some(session) = self.session.take() else {
            return Ok(());
        };

        let stopped = self.source.stop();

        session.pump.abort();
        let _ = session.pump.await;
        if let Some(persister) = session.persister {
            persister.abort();
            let _ = persister.await;
        }

        info!(source = self.source.name(), "location tracking stopped");
        stopped
    }
}

impl Drop for LocationTracker {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            session.pump.abort();
            if let Some(persister) = session.persister {
                persister.abort();
            }
        }
    }
}

/// Commit events in arrival order. Never waits on persistence.
async fn pump_loop(
    mut rx: mpsc::Receiver<SourceEvent>,
    state: Arc<watch::Sender<LocationState>>,
    persist_tx: watch::Sender<Option<PositionSample>>,
) {
    while let Some(event) = rx.recv().await {
        match event {
            SourceEvent::Sample(sample) => {
                if !sample.coordinate.is_valid() {
                    warn!(coordinate = %sample.coordinate, "dropping out-of-range sample");
                    continue;
                }
                state.send_modify(|s| {
                    s.sample = Some(sample);
                    s.last_error = None;
                    s.samples_committed += 1;
                });
                trace!(coordinate = %sample.coordinate, "sample committed");
                persist_tx.send_replace(Some(sample));
            }
            SourceEvent::Failure(reason) => {
                warn!("location unavailable: {reason}");
                state.send_modify(|s| s.last_error = Some(reason));
            }
        }
    }
    debug!("geolocation source closed its channel");
}

/// Persist the newest committed sample; intermediate samples are skipped
/// when the store is slower than the source.
async fn persist_loop(
    mut rx: watch::Receiver<Option<PositionSample>>,
    persistence: Arc<Persistence>,
) {
    while rx.changed().await.is_ok() {
        let Some(sample) = *rx.borrow_and_update() else {
            continue;
        };
        let document = LastKnownLocation::from(&sample);
        if let Err(e) = store::save(
            persistence.store.as_ref(),
            collections::LOCATIONS,
            &persistence.user_id,
            &document,
        )
        .await
        {
            warn!(user = %persistence.user_id, "failed to persist location: {e}");
        }
    }
}
