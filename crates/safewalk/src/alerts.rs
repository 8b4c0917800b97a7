//! Community alerts, geofence filtering and danger zones.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::geo::Coordinate;
use crate::store::{self, collections, DocumentStore, DocumentStream, Query, StoredDocument};

/// Default radius around the user within which alerts are shown.
pub const MONITORING_RADIUS_METERS: f64 = 300.0;

/// Default radius of the safe zone drawn around a travelling user.
pub const SAFE_ZONE_RADIUS_METERS: f64 = 500.0;

/// Field alerts are ordered by.
const TIMESTAMP_FIELD: &str = "timestamp";

/// How serious a reported alert is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Worth knowing about.
    Low,
    /// Take care.
    #[default]
    Medium,
    /// Avoid the area.
    High,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(Error::invalid_alert(format!("unknown severity: {other}"))),
        }
    }
}

/// Category of a community alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertKind {
    /// Suspicious activity.
    Suspicious,
    /// Harassment.
    Harassment,
    /// An area that feels unsafe.
    Unsafe,
    /// An emergency in progress.
    Emergency,
}

impl AlertKind {
    /// Human-readable label.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Suspicious => "Suspicious Activity",
            Self::Harassment => "Harassment",
            Self::Unsafe => "Unsafe Area",
            Self::Emergency => "Emergency",
        }
    }
}

impl std::fmt::Display for AlertKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// A community-reported alert. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertReport {
    /// Alert id (document key).
    pub id: String,
    /// Category.
    #[serde(rename = "type")]
    pub alert_type: AlertKind,
    /// Free-text description.
    pub description: String,
    /// Severity.
    pub severity: Severity,
    /// Where the alert was reported.
    pub location: Coordinate,
    /// Creation time in epoch milliseconds.
    #[serde(rename = "timestamp")]
    pub created_at_epoch_ms: i64,
    /// The reporting user.
    #[serde(rename = "userId")]
    pub author_id: String,
}

/// Fields supplied by the user when reporting an alert.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAlert {
    /// Category.
    pub alert_type: AlertKind,
    /// Free-text description.
    pub description: String,
    /// Severity.
    pub severity: Severity,
}

/// Select the alerts within `radius_meters` of `center`.
///
/// The boundary is inclusive and the input order is preserved.
#[must_use]
pub fn nearby<'a>(
    alerts: &'a [AlertReport],
    center: &Coordinate,
    radius_meters: f64,
) -> Vec<&'a AlertReport> {
    alerts
        .iter()
        .filter(|alert| alert.location.distance_to(center) <= radius_meters)
        .collect()
}

/// Reads and writes community alerts in the document store.
#[derive(Debug, Clone)]
pub struct AlertBoard {
    store: Arc<dyn DocumentStore>,
}

impl AlertBoard {
    /// Create a board over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Report a new alert at `location` on behalf of `author_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the description is blank or the write fails.
    pub async fn report(
        &self,
        author_id: &str,
        location: Coordinate,
        alert: NewAlert,
    ) -> Result<AlertReport> {
        if alert.description.trim().is_empty() {
            return Err(Error::invalid_alert("alert description must not be empty"));
        }

        let report = AlertReport {
            id: Uuid::new_v4().to_string(),
            alert_type: alert.alert_type,
            description: alert.description.trim().to_string(),
            severity: alert.severity,
            location,
            created_at_epoch_ms: Utc::now().timestamp_millis(),
            author_id: author_id.to_string(),
        };

        store::save(self.store.as_ref(), collections::ALERTS, &report.id, &report)
            .await
            .map_err(|e| Error::persistence(collections::ALERTS, &report.id, e))?;

        info!(id = %report.id, kind = %report.alert_type, severity = %report.severity, "alert reported");
        Ok(report)
    }

    /// The most recent alerts, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the store query fails.
    pub async fn recent(&self, limit: usize) -> Result<Vec<AlertReport>> {
        let documents = self.store.query(&recent_query().limit(limit)).await?;
        Ok(decode_alerts(&documents))
    }

    /// Recent alerts within `radius_meters` of `center`, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the store query fails.
    pub async fn near(&self, center: &Coordinate, radius_meters: f64) -> Result<Vec<AlertReport>> {
        let documents = self.store.query(&recent_query()).await?;
        let alerts = decode_alerts(&documents);
        Ok(nearby(&alerts, center, radius_meters)
            .into_iter()
            .cloned()
            .collect())
    }

    /// Stream alert snapshots, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the store refuses the subscription.
    pub fn subscribe(&self) -> Result<AlertFeed> {
        Ok(AlertFeed {
            stream: self.store.subscribe(recent_query())?,
        })
    }
}

/// Live alert snapshots.
#[derive(Debug)]
pub struct AlertFeed {
    stream: DocumentStream,
}

impl AlertFeed {
    /// Wait for the next snapshot. `None` once the store side ends.
    pub async fn next(&mut self) -> Option<Vec<AlertReport>> {
        let documents = self.stream.next().await?;
        Some(decode_alerts(&documents))
    }
}

fn recent_query() -> Query {
    Query::collection(collections::ALERTS).order_by(TIMESTAMP_FIELD, true)
}

fn decode_alerts(documents: &[StoredDocument]) -> Vec<AlertReport> {
    documents
        .iter()
        .filter_map(|doc| match doc.decode::<AlertReport>() {
            Ok(alert) if alert.location.is_valid() => Some(alert),
            Ok(_) => {
                warn!(key = %doc.key, "skipping alert with out-of-range location");
                None
            }
            Err(e) => {
                warn!(key = %doc.key, "skipping malformed alert: {e}");
                None
            }
        })
        .collect()
}

/// A circular area flagged as dangerous.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DangerZone {
    /// Center of the zone.
    pub center: Coordinate,
    /// Radius in meters.
    pub radius_meters: f64,
}

impl DangerZone {
    /// Check if `coordinate` lies inside the zone (boundary included).
    #[must_use]
    pub fn contains(&self, coordinate: &Coordinate) -> bool {
        self.center.distance_to(coordinate) <= self.radius_meters
    }
}

/// Select the zones that contain `coordinate`.
#[must_use]
pub fn zones_containing<'a>(zones: &'a [DangerZone], coordinate: &Coordinate) -> Vec<&'a DangerZone> {
    zones.iter().filter(|zone| zone.contains(coordinate)).collect()
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct DangerZoneList {
    #[serde(default)]
    zones: Vec<DangerZone>,
}

/// Load a user's danger zones. A missing document means no zones.
///
/// # Errors
///
/// Returns an error if the read fails or the document is malformed.
pub async fn load_danger_zones(store: &dyn DocumentStore, user_id: &str) -> Result<Vec<DangerZone>> {
    let list: Option<DangerZoneList> =
        store::load(store, collections::DANGER_ZONES, user_id).await?;
    let zones = list.unwrap_or_default().zones;
    debug!(user = user_id, count = zones.len(), "danger zones loaded");
    Ok(zones)
}

/// Replace a user's danger zones.
///
/// # Errors
///
/// Returns an error if the write fails.
pub async fn save_danger_zones(
    store: &dyn DocumentStore,
    user_id: &str,
    zones: &[DangerZone],
) -> Result<()> {
    let list = DangerZoneList {
        zones: zones.to_vec(),
    };
    store::save(store, collections::DANGER_ZONES, user_id, &list).await
}
