//! SOS event records.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geo::Coordinate;

/// Lifecycle of an SOS event. Moves from active to resolved exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SosStatus {
    /// Contacts have been asked for help.
    Active,
    /// The user marked themselves safe.
    Resolved,
}

impl std::fmt::Display for SosStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Resolved => write!(f, "resolved"),
        }
    }
}

/// A durable record of one SOS trigger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SosEvent {
    /// Document key.
    pub id: String,
    /// The user who triggered it.
    pub user_id: String,
    /// Trigger time in epoch milliseconds.
    #[serde(rename = "timestamp")]
    pub triggered_at_epoch_ms: i64,
    /// Where the user was.
    pub location: Coordinate,
    /// Current status.
    pub status: SosStatus,
    /// Resolution time in epoch milliseconds.
    #[serde(
        rename = "resolvedAt",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub resolved_at_epoch_ms: Option<i64>,
}

impl SosEvent {
    /// A new active event.
    ///
    /// The id is `{user_id}_{triggered_at}_{suffix}`; the random suffix keeps
    /// two triggers in the same millisecond apart.
    #[must_use]
    pub fn new(user_id: &str, location: Coordinate, triggered_at_epoch_ms: i64) -> Self {
        let suffix = Uuid::new_v4().simple().to_string();
        Self {
            id: format!("{user_id}_{triggered_at_epoch_ms}_{}", &suffix[..8]),
            user_id: user_id.to_string(),
            triggered_at_epoch_ms,
            location,
            status: SosStatus::Active,
            resolved_at_epoch_ms: None,
        }
    }

    /// Check if the event still awaits resolution.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == SosStatus::Active
    }
}
