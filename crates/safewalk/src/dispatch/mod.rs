//! Emergency dispatch: SOS events and fan-out notification of contacts.
//!
//! Triggering an SOS moves through [`DispatchPhase`]s: the event is first
//! persisted, then every contact is messaged concurrently, and the outcomes
//! are aggregated into a [`DispatchReport`]. A contact that could not be
//! reached is recorded in its [`DispatchOutcome`]; the trigger only fails as
//! a whole when nobody could be reached.

mod dispatcher;
mod gateway;
mod message;
mod sos;

use serde::Serialize;

pub use dispatcher::EmergencyDispatcher;
pub use gateway::{CallReceipt, LogGateway, SmsGateway, SmsReceipt, SmsRequest};
pub use message::compose_message;
pub use sos::{SosEvent, SosStatus};

/// Progress of the most recent trigger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchPhase {
    /// No trigger in progress.
    #[default]
    Idle,
    /// Recording the SOS event.
    Triggering,
    /// Notifying contacts.
    Dispatching,
    /// All attempts finished.
    Completed,
}

impl std::fmt::Display for DispatchPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Triggering => write!(f, "triggering"),
            Self::Dispatching => write!(f, "dispatching"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

/// Result of notifying one contact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchOutcome {
    /// The contact that was messaged.
    pub contact_id: String,
    /// Whether the gateway accepted the message.
    pub succeeded: bool,
    /// Why the attempt failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
}

impl DispatchOutcome {
    /// A successful attempt.
    #[must_use]
    pub fn success(contact_id: impl Into<String>) -> Self {
        Self {
            contact_id: contact_id.into(),
            succeeded: true,
            error_detail: None,
        }
    }

    /// A failed attempt.
    #[must_use]
    pub fn failure(contact_id: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            contact_id: contact_id.into(),
            succeeded: false,
            error_detail: Some(detail.into()),
        }
    }
}

/// Aggregate result of one SOS trigger.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchReport {
    /// The persisted event.
    pub event: SosEvent,
    /// One outcome per contact, in contact-list order.
    pub outcomes: Vec<DispatchOutcome>,
    /// Number of contacts reached.
    pub success_count: usize,
    /// Number of contacts not reached.
    pub failure_count: usize,
}

impl DispatchReport {
    /// Tally `outcomes` for `event`.
    #[must_use]
    pub fn new(event: SosEvent, outcomes: Vec<DispatchOutcome>) -> Self {
        let success_count = outcomes.iter().filter(|o| o.succeeded).count();
        Self {
            failure_count: outcomes.len() - success_count,
            success_count,
            event,
            outcomes,
        }
    }

    /// Check if the trigger counts as delivered: at least one contact was
    /// reached, or there was nobody to reach.
    #[must_use]
    pub fn is_delivered(&self) -> bool {
        self.success_count > 0 || self.outcomes.is_empty()
    }

    /// Failure reasons, one per failed attempt.
    #[must_use]
    pub fn failures(&self) -> Vec<String> {
        self.outcomes
            .iter()
            .filter(|o| !o.succeeded)
            .map(|o| {
                format!(
                    "{}: {}",
                    o.contact_id,
                    o.error_detail.as_deref().unwrap_or("unknown error")
                )
            })
            .collect()
    }
}
