//! Error types for safewalk.
//!
//! Every failure the engine can report is a distinct variant so callers can
//! branch on the kind instead of parsing messages. Per-contact dispatch
//! failures are not errors; they are recorded in
//! [`DispatchOutcome`](crate::dispatch::DispatchOutcome) and only surface here
//! when every attempt of a trigger failed.

use std::path::PathBuf;
use thiserror::Error;

use crate::location::LocationFailure;

/// The main error type for safewalk operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Location Errors ===
    /// Geolocation was denied, timed out or is otherwise unavailable.
    #[error("location unavailable: {reason}")]
    LocationUnavailable {
        /// Why the platform could not provide a position.
        reason: LocationFailure,
    },

    /// An operation needed a known position but none has been recorded yet.
    #[error("a current location is required for {operation}")]
    LocationRequired {
        /// The operation that was refused.
        operation: &'static str,
    },

    /// A coordinate fell outside the valid latitude/longitude ranges.
    #[error("invalid coordinate ({latitude}, {longitude})")]
    InvalidCoordinate {
        /// Offending latitude.
        latitude: f64,
        /// Offending longitude.
        longitude: f64,
    },

    // === Routing Errors ===
    /// The routing collaborator failed or returned no usable route.
    #[error("route unavailable: {message}")]
    RouteUnavailable {
        /// Description of the routing failure.
        message: String,
    },

    // === Persistence Errors ===
    /// A write to or read from the document store failed.
    #[error("persistence failed for {collection}/{key}: {message}")]
    Persistence {
        /// Collection being written.
        collection: String,
        /// Document key being written.
        key: String,
        /// Description of what went wrong.
        message: String,
    },

    /// Failed to open or create the database.
    #[error("failed to open database at {path}: {source}")]
    DatabaseOpen {
        /// Path to the database file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: rusqlite::Error,
    },

    /// A database query failed.
    #[error("database query failed: {0}")]
    DatabaseQuery(#[from] rusqlite::Error),

    /// Failed to run database migrations.
    #[error("database migration failed: {message}")]
    DatabaseMigration {
        /// Description of what went wrong.
        message: String,
    },

    /// A referenced record does not exist or is not in the expected state.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// What was being looked up.
        kind: &'static str,
        /// The identifier that did not resolve.
        id: String,
    },

    // === Contact Errors ===
    /// An emergency contact failed validation.
    #[error("invalid contact: {message}")]
    InvalidContact {
        /// Description of the validation failure.
        message: String,
    },

    /// A contact with the same id already exists for this owner.
    #[error("duplicate contact id: {id}")]
    DuplicateContact {
        /// The conflicting id.
        id: String,
    },

    // === Alert Errors ===
    /// A community alert or one of its fields failed validation.
    #[error("invalid alert: {message}")]
    InvalidAlert {
        /// Description of the validation failure.
        message: String,
    },

    // === Dispatch Errors ===
    /// A single gateway request failed.
    #[error("gateway error: {0}")]
    Gateway(String),

    /// Every notification attempt of an SOS trigger failed.
    #[error("SOS {event_id} recorded but no contact could be notified ({} failures)", failures.len())]
    DispatchFailed {
        /// The durable SOS event that was created before dispatch.
        event_id: String,
        /// One reason per failed attempt.
        failures: Vec<String>,
    },

    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    // === I/O Errors ===
    /// File system operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to create a required directory.
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreate {
        /// Path that couldn't be created.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    // === Serialization Errors ===
    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Generic Errors ===
    /// An operation timed out.
    #[error("operation timed out: {operation}")]
    Timeout {
        /// Description of the operation that timed out.
        operation: String,
    },

    /// An internal error occurred (bug).
    #[error("internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for safewalk operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create a route unavailable error.
    #[must_use]
    pub fn route_unavailable(message: impl Into<String>) -> Self {
        Self::RouteUnavailable {
            message: message.into(),
        }
    }

    /// Wrap any failure as a persistence error for the given document.
    #[must_use]
    pub fn persistence(
        collection: impl Into<String>,
        key: impl Into<String>,
        cause: impl std::fmt::Display,
    ) -> Self {
        Self::Persistence {
            collection: collection.into(),
            key: key.into(),
            message: cause.to_string(),
        }
    }

    /// Create a not-found error.
    #[must_use]
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Create an invalid contact error.
    #[must_use]
    pub fn invalid_contact(message: impl Into<String>) -> Self {
        Self::InvalidContact {
            message: message.into(),
        }
    }

    /// Create an invalid alert error.
    #[must_use]
    pub fn invalid_alert(message: impl Into<String>) -> Self {
        Self::InvalidAlert {
            message: message.into(),
        }
    }

    /// Create a gateway error.
    #[must_use]
    pub fn gateway(message: impl Into<String>) -> Self {
        Self::Gateway(message.into())
    }

    /// Create a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Check if the user can reasonably retry the failed action.
    ///
    /// Location and route failures are transient; everything else needs a
    /// change of input or state first.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::LocationUnavailable { .. }
                | Self::RouteUnavailable { .. }
                | Self::Timeout { .. }
                | Self::Gateway(_)
        )
    }

    /// Check if this error reports a missing record.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
