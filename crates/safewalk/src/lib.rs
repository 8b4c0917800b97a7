//! `safewalk` - A personal safety engine
//!
//! This library tracks the user's location, watches an active trip for route
//! deviation, surfaces community alerts and danger zones around the user, and
//! notifies emergency contacts when an SOS is raised.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod alerts;
pub mod cli;
pub mod config;
pub mod contacts;
pub mod dispatch;
pub mod error;
pub mod geo;
pub mod location;
pub mod logging;
pub mod profile;
pub mod route;
pub mod store;

pub use alerts::{AlertBoard, AlertKind, AlertReport, DangerZone, Severity};
pub use config::Config;
pub use contacts::{ContactBook, EmergencyContact};
pub use dispatch::{DispatchReport, EmergencyDispatcher, SosEvent};
pub use error::{Error, Result};
pub use geo::Coordinate;
pub use location::{LocationReader, LocationTracker, PositionSample};
pub use logging::init_logging;
pub use profile::UserProfile;
pub use route::{DeviationMonitor, DeviationState};
pub use store::{DocumentStore, SqliteStore};
