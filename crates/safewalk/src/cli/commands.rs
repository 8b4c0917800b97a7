//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use std::path::PathBuf;

use clap::{Args, Subcommand, ValueEnum};

use crate::alerts::{AlertKind, Severity};
use crate::geo::Coordinate;

/// Parse a `LAT,LNG` argument.
///
/// # Errors
///
/// Returns a message if the value is not two comma-separated numbers within
/// coordinate range.
pub fn parse_coordinate(value: &str) -> Result<Coordinate, String> {
    let (lat, lng) = value
        .split_once(',')
        .ok_or_else(|| format!("expected LAT,LNG, got {value:?}"))?;
    let latitude: f64 = lat
        .trim()
        .parse()
        .map_err(|_| format!("invalid latitude {lat:?}"))?;
    let longitude: f64 = lng
        .trim()
        .parse()
        .map_err(|_| format!("invalid longitude {lng:?}"))?;
    Coordinate::new(latitude, longitude).map_err(|e| e.to_string())
}

/// Distance command arguments.
#[derive(Debug, Args)]
pub struct DistanceCommand {
    /// First point as LAT,LNG
    #[arg(value_parser = parse_coordinate, allow_hyphen_values = true)]
    pub from: Coordinate,

    /// Second point as LAT,LNG
    #[arg(value_parser = parse_coordinate, allow_hyphen_values = true)]
    pub to: Coordinate,
}

/// Safety check around a point.
#[derive(Debug, Args)]
pub struct NearbyCommand {
    /// Position as LAT,LNG (defaults to the last-known location)
    #[arg(long, value_parser = parse_coordinate, allow_hyphen_values = true)]
    pub at: Option<Coordinate>,

    /// Alert radius in meters (defaults to the configured monitoring radius)
    #[arg(short, long)]
    pub radius: Option<f64>,

    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Emergency contact commands.
#[derive(Debug, Subcommand)]
pub enum ContactsCommand {
    /// List emergency contacts
    List {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Add an emergency contact
    Add {
        /// Contact name
        name: String,

        /// Ten-digit mobile number
        phone: String,

        /// Relationship to you
        #[arg(short, long, default_value = "")]
        relationship: String,
    },

    /// Replace an emergency contact's details
    Update {
        /// Contact id
        id: String,

        /// Contact name
        name: String,

        /// Ten-digit mobile number
        phone: String,

        /// Relationship to you
        #[arg(short, long, default_value = "")]
        relationship: String,
    },

    /// Remove an emergency contact
    Remove {
        /// Contact id
        id: String,
    },
}

/// Community alert commands.
#[derive(Debug, Subcommand)]
pub enum AlertsCommand {
    /// Report a community alert
    Report {
        /// Alert category
        #[arg(short = 't', long = "type", value_enum)]
        kind: AlertKindArg,

        /// What happened
        description: String,

        /// Severity
        #[arg(short, long, value_enum, default_value = "medium")]
        severity: SeverityArg,

        /// Position as LAT,LNG (defaults to the last-known location)
        #[arg(long, value_parser = parse_coordinate, allow_hyphen_values = true)]
        at: Option<Coordinate>,
    },

    /// Show the most recent alerts
    Recent {
        /// Maximum number of alerts
        #[arg(short, long, default_value = "20")]
        limit: usize,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show alerts around a point
    Nearby(NearbyCommand),
}

/// Trip commands.
#[derive(Debug, Subcommand)]
pub enum TripCommand {
    /// Check a position against a recorded route
    Check {
        /// Route polyline JSON file
        #[arg(short, long, value_name = "FILE")]
        route: PathBuf,

        /// Position as LAT,LNG
        #[arg(long, value_parser = parse_coordinate, allow_hyphen_values = true)]
        at: Coordinate,

        /// Also report a simulated deviation of this many meters
        #[arg(long, value_name = "METERS")]
        simulate: Option<f64>,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },
}

/// Replay a recorded location trace.
#[derive(Debug, Args)]
pub struct TrackCommand {
    /// Location trace JSON file
    #[arg(value_name = "FILE")]
    pub trace: PathBuf,

    /// Route polyline JSON file to check deviation against
    #[arg(short, long, value_name = "FILE")]
    pub route: Option<PathBuf>,

    /// Delay between trace entries in milliseconds
    #[arg(short, long, default_value = "200")]
    pub interval_ms: u64,
}

/// SOS commands.
#[derive(Debug, Subcommand)]
pub enum SosCommand {
    /// Raise an SOS and notify every emergency contact
    Trigger {
        /// Position as LAT,LNG (defaults to the last-known location)
        #[arg(long, value_parser = parse_coordinate, allow_hyphen_values = true)]
        at: Option<Coordinate>,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Mark an SOS event as resolved
    Resolve {
        /// SOS event id
        id: String,
    },

    /// Resolve your most recent active SOS
    ResolveLatest,

    /// List your SOS events
    List {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },
}

/// Profile commands.
#[derive(Debug, Subcommand)]
pub enum ProfileCommand {
    /// Show your profile
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Update profile fields; omitted fields are kept
    Set {
        /// Name shown to your contacts
        #[arg(long)]
        name: Option<String>,

        /// Your own phone number
        #[arg(long)]
        phone: Option<String>,

        /// Blood group, e.g. O+
        #[arg(long)]
        blood_group: Option<String>,

        /// Home address
        #[arg(long)]
        address: Option<String>,
    },
}

/// Danger zone commands.
#[derive(Debug, Subcommand)]
pub enum ZonesCommand {
    /// List your danger zones
    List {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Flag a circular area as dangerous
    Add {
        /// Center as LAT,LNG
        #[arg(value_parser = parse_coordinate, allow_hyphen_values = true)]
        center: Coordinate,

        /// Radius in meters
        #[arg(short, long, default_value = "200")]
        radius: f64,
    },

    /// Remove every danger zone
    Clear,
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

/// Alert category argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AlertKindArg {
    /// Suspicious activity
    Suspicious,
    /// Harassment
    Harassment,
    /// Unsafe area
    Unsafe,
    /// Emergency in progress
    Emergency,
}

impl From<AlertKindArg> for AlertKind {
    fn from(arg: AlertKindArg) -> Self {
        match arg {
            AlertKindArg::Suspicious => Self::Suspicious,
            AlertKindArg::Harassment => Self::Harassment,
            AlertKindArg::Unsafe => Self::Unsafe,
            AlertKindArg::Emergency => Self::Emergency,
        }
    }
}

/// Severity argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SeverityArg {
    /// Low severity
    Low,
    /// Medium severity
    Medium,
    /// High severity
    High,
}

impl From<SeverityArg> for Severity {
    fn from(arg: SeverityArg) -> Self {
        match arg {
            SeverityArg::Low => Self::Low,
            SeverityArg::Medium => Self::Medium,
            SeverityArg::High => Self::High,
        }
    }
}
