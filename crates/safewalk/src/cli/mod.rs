//! Command-line interface for safewalk.
//!
//! This module provides the CLI structure for the `safewalk` binary.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::logging::Verbosity;

pub use commands::{
    parse_coordinate, AlertKindArg, AlertsCommand, ConfigCommand, ContactsCommand,
    DistanceCommand, NearbyCommand, ProfileCommand, SeverityArg, SosCommand, TrackCommand,
    TripCommand, ZonesCommand,
};

/// safewalk - Personal safety companion
///
/// Tracks your location, warns when you stray from a planned route, shows
/// community alerts around you and notifies your emergency contacts when
/// you raise an SOS.
#[derive(Debug, Parser)]
#[command(name = "safewalk")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Act as this user instead of the configured one
    #[arg(short, long, global = true, value_name = "ID")]
    pub user: Option<String>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Great-circle distance between two points
    Distance(DistanceCommand),

    /// Show store and safety status
    Status {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Alerts and danger zones around a point
    Nearby(NearbyCommand),

    /// Manage emergency contacts
    #[command(subcommand)]
    Contacts(ContactsCommand),

    /// Report and browse community alerts
    #[command(subcommand)]
    Alerts(AlertsCommand),

    /// Check positions against a planned route
    #[command(subcommand)]
    Trip(TripCommand),

    /// Replay a location trace through the tracker
    Track(TrackCommand),

    /// Raise or resolve an SOS
    #[command(subcommand)]
    Sos(SosCommand),

    /// Ring your own phone
    FakeCall,

    /// View or edit your profile
    #[command(subcommand)]
    Profile(ProfileCommand),

    /// Manage danger zones
    #[command(subcommand)]
    Zones(ZonesCommand),

    /// View or validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> Verbosity {
        Verbosity::from_flags(self.quiet, self.verbose)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn test_cli_name() {
        assert_eq!(Cli::command().get_name(), "safewalk");
    }

    #[test]
    fn test_cli_verify() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_verbosity() {
        assert_eq!(parse(&["safewalk", "-q", "fake-call"]).verbosity(), Verbosity::Quiet);
        assert_eq!(parse(&["safewalk", "fake-call"]).verbosity(), Verbosity::Normal);
        assert_eq!(parse(&["safewalk", "-v", "fake-call"]).verbosity(), Verbosity::Verbose);
        assert_eq!(parse(&["safewalk", "-vv", "fake-call"]).verbosity(), Verbosity::Trace);
    }

    #[test]
    fn test_parse_distance() {
        let cli = parse(&["safewalk", "distance", "12.97,77.59", "12.98,77.60"]);
        let Command::Distance(cmd) = cli.command else {
            panic!("expected distance command");
        };
        assert!((cmd.to.latitude - 12.98).abs() < f64::EPSILON);
    }

    #[test]
    fn test_parse_negative_coordinates() {
        let cli = parse(&["safewalk", "distance", "-33.86,151.21", "-33.87,151.20"]);
        assert!(matches!(cli.command, Command::Distance(_)));
    }

    #[test]
    fn test_parse_contacts_add() {
        let cli = parse(&[
            "safewalk", "contacts", "add", "Asha", "9876543210", "-r", "sister",
        ]);
        assert!(matches!(
            cli.command,
            Command::Contacts(ContactsCommand::Add { ref relationship, .. }) if relationship == "sister"
        ));
    }

    #[test]
    fn test_parse_alert_report() {
        let cli = parse(&[
            "safewalk",
            "alerts",
            "report",
            "-t",
            "harassment",
            "followed near the station",
            "--at",
            "12.97,77.59",
        ]);
        assert!(matches!(
            cli.command,
            Command::Alerts(AlertsCommand::Report {
                kind: AlertKindArg::Harassment,
                severity: SeverityArg::Medium,
                at: Some(_),
                ..
            })
        ));
    }

    #[test]
    fn test_parse_status_json() {
        let cli = parse(&["safewalk", "status", "--json"]);
        assert!(matches!(cli.command, Command::Status { json: true }));
    }

    #[test]
    fn test_parse_sos_resolve_latest() {
        let cli = parse(&["safewalk", "sos", "resolve-latest"]);
        assert!(matches!(cli.command, Command::Sos(SosCommand::ResolveLatest)));
    }

    #[test]
    fn test_parse_trip_check() {
        let cli = parse(&[
            "safewalk", "trip", "check", "-r", "route.json", "--at", "12.97,77.59",
        ]);
        assert!(matches!(
            cli.command,
            Command::Trip(TripCommand::Check { simulate: None, .. })
        ));
    }

    #[test]
    fn test_parse_with_config_and_user() {
        let cli = parse(&["safewalk", "-c", "/custom/config.toml", "-u", "u42", "fake-call"]);
        assert_eq!(cli.config, Some(PathBuf::from("/custom/config.toml")));
        assert_eq!(cli.user.as_deref(), Some("u42"));
    }

    #[test]
    fn test_parse_profile_set() {
        let cli = parse(&["safewalk", "profile", "set", "--blood-group", "O+"]);
        assert!(matches!(
            cli.command,
            Command::Profile(ProfileCommand::Set { name: None, ref blood_group, .. })
                if blood_group.as_deref() == Some("O+")
        ));
    }

    #[test]
    fn test_parse_zones_add() {
        let cli = parse(&["safewalk", "zones", "add", "12.97,77.59", "-r", "150"]);
        let Command::Zones(ZonesCommand::Add { radius, .. }) = cli.command else {
            panic!("expected zones add");
        };
        assert!((radius - 150.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_invalid_coordinate_is_rejected() {
        assert!(Cli::try_parse_from(["safewalk", "distance", "95,0", "0,0"]).is_err());
    }
}
