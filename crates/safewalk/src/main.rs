//! `safewalk` - CLI for the safewalk safety engine
//!
//! This binary wires the engine to a local SQLite document store and a
//! dry-run SMS gateway.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Parser;

use safewalk::alerts::{
    load_danger_zones, save_danger_zones, zones_containing, AlertBoard, DangerZone, NewAlert,
};
use safewalk::cli::{
    AlertsCommand, Cli, Command, ConfigCommand, ContactsCommand, NearbyCommand, ProfileCommand,
    SosCommand, TrackCommand, TripCommand, ZonesCommand,
};
use safewalk::contacts::{ContactBook, ContactDetails};
use safewalk::dispatch::{EmergencyDispatcher, LogGateway};
use safewalk::location::{
    load_last_known, LocationReader, LocationTracker, PositionSample, ReplaySource,
};
use safewalk::route::{DeviationMonitor, StaticRouteProvider};
use safewalk::store::{DocumentStore, SqliteStore};
use safewalk::{init_logging, Config, Coordinate, Error, UserProfile};

/// Everything a command handler needs.
#[derive(Debug)]
struct App {
    config: Config,
    user_id: String,
    store: Arc<dyn DocumentStore>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    init_logging(cli.verbosity());

    // Load configuration
    let config = Config::load_from(cli.config.clone())?;

    // Commands that do not touch the store
    let command = match cli.command {
        Command::Distance(cmd) => {
            let meters = cmd.from.distance_to(&cmd.to);
            println!("{meters:.1} m");
            return Ok(());
        }
        Command::Config(config_cmd) => return handle_config(&config, config_cmd),
        other => other,
    };

    let user_id = cli.user.unwrap_or_else(|| config.user.id.clone());
    let database_path = config.database_path();
    let store = SqliteStore::open(&database_path)
        .with_context(|| format!("opening {}", database_path.display()))?;
    if let Command::Status { json } = command {
        return handle_status(&store, &config, &user_id, json).await;
    }
    let app = App {
        config,
        user_id,
        store: Arc::new(store),
    };

    match command {
        Command::Nearby(cmd) => handle_nearby(&app, &cmd).await,
        Command::Contacts(cmd) => handle_contacts(&app, cmd).await,
        Command::Alerts(cmd) => handle_alerts(&app, cmd).await,
        Command::Trip(cmd) => handle_trip(&app, cmd).await,
        Command::Track(cmd) => handle_track(&app, &cmd).await,
        Command::Sos(cmd) => handle_sos(&app, cmd).await,
        Command::FakeCall => {
            let receipt = dispatcher(&app, None).fake_call(&app.user_id).await?;
            println!("Call {} {}", receipt.call_id, receipt.status);
            Ok(())
        }
        Command::Profile(cmd) => handle_profile(&app, cmd).await,
        Command::Zones(cmd) => handle_zones(&app, cmd).await,
        Command::Distance(_) | Command::Config(_) | Command::Status { .. } => Ok(()),
    }
}

fn dispatcher(app: &App, sample: Option<PositionSample>) -> EmergencyDispatcher {
    EmergencyDispatcher::new(
        Arc::clone(&app.store),
        Arc::new(LogGateway::new()),
        LocationReader::pinned(sample),
        &app.config.dispatch,
    )
}

/// The explicit position, or the user's last-known one.
async fn position(
    app: &App,
    at: Option<Coordinate>,
    operation: &'static str,
) -> anyhow::Result<PositionSample> {
    if let Some(coordinate) = at {
        return Ok(PositionSample::now(coordinate, 0.0));
    }
    load_last_known(app.store.as_ref(), &app.user_id)
        .await?
        .ok_or_else(|| Error::LocationRequired { operation }.into())
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn handle_status(
    store: &SqliteStore,
    config: &Config,
    user_id: &str,
    json: bool,
) -> anyhow::Result<()> {
    let stats = store.stats()?;
    let last_known = load_last_known(store, user_id).await?;
    let active_sos = EmergencyDispatcher::new(
        Arc::new(store.clone()),
        Arc::new(LogGateway::new()),
        LocationReader::pinned(None),
        &config.dispatch,
    )
    .events_for(user_id)
    .await?
    .iter()
    .filter(|event| event.is_active())
    .count();

    if json {
        let collections: serde_json::Map<String, serde_json::Value> = stats
            .collections
            .iter()
            .map(|(name, count)| (name.clone(), (*count).into()))
            .collect();
        return print_json(&serde_json::json!({
            "user": user_id,
            "database_path": store.path(),
            "database_size_bytes": stats.db_size_bytes,
            "total_documents": stats.total_documents,
            "collections": collections,
            "last_known_location": last_known,
            "active_sos": active_sos,
        }));
    }

    println!("safewalk status");
    println!("---------------");
    println!("User:          {user_id}");
    println!("Database:      {}", store.path().display());
    println!("Size:          {} bytes", stats.db_size_bytes);
    println!("Documents:     {}", stats.total_documents);
    for (name, count) in &stats.collections {
        println!("  {name:<20} {count}");
    }
    match last_known {
        Some(sample) => println!("Last location: {}", sample.coordinate),
        None => println!("Last location: unknown"),
    }
    println!("Active SOS:    {active_sos}");
    Ok(())
}

async fn handle_nearby(app: &App, cmd: &NearbyCommand) -> anyhow::Result<()> {
    let here = position(app, cmd.at, "nearby check").await?.coordinate;
    let radius = cmd
        .radius
        .unwrap_or(app.config.alerts.monitoring_radius_meters);

    let alerts = AlertBoard::new(Arc::clone(&app.store))
        .near(&here, radius)
        .await?;
    let zones = load_danger_zones(app.store.as_ref(), &app.user_id).await?;
    let inside = zones_containing(&zones, &here);

    if cmd.json {
        return print_json(&serde_json::json!({
            "position": here,
            "radiusMeters": radius,
            "alerts": alerts,
            "dangerZones": inside,
        }));
    }

    println!("Around {here} (radius {radius:.0} m)");
    if inside.is_empty() {
        println!("Not inside any danger zone.");
    } else {
        println!("WARNING: inside {} danger zone(s)", inside.len());
    }
    if alerts.is_empty() {
        println!("No alerts nearby.");
    }
    for alert in &alerts {
        println!(
            "  [{}] {} - {} ({:.0} m away)",
            alert.severity,
            alert.alert_type.label(),
            alert.description,
            alert.location.distance_to(&here)
        );
    }
    Ok(())
}

async fn handle_contacts(app: &App, cmd: ContactsCommand) -> anyhow::Result<()> {
    let book = ContactBook::new(Arc::clone(&app.store), app.user_id.as_str());
    match cmd {
        ContactsCommand::List { json } => {
            let contacts = book.list().await?;
            if json {
                return print_json(&contacts);
            }
            if contacts.is_empty() {
                println!("No emergency contacts.");
            }
            for contact in contacts {
                println!(
                    "{}  {:<20} {}  {}",
                    contact.id, contact.name, contact.phone_digits, contact.relationship
                );
            }
        }
        ContactsCommand::Add {
            name,
            phone,
            relationship,
        } => {
            let contact = book
                .add(ContactDetails {
                    name,
                    phone,
                    relationship,
                })
                .await?;
            println!("Added {} ({})", contact.name, contact.id);
        }
        ContactsCommand::Update {
            id,
            name,
            phone,
            relationship,
        } => {
            let contact = book
                .update(
                    &id,
                    ContactDetails {
                        name,
                        phone,
                        relationship,
                    },
                )
                .await?;
            println!("Updated {} ({})", contact.name, contact.id);
        }
        ContactsCommand::Remove { id } => {
            let contact = book.delete(&id).await?;
            println!("Removed {}", contact.name);
        }
    }
    Ok(())
}

async fn handle_alerts(app: &App, cmd: AlertsCommand) -> anyhow::Result<()> {
    let board = AlertBoard::new(Arc::clone(&app.store));
    match cmd {
        AlertsCommand::Report {
            kind,
            description,
            severity,
            at,
        } => {
            let here = position(app, at, "alert report").await?.coordinate;
            let alert = NewAlert {
                alert_type: kind.into(),
                description,
                severity: severity.into(),
            };
            let report = board.report(&app.user_id, here, alert).await?;
            println!("Reported {} alert {}", report.alert_type.label(), report.id);
        }
        AlertsCommand::Recent { limit, json } => {
            let alerts = board.recent(limit).await?;
            if json {
                return print_json(&alerts);
            }
            for alert in alerts {
                println!(
                    "[{}] {} at {} - {}",
                    alert.severity,
                    alert.alert_type.label(),
                    alert.location,
                    alert.description
                );
            }
        }
        AlertsCommand::Nearby(cmd) => handle_nearby(app, &cmd).await?,
    }
    Ok(())
}

/// Load a recorded route and make it the monitor's active trip.
async fn start_trip(path: &Path) -> anyhow::Result<DeviationMonitor> {
    let provider = Arc::new(StaticRouteProvider::from_json_file(path)?);
    let (origin, destination) = match provider.polyline().map(|r| r.points.as_slice()) {
        Some([first, .., last]) => (*first, *last),
        Some([only]) => (*only, *only),
        _ => bail!("route file {} has no points", path.display()),
    };

    let mut monitor = DeviationMonitor::new(provider);
    let route = monitor.set_route(origin, destination).await?;
    println!(
        "Route: {} points, {:.0} m ({} {})",
        route.len(),
        route.length_meters(),
        route.distance_text,
        route.duration_text
    );
    Ok(monitor)
}

async fn handle_trip(app: &App, cmd: TripCommand) -> anyhow::Result<()> {
    match cmd {
        TripCommand::Check {
            route,
            at,
            simulate,
            json,
        } => {
            let mut monitor = start_trip(&route).await?;
            let state = monitor.evaluate(&PositionSample::now(at, 0.0));
            let simulated = simulate
                .map(|meters| monitor.simulate_deviation(meters))
                .transpose()?;

            let safe_zone = app.config.alerts.safe_zone_radius_meters;
            let alerts = AlertBoard::new(Arc::clone(&app.store))
                .near(&at, safe_zone)
                .await?;

            if json {
                return print_json(&serde_json::json!({
                    "deviation": state,
                    "simulated": simulated,
                    "safeZoneRadiusMeters": safe_zone,
                    "alertsInSafeZone": alerts.len(),
                }));
            }

            println!(
                "Distance from route: {:.0} m{}",
                state.distance_from_route_meters,
                if state.is_deviated { " (DEVIATED)" } else { "" }
            );
            if let Some(sim) = simulated {
                println!(
                    "Simulated: {:.0} m{}",
                    sim.distance_from_route_meters,
                    if sim.is_deviated { " (DEVIATED)" } else { "" }
                );
            }
            println!(
                "Alerts within {safe_zone:.0} m: {}",
                alerts.len()
            );
        }
    }
    Ok(())
}

async fn handle_track(app: &App, cmd: &TrackCommand) -> anyhow::Result<()> {
    let interval = Duration::from_millis(cmd.interval_ms);
    let source = ReplaySource::from_json_file(&cmd.trace, interval)?;
    println!("Replaying {} trace entries", source.len());

    let mut monitor = match &cmd.route {
        Some(path) => Some(start_trip(path).await?),
        None => None,
    };
    let zones = load_danger_zones(app.store.as_ref(), &app.user_id).await?;

    let mut tracker = LocationTracker::new(Box::new(source), &app.config.tracking)
        .with_persistence(Arc::clone(&app.store), app.user_id.as_str());
    let mut reader = tracker.reader();
    tracker.start_tracking().await?;

    let idle = interval * 4 + Duration::from_secs(1);
    let mut seen = 0;
    let mut in_zone = false;
    while let Ok(Some(state)) = tokio::time::timeout(idle, reader.changed()).await {
        if let Some(failure) = state.last_error {
            println!("  location error: {failure}");
        }
        let Some(sample) = state.sample else { continue };
        if state.samples_committed == seen {
            continue;
        }
        seen = state.samples_committed;

        let mut line = format!("#{seen} {}", sample.coordinate);
        if let Some(monitor) = monitor.as_mut() {
            let deviation = monitor.evaluate(&sample);
            let _ = write!(
                line,
                "  {:.0} m from route",
                deviation.distance_from_route_meters
            );
            if deviation.is_deviated {
                line.push_str(" (DEVIATED)");
            }
        }
        let inside = !zones_containing(&zones, &sample.coordinate).is_empty();
        if inside && !in_zone {
            line.push_str("  entered danger zone");
        }
        in_zone = inside;
        println!("{line}");
    }

    tracker.stop_tracking().await?;
    println!("Tracking stopped after {seen} samples.");
    Ok(())
}

async fn handle_sos(app: &App, cmd: SosCommand) -> anyhow::Result<()> {
    match cmd {
        SosCommand::Trigger { at, json } => {
            let sample = match at {
                Some(coordinate) => Some(PositionSample::now(coordinate, 0.0)),
                None => load_last_known(app.store.as_ref(), &app.user_id).await?,
            };
            let report = dispatcher(app, sample).trigger(&app.user_id).await?;
            if json {
                return print_json(&report);
            }
            println!("SOS {} raised at {}", report.event.id, report.event.location);
            println!(
                "Contacts notified: {}, failed: {}",
                report.success_count, report.failure_count
            );
            for failure in report.failures() {
                println!("  {failure}");
            }
        }
        SosCommand::Resolve { id } => {
            let event = dispatcher(app, None).mark_resolved(&id).await?;
            println!("SOS {} resolved", event.id);
        }
        SosCommand::ResolveLatest => {
            let event = dispatcher(app, None).resolve_latest(&app.user_id).await?;
            println!("SOS {} resolved", event.id);
        }
        SosCommand::List { json } => {
            let events = dispatcher(app, None).events_for(&app.user_id).await?;
            if json {
                return print_json(&events);
            }
            for event in events {
                println!("{}  {}  {}", event.id, event.status, event.location);
            }
        }
    }
    Ok(())
}

async fn handle_profile(app: &App, cmd: ProfileCommand) -> anyhow::Result<()> {
    let mut profile = UserProfile::load(app.store.as_ref(), &app.user_id).await?;
    match cmd {
        ProfileCommand::Show { json } => {
            if json {
                return print_json(&profile);
            }
            let field = |value: &Option<String>| value.clone().unwrap_or_else(|| "-".to_string());
            println!("Name:        {}", field(&profile.display_name));
            println!("Phone:       {}", field(&profile.phone_number));
            println!("Blood group: {}", field(&profile.blood_group));
            println!("Address:     {}", field(&profile.address));
        }
        ProfileCommand::Set {
            name,
            phone,
            blood_group,
            address,
        } => {
            profile.display_name = name.or(profile.display_name);
            profile.phone_number = phone.or(profile.phone_number);
            profile.blood_group = blood_group.or(profile.blood_group);
            profile.address = address.or(profile.address);
            profile.save(app.store.as_ref(), &app.user_id).await?;
            println!("Profile updated.");
        }
    }
    Ok(())
}

async fn handle_zones(app: &App, cmd: ZonesCommand) -> anyhow::Result<()> {
    let mut zones = load_danger_zones(app.store.as_ref(), &app.user_id).await?;
    match cmd {
        ZonesCommand::List { json } => {
            if json {
                return print_json(&zones);
            }
            if zones.is_empty() {
                println!("No danger zones.");
            }
            for zone in zones {
                println!("{} radius {:.0} m", zone.center, zone.radius_meters);
            }
        }
        ZonesCommand::Add { center, radius } => {
            if !(radius.is_finite() && radius > 0.0) {
                bail!("radius must be positive, got {radius}");
            }
            zones.push(DangerZone {
                center,
                radius_meters: radius,
            });
            save_danger_zones(app.store.as_ref(), &app.user_id, &zones).await?;
            println!("{} danger zone(s) saved.", zones.len());
        }
        ZonesCommand::Clear => {
            save_danger_zones(app.store.as_ref(), &app.user_id, &[]).await?;
            println!("Danger zones cleared.");
        }
    }
    Ok(())
}

fn handle_config(config: &Config, cmd: ConfigCommand) -> anyhow::Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            if json {
                return print_json(config);
            }
            println!("Current Configuration");
            println!("=====================");
            println!();
            println!("[User]");
            println!("  Id:                 {}", config.user.id);
            println!();
            println!("[Storage]");
            println!("  Database path:      {}", config.database_path().display());
            println!();
            println!("[Tracking]");
            println!("  Channel capacity:   {}", config.tracking.channel_capacity);
            println!(
                "  Auto resume:        {}",
                config.tracking.auto_resume_on_foreground
            );
            println!("  Persist locations:  {}", config.tracking.persist_locations);
            println!();
            println!("[Alerts]");
            println!(
                "  Monitoring radius:  {} m",
                config.alerts.monitoring_radius_meters
            );
            println!(
                "  Safe-zone radius:   {} m",
                config.alerts.safe_zone_radius_meters
            );
            println!();
            println!("[Dispatch]");
            println!("  Attempt timeout:    {} ms", config.dispatch.attempt_timeout_ms);
            println!("  Country prefix:     {}", config.dispatch.country_prefix);
            println!("  Map link base:      {}", config.dispatch.map_link_base);
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => {
            let path = file.unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            match Config::load_from(Some(path)) {
                Ok(_) => println!("Configuration is valid."),
                Err(e) => println!("Configuration error: {e}"),
            }
        }
    }
    Ok(())
}
