//! Routing collaborator and trip deviation monitoring.
//!
//! A [`RouteProvider`] turns an origin/destination pair into a
//! [`RoutePolyline`]. The [`DeviationMonitor`] keeps the polyline for the
//! current trip and measures how far each position sample strays from it.

mod monitor;

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::geo::Coordinate;

pub use monitor::{DeviationMonitor, DeviationState, OffsetVector, DEVIATION_THRESHOLD_METERS};

/// How the route should be travelled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TravelMode {
    /// Road route for a car.
    #[default]
    Driving,
}

impl std::fmt::Display for TravelMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Driving => write!(f, "driving"),
        }
    }
}

/// A route request sent to the routing collaborator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RouteRequest {
    /// Start of the trip.
    pub origin: Coordinate,
    /// End of the trip.
    pub destination: Coordinate,
    /// Travel mode.
    pub mode: TravelMode,
}

impl RouteRequest {
    /// A driving request between two points.
    #[must_use]
    pub fn driving(origin: Coordinate, destination: Coordinate) -> Self {
        Self {
            origin,
            destination,
            mode: TravelMode::Driving,
        }
    }
}

/// An ordered route path with its human-readable summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutePolyline {
    /// Route vertices from origin to destination.
    pub points: Vec<Coordinate>,
    /// Provider-formatted distance, e.g. "2.3 km".
    #[serde(default)]
    pub distance_text: String,
    /// Provider-formatted duration, e.g. "9 mins".
    #[serde(default)]
    pub duration_text: String,
}

impl RoutePolyline {
    /// Create a polyline.
    #[must_use]
    pub fn new(
        points: Vec<Coordinate>,
        distance_text: impl Into<String>,
        duration_text: impl Into<String>,
    ) -> Self {
        Self {
            points,
            distance_text: distance_text.into(),
            duration_text: duration_text.into(),
        }
    }

    /// Check if the polyline has no vertices.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Number of vertices.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Sum of the segment lengths in meters.
    #[must_use]
    pub fn length_meters(&self) -> f64 {
        self.points
            .windows(2)
            .map(|pair| pair[0].distance_to(&pair[1]))
            .sum()
    }

    /// Smallest distance from `coordinate` to any vertex, or `None` for an
    /// empty polyline.
    #[must_use]
    pub fn min_vertex_distance(&self, coordinate: &Coordinate) -> Option<f64> {
        self.points
            .iter()
            .map(|point| point.distance_to(coordinate))
            .min_by(f64::total_cmp)
    }
}

/// The mapping/routing collaborator.
#[async_trait]
pub trait RouteProvider: Send + Sync + std::fmt::Debug {
    /// Request a route.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RouteUnavailable`] when the provider cannot route the
    /// request.
    async fn route(&self, request: &RouteRequest) -> Result<RoutePolyline>;
}

/// Serves one pre-recorded polyline for every request.
#[derive(Debug, Clone, Default)]
pub struct StaticRouteProvider {
    route: Option<RoutePolyline>,
}

impl StaticRouteProvider {
    /// Serve `route` for every request.
    #[must_use]
    pub fn new(route: RoutePolyline) -> Self {
        Self { route: Some(route) }
    }

    /// A provider that fails every request.
    #[must_use]
    pub fn unavailable() -> Self {
        Self::default()
    }

    /// The polyline served, if any.
    #[must_use]
    pub fn polyline(&self) -> Option<&RoutePolyline> {
        self.route.as_ref()
    }

    /// Load the polyline from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or holds an
    /// out-of-range coordinate.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let route: RoutePolyline = serde_json::from_str(&text)?;
        if let Some(bad) = route.points.iter().find(|p| !p.is_valid()) {
            return Err(Error::InvalidCoordinate {
                latitude: bad.latitude,
                longitude: bad.longitude,
            });
        }
        Ok(Self::new(route))
    }
}

#[async_trait]
impl RouteProvider for StaticRouteProvider {
    async fn route(&self, request: &RouteRequest) -> Result<RoutePolyline> {
        tracing::debug!(
            origin = %request.origin,
            destination = %request.destination,
            mode = %request.mode,
            "static route requested"
        );
        self.route
            .clone()
            .ok_or_else(|| Error::route_unavailable("no route recorded"))
    }
}
