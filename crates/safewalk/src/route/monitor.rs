//! Route deviation monitoring for a single trip.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::{RoutePolyline, RouteProvider, RouteRequest};
use crate::error::{Error, Result};
use crate::geo::Coordinate;
use crate::location::PositionSample;

/// Distance from the nearest route vertex beyond which a trip counts as
/// deviated.
pub const DEVIATION_THRESHOLD_METERS: f64 = 500.0;

/// Result of checking one position against the active route.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviationState {
    /// Distance to the nearest route vertex in meters.
    pub distance_from_route_meters: f64,
    /// Whether the distance exceeds [`DEVIATION_THRESHOLD_METERS`].
    pub is_deviated: bool,
}

impl DeviationState {
    fn from_distance(distance_from_route_meters: f64) -> Self {
        Self {
            distance_from_route_meters,
            is_deviated: distance_from_route_meters > DEVIATION_THRESHOLD_METERS,
        }
    }
}

/// A local displacement in meters.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct OffsetVector {
    /// Meters towards north; negative is south.
    pub north_meters: f64,
    /// Meters towards east; negative is west.
    pub east_meters: f64,
}

impl OffsetVector {
    /// Create an offset.
    #[must_use]
    pub fn new(north_meters: f64, east_meters: f64) -> Self {
        Self {
            north_meters,
            east_meters,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Simulation {
    /// Follow the true position at a fixed displacement.
    Offset(OffsetVector),
    /// Pin the position to one synthetic point.
    Pinned(Coordinate),
}

/// Tracks one trip's route and the user's deviation from it.
///
/// The monitor remembers the last true position it evaluated. A simulation
/// substitutes a synthetic position for evaluation only; the true position
/// is never overwritten and [`return_to_true_location`] restores it.
///
/// [`return_to_true_location`]: DeviationMonitor::return_to_true_location
#[derive(Debug)]
pub struct DeviationMonitor {
    provider: Arc<dyn RouteProvider>,
    route: Option<RoutePolyline>,
    state: DeviationState,
    true_position: Option<Coordinate>,
    simulation: Option<Simulation>,
}

impl DeviationMonitor {
    /// Create a monitor with no active route.
    #[must_use]
    pub fn new(provider: Arc<dyn RouteProvider>) -> Self {
        Self {
            provider,
            route: None,
            state: DeviationState::default(),
            true_position: None,
            simulation: None,
        }
    }

    /// Request a driving route and make it the active trip.
    ///
    /// On success the previous route is replaced, any simulation is dropped
    /// and the deviation state is reset.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RouteUnavailable`] if the provider fails or returns
    /// an empty polyline. The previous route stays active.
    pub async fn set_route(
        &mut self,
        origin: Coordinate,
        destination: Coordinate,
    ) -> Result<&RoutePolyline> {
        let request = RouteRequest::driving(origin, destination);
        let route = match self.provider.route(&request).await {
            Ok(route) if route.is_empty() => {
                warn!("routing returned an empty polyline");
                return Err(Error::route_unavailable("empty polyline"));
            }
            Ok(route) => route,
            Err(e) => {
                warn!("route request failed: {e}");
                return Err(match e {
                    Error::RouteUnavailable { .. } => e,
                    other => Error::route_unavailable(other.to_string()),
                });
            }
        };

        info!(
            points = route.len(),
            distance = %route.distance_text,
            duration = %route.duration_text,
            "trip route set"
        );
        self.simulation = None;
        self.state = DeviationState::default();
        Ok(&*self.route.insert(route))
    }

    /// End the trip.
    pub fn clear_route(&mut self) {
        self.route = None;
        self.simulation = None;
        self.state = DeviationState::default();
    }

    /// The active route, if any.
    #[must_use]
    pub fn route(&self) -> Option<&RoutePolyline> {
        self.route.as_ref()
    }

    /// The most recent deviation state.
    #[must_use]
    pub fn state(&self) -> DeviationState {
        self.state
    }

    /// Check if a simulated position is in effect.
    #[must_use]
    pub fn is_simulated(&self) -> bool {
        self.simulation.is_some()
    }

    /// The last true position seen by [`evaluate`](Self::evaluate).
    #[must_use]
    pub fn true_position(&self) -> Option<Coordinate> {
        self.true_position
    }

    /// The position deviation is measured from: the simulated one if a
    /// simulation is active, the true one otherwise.
    #[must_use]
    pub fn effective_position(&self) -> Option<Coordinate> {
        match self.simulation {
            Some(Simulation::Pinned(coordinate)) => Some(coordinate),
            Some(Simulation::Offset(offset)) => self
                .true_position
                .map(|c| c.offset(offset.north_meters, offset.east_meters)),
            None => self.true_position,
        }
    }

    /// Record a new true sample and recompute the deviation.
    ///
    /// Without an active route this returns the default state and changes
    /// nothing but the remembered position.
    pub fn evaluate(&mut self, sample: &PositionSample) -> DeviationState {
        self.true_position = Some(sample.coordinate);
        self.recompute().unwrap_or_default()
    }

    /// Evaluate from a displaced position, leaving the true one untouched.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LocationRequired`] if no true position is known yet.
    pub fn simulate_offset(&mut self, offset: OffsetVector) -> Result<DeviationState> {
        if self.true_position.is_none() {
            return Err(Error::LocationRequired {
                operation: "deviation simulation",
            });
        }
        debug!(
            north = offset.north_meters,
            east = offset.east_meters,
            "simulating offset position"
        );
        self.simulation = Some(Simulation::Offset(offset));
        Ok(self.recompute().unwrap_or_default())
    }

    /// Jump to a point `meters` off the route, perpendicular to its first
    /// segment at the first vertex.
    ///
    /// A single-vertex route is left northwards instead.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RouteUnavailable`] if no route is active.
    pub fn simulate_deviation(&mut self, meters: f64) -> Result<DeviationState> {
        let route = self
            .route
            .as_ref()
            .ok_or_else(|| Error::route_unavailable("set a destination first"))?;

        let point = match route.points.as_slice() {
            [first, second, ..] => first.destination(first.bearing_to(second) + 90.0, meters),
            [only] => only.offset(meters, 0.0),
            [] => return Err(Error::route_unavailable("empty polyline")),
        };

        debug!(position = %point, "simulating deviation");
        self.simulation = Some(Simulation::Pinned(point));
        Ok(self.recompute().unwrap_or_default())
    }

    /// Drop any simulation and re-evaluate from the true position.
    pub fn return_to_true_location(&mut self) -> DeviationState {
        if self.simulation.take().is_some() {
            debug!("returned to true location");
        }
        self.recompute().unwrap_or_default()
    }

    /// Recompute and store the state; `None` without a route or position.
    fn recompute(&mut self) -> Option<DeviationState> {
        let route = self.route.as_ref()?;
        let position = self.effective_position()?;
        let distance = route.min_vertex_distance(&position)?;

        let state = DeviationState::from_distance(distance);
        if state.is_deviated && !self.state.is_deviated {
            warn!(distance_meters = distance.round(), "route deviation detected");
        }
        self.state = state;
        Some(state)
    }
}
