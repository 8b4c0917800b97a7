//! Great-circle geometry shared by every component.
//!
//! The route deviation monitor, the alert filter and the danger-zone check
//! all measure distance through [`haversine_meters`]; there is no second
//! implementation.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Mean Earth radius used by the haversine formula, in meters.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// A WGS84 latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    /// Latitude in degrees, within `[-90, 90]`.
    pub latitude: f64,
    /// Longitude in degrees, within `[-180, 180]`.
    pub longitude: f64,
}

impl Coordinate {
    /// Create a coordinate, rejecting out-of-range or non-finite values.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCoordinate`] if either component is outside
    /// its range.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self> {
        let coordinate = Self {
            latitude,
            longitude,
        };
        if coordinate.is_valid() {
            Ok(coordinate)
        } else {
            Err(Error::InvalidCoordinate {
                latitude,
                longitude,
            })
        }
    }

    /// Check the latitude/longitude range invariant.
    ///
    /// Values deserialized from a document bypass [`Coordinate::new`], so
    /// callers loading foreign data should check this.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.latitude) && (-180.0..=180.0).contains(&self.longitude)
    }

    /// Great-circle distance to `other` in meters.
    #[must_use]
    pub fn distance_to(&self, other: &Coordinate) -> f64 {
        haversine_meters(self, other)
    }

    /// Initial bearing from this point towards `other`, in degrees clockwise
    /// from north within `[0, 360)`.
    #[must_use]
    pub fn bearing_to(&self, other: &Coordinate) -> f64 {
        let phi1 = self.latitude.to_radians();
        let phi2 = other.latitude.to_radians();
        let delta_lambda = (other.longitude - self.longitude).to_radians();

        let y = delta_lambda.sin() * phi2.cos();
        let x = phi1.cos() * phi2.sin() - phi1.sin() * phi2.cos() * delta_lambda.cos();
        (y.atan2(x).to_degrees() + 360.0) % 360.0
    }

    /// The point reached by travelling `distance_meters` along a great
    /// circle starting at `bearing_degrees`.
    #[must_use]
    pub fn destination(&self, bearing_degrees: f64, distance_meters: f64) -> Coordinate {
        let delta = distance_meters / EARTH_RADIUS_METERS;
        let theta = bearing_degrees.to_radians();
        let phi1 = self.latitude.to_radians();
        let lambda1 = self.longitude.to_radians();

        let sin_phi2 = phi1.sin() * delta.cos() + phi1.cos() * delta.sin() * theta.cos();
        let phi2 = sin_phi2.clamp(-1.0, 1.0).asin();
        let lambda2 = lambda1
            + (theta.sin() * delta.sin() * phi1.cos()).atan2(delta.cos() - phi1.sin() * sin_phi2);

        Coordinate {
            latitude: phi2.to_degrees(),
            longitude: normalize_longitude(lambda2.to_degrees()),
        }
    }

    /// Displace this point by a local north/east vector in meters.
    #[must_use]
    pub fn offset(&self, north_meters: f64, east_meters: f64) -> Coordinate {
        let distance = north_meters.hypot(east_meters);
        if distance == 0.0 {
            return *self;
        }
        let bearing = east_meters.atan2(north_meters).to_degrees();
        self.destination(bearing, distance)
    }

    /// Build a map link pointing at this coordinate.
    ///
    /// `base` is the URL prefix up to the query value, for example
    /// `https://www.google.com/maps?q=`.
    #[must_use]
    pub fn map_link(&self, base: &str) -> String {
        format!("{base}{},{}", self.latitude, self.longitude)
    }
}

impl std::fmt::Display for Coordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.6}, {:.6}", self.latitude, self.longitude)
    }
}

/// Haversine great-circle distance between two coordinates, in meters.
#[must_use]
pub fn haversine_meters(a: &Coordinate, b: &Coordinate) -> f64 {
    let phi1 = a.latitude.to_radians();
    let phi2 = b.latitude.to_radians();
    let delta_phi = (b.latitude - a.latitude).to_radians();
    let delta_lambda = (b.longitude - a.longitude).to_radians();

    let h = (delta_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (delta_lambda / 2.0).sin().powi(2);
    let h = h.clamp(0.0, 1.0);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_METERS * c
}

fn normalize_longitude(degrees: f64) -> f64 {
    let wrapped = (degrees + 540.0) % 360.0 - 180.0;
    // -180 and 180 are the same meridian; keep the caller's sign at the seam
    if wrapped == -180.0 && degrees > 0.0 {
        180.0
    } else {
        wrapped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coord(latitude: f64, longitude: f64) -> Coordinate {
        Coordinate::new(latitude, longitude).unwrap()
    }

    fn sample_points() -> Vec<Coordinate> {
        vec![
            coord(12.9716, 77.5946),
            coord(12.9800, 77.6050),
            coord(28.6139, 77.2090),
            coord(-33.8688, 151.2093),
            coord(51.5074, -0.1278),
            coord(0.0, 179.9),
            coord(0.0, -179.9),
            coord(89.9, 10.0),
        ]
    }

    #[test]
    fn test_new_rejects_out_of_range() {
        assert!(Coordinate::new(90.0, 180.0).is_ok());
        assert!(Coordinate::new(-90.0, -180.0).is_ok());
        assert!(matches!(
            Coordinate::new(90.5, 0.0),
            Err(Error::InvalidCoordinate { .. })
        ));
        assert!(Coordinate::new(0.0, -180.1).is_err());
        assert!(Coordinate::new(f64::NAN, 0.0).is_err());
    }

    #[test]
    fn test_distance_to_self_is_zero() {
        for p in sample_points() {
            assert_eq!(haversine_meters(&p, &p), 0.0);
        }
    }

    #[test]
    fn test_distance_is_symmetric() {
        let points = sample_points();
        for a in &points {
            for b in &points {
                let ab = haversine_meters(a, b);
                let ba = haversine_meters(b, a);
                assert!((ab - ba).abs() < 1e-6, "{a} / {b}: {ab} vs {ba}");
            }
        }
    }

    #[test]
    fn test_triangle_inequality() {
        let points = sample_points();
        for a in &points {
            for b in &points {
                for c in &points {
                    let direct = haversine_meters(a, b);
                    let via = haversine_meters(a, c) + haversine_meters(c, b);
                    assert!(direct <= via + 1e-3, "{a} -> {b} via {c}");
                }
            }
        }
    }

    #[test]
    fn test_known_distance() {
        // One degree of latitude on the mean sphere
        let d = haversine_meters(&coord(0.0, 0.0), &coord(1.0, 0.0));
        assert!((d - 111_194.93).abs() < 1.0, "got {d}");
    }

    #[test]
    fn test_antimeridian_distance_is_short() {
        let d = haversine_meters(&coord(0.0, 179.9), &coord(0.0, -179.9));
        assert!(d < 23_000.0, "got {d}");
    }

    #[test]
    fn test_offset_round_trips_distance() {
        let origin = coord(12.9758, 77.5946);
        for meters in [1.0, 299.0, 600.0, 700.0, 5_000.0] {
            let east = origin.offset(0.0, meters);
            let north = origin.offset(meters, 0.0);
            assert!((origin.distance_to(&east) - meters).abs() < 0.01);
            assert!((origin.distance_to(&north) - meters).abs() < 0.01);
            assert!(east.longitude > origin.longitude);
            assert!(north.latitude > origin.latitude);
        }
    }

    #[test]
    fn test_zero_offset_is_identity() {
        let origin = coord(12.9716, 77.5946);
        assert_eq!(origin.offset(0.0, 0.0), origin);
    }

    #[test]
    fn test_bearing_cardinal_directions() {
        let origin = coord(10.0, 10.0);
        assert!((origin.bearing_to(&coord(11.0, 10.0)) - 0.0).abs() < 1e-6);
        assert!((origin.bearing_to(&coord(9.0, 10.0)) - 180.0).abs() < 1e-6);
        let east = origin.bearing_to(&coord(10.0, 11.0));
        assert!((east - 90.0).abs() < 0.2, "got {east}");
    }

    #[test]
    fn test_destination_wraps_longitude() {
        let p = coord(0.0, 179.999).offset(0.0, 1_000.0);
        assert!(p.is_valid());
        assert!(p.longitude < 0.0);
    }

    #[test]
    fn test_map_link() {
        let link = coord(12.9716, 77.5946).map_link("https://www.google.com/maps?q=");
        assert_eq!(link, "https://www.google.com/maps?q=12.9716,77.5946");
    }

    #[test]
    fn test_coordinate_serialization() {
        let json = serde_json::to_string(&coord(1.5, -2.5)).unwrap();
        assert_eq!(json, r#"{"latitude":1.5,"longitude":-2.5}"#);
    }
}
