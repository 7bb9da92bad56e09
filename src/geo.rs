//! Geographic primitives.
//!
//! Platform-agnostic module for great-circle distance, bearing, and
//! forward point projection. All coordinates use WGS84 (lat/lng in
//! degrees); bearings are degrees clockwise from geographic north,
//! normalized into [0, 360).

use serde::{Deserialize, Serialize};

/// A geographic coordinate in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// A point is valid iff both components are finite and within
    /// [-90, 90] / [-180, 180].
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && self.lat.abs() <= 90.0
            && self.lng.abs() <= 180.0
    }
}

/// Earth radius in meters (WGS84 mean).
const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Haversine distance between two points in meters.
pub fn haversine(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let dlat = (b.lat - a.lat).to_radians();
    let dlng = (b.lng - a.lng).to_radians();

    let h = (dlat / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);

    2.0 * EARTH_RADIUS_M * h.sqrt().asin()
}

/// Initial bearing from `a` to `b` in degrees [0, 360).
pub fn bearing(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let dlng = (b.lng - a.lng).to_radians();

    let y = dlng.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * dlng.cos();

    normalize_degrees(y.atan2(x).to_degrees())
}

/// Normalize an angle in degrees into [0, 360).
///
/// Accepts any finite magnitude and sign.
pub fn normalize_degrees(deg: f64) -> f64 {
    let d = deg.rem_euclid(360.0);
    // rem_euclid can return exactly 360.0 for tiny negative inputs
    if d >= 360.0 { 0.0 } else { d }
}

/// Project a point `distance_m` meters from `start` along the great
/// circle with initial bearing `bearing_deg`.
pub fn destination(start: &GeoPoint, bearing_deg: f64, distance_m: f64) -> GeoPoint {
    let ang = distance_m / EARTH_RADIUS_M;
    let brg = bearing_deg.to_radians();
    let lat1 = start.lat.to_radians();
    let lng1 = start.lng.to_radians();

    let lat2 = (lat1.sin() * ang.cos() + lat1.cos() * ang.sin() * brg.cos()).asin();
    let lng2 = lng1
        + (brg.sin() * ang.sin() * lat1.cos()).atan2(ang.cos() - lat1.sin() * lat2.sin());

    GeoPoint {
        lat: lat2.to_degrees(),
        lng: wrap_longitude(lng2.to_degrees()),
    }
}

/// Wrap a longitude into [-180, 180).
fn wrap_longitude(lng: f64) -> f64 {
    (lng + 180.0).rem_euclid(360.0) - 180.0
}

/// Format a distance for display.
///
/// Below one kilometer the value is rounded to 10 m steps; above it
/// is shown in kilometers with one decimal.
pub fn format_distance(meters: f64) -> String {
    if meters >= 1000.0 {
        format!("{:.1} km", meters / 1000.0)
    } else {
        format!("{} m", (meters / 10.0).round() as i64 * 10)
    }
}
