//! Evacuation path planning.
//!
//! Synthesizes an ordered list of waypoints from a start point toward
//! a safety target. With both endpoints known the planner partitions
//! the direct line and perturbs each point so the route does not look
//! artificially straight; without a usable fix or target it falls
//! back to a bearing random-walk that still yields a plausible
//! winding route. Recalibration simply plans again with the same
//! endpoints and discards the old list.

use rand::Rng;
use serde::Serialize;

use crate::geo::{self, GeoPoint};

/// One intermediate target along the evacuation path.
///
/// Created in a batch at plan time; the only later mutation is the
/// engine flipping `reached` as the user closes on it. List index
/// order is traversal order.
#[derive(Debug, Clone, Serialize)]
pub struct Waypoint {
    pub id: u32,
    pub lat: f64,
    pub lng: f64,
    /// Meters from the path start to this waypoint's actual
    /// (post-perturbation) coordinates.
    pub distance_from_start: f64,
    /// Forward bearing from the path start to this waypoint,
    /// degrees [0, 360).
    pub bearing_from_start: f64,
    pub reached: bool,
}

impl Waypoint {
    pub fn point(&self) -> GeoPoint {
        GeoPoint::new(self.lat, self.lng)
    }
}

/// Default number of waypoints in a planned path.
pub const DEFAULT_WAYPOINT_COUNT: usize = 5;

/// Fractional jitter applied along the direct line (±5%).
const ALONG_JITTER: f64 = 0.05;
/// Maximum lateral offset as a fraction of the direct distance (±10%).
const LATERAL_JITTER: f64 = 0.10;

/// Plan a waypoint path.
///
/// Falls back to a synthetic route when either endpoint is missing or
/// invalid.
pub fn plan(start: Option<GeoPoint>, target: Option<GeoPoint>, count: usize) -> Vec<Waypoint> {
    plan_with_rng(&mut rand::rng(), start, target, count)
}

/// Plan with an explicit generator. Deterministic when seeded.
pub fn plan_with_rng<R: Rng>(
    rng: &mut R,
    start: Option<GeoPoint>,
    target: Option<GeoPoint>,
    count: usize,
) -> Vec<Waypoint> {
    let count = count.max(1);
    let mut waypoints = match (start, target) {
        (Some(s), Some(t)) if s.is_valid() && t.is_valid() => direct_path(rng, &s, &t, count),
        (maybe_start, _) => {
            let origin = maybe_start
                .filter(GeoPoint::is_valid)
                .unwrap_or(GeoPoint::new(0.0, 0.0));
            synthetic_path(rng, &origin, count)
        }
    };

    // Traversal order is by distance; renumber after sorting so ids
    // match index order.
    waypoints.sort_by(|a, b| a.distance_from_start.total_cmp(&b.distance_from_start));
    for (i, wp) in waypoints.iter_mut().enumerate() {
        wp.id = i as u32;
    }
    waypoints
}

/// Partition the direct start-target line and perturb each point.
fn direct_path<R: Rng>(
    rng: &mut R,
    start: &GeoPoint,
    target: &GeoPoint,
    count: usize,
) -> Vec<Waypoint> {
    let total = geo::haversine(start, target);
    let direct_bearing = geo::bearing(start, target);

    (0..count)
        .map(|i| {
            let fraction = (i + 1) as f64 / count as f64;
            let along = total * (fraction + rng.random_range(-ALONG_JITTER..=ALONG_JITTER));
            let lateral = total * rng.random_range(-LATERAL_JITTER..=LATERAL_JITTER);

            let on_line = geo::destination(start, direct_bearing, along);
            let adjusted = geo::destination(&on_line, direct_bearing + 90.0, lateral);

            // Stored geometry reflects the adjusted point, never the
            // idealized line.
            Waypoint {
                id: i as u32,
                lat: adjusted.lat,
                lng: adjusted.lng,
                distance_from_start: geo::haversine(start, &adjusted),
                bearing_from_start: geo::bearing(start, &adjusted),
                reached: false,
            }
        })
        .collect()
}

/// Bearing random-walk used when no real geometry is available:
/// an initial bearing in [-30, +30] degrees, a per-point delta in
/// [-20, +20], and a growing distance baseline of 100 + i*100 meters
/// with jitter.
fn synthetic_path<R: Rng>(rng: &mut R, origin: &GeoPoint, count: usize) -> Vec<Waypoint> {
    let mut heading: f64 = rng.random_range(-30.0..=30.0);

    (0..count)
        .map(|i| {
            if i > 0 {
                heading += rng.random_range(-20.0..=20.0);
            }
            let distance = 100.0 + 100.0 * i as f64 + rng.random_range(-20.0..=20.0);
            let bearing = geo::normalize_degrees(heading);
            let point = geo::destination(origin, bearing, distance);

            Waypoint {
                id: i as u32,
                lat: point.lat,
                lng: point.lng,
                distance_from_start: distance,
                bearing_from_start: bearing,
                reached: false,
            }
        })
        .collect()
}
