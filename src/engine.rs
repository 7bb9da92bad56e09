//! Navigation engine.
//!
//! The long-lived guidance loop behind the AR overlay. It consumes
//! compass and location samples, derives a render-ready snapshot
//! (arrow rotation, distance display, evacuation progress), and
//! advances waypoints as the user closes on them.
//!
//! The engine is single-threaded and event-driven. Each sample type
//! touches its own slice of the state: orientation samples only move
//! the heading, location samples move location, progress, and
//! waypoints. Rendering reads snapshots and never mutates anything.
//! When no real fix is available at all, progress still advances on
//! synthetic ticks so the overlay stays animated.

use log::{debug, info, warn};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::geo::{self, GeoPoint};
use crate::planner::{self, Waypoint};

/// Engine operating mode.
///
/// `Ar` and `Fallback` are the two operating states for the duration
/// of a session. `Error` is reachable from `Ar` after a prior success
/// (for example a stream interruption) and offers retry back to
/// `Permissions` or demotion to `Fallback`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NavigationMode {
    Initializing,
    Instructions,
    Permissions,
    Ar,
    Fallback,
    Error,
    Complete,
}

/// Tunable engine parameters.
///
/// Field defaults match the demo product values; hosts override
/// individual fields as needed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NavigationConfig {
    /// Radius around a waypoint that counts as reaching it, meters.
    pub proximity_threshold_m: f64,
    /// Cadence of the host's location poll timer, seconds.
    pub location_poll_interval_secs: u64,
    /// Bound on the initial location fetch, seconds.
    pub location_timeout_secs: u64,
    /// Number of waypoints per planned path.
    pub waypoint_count: usize,
    /// Progress percent added per synthetic tick when no real fix is
    /// available.
    pub synthetic_progress_step: f64,
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            proximity_threshold_m: 20.0,
            location_poll_interval_secs: 3,
            location_timeout_secs: 10,
            waypoint_count: planner::DEFAULT_WAYPOINT_COUNT,
            synthetic_progress_step: 2.0,
        }
    }
}

/// Notification fired as a side effect of a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationEvent {
    /// The waypoint at this index was just reached. Hosts show a
    /// transient banner and dismiss it after a few seconds.
    WaypointReached(usize),
    /// The final waypoint was reached.
    EvacuationComplete,
}

/// Host callbacks for engine notifications.
pub trait NavigationObserver {
    fn on_waypoint_reached(&mut self, _index: usize) {}
    fn on_evacuation_complete(&mut self) {}
}

/// The externally observable engine snapshot, recomputed per tick.
/// Sole channel between the engine and the presentation layer.
#[derive(Debug, Clone, Serialize)]
pub struct NavigationState {
    pub mode: NavigationMode,
    /// Raw device heading, degrees [0, 360). No smoothing applied.
    pub compass_heading: f64,
    pub current_location: Option<GeoPoint>,
    pub distance_to_target: Option<f64>,
    /// Display form of `distance_to_target`.
    pub distance_display: Option<String>,
    pub target_bearing: Option<f64>,
    /// Percent toward the safety target, clamped to [0, 100].
    pub evacuation_progress: f64,
    pub waypoints: Vec<Waypoint>,
    pub current_waypoint_index: usize,
    /// Rotation for the on-screen arrow so it points at the target
    /// regardless of device facing, degrees [0, 360).
    pub arrow_rotation: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl NavigationState {
    /// Snapshot as JSON, for hosts that consume the state across a
    /// language boundary.
    pub fn to_json(&self) -> Result<String, String> {
        serde_json::to_string(self).map_err(|e| format!("JSON serialize error: {e}"))
    }
}

/// The guidance state machine.
pub struct NavigationEngine {
    config: NavigationConfig,
    mode: NavigationMode,
    compass_heading: f64,
    current_location: Option<GeoPoint>,
    start: Option<GeoPoint>,
    target: Option<GeoPoint>,
    distance_to_target: Option<f64>,
    target_bearing: Option<f64>,
    evacuation_progress: f64,
    waypoints: Vec<Waypoint>,
    current_waypoint_index: usize,
    /// Distance to the target measured when the current path was
    /// planned. Progress is always computed against this fixed
    /// baseline, so moving away lowers the displayed percentage and
    /// recalibration re-baselines.
    progress_baseline_m: Option<f64>,
    error: Option<String>,
}

impl NavigationEngine {
    pub fn new(config: NavigationConfig) -> Self {
        Self {
            config,
            mode: NavigationMode::Initializing,
            compass_heading: 0.0,
            current_location: None,
            start: None,
            target: None,
            distance_to_target: None,
            target_bearing: None,
            evacuation_progress: 0.0,
            waypoints: Vec::new(),
            current_waypoint_index: 0,
            progress_baseline_m: None,
            error: None,
        }
    }

    pub fn mode(&self) -> NavigationMode {
        self.mode
    }

    pub fn config(&self) -> &NavigationConfig {
        &self.config
    }

    fn is_navigating(&self) -> bool {
        matches!(self.mode, NavigationMode::Ar | NavigationMode::Fallback)
    }

    /// Show the pre-navigation instructions screen.
    pub fn show_instructions(&mut self) {
        if self.mode == NavigationMode::Initializing {
            self.mode = NavigationMode::Instructions;
        }
    }

    /// Enter the permission flow.
    pub fn begin_permissions(&mut self) {
        self.error = None;
        self.mode = NavigationMode::Permissions;
    }

    /// Start AR guidance with a freshly planned path.
    pub fn enter_ar(&mut self, start: Option<GeoPoint>, target: Option<GeoPoint>) {
        self.enter_ar_with_rng(&mut rand::rng(), start, target);
    }

    pub fn enter_ar_with_rng<R: Rng>(
        &mut self,
        rng: &mut R,
        start: Option<GeoPoint>,
        target: Option<GeoPoint>,
    ) {
        self.begin_session(rng, NavigationMode::Ar, start, target);
    }

    /// Start non-camera guidance with a freshly planned path.
    pub fn enter_fallback(&mut self, start: Option<GeoPoint>, target: Option<GeoPoint>) {
        self.enter_fallback_with_rng(&mut rand::rng(), start, target);
    }

    pub fn enter_fallback_with_rng<R: Rng>(
        &mut self,
        rng: &mut R,
        start: Option<GeoPoint>,
        target: Option<GeoPoint>,
    ) {
        self.begin_session(rng, NavigationMode::Fallback, start, target);
    }

    fn begin_session<R: Rng>(
        &mut self,
        rng: &mut R,
        mode: NavigationMode,
        start: Option<GeoPoint>,
        target: Option<GeoPoint>,
    ) {
        self.start = start;
        self.target = target;
        self.current_location = start;
        self.error = None;
        self.mode = mode;
        self.plan_path(rng);
        info!(
            "navigation started: mode={mode:?}, {} waypoints",
            self.waypoints.len()
        );
    }

    /// Regenerate the waypoint path with the same endpoints and reset
    /// progress. Does not touch any subscription; the session keeps
    /// running.
    pub fn calibrate(&mut self) {
        self.calibrate_with_rng(&mut rand::rng());
    }

    pub fn calibrate_with_rng<R: Rng>(&mut self, rng: &mut R) {
        if !self.is_navigating() {
            return;
        }
        self.plan_path(rng);
        info!("path recalibrated: {} waypoints", self.waypoints.len());
    }

    fn plan_path<R: Rng>(&mut self, rng: &mut R) {
        self.waypoints =
            planner::plan_with_rng(rng, self.start, self.target, self.config.waypoint_count);
        self.current_waypoint_index = 0;
        self.evacuation_progress = 0.0;
        self.progress_baseline_m = match (self.start, self.target) {
            (Some(s), Some(t)) => Some(geo::haversine(&s, &t)),
            _ => None,
        };
        self.distance_to_target = self.progress_baseline_m;
    }

    /// Record an orientation sample. Raw heading, no smoothing.
    pub fn handle_orientation(&mut self, heading_deg: f64) {
        if !heading_deg.is_finite() {
            return;
        }
        self.compass_heading = geo::normalize_degrees(heading_deg);
    }

    /// Record a location sample and run one guidance tick: distance
    /// and bearing to target, progress against the plan-time
    /// baseline, and waypoint advance within the proximity threshold.
    pub fn handle_location(&mut self, point: GeoPoint) -> Vec<NavigationEvent> {
        if !self.is_navigating() {
            return Vec::new();
        }
        if !point.is_valid() {
            warn!("ignoring invalid location sample: {point:?}");
            return Vec::new();
        }

        self.current_location = Some(point);

        if let Some(target) = self.target {
            let distance = geo::haversine(&point, &target);
            self.distance_to_target = Some(distance);
            self.target_bearing = Some(geo::bearing(&point, &target));

            if let Some(baseline) = self.progress_baseline_m {
                if baseline > 0.0 {
                    let progress = 100.0 * (1.0 - distance / baseline);
                    self.evacuation_progress = progress.clamp(0.0, 100.0);
                }
            }
        }

        self.advance_waypoint_if_close(&point)
    }

    /// Advance past the current waypoint when the fix is within the
    /// proximity threshold. At most one advance per tick.
    fn advance_waypoint_if_close(&mut self, point: &GeoPoint) -> Vec<NavigationEvent> {
        let Some(waypoint) = self.waypoints.get(self.current_waypoint_index) else {
            return Vec::new();
        };
        if waypoint.reached {
            return Vec::new();
        }
        let distance = geo::haversine(point, &waypoint.point());
        if distance >= self.config.proximity_threshold_m {
            return Vec::new();
        }
        self.mark_current_reached()
    }

    /// Mark the current waypoint reached and advance the index,
    /// completing the session on the final one.
    fn mark_current_reached(&mut self) -> Vec<NavigationEvent> {
        let index = self.current_waypoint_index;
        self.waypoints[index].reached = true;
        debug!("waypoint {index} reached");

        let mut events = vec![NavigationEvent::WaypointReached(index)];
        if index + 1 >= self.waypoints.len() {
            info!("evacuation complete");
            self.mode = NavigationMode::Complete;
            self.evacuation_progress = 100.0;
            events.push(NavigationEvent::EvacuationComplete);
        } else {
            self.current_waypoint_index = index + 1;
        }
        events
    }

    /// Advance guidance without a real fix. Progress grows by the
    /// configured step each tick and waypoints flip as their share of
    /// the path is covered, so the overlay stays animated under total
    /// sensor denial.
    pub fn synthetic_tick(&mut self) -> Vec<NavigationEvent> {
        if !self.is_navigating() || self.waypoints.is_empty() {
            return Vec::new();
        }

        self.evacuation_progress =
            (self.evacuation_progress + self.config.synthetic_progress_step).min(100.0);

        let share = 100.0 * (self.current_waypoint_index + 1) as f64 / self.waypoints.len() as f64;
        if self.evacuation_progress >= share {
            return self.mark_current_reached();
        }
        Vec::new()
    }

    /// Report a runtime failure (for example a stream interruption
    /// after a prior success). From here the user retries or demotes.
    pub fn fail(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!("navigation error: {message}");
        self.error = Some(message);
        self.mode = NavigationMode::Error;
    }

    /// Retry after an error: back to the permission flow.
    pub fn retry(&mut self) {
        if self.mode == NavigationMode::Error {
            self.begin_permissions();
        }
    }

    /// Demote after an error: continue without the camera. Keeps the
    /// current path and progress if one exists.
    pub fn demote(&mut self) {
        if self.mode == NavigationMode::Error {
            self.error = None;
            self.mode = NavigationMode::Fallback;
        }
    }

    /// Render-ready snapshot of the current state.
    pub fn snapshot(&self) -> NavigationState {
        let arrow_rotation = match self.target_bearing {
            Some(bearing) => geo::normalize_degrees(bearing - self.compass_heading),
            None => 0.0,
        };
        NavigationState {
            mode: self.mode,
            compass_heading: self.compass_heading,
            current_location: self.current_location,
            distance_to_target: self.distance_to_target,
            distance_display: self.distance_to_target.map(geo::format_distance),
            target_bearing: self.target_bearing,
            evacuation_progress: self.evacuation_progress,
            waypoints: self.waypoints.clone(),
            current_waypoint_index: self.current_waypoint_index,
            arrow_rotation,
            error: self.error.clone(),
        }
    }
}
