//! Navigation session lifecycle.
//!
//! One session is one attempt at guiding the user to safety: it runs
//! the capability probe, sequences the permission flow, plans the
//! path, and drives the engine from the host's timers and event
//! streams. Ending the session releases every platform resource
//! deterministically; a leaked camera stream is a defect.

use std::time::Duration;

use log::{debug, info, warn};

use crate::capability::{self, CapabilityProfile, EnvironmentSnapshot};
use crate::engine::{
    NavigationConfig, NavigationEngine, NavigationEvent, NavigationMode, NavigationObserver,
    NavigationState,
};
use crate::geo::GeoPoint;
use crate::permission::{
    CameraAccess, CameraConstraints, CameraError, FullscreenControl, LocationAccess,
    LocationOptions, OrientationAccess, PermissionChannel, PermissionCoordinator,
    PermissionState,
};

/// The platform seams a host injects into a session.
pub struct SessionPlatform {
    pub camera: Box<dyn CameraAccess>,
    pub orientation: Box<dyn OrientationAccess>,
    pub location: Box<dyn LocationAccess>,
    pub fullscreen: Box<dyn FullscreenControl>,
}

/// A navigation session: capability profile, permission flow, and
/// the running engine.
pub struct NavigationSession {
    profile: CapabilityProfile,
    platform: SessionPlatform,
    coordinator: PermissionCoordinator,
    engine: NavigationEngine,
    observer: Option<Box<dyn NavigationObserver>>,
    target: Option<GeoPoint>,
    camera_constraints: CameraConstraints,
    location_options: LocationOptions,
    directions_visible: bool,
}

impl NavigationSession {
    /// Probe the environment and prepare a session toward `target`
    /// (None plans a synthetic route).
    pub fn new(
        env: &EnvironmentSnapshot,
        platform: SessionPlatform,
        target: Option<GeoPoint>,
        config: NavigationConfig,
    ) -> Self {
        let profile = capability::probe(env);
        match profile.incompatible_reason {
            None => info!("capability probe passed, AR mode available"),
            Some(reason) => info!("capability probe: {reason}, offering fallback"),
        }

        let location_options = LocationOptions {
            timeout: Duration::from_secs(config.location_timeout_secs),
            ..Default::default()
        };

        Self {
            profile,
            platform,
            coordinator: PermissionCoordinator::new(),
            engine: NavigationEngine::new(config),
            observer: None,
            target,
            camera_constraints: CameraConstraints::default(),
            location_options,
            directions_visible: true,
        }
    }

    pub fn profile(&self) -> &CapabilityProfile {
        &self.profile
    }

    pub fn permission(&self, channel: PermissionChannel) -> PermissionState {
        self.coordinator.state(channel)
    }

    pub fn mode(&self) -> NavigationMode {
        self.engine.mode()
    }

    /// Render-ready snapshot, the sole channel to the presentation
    /// layer.
    pub fn snapshot(&self) -> NavigationState {
        self.engine.snapshot()
    }

    pub fn set_observer(&mut self, observer: Box<dyn NavigationObserver>) {
        self.observer = Some(observer);
    }

    pub fn show_instructions(&mut self) {
        self.engine.show_instructions();
    }

    /// Run the full permission sequence and enter AR mode.
    ///
    /// Camera failure is fatal to AR and moves the engine to its
    /// error state. Orientation failure only degrades the compass;
    /// location failure degrades to simulated progression. Either
    /// way navigation starts.
    pub fn start_ar_navigation(&mut self) -> Result<(), CameraError> {
        self.engine.begin_permissions();

        if let Err(err) = self
            .coordinator
            .acquire_camera(&mut *self.platform.camera, &self.camera_constraints)
        {
            self.engine.fail(err.to_string());
            return Err(err);
        }

        if let Err(err) = self
            .coordinator
            .acquire_orientation(&mut *self.platform.orientation)
        {
            warn!("continuing without compass: {err}");
        }

        let start = match self
            .coordinator
            .acquire_location(&mut *self.platform.location, &self.location_options)
        {
            Ok(point) => Some(point),
            Err(err) => {
                warn!("continuing with simulated progression: {err}");
                None
            }
        };

        self.engine.enter_ar(start, self.target);
        Ok(())
    }

    /// Enter non-camera guidance: location if grantable, synthetic
    /// progression otherwise.
    pub fn start_fallback_navigation(&mut self) {
        self.coordinator.release_camera();
        self.engine.begin_permissions();

        let start = match self
            .coordinator
            .acquire_location(&mut *self.platform.location, &self.location_options)
        {
            Ok(point) => Some(point),
            Err(err) => {
                warn!("fallback without location: {err}");
                None
            }
        };

        self.engine.enter_fallback(start, self.target);
    }

    /// "Try Again" from the error state: back through the permission
    /// sequence into AR.
    pub fn retry_ar(&mut self) -> Result<(), CameraError> {
        self.engine.retry();
        self.start_ar_navigation()
    }

    /// Give up on the camera and continue in fallback mode. Keeps
    /// the current path and progress when one exists.
    pub fn demote_to_fallback(&mut self) {
        self.coordinator.release_camera();
        if self.engine.mode() == NavigationMode::Error {
            self.engine.demote();
        }
        if self.engine.snapshot().waypoints.is_empty() {
            self.start_fallback_navigation();
        }
    }

    /// Forward an orientation sample to the engine.
    pub fn handle_orientation(&mut self, heading_deg: f64) {
        self.engine.handle_orientation(heading_deg);
    }

    /// Forward a location sample to the engine and fire callbacks.
    pub fn handle_location(&mut self, point: GeoPoint) {
        let events = self.engine.handle_location(point);
        self.dispatch(events);
    }

    /// One location-poll tick, called by the host on its poll timer.
    /// A failed fetch degrades to a synthetic tick so the overlay
    /// keeps moving.
    pub fn poll_location(&mut self) {
        match self.platform.location.fetch(&self.location_options) {
            Ok(point) => self.handle_location(point),
            Err(err) => {
                debug!("location poll failed ({err}), advancing synthetically");
                self.synthetic_tick();
            }
        }
    }

    /// One synthetic progression tick.
    pub fn synthetic_tick(&mut self) {
        let events = self.engine.synthetic_tick();
        self.dispatch(events);
    }

    /// Regenerate the waypoint path and reset progress. Subscriptions
    /// and the camera stream are untouched.
    pub fn calibrate(&mut self) {
        self.engine.calibrate();
    }

    pub fn directions_visible(&self) -> bool {
        self.directions_visible
    }

    pub fn toggle_directions(&mut self) -> bool {
        self.directions_visible = !self.directions_visible;
        self.directions_visible
    }

    /// Toggle immersive display. Returns the resulting fullscreen
    /// state; unsupported platforms stay windowed and never block
    /// navigation.
    pub fn toggle_fullscreen(&mut self) -> bool {
        let fullscreen = &mut self.platform.fullscreen;
        if !fullscreen.supported() {
            return false;
        }
        if fullscreen.is_fullscreen() {
            fullscreen.exit();
            false
        } else {
            fullscreen.enter()
        }
    }

    /// Deterministic teardown: stop the camera stream and leave
    /// fullscreen. Safe to call more than once.
    pub fn end(&mut self) {
        self.coordinator.release_camera();
        if self.platform.fullscreen.is_fullscreen() {
            self.platform.fullscreen.exit();
        }
        info!("navigation session ended");
    }

    fn dispatch(&mut self, events: Vec<NavigationEvent>) {
        let Some(observer) = self.observer.as_mut() else {
            return;
        };
        for event in events {
            match event {
                NavigationEvent::WaypointReached(index) => observer.on_waypoint_reached(index),
                NavigationEvent::EvacuationComplete => observer.on_evacuation_complete(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    use crate::permission::LocationError;
    use crate::sim::{SimCamera, SimFullscreen, SimLocation, SimOrientation};

    fn android_env() -> EnvironmentSnapshot {
        EnvironmentSnapshot {
            user_agent: "Mozilla/5.0 (Linux; Android 14; Pixel 8) Mobile".to_string(),
            has_media_devices: true,
            has_device_orientation: true,
            has_accelerometer: true,
            max_touch_points: 5,
            has_geolocation: true,
            has_web_xr: false,
            has_fullscreen: true,
        }
    }

    fn platform(camera: SimCamera, location: SimLocation) -> SessionPlatform {
        SessionPlatform {
            camera: Box::new(camera),
            orientation: Box::new(SimOrientation::ungated()),
            location: Box::new(location),
            fullscreen: Box::new(SimFullscreen::new(true)),
        }
    }

    fn shelter() -> GeoPoint {
        GeoPoint::new(48.2172, 16.3738)
    }

    #[derive(Default)]
    struct RecordingObserver {
        reached: Rc<RefCell<Vec<usize>>>,
        completed: Rc<RefCell<bool>>,
    }

    impl NavigationObserver for RecordingObserver {
        fn on_waypoint_reached(&mut self, index: usize) {
            self.reached.borrow_mut().push(index);
        }

        fn on_evacuation_complete(&mut self) {
            *self.completed.borrow_mut() = true;
        }
    }

    #[test]
    fn ar_happy_path_grants_all_channels() {
        let camera = SimCamera::new();
        let streams = camera.stream_counter();
        let start = GeoPoint::new(48.2082, 16.3738);
        let mut session = NavigationSession::new(
            &android_env(),
            platform(camera, SimLocation::fixed(start)),
            Some(shelter()),
            NavigationConfig::default(),
        );

        session.start_ar_navigation().unwrap();
        assert_eq!(session.mode(), NavigationMode::Ar);
        assert_eq!(session.permission(PermissionChannel::Camera), PermissionState::Granted);
        assert_eq!(session.permission(PermissionChannel::Location), PermissionState::Granted);
        assert_eq!(streams.get(), 1);

        let state = session.snapshot();
        assert_eq!(state.waypoints.len(), 5);
        assert_eq!(state.current_location, Some(start));

        session.end();
        assert_eq!(streams.get(), 0, "camera stream leaked past session end");
    }

    #[test]
    fn camera_denial_is_fatal_to_ar() {
        let camera = SimCamera::failing(crate::permission::CameraError::PermissionDenied);
        let mut session = NavigationSession::new(
            &android_env(),
            platform(camera, SimLocation::fixed(GeoPoint::new(48.2082, 16.3738))),
            Some(shelter()),
            NavigationConfig::default(),
        );

        let err = session.start_ar_navigation().unwrap_err();
        assert_eq!(session.mode(), NavigationMode::Error);
        assert_eq!(
            session.snapshot().error.as_deref(),
            Some("Camera access was denied. Please check your browser permissions.")
        );
        assert_eq!(
            err.to_string(),
            "Camera access was denied. Please check your browser permissions."
        );
    }

    #[test]
    fn demotion_after_camera_denial_still_navigates() {
        let camera = SimCamera::failing(crate::permission::CameraError::NoDevice);
        let mut session = NavigationSession::new(
            &android_env(),
            platform(camera, SimLocation::fixed(GeoPoint::new(48.2082, 16.3738))),
            Some(shelter()),
            NavigationConfig::default(),
        );

        let _ = session.start_ar_navigation();
        session.demote_to_fallback();
        assert_eq!(session.mode(), NavigationMode::Fallback);
        assert_eq!(session.snapshot().waypoints.len(), 5);
    }

    #[test]
    fn orientation_denial_degrades_but_does_not_block() {
        let mut platform = platform(
            SimCamera::new(),
            SimLocation::fixed(GeoPoint::new(48.2082, 16.3738)),
        );
        platform.orientation = Box::new(SimOrientation::gated(false));
        let mut session = NavigationSession::new(
            &android_env(),
            platform,
            Some(shelter()),
            NavigationConfig::default(),
        );

        session.start_ar_navigation().unwrap();
        assert_eq!(session.mode(), NavigationMode::Ar);
        assert_eq!(
            session.permission(PermissionChannel::Orientation),
            PermissionState::Denied
        );
    }

    #[test]
    fn location_denial_degrades_to_simulated_progression() {
        let mut session = NavigationSession::new(
            &android_env(),
            platform(
                SimCamera::new(),
                SimLocation::failing(LocationError::PermissionDenied),
            ),
            Some(shelter()),
            NavigationConfig::default(),
        );

        session.start_ar_navigation().unwrap();
        assert_eq!(session.mode(), NavigationMode::Ar);
        assert!(session.snapshot().current_location.is_none());

        // Poll timer keeps the overlay moving through synthetic ticks.
        let before = session.snapshot().evacuation_progress;
        session.poll_location();
        session.poll_location();
        assert!(session.snapshot().evacuation_progress > before);
    }

    #[test]
    fn observer_receives_waypoint_and_completion_events() {
        let observer = RecordingObserver::default();
        let reached = Rc::clone(&observer.reached);
        let completed = Rc::clone(&observer.completed);

        let mut session = NavigationSession::new(
            &android_env(),
            platform(SimCamera::new(), SimLocation::empty()),
            None,
            NavigationConfig::default(),
        );
        session.set_observer(Box::new(observer));
        session.start_fallback_navigation();

        for _ in 0..60 {
            session.synthetic_tick();
        }

        assert_eq!(*reached.borrow(), vec![0, 1, 2, 3, 4]);
        assert!(*completed.borrow());
        assert_eq!(session.mode(), NavigationMode::Complete);
    }

    #[test]
    fn retry_after_error_reruns_permission_flow() {
        // First attempt: busy camera. The sim camera keeps failing,
        // so retry lands back in the error state with the same fixed
        // message, but the flow itself went through permissions.
        let camera = SimCamera::failing(crate::permission::CameraError::DeviceBusy);
        let mut session = NavigationSession::new(
            &android_env(),
            platform(camera, SimLocation::fixed(GeoPoint::new(48.2082, 16.3738))),
            Some(shelter()),
            NavigationConfig::default(),
        );

        let _ = session.start_ar_navigation();
        assert_eq!(session.mode(), NavigationMode::Error);

        let err = session.retry_ar().unwrap_err();
        assert_eq!(
            err.to_string(),
            "The camera is already in use by another application."
        );
        assert_eq!(session.mode(), NavigationMode::Error);
    }

    #[test]
    fn calibrate_resets_progress_mid_session() {
        let start = GeoPoint::new(48.2082, 16.3738);
        let mut session = NavigationSession::new(
            &android_env(),
            platform(SimCamera::new(), SimLocation::fixed(start)),
            Some(shelter()),
            NavigationConfig::default(),
        );
        session.start_ar_navigation().unwrap();

        let first = session.snapshot().waypoints[0].clone();
        session.handle_location(GeoPoint::new(first.lat, first.lng));
        assert_eq!(session.snapshot().current_waypoint_index, 1);

        session.calibrate();
        let state = session.snapshot();
        assert_eq!(state.current_waypoint_index, 0);
        assert!(state.waypoints.iter().all(|wp| !wp.reached));
    }

    #[test]
    fn directions_and_fullscreen_toggles() {
        let mut session = NavigationSession::new(
            &android_env(),
            platform(SimCamera::new(), SimLocation::empty()),
            None,
            NavigationConfig::default(),
        );

        assert!(session.directions_visible());
        assert!(!session.toggle_directions());
        assert!(session.toggle_directions());

        assert!(session.toggle_fullscreen());
        assert!(!session.toggle_fullscreen());
    }

    #[test]
    fn fullscreen_unsupported_is_non_blocking() {
        let mut platform = platform(SimCamera::new(), SimLocation::empty());
        platform.fullscreen = Box::new(SimFullscreen::new(false));
        let mut session = NavigationSession::new(
            &android_env(),
            platform,
            None,
            NavigationConfig::default(),
        );

        assert!(!session.toggle_fullscreen());
        session.start_fallback_navigation();
        assert_eq!(session.mode(), NavigationMode::Fallback);
    }

    #[test]
    fn incompatible_environment_still_offers_fallback() {
        let env = EnvironmentSnapshot {
            user_agent: "Mozilla/5.0 (X11; Linux x86_64)".to_string(),
            has_media_devices: false,
            ..Default::default()
        };
        let mut session = NavigationSession::new(
            &env,
            platform(SimCamera::new(), SimLocation::empty()),
            Some(shelter()),
            NavigationConfig::default(),
        );

        assert!(!session.profile().compatible);
        assert_eq!(
            session.profile().incompatible_reason,
            Some("Camera access not available")
        );

        session.start_fallback_navigation();
        assert_eq!(session.mode(), NavigationMode::Fallback);
    }
}
