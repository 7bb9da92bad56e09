//! Permission acquisition.
//!
//! Sequences camera, orientation, and location access through the
//! platform seams and records a per-channel grant state. Every
//! platform failure code maps to exactly one fixed user-facing
//! message; unknown codes are wrapped with their raw detail. Nothing
//! in this module retries on its own; retry is always an explicit
//! caller decision.

use std::time::Duration;

use log::warn;
use serde::Serialize;
use thiserror::Error;

use crate::geo::GeoPoint;

/// Acquisition channels tracked by the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionChannel {
    Camera,
    Orientation,
    Location,
}

/// Grant state of one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionState {
    #[default]
    Pending,
    Granted,
    Denied,
}

/// Preferred camera facing direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraFacing {
    /// Rear-facing camera, the one pointed at the world.
    Environment,
    User,
}

/// Camera stream constraints negotiated at acquisition time.
///
/// `None` fields carry no preference. The coordinator relaxes the
/// constraints step by step when the device rejects them.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraConstraints {
    pub facing: Option<CameraFacing>,
    /// Target resolution hint (width, height).
    pub resolution: Option<(u32, u32)>,
}

impl Default for CameraConstraints {
    fn default() -> Self {
        Self {
            facing: Some(CameraFacing::Environment),
            resolution: Some((1280, 720)),
        }
    }
}

/// Camera acquisition failure. One fixed message per platform code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CameraError {
    #[error("Camera access was denied. Please check your browser permissions.")]
    PermissionDenied,
    #[error("No camera was found on this device.")]
    NoDevice,
    #[error("The camera is already in use by another application.")]
    DeviceBusy,
    #[error("The camera does not support the required settings.")]
    Overconstrained,
    #[error("Camera access is blocked. AR navigation requires a secure (HTTPS) connection.")]
    Security,
    #[error("Camera access was interrupted.")]
    Aborted,
    #[error("Could not start the camera: {0}")]
    Other(String),
}

impl CameraError {
    /// Map a raw platform error code (DOMException-style name) to its
    /// fixed message. Unknown codes are wrapped verbatim.
    pub fn from_platform_code(code: &str, detail: &str) -> Self {
        match code {
            "NotAllowedError" | "PermissionDeniedError" => Self::PermissionDenied,
            "NotFoundError" | "DevicesNotFoundError" => Self::NoDevice,
            "NotReadableError" | "TrackStartError" => Self::DeviceBusy,
            "OverconstrainedError" | "ConstraintNotSatisfiedError" => Self::Overconstrained,
            "SecurityError" => Self::Security,
            "AbortError" => Self::Aborted,
            _ => Self::Other(format!("{code}: {detail}")),
        }
    }
}

/// Orientation consent failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrientationError {
    #[error("Compass access was denied. The arrow will not follow device rotation.")]
    ConsentDenied,
    #[error("Device orientation is not available: {0}")]
    Unavailable(String),
}

/// Location fetch failure. One fixed message per platform code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocationError {
    #[error("Location access was denied. Please check your browser permissions.")]
    PermissionDenied,
    #[error("Your location could not be determined.")]
    Unavailable,
    #[error("Timed out waiting for a location fix.")]
    Timeout,
    #[error("Could not read your location: {0}")]
    Other(String),
}

impl LocationError {
    /// Map a numeric platform error code (1 = permission denied,
    /// 2 = position unavailable, 3 = timeout) to its fixed message.
    pub fn from_platform_code(code: u16, detail: &str) -> Self {
        match code {
            1 => Self::PermissionDenied,
            2 => Self::Unavailable,
            3 => Self::Timeout,
            _ => Self::Other(format!("code {code}: {detail}")),
        }
    }
}

/// Options for a one-shot location fetch.
#[derive(Debug, Clone)]
pub struct LocationOptions {
    /// Bound on the fetch; the platform must fail with
    /// [`LocationError::Timeout`] rather than hang past this.
    pub timeout: Duration,
    pub high_accuracy: bool,
    /// Accept a cached fix no older than this.
    pub max_age: Duration,
}

impl Default for LocationOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            high_accuracy: true,
            max_age: Duration::ZERO,
        }
    }
}

/// Host-implemented camera acquisition.
pub trait CameraAccess {
    fn open(&mut self, constraints: &CameraConstraints)
        -> Result<Box<dyn CameraStream>, CameraError>;
}

/// A live camera stream.
///
/// Exclusively owned by the active navigation session; `stop` must
/// release every track. Two overlapping live acquisitions are never
/// allowed.
pub trait CameraStream {
    fn stop(&mut self);
    fn is_active(&self) -> bool;
}

/// Host-implemented device-orientation consent.
pub trait OrientationAccess {
    /// Whether this platform gates orientation events behind an
    /// explicit consent prompt (iOS does, most others do not).
    fn requires_consent(&self) -> bool;
    /// Prompt for consent. Only called when [`requires_consent`]
    /// returns true.
    ///
    /// [`requires_consent`]: OrientationAccess::requires_consent
    fn request_consent(&mut self) -> Result<(), OrientationError>;
}

/// Host-implemented one-shot location fetch.
pub trait LocationAccess {
    fn fetch(&mut self, options: &LocationOptions) -> Result<GeoPoint, LocationError>;
}

/// Host-implemented fullscreen control. Optional: absence never
/// blocks navigation.
pub trait FullscreenControl {
    fn supported(&self) -> bool;
    /// Returns false when the request was rejected or unsupported.
    fn enter(&mut self) -> bool;
    fn exit(&mut self);
    fn is_fullscreen(&self) -> bool;
}

/// Sequences permission acquisition and owns the live camera stream.
#[derive(Default)]
pub struct PermissionCoordinator {
    camera: PermissionState,
    orientation: PermissionState,
    location: PermissionState,
    stream: Option<Box<dyn CameraStream>>,
}

impl PermissionCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, channel: PermissionChannel) -> PermissionState {
        match channel {
            PermissionChannel::Camera => self.camera,
            PermissionChannel::Orientation => self.orientation,
            PermissionChannel::Location => self.location,
        }
    }

    pub fn has_live_stream(&self) -> bool {
        self.stream.as_ref().is_some_and(|s| s.is_active())
    }

    /// Acquire the camera, relaxing constraints when the device
    /// rejects them: first drop the facing preference, then the
    /// resolution hint. Any other failure is definitive.
    ///
    /// A previous stream, if any, is released before the new attempt.
    pub fn acquire_camera(
        &mut self,
        access: &mut dyn CameraAccess,
        constraints: &CameraConstraints,
    ) -> Result<(), CameraError> {
        self.release_camera();

        let mut attempt = constraints.clone();
        loop {
            match access.open(&attempt) {
                Ok(stream) => {
                    self.stream = Some(stream);
                    self.camera = PermissionState::Granted;
                    return Ok(());
                }
                Err(CameraError::Overconstrained) if attempt.facing.is_some() => {
                    warn!("camera rejected facing preference, retrying without it");
                    attempt.facing = None;
                }
                Err(CameraError::Overconstrained) if attempt.resolution.is_some() => {
                    warn!("camera rejected resolution hint, retrying without it");
                    attempt.resolution = None;
                }
                Err(err) => {
                    warn!("camera acquisition failed: {err}");
                    self.camera = PermissionState::Denied;
                    return Err(err);
                }
            }
        }
    }

    /// Acquire orientation events. Platforms without a consent gate
    /// succeed immediately and never prompt.
    pub fn acquire_orientation(
        &mut self,
        access: &mut dyn OrientationAccess,
    ) -> Result<(), OrientationError> {
        if !access.requires_consent() {
            self.orientation = PermissionState::Granted;
            return Ok(());
        }
        match access.request_consent() {
            Ok(()) => {
                self.orientation = PermissionState::Granted;
                Ok(())
            }
            Err(err) => {
                warn!("orientation consent failed: {err}");
                self.orientation = PermissionState::Denied;
                Err(err)
            }
        }
    }

    /// Fetch an initial location fix within the configured timeout.
    pub fn acquire_location(
        &mut self,
        access: &mut dyn LocationAccess,
        options: &LocationOptions,
    ) -> Result<GeoPoint, LocationError> {
        match access.fetch(options) {
            Ok(point) => {
                self.location = PermissionState::Granted;
                Ok(point)
            }
            Err(err) => {
                warn!("location fetch failed: {err}");
                self.location = PermissionState::Denied;
                Err(err)
            }
        }
    }

    /// Stop and drop the live camera stream, if any.
    pub fn release_camera(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.stop();
        }
    }
}

impl Drop for PermissionCoordinator {
    fn drop(&mut self) {
        self.release_camera();
    }
}
