//! Runtime capability probing.
//!
//! Classifies the host environment into an immutable capability
//! profile once per navigation session. The probe is a pure function
//! of the facts the host reports; it makes no platform calls and is
//! never re-run or polled.

use serde::{Deserialize, Serialize};

/// Raw environment facts reported by the host platform.
///
/// A browser host fills this from its global objects (user agent,
/// media-capture and orientation API presence, touch point count);
/// a simulator fills it directly.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnvironmentSnapshot {
    /// Full user-agent string, used for mobile/OS classification.
    pub user_agent: String,
    /// A media-capture API is present.
    pub has_media_devices: bool,
    /// A device-orientation event type is present.
    pub has_device_orientation: bool,
    /// A device-motion/accelerometer event type is present.
    pub has_accelerometer: bool,
    /// Number of touch points the input surface reports.
    pub max_touch_points: u32,
    /// A geolocation API is present.
    pub has_geolocation: bool,
    /// An immersive WebXR runtime is present.
    pub has_web_xr: bool,
    /// A fullscreen request API is present.
    pub has_fullscreen: bool,
}

/// Incompatibility causes, in fixed priority order. First match wins.
pub const REASON_NO_CAMERA: &str = "Camera access not available";
pub const REASON_NOT_MOBILE: &str = "AR navigation requires a mobile device";
pub const REASON_NO_MOTION: &str = "Motion sensors not available";
pub const REASON_NO_TOUCH: &str = "Touchscreen not available";
pub const REASON_UNKNOWN: &str = "Device is not compatible with AR navigation";

/// Immutable snapshot of what the runtime supports.
///
/// Created once per navigation session by [`probe`]; never mutated.
#[derive(Debug, Clone, Serialize)]
pub struct CapabilityProfile {
    pub camera: bool,
    pub device_orientation: bool,
    pub accelerometer: bool,
    pub touchscreen: bool,
    pub web_xr: bool,
    pub geolocation: bool,
    pub is_mobile: bool,
    pub is_ios: bool,
    pub is_android: bool,
    pub fullscreen_supported: bool,
    /// True iff the environment can host a believable AR overlay.
    pub compatible: bool,
    /// The single highest-priority cause when `compatible` is false.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub incompatible_reason: Option<&'static str>,
}

/// Inspect the environment and derive the capability profile.
///
/// `compatible` requires a camera, a mobile device, at least one
/// motion sensor, and a touchscreen. Camera-less or desktop
/// environments get a non-camera fallback mode instead of an error,
/// so the verdict only steers mode selection.
pub fn probe(env: &EnvironmentSnapshot) -> CapabilityProfile {
    let ua = env.user_agent.to_ascii_lowercase();

    let is_ios = ["iphone", "ipad", "ipod"].iter().any(|m| ua.contains(m));
    let is_android = ua.contains("android");
    let is_mobile = is_ios
        || is_android
        || ua.contains("mobile")
        || ua.contains("webos")
        || ua.contains("blackberry");

    let camera = env.has_media_devices;
    let motion = env.has_device_orientation || env.has_accelerometer;
    let touchscreen = env.max_touch_points > 0;

    let compatible = camera && is_mobile && motion && touchscreen;
    let incompatible_reason = if compatible {
        None
    } else if !camera {
        Some(REASON_NO_CAMERA)
    } else if !is_mobile {
        Some(REASON_NOT_MOBILE)
    } else if !motion {
        Some(REASON_NO_MOTION)
    } else if !touchscreen {
        Some(REASON_NO_TOUCH)
    } else {
        Some(REASON_UNKNOWN)
    };

    CapabilityProfile {
        camera,
        device_orientation: env.has_device_orientation,
        accelerometer: env.has_accelerometer,
        touchscreen,
        web_xr: env.has_web_xr,
        geolocation: env.has_geolocation,
        is_mobile,
        is_ios,
        is_android,
        fullscreen_supported: env.has_fullscreen,
        compatible,
        incompatible_reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ANDROID_UA: &str =
        "Mozilla/5.0 (Linux; Android 14; Pixel 8) AppleWebKit/537.36 Mobile Safari/537.36";
    const IPHONE_UA: &str =
        "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15";
    const DESKTOP_UA: &str =
        "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 Chrome/120.0 Safari/537.36";

    fn full_mobile_env() -> EnvironmentSnapshot {
        EnvironmentSnapshot {
            user_agent: ANDROID_UA.to_string(),
            has_media_devices: true,
            has_device_orientation: true,
            has_accelerometer: true,
            max_touch_points: 5,
            has_geolocation: true,
            has_web_xr: false,
            has_fullscreen: true,
        }
    }

    #[test]
    fn full_mobile_environment_is_compatible() {
        let profile = probe(&full_mobile_env());
        assert!(profile.compatible);
        assert!(profile.incompatible_reason.is_none());
        assert!(profile.is_android);
        assert!(!profile.is_ios);
    }

    #[test]
    fn desktop_without_camera_reports_camera_first() {
        // Camera is the highest-priority cause even though the
        // environment also fails the mobile check.
        let env = EnvironmentSnapshot {
            user_agent: DESKTOP_UA.to_string(),
            has_media_devices: false,
            max_touch_points: 0,
            ..Default::default()
        };
        let profile = probe(&env);
        assert!(!profile.compatible);
        assert_eq!(profile.incompatible_reason, Some(REASON_NO_CAMERA));
    }

    #[test]
    fn desktop_with_camera_reports_mobile() {
        let env = EnvironmentSnapshot {
            user_agent: DESKTOP_UA.to_string(),
            has_media_devices: true,
            has_device_orientation: true,
            max_touch_points: 0,
            ..Default::default()
        };
        let profile = probe(&env);
        assert_eq!(profile.incompatible_reason, Some(REASON_NOT_MOBILE));
    }

    #[test]
    fn mobile_without_motion_sensors() {
        let mut env = full_mobile_env();
        env.has_device_orientation = false;
        env.has_accelerometer = false;
        let profile = probe(&env);
        assert_eq!(profile.incompatible_reason, Some(REASON_NO_MOTION));
    }

    #[test]
    fn mobile_without_touchscreen() {
        let mut env = full_mobile_env();
        env.max_touch_points = 0;
        let profile = probe(&env);
        assert_eq!(profile.incompatible_reason, Some(REASON_NO_TOUCH));
    }

    #[test]
    fn accelerometer_alone_satisfies_motion_check() {
        let mut env = full_mobile_env();
        env.has_device_orientation = false;
        let profile = probe(&env);
        assert!(profile.compatible);
    }

    #[test]
    fn ios_detection() {
        let mut env = full_mobile_env();
        env.user_agent = IPHONE_UA.to_string();
        let profile = probe(&env);
        assert!(profile.is_ios);
        assert!(!profile.is_android);
        assert!(profile.is_mobile);
    }

    #[test]
    fn profile_serializes_without_reason_when_compatible() {
        let profile = probe(&full_mobile_env());
        let json = serde_json::to_string(&profile).unwrap();
        assert!(!json.contains("incompatible_reason"));
        assert!(json.contains("\"compatible\":true"));
    }
}
