//! # Device module interface.
//!
//! The device module opens, configures and streams physical cameras. The broker
//! only needs its identity, the device count, static per-device information,
//! and an open/close handshake.
//!
//! ## Version resolution
//! ```text
//! module api < 2.0            ─► every device is Legacy (1.0)
//! module api ≥ 2.0, dev 1.0   ─► Legacy
//! module api ≥ 2.0, dev 2.x   ─► Advanced
//! anything else               ─► unknown (None)
//! ```

use crate::error::ModuleError;

/// Opaque value handed to the module at open time.
///
/// Driver callbacks pass it back to resolve the owning session through
/// [`instance::session_for_cookie`](crate::instance::session_for_cookie).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DeviceCookie(pub usize);

impl DeviceCookie {
    /// Device slot index encoded in this cookie.
    #[inline]
    pub fn device(self) -> usize {
        self.0
    }
}

/// Asynchronous notification raised by an open device.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceNotification {
    /// A still capture was taken.
    Shutter,
    /// Video recording started.
    RecordingStarted,
    /// Video recording stopped.
    RecordingStopped,
    /// The device failed; the code is forwarded to the client.
    Error(i32),
}

/// Module or device API version, encoded as `0xMMmm`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ApiVersion(pub u32);

impl ApiVersion {
    /// Version 1.0.
    pub const V1_0: ApiVersion = ApiVersion(0x100);
    /// Version 2.0.
    pub const V2_0: ApiVersion = ApiVersion(0x200);
    /// Version 2.1.
    pub const V2_1: ApiVersion = ApiVersion(0x201);
}

/// Which way a camera points.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Facing {
    /// Facing away from the screen.
    Back,
    /// Facing the user.
    Front,
}

/// Identity of the loaded device module.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModuleInfo {
    /// Module name.
    pub name: String,
    /// Module author.
    pub author: String,
    /// Module API version; decides how device versions are interpreted.
    pub module_api_version: ApiVersion,
    /// Hardware abstraction API version.
    pub hal_api_version: ApiVersion,
}

impl ModuleInfo {
    /// Resolves the abstract device API for a device of this module.
    pub fn device_api(&self, info: &DeviceInfo) -> Option<DeviceApi> {
        if self.module_api_version < ApiVersion::V2_0 {
            return Some(DeviceApi::Legacy);
        }
        DeviceApi::from_version(info.device_version)
    }

    /// Device version as reported in dumps (legacy modules always report 1.0).
    pub fn effective_device_version(&self, info: &DeviceInfo) -> ApiVersion {
        if self.module_api_version < ApiVersion::V2_0 {
            ApiVersion::V1_0
        } else {
            info.device_version
        }
    }
}

/// Static information about one device.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Camera facing.
    pub facing: Facing,
    /// Clockwise rotation of the sensor image, in degrees.
    pub orientation: i32,
    /// Device API version (only meaningful for modules ≥ 2.0).
    pub device_version: ApiVersion,
    /// Opaque static characteristics, rendered as-is by the dump.
    pub static_metadata: Vec<(String, String)>,
}

/// Abstract device API a session is constructed for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceApi {
    /// Version 1 devices: exclusive sessions only.
    Legacy,
    /// Version 2 devices: exclusive and shared sessions.
    Advanced,
}

impl DeviceApi {
    /// Maps a raw device version to an API, `None` if unknown.
    pub fn from_version(version: ApiVersion) -> Option<DeviceApi> {
        match version {
            ApiVersion::V1_0 => Some(DeviceApi::Legacy),
            ApiVersion::V2_0 | ApiVersion::V2_1 => Some(DeviceApi::Advanced),
            _ => None,
        }
    }

    /// True if shared sessions may attach to devices of this API.
    #[inline]
    pub fn supports_shared(self) -> bool {
        matches!(self, DeviceApi::Advanced)
    }
}

/// Hardware module driving the physical devices.
///
/// Every method may block on I/O; the broker never calls them while holding
/// its table lock, except for the cheap `device_info` lookup during connect.
pub trait DeviceModule: Send + Sync + 'static {
    /// Identity of the module.
    fn module_info(&self) -> ModuleInfo;

    /// Number of devices the module exposes.
    fn device_count(&self) -> usize;

    /// Static information about a device.
    fn device_info(&self, index: usize) -> Result<DeviceInfo, ModuleError>;

    /// Opens a device for an exclusive session.
    fn open_device(
        &self,
        index: usize,
        api: DeviceApi,
        cookie: DeviceCookie,
    ) -> Result<(), ModuleError>;

    /// Releases a device previously opened with [`DeviceModule::open_device`].
    fn close_device(&self, index: usize);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(version: ApiVersion) -> DeviceInfo {
        DeviceInfo {
            facing: Facing::Back,
            orientation: 90,
            device_version: version,
            static_metadata: Vec::new(),
        }
    }

    fn module(api: ApiVersion) -> ModuleInfo {
        ModuleInfo {
            name: "fake".into(),
            author: "tests".into(),
            module_api_version: api,
            hal_api_version: ApiVersion::V1_0,
        }
    }

    #[test]
    fn legacy_module_forces_legacy_devices() {
        let m = module(ApiVersion::V1_0);
        assert_eq!(m.device_api(&info(ApiVersion::V2_1)), Some(DeviceApi::Legacy));
        assert_eq!(m.effective_device_version(&info(ApiVersion::V2_1)), ApiVersion::V1_0);
    }

    #[test]
    fn modern_module_uses_device_version() {
        let m = module(ApiVersion::V2_0);
        assert_eq!(m.device_api(&info(ApiVersion::V1_0)), Some(DeviceApi::Legacy));
        assert_eq!(m.device_api(&info(ApiVersion::V2_0)), Some(DeviceApi::Advanced));
        assert_eq!(m.device_api(&info(ApiVersion::V2_1)), Some(DeviceApi::Advanced));
        assert_eq!(m.device_api(&info(ApiVersion(0x300))), None);
    }

    #[test]
    fn only_advanced_supports_shared() {
        assert!(DeviceApi::Advanced.supports_shared());
        assert!(!DeviceApi::Legacy.supports_shared());
    }
}
