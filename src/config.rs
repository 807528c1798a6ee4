//! # Broker configuration.
//!
//! Provides [`BrokerConfig`] centralized settings for the arbitration broker.
//!
//! ## Sentinel values
//! - `max_devices = 0` → no devices are exposed even if a module is loaded
//! - `bus_capacity` / `dispatch_queue_capacity` are clamped to a minimum of 1

use std::path::PathBuf;
use std::time::Duration;

/// Paths of the feedback sounds shared by exclusive sessions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SoundAssets {
    /// Played when a still capture is taken.
    pub shutter: PathBuf,
    /// Played when video recording starts or stops.
    pub recording: PathBuf,
}

impl Default for SoundAssets {
    fn default() -> Self {
        Self {
            shutter: PathBuf::from("/system/media/audio/ui/camera_click.ogg"),
            recording: PathBuf::from("/system/media/audio/ui/VideoRecord.ogg"),
        }
    }
}

/// Global configuration for the broker.
///
/// ## Field semantics
/// - `max_devices`: upper bound on the device count reported by the module
/// - `sounds`: feedback sound assets loaded on first exclusive session
/// - `dump_lock_retries` / `dump_lock_sleep`: bounded wait for the table lock in dumps
/// - `bus_capacity`: event bus ring buffer size (min 1)
/// - `dispatch_queue_capacity`: pending requests accepted by the dispatcher (min 1)
/// - `service_pid`: process id the broker considers its own
/// - `access_disabled`: initial state of the process-wide access policy flag
#[derive(Clone, Debug)]
pub struct BrokerConfig {
    /// Maximum number of device slots.
    ///
    /// A module reporting more devices is clamped (and the mismatch logged).
    pub max_devices: usize,

    /// Feedback sound assets.
    pub sounds: SoundAssets,

    /// Attempts made to take the table lock before dumping in degraded mode.
    pub dump_lock_retries: u32,

    /// Sleep between two lock attempts.
    pub dump_lock_sleep: Duration,

    /// Capacity of the event bus broadcast channel.
    pub bus_capacity: usize,

    /// Capacity of the dispatcher request queue.
    ///
    /// When full, `DispatchHandle::try_call` fails with `Full`.
    pub dispatch_queue_capacity: usize,

    /// Process id of the service itself.
    ///
    /// Requests coming from this pid bypass the transport permission gate and
    /// may forward a client uid.
    pub service_pid: u32,

    /// Whether device access starts globally disabled.
    pub access_disabled: bool,
}

impl BrokerConfig {
    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }

    /// Returns a dispatcher queue capacity clamped to a minimum of 1.
    #[inline]
    pub fn dispatch_queue_capacity_clamped(&self) -> usize {
        self.dispatch_queue_capacity.max(1)
    }

    /// Total time a dump may wait for the table lock.
    #[inline]
    pub fn dump_lock_budget(&self) -> Duration {
        self.dump_lock_sleep * self.dump_lock_retries
    }
}

impl Default for BrokerConfig {
    /// Default configuration:
    ///
    /// - `max_devices = 2`
    /// - `dump_lock_retries = 50`, `dump_lock_sleep = 60ms` (3s budget)
    /// - `bus_capacity = 1024`, `dispatch_queue_capacity = 64`
    /// - `service_pid = std::process::id()`
    /// - `access_disabled = false`
    fn default() -> Self {
        Self {
            max_devices: 2,
            sounds: SoundAssets::default(),
            dump_lock_retries: 50,
            dump_lock_sleep: Duration::from_millis(60),
            bus_capacity: 1024,
            dispatch_queue_capacity: 64,
            service_pid: std::process::id(),
            access_disabled: false,
        }
    }
}
