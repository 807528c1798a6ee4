//! # Diagnostic dump.
//!
//! Renders module identity, per-device static information and the state of
//! every attached session. Trailing `-v <level>` arguments change the runtime
//! verbosity.
//!
//! The table lock is taken with a bounded retry loop. If it cannot be taken the
//! dump still completes in degraded mode, showing only the lock-free busy flags.

use std::fmt::Write;
use std::thread;

use parking_lot::MutexGuard;

use crate::external::{CallerContext, DeviceApi, Facing, Permission};
use crate::session::Session;

use super::Broker;
use super::slot::Entry;

impl Broker {
    /// Writes a human-readable dump of the broker state.
    ///
    /// Requires [`Permission::Dump`]; otherwise only a denial line is returned.
    pub fn dump(&self, args: &[String], caller: CallerContext) -> String {
        let mut out = String::new();
        if !self.permissions.check_permission(Permission::Dump, caller) {
            let _ = writeln!(
                out,
                "Permission Denial: can't dump camvisor from pid={}, uid={}",
                caller.pid, caller.uid
            );
            return out;
        }

        // Sessions promoted while rendering are dropped after the lock.
        let mut alive: Vec<Session> = Vec::new();
        {
            let guard = self.lock_table_bounded();
            if guard.is_none() {
                let _ = writeln!(out, "Broker may be deadlocked");
            }
            self.render(&mut out, guard.is_some(), &mut alive);
        }
        drop(alive);

        apply_verbosity(args, &mut out);
        out
    }

    fn lock_table_bounded(&self) -> Option<MutexGuard<'_, ()>> {
        for _ in 0..self.cfg.dump_lock_retries {
            if let Some(guard) = self.table.try_lock() {
                return Some(guard);
            }
            thread::sleep(self.cfg.dump_lock_sleep);
        }
        self.table.try_lock()
    }

    fn render(&self, out: &mut String, locked: bool, alive: &mut Vec<Session>) {
        let Some(module) = &self.module else {
            let _ = writeln!(out, "No device module available!");
            return;
        };

        let info = &module.info;
        let _ = writeln!(out, "Device module HAL API version: {:#x}", info.hal_api_version.0);
        let _ = writeln!(out, "Device module API version: {:#x}", info.module_api_version.0);
        let _ = writeln!(out, "Device module name: {}", info.name);
        let _ = writeln!(out, "Device module author: {}", info.author);
        let _ = writeln!(out, "Number of devices: {}", self.table.len());
        let _ = writeln!(out);

        let mut has_client = false;
        for (index, slot) in self.table.slots() {
            let _ = writeln!(out, "Device {index} static information:");
            match module.handle.device_info(index) {
                Ok(device) => {
                    let facing = match device.facing {
                        Facing::Back => "BACK",
                        Facing::Front => "FRONT",
                    };
                    let version = info.effective_device_version(&device);
                    let _ = writeln!(out, "  Facing: {facing}");
                    let _ = writeln!(out, "  Orientation: {}", device.orientation);
                    let _ = writeln!(out, "  Device version: {:#x}", version.0);
                    if info.device_api(&device) == Some(DeviceApi::Advanced) {
                        let _ = writeln!(out, "  Device static metadata:");
                        for (key, value) in &device.static_metadata {
                            let _ = writeln!(out, "    {key}: {value}");
                        }
                    }
                }
                Err(e) => {
                    let _ = writeln!(out, "  Error reading static information! ({e})");
                }
            }

            if !locked {
                let _ = writeln!(out, "  Client state unavailable (busy: {})", slot.is_busy());
                has_client |= slot.is_busy();
                continue;
            }

            let (owner, shared) = {
                let state = slot.lock();
                let owner = state.owner.as_ref().and_then(Entry::upgrade);
                let shared: Vec<_> = state.shared.iter().filter_map(Entry::upgrade).collect();
                (owner, shared)
            };

            match owner {
                Some(session) => {
                    has_client = true;
                    let _ = writeln!(out, "  Device is open. Client instance dump:");
                    session.describe(out);
                    alive.push(Session::Exclusive(session));
                }
                None if slot.is_busy() => {
                    let _ = writeln!(out, "  Device is being released");
                }
                None => {
                    let _ = writeln!(out, "  Device is closed, no client instance");
                }
            }
            for session in shared {
                has_client = true;
                let _ = writeln!(out, "  Shared client:");
                session.describe(out);
                alive.push(Session::Shared(session));
            }
        }

        if !has_client {
            let _ = writeln!(out);
            let _ = writeln!(out, "No active clients yet.");
        }
    }
}

/// Handles a trailing `-v <level>` pair; a non-numeric level counts as 0.
fn apply_verbosity(args: &[String], out: &mut String) {
    let [.., flag, value] = args else {
        return;
    };
    if flag.as_str() != "-v" {
        return;
    }
    let level = value.trim().parse::<i32>().unwrap_or(0);
    let _ = writeln!(out);
    let _ = writeln!(out, "Setting log level to {level}.");
    crate::verbosity::set_level(level);
}
