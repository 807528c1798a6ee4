//! # Shared feedback-sound pool.
//!
//! Exclusive sessions share two feedback sounds (shutter and recording). The
//! pool loads them lazily when the first session acquires it and releases them
//! when the last one lets go.
//!
//! ## Rules
//! - Assets are loaded **exactly** on the `0 → 1` reference transition.
//! - Assets are released **exactly** on the `1 → 0` transition.
//! - A failed asset is logged and skipped; the other asset still loads.
//! - Releasing more times than acquired is logged and ignored.
//! - [`SoundPool::play`] never blocks on playback and is a no-op for a missing asset.
//!
//! ```text
//! acquire(): ref 0 → 1  ──► load(shutter), load(recording)
//! acquire(): ref 1 → 2  ──► (nothing)
//! release(): ref 2 → 1  ──► (nothing)
//! release(): ref 1 → 0  ──► release every loaded player
//! ```

use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::SoundAssets;
use crate::error::AudioError;
use crate::events::{Bus, Event, EventKind};
use crate::external::{AudioBackend, SoundPlayer};

/// Feedback sound kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SoundKind {
    /// Still-capture shutter.
    Shutter,
    /// Video recording start/stop.
    Recording,
}

impl SoundKind {
    /// Every kind, in slot order.
    pub const ALL: [SoundKind; 2] = [SoundKind::Shutter, SoundKind::Recording];

    #[inline]
    fn slot(self) -> usize {
        match self {
            SoundKind::Shutter => 0,
            SoundKind::Recording => 1,
        }
    }
}

struct PoolState {
    refs: usize,
    players: [Option<Arc<dyn SoundPlayer>>; 2],
}

/// Reference-counted pool of feedback sounds.
pub struct SoundPool {
    assets: SoundAssets,
    backend: Arc<dyn AudioBackend>,
    bus: Bus,
    state: Mutex<PoolState>,
}

impl SoundPool {
    /// Creates an empty pool; nothing is loaded until the first [`acquire`](Self::acquire).
    pub fn new(assets: SoundAssets, backend: Arc<dyn AudioBackend>, bus: Bus) -> Self {
        Self {
            assets,
            backend,
            bus,
            state: Mutex::new(PoolState {
                refs: 0,
                players: [None, None],
            }),
        }
    }

    /// Takes a reference, loading the assets on the first one.
    pub fn acquire(&self) {
        let mut state = self.state.lock();
        crate::log1!(refs = state.refs, "sound pool acquire");
        state.refs += 1;
        if state.refs > 1 {
            return;
        }

        for kind in SoundKind::ALL {
            let path = self.path(kind);
            match self.backend.load(path) {
                Ok(player) => state.players[kind.slot()] = Some(player),
                Err(e) => {
                    tracing::error!(?kind, error = %e, "failed to load feedback sound");
                    self.bus
                        .publish(Event::new(EventKind::SoundLoadFailed).with_reason(e.to_string()));
                }
            }
        }
        self.bus.publish(Event::new(EventKind::SoundsLoaded));
    }

    /// Drops a reference, releasing the assets on the last one.
    pub fn release(&self) {
        let released: Vec<Arc<dyn SoundPlayer>> = {
            let mut state = self.state.lock();
            crate::log1!(refs = state.refs, "sound pool release");
            if state.refs == 0 {
                tracing::warn!("sound pool released more times than acquired");
                return;
            }
            state.refs -= 1;
            if state.refs > 0 {
                return;
            }
            state.players.iter_mut().filter_map(Option::take).collect()
        };

        for player in released {
            player.release();
        }
        self.bus.publish(Event::new(EventKind::SoundsReleased));
    }

    /// Plays a sound from the start; no-op if it is not loaded.
    pub fn play(&self, kind: SoundKind) {
        crate::log2!(?kind, "play sound");
        let player = self.state.lock().players[kind.slot()].clone();
        if let Some(player) = player {
            player.seek_to_start();
            player.start();
        }
    }

    /// Current number of references.
    pub fn refs(&self) -> usize {
        self.state.lock().refs
    }

    /// True if the given sound is currently loaded.
    pub fn is_loaded(&self, kind: SoundKind) -> bool {
        self.state.lock().players[kind.slot()].is_some()
    }

    fn path(&self, kind: SoundKind) -> &std::path::Path {
        match kind {
            SoundKind::Shutter => &self.assets.shutter,
            SoundKind::Recording => &self.assets.recording,
        }
    }
}

/// Backend used when none is configured; every load fails.
pub(crate) struct Silent;

impl AudioBackend for Silent {
    fn load(&self, path: &std::path::Path) -> Result<Arc<dyn SoundPlayer>, AudioError> {
        Err(AudioError {
            path: path.to_path_buf(),
            reason: "no audio backend configured".into(),
        })
    }
}
