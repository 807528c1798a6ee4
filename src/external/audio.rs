//! # Audio backend interface.
//!
//! Decoding and playback are provided externally; the sound pool only loads,
//! rewinds, starts and releases prepared players.

use std::path::Path;
use std::sync::Arc;

use crate::error::AudioError;

/// A prepared, replayable sound.
pub trait SoundPlayer: Send + Sync {
    /// Rewinds to the beginning.
    fn seek_to_start(&self);

    /// Starts playback without waiting for completion.
    fn start(&self);

    /// Releases the underlying decoder/output.
    fn release(&self);
}

/// Loads sound assets into players.
pub trait AudioBackend: Send + Sync + 'static {
    /// Loads and prepares the asset at `path`.
    fn load(&self, path: &Path) -> Result<Arc<dyn SoundPlayer>, AudioError>;
}
