// Audio output contract
// One adapter owns exactly one playable source at a time. Everything is
// synchronous from the caller's side except play(), which resolves once the
// device has actually started (or refused to).

use futures::future::BoxFuture;
use std::fmt;
use thiserror::Error;

use super::events::Subscription;

/// Identifies one `load()` on an adapter. Strictly increasing per adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct SourceId(pub u64);

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "source#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum OutputError {
    #[error("No source loaded")]
    NoSource,

    /// Autoplay policy or the device itself refused to start
    #[error("Playback rejected: {0}")]
    Rejected(String),

    #[error("Failed to fetch preview: {0}")]
    Fetch(String),

    #[error("Unsupported audio format or corrupted preview: {0}")]
    Decode(String),

    #[error("Audio device error: {0}")]
    Device(String),

    /// A newer load/pause arrived before this play request reached the device
    #[error("Play request superseded")]
    Superseded,

    #[error("Audio device is gone")]
    DeviceGone,
}

pub type PlayFuture = BoxFuture<'static, Result<(), OutputError>>;

pub trait AudioOutput: Send {
    /// Stop whatever is playing, point the device at `url` and rewind.
    /// Does not start playback.
    fn load(&mut self, url: &str) -> SourceId;

    /// Ask the device to start. The returned future does not borrow the
    /// adapter, so a newer load can happen while it is still pending.
    fn play(&mut self) -> PlayFuture;

    fn pause(&mut self);

    /// Jump to `seconds`, clamped into `[0, duration]` (or just `>= 0` while
    /// the duration is unknown). Returns the clamped position, or `None` when
    /// nothing is loaded.
    fn seek(&mut self, seconds: f64) -> Option<f64>;

    fn set_volume(&mut self, level: f32);

    fn volume(&self) -> f32;

    fn set_muted(&mut self, muted: bool);

    fn is_muted(&self) -> bool;

    fn subscribe(&self) -> Subscription;
}

/// Shared clamping rule for `seek`.
pub fn clamp_seek(requested: f64, duration: Option<f64>) -> f64 {
    let upper = match duration {
        Some(d) if d.is_finite() && d > 0.0 => d,
        _ => requested,
    };
    requested.min(upper).max(0.0)
}
