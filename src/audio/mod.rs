pub mod controller;
pub mod events;
pub mod output;
pub mod queue;
pub mod service;
pub mod simulated;
pub mod track;

#[cfg(feature = "audio")]
pub mod rodio_output;

pub use controller::{PendingPlay, PlayResolution, PlaybackController, PlaybackError, PlaybackState, TransportSnapshot};
pub use events::{EventHub, OutputEvent, OutputEventKind, Subscription};
pub use output::{AudioOutput, OutputError, PlayFuture, SourceId};
pub use queue::PlayQueue;
pub use service::{PlayerHandle, PlayerService};
pub use simulated::{PlayScript, SimulatedDevice, SimulatedOutput};
pub use track::{Track, TrackId};

#[cfg(feature = "audio")]
pub use rodio_output::RodioOutput;

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub volume: f32,               // 0.0 to 1.0
    pub preview_length_secs: f64,  // what duration reads until the device knows better
    pub tick_interval_ms: u64,     // how often progress is reported
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            volume: 0.7,
            preview_length_secs: 30.0,
            tick_interval_ms: 250,
        }
    }
}

impl AudioConfig {
    pub fn volume(&self) -> f32 {
        if self.volume.is_finite() {
            self.volume.clamp(0.0, 1.0)
        } else {
            Self::default().volume
        }
    }

    pub fn preview_length(&self) -> f64 {
        if self.preview_length_secs.is_finite() && self.preview_length_secs > 0.0 {
            self.preview_length_secs
        } else {
            Self::default().preview_length_secs
        }
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(10))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_config_sanitizes() {
        let config = AudioConfig {
            volume: 3.0,
            preview_length_secs: -1.0,
            tick_interval_ms: 0,
        };
        assert_eq!(config.volume(), 1.0);
        assert_eq!(config.preview_length(), 30.0);
        assert_eq!(config.tick_interval(), Duration::from_millis(10));
    }
}
