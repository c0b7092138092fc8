// Playback controller - the transport state machine
// Owns the output adapter and the queue. Commands are synchronous; the only
// thing that suspends is the device confirming a start, which comes back as a
// PendingPlay the caller awaits and feeds into finish_play(). Every start is
// tagged with a generation so late confirmations for superseded attempts are
// dropped on the floor.

use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::events::{OutputEvent, OutputEventKind, Subscription};
use super::output::{AudioOutput, OutputError, PlayFuture, SourceId};
use super::queue::PlayQueue;
use super::track::{Track, TrackId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    /// Nothing loaded yet
    Idle,
    /// Source assigned, waiting for the device to confirm
    Loading,
    Playing,
    Paused,
}

#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("Track {0} has no preview to play")]
    Unplayable(TrackId),

    #[error("Player service has stopped")]
    ServiceStopped,
}

/// Read-only view of the transport, cheap to clone and hand to a UI.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportSnapshot {
    pub current_track: Option<Track>,
    pub state: PlaybackState,
    pub current_time: f64,
    pub duration: f64,
    pub queue_len: usize,
    pub cursor: usize,
    pub volume: f32,
    pub muted: bool,
}

impl TransportSnapshot {
    pub fn is_playing(&self) -> bool {
        self.state == PlaybackState::Playing
    }

    /// Fraction of the track played, 0.0..=1.0
    pub fn progress(&self) -> f64 {
        if self.duration > 0.0 {
            (self.current_time / self.duration).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }
}

/// A start request that has been handed to the device but not confirmed.
#[must_use = "a pending play does nothing unless awaited and fed back into finish_play"]
pub struct PendingPlay {
    generation: u64,
    track_id: TrackId,
    completion: PlayFuture,
}

impl std::fmt::Debug for PendingPlay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingPlay")
            .field("generation", &self.generation)
            .field("track_id", &self.track_id)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub struct PlayResolution {
    pub generation: u64,
    pub track_id: TrackId,
    pub result: Result<(), OutputError>,
}

impl PendingPlay {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn track_id(&self) -> &TrackId {
        &self.track_id
    }

    pub async fn wait(self) -> PlayResolution {
        PlayResolution {
            generation: self.generation,
            track_id: self.track_id,
            result: self.completion.await,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Direction {
    Forward,
    Backward,
}

pub struct PlaybackController<O: AudioOutput> {
    output: O,
    queue: PlayQueue,
    current_track: Option<Track>,
    state: PlaybackState,
    current_time: f64,
    duration: f64,
    fallback_duration: f64,
    source: Option<SourceId>,
    generation: u64,
}

impl<O: AudioOutput> PlaybackController<O> {
    /// `fallback_duration` is what `duration` reads until the device reports
    /// the real one (preview length).
    pub fn new(output: O, fallback_duration: f64) -> Self {
        Self {
            output,
            queue: PlayQueue::new(),
            current_track: None,
            state: PlaybackState::Idle,
            current_time: 0.0,
            duration: fallback_duration,
            fallback_duration,
            source: None,
            generation: 0,
        }
    }

    /// Play `track`, optionally as part of `context` (search results, a
    /// playlist, liked songs). A non-empty context containing the track
    /// replaces the queue; otherwise the existing queue is reused if it
    /// already holds the track, or a single-track queue is made.
    pub fn play_track(&mut self, track: Track, context: &[Track]) -> Result<PendingPlay, PlaybackError> {
        let Some(url) = track.preview().map(str::to_string) else {
            warn!("No preview URL available for track {} ({})", track.id, track);
            return Err(PlaybackError::Unplayable(track.id));
        };

        if context.iter().any(|t| t.id == track.id) {
            self.queue.set_queue(context.to_vec(), &track.id);
            info!(
                "Queue set with {} songs, playing index {}",
                self.queue.len(),
                self.queue.cursor()
            );
        } else {
            if !context.is_empty() {
                debug!("Track {} is not part of the given context, ignoring it", track.id);
            }
            self.queue.ensure_track_playable(&track);
        }

        Ok(self.start(track, &url))
    }

    pub fn toggle_play(&mut self) -> Option<PendingPlay> {
        match self.state {
            PlaybackState::Idle => {
                warn!("No track loaded");
                None
            }
            PlaybackState::Playing => {
                self.output.pause();
                self.state = PlaybackState::Paused;
                info!("Paused at {:.1}s", self.current_time);
                None
            }
            PlaybackState::Loading => {
                // Outstanding confirmation belongs to an attempt we no longer want
                self.generation += 1;
                self.output.pause();
                self.state = PlaybackState::Paused;
                info!("Cancelled pending start");
                None
            }
            PlaybackState::Paused => {
                let track = self.current_track.clone()?;
                self.generation += 1;
                self.state = PlaybackState::Loading;
                debug!("Resuming {} (attempt {})", track, self.generation);
                Some(PendingPlay {
                    generation: self.generation,
                    track_id: track.id,
                    completion: self.output.play(),
                })
            }
        }
    }

    pub fn next_track(&mut self) -> Option<PendingPlay> {
        self.step(Direction::Forward)
    }

    pub fn previous_track(&mut self) -> Option<PendingPlay> {
        self.step(Direction::Backward)
    }

    /// Returns the position actually applied, or `None` if nothing is loaded.
    pub fn seek(&mut self, seconds: f64) -> Option<f64> {
        if !seconds.is_finite() || self.current_track.is_none() {
            return None;
        }
        // The device may not know the duration yet; bound it by ours first
        let position = self.output.seek(seconds.clamp(0.0, self.duration))?;
        self.current_time = position.clamp(0.0, self.duration);
        debug!("Seeked to {:.1}s", self.current_time);
        Some(self.current_time)
    }

    /// Apply the device's answer to a start request. Returns false when the
    /// answer belonged to a superseded attempt and was ignored.
    pub fn finish_play(&mut self, resolution: PlayResolution) -> bool {
        if resolution.generation != self.generation {
            debug!(
                "Discarding stale play result for {} (attempt {}, current {})",
                resolution.track_id, resolution.generation, self.generation
            );
            return false;
        }

        match resolution.result {
            Ok(()) => {
                if self.state == PlaybackState::Loading {
                    self.state = PlaybackState::Playing;
                    if let Some(track) = &self.current_track {
                        info!("Playing: {}", track);
                    }
                }
            }
            Err(e) => {
                warn!("Playback failed for {}: {}", resolution.track_id, e);
                self.state = self.settled_state();
            }
        }
        true
    }

    /// React to something the device reported. Natural end of a track may
    /// start the next one, which is handed back like any other start.
    pub fn handle_event(&mut self, event: OutputEvent) -> Option<PendingPlay> {
        if Some(event.source) != self.source {
            debug!("Ignoring {:?} from replaced {}", event.kind, event.source);
            return None;
        }

        match event.kind {
            OutputEventKind::TimeUpdate(seconds) => {
                if seconds.is_finite() {
                    self.current_time = seconds.clamp(0.0, self.duration);
                }
                None
            }
            OutputEventKind::DurationKnown(seconds) => {
                if seconds.is_finite() && seconds > 0.0 {
                    self.duration = seconds;
                }
                None
            }
            OutputEventKind::Ended => {
                if let Some(track) = &self.current_track {
                    info!("Finished: {}", track);
                }
                let next = self.step(Direction::Forward);
                if next.is_none() {
                    self.state = self.settled_state();
                }
                next
            }
            OutputEventKind::Error(message) => {
                error!("Audio error: {}", message);
                self.generation += 1;
                self.state = self.settled_state();
                None
            }
        }
    }

    pub fn set_volume(&mut self, level: f32) {
        self.output.set_volume(level.clamp(0.0, 1.0));
    }

    pub fn toggle_mute(&mut self) -> bool {
        let muted = !self.output.is_muted();
        self.output.set_muted(muted);
        muted
    }

    pub fn subscribe(&self) -> Subscription {
        self.output.subscribe()
    }

    /// Silence the device and drop any outstanding start.
    pub fn shutdown(&mut self) {
        self.generation += 1;
        self.output.pause();
        if matches!(self.state, PlaybackState::Playing | PlaybackState::Loading) {
            self.state = PlaybackState::Paused;
        }
        info!("Playback controller shut down");
    }

    pub fn snapshot(&self) -> TransportSnapshot {
        TransportSnapshot {
            current_track: self.current_track.clone(),
            state: self.state,
            current_time: self.current_time,
            duration: self.duration,
            queue_len: self.queue.len(),
            cursor: self.queue.cursor(),
            volume: self.output.volume(),
            muted: self.output.is_muted(),
        }
    }

    pub fn current_track(&self) -> Option<&Track> {
        self.current_track.as_ref()
    }

    pub fn is_playing(&self) -> bool {
        self.state == PlaybackState::Playing
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn current_time(&self) -> f64 {
        self.current_time
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn queue(&self) -> &PlayQueue {
        &self.queue
    }

    fn settled_state(&self) -> PlaybackState {
        if self.current_track.is_some() {
            PlaybackState::Paused
        } else {
            PlaybackState::Idle
        }
    }

    // Tear down whatever is loaded and start `track`
    fn start(&mut self, track: Track, url: &str) -> PendingPlay {
        self.generation += 1;
        let source = self.output.load(url);
        self.source = Some(source);
        self.current_time = 0.0;
        self.duration = self.fallback_duration;
        self.state = PlaybackState::Loading;
        info!("Loading {} ({}, attempt {})", track, source, self.generation);

        let track_id = track.id.clone();
        self.current_track = Some(track);
        PendingPlay {
            generation: self.generation,
            track_id,
            completion: self.output.play(),
        }
    }

    fn step(&mut self, direction: Direction) -> Option<PendingPlay> {
        if self.queue.is_empty() {
            warn!("Queue is empty");
            return None;
        }

        // At most one full lap looking for something with a preview
        for _ in 0..self.queue.len() {
            let candidate = match direction {
                Direction::Forward => self.queue.next(),
                Direction::Backward => self.queue.previous(),
            }
            .cloned()?;

            if let Some(url) = candidate.preview().map(str::to_string) {
                return Some(self.start(candidate, &url));
            }
            debug!("Skipping {} (no preview)", candidate);
        }

        warn!("No playable track left in the queue");
        self.generation += 1;
        self.output.pause();
        self.state = self.settled_state();
        None
    }
}
