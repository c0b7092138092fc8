// In-process audio device with a scriptable play() outcome
// Backs `--headless` mode (driven by a simulated clock) and every playback
// test that needs rejections, late resolutions or end-of-track on demand.

use futures::future;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::debug;

use super::events::{EventHub, OutputEvent, OutputEventKind, Subscription};
use super::output::{clamp_seek, AudioOutput, OutputError, PlayFuture, SourceId};

/// What the next `play()` call should do.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayScript {
    Accept,
    Reject(String),
    /// Stay pending until `SimulatedDevice::release` is called.
    Hold,
}

// Held plays remember the intent they were issued under; any later
// load/pause/play bumps the intent and turns them into no-ops on release.
type HeldPlay = (u64, oneshot::Sender<Result<(), OutputError>>);

struct SimState {
    next_source: u64,
    source: Option<(SourceId, String)>,
    intent: u64,
    position: f64,
    duration: Option<f64>,
    // What "decoding" reveals once a play succeeds
    media_duration: Option<f64>,
    playing: bool,
    volume: f32,
    muted: bool,
    script: VecDeque<PlayScript>,
    held: VecDeque<HeldPlay>,
    loads: Vec<String>,
    play_calls: usize,
}

impl SimState {
    fn new(media_duration: Option<f64>) -> Self {
        Self {
            next_source: 0,
            source: None,
            intent: 0,
            position: 0.0,
            duration: None,
            media_duration,
            playing: false,
            volume: 1.0,
            muted: false,
            script: VecDeque::new(),
            held: VecDeque::new(),
            loads: Vec::new(),
            play_calls: 0,
        }
    }

    fn current(&self) -> Option<SourceId> {
        self.source.as_ref().map(|(id, _)| *id)
    }

    // Marks the current source as started; returns the duration event to emit, if any
    fn start(&mut self) -> Option<OutputEvent> {
        self.playing = true;
        let source = self.current()?;
        if self.duration.is_none() {
            self.duration = self.media_duration;
            return self
                .duration
                .map(|d| OutputEvent::new(source, OutputEventKind::DurationKnown(d)));
        }
        None
    }
}

pub struct SimulatedOutput {
    state: Arc<Mutex<SimState>>,
    hub: EventHub,
}

/// Cloneable remote control for a `SimulatedOutput` that has been handed
/// over to a controller.
#[derive(Clone)]
pub struct SimulatedDevice {
    state: Arc<Mutex<SimState>>,
    hub: EventHub,
}

fn lock(state: &Arc<Mutex<SimState>>) -> MutexGuard<'_, SimState> {
    // A panic while holding the lock only happens inside a failing test
    match state.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl SimulatedOutput {
    /// Sources never reveal a duration unless the device is told to.
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Every source reveals `seconds` as its duration once playback starts.
    pub fn with_media_duration(seconds: f64) -> Self {
        Self::build(Some(seconds))
    }

    fn build(media_duration: Option<f64>) -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState::new(media_duration))),
            hub: EventHub::new(),
        }
    }

    pub fn device(&self) -> SimulatedDevice {
        SimulatedDevice {
            state: self.state.clone(),
            hub: self.hub.clone(),
        }
    }
}

impl Default for SimulatedOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioOutput for SimulatedOutput {
    fn load(&mut self, url: &str) -> SourceId {
        let mut state = lock(&self.state);
        state.playing = false;
        state.intent += 1;
        state.next_source += 1;
        let id = SourceId(state.next_source);
        state.source = Some((id, url.to_string()));
        state.position = 0.0;
        state.duration = None;
        state.loads.push(url.to_string());
        debug!("Simulated device loaded {} ({})", url, id);
        id
    }

    fn play(&mut self) -> PlayFuture {
        let mut state = lock(&self.state);
        state.play_calls += 1;
        state.intent += 1;

        if state.source.is_none() {
            return Box::pin(future::ready(Err(OutputError::NoSource)));
        }

        let outcome = state.script.pop_front().unwrap_or(PlayScript::Accept);
        match outcome {
            PlayScript::Accept => {
                let event = state.start();
                drop(state);
                if let Some(event) = event {
                    self.hub.emit(event);
                }
                Box::pin(future::ready(Ok(())))
            }
            PlayScript::Reject(reason) => {
                state.playing = false;
                Box::pin(future::ready(Err(OutputError::Rejected(reason))))
            }
            PlayScript::Hold => {
                let (tx, rx) = oneshot::channel();
                let intent = state.intent;
                state.held.push_back((intent, tx));
                Box::pin(async move { rx.await.unwrap_or(Err(OutputError::DeviceGone)) })
            }
        }
    }

    fn pause(&mut self) {
        let mut state = lock(&self.state);
        state.playing = false;
        state.intent += 1;
    }

    fn seek(&mut self, seconds: f64) -> Option<f64> {
        let mut state = lock(&self.state);
        let source = state.current()?;
        let position = clamp_seek(seconds, state.duration);
        state.position = position;
        drop(state);

        self.hub
            .emit(OutputEvent::new(source, OutputEventKind::TimeUpdate(position)));
        Some(position)
    }

    fn set_volume(&mut self, level: f32) {
        lock(&self.state).volume = level.clamp(0.0, 1.0);
    }

    fn volume(&self) -> f32 {
        lock(&self.state).volume
    }

    fn set_muted(&mut self, muted: bool) {
        lock(&self.state).muted = muted;
    }

    fn is_muted(&self) -> bool {
        lock(&self.state).muted
    }

    fn subscribe(&self) -> Subscription {
        self.hub.subscribe()
    }
}

impl SimulatedDevice {
    /// Queue the outcome of the next `play()` call. Unscripted calls accept.
    pub fn script(&self, outcome: PlayScript) {
        lock(&self.state).script.push_back(outcome);
    }

    /// Resolve the oldest held `play()`. Returns false if nothing was held.
    pub fn release(&self, result: Result<(), OutputError>) -> bool {
        let mut state = lock(&self.state);
        let Some((intent, tx)) = state.held.pop_front() else {
            return false;
        };

        // A late success only starts audio if nothing happened since it was issued
        let event = if result.is_ok() && state.intent == intent {
            state.start()
        } else {
            None
        };
        drop(state);

        if let Some(event) = event {
            self.hub.emit(event);
        }
        let _ = tx.send(result);
        true
    }

    pub fn held_count(&self) -> usize {
        lock(&self.state).held.len()
    }

    /// Move the clock forward while playing; reaching the known duration ends the source.
    pub fn advance(&self, seconds: f64) {
        let mut state = lock(&self.state);
        let Some(source) = state.current() else {
            return;
        };
        if !state.playing {
            return;
        }

        state.position += seconds;
        let mut events = Vec::new();
        match state.duration {
            Some(duration) if state.position >= duration => {
                state.position = duration;
                state.playing = false;
                events.push(OutputEvent::new(source, OutputEventKind::TimeUpdate(duration)));
                events.push(OutputEvent::new(source, OutputEventKind::Ended));
            }
            _ => {
                events.push(OutputEvent::new(
                    source,
                    OutputEventKind::TimeUpdate(state.position),
                ));
            }
        }
        drop(state);

        for event in events {
            self.hub.emit(event);
        }
    }

    pub fn report_duration(&self, seconds: f64) {
        let mut state = lock(&self.state);
        let Some(source) = state.current() else {
            return;
        };
        state.duration = Some(seconds);
        drop(state);
        self.hub
            .emit(OutputEvent::new(source, OutputEventKind::DurationKnown(seconds)));
    }

    /// Natural end of the current source.
    pub fn finish(&self) {
        let mut state = lock(&self.state);
        let Some(source) = state.current() else {
            return;
        };
        state.playing = false;
        if let Some(duration) = state.duration {
            state.position = duration;
        }
        drop(state);
        self.hub.emit(OutputEvent::new(source, OutputEventKind::Ended));
    }

    pub fn fail(&self, message: &str) {
        let mut state = lock(&self.state);
        let Some(source) = state.current() else {
            return;
        };
        state.playing = false;
        drop(state);
        self.hub.emit(OutputEvent::new(
            source,
            OutputEventKind::Error(message.to_string()),
        ));
    }

    /// Push an arbitrary event, e.g. one tagged with an old source.
    pub fn emit(&self, event: OutputEvent) {
        self.hub.emit(event);
    }

    /// Drive `advance` from a tokio timer, the way a real device reports progress.
    pub fn spawn_clock(&self, tick: Duration) -> JoinHandle<()> {
        let device = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick);
            loop {
                interval.tick().await;
                device.advance(tick.as_secs_f64());
            }
        })
    }

    pub fn current_source(&self) -> Option<SourceId> {
        lock(&self.state).current()
    }

    pub fn loaded_url(&self) -> Option<String> {
        lock(&self.state).source.as_ref().map(|(_, url)| url.clone())
    }

    pub fn loads(&self) -> Vec<String> {
        lock(&self.state).loads.clone()
    }

    pub fn play_calls(&self) -> usize {
        lock(&self.state).play_calls
    }

    pub fn is_playing(&self) -> bool {
        lock(&self.state).playing
    }

    pub fn position(&self) -> f64 {
        lock(&self.state).position
    }

    pub fn volume(&self) -> f32 {
        lock(&self.state).volume
    }

    pub fn is_muted(&self) -> bool {
        lock(&self.state).muted
    }

    pub fn listener_count(&self) -> usize {
        self.hub.listener_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_play_without_source_fails() {
        let mut output = SimulatedOutput::new();
        assert_eq!(output.play().await, Err(OutputError::NoSource));
    }

    #[tokio::test]
    async fn test_scripted_outcomes() {
        let mut output = SimulatedOutput::with_media_duration(30.0);
        let device = output.device();
        let mut events = output.subscribe();

        let source = output.load("https://cdn.example/a.m4a");
        device.script(PlayScript::Reject("autoplay blocked".into()));
        assert!(matches!(output.play().await, Err(OutputError::Rejected(_))));
        assert!(!device.is_playing());

        assert_eq!(output.play().await, Ok(()));
        assert!(device.is_playing());
        assert_eq!(
            events.try_recv(),
            Some(OutputEvent::new(source, OutputEventKind::DurationKnown(30.0)))
        );
    }

    #[tokio::test]
    async fn test_held_play_for_replaced_source_does_not_start() {
        let mut output = SimulatedOutput::new();
        let device = output.device();

        output.load("https://cdn.example/a.m4a");
        device.script(PlayScript::Hold);
        let pending = output.play();

        output.load("https://cdn.example/b.m4a");
        assert!(device.release(Ok(())));
        assert_eq!(pending.await, Ok(()));
        assert!(!device.is_playing());
        assert_eq!(device.loads().len(), 2);
    }

    #[test]
    fn test_advance_reaches_end() {
        let mut output = SimulatedOutput::with_media_duration(1.0);
        let device = output.device();
        let mut events = output.subscribe();

        let source = output.load("https://cdn.example/a.m4a");
        let _ = futures::executor::block_on(output.play());
        let _ = events.try_recv(); // duration

        device.advance(0.6);
        device.advance(0.6);
        assert!(!device.is_playing());
        assert_eq!(device.position(), 1.0);

        let kinds: Vec<_> = std::iter::from_fn(|| events.try_recv()).map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                OutputEventKind::TimeUpdate(0.6),
                OutputEventKind::TimeUpdate(1.0),
                OutputEventKind::Ended,
            ]
        );
        assert_eq!(device.current_source(), Some(source));
    }

    #[test]
    fn test_seek_clamps_and_requires_source() {
        let mut output = SimulatedOutput::new();
        let device = output.device();
        assert_eq!(output.seek(3.0), None);

        output.load("https://cdn.example/a.m4a");
        assert_eq!(output.seek(-4.0), Some(0.0));
        assert_eq!(output.seek(90.0), Some(90.0));

        device.report_duration(30.0);
        assert_eq!(output.seek(90.0), Some(30.0));
    }
}
