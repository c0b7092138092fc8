// Real sound device adapter built on rodio
// rodio's OutputStream is not Send, so a dedicated thread owns the stream and
// the sink and everything else talks to it over a channel. Previews are
// fetched over HTTP inside the play() future and decoded by Symphonia.

use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink, Source};
use std::io::Cursor;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use super::events::{EventHub, OutputEvent, OutputEventKind, Subscription};
use super::output::{clamp_seek, AudioOutput, OutputError, PlayFuture, SourceId};

type Reply = oneshot::Sender<Result<(), OutputError>>;

enum DeviceCmd {
    Load { source: SourceId },
    Start { source: SourceId, token: u64, bytes: Vec<u8>, reply: Reply },
    Resume { source: SourceId, token: u64, reply: Reply },
    Pause,
    Seek(f64),
    Volume(f32),
    Quit,
}

// State both sides of the channel need to read without a round trip
#[derive(Default)]
struct Shared {
    // Bumped by every load/pause/play; a Start or Resume carrying an older
    // token arrived too late and must not make a sound.
    intent: AtomicU64,
    // Source id whose audio is already decoded into the sink (0 = none)
    started: AtomicU64,
    duration: Mutex<Option<f64>>,
}

impl Shared {
    fn duration(&self) -> Option<f64> {
        match self.duration.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    fn set_duration(&self, value: Option<f64>) {
        match self.duration.lock() {
            Ok(mut guard) => *guard = value,
            Err(poisoned) => *poisoned.into_inner() = value,
        }
    }
}

pub struct RodioOutput {
    commands: mpsc::Sender<DeviceCmd>,
    shared: Arc<Shared>,
    hub: EventHub,
    client: reqwest::Client,
    source: Option<(SourceId, String)>,
    next_source: u64,
    volume: f32,
    muted: bool,
    thread: Option<JoinHandle<()>>,
}

impl RodioOutput {
    /// Open the default output device. `tick` is how often progress is reported.
    pub fn new(volume: f32, tick: Duration) -> Result<Self, OutputError> {
        let volume = volume.clamp(0.0, 1.0);
        let (commands, inbox) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::sync_channel(1);
        let shared = Arc::new(Shared::default());
        let hub = EventHub::new();

        let thread = {
            let shared = shared.clone();
            let hub = hub.clone();
            thread::Builder::new()
                .name("riffbox-audio".to_string())
                .spawn(move || match OutputStream::try_default() {
                    Ok((_stream, handle)) => {
                        let _ = ready_tx.send(Ok(()));
                        DeviceThread::new(handle, shared, hub, volume, tick).run(inbox);
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(OutputError::Device(e.to_string())));
                    }
                })
                .map_err(|e| OutputError::Device(e.to_string()))?
        };

        ready_rx.recv().map_err(|_| OutputError::DeviceGone)??;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(20))
            .build()
            .map_err(|e| OutputError::Device(e.to_string()))?;

        info!("Audio device opened (volume {:.2})", volume);
        Ok(Self {
            commands,
            shared,
            hub,
            client,
            source: None,
            next_source: 0,
            volume,
            muted: false,
            thread: Some(thread),
        })
    }

    fn send(&self, command: DeviceCmd) {
        if self.commands.send(command).is_err() {
            warn!("Audio device thread is gone");
        }
    }

    fn bump_intent(&self) -> u64 {
        self.shared.intent.fetch_add(1, Ordering::SeqCst) + 1
    }
}

fn request<F>(commands: &mpsc::Sender<DeviceCmd>, build: F) -> Result<oneshot::Receiver<Result<(), OutputError>>, OutputError>
where
    F: FnOnce(Reply) -> DeviceCmd,
{
    let (reply, answer) = oneshot::channel();
    commands.send(build(reply)).map_err(|_| OutputError::DeviceGone)?;
    Ok(answer)
}

// Negative positions mean the start; values Duration cannot hold are rejected
fn seek_target(position: f64) -> Option<Duration> {
    if position.is_nan() {
        return None;
    }
    Duration::try_from_secs_f64(position.max(0.0)).ok()
}

async fn fetch_preview(client: &reqwest::Client, url: &str) -> Result<Vec<u8>, OutputError> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| OutputError::Fetch(e.to_string()))?
        .error_for_status()
        .map_err(|e| OutputError::Fetch(e.to_string()))?;
    let bytes = response
        .bytes()
        .await
        .map_err(|e| OutputError::Fetch(e.to_string()))?;
    debug!("Fetched {} bytes from {}", bytes.len(), url);
    Ok(bytes.to_vec())
}

impl AudioOutput for RodioOutput {
    fn load(&mut self, url: &str) -> SourceId {
        self.bump_intent();
        self.next_source += 1;
        let source = SourceId(self.next_source);
        self.source = Some((source, url.to_string()));
        self.shared.set_duration(None);
        self.send(DeviceCmd::Load { source });
        debug!("Loaded {} as {}", url, source);
        source
    }

    fn play(&mut self) -> PlayFuture {
        let Some((source, url)) = self.source.clone() else {
            return Box::pin(futures::future::ready(Err(OutputError::NoSource)));
        };
        let token = self.bump_intent();
        let commands = self.commands.clone();

        if self.shared.started.load(Ordering::SeqCst) == source.0 {
            let answer = request(&commands, |reply| DeviceCmd::Resume { source, token, reply });
            return Box::pin(async move { answer?.await.unwrap_or(Err(OutputError::DeviceGone)) });
        }

        let client = self.client.clone();
        let shared = self.shared.clone();
        Box::pin(async move {
            let bytes = fetch_preview(&client, &url).await?;
            if shared.intent.load(Ordering::SeqCst) != token {
                return Err(OutputError::Superseded);
            }
            let answer = request(&commands, |reply| DeviceCmd::Start { source, token, bytes, reply })?;
            answer.await.unwrap_or(Err(OutputError::DeviceGone))
        })
    }

    fn pause(&mut self) {
        self.bump_intent();
        self.send(DeviceCmd::Pause);
    }

    fn seek(&mut self, seconds: f64) -> Option<f64> {
        self.source.as_ref()?;
        let position = clamp_seek(seconds, self.shared.duration());
        self.send(DeviceCmd::Seek(position));
        Some(position)
    }

    fn set_volume(&mut self, level: f32) {
        self.volume = level.clamp(0.0, 1.0);
        if !self.muted {
            self.send(DeviceCmd::Volume(self.volume));
        }
    }

    fn volume(&self) -> f32 {
        self.volume
    }

    fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
        let level = if muted { 0.0 } else { self.volume };
        self.send(DeviceCmd::Volume(level));
    }

    fn is_muted(&self) -> bool {
        self.muted
    }

    fn subscribe(&self) -> Subscription {
        self.hub.subscribe()
    }
}

impl Drop for RodioOutput {
    fn drop(&mut self) {
        let _ = self.commands.send(DeviceCmd::Quit);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Audio device thread panicked");
            }
        }
    }
}

struct DeviceThread {
    handle: OutputStreamHandle,
    sink: Option<Sink>,
    current: Option<SourceId>,
    playing: bool,
    volume: f32,
    shared: Arc<Shared>,
    hub: EventHub,
    tick: Duration,
    last_tick: Instant,
}

impl DeviceThread {
    fn new(handle: OutputStreamHandle, shared: Arc<Shared>, hub: EventHub, volume: f32, tick: Duration) -> Self {
        Self {
            handle,
            sink: None,
            current: None,
            playing: false,
            volume,
            shared,
            hub,
            tick,
            last_tick: Instant::now(),
        }
    }

    fn run(mut self, inbox: mpsc::Receiver<DeviceCmd>) {
        loop {
            match inbox.recv_timeout(self.tick) {
                Ok(DeviceCmd::Quit) | Err(RecvTimeoutError::Disconnected) => break,
                Ok(command) => self.handle_command(command),
                Err(RecvTimeoutError::Timeout) => {}
            }

            if self.last_tick.elapsed() >= self.tick {
                self.last_tick = Instant::now();
                self.report_progress();
            }
        }

        if let Some(sink) = self.sink.take() {
            sink.stop();
        }
        debug!("Audio device thread exiting");
    }

    fn handle_command(&mut self, command: DeviceCmd) {
        match command {
            DeviceCmd::Load { source } => {
                if let Some(sink) = self.sink.take() {
                    sink.stop();
                }
                self.current = Some(source);
                self.playing = false;
            }
            DeviceCmd::Start { source, token, bytes, reply } => {
                let result = self.start(source, token, bytes);
                let _ = reply.send(result);
            }
            DeviceCmd::Resume { source, token, reply } => {
                let result = self.resume(source, token);
                let _ = reply.send(result);
            }
            DeviceCmd::Pause => {
                if let Some(sink) = &self.sink {
                    sink.pause();
                }
                self.playing = false;
            }
            DeviceCmd::Seek(position) => self.seek(position),
            DeviceCmd::Volume(level) => {
                self.volume = level;
                if let Some(sink) = &self.sink {
                    sink.set_volume(level);
                }
            }
            DeviceCmd::Quit => {}
        }
    }

    fn is_current(&self, source: SourceId, token: u64) -> bool {
        self.current == Some(source) && self.shared.intent.load(Ordering::SeqCst) == token
    }

    fn start(&mut self, source: SourceId, token: u64, bytes: Vec<u8>) -> Result<(), OutputError> {
        if !self.is_current(source, token) {
            debug!("Dropping superseded start for {}", source);
            return Err(OutputError::Superseded);
        }

        let decoder = Decoder::new(Cursor::new(bytes)).map_err(|e| OutputError::Decode(e.to_string()))?;
        let sink = Sink::try_new(&self.handle).map_err(|e| OutputError::Device(e.to_string()))?;

        if let Some(duration) = decoder.total_duration() {
            let seconds = duration.as_secs_f64();
            self.shared.set_duration(Some(seconds));
            self.emit(source, OutputEventKind::DurationKnown(seconds));
        }

        sink.set_volume(self.volume);
        sink.append(decoder);
        sink.play();

        if let Some(old) = self.sink.replace(sink) {
            old.stop();
        }
        self.shared.started.store(source.0, Ordering::SeqCst);
        self.playing = true;
        debug!("Started {}", source);
        Ok(())
    }

    fn resume(&mut self, source: SourceId, token: u64) -> Result<(), OutputError> {
        if !self.is_current(source, token) {
            return Err(OutputError::Superseded);
        }
        let sink = self.sink.as_ref().ok_or(OutputError::NoSource)?;
        sink.play();
        self.playing = true;
        Ok(())
    }

    fn seek(&mut self, position: f64) {
        let (Some(sink), Some(source)) = (&self.sink, self.current) else {
            return;
        };
        let Some(target) = seek_target(position) else {
            warn!("Ignoring seek to {}", position);
            return;
        };
        match sink.try_seek(target) {
            Ok(()) => self.emit(source, OutputEventKind::TimeUpdate(target.as_secs_f64())),
            Err(e) => warn!("Seek to {:.1}s failed: {}", position, e),
        }
    }

    fn report_progress(&mut self) {
        if !self.playing {
            return;
        }
        let (Some(sink), Some(source)) = (&self.sink, self.current) else {
            return;
        };

        let drained = sink.empty();
        let position = sink.get_pos().as_secs_f64();

        if drained {
            self.playing = false;
            let end = self.shared.duration().unwrap_or(position);
            self.emit(source, OutputEventKind::TimeUpdate(end));
            self.emit(source, OutputEventKind::Ended);
            debug!("{} ended", source);
        } else {
            self.emit(source, OutputEventKind::TimeUpdate(position));
        }
    }

    fn emit(&self, source: SourceId, kind: OutputEventKind) {
        self.hub.emit(OutputEvent::new(source, kind));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seek_target_never_overflows() {
        assert_eq!(seek_target(12.5), Some(Duration::from_millis(12_500)));
        assert_eq!(seek_target(-4.0), Some(Duration::ZERO));
        assert_eq!(seek_target(1e300), None);
        assert_eq!(seek_target(f64::INFINITY), None);
        assert_eq!(seek_target(f64::NAN), None);
    }
}
