// Player service - runs the controller on its own task
// The UI talks to a PlayerHandle; commands, device events and pending play
// confirmations are all funnelled through one select loop so the controller
// only ever sees one thing at a time.

use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::controller::{PendingPlay, PlayResolution, PlaybackController, PlaybackError, TransportSnapshot};
use super::output::AudioOutput;
use super::track::Track;

#[derive(Debug)]
enum PlayerCommand {
    Play {
        track: Track,
        context: Vec<Track>,
        reply: oneshot::Sender<Result<(), PlaybackError>>,
    },
    TogglePlay,
    Next,
    Previous,
    Seek(f64),
    SetVolume(f32),
    ToggleMute,
    Shutdown,
}

pub struct PlayerService;

impl PlayerService {
    /// Move `controller` onto a tokio task and hand back the only way to reach it.
    pub fn spawn<O>(controller: PlaybackController<O>) -> PlayerHandle
    where
        O: AudioOutput + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(controller.snapshot());
        let task = tokio::spawn(run(controller, rx, snapshot_tx));

        PlayerHandle {
            commands: tx,
            snapshot: snapshot_rx,
            task: Some(task),
        }
    }
}

type Settling = BoxFuture<'static, PlayResolution>;

async fn run<O: AudioOutput>(
    mut controller: PlaybackController<O>,
    mut commands: mpsc::UnboundedReceiver<PlayerCommand>,
    snapshot: watch::Sender<TransportSnapshot>,
) {
    let mut events = controller.subscribe();
    let mut pending: FuturesUnordered<Settling> = FuturesUnordered::new();
    let track = |pending: &mut FuturesUnordered<Settling>, play: Option<PendingPlay>| {
        if let Some(play) = play {
            pending.push(Box::pin(play.wait()));
        }
    };

    info!("Player service started");
    loop {
        tokio::select! {
            command = commands.recv() => {
                let Some(command) = command else {
                    debug!("All player handles dropped");
                    break;
                };
                match command {
                    PlayerCommand::Play { track: song, context, reply } => {
                        let result = controller.play_track(song, &context).map(|play| {
                            track(&mut pending, Some(play));
                        });
                        let _ = reply.send(result);
                    }
                    PlayerCommand::TogglePlay => track(&mut pending, controller.toggle_play()),
                    PlayerCommand::Next => track(&mut pending, controller.next_track()),
                    PlayerCommand::Previous => track(&mut pending, controller.previous_track()),
                    PlayerCommand::Seek(seconds) => {
                        let _ = controller.seek(seconds);
                    }
                    PlayerCommand::SetVolume(level) => controller.set_volume(level),
                    PlayerCommand::ToggleMute => {
                        controller.toggle_mute();
                    }
                    PlayerCommand::Shutdown => break,
                }
            }
            Some(event) = events.recv() => {
                track(&mut pending, controller.handle_event(event));
            }
            Some(resolution) = pending.next(), if !pending.is_empty() => {
                controller.finish_play(resolution);
            }
        }

        snapshot.send_if_modified(|current| {
            let next = controller.snapshot();
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }

    controller.shutdown();
    snapshot.send_replace(controller.snapshot());
    // Explicit so the listener is gone before the task reports done
    events.unsubscribe();
    info!("Player service stopped");
}

/// UI-facing contract: commands in, transport snapshots out.
pub struct PlayerHandle {
    commands: mpsc::UnboundedSender<PlayerCommand>,
    snapshot: watch::Receiver<TransportSnapshot>,
    task: Option<JoinHandle<()>>,
}

impl PlayerHandle {
    /// Fails only when the track has no preview (or the service is gone);
    /// device trouble shows up in the snapshot instead.
    pub async fn play_track(&self, track: Track, context: Vec<Track>) -> Result<(), PlaybackError> {
        let (reply, answer) = oneshot::channel();
        self.commands
            .send(PlayerCommand::Play { track, context, reply })
            .map_err(|_| PlaybackError::ServiceStopped)?;
        answer.await.map_err(|_| PlaybackError::ServiceStopped)?
    }

    pub fn toggle_play(&self) {
        self.send(PlayerCommand::TogglePlay);
    }

    pub fn next_track(&self) {
        self.send(PlayerCommand::Next);
    }

    pub fn previous_track(&self) {
        self.send(PlayerCommand::Previous);
    }

    pub fn seek(&self, seconds: f64) {
        self.send(PlayerCommand::Seek(seconds));
    }

    pub fn set_volume(&self, level: f32) {
        self.send(PlayerCommand::SetVolume(level));
    }

    pub fn toggle_mute(&self) {
        self.send(PlayerCommand::ToggleMute);
    }

    pub fn snapshot(&self) -> TransportSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Another receiver on the snapshot stream, for render loops.
    pub fn watch(&self) -> watch::Receiver<TransportSnapshot> {
        self.snapshot.clone()
    }

    /// Wait until the transport changes. Returns false once the service is gone.
    pub async fn changed(&mut self) -> bool {
        self.snapshot.changed().await.is_ok()
    }

    /// Wait for the first snapshot matching `predicate`.
    pub async fn wait_for<F>(&mut self, mut predicate: F) -> Option<TransportSnapshot>
    where
        F: FnMut(&TransportSnapshot) -> bool,
    {
        self.snapshot
            .wait_for(|snapshot| predicate(snapshot))
            .await
            .ok()
            .map(|snapshot| snapshot.clone())
    }

    /// Stop the device, drop the listener and wait for the task to finish.
    pub async fn shutdown(mut self) {
        self.send(PlayerCommand::Shutdown);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!("Player task ended abnormally: {}", e);
            }
        }
    }

    fn send(&self, command: PlayerCommand) {
        if self.commands.send(command).is_err() {
            warn!("Player service is not running");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::controller::PlaybackState;
    use crate::audio::simulated::{PlayScript, SimulatedOutput};

    fn track(id: &str) -> Track {
        Track::new(id, format!("Song {id}"), "Band").with_preview(format!("https://cdn.example/{id}.m4a"))
    }

    #[tokio::test]
    async fn test_handle_round_trip() {
        let output = SimulatedOutput::with_media_duration(30.0);
        let device = output.device();
        let mut player = PlayerService::spawn(PlaybackController::new(output, 30.0));

        let list = vec![track("a"), track("b")];
        player.play_track(track("a"), list.clone()).await.unwrap();
        let snapshot = player.wait_for(|s| s.is_playing()).await.unwrap();
        assert_eq!(snapshot.current_track.map(|t| t.id), Some("a".into()));
        assert_eq!(snapshot.queue_len, 2);

        player.next_track();
        let snapshot = player
            .wait_for(|s| s.is_playing() && s.cursor == 1)
            .await
            .unwrap();
        assert_eq!(snapshot.current_track.map(|t| t.id), Some("b".into()));

        // Natural end wraps back to the head
        device.finish();
        player.wait_for(|s| s.is_playing() && s.cursor == 0).await.unwrap();

        player.toggle_play();
        player
            .wait_for(|s| s.state == PlaybackState::Paused)
            .await
            .unwrap();

        assert_eq!(device.listener_count(), 1);
        player.shutdown().await;
        assert_eq!(device.listener_count(), 0);
        assert!(!device.is_playing());
    }

    #[tokio::test]
    async fn test_unplayable_rejected_through_handle() {
        let player = PlayerService::spawn(PlaybackController::new(SimulatedOutput::new(), 30.0));
        let err = player
            .play_track(Track::new("x", "Silent", "Band"), Vec::new())
            .await
            .unwrap_err();
        assert!(matches!(err, PlaybackError::Unplayable(_)));
        assert_eq!(player.snapshot().state, PlaybackState::Idle);
        player.shutdown().await;
    }

    #[tokio::test]
    async fn test_rejection_surfaces_as_paused() {
        let output = SimulatedOutput::new();
        let device = output.device();
        device.script(PlayScript::Reject("autoplay blocked".into()));
        let mut player = PlayerService::spawn(PlaybackController::new(output, 30.0));

        player.play_track(track("a"), Vec::new()).await.unwrap();
        let snapshot = player
            .wait_for(|s| s.state == PlaybackState::Paused)
            .await
            .unwrap();
        assert!(!snapshot.is_playing());
        assert_eq!(snapshot.current_track.map(|t| t.id), Some("a".into()));
        player.shutdown().await;
    }
}
