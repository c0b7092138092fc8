// Line-oriented shell - the face of riffbox
// Reads commands from stdin, drives the player through its handle and prints
// a line whenever a new track actually starts.

pub mod commands;
pub mod render;

pub use commands::{parse_command, Command, ParseError, HELP};

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info};

use crate::audio::{PlaybackError, PlayerHandle, Track, TrackId};
#[cfg(feature = "catalog")]
use crate::catalog::CatalogClient;
use crate::collections::{CollectionStorage, CollectionsStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

pub struct Shell<S: CollectionStorage> {
    player: PlayerHandle,
    collections: CollectionsStore<S>,
    #[cfg(feature = "catalog")]
    catalog: Option<CatalogClient>,
    results: Vec<Track>,
}

impl<S: CollectionStorage> Shell<S> {
    pub fn new(player: PlayerHandle, collections: CollectionsStore<S>) -> Self {
        Self {
            player,
            collections,
            #[cfg(feature = "catalog")]
            catalog: None,
            results: Vec::new(),
        }
    }

    #[cfg(feature = "catalog")]
    pub fn with_catalog(mut self, catalog: CatalogClient) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Replace the current result list, as a search would.
    pub fn set_results(&mut self, tracks: Vec<Track>) {
        self.results = tracks;
    }

    pub fn results(&self) -> &[Track] {
        &self.results
    }

    pub fn player(&self) -> &PlayerHandle {
        &self.player
    }

    pub fn collections(&self) -> &CollectionsStore<S> {
        &self.collections
    }

    pub async fn run(mut self) -> Result<()> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut updates = self.player.watch();
        let mut announced: Option<TrackId> = None;

        println!("riffbox - type 'help' for commands");
        loop {
            tokio::select! {
                line = lines.next_line() => {
                    let Some(line) = line? else {
                        debug!("stdin closed");
                        break;
                    };
                    match parse_command(&line) {
                        Ok(command) => {
                            let (output, flow) = self.execute(command).await;
                            if !output.is_empty() {
                                println!("{}", output);
                            }
                            if flow == Flow::Quit {
                                break;
                            }
                        }
                        Err(ParseError::Empty) => {}
                        Err(e) => println!("{}", e),
                    }
                }
                changed = updates.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let snapshot = updates.borrow_and_update().clone();
                    let playing = snapshot.current_track.as_ref().map(|t| t.id.clone());
                    if snapshot.is_playing() && playing != announced {
                        if let Some(line) = render::now_playing(&snapshot) {
                            println!("{}", line);
                        }
                        announced = playing;
                    }
                }
            }
        }

        info!("Shell exiting");
        self.player.shutdown().await;
        Ok(())
    }

    pub async fn execute(&mut self, command: Command) -> (String, Flow) {
        let output = match command {
            Command::Search(query) => self.search(&query).await,
            Command::Results => render::track_list(&self.results, self.current_id().as_ref()),
            Command::Play(index) => {
                let context = self.results.clone();
                self.play_from(context, index).await
            }
            Command::Toggle => {
                self.player.toggle_play();
                String::new()
            }
            Command::Next => {
                self.player.next_track();
                String::new()
            }
            Command::Previous => {
                self.player.previous_track();
                String::new()
            }
            Command::Seek(seconds) => {
                self.player.seek(seconds);
                String::new()
            }
            Command::Volume(level) => {
                self.player.set_volume(f32::from(level) / 100.0);
                format!("Volume {}%", level)
            }
            Command::Mute => {
                self.player.toggle_mute();
                String::new()
            }
            Command::Status => {
                let snapshot = self.player.snapshot();
                let liked = snapshot
                    .current_track
                    .as_ref()
                    .is_some_and(|t| self.collections.is_liked(&t.id));
                render::status_line(&snapshot, liked)
            }
            Command::Like(index) => match self.results.get(index).cloned() {
                Some(track) => {
                    if self.collections.toggle_like(&track) {
                        format!("Liked {}", track)
                    } else {
                        format!("Unliked {}", track)
                    }
                }
                None => no_such(index),
            },
            Command::Unlike(index) => match self.collections.liked_songs().get(index).cloned() {
                Some(track) => {
                    self.collections.toggle_like(&track);
                    format!("Unliked {}", track)
                }
                None => no_such(index),
            },
            Command::Liked => {
                render::track_list(self.collections.liked_songs(), self.current_id().as_ref())
            }
            Command::PlayLiked(index) => {
                let context = self.collections.liked_songs().to_vec();
                self.play_from(context, index).await
            }
            Command::PlaylistNew(name) => match self.collections.create_playlist(&name) {
                Ok(name) => format!("Created playlist '{}'", name),
                Err(e) => e.to_string(),
            },
            Command::PlaylistAdd { name, index } => match self.results.get(index).cloned() {
                Some(track) => {
                    let label = track.to_string();
                    match self.collections.add_to_playlist(&name, track) {
                        Ok(true) => format!("Added {} to '{}'", label, name),
                        Ok(false) => format!("{} is already in '{}'", label, name),
                        Err(e) => e.to_string(),
                    }
                }
                None => no_such(index),
            },
            Command::PlaylistRemove { name, index } => {
                match self.collections.playlist_tracks(&name) {
                    Ok(tracks) => match tracks.get(index) {
                        Some(track) => match self.collections.remove_from_playlist(&name, &track.id) {
                            Ok(_) => format!("Removed {} from '{}'", track, name),
                            Err(e) => e.to_string(),
                        },
                        None => no_such(index),
                    },
                    Err(e) => e.to_string(),
                }
            }
            Command::PlaylistDelete(name) => {
                if self.collections.delete_playlist(&name) {
                    format!("Deleted playlist '{}'", name)
                } else {
                    format!("Playlist '{}' not found", name)
                }
            }
            Command::PlaylistRename { old, new } => match self.collections.rename_playlist(&old, &new) {
                Ok(()) => format!("Renamed playlist '{}' to '{}'", old, new.trim()),
                Err(e) => e.to_string(),
            },
            Command::PlaylistShow(name) => match self.collections.playlist_tracks(&name) {
                Ok(tracks) => render::track_list(&tracks, self.current_id().as_ref()),
                Err(e) => e.to_string(),
            },
            Command::PlaylistPlay { name, index } => match self.collections.playlist_tracks(&name) {
                Ok(tracks) => self.play_from(tracks, index).await,
                Err(e) => e.to_string(),
            },
            Command::PlaylistList => render::playlist_list(self.collections.playlists()),
            Command::Help => HELP.to_string(),
            Command::Quit => return (String::new(), Flow::Quit),
        };
        (output, Flow::Continue)
    }

    #[cfg(feature = "catalog")]
    async fn search(&mut self, query: &str) -> String {
        let Some(catalog) = &self.catalog else {
            return "Search is not available".to_string();
        };
        self.results = catalog.search(query).await;
        if self.results.is_empty() {
            return format!("No results for '{}'", query);
        }
        render::track_list(&self.results, self.current_id().as_ref())
    }

    #[cfg(not(feature = "catalog"))]
    async fn search(&mut self, _query: &str) -> String {
        "Search is not available in this build".to_string()
    }

    // `context` becomes the queue
    async fn play_from(&mut self, context: Vec<Track>, index: usize) -> String {
        let Some(track) = context.get(index).cloned() else {
            return no_such(index);
        };
        let label = track.to_string();
        match self.player.play_track(track, context).await {
            Ok(()) => format!("Loading {}", label),
            Err(PlaybackError::Unplayable(_)) => format!("{} has no preview to play", label),
            Err(e) => e.to_string(),
        }
    }

    fn current_id(&self) -> Option<TrackId> {
        self.player.snapshot().current_track.map(|t| t.id)
    }
}

fn no_such(index: usize) -> String {
    format!("No track #{}", index + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{PlaybackController, PlaybackState, PlayerService, SimulatedOutput};
    use crate::collections::MemoryStorage;

    fn song(id: &str) -> Track {
        Track::new(id, format!("Song {id}"), "Band").with_preview(format!("https://cdn.example/{id}.m4a"))
    }

    fn shell() -> Shell<MemoryStorage> {
        let output = SimulatedOutput::with_media_duration(30.0);
        let player = PlayerService::spawn(PlaybackController::new(output, 30.0));
        Shell::new(player, CollectionsStore::open(MemoryStorage::new()))
    }

    #[tokio::test]
    async fn test_play_result_queues_result_list() {
        let mut shell = shell();
        shell.set_results(vec![song("1"), song("2"), song("3")]);

        let (out, flow) = shell.execute(Command::Play(1)).await;
        assert_eq!(out, "Loading Song 2 - Band");
        assert_eq!(flow, Flow::Continue);

        let mut watch = shell.player().watch();
        let snapshot = watch
            .wait_for(|s| s.is_playing())
            .await
            .unwrap()
            .clone();
        assert_eq!(snapshot.queue_len, 3);
        assert_eq!(snapshot.cursor, 1);
    }

    #[tokio::test]
    async fn test_unplayable_and_out_of_range() {
        let mut shell = shell();
        shell.set_results(vec![Track::new("9", "Silent", "Band")]);

        let (out, _) = shell.execute(Command::Play(0)).await;
        assert_eq!(out, "Silent - Band has no preview to play");
        let (out, _) = shell.execute(Command::Play(5)).await;
        assert_eq!(out, "No track #6");
        assert_eq!(shell.player().snapshot().state, PlaybackState::Idle);
    }

    #[tokio::test]
    async fn test_like_and_playlist_commands() {
        let mut shell = shell();
        shell.set_results(vec![song("1"), song("2")]);

        let (out, _) = shell.execute(Command::Like(0)).await;
        assert_eq!(out, "Liked Song 1 - Band");
        assert!(shell.collections().is_liked(&TrackId::new("1")));

        shell.execute(Command::PlaylistNew("Mix".into())).await;
        let (out, _) = shell
            .execute(Command::PlaylistAdd { name: "Mix".into(), index: 1 })
            .await;
        assert_eq!(out, "Added Song 2 - Band to 'Mix'");
        let (out, _) = shell
            .execute(Command::PlaylistAdd { name: "Mix".into(), index: 1 })
            .await;
        assert_eq!(out, "Song 2 - Band is already in 'Mix'");

        let (out, _) = shell
            .execute(Command::PlaylistRemove { name: "Mix".into(), index: 0 })
            .await;
        assert_eq!(out, "Removed Song 2 - Band from 'Mix'");

        let (out, _) = shell.execute(Command::PlaylistDelete("Nope".into())).await;
        assert_eq!(out, "Playlist 'Nope' not found");
    }

    #[tokio::test]
    async fn test_unlike_from_liked_list() {
        let mut shell = shell();
        shell.set_results(vec![song("1"), song("2")]);
        shell.execute(Command::Like(0)).await;
        shell.execute(Command::Like(1)).await;

        // A new search must not stand in the way of unliking
        shell.set_results(Vec::new());
        let (out, _) = shell.execute(Command::Unlike(1)).await;
        assert_eq!(out, "Unliked Song 2 - Band");
        assert!(!shell.collections().is_liked(&TrackId::new("2")));
        assert!(shell.collections().is_liked(&TrackId::new("1")));

        let (out, _) = shell.execute(Command::Unlike(1)).await;
        assert_eq!(out, "No track #2");
    }

    #[tokio::test]
    async fn test_rename_playlist_command() {
        let mut shell = shell();
        shell.execute(Command::PlaylistNew("Gym".into())).await;
        shell.execute(Command::PlaylistNew("Chill".into())).await;

        let (out, _) = shell
            .execute(Command::PlaylistRename { old: "gym".into(), new: "Run".into() })
            .await;
        assert_eq!(out, "Renamed playlist 'gym' to 'Run'");
        assert!(shell.collections().playlist("Run").is_some());
        assert!(shell.collections().playlist("Gym").is_none());

        let (out, _) = shell
            .execute(Command::PlaylistRename { old: "Run".into(), new: "chill".into() })
            .await;
        assert_eq!(out, "Playlist 'chill' already exists");
    }

    #[tokio::test]
    async fn test_quit() {
        let mut shell = shell();
        let (_, flow) = shell.execute(Command::Quit).await;
        assert_eq!(flow, Flow::Quit);
    }
}
