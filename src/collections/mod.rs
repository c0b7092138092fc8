// Liked songs and playlists
// Every mutation is applied in memory first and then persisted; a failed
// save is logged and never undoes the change. Playback never reads from here
// except to seed a queue, and the queue keeps its own copy.

pub mod storage;

pub use storage::{CollectionStorage, JsonFileStorage, MemoryStorage};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::audio::{Track, TrackId};

#[derive(Debug, Error)]
pub enum CollectionError {
    #[error("Playlist name cannot be empty")]
    InvalidName,

    #[error("Playlist '{0}' already exists")]
    PlaylistExists(String),

    #[error("Playlist '{0}' not found")]
    PlaylistNotFound(String),

    #[error("Storage error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to (de)serialize collection: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Tracks the user liked, in the order they were liked.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LikedSongs {
    tracks: Vec<Track>,
}

impl LikedSongs {
    pub fn new(tracks: Vec<Track>) -> Self {
        let mut liked = Self::default();
        for track in tracks {
            if !liked.contains(&track.id) {
                liked.tracks.push(track);
            }
        }
        liked
    }

    /// Flip membership; returns whether the track is liked afterwards.
    pub fn toggle(&mut self, track: &Track) -> bool {
        if let Some(pos) = self.tracks.iter().position(|t| t.id == track.id) {
            self.tracks.remove(pos);
            false
        } else {
            self.tracks.push(track.clone());
            true
        }
    }

    pub fn contains(&self, id: &TrackId) -> bool {
        self.tracks.iter().any(|t| &t.id == id)
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Playlist {
    pub name: String,
    #[serde(default)]
    pub tracks: Vec<Track>,
}

impl Playlist {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tracks: Vec::new(),
        }
    }

    /// Append unless a track with the same id is already there.
    pub fn add(&mut self, track: Track) -> bool {
        if self.contains(&track.id) {
            return false;
        }
        self.tracks.push(track);
        true
    }

    pub fn remove(&mut self, id: &TrackId) -> bool {
        match self.tracks.iter().position(|t| &t.id == id) {
            Some(pos) => {
                self.tracks.remove(pos);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, id: &TrackId) -> bool {
        self.tracks.iter().any(|t| &t.id == id)
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    fn is_named(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name.trim())
    }
}

fn clean_name(name: &str) -> Result<String, CollectionError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(CollectionError::InvalidName);
    }
    Ok(name.to_string())
}

// Files edited by hand can break the name and track rules; the first
// playlist with a given name wins and repeated track ids are dropped.
fn normalize_playlists(loaded: Vec<Playlist>) -> Vec<Playlist> {
    let mut playlists: Vec<Playlist> = Vec::with_capacity(loaded.len());
    for playlist in loaded {
        let Ok(name) = clean_name(&playlist.name) else {
            warn!("Skipping playlist with an empty name");
            continue;
        };
        if playlists.iter().any(|p| p.is_named(&name)) {
            warn!("Skipping duplicate playlist '{}'", name);
            continue;
        }

        let mut cleaned = Playlist::new(name);
        let total = playlist.tracks.len();
        for track in playlist.tracks {
            cleaned.add(track);
        }
        if cleaned.len() < total {
            warn!(
                "Dropped {} repeated tracks from playlist '{}'",
                total - cleaned.len(),
                cleaned.name
            );
        }
        playlists.push(cleaned);
    }
    playlists
}

/// Owns the in-memory collections and writes them through `S`.
pub struct CollectionsStore<S: CollectionStorage> {
    storage: S,
    liked: LikedSongs,
    playlists: Vec<Playlist>,
}

impl<S: CollectionStorage> CollectionsStore<S> {
    /// Load both collections. Anything unreadable starts empty.
    pub fn open(storage: S) -> Self {
        let liked = storage.load_liked().unwrap_or_else(|e| {
            warn!("Could not load liked songs: {}", e);
            Vec::new()
        });
        let playlists = storage.load_playlists().unwrap_or_else(|e| {
            warn!("Could not load playlists: {}", e);
            Vec::new()
        });
        let playlists = normalize_playlists(playlists);

        info!(
            "Loaded {} liked songs and {} playlists",
            liked.len(),
            playlists.len()
        );
        Self {
            storage,
            liked: LikedSongs::new(liked),
            playlists,
        }
    }

    pub fn toggle_like(&mut self, track: &Track) -> bool {
        let liked = self.liked.toggle(track);
        if liked {
            info!("Liked '{}'", track);
        } else {
            info!("Unliked '{}'", track);
        }
        self.persist_liked();
        liked
    }

    pub fn is_liked(&self, id: &TrackId) -> bool {
        self.liked.contains(id)
    }

    pub fn liked_songs(&self) -> &[Track] {
        self.liked.tracks()
    }

    pub fn playlists(&self) -> &[Playlist] {
        &self.playlists
    }

    /// Lookup is case-insensitive, same as the uniqueness rule.
    pub fn playlist(&self, name: &str) -> Option<&Playlist> {
        self.playlists.iter().find(|p| p.is_named(name))
    }

    pub fn playlist_tracks(&self, name: &str) -> Result<Vec<Track>, CollectionError> {
        self.playlist(name)
            .map(|p| p.tracks.clone())
            .ok_or_else(|| CollectionError::PlaylistNotFound(name.trim().to_string()))
    }

    /// Returns the stored (trimmed) name.
    pub fn create_playlist(&mut self, name: &str) -> Result<String, CollectionError> {
        let name = clean_name(name)?;
        if self.playlist(&name).is_some() {
            warn!("Playlist already exists: {}", name);
            return Err(CollectionError::PlaylistExists(name));
        }

        self.playlists.push(Playlist::new(name.clone()));
        info!("Created new playlist: '{}'", name);
        self.persist_playlists();
        Ok(name)
    }

    /// Returns false if there was no such playlist.
    pub fn delete_playlist(&mut self, name: &str) -> bool {
        let before = self.playlists.len();
        self.playlists.retain(|p| !p.is_named(name));
        if self.playlists.len() == before {
            return false;
        }

        info!("Deleted playlist: '{}'", name.trim());
        self.persist_playlists();
        true
    }

    pub fn rename_playlist(&mut self, old: &str, new: &str) -> Result<(), CollectionError> {
        let new = clean_name(new)?;
        let index = self.index_of(old)?;
        if self
            .playlists
            .iter()
            .enumerate()
            .any(|(i, p)| i != index && p.is_named(&new))
        {
            return Err(CollectionError::PlaylistExists(new));
        }

        let old_name = std::mem::replace(&mut self.playlists[index].name, new.clone());
        info!("Renamed playlist '{}' to '{}'", old_name, new);
        self.persist_playlists();
        Ok(())
    }

    /// Returns whether the track was added (false if it was already there).
    pub fn add_to_playlist(&mut self, name: &str, track: Track) -> Result<bool, CollectionError> {
        let index = self.index_of(name)?;
        let label = track.to_string();
        let added = self.playlists[index].add(track);
        if added {
            info!("Added '{}' to playlist '{}'", label, self.playlists[index].name);
            self.persist_playlists();
        }
        Ok(added)
    }

    pub fn remove_from_playlist(&mut self, name: &str, id: &TrackId) -> Result<bool, CollectionError> {
        let index = self.index_of(name)?;
        let removed = self.playlists[index].remove(id);
        if removed {
            info!("Removed track {} from playlist '{}'", id, self.playlists[index].name);
            self.persist_playlists();
        }
        Ok(removed)
    }

    fn index_of(&self, name: &str) -> Result<usize, CollectionError> {
        self.playlists
            .iter()
            .position(|p| p.is_named(name))
            .ok_or_else(|| CollectionError::PlaylistNotFound(name.trim().to_string()))
    }

    fn persist_liked(&self) {
        if let Err(e) = self.storage.save_liked(self.liked.tracks()) {
            warn!("Could not save liked songs: {}", e);
        }
    }

    fn persist_playlists(&self) {
        if let Err(e) = self.storage.save_playlists(&self.playlists) {
            warn!("Could not save playlists: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn song(id: &str) -> Track {
        Track::new(id, format!("Song {id}"), "Band").with_preview(format!("https://cdn.example/{id}.m4a"))
    }

    fn store() -> (CollectionsStore<MemoryStorage>, MemoryStorage) {
        let storage = MemoryStorage::new();
        (CollectionsStore::open(storage.clone()), storage)
    }

    #[test]
    fn test_toggle_like_twice_restores_membership() {
        let (mut store, storage) = store();
        let track = song("1");

        assert!(!store.is_liked(&track.id));
        assert!(store.toggle_like(&track));
        assert!(store.is_liked(&track.id));
        assert_eq!(storage.saved_liked().len(), 1);

        assert!(!store.toggle_like(&track));
        assert!(!store.is_liked(&track.id));
        assert!(storage.saved_liked().is_empty());
        assert_eq!(storage.write_count(), 2);
    }

    #[test]
    fn test_create_playlist_rules() {
        let (mut store, storage) = store();

        assert_eq!(store.create_playlist("  Chill  ").unwrap(), "Chill");
        assert!(matches!(
            store.create_playlist("chill"),
            Err(CollectionError::PlaylistExists(_))
        ));
        assert!(matches!(
            store.create_playlist("   "),
            Err(CollectionError::InvalidName)
        ));
        assert_eq!(store.playlists().len(), 1);
        assert_eq!(storage.saved_playlists()[0].name, "Chill");
    }

    #[test]
    fn test_add_to_playlist_deduplicates() {
        let (mut store, _) = store();
        store.create_playlist("Mix").unwrap();

        assert!(store.add_to_playlist("Mix", song("1")).unwrap());
        assert!(store.add_to_playlist("mix", song("2")).unwrap());
        assert!(!store.add_to_playlist("Mix", song("1")).unwrap());

        let ids: Vec<_> = store
            .playlist_tracks("Mix")
            .unwrap()
            .into_iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(ids, vec![TrackId::new("1"), TrackId::new("2")]);

        assert!(matches!(
            store.add_to_playlist("Nope", song("3")),
            Err(CollectionError::PlaylistNotFound(_))
        ));
    }

    #[test]
    fn test_remove_and_delete() {
        let (mut store, storage) = store();
        store.create_playlist("Mix").unwrap();
        store.add_to_playlist("Mix", song("1")).unwrap();

        assert!(store.remove_from_playlist("Mix", &TrackId::new("1")).unwrap());
        assert!(!store.remove_from_playlist("Mix", &TrackId::new("1")).unwrap());
        assert!(store.playlist("Mix").unwrap().is_empty());

        assert!(store.delete_playlist("MIX"));
        assert!(!store.delete_playlist("Mix"));
        assert!(storage.saved_playlists().is_empty());
    }

    #[test]
    fn test_rename_playlist() {
        let (mut store, _) = store();
        store.create_playlist("Old").unwrap();
        store.create_playlist("Taken").unwrap();

        assert!(matches!(
            store.rename_playlist("Old", "taken"),
            Err(CollectionError::PlaylistExists(_))
        ));
        // Changing only the case of its own name is fine
        store.rename_playlist("Old", "OLD").unwrap();
        store.rename_playlist("old", " New ").unwrap();
        assert!(store.playlist("New").is_some());
        assert!(store.playlist("Old").is_none());
        assert!(matches!(
            store.rename_playlist("Ghost", "Whatever"),
            Err(CollectionError::PlaylistNotFound(_))
        ));
    }

    #[test]
    fn test_duplicate_playlists_normalized_on_load() {
        let mut first = Playlist::new(" Mix ");
        first.tracks = vec![song("1"), song("1"), song("2")];
        let mut second = Playlist::new("mix");
        second.tracks = vec![song("3")];
        let storage = MemoryStorage::with_contents(vec![], vec![first, second, Playlist::new("  ")]);

        let mut store = CollectionsStore::open(storage);
        assert_eq!(store.playlists().len(), 1);
        let mix = store.playlist("MIX").unwrap();
        assert_eq!(mix.name, "Mix");
        let ids: Vec<_> = mix.tracks.iter().map(|t| t.id.clone()).collect();
        assert_eq!(ids, vec![TrackId::new("1"), TrackId::new("2")]);

        // Lookups and removals see one playlist and one copy of each track
        assert!(store.remove_from_playlist("mix", &TrackId::new("1")).unwrap());
        assert!(!store.playlist("Mix").unwrap().contains(&TrackId::new("1")));
        assert!(matches!(
            store.create_playlist("MIX"),
            Err(CollectionError::PlaylistExists(_))
        ));
    }

    #[test]
    fn test_failed_save_keeps_memory_state() {
        let (mut store, storage) = store();
        storage.set_fail_writes(true);

        assert!(store.toggle_like(&song("1")));
        store.create_playlist("Offline").unwrap();

        assert!(store.is_liked(&TrackId::new("1")));
        assert!(store.playlist("Offline").is_some());
        assert_eq!(storage.write_count(), 0);
    }

    #[test]
    fn test_reopen_from_json_files() {
        let dir = TempDir::new().unwrap();
        {
            let mut store = CollectionsStore::open(JsonFileStorage::new(dir.path()));
            store.toggle_like(&song("7"));
            store.create_playlist("Gym").unwrap();
            store.add_to_playlist("Gym", song("8")).unwrap();
        }

        let store = CollectionsStore::open(JsonFileStorage::new(dir.path()));
        assert!(store.is_liked(&TrackId::new("7")));
        assert_eq!(store.playlist_tracks("gym").unwrap()[0].id, TrackId::new("8"));
    }

    #[test]
    fn test_corrupt_files_load_empty() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(storage::LIKED_SONGS_FILE), "[{\"broken\"").unwrap();
        fs::write(dir.path().join(storage::PLAYLISTS_FILE), "nope").unwrap();

        let store = CollectionsStore::open(JsonFileStorage::new(dir.path()));
        assert!(store.liked_songs().is_empty());
        assert!(store.playlists().is_empty());
    }
}
