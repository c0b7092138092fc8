// Where liked songs and playlists live between sessions
// Both collections are written out in full on every change; there is no
// versioning, a file either parses or it is treated as empty.

use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

use super::{CollectionError, Playlist};
use crate::audio::Track;

pub const LIKED_SONGS_FILE: &str = "liked_songs.json";
pub const PLAYLISTS_FILE: &str = "playlists.json";

pub trait CollectionStorage {
    fn load_liked(&self) -> Result<Vec<Track>, CollectionError>;
    fn load_playlists(&self) -> Result<Vec<Playlist>, CollectionError>;
    fn save_liked(&self, liked: &[Track]) -> Result<(), CollectionError>;
    fn save_playlists(&self, playlists: &[Playlist]) -> Result<(), CollectionError>;
}

/// Pretty JSON files under one directory.
#[derive(Debug, Clone)]
pub struct JsonFileStorage {
    dir: PathBuf,
}

impl JsonFileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn read<T: serde::de::DeserializeOwned + Default>(&self, file: &str) -> Result<T, CollectionError> {
        let path = self.dir.join(file);
        if !path.exists() {
            debug!("{} does not exist yet, starting empty", path.display());
            return Ok(T::default());
        }
        let content = fs::read_to_string(&path)?;
        let value = serde_json::from_str(&content)?;
        info!("Loaded {}", path.display());
        Ok(value)
    }

    fn write<T: serde::Serialize + ?Sized>(&self, file: &str, value: &T) -> Result<(), CollectionError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(file);
        let json = serde_json::to_string_pretty(value)?;
        fs::write(&path, json)?;
        debug!("Saved {}", path.display());
        Ok(())
    }
}

impl CollectionStorage for JsonFileStorage {
    fn load_liked(&self) -> Result<Vec<Track>, CollectionError> {
        self.read(LIKED_SONGS_FILE)
    }

    fn load_playlists(&self) -> Result<Vec<Playlist>, CollectionError> {
        self.read(PLAYLISTS_FILE)
    }

    fn save_liked(&self, liked: &[Track]) -> Result<(), CollectionError> {
        self.write(LIKED_SONGS_FILE, liked)
    }

    fn save_playlists(&self, playlists: &[Playlist]) -> Result<(), CollectionError> {
        self.write(PLAYLISTS_FILE, playlists)
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    liked: Vec<Track>,
    playlists: Vec<Playlist>,
    fail_writes: bool,
    writes: usize,
}

/// In-memory backend; clones share the same contents so a test can keep one
/// to look at what the store persisted.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_contents(liked: Vec<Track>, playlists: Vec<Playlist>) -> Self {
        let storage = Self::new();
        {
            let mut state = storage.lock();
            state.liked = liked;
            state.playlists = playlists;
        }
        storage
    }

    /// Make every save fail, like a full disk.
    pub fn set_fail_writes(&self, fail: bool) {
        self.lock().fail_writes = fail;
    }

    pub fn saved_liked(&self) -> Vec<Track> {
        self.lock().liked.clone()
    }

    pub fn saved_playlists(&self) -> Vec<Playlist> {
        self.lock().playlists.clone()
    }

    /// Successful saves so far.
    pub fn write_count(&self) -> usize {
        self.lock().writes
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn check_writable(state: &MemoryState) -> Result<(), CollectionError> {
        if state.fail_writes {
            return Err(CollectionError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "storage is read-only",
            )));
        }
        Ok(())
    }
}

impl CollectionStorage for MemoryStorage {
    fn load_liked(&self) -> Result<Vec<Track>, CollectionError> {
        Ok(self.lock().liked.clone())
    }

    fn load_playlists(&self) -> Result<Vec<Playlist>, CollectionError> {
        Ok(self.lock().playlists.clone())
    }

    fn save_liked(&self, liked: &[Track]) -> Result<(), CollectionError> {
        let mut state = self.lock();
        Self::check_writable(&state)?;
        state.liked = liked.to_vec();
        state.writes += 1;
        Ok(())
    }

    fn save_playlists(&self, playlists: &[Playlist]) -> Result<(), CollectionError> {
        let mut state = self.lock();
        Self::check_writable(&state)?;
        state.playlists = playlists.to_vec();
        state.writes += 1;
        Ok(())
    }
}
