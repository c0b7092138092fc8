// riffbox library - preview player core plus the pieces around it
// Playback never depends on the UI; the shell only talks to a PlayerHandle.

pub mod audio;       // tracks, output adapters, queue, controller, player service
pub mod collections; // liked songs and playlists
pub mod config;      // settings and preferences
pub mod ui;          // line-oriented shell

#[cfg(feature = "catalog")]
pub mod catalog;     // remote search

// Export the stuff other modules actually use
pub use audio::{PlaybackController, PlayerHandle, PlayerService, Track, TrackId, TransportSnapshot};
pub use collections::CollectionsStore;
pub use config::Config;
