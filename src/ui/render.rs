// Text rendering for the shell

use crate::audio::{PlaybackState, Track, TrackId, TransportSnapshot};
use crate::collections::Playlist;

const BAR_WIDTH: usize = 24;
const ARTWORK_SIZE: u32 = 600;

/// Seconds as m:ss
pub fn format_time(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds as u64
    } else {
        0
    };
    format!("{}:{:02}", total / 60, total % 60)
}

pub fn progress_bar(progress: f64) -> String {
    let filled = ((progress.clamp(0.0, 1.0) * BAR_WIDTH as f64).round() as usize).min(BAR_WIDTH);
    format!("[{}{}]", "#".repeat(filled), "-".repeat(BAR_WIDTH - filled))
}

fn state_label(state: PlaybackState) -> &'static str {
    match state {
        PlaybackState::Idle => "idle",
        PlaybackState::Loading => "loading",
        PlaybackState::Playing => "playing",
        PlaybackState::Paused => "paused",
    }
}

pub fn status_line(snapshot: &TransportSnapshot, liked: bool) -> String {
    let Some(track) = &snapshot.current_track else {
        return "Nothing playing".to_string();
    };

    let heart = if liked { " <3" } else { "" };
    let volume = if snapshot.muted {
        "muted".to_string()
    } else {
        format!("vol {}%", (snapshot.volume * 100.0).round() as u32)
    };

    let mut line = format!(
        "{} [{}]{}\n{} {} / {}  {}  queue {}/{}",
        track,
        state_label(snapshot.state),
        heart,
        progress_bar(snapshot.progress()),
        format_time(snapshot.current_time),
        format_time(snapshot.duration),
        volume,
        snapshot.cursor + 1,
        snapshot.queue_len,
    );
    if let Some(artwork) = track.artwork_at(ARTWORK_SIZE) {
        line.push_str("\nartwork ");
        line.push_str(&artwork);
    }
    line
}

pub fn now_playing(snapshot: &TransportSnapshot) -> Option<String> {
    snapshot
        .current_track
        .as_ref()
        .map(|track| format!("Now playing: {}", track))
}

/// Numbered list; the current track gets a marker and unplayable ones a note.
pub fn track_list(tracks: &[Track], current: Option<&TrackId>) -> String {
    if tracks.is_empty() {
        return "  (empty)".to_string();
    }

    tracks
        .iter()
        .enumerate()
        .map(|(i, track)| {
            let marker = if current == Some(&track.id) { ">" } else { " " };
            let note = if track.is_playable() { "" } else { "  (no preview)" };
            format!("{} {:>3}. {}{}", marker, i + 1, track, note)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn playlist_list(playlists: &[Playlist]) -> String {
    if playlists.is_empty() {
        return "  (no playlists)".to_string();
    }

    playlists
        .iter()
        .map(|p| {
            let noun = if p.len() == 1 { "track" } else { "tracks" };
            format!("  {} ({} {})", p.name, p.len(), noun)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn song(id: &str) -> Track {
        Track::new(id, format!("Song {id}"), "Band").with_preview(format!("https://cdn.example/{id}.m4a"))
    }

    #[test]
    fn test_format_time() {
        assert_eq!(format_time(0.0), "0:00");
        assert_eq!(format_time(29.9), "0:29");
        assert_eq!(format_time(125.0), "2:05");
        assert_eq!(format_time(-3.0), "0:00");
        assert_eq!(format_time(f64::NAN), "0:00");
    }

    #[test]
    fn test_progress_bar_bounds() {
        assert_eq!(progress_bar(0.0), format!("[{}]", "-".repeat(BAR_WIDTH)));
        assert_eq!(progress_bar(2.0), format!("[{}]", "#".repeat(BAR_WIDTH)));
    }

    #[test]
    fn test_status_line() {
        let snapshot = TransportSnapshot {
            current_track: Some(song("1")),
            state: PlaybackState::Playing,
            current_time: 15.0,
            duration: 30.0,
            queue_len: 3,
            cursor: 1,
            volume: 0.5,
            muted: false,
        };
        let line = status_line(&snapshot, true);
        assert!(line.starts_with("Song 1 - Band [playing] <3"));
        assert!(line.contains("0:15 / 0:30"));
        assert!(line.contains("vol 50%"));
        assert!(line.contains("queue 2/3"));
        assert!(!line.contains("artwork"));

        let with_art = TransportSnapshot {
            current_track: Some(song("2").with_artwork("https://img.example/2/100x100bb.jpg")),
            ..snapshot.clone()
        };
        let line = status_line(&with_art, false);
        assert_eq!(
            line.lines().last(),
            Some("artwork https://img.example/2/600x600bb.jpg")
        );

        let idle = TransportSnapshot {
            current_track: None,
            state: PlaybackState::Idle,
            ..snapshot
        };
        assert_eq!(status_line(&idle, false), "Nothing playing");
    }

    #[test]
    fn test_track_list_marks_current_and_unplayable() {
        let tracks = vec![song("1"), Track::new("2", "Quiet", "Band")];
        let listing = track_list(&tracks, Some(&TrackId::new("1")));
        let lines: Vec<_> = listing.lines().collect();
        assert_eq!(lines[0], ">   1. Song 1 - Band");
        assert_eq!(lines[1], "    2. Quiet - Band  (no preview)");
    }
}
