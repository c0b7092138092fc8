use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque catalog identifier. Equality on this is the only notion of
/// "same track" anywhere in the crate (queue lookups, likes, playlists).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackId(String);

impl TrackId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<u64> for TrackId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl From<&str> for TrackId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A catalog item. Immutable once fetched; only `preview_url` matters to playback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: TrackId,
    pub title: String,
    pub artist: String,
    #[serde(default)]
    pub artwork_url: Option<String>,
    #[serde(default)]
    pub preview_url: Option<String>,
}

// Catalog artwork comes back at 100x100; the size is baked into the URL path.
const ARTWORK_SIZE_MARKER: &str = "100x100bb";

impl Track {
    pub fn new(id: impl Into<TrackId>, title: impl Into<String>, artist: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            artist: artist.into(),
            artwork_url: None,
            preview_url: None,
        }
    }

    pub fn with_preview(mut self, url: impl Into<String>) -> Self {
        self.preview_url = Some(url.into());
        self
    }

    pub fn with_artwork(mut self, url: impl Into<String>) -> Self {
        self.artwork_url = Some(url.into());
        self
    }

    /// The preview locator as it should be handed to the device, if any.
    pub fn preview(&self) -> Option<&str> {
        self.preview_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }

    /// A track without a preview locator can never be handed to the device.
    pub fn is_playable(&self) -> bool {
        self.preview().is_some()
    }

    /// Artwork URL rewritten to a `size`x`size` rendition, if the catalog URL
    /// follows the usual sizing scheme.
    pub fn artwork_at(&self, size: u32) -> Option<String> {
        self.artwork_url.as_ref().map(|url| {
            url.replace(ARTWORK_SIZE_MARKER, &format!("{size}x{size}bb"))
        })
    }

    pub fn display_title(&self) -> &str {
        if self.title.trim().is_empty() {
            "Unknown"
        } else {
            &self.title
        }
    }

    pub fn display_artist(&self) -> &str {
        if self.artist.trim().is_empty() {
            "Unknown Artist"
        } else {
            &self.artist
        }
    }
}

impl From<String> for TrackId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.display_title(), self.display_artist())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_playability_requires_preview() {
        let bare = Track::new("1", "Song", "Band");
        assert!(!bare.is_playable());

        let blank = Track::new("2", "Song", "Band").with_preview("   ");
        assert!(!blank.is_playable());

        let ok = Track::new("3", "Song", "Band").with_preview("https://cdn.example/3.m4a");
        assert!(ok.is_playable());

        let padded = Track::new("4", "Song", "Band").with_preview("  https://cdn.example/4.m4a\n");
        assert!(padded.is_playable());
        assert_eq!(padded.preview(), Some("https://cdn.example/4.m4a"));
        assert_eq!(blank.preview(), None);
    }

    #[test]
    fn test_artwork_resize() {
        let track = Track::new("1", "Song", "Band")
            .with_artwork("https://img.example/a/100x100bb.jpg");
        assert_eq!(
            track.artwork_at(600).as_deref(),
            Some("https://img.example/a/600x600bb.jpg")
        );
        assert_eq!(Track::new("2", "x", "y").artwork_at(600), None);
    }

    #[test]
    fn test_serde_shape() {
        let track = Track::new(42u64, "Song", "Band").with_preview("https://cdn.example/42.m4a");
        let json = serde_json::to_string(&track).unwrap();
        assert!(json.contains("\"id\":\"42\""));

        // Older documents may omit optional fields entirely
        let parsed: Track = serde_json::from_str(r#"{"id":"7","title":"T","artist":"A"}"#).unwrap();
        assert_eq!(parsed.id, TrackId::new("7"));
        assert!(parsed.preview_url.is_none());
    }

    #[test]
    fn test_display_fallbacks() {
        let track = Track::new("1", "", " ");
        assert_eq!(track.to_string(), "Unknown - Unknown Artist");
    }
}
