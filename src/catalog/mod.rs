//! Remote track search against the iTunes Search API.
//!
//! Search failures never reach the UI as errors: `search` logs and returns an
//! empty list, the way an empty result set would look. `try_search` keeps the
//! typed error for callers that care.

use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::audio::Track;
use crate::config::CatalogConfig;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Catalog returned status {0}")]
    Status(u16),

    #[error("Failed to parse catalog response: {0}")]
    Decode(String),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawResult {
    track_id: Option<u64>,
    track_name: Option<String>,
    artist_name: Option<String>,
    artwork_url100: Option<String>,
    preview_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<RawResult>,
}

impl RawResult {
    fn into_track(self) -> Option<Track> {
        let id = self.track_id?;
        let mut track = Track::new(
            id,
            self.track_name.unwrap_or_default(),
            self.artist_name.unwrap_or_default(),
        );
        if let Some(url) = self.artwork_url100.filter(|u| !u.is_empty()) {
            track = track.with_artwork(url);
        }
        if let Some(url) = self.preview_url.filter(|u| !u.trim().is_empty()) {
            track = track.with_preview(url);
        }
        Some(track)
    }
}

/// Turn a raw search response body into tracks. Entries without a track id
/// (collections, artists) are skipped.
pub fn parse_results(body: &str) -> Result<Vec<Track>, CatalogError> {
    let response: SearchResponse =
        serde_json::from_str(body).map_err(|e| CatalogError::Decode(e.to_string()))?;
    let total = response.results.len();
    let tracks: Vec<Track> = response
        .results
        .into_iter()
        .filter_map(RawResult::into_track)
        .collect();

    if tracks.len() < total {
        debug!("Skipped {} results without a track id", total - tracks.len());
    }
    Ok(tracks)
}

pub struct CatalogClient {
    http: Client,
    config: CatalogConfig,
}

impl CatalogClient {
    pub fn new(config: CatalogConfig) -> Result<Self, CatalogError> {
        let http = Client::builder()
            .timeout(config.timeout())
            .user_agent(format!("riffbox/{}", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { http, config })
    }

    /// Search, treating any failure as "no results".
    pub async fn search(&self, query: &str) -> Vec<Track> {
        match self.try_search(query).await {
            Ok(tracks) => tracks,
            Err(e) => {
                warn!("Error fetching from catalog: {}", e);
                Vec::new()
            }
        }
    }

    pub async fn try_search(&self, query: &str) -> Result<Vec<Track>, CatalogError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let params = self.query_params(query);
        debug!(endpoint = %self.config.endpoint, term = query, "Searching catalog");

        let response = self
            .http
            .get(&self.config.endpoint)
            .query(&params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(CatalogError::Status(status.as_u16()));
        }

        let body = response.text().await?;
        let tracks = parse_results(&body)?;
        info!("Search '{}' returned {} tracks", query, tracks.len());
        Ok(tracks)
    }

    fn query_params(&self, term: &str) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("term", term.to_string()),
            ("media", self.config.media.clone()),
            ("entity", self.config.entity.clone()),
            ("limit", self.config.limit().to_string()),
        ];
        if let Some(country) = self.config.country.as_ref().filter(|c| !c.is_empty()) {
            params.push(("country", country.clone()));
        }
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "resultCount": 3,
        "results": [
            {
                "wrapperType": "track",
                "trackId": 1440857781,
                "trackName": "Midnight City",
                "artistName": "M83",
                "artworkUrl100": "https://is1.example/image/100x100bb.jpg",
                "previewUrl": "https://audio.example/preview.m4a"
            },
            {
                "wrapperType": "collection",
                "collectionId": 99,
                "collectionName": "Not a song"
            },
            {
                "trackId": 42,
                "trackName": "No Preview",
                "artistName": "Somebody",
                "previewUrl": ""
            }
        ]
    }"#;

    #[test]
    fn test_parse_results() {
        let tracks = parse_results(SAMPLE).unwrap();
        assert_eq!(tracks.len(), 2);

        let first = &tracks[0];
        assert_eq!(first.id.as_str(), "1440857781");
        assert_eq!(first.title, "Midnight City");
        assert!(first.is_playable());
        assert_eq!(
            first.artwork_at(600).as_deref(),
            Some("https://is1.example/image/600x600bb.jpg")
        );

        assert!(!tracks[1].is_playable());
        assert!(tracks[1].artwork_url.is_none());
    }

    #[test]
    fn test_parse_empty_and_garbage() {
        assert!(parse_results(r#"{"resultCount":0,"results":[]}"#).unwrap().is_empty());
        assert!(parse_results("{}").unwrap().is_empty());
        assert!(matches!(parse_results("<html>"), Err(CatalogError::Decode(_))));
    }

    #[test]
    fn test_query_params() {
        let client = CatalogClient::new(CatalogConfig {
            limit: 0,
            country: Some("us".to_string()),
            ..CatalogConfig::default()
        })
        .unwrap();

        let params = client.query_params("daft punk");
        assert!(params.contains(&("term", "daft punk".to_string())));
        assert!(params.contains(&("media", "music".to_string())));
        assert!(params.contains(&("limit", "1".to_string())));
        assert!(params.contains(&("country", "us".to_string())));
    }

    #[tokio::test]
    async fn test_blank_query_skips_network() {
        let client = CatalogClient::new(CatalogConfig {
            endpoint: "http://127.0.0.1:9/unreachable".to_string(),
            ..CatalogConfig::default()
        })
        .unwrap();
        assert!(client.try_search("   ").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_search_failure_is_empty() {
        let client = CatalogClient::new(CatalogConfig {
            endpoint: "http://127.0.0.1:9/unreachable".to_string(),
            timeout_secs: 1,
            ..CatalogConfig::default()
        })
        .unwrap();
        assert!(client.search("anything").await.is_empty());
    }
}
