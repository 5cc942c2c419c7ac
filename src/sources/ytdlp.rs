use async_process::Command;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, info};

use super::{classify, LinkKind, Resolution, TrackSource};
use crate::{
    audio::track::{ResolvedTrack, Track},
    error::{PlayerError, PlayerResult},
};

/// Plataforma de búsqueda de yt-dlp
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchSite {
    YouTube,
    SoundCloud,
}

impl SearchSite {
    fn prefix(self) -> &'static str {
        match self {
            Self::YouTube => "ytsearch1",
            Self::SoundCloud => "scsearch1",
        }
    }
}

/// Información extraída de yt-dlp (`--dump-json`, una línea por entrada)
#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    id: Option<String>,
    title: Option<String>,
    duration: Option<f64>,
    webpage_url: Option<String>,
    url: Option<String>,
    extractor_key: Option<String>,
    ie_key: Option<String>,
}

impl YtDlpInfo {
    fn is_youtube(&self) -> bool {
        self.extractor_key
            .as_deref()
            .or(self.ie_key.as_deref())
            .is_some_and(|key| key.starts_with("Youtube"))
    }

    fn into_track(self, source_query: &str) -> Option<ResolvedTrack> {
        let is_youtube = self.is_youtube();
        let uri = self.webpage_url.or(self.url)?;
        let title = self.title.unwrap_or_else(|| uri.clone());

        let mut track = ResolvedTrack::new(title, uri).with_source_query(source_query);
        if let Some(seconds) = self.duration.filter(|d| d.is_finite() && *d > 0.0) {
            track = track.with_duration(Duration::from_secs_f64(seconds));
        }
        if is_youtube {
            if let Some(id) = self.id {
                track = track.with_identifier(id);
            }
        }
        Some(track)
    }
}

/// Cliente de yt-dlp: videos y playlists de YouTube y SoundCloud, y búsquedas.
pub struct YtDlpClient {
    binary: String,
    max_playlist_size: usize,
    // Limitar procesos concurrentes de yt-dlp
    rate_limiter: Semaphore,
}

impl YtDlpClient {
    pub fn new(binary: impl Into<String>, max_playlist_size: usize) -> Self {
        Self {
            binary: binary.into(),
            max_playlist_size,
            rate_limiter: Semaphore::new(3),
        }
    }

    /// Metadata de un único video o track
    pub async fn get_track(&self, url: &str) -> PlayerResult<Resolution> {
        let stdout = self
            .run(&["--no-playlist", "--dump-json", "--no-warnings", url])
            .await?;
        Ok(first_track(parse_entries(&stdout, url)))
    }

    /// Entradas de una playlist (sin extraer cada video)
    pub async fn get_playlist(&self, url: &str) -> PlayerResult<Vec<ResolvedTrack>> {
        info!("📋 Obteniendo playlist: {}", url);
        let limit = self.max_playlist_size.to_string();
        let stdout = self
            .run(&[
                "--flat-playlist",
                "--dump-json",
                "--playlist-end",
                &limit,
                "--no-warnings",
                url,
            ])
            .await?;
        Ok(parse_entries(&stdout, url))
    }

    /// Primer resultado de búsqueda en `site`
    pub async fn search(&self, query: &str, site: SearchSite) -> PlayerResult<Resolution> {
        info!("🔍 Buscando ({:?}): {}", site, query);
        let search = format!("{}:{}", site.prefix(), query);
        let stdout = self
            .run(&[
                "--no-playlist",
                "--dump-json",
                "--flat-playlist",
                "--skip-download",
                "--no-warnings",
                &search,
            ])
            .await?;
        Ok(first_track(parse_entries(&stdout, query)))
    }

    async fn run(&self, args: &[&str]) -> PlayerResult<String> {
        let _permit = self
            .rate_limiter
            .acquire()
            .await
            .map_err(|e| PlayerError::TrackResolutionFailed(e.to_string()))?;

        debug!("yt-dlp {:?}", args);
        let output = Command::new(&self.binary)
            .args(args)
            .output()
            .await
            .map_err(|e| PlayerError::TrackResolutionFailed(format!("Error al ejecutar yt-dlp: {}", e)))?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            return Err(PlayerError::TrackResolutionFailed(format!(
                "yt-dlp error: {}",
                error.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl TrackSource for YtDlpClient {
    async fn resolve(&self, query: &str) -> PlayerResult<Resolution> {
        match classify(query) {
            LinkKind::YouTubeVideo { video_id } => {
                self.get_track(&format!("https://www.youtube.com/watch?v={}", video_id))
                    .await
            }
            LinkKind::YouTubeVideoInPlaylist { video_id, playlist_id } => {
                let video_url = format!("https://www.youtube.com/watch?v={}", video_id);
                let mut tracks: Vec<Track> = self.get_track(&video_url).await?.into_tracks();
                let playlist_url = format!("https://www.youtube.com/playlist?list={}", playlist_id);
                tracks.extend(
                    self.get_playlist(&playlist_url)
                        .await?
                        .into_iter()
                        .filter(|track| track.identifier.as_deref() != Some(video_id.as_str()))
                        .map(Track::from),
                );
                Ok(playlist_or_not_found(tracks))
            }
            LinkKind::YouTubePlaylist { playlist_id } => {
                let url = format!("https://www.youtube.com/playlist?list={}", playlist_id);
                let tracks = self.get_playlist(&url).await?.into_iter().map(Track::from).collect();
                Ok(playlist_or_not_found(tracks))
            }
            LinkKind::SoundCloudTrack { url } => self.get_track(&url).await,
            LinkKind::SoundCloudSet { url } => {
                let tracks = self.get_playlist(&url).await?.into_iter().map(Track::from).collect();
                Ok(playlist_or_not_found(tracks))
            }
            LinkKind::Search(text) => match self.search(&text, SearchSite::YouTube).await? {
                Resolution::NotFound => self.search(&text, SearchSite::SoundCloud).await,
                found => Ok(found),
            },
            LinkKind::Spotify { .. } | LinkKind::Unmatched(_) => Ok(Resolution::NotFound),
        }
    }

    fn source_name(&self) -> &'static str {
        "yt-dlp"
    }
}

fn parse_entries(stdout: &str, source_query: &str) -> Vec<ResolvedTrack> {
    stdout
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| serde_json::from_str::<YtDlpInfo>(line).ok())
        .filter_map(|info| info.into_track(source_query))
        .collect()
}

fn first_track(tracks: Vec<ResolvedTrack>) -> Resolution {
    tracks
        .into_iter()
        .next()
        .map(|track| Resolution::Single(track.into()))
        .unwrap_or(Resolution::NotFound)
}

fn playlist_or_not_found(tracks: Vec<Track>) -> Resolution {
    if tracks.is_empty() {
        Resolution::NotFound
    } else {
        Resolution::Playlist(tracks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_youtube_entry() {
        let stdout = r#"{"id":"dQw4w9WgXcQ","title":"Never Gonna Give You Up","duration":213.0,"webpage_url":"https://www.youtube.com/watch?v=dQw4w9WgXcQ","extractor_key":"Youtube"}"#;
        let tracks = parse_entries(stdout, "rick astley");
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].title, "Never Gonna Give You Up");
        assert_eq!(tracks[0].identifier.as_deref(), Some("dQw4w9WgXcQ"));
        assert_eq!(tracks[0].duration, Some(Duration::from_secs(213)));
        assert_eq!(tracks[0].source_query, "rick astley");
    }

    #[test]
    fn test_parse_flat_playlist_skips_garbage() {
        let stdout = "\
{\"id\":\"a1\",\"title\":\"One\",\"url\":\"https://www.youtube.com/watch?v=a1\",\"ie_key\":\"Youtube\"}
not json
{\"id\":\"123\",\"title\":\"Two\",\"url\":\"https://soundcloud.com/x/two\",\"ie_key\":\"Soundcloud\",\"duration\":null}
{\"id\":\"nourl\",\"title\":\"Missing\"}
";
        let tracks = parse_entries(stdout, "list");
        let titles: Vec<&str> = tracks.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["One", "Two"]);
        assert_eq!(tracks[1].identifier, None);
        assert_eq!(tracks[1].duration, None);
    }

    #[test]
    fn test_first_track_of_empty_output_is_not_found() {
        assert_eq!(first_track(parse_entries("", "q")), Resolution::NotFound);
    }
}
