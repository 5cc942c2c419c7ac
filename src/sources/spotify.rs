use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;
use std::{sync::Arc, time::Duration};
use tokio::time::Instant;
use tracing::{debug, info};

use super::{classify, ytdlp::SearchSite, LinkKind, Resolution, SpotifyKind, TrackSource, YtDlpClient};
use crate::{
    audio::track::{PendingTrack, Track},
    error::{PlayerError, PlayerResult},
};

const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
const API_URL: &str = "https://api.spotify.com/v1";

#[derive(Deserialize)]
struct SpotifyToken {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct SpotifyArtist {
    name: String,
}

#[derive(Debug, Deserialize)]
struct SpotifyTrack {
    name: String,
    artists: Vec<SpotifyArtist>,
}

impl SpotifyTrack {
    /// Texto de búsqueda "artista - título"
    fn search_query(&self) -> String {
        match self.artists.first() {
            Some(artist) => format!("{} - {}", artist.name, self.name),
            None => self.name.clone(),
        }
    }
}

#[derive(Deserialize)]
struct AlbumTracks {
    items: Vec<SpotifyTrack>,
}

#[derive(Deserialize)]
struct PlaylistItem {
    track: Option<SpotifyTrack>,
}

#[derive(Deserialize)]
struct PlaylistTracks {
    items: Vec<PlaylistItem>,
}

/// Cliente de la Web API de Spotify (client credentials).
///
/// Spotify no sirve audio: un track se busca en YouTube al momento, y los
/// álbumes y playlists se expanden en tracks diferidos que se resuelven justo
/// antes de sonar.
pub struct SpotifyClient {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
    max_playlist_size: usize,
    youtube: Arc<YtDlpClient>,
    token: Mutex<Option<(String, Instant)>>,
}

impl SpotifyClient {
    pub fn new(
        http: reqwest::Client,
        client_id: String,
        client_secret: String,
        max_playlist_size: usize,
        youtube: Arc<YtDlpClient>,
    ) -> Self {
        Self {
            http,
            client_id,
            client_secret,
            max_playlist_size,
            youtube,
            token: Mutex::new(None),
        }
    }

    async fn access_token(&self) -> PlayerResult<String> {
        let cached = self.token.lock().clone();
        if let Some((token, expires_at)) = cached {
            if Instant::now() < expires_at {
                return Ok(token);
            }
        }

        debug!("🔑 Renovando token de Spotify");
        let token: SpotifyToken = self
            .http
            .post(TOKEN_URL)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(resolution_error)?
            .json()
            .await
            .map_err(resolution_error)?;

        // Margen para no usar un token a punto de caducar
        let lifetime = Duration::from_secs(token.expires_in.saturating_sub(30));
        *self.token.lock() = Some((token.access_token.clone(), Instant::now() + lifetime));
        Ok(token.access_token)
    }

    async fn get<T: for<'de> Deserialize<'de>>(&self, path: &str) -> PlayerResult<T> {
        let token = self.access_token().await?;
        self.http
            .get(format!("{}{}", API_URL, path))
            .bearer_auth(token)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(resolution_error)?
            .json()
            .await
            .map_err(resolution_error)
    }

    async fn get_track(&self, id: &str) -> PlayerResult<Resolution> {
        let track: SpotifyTrack = self.get(&format!("/tracks/{}", id)).await?;
        self.youtube.search(&track.search_query(), SearchSite::YouTube).await
    }

    async fn get_album(&self, id: &str) -> PlayerResult<Vec<SpotifyTrack>> {
        let limit = self.max_playlist_size.clamp(1, 50);
        let album: AlbumTracks = self
            .get(&format!("/albums/{}/tracks?limit={}", id, limit))
            .await?;
        Ok(album.items)
    }

    async fn get_playlist(&self, id: &str) -> PlayerResult<Vec<SpotifyTrack>> {
        let limit = self.max_playlist_size.clamp(1, 100);
        let playlist: PlaylistTracks = self
            .get(&format!("/playlists/{}/tracks?limit={}", id, limit))
            .await?;
        Ok(playlist.items.into_iter().filter_map(|item| item.track).collect())
    }
}

#[async_trait]
impl TrackSource for SpotifyClient {
    async fn resolve(&self, query: &str) -> PlayerResult<Resolution> {
        let (kind, id) = match classify(query) {
            LinkKind::Spotify { kind, id } => (kind, id),
            _ => return Ok(Resolution::NotFound),
        };

        let tracks = match kind {
            SpotifyKind::Track => return self.get_track(&id).await,
            SpotifyKind::Album => self.get_album(&id).await?,
            SpotifyKind::Playlist => self.get_playlist(&id).await?,
        };

        info!("🎧 Spotify {:?} {} con {} tracks", kind, id, tracks.len());
        Ok(pending_tracks(tracks, self.max_playlist_size))
    }

    fn source_name(&self) -> &'static str {
        "spotify"
    }
}

fn pending_tracks(tracks: Vec<SpotifyTrack>, max: usize) -> Resolution {
    let pending: Vec<Track> = tracks
        .iter()
        .take(max)
        .map(|track| PendingTrack::new(track.search_query()).into())
        .collect();

    if pending.is_empty() {
        Resolution::NotFound
    } else {
        Resolution::Playlist(pending)
    }
}

fn resolution_error(error: reqwest::Error) -> PlayerError {
    PlayerError::TrackResolutionFailed(format!("Spotify: {}", error))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_playlist_items_become_pending_tracks() {
        let body = r#"{"items":[
            {"track":{"name":"One More Time","artists":[{"name":"Daft Punk"}]}},
            {"track":null},
            {"track":{"name":"Aerodynamic","artists":[]}}
        ]}"#;
        let playlist: PlaylistTracks = serde_json::from_str(body).unwrap();
        let tracks = playlist.items.into_iter().filter_map(|i| i.track).collect();

        assert_eq!(
            pending_tracks(tracks, 10),
            Resolution::Playlist(vec![
                PendingTrack::new("Daft Punk - One More Time").into(),
                PendingTrack::new("Aerodynamic").into(),
            ])
        );
    }

    #[test]
    fn test_pending_tracks_respects_limit() {
        let tracks = (0..5)
            .map(|n| SpotifyTrack {
                name: format!("Song {}", n),
                artists: vec![SpotifyArtist { name: "A".into() }],
            })
            .collect();
        match pending_tracks(tracks, 2) {
            Resolution::Playlist(tracks) => assert_eq!(tracks.len(), 2),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(pending_tracks(Vec::new(), 2), Resolution::NotFound);
    }
}
