//! Resolución de tracks.
//!
//! [`classify`] decide, sin efectos, qué tipo de enlace (o búsqueda) es la
//! entrada del usuario; [`SourceRouter`] usa esa clasificación para elegir
//! la fuente concreta. Toda clasificación tiene un destino, incluida
//! [`LinkKind::Unmatched`].

pub mod router;
pub mod spotify;
pub mod ytdlp;

use async_trait::async_trait;
use regex::Regex;
use std::sync::LazyLock;
use url::Url;

use crate::{
    audio::track::{PendingTrack, ResolvedTrack, Track},
    error::{PlayerError, PlayerResult},
};

pub use router::SourceRouter;
pub use spotify::SpotifyClient;
pub use ytdlp::YtDlpClient;

static SPOTIFY_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://open\.spotify\.com/(?:intl-[a-zA-Z-]+/)?(album|playlist|track)/([a-zA-Z0-9]+)")
        .expect("valid spotify regex")
});

/// Resultado de resolver una entrada
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Single(Track),
    Playlist(Vec<Track>),
    NotFound,
}

impl Resolution {
    pub fn into_tracks(self) -> Vec<Track> {
        match self {
            Self::Single(track) => vec![track],
            Self::Playlist(tracks) => tracks,
            Self::NotFound => Vec::new(),
        }
    }
}

/// Trait común para todas las fuentes de música
#[async_trait]
pub trait TrackSource: Send + Sync {
    /// Resuelve una URL o texto de búsqueda.
    ///
    /// Los fallos se devuelven como `TrackResolutionFailed`; `NotFound` solo
    /// indica que no hubo resultados.
    async fn resolve(&self, query: &str) -> PlayerResult<Resolution>;

    /// Nombre de la fuente
    fn source_name(&self) -> &'static str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpotifyKind {
    Track,
    Album,
    Playlist,
}

/// Clasificación de la entrada del usuario
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkKind {
    YouTubeVideo { video_id: String },
    /// `watch?v=...&list=...`: el video primero y después la playlist
    YouTubeVideoInPlaylist { video_id: String, playlist_id: String },
    YouTubePlaylist { playlist_id: String },
    Spotify { kind: SpotifyKind, id: String },
    SoundCloudTrack { url: String },
    SoundCloudSet { url: String },
    /// Texto libre
    Search(String),
    /// URL que ninguna fuente reconoce
    Unmatched(String),
}

impl LinkKind {
    pub fn is_playlist(&self) -> bool {
        matches!(
            self,
            Self::YouTubeVideoInPlaylist { .. }
                | Self::YouTubePlaylist { .. }
                | Self::SoundCloudSet { .. }
                | Self::Spotify {
                    kind: SpotifyKind::Album | SpotifyKind::Playlist,
                    ..
                }
        )
    }
}

/// Clasifica la entrada del usuario
pub fn classify(input: &str) -> LinkKind {
    let input = input.trim();

    if let Some(captures) = SPOTIFY_LINK.captures(input) {
        let kind = match &captures[1] {
            "album" => SpotifyKind::Album,
            "playlist" => SpotifyKind::Playlist,
            _ => SpotifyKind::Track,
        };
        return LinkKind::Spotify {
            kind,
            id: captures[2].to_string(),
        };
    }

    let url = match Url::parse(input) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => url,
        _ => return LinkKind::Search(input.to_string()),
    };

    let host = url.host_str().unwrap_or_default().trim_start_matches("www.");
    match host {
        "youtube.com" | "m.youtube.com" | "music.youtube.com" => classify_youtube(&url, input),
        "youtu.be" => {
            let video_id = url.path().trim_matches('/').to_string();
            youtube_video(video_id, query_param(&url, "list"), input)
        }
        "soundcloud.com" | "m.soundcloud.com" | "snd.sc" => {
            // El parámetro `si` es solo de tracking
            let mut clean = url.clone();
            clean.set_query(None);
            if url.path().contains("/sets/") {
                LinkKind::SoundCloudSet { url: clean.to_string() }
            } else {
                LinkKind::SoundCloudTrack { url: clean.to_string() }
            }
        }
        _ => LinkKind::Unmatched(input.to_string()),
    }
}

fn classify_youtube(url: &Url, input: &str) -> LinkKind {
    let path = url.path();
    let list = query_param(url, "list");

    if path == "/watch" {
        return match query_param(url, "v") {
            Some(video_id) => youtube_video(video_id, list, input),
            None => LinkKind::Unmatched(input.to_string()),
        };
    }

    if path == "/playlist" {
        return match list {
            Some(playlist_id) => LinkKind::YouTubePlaylist { playlist_id },
            None => LinkKind::Unmatched(input.to_string()),
        };
    }

    let mut segments = path.trim_matches('/').split('/');
    match (segments.next(), segments.next()) {
        (Some("shorts" | "embed" | "v" | "live"), Some(video_id)) => {
            youtube_video(video_id.to_string(), list, input)
        }
        _ => LinkKind::Unmatched(input.to_string()),
    }
}

fn youtube_video(video_id: String, list: Option<String>, input: &str) -> LinkKind {
    if video_id.is_empty() {
        return LinkKind::Unmatched(input.to_string());
    }
    match list {
        Some(playlist_id) => LinkKind::YouTubeVideoInPlaylist { video_id, playlist_id },
        None => LinkKind::YouTubeVideo { video_id },
    }
}

fn query_param(url: &Url, name: &str) -> Option<String> {
    url.query_pairs()
        .find(|(key, value)| key == name && !value.is_empty())
        .map(|(_, value)| value.into_owned())
}

/// Resuelve un track diferido a su primer resultado reproducible
pub async fn resolve_pending(source: &dyn TrackSource, pending: &PendingTrack) -> PlayerResult<ResolvedTrack> {
    let resolved = source
        .resolve(&pending.query)
        .await?
        .into_tracks()
        .into_iter()
        .find_map(|track| match track {
            Track::Resolved(resolved) => Some(resolved),
            Track::Pending(_) => None,
        });

    match resolved {
        Some(mut track) => {
            track.requested_by = pending.requested_by;
            track.source_query = pending.query.clone();
            Ok(track)
        }
        None => Err(PlayerError::TrackResolutionFailed(format!(
            "no results for \"{}\"",
            pending.query
        ))),
    }
}
