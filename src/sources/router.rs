use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

use super::{classify, LinkKind, Resolution, TrackSource};
use crate::error::{PlayerError, PlayerResult};

/// Elige la fuente según el tipo de enlace.
pub struct SourceRouter {
    ytdlp: Arc<dyn TrackSource>,
    spotify: Option<Arc<dyn TrackSource>>,
}

impl SourceRouter {
    pub fn new(ytdlp: Arc<dyn TrackSource>, spotify: Option<Arc<dyn TrackSource>>) -> Self {
        Self { ytdlp, spotify }
    }
}

#[async_trait]
impl TrackSource for SourceRouter {
    async fn resolve(&self, query: &str) -> PlayerResult<Resolution> {
        let kind = classify(query);

        let source = match &kind {
            LinkKind::Spotify { .. } => self.spotify.as_ref().ok_or_else(|| {
                PlayerError::TrackResolutionFailed("Spotify links are not enabled on this bot".to_string())
            })?,
            LinkKind::Unmatched(link) => {
                warn!("Enlace no reconocido: {}", link);
                return Ok(Resolution::NotFound);
            }
            LinkKind::YouTubeVideo { .. }
            | LinkKind::YouTubeVideoInPlaylist { .. }
            | LinkKind::YouTubePlaylist { .. }
            | LinkKind::SoundCloudTrack { .. }
            | LinkKind::SoundCloudSet { .. }
            | LinkKind::Search(_) => &self.ytdlp,
        };

        debug!(
            "🔗 {:?} → {}{}",
            kind,
            source.source_name(),
            if kind.is_playlist() { " (playlist)" } else { "" }
        );
        source.resolve(query).await
    }

    fn source_name(&self) -> &'static str {
        "router"
    }
}
