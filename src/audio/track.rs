use serenity::model::id::UserId;
use std::time::Duration;

/// Track listo para reproducir.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTrack {
    pub title: String,
    pub uri: String,
    /// Identificador del proveedor (id de video en YouTube), usado para la miniatura
    pub identifier: Option<String>,
    pub duration: Option<Duration>,
    pub source_query: String,
    pub requested_by: Option<UserId>,
}

impl ResolvedTrack {
    pub fn new(title: impl Into<String>, uri: impl Into<String>) -> Self {
        let uri = uri.into();
        Self {
            title: title.into(),
            source_query: uri.clone(),
            uri,
            identifier: None,
            duration: None,
            requested_by: None,
        }
    }

    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn with_source_query(mut self, query: impl Into<String>) -> Self {
        self.source_query = query.into();
        self
    }

    /// Miniatura de YouTube a partir del id del video
    pub fn thumbnail(&self) -> Option<String> {
        self.identifier
            .as_ref()
            .map(|id| format!("https://i.ytimg.com/vi_webp/{}/maxresdefault.webp", id))
    }
}

/// Track diferido: solo conoce el texto de búsqueda y se resuelve justo antes
/// de reproducirse (p. ej. entradas de álbumes de Spotify).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTrack {
    pub query: String,
    pub requested_by: Option<UserId>,
}

impl PendingTrack {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            requested_by: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Track {
    Resolved(ResolvedTrack),
    Pending(PendingTrack),
}

impl Track {
    pub fn title(&self) -> &str {
        match self {
            Self::Resolved(track) => &track.title,
            Self::Pending(track) => &track.query,
        }
    }

    pub fn uri(&self) -> Option<&str> {
        match self {
            Self::Resolved(track) => Some(&track.uri),
            Self::Pending(_) => None,
        }
    }

    pub fn duration(&self) -> Option<Duration> {
        match self {
            Self::Resolved(track) => track.duration,
            Self::Pending(_) => None,
        }
    }

    /// Marca quién pidió el track
    pub fn requested_by_user(mut self, user: UserId) -> Self {
        match &mut self {
            Self::Resolved(track) => track.requested_by = Some(user),
            Self::Pending(track) => track.requested_by = Some(user),
        }
        self
    }
}

impl From<ResolvedTrack> for Track {
    fn from(track: ResolvedTrack) -> Self {
        Self::Resolved(track)
    }
}

impl From<PendingTrack> for Track {
    fn from(track: PendingTrack) -> Self {
        Self::Pending(track)
    }
}
