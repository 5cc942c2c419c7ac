//! Contratos con el backend de voz.
//!
//! Una [`PlaybackSession`](crate::audio::session::PlaybackSession) nunca
//! habla con songbird directamente: se conecta a través de [`VoiceBackend`],
//! controla la reproducción con el [`VoiceHandle`] resultante y recibe los
//! eventos del ciclo de vida de cada track a través del [`PlaybackListener`]
//! que registra al conectarse.
//!
//! Cada intento de reproducción lleva un [`PlaybackId`] creciente; el backend
//! lo devuelve en todos los eventos de ese intento, lo que permite a la
//! sesión descartar eventos atrasados.

use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use std::{fmt, sync::Arc, time::Duration};

use crate::{audio::track::ResolvedTrack, error::PlayerResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlaybackId(pub u64);

impl fmt::Display for PlaybackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Motivo por el que terminó un track
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// Terminó de forma natural
    Finished,
    /// No se pudo cargar el audio
    LoadFailed,
    /// Detenido explícitamente
    Stopped,
    /// Reemplazado por otro track (skip ya gestionado)
    Replaced,
    /// Liberado al desconectar
    Cleanup,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackEventKind {
    Started,
    Ended(EndReason),
    Exception(String),
    Stuck { threshold: Duration },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackEvent {
    pub playback: PlaybackId,
    pub kind: PlaybackEventKind,
}

impl PlaybackEvent {
    pub fn new(playback: PlaybackId, kind: PlaybackEventKind) -> Self {
        Self { playback, kind }
    }
}

/// Receptor de eventos que una sesión registra al conectarse.
#[async_trait]
pub trait PlaybackListener: Send + Sync {
    async fn on_event(&self, event: PlaybackEvent);
}

#[async_trait]
pub trait VoiceBackend: Send + Sync {
    /// Se une al canal de voz y devuelve el handle de la conexión.
    ///
    /// Los eventos de todos los tracks reproducidos con ese handle se
    /// entregan a `listener`, en orden, hasta la desconexión.
    async fn connect(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        listener: Arc<dyn PlaybackListener>,
    ) -> PlayerResult<Box<dyn VoiceHandle>>;
}

#[async_trait]
pub trait VoiceHandle: Send + Sync {
    fn channel_id(&self) -> ChannelId;

    /// Sigue unido al canal de voz
    fn is_connected(&self) -> bool;

    /// Reproduce `track`. Con `replace` detiene antes lo que esté sonando.
    async fn play(&self, track: &ResolvedTrack, replace: bool, playback: PlaybackId) -> PlayerResult<()>;

    async fn stop(&self) -> PlayerResult<()>;

    async fn pause(&self) -> PlayerResult<()>;

    async fn resume(&self) -> PlayerResult<()>;

    async fn disconnect(&self, force: bool) -> PlayerResult<()>;
}
