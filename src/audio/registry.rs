use dashmap::DashMap;
use serenity::model::id::{ChannelId, GuildId};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::{
    audio::{
        backend::VoiceBackend,
        notify::NotificationChannel,
        session::{PlaybackSession, SessionRequest, SessionSettings},
    },
    error::{PlayerError, PlayerResult},
    sources::TrackSource,
};

pub(crate) type SessionMap = DashMap<GuildId, Arc<PlaybackSession>>;

/// Datos del usuario que pide abrir la sesión
#[derive(Clone)]
pub struct ConnectContext {
    pub guild_id: GuildId,
    /// Canal de voz del usuario, si está en uno
    pub voice_channel: Option<ChannelId>,
    pub notifier: Arc<dyn NotificationChannel>,
}

/// Directorio de sesiones: como mucho una sesión viva por guild.
///
/// Crear o reemplazar la sesión de una guild ocurre bajo un lock por guild,
/// así que dos `play` simultáneos nunca abren dos conexiones de voz.
pub struct SessionRegistry {
    sessions: Arc<SessionMap>,
    creation_locks: DashMap<GuildId, Arc<Mutex<()>>>,
    backend: Arc<dyn VoiceBackend>,
    source: Arc<dyn TrackSource>,
    settings: SessionSettings,
}

impl SessionRegistry {
    pub fn new(backend: Arc<dyn VoiceBackend>, source: Arc<dyn TrackSource>, settings: SessionSettings) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            creation_locks: DashMap::new(),
            backend,
            source,
            settings,
        }
    }

    pub fn source(&self) -> &Arc<dyn TrackSource> {
        &self.source
    }

    /// Sesión viva de la guild
    pub fn lookup(&self, guild_id: GuildId) -> PlayerResult<Arc<PlaybackSession>> {
        self.sessions
            .get(&guild_id)
            .map(|entry| entry.value().clone())
            .filter(|session| !session.is_terminated())
            .ok_or(PlayerError::SessionNotFound)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Devuelve la sesión existente o abre una nueva en el canal del usuario.
    pub async fn get_or_create(&self, ctx: ConnectContext) -> PlayerResult<Arc<PlaybackSession>> {
        let lock = self.creation_lock(ctx.guild_id);
        let _guard = lock.lock().await;

        if let Ok(existing) = self.lookup(ctx.guild_id) {
            return Ok(existing);
        }

        self.create_locked(ctx).await
    }

    /// Cierra `stale` y abre otra sesión en el canal del usuario.
    ///
    /// Si mientras tanto otra llamada ya reemplazó a `stale`, no se toca la
    /// sesión nueva: se devuelve si está en el canal del usuario y si no,
    /// `WrongChannel`.
    pub async fn replace(&self, ctx: ConnectContext, stale: &Arc<PlaybackSession>) -> PlayerResult<Arc<PlaybackSession>> {
        let voice_channel = ctx.voice_channel.ok_or(PlayerError::NotInVoiceChannel)?;

        let lock = self.creation_lock(ctx.guild_id);
        let _guard = lock.lock().await;

        match self.lookup(ctx.guild_id) {
            Ok(current) if Arc::ptr_eq(&current, stale) => {
                info!(
                    "♻️ Reemplazando sesión de guild {} ({} → {})",
                    ctx.guild_id,
                    current.channel_id(),
                    voice_channel
                );
                self.sessions
                    .remove_if(&ctx.guild_id, |_, session| Arc::ptr_eq(session, &current));
                if let Err(e) = current.stop().await {
                    debug!("La sesión anterior ya estaba cerrada: {}", e);
                }
            }
            Ok(current) if current.channel_id() == voice_channel => {
                debug!("Sesión de guild {} ya reemplazada en {}", ctx.guild_id, voice_channel);
                return Ok(current);
            }
            Ok(current) => {
                return Err(PlayerError::WrongChannel {
                    expected: current.channel_id(),
                })
            }
            Err(_) => debug!("La sesión anterior de guild {} ya no existe", ctx.guild_id),
        }

        self.create_locked(ctx).await
    }

    async fn create_locked(&self, ctx: ConnectContext) -> PlayerResult<Arc<PlaybackSession>> {
        let voice_channel = ctx.voice_channel.ok_or(PlayerError::NotInVoiceChannel)?;

        let request = SessionRequest {
            guild_id: ctx.guild_id,
            voice_channel,
            notifier: ctx.notifier,
        };
        let session = PlaybackSession::connect(
            request,
            self.backend.as_ref(),
            self.source.clone(),
            self.settings.clone(),
            Arc::downgrade(&self.sessions),
        )
        .await?;

        self.sessions.insert(ctx.guild_id, session.clone());
        info!("🎶 Sesión registrada para guild {}", ctx.guild_id);
        Ok(session)
    }

    fn creation_lock(&self, guild_id: GuildId) -> Arc<Mutex<()>> {
        self.creation_locks.entry(guild_id).or_default().clone()
    }
}
