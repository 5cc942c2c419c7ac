//! Filtro previo a cada comando: cooldown por usuario y precondiciones.

use dashmap::{mapref::entry::Entry, DashMap};
use serenity::model::id::{ChannelId, GuildId, UserId};
use std::{sync::Arc, time::Duration};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::{
    audio::{
        notify::NotificationChannel,
        registry::{ConnectContext, SessionRegistry},
        session::PlaybackSession,
    },
    error::{PlayerError, PlayerResult},
};

/// Nivel de permisos de quien invoca el comando
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionTier {
    Member,
    /// Controla la reproducción desde cualquier canal
    Dj,
}

/// Datos ya validados de una invocación
#[derive(Debug, Clone)]
pub struct CommandContext {
    pub guild_id: GuildId,
    pub user_id: UserId,
    /// Canal de voz del usuario, si está en uno
    pub user_voice: Option<ChannelId>,
    pub tier: PermissionTier,
}

pub struct CommandGate {
    window: Duration,
    last_action: DashMap<UserId, Instant>,
}

impl CommandGate {
    /// Una acción por usuario cada `window`
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_action: DashMap::new(),
        }
    }

    /// Consume el turno del usuario o devuelve `RateLimited`.
    pub fn check_rate(&self, user_id: UserId) -> PlayerResult<()> {
        let now = Instant::now();
        let mut last = match self.last_action.entry(user_id) {
            Entry::Vacant(entry) => {
                entry.insert(now);
                return Ok(());
            }
            Entry::Occupied(entry) => entry,
        };

        let elapsed = now.saturating_duration_since(*last.get());
        if elapsed < self.window {
            let remaining = self.window - elapsed;
            let retry_after_secs = (remaining.as_secs_f64().ceil() as u64).max(1);
            debug!("⏳ Usuario {} en cooldown ({}s)", user_id, retry_after_secs);
            return Err(PlayerError::RateLimited { retry_after_secs });
        }

        last.insert(now);
        Ok(())
    }

    /// Precondiciones de `play`; devuelve la sesión que recibirá los tracks.
    ///
    /// Una sesión que no reproduce nada (o perdió la conexión) en otro canal
    /// se reemplaza por una nueva en el canal del usuario; si está sonando,
    /// el usuario recibe `WrongChannel`.
    pub async fn admit_play(
        &self,
        registry: &SessionRegistry,
        ctx: &CommandContext,
        notifier: Arc<dyn NotificationChannel>,
    ) -> PlayerResult<Arc<PlaybackSession>> {
        self.check_rate(ctx.user_id)?;

        let connect = ConnectContext {
            guild_id: ctx.guild_id,
            voice_channel: ctx.user_voice,
            notifier,
        };

        let existing = match registry.lookup(ctx.guild_id) {
            Ok(session) => session,
            Err(_) if ctx.user_voice.is_none() => return Err(PlayerError::NotInVoiceChannel),
            Err(_) => return registry.get_or_create(connect).await,
        };

        let Some(user_voice) = ctx.user_voice else {
            return Err(PlayerError::WrongChannel {
                expected: existing.channel_id(),
            });
        };

        let same_channel = existing.channel_id() == user_voice;
        if same_channel && existing.is_connected().await {
            return Ok(existing);
        }

        if !same_channel && !existing.is_stale().await {
            return Err(PlayerError::WrongChannel {
                expected: existing.channel_id(),
            });
        }

        info!(
            "♻️ Sesión inactiva en {} reemplazada a pedido de {}",
            existing.channel_id(),
            ctx.user_id
        );
        registry.replace(connect, &existing).await
    }

    /// Precondiciones de `pause`, `resume`, `skip` y `stop`.
    pub fn admit_control(
        &self,
        registry: &SessionRegistry,
        ctx: &CommandContext,
    ) -> PlayerResult<Arc<PlaybackSession>> {
        self.check_rate(ctx.user_id)?;
        let session = registry.lookup(ctx.guild_id)?;

        if ctx.tier == PermissionTier::Dj {
            return Ok(session);
        }

        match ctx.user_voice {
            Some(channel) if channel == session.channel_id() => Ok(session),
            Some(_) => Err(PlayerError::WrongChannel {
                expected: session.channel_id(),
            }),
            None => Err(PlayerError::InsufficientPermission),
        }
    }

    /// Precondiciones de los comandos de solo lectura (`queue`, `nowplaying`).
    pub fn admit_view(
        &self,
        registry: &SessionRegistry,
        ctx: &CommandContext,
    ) -> PlayerResult<Arc<PlaybackSession>> {
        self.check_rate(ctx.user_id)?;
        registry.lookup(ctx.guild_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{
        session::{SessionSettings, SessionState},
        testing::{resolved, FakeBackend, RecordingNotifier, StaticSource},
    };
    use pretty_assertions::assert_eq;

    fn registry() -> SessionRegistry {
        registry_with(Arc::new(FakeBackend::default()))
    }

    fn registry_with(backend: Arc<FakeBackend>) -> SessionRegistry {
        SessionRegistry::new(
            backend,
            Arc::new(StaticSource::default()),
            SessionSettings {
                idle_disconnect: None,
                ..SessionSettings::default()
            },
        )
    }

    fn gate() -> CommandGate {
        CommandGate::new(Duration::from_secs(3))
    }

    fn ctx(user: u64, voice: Option<u64>, tier: PermissionTier) -> CommandContext {
        CommandContext {
            guild_id: GuildId::new(1),
            user_id: UserId::new(user),
            user_voice: voice.map(ChannelId::new),
            tier,
        }
    }

    fn notifier() -> Arc<dyn NotificationChannel> {
        Arc::new(RecordingNotifier::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_action_per_window() {
        let gate = gate();
        let user = UserId::new(7);

        assert_eq!(gate.check_rate(user), Ok(()));
        assert_eq!(
            gate.check_rate(user),
            Err(PlayerError::RateLimited { retry_after_secs: 3 })
        );

        tokio::time::advance(Duration::from_millis(1200)).await;
        assert_eq!(
            gate.check_rate(user),
            Err(PlayerError::RateLimited { retry_after_secs: 2 })
        );
        // Otro usuario no comparte cooldown
        assert_eq!(gate.check_rate(UserId::new(8)), Ok(()));

        tokio::time::advance(Duration::from_millis(1800)).await;
        assert_eq!(gate.check_rate(user), Ok(()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_play_without_voice_or_session() {
        let registry = registry();
        let result = gate()
            .admit_play(&registry, &ctx(1, None, PermissionTier::Member), notifier())
            .await;

        assert_eq!(result.unwrap_err(), PlayerError::NotInVoiceChannel);
        assert!(registry.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_play_creates_session_in_callers_channel() {
        let registry = registry();
        let gate = gate();

        let session = gate
            .admit_play(&registry, &ctx(1, Some(10), PermissionTier::Member), notifier())
            .await
            .unwrap();
        assert_eq!(session.channel_id(), ChannelId::new(10));

        // Mismo canal: misma sesión
        let again = gate
            .admit_play(&registry, &ctx(2, Some(10), PermissionTier::Member), notifier())
            .await
            .unwrap();
        assert!(Arc::ptr_eq(&session, &again));
    }

    #[tokio::test(start_paused = true)]
    async fn test_play_from_other_channel() {
        let registry = registry();
        let gate = gate();
        let session = gate
            .admit_play(&registry, &ctx(1, Some(10), PermissionTier::Member), notifier())
            .await
            .unwrap();
        session.enqueue(resolved("A")).await.unwrap();

        let busy = gate
            .admit_play(&registry, &ctx(2, Some(20), PermissionTier::Member), notifier())
            .await;
        assert_eq!(
            busy.unwrap_err(),
            PlayerError::WrongChannel { expected: ChannelId::new(10) }
        );
        assert_eq!(
            gate.admit_play(&registry, &ctx(3, None, PermissionTier::Member), notifier())
                .await
                .unwrap_err(),
            PlayerError::WrongChannel { expected: ChannelId::new(10) }
        );

        // Sin nada sonando la sesión vieja se reemplaza
        let current = session.current_playback().await;
        session.advance(current, false).await.unwrap();
        assert_eq!(session.state().await, SessionState::Idle);
        let replaced = gate
            .admit_play(&registry, &ctx(4, Some(20), PermissionTier::Member), notifier())
            .await
            .unwrap();

        assert!(session.is_terminated());
        assert_eq!(replaced.channel_id(), ChannelId::new(20));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_plays_replace_stale_session_once() {
        let backend = Arc::new(FakeBackend::slow(Duration::from_millis(50)));
        let registry = registry_with(backend.clone());
        let gate = gate();
        let stale = gate
            .admit_play(&registry, &ctx(1, Some(10), PermissionTier::Member), notifier())
            .await
            .unwrap();
        assert_eq!(stale.state().await, SessionState::Idle);

        let ctx_a = ctx(2, Some(20), PermissionTier::Member);
        let ctx_b = ctx(3, Some(20), PermissionTier::Member);
        let (first, second) = tokio::join!(
            gate.admit_play(&registry, &ctx_a, notifier()),
            gate.admit_play(&registry, &ctx_b, notifier())
        );
        let (first, second) = (first.unwrap(), second.unwrap());

        assert!(Arc::ptr_eq(&first, &second));
        assert!(stale.is_terminated());
        assert!(!first.is_terminated());
        assert_eq!(first.channel_id(), ChannelId::new(20));
        assert_eq!(backend.connects(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_control_requires_session() {
        let registry = registry();
        let result = gate().admit_control(&registry, &ctx(1, Some(10), PermissionTier::Dj));
        assert_eq!(result.unwrap_err(), PlayerError::SessionNotFound);
    }

    #[tokio::test(start_paused = true)]
    async fn test_control_permissions() {
        let registry = registry();
        let gate = gate();
        gate.admit_play(&registry, &ctx(1, Some(10), PermissionTier::Member), notifier())
            .await
            .unwrap();

        assert!(gate.admit_control(&registry, &ctx(2, Some(10), PermissionTier::Member)).is_ok());
        assert!(gate.admit_control(&registry, &ctx(3, None, PermissionTier::Dj)).is_ok());
        assert!(gate.admit_control(&registry, &ctx(4, Some(99), PermissionTier::Dj)).is_ok());
        assert_eq!(
            gate.admit_control(&registry, &ctx(5, Some(99), PermissionTier::Member))
                .unwrap_err(),
            PlayerError::WrongChannel { expected: ChannelId::new(10) }
        );
        assert_eq!(
            gate.admit_control(&registry, &ctx(6, None, PermissionTier::Member))
                .unwrap_err(),
            PlayerError::InsufficientPermission
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_applies_before_preconditions() {
        let registry = registry();
        let gate = gate();
        let member = ctx(1, None, PermissionTier::Member);

        assert_eq!(
            gate.admit_control(&registry, &member).unwrap_err(),
            PlayerError::SessionNotFound
        );
        assert_eq!(
            gate.admit_control(&registry, &member).unwrap_err(),
            PlayerError::RateLimited { retry_after_secs: 3 }
        );
    }
}
