//! # Playback Session
//!
//! Una [`PlaybackSession`] une una guild con una conexión de voz y su cola.
//!
//! ## Estados
//!
//! ```text
//! Connecting ──ok──▶ Idle ◀──cola vacía── Playing ◀──resume── Paused
//!     │               │  └──enqueue/advance──▶ │ ──pause──▶    │
//!     └──error──▶ Terminated ◀──────── stop() ─┴───────────────┘
//! ```
//!
//! ## Concurrencia
//!
//! Todo el estado mutable vive detrás de un único `tokio::sync::Mutex`, de
//! modo que comandos y eventos del backend se aplican uno tras otro. Cada
//! intento de reproducción recibe un [`PlaybackId`]; los eventos y los skips
//! que se refieren a un intento que ya no es el actual se descartan. Así un
//! fin natural y un skip simultáneos consumen un único track de la cola.
//!
//! `stop()` sobre una sesión terminada devuelve `SessionNotFound`.

use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Weak,
    },
    time::Duration,
};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    audio::{
        backend::{EndReason, PlaybackEvent, PlaybackEventKind, PlaybackId, PlaybackListener, VoiceBackend, VoiceHandle},
        notify::{NotificationChannel, Notice},
        queue::{Enqueued, Queue, QueuePage},
        registry::SessionMap,
        track::{ResolvedTrack, Track},
    },
    error::{PlayerError, PlayerResult},
    sources::{resolve_pending, TrackSource},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Idle,
    Playing,
    Paused,
    Terminated,
}

/// Resultado de `pause` / `resume`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    Changed,
    /// Ya estaba en ese estado; no se tocó nada
    AlreadyInState,
    NothingPlaying,
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub max_queue_size: usize,
    /// Tiempo antes de borrar los avisos de "now playing" y cola vacía
    pub notice_dismiss: Duration,
    /// Una sesión inactiva se cierra sola tras este tiempo
    pub idle_disconnect: Option<Duration>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            max_queue_size: 1000,
            notice_dismiss: Duration::from_secs(15),
            idle_disconnect: Some(Duration::from_secs(300)),
        }
    }
}

/// Datos para abrir una sesión
#[derive(Clone)]
pub struct SessionRequest {
    pub guild_id: GuildId,
    pub voice_channel: ChannelId,
    pub notifier: Arc<dyn NotificationChannel>,
}

struct NowPlaying {
    playback: PlaybackId,
    track: ResolvedTrack,
}

struct SessionInner {
    state: SessionState,
    queue: Queue,
    now_playing: Option<NowPlaying>,
    handle: Option<Box<dyn VoiceHandle>>,
    next_playback: u64,
    idle_timer: Option<CancellationToken>,
}

impl SessionInner {
    fn cancel_idle_timer(&mut self) {
        if let Some(timer) = self.idle_timer.take() {
            timer.cancel();
        }
    }
}

pub struct PlaybackSession {
    guild_id: GuildId,
    channel_id: ChannelId,
    notifier: Arc<dyn NotificationChannel>,
    source: Arc<dyn TrackSource>,
    settings: SessionSettings,
    sessions: Weak<SessionMap>,
    this: Weak<PlaybackSession>,
    terminated: AtomicBool,
    inner: Mutex<SessionInner>,
}

impl fmt::Debug for PlaybackSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaybackSession")
            .field("guild_id", &self.guild_id)
            .field("channel_id", &self.channel_id)
            .field("terminated", &self.is_terminated())
            .finish()
    }
}

/// Puente entre el backend y la sesión; no la mantiene viva.
struct SessionListener {
    session: Weak<PlaybackSession>,
}

#[async_trait]
impl PlaybackListener for SessionListener {
    async fn on_event(&self, event: PlaybackEvent) {
        match self.session.upgrade() {
            Some(session) => session.handle_event(event).await,
            None => debug!("Evento {:?} para una sesión ya liberada", event),
        }
    }
}

impl PlaybackSession {
    /// Abre la conexión de voz y deja la sesión en `Idle`.
    ///
    /// Si la conexión falla la sesión pasa a `Terminated` y se devuelve
    /// `ConnectError`; nunca queda una sesión a medio construir.
    pub(crate) async fn connect(
        request: SessionRequest,
        backend: &dyn VoiceBackend,
        source: Arc<dyn TrackSource>,
        settings: SessionSettings,
        sessions: Weak<SessionMap>,
    ) -> PlayerResult<Arc<Self>> {
        let session = Arc::new_cyclic(|this| Self {
            guild_id: request.guild_id,
            channel_id: request.voice_channel,
            notifier: request.notifier,
            source,
            inner: Mutex::new(SessionInner {
                state: SessionState::Connecting,
                queue: Queue::new(settings.max_queue_size),
                now_playing: None,
                handle: None,
                next_playback: 1,
                idle_timer: None,
            }),
            settings,
            sessions,
            this: this.clone(),
            terminated: AtomicBool::new(false),
        });

        info!(
            "🔌 Conectando al canal de voz {} en guild {}",
            session.channel_id, session.guild_id
        );

        let listener = Arc::new(SessionListener {
            session: Arc::downgrade(&session),
        });

        match backend
            .connect(session.guild_id, session.channel_id, listener)
            .await
        {
            Ok(handle) => {
                let mut inner = session.inner.lock().await;
                inner.handle = Some(handle);
                inner.state = SessionState::Idle;
                session.arm_idle_timer(&mut inner);
                drop(inner);

                info!("🔊 Conectado al canal de voz en guild {}", session.guild_id);
                Ok(session)
            }
            Err(e) => {
                session.terminated.store(true, Ordering::SeqCst);
                session.inner.lock().await.state = SessionState::Terminated;
                warn!("❌ Error al conectar en guild {}: {}", session.guild_id, e);

                Err(match e {
                    PlayerError::ConnectError(_) | PlayerError::NotInVoiceChannel => e,
                    other => PlayerError::ConnectError(other.to_string()),
                })
            }
        }
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    /// Canal de voz al que está ligada la sesión
    pub fn channel_id(&self) -> ChannelId {
        self.channel_id
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    pub async fn state(&self) -> SessionState {
        self.inner.lock().await.state
    }

    pub async fn now_playing(&self) -> Option<ResolvedTrack> {
        self.inner
            .lock()
            .await
            .now_playing
            .as_ref()
            .map(|np| np.track.clone())
    }

    pub async fn current_playback(&self) -> Option<PlaybackId> {
        self.inner.lock().await.now_playing.as_ref().map(|np| np.playback)
    }

    pub async fn queue_len(&self) -> usize {
        self.inner.lock().await.queue.len()
    }

    /// Copia de las páginas de la cola
    pub async fn queue_pages(&self, page_size: usize) -> Vec<QueuePage> {
        self.inner.lock().await.queue.pages(page_size).collect()
    }

    /// La conexión de voz sigue viva
    pub async fn is_connected(&self) -> bool {
        let inner = self.inner.lock().await;
        inner.state != SessionState::Terminated
            && inner.handle.as_ref().is_some_and(|handle| handle.is_connected())
    }

    /// Nada sonando y sin posibilidad de recibir eventos útiles
    pub async fn is_stale(&self) -> bool {
        let inner = self.inner.lock().await;
        inner.state == SessionState::Idle
            || !inner.handle.as_ref().is_some_and(|handle| handle.is_connected())
    }

    /// Agrega un track y, si no suena nada, empieza a reproducirlo.
    pub async fn enqueue(&self, track: Track) -> PlayerResult<Enqueued> {
        let mut inner = self.inner.lock().await;
        Self::ensure_live(&inner)?;

        let enqueued = inner.queue.enqueue(track)?;
        self.start_if_idle(&mut inner).await?;
        Ok(enqueued)
    }

    /// Igual que `enqueue` para varios tracks, en el orden recibido.
    pub async fn enqueue_many(&self, tracks: Vec<Track>) -> PlayerResult<Vec<Enqueued>> {
        let mut inner = self.inner.lock().await;
        Self::ensure_live(&inner)?;

        let enqueued = inner.queue.enqueue_many(tracks)?;
        self.start_if_idle(&mut inner).await?;
        Ok(enqueued)
    }

    async fn start_if_idle(&self, inner: &mut SessionInner) -> PlayerResult<()> {
        if inner.state == SessionState::Idle && inner.now_playing.is_none() {
            debug!("▶️ Inicio automático en guild {}", self.guild_id);
            self.advance_locked(inner, false).await?;
        }
        Ok(())
    }

    /// Pasa al siguiente track de la cola si `expected` sigue siendo el
    /// intento actual (`None`: no suena nada).
    ///
    /// Con `forced` el backend reemplaza lo que esté sonando. Con la cola
    /// vacía la sesión queda en `Idle`; eso nunca es un error. Devuelve
    /// `false` si otro avance ya dejó atrás a `expected`.
    pub async fn advance(&self, expected: Option<PlaybackId>, forced: bool) -> PlayerResult<bool> {
        let mut inner = self.inner.lock().await;
        Self::ensure_live(&inner)?;

        let current = inner.now_playing.as_ref().map(|np| np.playback);
        if current != expected {
            debug!(
                "Avance descartado en guild {}: esperado {:?}, actual {:?}",
                self.guild_id, expected, current
            );
            return Ok(false);
        }

        self.advance_locked(&mut inner, forced).await?;
        Ok(true)
    }

    /// Salta el track que suena ahora mismo.
    pub async fn skip(&self) -> PlayerResult<()> {
        let observed = {
            let inner = self.inner.lock().await;
            Self::ensure_live(&inner)?;
            inner.now_playing.as_ref().map(|np| np.playback)
        };
        self.advance(observed, true).await.map(|_| ())
    }

    pub async fn pause(&self) -> PlayerResult<ToggleOutcome> {
        let mut inner = self.inner.lock().await;
        match inner.state {
            SessionState::Paused => Ok(ToggleOutcome::AlreadyInState),
            SessionState::Playing => {
                if let Some(handle) = inner.handle.as_ref() {
                    handle.pause().await?;
                }
                inner.state = SessionState::Paused;
                info!("⏸️ Reproducción pausada en guild {}", self.guild_id);
                Ok(ToggleOutcome::Changed)
            }
            SessionState::Connecting | SessionState::Idle => Ok(ToggleOutcome::NothingPlaying),
            SessionState::Terminated => Err(PlayerError::SessionNotFound),
        }
    }

    pub async fn resume(&self) -> PlayerResult<ToggleOutcome> {
        let mut inner = self.inner.lock().await;
        match inner.state {
            SessionState::Playing => Ok(ToggleOutcome::AlreadyInState),
            SessionState::Paused => {
                if let Some(handle) = inner.handle.as_ref() {
                    handle.resume().await?;
                }
                inner.state = SessionState::Playing;
                info!("▶️ Reproducción reanudada en guild {}", self.guild_id);
                Ok(ToggleOutcome::Changed)
            }
            SessionState::Connecting | SessionState::Idle => Ok(ToggleOutcome::NothingPlaying),
            SessionState::Terminated => Err(PlayerError::SessionNotFound),
        }
    }

    /// Desconecta, vacía la cola y sale del registro.
    pub async fn stop(&self) -> PlayerResult<()> {
        let mut inner = self.inner.lock().await;
        Self::ensure_live(&inner)?;
        self.terminate_locked(&mut inner).await;
        Ok(())
    }

    /// Aplica un evento del backend.
    pub async fn handle_event(&self, event: PlaybackEvent) {
        let PlaybackEvent { playback, kind } = event;

        let result = match kind {
            PlaybackEventKind::Started => {
                self.announce(playback).await;
                Ok(true)
            }
            PlaybackEventKind::Ended(EndReason::Finished) => self.advance(Some(playback), false).await,
            PlaybackEventKind::Ended(EndReason::LoadFailed) => {
                warn!("⚠️ No se pudo cargar el track {} en guild {}", playback, self.guild_id);
                self.advance(Some(playback), true).await
            }
            PlaybackEventKind::Ended(reason) => {
                // Replaced/Stopped/Cleanup: quien lo provocó ya avanzó la cola
                debug!("Track {} terminó ({:?}) en guild {}", playback, reason, self.guild_id);
                Ok(false)
            }
            PlaybackEventKind::Exception(message) => {
                warn!("⚠️ Error en track {} en guild {}: {}", playback, self.guild_id, message);
                self.advance(Some(playback), true).await
            }
            PlaybackEventKind::Stuck { threshold } => {
                warn!(
                    "⚠️ Track {} atascado más de {:?} en guild {}",
                    playback, threshold, self.guild_id
                );
                self.advance(Some(playback), true).await
            }
        };

        match result {
            Ok(_) => {}
            Err(PlayerError::SessionNotFound) => {
                debug!("Evento de track {} tras cerrar la sesión de guild {}", playback, self.guild_id)
            }
            Err(e) => warn!("Error procesando evento en guild {}: {}", self.guild_id, e),
        }
    }

    async fn announce(&self, playback: PlaybackId) {
        let inner = self.inner.lock().await;
        match inner.now_playing.as_ref() {
            Some(np) if np.playback == playback => {
                self.notifier.send(
                    Notice::NowPlaying {
                        track: np.track.clone(),
                        remaining: inner.queue.len(),
                    },
                    Some(self.settings.notice_dismiss),
                );
            }
            _ => debug!("Inicio de track {} ya reemplazado", playback),
        }
    }

    fn ensure_live(inner: &SessionInner) -> PlayerResult<()> {
        if inner.state == SessionState::Terminated {
            Err(PlayerError::SessionNotFound)
        } else {
            Ok(())
        }
    }

    async fn advance_locked(&self, inner: &mut SessionInner, forced: bool) -> PlayerResult<()> {
        Self::ensure_live(inner)?;

        loop {
            let track = match inner.queue.pop_next() {
                Ok(track) => track,
                Err(PlayerError::QueueEmpty) => {
                    self.enter_idle(inner).await;
                    return Ok(());
                }
                Err(e) => return Err(e),
            };

            let track = match track {
                Track::Resolved(track) => track,
                Track::Pending(pending) => match resolve_pending(self.source.as_ref(), &pending).await {
                    Ok(track) => track,
                    Err(e) => {
                        warn!("⚠️ Descartando \"{}\": {}", pending.query, e);
                        continue;
                    }
                },
            };

            let playback = PlaybackId(inner.next_playback);
            inner.next_playback += 1;

            let handle = inner.handle.as_ref().ok_or(PlayerError::SessionNotFound)?;
            let played = handle.play(&track, forced, playback).await;
            match played {
                Ok(()) => {
                    info!(
                        "🎵 Reproduciendo {} {} en guild {}",
                        playback, track.title, self.guild_id
                    );
                    inner.cancel_idle_timer();
                    inner.now_playing = Some(NowPlaying { playback, track });
                    inner.state = SessionState::Playing;
                    return Ok(());
                }
                Err(e) => {
                    warn!("⚠️ El backend rechazó \"{}\": {}", track.title, e);
                }
            }
        }
    }

    async fn enter_idle(&self, inner: &mut SessionInner) {
        inner.now_playing = None;
        inner.state = SessionState::Idle;

        if let Some(handle) = inner.handle.as_ref() {
            if let Err(e) = handle.stop().await {
                warn!("Error al detener el backend en guild {}: {}", self.guild_id, e);
            }
        }

        info!("📭 Cola vacía en guild {}", self.guild_id);
        self.notifier
            .send(Notice::QueueEmpty, Some(self.settings.notice_dismiss));
        self.arm_idle_timer(inner);
    }

    fn arm_idle_timer(&self, inner: &mut SessionInner) {
        inner.cancel_idle_timer();
        let Some(delay) = self.settings.idle_disconnect else {
            return;
        };

        let token = CancellationToken::new();
        inner.idle_timer = Some(token.clone());
        let session = self.this.clone();

        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    if let Some(session) = session.upgrade() {
                        session.expire_idle(&token).await;
                    }
                }
            }
        });
    }

    async fn expire_idle(&self, token: &CancellationToken) {
        let mut inner = self.inner.lock().await;
        if token.is_cancelled() || inner.state != SessionState::Idle {
            return;
        }
        info!("🚪 Desconexión por inactividad en guild {}", self.guild_id);
        self.terminate_locked(&mut inner).await;
    }

    async fn terminate_locked(&self, inner: &mut SessionInner) {
        inner.state = SessionState::Terminated;
        self.terminated.store(true, Ordering::SeqCst);
        inner.cancel_idle_timer();
        inner.queue.clear();
        inner.now_playing = None;

        if let Some(handle) = inner.handle.take() {
            if let Err(e) = handle.disconnect(true).await {
                warn!("Error al desconectar en guild {}: {}", self.guild_id, e);
            }
        }

        if let Some(sessions) = self.sessions.upgrade() {
            sessions.remove_if(&self.guild_id, |_, session| std::ptr::eq(Arc::as_ptr(session), self));
        }

        info!("⏹️ Sesión terminada en guild {}", self.guild_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{
        notify::MockNotificationChannel,
        testing::{pending, resolved, BackendCall, FakeBackend, RecordingNotifier, StaticSource},
    };
    use crate::sources::Resolution;
    use pretty_assertions::assert_eq;

    fn settings() -> SessionSettings {
        SessionSettings {
            idle_disconnect: None,
            ..SessionSettings::default()
        }
    }

    async fn open(backend: &FakeBackend, notifier: Arc<dyn NotificationChannel>) -> Arc<PlaybackSession> {
        open_with(backend, notifier, Arc::new(StaticSource::default()), settings()).await
    }

    async fn open_with(
        backend: &FakeBackend,
        notifier: Arc<dyn NotificationChannel>,
        source: Arc<dyn TrackSource>,
        settings: SessionSettings,
    ) -> Arc<PlaybackSession> {
        let request = SessionRequest {
            guild_id: GuildId::new(1),
            voice_channel: ChannelId::new(10),
            notifier,
        };
        PlaybackSession::connect(request, backend, source, settings, Weak::new())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_connect_enters_idle() {
        let backend = FakeBackend::default();
        let session = open(&backend, Arc::new(RecordingNotifier::default())).await;

        assert_eq!(session.state().await, SessionState::Idle);
        assert_eq!(backend.calls(), vec![BackendCall::Connect(ChannelId::new(10))]);
    }

    #[tokio::test]
    async fn test_connect_failure_propagates() {
        let backend = FakeBackend::failing();
        let request = SessionRequest {
            guild_id: GuildId::new(1),
            voice_channel: ChannelId::new(10),
            notifier: Arc::new(RecordingNotifier::default()),
        };
        let result = PlaybackSession::connect(
            request,
            &backend,
            Arc::new(StaticSource::default()),
            settings(),
            Weak::new(),
        )
        .await;

        assert!(matches!(result, Err(PlayerError::ConnectError(_))));
    }

    #[tokio::test]
    async fn test_enqueue_while_idle_starts_playback() {
        let backend = FakeBackend::default();
        let session = open(&backend, Arc::new(RecordingNotifier::default())).await;

        let enqueued = session.enqueue(resolved("A")).await.unwrap();

        assert_eq!(enqueued, Enqueued { position: 0, count: 1 });
        assert_eq!(session.state().await, SessionState::Playing);
        assert_eq!(session.now_playing().await.map(|t| t.title), Some("A".to_string()));
        assert_eq!(session.queue_len().await, 0);
        assert_eq!(backend.plays(), vec![("A".to_string(), false)]);
    }

    #[tokio::test]
    async fn test_natural_advance_with_one_track_left() {
        let backend = FakeBackend::default();
        let session = open(&backend, Arc::new(RecordingNotifier::default())).await;

        // Cargar la cola sin auto-inicio
        session.inner.lock().await.queue.enqueue(resolved("A")).unwrap();
        assert_eq!(session.advance(None, false).await, Ok(true));

        assert_eq!(session.state().await, SessionState::Playing);
        assert_eq!(session.queue_len().await, 0);
    }

    #[tokio::test]
    async fn test_advance_on_empty_queue_goes_idle() {
        let backend = FakeBackend::default();
        let notifier = Arc::new(RecordingNotifier::default());
        let session = open(&backend, notifier.clone()).await;

        session.enqueue(resolved("A")).await.unwrap();
        let current = session.current_playback().await;
        assert_eq!(session.advance(current, false).await, Ok(true));

        assert_eq!(session.state().await, SessionState::Idle);
        assert_eq!(session.now_playing().await, None);
        assert_eq!(backend.calls().last(), Some(&BackendCall::Stop));
        assert_eq!(notifier.notices(), vec![Notice::QueueEmpty]);
    }

    #[tokio::test]
    async fn test_concurrent_skip_and_natural_end_consume_one_track() {
        let backend = FakeBackend::default();
        let session = open(&backend, Arc::new(RecordingNotifier::default())).await;
        session
            .enqueue_many(vec![resolved("A"), resolved("B"), resolved("C")])
            .await
            .unwrap();
        let current = session.current_playback().await;

        let ended = PlaybackEvent::new(current.unwrap(), PlaybackEventKind::Ended(EndReason::Finished));
        let (skipped, ()) = tokio::join!(
            session.advance(current, true),
            session.handle_event(ended)
        );

        assert!(skipped.is_ok());
        assert_eq!(session.queue_len().await, 1);
        assert_eq!(session.now_playing().await.map(|t| t.title), Some("B".to_string()));
    }

    #[tokio::test]
    async fn test_concurrent_advances_from_same_playback_consume_one_track() {
        let backend = FakeBackend::default();
        let session = open(&backend, Arc::new(RecordingNotifier::default())).await;
        session
            .enqueue_many(vec![resolved("A"), resolved("B"), resolved("C")])
            .await
            .unwrap();
        let current = session.current_playback().await;

        let (forced, natural) = tokio::join!(session.advance(current, true), session.advance(current, false));

        assert_eq!([forced, natural].iter().filter(|r| **r == Ok(true)).count(), 1);
        assert_eq!(session.queue_len().await, 1);
        assert_eq!(session.now_playing().await.map(|t| t.title), Some("B".to_string()));
        assert_eq!(backend.plays(), vec![("A".to_string(), false), ("B".to_string(), true)]);
    }

    #[tokio::test]
    async fn test_advance_with_outdated_playback_is_ignored() {
        let backend = FakeBackend::default();
        let session = open(&backend, Arc::new(RecordingNotifier::default())).await;
        session.enqueue_many(vec![resolved("A"), resolved("B")]).await.unwrap();

        // Nada sonaba según quien llama, pero A ya está sonando
        assert_eq!(session.advance(None, false).await, Ok(false));
        assert_eq!(session.queue_len().await, 1);
        assert_eq!(backend.plays().len(), 1);
    }

    #[tokio::test]
    async fn test_stale_events_are_ignored() {
        let backend = FakeBackend::default();
        let session = open(&backend, Arc::new(RecordingNotifier::default())).await;
        session.enqueue_many(vec![resolved("A"), resolved("B"), resolved("C")]).await.unwrap();
        let first = session.current_playback().await.unwrap();

        session.skip().await.unwrap();
        // El backend avisa del reemplazo y, tarde, de un atasco del track viejo
        session
            .handle_event(PlaybackEvent::new(first, PlaybackEventKind::Ended(EndReason::Replaced)))
            .await;
        session
            .handle_event(PlaybackEvent::new(
                first,
                PlaybackEventKind::Stuck { threshold: Duration::from_secs(10) },
            ))
            .await;

        assert_eq!(session.now_playing().await.map(|t| t.title), Some("B".to_string()));
        assert_eq!(session.queue_len().await, 1);
    }

    #[tokio::test]
    async fn test_exception_forces_advance() {
        let backend = FakeBackend::default();
        let session = open(&backend, Arc::new(RecordingNotifier::default())).await;
        session.enqueue_many(vec![resolved("A"), resolved("B")]).await.unwrap();
        let current = session.current_playback().await.unwrap();

        session
            .handle_event(PlaybackEvent::new(current, PlaybackEventKind::Exception("decode".into())))
            .await;

        assert_eq!(backend.plays(), vec![("A".to_string(), false), ("B".to_string(), true)]);
    }

    #[tokio::test]
    async fn test_pause_and_resume_report_current_state() {
        let backend = FakeBackend::default();
        let session = open(&backend, Arc::new(RecordingNotifier::default())).await;
        assert_eq!(session.pause().await, Ok(ToggleOutcome::NothingPlaying));

        session.enqueue(resolved("A")).await.unwrap();
        assert_eq!(session.resume().await, Ok(ToggleOutcome::AlreadyInState));
        assert_eq!(session.state().await, SessionState::Playing);

        assert_eq!(session.pause().await, Ok(ToggleOutcome::Changed));
        assert_eq!(session.pause().await, Ok(ToggleOutcome::AlreadyInState));
        assert_eq!(session.state().await, SessionState::Paused);

        assert_eq!(session.resume().await, Ok(ToggleOutcome::Changed));
        assert_eq!(session.state().await, SessionState::Playing);
        assert_eq!(
            backend.calls().iter().filter(|c| matches!(c, BackendCall::Pause | BackendCall::Resume)).count(),
            2
        );
    }

    #[tokio::test]
    async fn test_resume_does_not_announce_again() {
        let backend = FakeBackend::default();
        let notifier = Arc::new(RecordingNotifier::default());
        let session = open(&backend, notifier.clone()).await;
        session.enqueue(resolved("A")).await.unwrap();
        let current = session.current_playback().await.unwrap();

        session.handle_event(PlaybackEvent::new(current, PlaybackEventKind::Started)).await;
        session.pause().await.unwrap();
        session.resume().await.unwrap();

        let announced = notifier
            .notices()
            .iter()
            .filter(|notice| matches!(notice, Notice::NowPlaying { .. }))
            .count();
        assert_eq!(announced, 1);
    }

    #[tokio::test]
    async fn test_stop_terminates_and_second_stop_is_session_not_found() {
        let backend = FakeBackend::default();
        let session = open(&backend, Arc::new(RecordingNotifier::default())).await;
        session.enqueue_many(vec![resolved("A"), resolved("B")]).await.unwrap();

        session.stop().await.unwrap();

        assert_eq!(session.state().await, SessionState::Terminated);
        assert!(session.is_terminated());
        assert_eq!(session.queue_len().await, 0);
        assert_eq!(backend.calls().last(), Some(&BackendCall::Disconnect { force: true }));
        assert_eq!(session.stop().await, Err(PlayerError::SessionNotFound));
        assert_eq!(session.enqueue(resolved("C")).await, Err(PlayerError::SessionNotFound));
        assert_eq!(session.pause().await, Err(PlayerError::SessionNotFound));
    }

    #[tokio::test]
    async fn test_pending_track_is_resolved_before_playing() {
        let backend = FakeBackend::default();
        let source = StaticSource::default().with(
            "daft punk - one more time",
            Resolution::Single(resolved("One More Time")),
        );
        let session = open_with(
            &backend,
            Arc::new(RecordingNotifier::default()),
            Arc::new(source),
            settings(),
        )
        .await;

        session
            .enqueue_many(vec![pending("missing song"), pending("daft punk - one more time")])
            .await
            .unwrap();

        // El primero no resuelve y se descarta
        assert_eq!(backend.plays(), vec![("One More Time".to_string(), false)]);
        let now = session.now_playing().await.unwrap();
        assert_eq!(now.source_query, "daft punk - one more time");
    }

    #[tokio::test]
    async fn test_started_event_sends_now_playing() {
        let backend = FakeBackend::default();
        let mut notifier = MockNotificationChannel::new();
        notifier
            .expect_send()
            .withf(|notice, dismiss| {
                matches!(notice, Notice::NowPlaying { track, remaining: 1 } if track.title == "A")
                    && *dismiss == Some(Duration::from_secs(15))
            })
            .times(1)
            .return_const(());
        let session = open(&backend, Arc::new(notifier)).await;
        session.enqueue_many(vec![resolved("A"), resolved("B")]).await.unwrap();

        let current = session.current_playback().await.unwrap();
        session.handle_event(PlaybackEvent::new(current, PlaybackEventKind::Started)).await;
        // Un inicio atrasado no se anuncia
        session
            .handle_event(PlaybackEvent::new(PlaybackId(99), PlaybackEventKind::Started))
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_session_disconnects_after_timeout() {
        let backend = FakeBackend::default();
        let session = open_with(
            &backend,
            Arc::new(RecordingNotifier::default()),
            Arc::new(StaticSource::default()),
            SessionSettings {
                idle_disconnect: Some(Duration::from_secs(60)),
                ..SessionSettings::default()
            },
        )
        .await;

        session.enqueue(resolved("A")).await.unwrap();
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(session.state().await, SessionState::Playing);

        let current = session.current_playback().await;
        session.advance(current, false).await.unwrap();
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(session.state().await, SessionState::Terminated);
    }
}
