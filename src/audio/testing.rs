//! Dobles de prueba para el backend de voz, las fuentes y las notificaciones.

use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId};
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use crate::{
    audio::{
        backend::{PlaybackEvent, PlaybackId, PlaybackListener, VoiceBackend, VoiceHandle},
        notify::{NotificationChannel, Notice},
        track::{PendingTrack, ResolvedTrack, Track},
    },
    error::{PlayerError, PlayerResult},
    sources::{Resolution, TrackSource},
};

pub fn resolved(title: &str) -> Track {
    ResolvedTrack::new(title, format!("https://www.youtube.com/watch?v={}", title))
        .with_identifier(title)
        .with_duration(Duration::from_secs(180))
        .into()
}

pub fn pending(query: &str) -> Track {
    PendingTrack::new(query).into()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
    Connect(ChannelId),
    Play {
        title: String,
        replace: bool,
        playback: PlaybackId,
    },
    Stop,
    Pause,
    Resume,
    Disconnect { force: bool },
}

/// Backend que registra cada llamada y entrega eventos a mano.
#[derive(Default)]
pub struct FakeBackend {
    calls: Arc<Mutex<Vec<BackendCall>>>,
    listeners: Mutex<Vec<Arc<dyn PlaybackListener>>>,
    fail_connect: bool,
    connect_delay: Option<Duration>,
}

impl FakeBackend {
    pub fn failing() -> Self {
        Self {
            fail_connect: true,
            ..Self::default()
        }
    }

    /// La conexión tarda `delay`, para forzar carreras en el registro
    pub fn slow(delay: Duration) -> Self {
        Self {
            connect_delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.calls.lock().clone()
    }

    pub fn connects(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|call| matches!(call, BackendCall::Connect(_)))
            .count()
    }

    /// `(título, replace)` de cada `play`
    pub fn plays(&self) -> Vec<(String, bool)> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                BackendCall::Play { title, replace, .. } => Some((title.clone(), *replace)),
                _ => None,
            })
            .collect()
    }

    /// Entrega un evento al último listener registrado
    pub async fn emit(&self, event: PlaybackEvent) {
        let listener = self.listeners.lock().last().cloned();
        if let Some(listener) = listener {
            listener.on_event(event).await;
        }
    }
}

#[async_trait]
impl VoiceBackend for FakeBackend {
    async fn connect(
        &self,
        _guild_id: GuildId,
        channel_id: ChannelId,
        listener: Arc<dyn PlaybackListener>,
    ) -> PlayerResult<Box<dyn VoiceHandle>> {
        if let Some(delay) = self.connect_delay {
            tokio::time::sleep(delay).await;
        }
        self.calls.lock().push(BackendCall::Connect(channel_id));

        if self.fail_connect {
            return Err(PlayerError::ConnectError("channel is full".into()));
        }

        self.listeners.lock().push(listener);
        Ok(Box::new(FakeHandle {
            channel_id,
            calls: self.calls.clone(),
            connected: AtomicBool::new(true),
        }))
    }
}

struct FakeHandle {
    channel_id: ChannelId,
    calls: Arc<Mutex<Vec<BackendCall>>>,
    connected: AtomicBool,
}

#[async_trait]
impl VoiceHandle for FakeHandle {
    fn channel_id(&self) -> ChannelId {
        self.channel_id
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn play(&self, track: &ResolvedTrack, replace: bool, playback: PlaybackId) -> PlayerResult<()> {
        self.calls.lock().push(BackendCall::Play {
            title: track.title.clone(),
            replace,
            playback,
        });
        Ok(())
    }

    async fn stop(&self) -> PlayerResult<()> {
        self.calls.lock().push(BackendCall::Stop);
        Ok(())
    }

    async fn pause(&self) -> PlayerResult<()> {
        self.calls.lock().push(BackendCall::Pause);
        Ok(())
    }

    async fn resume(&self) -> PlayerResult<()> {
        self.calls.lock().push(BackendCall::Resume);
        Ok(())
    }

    async fn disconnect(&self, force: bool) -> PlayerResult<()> {
        self.connected.store(false, Ordering::SeqCst);
        self.calls.lock().push(BackendCall::Disconnect { force });
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl RecordingNotifier {
    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().clone()
    }
}

impl NotificationChannel for RecordingNotifier {
    fn send(&self, notice: Notice, _dismiss_after: Option<Duration>) {
        self.notices.lock().push(notice);
    }
}

/// Fuente con respuestas fijas; lo desconocido es `NotFound`.
#[derive(Default)]
pub struct StaticSource {
    answers: HashMap<String, Resolution>,
}

impl StaticSource {
    pub fn with(mut self, query: &str, resolution: Resolution) -> Self {
        self.answers.insert(query.to_string(), resolution);
        self
    }
}

#[async_trait]
impl TrackSource for StaticSource {
    async fn resolve(&self, query: &str) -> PlayerResult<Resolution> {
        Ok(self
            .answers
            .get(query)
            .cloned()
            .unwrap_or(Resolution::NotFound))
    }

    fn source_name(&self) -> &'static str {
        "static"
    }
}
