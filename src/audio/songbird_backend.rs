//! [`VoiceBackend`] sobre songbird.
//!
//! El audio se obtiene con el `YoutubeDl` de songbird a partir del `uri` del
//! track ya resuelto. Los eventos `Playable`, `End` y `Error` de cada
//! `TrackHandle` se traducen a [`PlaybackEvent`] con el [`PlaybackId`] del
//! intento. `Play` no se escucha: songbird solo lo emite al salir de una
//! pausa, nunca al empezar un track. Songbird no distingue un fin natural de
//! un `stop()`, así que el handle anota antes de detener un track por qué lo
//! hace.

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId};
use songbird::{
    events::CoreEvent,
    input::YoutubeDl,
    tracks::{PlayError, PlayMode, TrackHandle},
    Call, Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tracing::{debug, info, warn};

use crate::{
    audio::{
        backend::{EndReason, PlaybackEvent, PlaybackEventKind, PlaybackId, PlaybackListener, VoiceBackend, VoiceHandle},
        track::ResolvedTrack,
    },
    error::{PlayerError, PlayerResult},
};

pub struct SongbirdBackend {
    manager: Arc<Songbird>,
    http: reqwest::Client,
}

impl SongbirdBackend {
    pub fn new(manager: Arc<Songbird>, http: reqwest::Client) -> Self {
        Self { manager, http }
    }
}

#[async_trait]
impl VoiceBackend for SongbirdBackend {
    async fn connect(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        listener: Arc<dyn PlaybackListener>,
    ) -> PlayerResult<Box<dyn VoiceHandle>> {
        let call = self
            .manager
            .join(guild_id, channel_id)
            .await
            .map_err(|e| PlayerError::ConnectError(e.to_string()))?;

        let connected = Arc::new(AtomicBool::new(true));
        {
            let mut handler = call.lock().await;
            handler.add_global_event(
                Event::Core(CoreEvent::DriverDisconnect),
                DisconnectHandler {
                    guild_id,
                    connected: connected.clone(),
                },
            );
        }

        Ok(Box::new(SongbirdHandle {
            guild_id,
            channel_id,
            manager: self.manager.clone(),
            http: self.http.clone(),
            call,
            listener,
            connected,
            current: Mutex::new(None),
            end_reasons: Arc::new(DashMap::new()),
        }))
    }
}

struct SongbirdHandle {
    guild_id: GuildId,
    channel_id: ChannelId,
    manager: Arc<Songbird>,
    http: reqwest::Client,
    call: Arc<tokio::sync::Mutex<Call>>,
    listener: Arc<dyn PlaybackListener>,
    connected: Arc<AtomicBool>,
    current: Mutex<Option<(PlaybackId, TrackHandle)>>,
    /// Motivo anotado para tracks detenidos a propósito
    end_reasons: Arc<DashMap<PlaybackId, EndReason>>,
}

impl SongbirdHandle {
    fn current_track(&self) -> PlayerResult<TrackHandle> {
        self.current
            .lock()
            .as_ref()
            .map(|(_, track)| track.clone())
            .ok_or(PlayerError::SessionNotFound)
    }

    /// Detiene el track actual anotando `reason` para su evento `End`.
    fn stop_current(&self, reason: EndReason) {
        let Some((playback, track)) = self.current.lock().take() else {
            return;
        };
        self.end_reasons.insert(playback, reason);
        if let Err(e) = track.stop() {
            // El track ya había terminado
            debug!("stop() sobre track {} terminado: {}", playback, e);
            self.end_reasons.remove(&playback);
        }
    }

    fn forward(&self, playback: PlaybackId, event: TrackEvent) -> TrackEventForwarder {
        TrackEventForwarder {
            playback,
            event,
            listener: self.listener.clone(),
            end_reasons: self.end_reasons.clone(),
        }
    }
}

#[async_trait]
impl VoiceHandle for SongbirdHandle {
    fn channel_id(&self) -> ChannelId {
        self.channel_id
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn play(&self, track: &ResolvedTrack, replace: bool, playback: PlaybackId) -> PlayerResult<()> {
        if !replace {
            // Tras un fin natural el track viejo ya no suena y stop() no hace nada
            debug!("Avance natural en guild {}", self.guild_id);
        }
        // El mixer de songbird suma tracks: nunca dejar dos sonando
        self.stop_current(EndReason::Replaced);

        let input = YoutubeDl::new(self.http.clone(), track.uri.clone());
        let track_handle = {
            let mut handler = self.call.lock().await;
            handler.play_input(input.into())
        };

        for event in [TrackEvent::Playable, TrackEvent::End, TrackEvent::Error] {
            track_handle
                .add_event(Event::Track(event), self.forward(playback, event))
                .map_err(|e| PlayerError::Backend(format!("Error al agregar event handler: {}", e)))?;
        }

        debug!("🎵 {} enviado a songbird en guild {}", playback, self.guild_id);
        *self.current.lock() = Some((playback, track_handle));
        Ok(())
    }

    async fn stop(&self) -> PlayerResult<()> {
        self.stop_current(EndReason::Stopped);
        self.call.lock().await.stop();
        Ok(())
    }

    async fn pause(&self) -> PlayerResult<()> {
        self.current_track()?
            .pause()
            .map_err(|e| PlayerError::Backend(e.to_string()))
    }

    async fn resume(&self) -> PlayerResult<()> {
        self.current_track()?
            .play()
            .map_err(|e| PlayerError::Backend(e.to_string()))
    }

    async fn disconnect(&self, force: bool) -> PlayerResult<()> {
        self.stop_current(EndReason::Cleanup);
        self.connected.store(false, Ordering::SeqCst);

        match self.manager.remove(self.guild_id).await {
            Ok(()) => {
                info!("👋 Desconectado del canal de voz en guild {}", self.guild_id);
                Ok(())
            }
            Err(e) if force => {
                // La llamada ya no existía; para el registro es lo mismo
                debug!("Desconexión forzada en guild {}: {}", self.guild_id, e);
                Ok(())
            }
            Err(e) => Err(PlayerError::Backend(e.to_string())),
        }
    }
}

/// Traduce los eventos de un `TrackHandle` para la sesión
struct TrackEventForwarder {
    playback: PlaybackId,
    /// Evento para el que se registró este handler
    event: TrackEvent,
    listener: Arc<dyn PlaybackListener>,
    end_reasons: Arc<DashMap<PlaybackId, EndReason>>,
}

impl TrackEventForwarder {
    fn translate(&self, ctx: &EventContext<'_>) -> Option<PlaybackEventKind> {
        let EventContext::Track(tracks) = ctx else {
            return None;
        };
        let (state, _) = tracks.first()?;

        let kind = track_event_kind(self.event, &state.playing, || {
            self.end_reasons.remove(&self.playback).map(|(_, reason)| reason)
        });
        if matches!(kind, Some(PlaybackEventKind::Ended(EndReason::LoadFailed))) {
            warn!("❌ No se pudo crear el audio para {}: {:?}", self.playback, state.playing);
        }
        kind
    }
}

/// Evento de la sesión para un `TrackEvent` de songbird.
///
/// `recorded_reason` entrega el motivo anotado por `stop_current`; solo se
/// consulta para los fines de track.
fn track_event_kind(
    event: TrackEvent,
    playing: &PlayMode,
    recorded_reason: impl FnOnce() -> Option<EndReason>,
) -> Option<PlaybackEventKind> {
    match (event, playing) {
        (TrackEvent::Playable, PlayMode::Play) => Some(PlaybackEventKind::Started),
        (TrackEvent::End | TrackEvent::Error, PlayMode::End | PlayMode::Stop) => Some(PlaybackEventKind::Ended(
            recorded_reason().unwrap_or(EndReason::Finished),
        )),
        (_, PlayMode::Errored(PlayError::Create(_))) => Some(PlaybackEventKind::Ended(EndReason::LoadFailed)),
        (_, PlayMode::Errored(e)) => Some(PlaybackEventKind::Exception(format!("{:?}", e))),
        (event, other) => {
            debug!("Evento {:?} ignorado con estado {:?}", event, other);
            None
        }
    }
}

#[async_trait]
impl VoiceEventHandler for TrackEventForwarder {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        if let Some(kind) = self.translate(ctx) {
            let listener = self.listener.clone();
            let event = PlaybackEvent::new(self.playback, kind);
            // La sesión vuelve a tomar el lock de la llamada al avanzar
            tokio::spawn(async move { listener.on_event(event).await });
        }
        None
    }
}

struct DisconnectHandler {
    guild_id: GuildId,
    connected: Arc<AtomicBool>,
}

#[async_trait]
impl VoiceEventHandler for DisconnectHandler {
    async fn act(&self, _ctx: &EventContext<'_>) -> Option<Event> {
        info!("🔌 Driver de voz desconectado en guild {}", self.guild_id);
        self.connected.store(false, Ordering::SeqCst);
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn no_reason() -> Option<EndReason> {
        None
    }

    #[test]
    fn test_playable_announces_start() {
        assert_eq!(
            track_event_kind(TrackEvent::Playable, &PlayMode::Play, no_reason),
            Some(PlaybackEventKind::Started)
        );
        // Creado en pausa: todavía no suena
        assert_eq!(track_event_kind(TrackEvent::Playable, &PlayMode::Pause, no_reason), None);
    }

    #[test]
    fn test_resume_does_not_announce_again() {
        assert_eq!(track_event_kind(TrackEvent::Play, &PlayMode::Play, no_reason), None);
        assert_eq!(track_event_kind(TrackEvent::Pause, &PlayMode::Pause, no_reason), None);
    }

    #[test]
    fn test_end_uses_recorded_reason() {
        assert_eq!(
            track_event_kind(TrackEvent::End, &PlayMode::End, no_reason),
            Some(PlaybackEventKind::Ended(EndReason::Finished))
        );
        assert_eq!(
            track_event_kind(TrackEvent::End, &PlayMode::Stop, || Some(EndReason::Replaced)),
            Some(PlaybackEventKind::Ended(EndReason::Replaced))
        );
    }
}
