use serenity::{
    builder::{CreateEmbed, CreateEmbedFooter, CreateMessage},
    http::Http,
    model::id::ChannelId,
};
use std::{sync::Arc, time::Duration};
use tracing::{debug, warn};

use crate::audio::{
    notify::{NotificationChannel, Notice},
    queue::{format_duration, QueuePage},
    track::ResolvedTrack,
};

/// Paleta de colores estandarizada para el bot
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::new(0x2ECC71);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
}

/// Crea el embed que anuncia el track que empieza a sonar
pub fn create_now_playing_embed(track: &ResolvedTrack, remaining: usize) -> CreateEmbed {
    let length = track
        .duration
        .map(format_duration)
        .unwrap_or_else(|| "🔴 live".to_string());

    let mut embed = CreateEmbed::default()
        .title(format!("Now playing {}", track.title))
        .url(&track.uri)
        .color(colors::SUCCESS_GREEN)
        .footer(CreateEmbedFooter::new(format!(
            "Track length: {} | {} tracks in queue.",
            length, remaining
        )));

    if let Some(thumbnail) = track.thumbnail() {
        embed = embed.thumbnail(thumbnail);
    }

    embed
}

/// Crea el embed de una página de la cola
pub fn create_queue_embed(page: &QueuePage) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("{} songs in queue", page.total_tracks))
        .description(page.description())
        .color(colors::SUCCESS_GREEN)
        .footer(CreateEmbedFooter::new(page.footer()))
}

/// Crea un embed de error
pub fn create_error_embed(description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .description(format!("❌ {}", description))
        .color(colors::ERROR_RED)
}

/// Mensaje de Discord para un aviso de la sesión
pub fn notice_message(notice: &Notice) -> CreateMessage {
    match notice {
        Notice::NowPlaying { track, remaining } => {
            CreateMessage::new().embed(create_now_playing_embed(track, *remaining))
        }
        Notice::QueueEmpty => CreateMessage::new().content("No songs remaining in queue."),
    }
}

/// [`NotificationChannel`] que publica en un canal de texto de Discord.
///
/// Cada envío corre en su propia tarea; si hay `dismiss_after` el mensaje se
/// borra pasado ese tiempo.
#[derive(Clone)]
pub struct DiscordNotifier {
    http: Arc<Http>,
    channel_id: ChannelId,
}

impl DiscordNotifier {
    pub fn new(http: Arc<Http>, channel_id: ChannelId) -> Self {
        Self { http, channel_id }
    }
}

impl NotificationChannel for DiscordNotifier {
    fn send(&self, notice: Notice, dismiss_after: Option<Duration>) {
        let http = self.http.clone();
        let channel_id = self.channel_id;

        tokio::spawn(async move {
            let message = match channel_id
                .send_message(&*http, notice_message(&notice))
                .await
            {
                Ok(message) => message,
                Err(e) => {
                    warn!("⚠️ No se pudo enviar aviso al canal {}: {}", channel_id, e);
                    return;
                }
            };

            let Some(delay) = dismiss_after else {
                return;
            };
            tokio::time::sleep(delay).await;

            match channel_id.delete_message(&http, message.id).await {
                Ok(()) => debug!("🧹 Aviso {} borrado", message.id),
                Err(e) => warn!("⚠️ No se pudo borrar el aviso {}: {}", message.id, e),
            }
        });
    }
}
