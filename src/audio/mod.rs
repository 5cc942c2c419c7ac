//! # Audio Module
//!
//! Control de reproducción por guild.
//!
//! ## Architecture
//!
//! ### [`registry`] - Session Registry
//! - Como mucho una [`PlaybackSession`](session::PlaybackSession) por guild
//! - Creación y reemplazo atómicos bajo un lock por guild
//!
//! ### [`session`] - Playback Session
//! - Máquina de estados `Connecting → Idle ⇄ Playing ⇄ Paused → Terminated`
//! - Avance de la cola a partir de los eventos del backend
//! - Desconexión automática tras un rato sin reproducir
//!
//! ### [`queue`] - Queue Management
//! - Cola FIFO con límite de tamaño
//! - Paginación para el comando `/queue`
//!
//! ### [`backend`] / [`songbird_backend`] - Voice Backend
//! - Contrato entre la sesión y la conexión de voz
//! - Implementación sobre songbird + yt-dlp
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use guild_jukebox::audio::registry::{ConnectContext, SessionRegistry};
//! # use std::sync::Arc;
//! # use serenity::all::{ChannelId, GuildId};
//! # use guild_jukebox::audio::{notify::NotificationChannel, track::Track};
//!
//! # async fn example(
//! #     registry: &SessionRegistry,
//! #     notifier: Arc<dyn NotificationChannel>,
//! #     track: Track,
//! # ) -> guild_jukebox::error::PlayerResult<()> {
//! let session = registry
//!     .get_or_create(ConnectContext {
//!         guild_id: GuildId::new(123456789),
//!         voice_channel: Some(ChannelId::new(987654321)),
//!         notifier,
//!     })
//!     .await?;
//!
//! session.enqueue(track).await?;
//! session.pause().await?;
//! session.resume().await?;
//! session.skip().await?;
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod notify;
pub mod queue;
pub mod registry;
pub mod session;
pub mod songbird_backend;
pub mod track;

#[cfg(test)]
pub(crate) mod testing;
