//! # Guild Jukebox
//!
//! Controlador de reproducción de música por guild para Discord, sobre
//! serenity + songbird.
//!
//! - [`audio`]: cola, sesiones de reproducción y registro por guild
//! - [`bot`]: comandos slash, cooldown y precondiciones
//! - [`sources`]: resolución de enlaces y búsquedas (yt-dlp, Spotify)
//! - [`ui`]: embeds y avisos en canales de texto

pub mod audio;
pub mod bot;
pub mod config;
pub mod error;
pub mod sources;
pub mod ui;
