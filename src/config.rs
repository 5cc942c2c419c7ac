use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::audio::session::SessionSettings;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub application_id: u64,
    pub guild_id: Option<u64>, // Para comandos de desarrollo

    // Comandos
    pub command_cooldown_secs: u64,
    pub queue_page_size: usize,
    pub dj_role_id: Option<u64>,

    // Sesiones
    pub notice_dismiss_secs: u64,
    pub idle_disconnect_secs: u64, // 0 = nunca
    pub max_queue_size: usize,
    pub max_playlist_size: usize,

    // Fuentes
    pub spotify_client_id: Option<String>,
    pub spotify_client_secret: Option<String>,
    pub ytdlp_path: String,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Construye la configuración a partir de una función de búsqueda de variables.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let config = Self {
            // Discord
            discord_token: lookup("DISCORD_TOKEN").context("DISCORD_TOKEN no definido")?,
            application_id: lookup("APPLICATION_ID")
                .context("APPLICATION_ID no definido")?
                .parse()
                .context("APPLICATION_ID inválido")?,
            guild_id: lookup("GUILD_ID").and_then(|s| s.parse().ok()),

            // Comandos
            command_cooldown_secs: parse_or(&lookup, "COMMAND_COOLDOWN_SECS", defaults.command_cooldown_secs)?,
            queue_page_size: parse_or(&lookup, "QUEUE_PAGE_SIZE", defaults.queue_page_size)?,
            dj_role_id: lookup("DJ_ROLE_ID").and_then(|s| s.parse().ok()),

            // Sesiones
            notice_dismiss_secs: parse_or(&lookup, "NOTICE_DISMISS_SECS", defaults.notice_dismiss_secs)?,
            idle_disconnect_secs: parse_or(&lookup, "IDLE_DISCONNECT_SECS", defaults.idle_disconnect_secs)?,
            max_queue_size: parse_or(&lookup, "MAX_QUEUE_SIZE", defaults.max_queue_size)?,
            max_playlist_size: parse_or(&lookup, "MAX_PLAYLIST_SIZE", defaults.max_playlist_size)?,

            // Fuentes (opcionales)
            spotify_client_id: lookup("SPOTIFY_CLIENT_ID").filter(|s| !s.trim().is_empty()),
            spotify_client_secret: lookup("SPOTIFY_CLIENT_SECRET").filter(|s| !s.trim().is_empty()),
            ytdlp_path: lookup("YTDLP_PATH").unwrap_or(defaults.ytdlp_path),
        };

        // Validate configuration before returning
        config.validate()?;

        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - Cooldown window, page size and queue size must be > 0
    /// - Spotify credentials come in pairs
    pub fn validate(&self) -> Result<()> {
        if self.command_cooldown_secs == 0 {
            anyhow::bail!("Command cooldown must be greater than 0");
        }

        if self.queue_page_size == 0 {
            anyhow::bail!("Queue page size must be greater than 0");
        }

        if self.max_queue_size == 0 {
            anyhow::bail!("Max queue size must be greater than 0");
        }

        if self.spotify_client_id.is_some() != self.spotify_client_secret.is_some() {
            anyhow::bail!("SPOTIFY_CLIENT_ID and SPOTIFY_CLIENT_SECRET must be set together");
        }

        Ok(())
    }

    /// Credenciales de Spotify, si están completas
    pub fn spotify_credentials(&self) -> Option<(String, String)> {
        self.spotify_client_id
            .clone()
            .zip(self.spotify_client_secret.clone())
    }

    pub fn command_cooldown(&self) -> Duration {
        Duration::from_secs(self.command_cooldown_secs)
    }

    /// Parámetros que reciben todas las sesiones
    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            max_queue_size: self.max_queue_size,
            notice_dismiss: Duration::from_secs(self.notice_dismiss_secs),
            idle_disconnect: (self.idle_disconnect_secs > 0)
                .then(|| Duration::from_secs(self.idle_disconnect_secs)),
        }
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// Excludes the bot token and Spotify credentials.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: App ID {} (Guild: {})\n  \
            Commands: {}s cooldown, {} per page, DJ role {}\n  \
            Sessions: {} queue, {} playlist, {}s notices, {}s idle\n  \
            Sources: yt-dlp at {}, Spotify={}",
            self.application_id,
            self.guild_id.map_or("global".to_string(), |id| id.to_string()),
            self.command_cooldown_secs,
            self.queue_page_size,
            self.dj_role_id.map_or("none".to_string(), |id| id.to_string()),
            self.max_queue_size,
            self.max_playlist_size,
            self.notice_dismiss_secs,
            self.idle_disconnect_secs,
            self.ytdlp_path,
            self.spotify_credentials().is_some()
        )
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(val) if !val.trim().is_empty() => val
            .trim()
            .parse()
            .with_context(|| format!("{} inválido: {}", key, val)),
        _ => Ok(default),
    }
}

/// Default configuration values.
///
/// Used as fallbacks when environment variables are not provided.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (no defaults - must be provided)
            discord_token: String::new(),
            application_id: 0,
            guild_id: None,

            command_cooldown_secs: 3,
            queue_page_size: 10,
            dj_role_id: None,

            notice_dismiss_secs: 15,
            idle_disconnect_secs: 300, // 5 minutos
            max_queue_size: 1000,
            max_playlist_size: 100,

            spotify_client_id: None,
            spotify_client_secret: None,
            ytdlp_path: "yt-dlp".to_string(),
        }
    }
}
