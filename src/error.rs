use serenity::model::id::ChannelId;
use thiserror::Error;

/// Errores del controlador de reproducción.
///
/// Las variantes de precondición (`NotInVoiceChannel`, `WrongChannel`,
/// `SessionNotFound`, `InsufficientPermission`, `RateLimited`, `QueueFull`)
/// llegan al usuario como mensaje efímero. `QueueEmpty` nunca sale de
/// `PlaybackSession::advance`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlayerError {
    #[error("No songs remaining in queue.")]
    QueueEmpty,

    #[error("Not playing any tracks currently.")]
    SessionNotFound,

    #[error("Author not connected to a voice channel.")]
    NotInVoiceChannel,

    #[error("Author not connected to <#{expected}>.")]
    WrongChannel { expected: ChannelId },

    #[error("Command only usable to mods/admins.")]
    InsufficientPermission,

    #[error("Woah! Slow down, please. Try again in {retry_after_secs} second(s)!")]
    RateLimited { retry_after_secs: u64 },

    #[error("The queue is full (max {max} tracks).")]
    QueueFull { max: usize },

    #[error("Could not resolve track: {0}")]
    TrackResolutionFailed(String),

    #[error("Could not connect to the voice channel: {0}")]
    ConnectError(String),

    #[error("Voice backend error: {0}")]
    Backend(String),
}

impl PlayerError {
    /// Errores recuperables que se muestran tal cual al usuario.
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            Self::SessionNotFound
                | Self::NotInVoiceChannel
                | Self::WrongChannel { .. }
                | Self::InsufficientPermission
                | Self::RateLimited { .. }
                | Self::QueueFull { .. }
        )
    }
}

pub type PlayerResult<T> = std::result::Result<T, PlayerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precondition_errors_are_user_facing() {
        assert!(PlayerError::RateLimited { retry_after_secs: 2 }.is_user_facing());
        assert!(PlayerError::WrongChannel { expected: ChannelId::new(7) }.is_user_facing());
        assert!(!PlayerError::QueueEmpty.is_user_facing());
        assert!(!PlayerError::ConnectError("boom".into()).is_user_facing());
    }

    #[test]
    fn test_rate_limited_message() {
        let err = PlayerError::RateLimited { retry_after_secs: 3 };
        assert_eq!(
            err.to_string(),
            "Woah! Slow down, please. Try again in 3 second(s)!"
        );
    }
}
