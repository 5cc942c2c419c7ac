use std::time::Duration;

use crate::audio::track::ResolvedTrack;

/// Avisos que una sesión publica en su canal de texto.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    NowPlaying {
        track: ResolvedTrack,
        /// Tracks que quedan en la cola
        remaining: usize,
    },
    QueueEmpty,
}

/// Canal de texto asociado a una sesión.
///
/// `send` no bloquea: los fallos de entrega se registran en el log y nunca
/// vuelven a la máquina de estados.
#[cfg_attr(test, mockall::automock)]
pub trait NotificationChannel: Send + Sync {
    fn send(&self, notice: Notice, dismiss_after: Option<Duration>);
}
