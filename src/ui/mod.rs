//! Presentación en Discord: embeds y avisos.

pub mod embeds;
