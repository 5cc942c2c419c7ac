//! # Bot Module
//!
//! Capa de Discord del jukebox.
//!
//! - Registro de comandos slash
//! - Despacho de interacciones hacia el [`CommandGate`](gate::CommandGate) y las sesiones
//! - Limpieza de sesiones cuando alguien desconecta al bot de voz
//!
//! ## Architecture
//!
//! [`JukeboxBot`] implementa el [`EventHandler`] de serenity. No guarda
//! estado de reproducción propio: todo vive en el
//! [`SessionRegistry`] que recibe al construirse.

use anyhow::Result;
use serenity::{
    all::{ChannelId, Context, EventHandler, GuildId, Interaction, Ready, VoiceState},
    async_trait,
};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub mod commands;
pub mod gate;
pub mod handlers;

use crate::{
    audio::registry::SessionRegistry,
    bot::gate::CommandGate,
    config::Config,
    error::PlayerError,
};

/// Handler principal de eventos de Discord.
pub struct JukeboxBot {
    /// Configuración cargada del entorno
    config: Arc<Config>,
    /// Sesiones de reproducción por guild
    pub registry: Arc<SessionRegistry>,
    /// Cooldown y precondiciones de los comandos
    pub gate: CommandGate,
}

impl JukeboxBot {
    pub fn new(config: Arc<Config>, registry: Arc<SessionRegistry>) -> Self {
        let gate = CommandGate::new(config.command_cooldown());
        Self {
            config,
            registry,
            gate,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Registers slash commands with Discord.
    ///
    /// Con `GUILD_ID` los comandos se registran solo en esa guild (se
    /// propagan al instante); si no, globalmente.
    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        info!("📝 Registrando comandos slash...");

        match self.config.guild_id {
            Some(guild_id) => {
                let guild_id = GuildId::new(guild_id);
                info!("🏠 Registrando comandos para guild específica: {}", guild_id);
                commands::register_guild_commands(ctx, guild_id).await.map_err(|e| {
                    error!("❌ Error registrando comandos de guild: {:?}", e);
                    anyhow::anyhow!("No se pudieron registrar comandos de guild. Verifica que el bot tenga permisos de 'applications.commands' en la guild.")
                })?;
                info!("✅ Comandos de guild registrados para: {}", guild_id);
            }
            None => {
                info!("🌐 Registrando comandos globalmente");
                commands::register_global_commands(ctx).await.map_err(|e| {
                    error!("❌ Error registrando comandos globales: {:?}", e);
                    anyhow::anyhow!("No se pudieron registrar comandos globales. Verifica que el bot tenga permisos de 'applications.commands'.")
                })?;
                info!("✅ Comandos globales registrados");
            }
        }

        Ok(())
    }
}

#[async_trait]
impl EventHandler for JukeboxBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        if let Err(e) = self.register_commands(&ctx).await {
            error!("Error al registrar comandos: {:?}", e);
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Interaction::Command(command_interaction) = interaction {
            if let Err(e) = handlers::handle_command(&ctx, command_interaction, self).await {
                error!("Error manejando comando: {:?}", e);
            }
        }
    }

    /// Si alguien saca al bot del canal de voz de la sesión (lo desconecta o
    /// lo mueve a otro canal), esa sesión se detiene y sale del registro.
    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let current_user_id = ctx.cache.current_user().id;
        if new.user_id != current_user_id {
            return;
        }
        let Some(guild_id) = new.guild_id else {
            return;
        };
        let Ok(session) = self.registry.lookup(guild_id) else {
            return;
        };

        let before = old.and_then(|state| state.channel_id);
        if !left_bound_channel(session.channel_id(), before, new.channel_id) {
            debug!(
                "Cambio de voz del bot en guild {} ({:?} → {:?}) no afecta a la sesión",
                guild_id, before, new.channel_id
            );
            return;
        }

        info!(
            "🔌 Bot fuera del canal {} en guild {} (ahora {:?})",
            session.channel_id(),
            guild_id,
            new.channel_id
        );
        match session.stop().await {
            Ok(()) => info!("🧹 Sesión de guild {} cerrada tras la desconexión", guild_id),
            // Desconexión provocada por la propia sesión (stop o inactividad)
            Err(PlayerError::SessionNotFound) => debug!("Sin sesión viva en guild {}", guild_id),
            Err(e) => warn!("Error al cerrar la sesión de guild {}: {}", guild_id, e),
        }
    }
}

/// El bot estaba en el canal de la sesión y ya no lo está.
///
/// Salir de otro canal (el de una sesión recién reemplazada) o un cambio de
/// mute/deaf no cuentan. Sin estado previo en caché no se decide nada.
fn left_bound_channel(bound: ChannelId, before: Option<ChannelId>, after: Option<ChannelId>) -> bool {
    before == Some(bound) && after != Some(bound)
}
