use anyhow::Result;
use serenity::{
    builder::{CreateInteractionResponse, CreateInteractionResponseMessage, EditInteractionResponse},
    model::{
        application::CommandInteraction,
        id::{ChannelId, GuildId, RoleId, UserId},
        permissions::Permissions,
    },
    prelude::Context,
};
use std::sync::Arc;
use tracing::{info, warn};

use crate::{
    audio::session::{PlaybackSession, ToggleOutcome},
    bot::{
        gate::{CommandContext, PermissionTier},
        JukeboxBot,
    },
    error::{PlayerError, PlayerResult},
    sources::TrackSource,
    ui::embeds::{self, DiscordNotifier},
};

/// Maneja comandos slash
pub async fn handle_command(ctx: &Context, command: CommandInteraction, bot: &JukeboxBot) -> Result<()> {
    let Some(guild_id) = command.guild_id else {
        command
            .create_response(
                &ctx.http,
                CreateInteractionResponse::Message(
                    CreateInteractionResponseMessage::new()
                        .content("This command only works in a server.")
                        .ephemeral(true),
                ),
            )
            .await?;
        return Ok(());
    };

    info!(
        "📝 Comando /{} usado por {} en guild {}",
        command.data.name, command.user.name, guild_id
    );

    let invocation = CommandContext {
        guild_id,
        user_id: command.user.id,
        user_voice: get_user_voice_channel(ctx, guild_id, command.user.id),
        tier: command.member.as_deref().map_or(PermissionTier::Member, |member| {
            permission_tier(
                member.permissions,
                &member.roles,
                bot.config().dj_role_id.map(RoleId::new),
            )
        }),
    };

    let result = match command.data.name.as_str() {
        "play" => return handle_play(ctx, &command, bot, &invocation).await,
        "pause" => handle_pause(bot, &invocation).await,
        "resume" => handle_resume(bot, &invocation).await,
        "skip" => handle_skip(bot, &invocation).await,
        "stop" => handle_stop(bot, &invocation).await,
        "queue" => handle_queue(bot, &invocation, page_option(&command)).await,
        "nowplaying" => handle_nowplaying(bot, &invocation).await,
        _ => Ok(CreateInteractionResponseMessage::new()
            .content("❌ Unknown command")
            .ephemeral(true)),
    };

    let message = result.unwrap_or_else(|e| error_message(&command.data.name, &e));
    command
        .create_response(&ctx.http, CreateInteractionResponse::Message(message))
        .await?;

    Ok(())
}

// Handlers específicos para cada comando

async fn handle_play(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &JukeboxBot,
    invocation: &CommandContext,
) -> Result<()> {
    let query = command
        .data
        .options
        .iter()
        .find(|opt| opt.name == "query")
        .and_then(|opt| opt.value.as_str())
        .ok_or_else(|| anyhow::anyhow!("Query no proporcionado"))?;

    let notifier = Arc::new(DiscordNotifier::new(ctx.http.clone(), command.channel_id));
    let session = match bot.gate.admit_play(&bot.registry, invocation, notifier).await {
        Ok(session) => session,
        Err(e) => {
            command
                .create_response(
                    &ctx.http,
                    CreateInteractionResponse::Message(error_message("play", &e)),
                )
                .await?;
            return Ok(());
        }
    };

    // Defer la respuesta ya que resolver puede tomar tiempo
    command.defer(&ctx.http).await?;

    let reply = match enqueue_query(&session, bot.registry.source().as_ref(), query, invocation.user_id).await {
        Ok(reply) => reply,
        Err(e) => {
            warn!("⚠️ /play \"{}\" falló: {}", query, e);
            e.to_string()
        }
    };

    command
        .edit_response(&ctx.http, EditInteractionResponse::new().content(reply))
        .await?;

    Ok(())
}

/// Resuelve `query` y encola el resultado; devuelve el texto para el usuario.
async fn enqueue_query(
    session: &PlaybackSession,
    source: &dyn TrackSource,
    query: &str,
    user_id: UserId,
) -> PlayerResult<String> {
    let tracks: Vec<_> = source
        .resolve(query)
        .await?
        .into_tracks()
        .into_iter()
        .map(|track| track.requested_by_user(user_id))
        .collect();

    let Some(first_title) = tracks.first().map(|track| track.title().to_string()) else {
        return Ok("No results found.".to_string());
    };

    let enqueued = session.enqueue_many(tracks).await?;
    let (Some(first), Some(last)) = (enqueued.first(), enqueued.last()) else {
        return Ok("No results found.".to_string());
    };

    Ok(if enqueued.len() == 1 {
        format!(
            "Added {} to the queue. Position {}/{}.",
            first_title,
            first.position + 1,
            last.count
        )
    } else {
        format!(
            "Added {} + {} track(s) to the queue. {}'s position {}/{}.",
            first_title,
            enqueued.len() - 1,
            first_title,
            first.position + 1,
            last.count
        )
    })
}

async fn handle_pause(bot: &JukeboxBot, invocation: &CommandContext) -> PlayerResult<CreateInteractionResponseMessage> {
    let session = bot.gate.admit_control(&bot.registry, invocation)?;

    Ok(match session.pause().await? {
        ToggleOutcome::Changed => text("Paused song."),
        ToggleOutcome::AlreadyInState => text("Already paused."),
        ToggleOutcome::NothingPlaying => return Err(PlayerError::SessionNotFound),
    })
}

async fn handle_resume(bot: &JukeboxBot, invocation: &CommandContext) -> PlayerResult<CreateInteractionResponseMessage> {
    let session = bot.gate.admit_control(&bot.registry, invocation)?;

    Ok(match session.resume().await? {
        ToggleOutcome::Changed => text("Resumed song."),
        ToggleOutcome::AlreadyInState => text("Already playing."),
        ToggleOutcome::NothingPlaying => return Err(PlayerError::SessionNotFound),
    })
}

async fn handle_skip(bot: &JukeboxBot, invocation: &CommandContext) -> PlayerResult<CreateInteractionResponseMessage> {
    let session = bot.gate.admit_control(&bot.registry, invocation)?;
    session.skip().await?;

    Ok(text("Skipping..."))
}

async fn handle_stop(bot: &JukeboxBot, invocation: &CommandContext) -> PlayerResult<CreateInteractionResponseMessage> {
    let session = bot.gate.admit_control(&bot.registry, invocation)?;
    session.stop().await?;

    Ok(text("Exiting..."))
}

async fn handle_queue(
    bot: &JukeboxBot,
    invocation: &CommandContext,
    page: usize,
) -> PlayerResult<CreateInteractionResponseMessage> {
    let session = bot.gate.admit_view(&bot.registry, invocation)?;

    if session.queue_len().await == 0 {
        return Ok(text("No tracks in queue."));
    }

    let pages = session.queue_pages(bot.config().queue_page_size).await;
    let index = page.clamp(1, pages.len().max(1)) - 1;
    Ok(match pages.get(index) {
        Some(page) => CreateInteractionResponseMessage::new().embed(embeds::create_queue_embed(page)),
        None => text("No tracks in queue."),
    })
}

async fn handle_nowplaying(
    bot: &JukeboxBot,
    invocation: &CommandContext,
) -> PlayerResult<CreateInteractionResponseMessage> {
    let session = bot.gate.admit_view(&bot.registry, invocation)?;
    let track = session.now_playing().await.ok_or(PlayerError::SessionNotFound)?;
    let remaining = session.queue_len().await;

    Ok(CreateInteractionResponseMessage::new().embed(embeds::create_now_playing_embed(&track, remaining)))
}

// Funciones auxiliares

fn text(content: &str) -> CreateInteractionResponseMessage {
    CreateInteractionResponseMessage::new().content(content)
}

/// Los errores se muestran solo a quien invocó el comando
fn error_message(command: &str, error: &PlayerError) -> CreateInteractionResponseMessage {
    if error.is_user_facing() {
        info!("🚫 /{} rechazado: {}", command, error);
    } else {
        warn!("⚠️ /{} falló: {}", command, error);
    }

    CreateInteractionResponseMessage::new()
        .embed(embeds::create_error_embed(&error.to_string()))
        .ephemeral(true)
}

fn page_option(command: &CommandInteraction) -> usize {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == "page")
        .and_then(|opt| opt.value.as_i64())
        .map_or(1, |page| page.max(1) as usize)
}

/// Administradores, quien gestiona la guild y el rol DJ configurado
fn permission_tier(permissions: Option<Permissions>, roles: &[RoleId], dj_role: Option<RoleId>) -> PermissionTier {
    let elevated = permissions.is_some_and(|p| p.administrator() || p.manage_guild());
    let has_dj_role = dj_role.is_some_and(|role| roles.contains(&role));

    if elevated || has_dj_role {
        PermissionTier::Dj
    } else {
        PermissionTier::Member
    }
}

fn get_user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
    let guild = guild_id.to_guild_cached(&ctx.cache)?;
    let channel_id = guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id);

    channel_id
}
