use anyhow::Result;
use serenity::{model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use tracing::{error, info};

use guild_jukebox::{
    audio::{registry::SessionRegistry, songbird_backend::SongbirdBackend},
    bot::JukeboxBot,
    config::Config,
    sources::{SourceRouter, SpotifyClient, TrackSource, YtDlpClient},
};

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("guild_jukebox=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Iniciando Guild Jukebox v{}", env!("CARGO_PKG_VERSION"));

    // Manejar health check si es necesario
    if std::env::args().any(|arg| arg == "--health-check") {
        return health_check().await;
    }

    // Cargar configuración
    let config = Arc::new(Config::load()?);
    info!("{}", config.summary());

    // Fuentes de audio
    let http = reqwest::Client::new();
    let ytdlp = Arc::new(YtDlpClient::new(config.ytdlp_path.clone(), config.max_playlist_size));
    let spotify = config.spotify_credentials().map(|(client_id, client_secret)| {
        info!("🎧 Enlaces de Spotify habilitados");
        Arc::new(SpotifyClient::new(
            http.clone(),
            client_id,
            client_secret,
            config.max_playlist_size,
            ytdlp.clone(),
        )) as Arc<dyn TrackSource>
    });
    let source = Arc::new(SourceRouter::new(ytdlp, spotify));

    // Voz y sesiones
    let songbird = Songbird::serenity();
    let backend = Arc::new(SongbirdBackend::new(songbird.clone(), http));
    let registry = Arc::new(SessionRegistry::new(backend, source, config.session_settings()));

    // Configurar intents mínimos necesarios
    let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_VOICE_STATES;

    let handler = JukeboxBot::new(config.clone(), registry);

    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird_with(songbird)
        .await?;

    // Manejar shutdown graceful
    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Error al registrar Ctrl+C: {:?}", e);
            return;
        }
        info!("⚠️ Señal de shutdown recibida, cerrando...");
        shard_manager.shutdown_all().await;
    });

    // Iniciar bot
    info!("🚀 Bot iniciado exitosamente");
    if let Err(why) = client.start().await {
        error!("Error al ejecutar cliente: {:?}", why);
    }

    Ok(())
}

async fn health_check() -> Result<()> {
    // Verificar dependencias críticas
    let yt_dlp = async_process::Command::new("yt-dlp")
        .arg("--version")
        .output()
        .await?;

    let ffmpeg = async_process::Command::new("ffmpeg")
        .arg("-version")
        .output()
        .await?;

    if yt_dlp.status.success() && ffmpeg.status.success() {
        println!("OK");
        Ok(())
    } else {
        anyhow::bail!("Dependencias faltantes");
    }
}
