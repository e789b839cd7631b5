use audio::{
    config::{BotConfig, PlayerConfig},
    history::MemoryHistory,
    registry::PlayerRegistry,
    subprocess::FfmpegEncoder,
    ytdl::YtDlp,
};
use serenity::all::ClientBuilder;
use songbird::SerenityInit;
use std::sync::Arc;
use util::send_embed;

mod audio;
mod logger;
mod util;

use poise::{
    serenity_prelude::{CacheHttp, GatewayIntents},
    Context as RawPoiseContext,
};

type Error = Box<dyn std::error::Error + Send + Sync>;
type PoiseContext<'a> = RawPoiseContext<'a, Data, Error>;

pub struct Data {
    pub players: PlayerRegistry,
    pub config: PlayerConfig,
    pub encoder: Arc<FfmpegEncoder>,
    pub resolver: Arc<YtDlp>,
    pub history: Arc<MemoryHistory>,
    pub bot_prefix: String,
}

async fn on_error(error: poise::FrameworkError<'_, Data, Error>) {
    match error {
        poise::FrameworkError::Command { error, ctx, .. } => {
            if let Err(e) = send_embed(
                ctx.serenity_context().http(),
                ctx.channel_id(),
                &error.to_string(),
            )
            .await
            {
                log::error!("Error while sending error embed: {}", e)
            };
        }
        error => {
            if let Err(e) = poise::builtins::on_error(error).await {
                log::error!("Error while handling error: {}", e)
            }
        }
    }
}

#[tokio::main]
async fn main() {
    logger::init_logger().expect("failed to init logger");
    let bot_config = BotConfig::from_env().expect("failed to read bot configuration");
    let player_config = PlayerConfig::from_env().expect("failed to read player configuration");
    log::info!("starting with {:?}", player_config);

    let mut commands = vec![];
    audio::add_group(&mut commands);
    let options = poise::FrameworkOptions {
        commands,
        on_error: |error| Box::pin(on_error(error)),
        prefix_options: poise::PrefixFrameworkOptions {
            prefix: Some(bot_config.bot_prefix.clone()),
            mention_as_prefix: false,

            ..Default::default()
        },
        ..Default::default()
    };
    let bot_prefix = bot_config.bot_prefix.clone();
    let framework = poise::Framework::builder()
        .options(options)
        .setup(move |ctx, _, framework| {
            Box::pin(async move {
                poise::builtins::register_globally(ctx, &framework.options().commands).await?;
                Ok(Data {
                    players: PlayerRegistry::new(),
                    resolver: Arc::new(YtDlp::new(player_config.ytdlp_path.clone())),
                    encoder: Arc::new(FfmpegEncoder),
                    history: Arc::new(MemoryHistory::new()),
                    config: player_config,
                    bot_prefix,
                })
            })
        })
        .build();
    let intents = GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::GUILD_VOICE_STATES
        | GatewayIntents::MESSAGE_CONTENT
        | GatewayIntents::GUILDS;
    let client = ClientBuilder::new(bot_config.bot_token, intents)
        .framework(framework)
        .register_songbird()
        .await;
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    client
        .expect("failed to create client")
        .start()
        .await
        .expect("client stopped with error")
}
