use super::{
    config::audio as audio_config,
    error::PlayerError,
    history::HistorySort,
    player::Player,
    request::{collect_songs, parse_song_request},
    traits::VoiceConnector,
    voice::{SongbirdConnector, SongbirdStreamer},
};
use anyhow::{anyhow, Context};
use poise::{
    serenity_prelude::{ChannelId, Http},
    Command,
};
use std::{future::Future, sync::Arc};

use crate::{
    util::{reply_embed, send_embed},
    Data, Error, PoiseContext,
};

async fn get_player(ctx: &PoiseContext<'_>) -> anyhow::Result<Arc<Player>> {
    let guild_id = ctx.guild_id().context("failed to get guild id")?;
    let manager = songbird::get(ctx.serenity_context())
        .await
        .context("songbird voice client not registered")?;
    let data = ctx.data();
    let player = data
        .players
        .get_or_insert_with(guild_id, || {
            let handler = manager.get_or_insert(guild_id);
            let streamer = SongbirdStreamer::new(handler, data.config.bitrate);
            Player::new(
                guild_id.get(),
                data.config.clone(),
                data.encoder.clone(),
                Arc::new(streamer),
                data.history.clone(),
            )
            .with_resolver(data.resolver.clone())
        })
        .await;
    Ok(player)
}

/// Joins the author's voice channel unless the player already has a
/// connection.
async fn ensure_voice(ctx: &PoiseContext<'_>, player: &Player) -> anyhow::Result<()> {
    if player.voice_connection().await.is_some() {
        return Ok(());
    }
    let guild_id = ctx.guild_id().context("failed to get guild id")?;
    let channel_id = ctx.guild().and_then(|guild| {
        guild
            .voice_states
            .get(&ctx.author().id)
            .and_then(|voice_state| voice_state.channel_id)
    });
    let channel_id = channel_id.ok_or_else(|| anyhow!("Error: please be in a voice channel"))?;
    let manager = songbird::get(ctx.serenity_context())
        .await
        .context("songbird voice client not registered")?;
    let transport = SongbirdConnector::new(manager)
        .connect(guild_id.get(), channel_id.get())
        .await?;
    player.set_voice_connection(Some(transport)).await;
    Ok(())
}

/// Resolves ids, links or a search and queues every song found, returning
/// the numbered list for the reply.
async fn enqueue_request(
    ctx: &PoiseContext<'_>,
    player: &Player,
    param: &str,
) -> anyhow::Result<String> {
    let guild_id = ctx.guild_id().context("failed to get guild id")?;
    let data = ctx.data();
    let items = parse_song_request(param);
    let songs = collect_songs(
        &items,
        data.resolver.as_ref(),
        data.history.as_ref(),
        guild_id.get(),
    )
    .await;
    if songs.is_empty() {
        return Err(anyhow!("No songs to add to the queue."));
    }
    let mut text = String::new();
    for (i, song) in songs.into_iter().enumerate() {
        text += &format!("{}. {}\n", i + 1, song.get_string());
        player.enqueue(song).await;
    }
    Ok(text)
}

/// Runs playback off the command task; errors are reported to the channel.
fn spawn_playback<F, Fut>(ctx: &PoiseContext<'_>, player: Arc<Player>, run: F)
where
    F: FnOnce(Arc<Player>) -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), PlayerError>> + Send + 'static,
{
    let http: Arc<Http> = ctx.serenity_context().http.clone();
    let channel_id: ChannelId = ctx.channel_id();
    let guild_id = player.guild_id();
    tokio::spawn(async move {
        if let Err(why) = run(player).await {
            log::error!("playback in guild {} ended with error: {}", guild_id, why);
            if let Err(e) = send_embed(&http, channel_id, &format!("Error: {}", why)).await {
                log::error!("Error while sending error embed: {}", e)
            }
        }
    });
}

/// Queue songs by URL, search query or history id and start playing
#[poise::command(prefix_command, slash_command, aliases("p"))]
async fn play(
    ctx: PoiseContext<'_>,
    #[description = "song URLs, a search query, or \"id\" followed by history ids"]
    #[rest]
    query: String,
) -> anyhow::Result<(), Error> {
    let player = get_player(&ctx).await?;
    ensure_voice(&ctx, &player).await?;
    let text = enqueue_request(&ctx, &player, &query).await?;
    spawn_playback(&ctx, player, |player| async move { player.play(0.0, None).await });
    reply_embed(&ctx, &format!("Queued:\n\n{}", text)).await?;
    Ok(())
}

/// Add songs to the queue without starting playback
#[poise::command(prefix_command, slash_command, aliases("a"))]
async fn add(
    ctx: PoiseContext<'_>,
    #[description = "song URLs, a search query, or \"id\" followed by history ids"]
    #[rest]
    query: String,
) -> anyhow::Result<(), Error> {
    let player = get_player(&ctx).await?;
    let text = enqueue_request(&ctx, &player, &query).await?;
    reply_embed(&ctx, &format!("Added:\n\n{}", text)).await?;
    Ok(())
}

/// Pauses the current song
#[poise::command(prefix_command, slash_command)]
async fn pause(ctx: PoiseContext<'_>) -> anyhow::Result<(), Error> {
    let player = get_player(&ctx).await?;
    player.pause().await;
    reply_embed(&ctx, &player.get_string().await).await?;
    Ok(())
}

/// Resumes the current song, or starts the queue
#[poise::command(prefix_command, slash_command)]
async fn resume(ctx: PoiseContext<'_>) -> anyhow::Result<(), Error> {
    let player = get_player(&ctx).await?;
    ensure_voice(&ctx, &player).await?;
    spawn_playback(&ctx, player, |player| async move { player.unpause().await });
    reply_embed(&ctx, "Resuming").await?;
    Ok(())
}

/// Skips the currently playing song
#[poise::command(prefix_command, slash_command, aliases("ff"))]
async fn skip(ctx: PoiseContext<'_>) -> anyhow::Result<(), Error> {
    let player = get_player(&ctx).await?;
    spawn_playback(&ctx, player, |player| async move { player.skip().await });
    reply_embed(&ctx, "Skipped").await?;
    Ok(())
}

/// Stops playback, clears the queue and disconnects the bot
#[poise::command(prefix_command, slash_command, aliases("exit", "e", "x"))]
async fn stop(ctx: PoiseContext<'_>) -> anyhow::Result<(), Error> {
    let guild_id = ctx.guild_id().context("failed to get guild id")?;
    let player = ctx
        .data()
        .players
        .get(guild_id)
        .await
        .context("bot not active in current guild")?;
    player.stop().await;
    reply_embed(&ctx, "Disconnected").await?;
    Ok(())
}

/// Displays the queue
#[poise::command(prefix_command, slash_command, aliases("list", "l", "q"))]
async fn queue(ctx: PoiseContext<'_>) -> anyhow::Result<(), Error> {
    let guild_id = ctx.guild_id().context("failed to get guild id")?;
    let text = match ctx.data().players.get(guild_id).await {
        Some(player) => player.get_string().await,
        None => "*Not playing*".to_string(),
    };
    reply_embed(&ctx, &text).await?;
    Ok(())
}

/// Shows the songs played in this server
#[poise::command(prefix_command, slash_command)]
async fn history(
    ctx: PoiseContext<'_>,
    #[description = "sort by \"count\" or \"duration\", most recent by default"]
    #[rest]
    sort: Option<String>,
) -> anyhow::Result<(), Error> {
    let guild_id = ctx.guild_id().context("failed to get guild id")?;
    let sort = sort
        .as_deref()
        .and_then(|sort| sort.parse::<HistorySort>().ok())
        .unwrap_or_default();
    let history = ctx.data().history.guild_history(guild_id.get(), sort).await;
    let text = if history.is_empty() {
        "*nothing played yet*".to_string()
    } else {
        history
            .iter()
            .take(audio_config::HISTORY_DISPLAY_LIMIT)
            .map(|stats| {
                format!(
                    "`{}` [{}]({}) | plays: {} | listened: {:.0}m",
                    stats.id,
                    stats.title,
                    stats.user_url,
                    stats.play_count,
                    stats.duration / 60.0
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    };
    reply_embed(&ctx, &format!("**History, {}:**\n{}", sort.title(), text)).await?;
    Ok(())
}

/// Lists the commands
#[poise::command(prefix_command, slash_command, aliases("h"))]
async fn help(ctx: PoiseContext<'_>) -> anyhow::Result<(), Error> {
    let prefix = &ctx.data().bot_prefix;
    let text = HELP
        .iter()
        .map(|(usage, about)| format!("`{}{}` {}", prefix, usage, about))
        .collect::<Vec<_>>()
        .join("\n");
    reply_embed(&ctx, &format!("**Commands:**\n{}", text)).await?;
    Ok(())
}

const HELP: &[(&str, &str)] = &[
    ("play <url|query>", "queue songs and start playing (p)"),
    ("play id <n> ...", "replay songs from the history by id"),
    ("add <url|query>", "queue songs without playing (a)"),
    ("pause", "pause the current song"),
    ("resume", "resume, or start the queue"),
    ("skip", "skip the current song (ff)"),
    ("queue", "show the current song and queue (list, l, q)"),
    ("history [count|duration]", "songs played here, most recent first"),
    ("stop", "stop, clear the queue and leave (exit, e, x)"),
    ("help", "this list (h)"),
];

pub fn add_group(commands: &mut Vec<Command<Data, Error>>) {
    commands.extend(vec![
        play(),
        add(),
        pause(),
        resume(),
        skip(),
        stop(),
        queue(),
        history(),
        help(),
    ])
}
