//! Turns the argument of `play` / `add` into songs: history ids, one or more
//! links, or a single search.

use log::warn;

use super::{history::MemoryHistory, song::Song, traits::SongResolver};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RequestItem {
    /// Id shown by the history command.
    Id(u64),
    /// Token after `id` that is not a number.
    BadId(String),
    Url(String),
    Title(String),
}

fn is_url(token: &str) -> bool {
    token.starts_with("https://") || token.starts_with("http://")
}

/// `id 3 5` replays history entries, a list of links queues each of them and
/// anything else is one search.
pub fn parse_song_request(param: &str) -> Vec<RequestItem> {
    let tokens: Vec<&str> = param.split_whitespace().collect();
    match tokens.split_first() {
        None => vec![],
        Some((first, ids)) if first.eq_ignore_ascii_case("id") => ids
            .iter()
            .map(|token| match token.parse() {
                Ok(id) => RequestItem::Id(id),
                Err(_) => RequestItem::BadId(token.to_string()),
            })
            .collect(),
        Some(_) if tokens.iter().all(|token| is_url(token)) => tokens
            .iter()
            .map(|url| RequestItem::Url(url.to_string()))
            .collect(),
        Some(_) => vec![RequestItem::Title(param.trim().to_string())],
    }
}

async fn resolve_first(resolver: &dyn SongResolver, query: &str) -> Option<Song> {
    match resolver.resolve(query).await {
        Ok(songs) => songs.into_iter().next(),
        Err(why) => {
            warn!("failed to resolve {}: {}", query, why);
            None
        }
    }
}

/// Resolves every item in order. Items that cannot be resolved are logged
/// and left out.
pub async fn collect_songs(
    items: &[RequestItem],
    resolver: &dyn SongResolver,
    history: &MemoryHistory,
    guild_id: u64,
) -> Vec<Song> {
    let mut songs = Vec::with_capacity(items.len());
    for item in items {
        let song = match item {
            RequestItem::Id(id) => match history.track_by_id(guild_id, *id).await {
                Some(track) => resolve_first(resolver, &track.user_url).await,
                None => {
                    warn!("no track with id {} in history of guild {}", id, guild_id);
                    None
                }
            },
            RequestItem::BadId(token) => {
                warn!("invalid track id: {}", token);
                None
            }
            RequestItem::Url(query) | RequestItem::Title(query) => {
                resolve_first(resolver, query).await
            }
        };
        songs.extend(song);
    }
    songs
}
