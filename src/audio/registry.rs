use poise::serenity_prelude::GuildId;
use std::{collections::HashMap, sync::Arc};
use tokio::sync::Mutex;

use super::player::Player;

/// One [`Player`] per guild, created on first use and kept for the life of
/// the process.
#[derive(Default)]
pub struct PlayerRegistry {
    players: Mutex<HashMap<GuildId, Arc<Player>>>,
}

impl PlayerRegistry {
    pub fn new() -> PlayerRegistry {
        PlayerRegistry::default()
    }

    pub async fn get(&self, guild_id: GuildId) -> Option<Arc<Player>> {
        self.players.lock().await.get(&guild_id).cloned()
    }

    pub async fn get_or_insert_with<F>(&self, guild_id: GuildId, make: F) -> Arc<Player>
    where
        F: FnOnce() -> Player,
    {
        let mut players = self.players.lock().await;
        players
            .entry(guild_id)
            .or_insert_with(|| Arc::new(make()))
            .clone()
    }
}
