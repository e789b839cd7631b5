use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

use super::types::EncodeOptions;

pub const ENV_PREFIX: &str = "MELODY_";

pub mod audio {
    pub const SAMPLE_RATE: u32 = 48_000;
    pub const CHANNELS: u32 = 2;
    pub const HISTORY_DISPLAY_LIMIT: usize = 10;
}

mod defaults {
    pub fn ready_poll_interval_ms() -> u64 {
        100
    }
    pub fn ready_timeout_ms() -> u64 {
        30_000
    }
    pub fn stats_interval_ms() -> u64 {
        2_000
    }
    pub fn settle_delay_ms() -> u64 {
        250
    }
    pub fn bitrate() -> u32 {
        96
    }
    pub fn volume() -> f64 {
        1.0
    }
    pub fn reconnect_delay_max() -> u64 {
        5
    }
    pub fn ffmpeg_path() -> String {
        "ffmpeg".to_string()
    }
    pub fn ytdlp_path() -> String {
        "yt-dlp".to_string()
    }
    pub fn bot_prefix() -> String {
        "!".to_string()
    }
}

/// Engine timings and encoder settings, read from `MELODY_*` variables.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct PlayerConfig {
    #[serde(default = "defaults::ready_poll_interval_ms")]
    pub ready_poll_interval_ms: u64,
    /// `0` waits for the voice connection forever.
    #[serde(default = "defaults::ready_timeout_ms")]
    pub ready_timeout_ms: u64,
    #[serde(default = "defaults::stats_interval_ms")]
    pub stats_interval_ms: u64,
    #[serde(default = "defaults::settle_delay_ms")]
    pub settle_delay_ms: u64,
    /// Opus bitrate in kbps.
    #[serde(default = "defaults::bitrate")]
    pub bitrate: u32,
    #[serde(default = "defaults::volume")]
    pub volume: f64,
    #[serde(default = "defaults::reconnect_delay_max")]
    pub reconnect_delay_max: u64,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default = "defaults::ffmpeg_path")]
    pub ffmpeg_path: String,
    #[serde(default = "defaults::ytdlp_path")]
    pub ytdlp_path: String,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        PlayerConfig {
            ready_poll_interval_ms: defaults::ready_poll_interval_ms(),
            ready_timeout_ms: defaults::ready_timeout_ms(),
            stats_interval_ms: defaults::stats_interval_ms(),
            settle_delay_ms: defaults::settle_delay_ms(),
            bitrate: defaults::bitrate(),
            volume: defaults::volume(),
            reconnect_delay_max: defaults::reconnect_delay_max(),
            user_agent: None,
            ffmpeg_path: defaults::ffmpeg_path(),
            ytdlp_path: defaults::ytdlp_path(),
        }
    }
}

impl PlayerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        envy::prefixed(ENV_PREFIX)
            .from_env()
            .context("invalid player configuration")
    }

    pub fn ready_poll_interval(&self) -> Duration {
        Duration::from_millis(self.ready_poll_interval_ms.max(1))
    }

    pub fn ready_timeout(&self) -> Option<Duration> {
        match self.ready_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    pub fn stats_interval(&self) -> Duration {
        Duration::from_millis(self.stats_interval_ms.max(1))
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn encode_options(&self, start_offset: f64) -> EncodeOptions {
        EncodeOptions {
            start_offset,
            volume: self.volume,
            reconnect_delay_max: self.reconnect_delay_max,
            user_agent: self.user_agent.clone(),
            ffmpeg_path: self.ffmpeg_path.clone(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct BotConfig {
    pub bot_token: String,
    #[serde(default = "defaults::bot_prefix")]
    pub bot_prefix: String,
}

impl BotConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        envy::prefixed(ENV_PREFIX)
            .from_env()
            .context("missing bot configuration, is MELODY_BOT_TOKEN set?")
    }
}
