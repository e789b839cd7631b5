use std::{collections::HashMap, str::FromStr};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{error::HistoryError, song::Song, traits::HistoryRecorder};

#[derive(Clone, Debug, Default, PartialEq)]
pub struct TrackStats {
    /// Stable per-process id, shown to users for replaying a track.
    pub id: u64,
    pub track_id: String,
    pub title: String,
    pub user_url: String,
    pub starts: u64,
    pub play_count: u64,
    /// Seconds actually listened.
    pub duration: f64,
    /// Order of the most recent start; higher is more recent.
    pub last_played: u64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum HistorySort {
    #[default]
    Recent,
    PlayCount,
    Duration,
}

impl HistorySort {
    pub fn title(self) -> &'static str {
        match self {
            HistorySort::Recent => "most recent",
            HistorySort::PlayCount => "by play count",
            HistorySort::Duration => "by total duration",
        }
    }
}

impl FromStr for HistorySort {
    type Err = std::convert::Infallible;

    /// Unknown modes fall back to most recent.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim() {
            "count" | "times" | "time" => HistorySort::PlayCount,
            "duration" | "dur" => HistorySort::Duration,
            _ => HistorySort::Recent,
        })
    }
}

#[derive(Default)]
struct HistoryTable {
    tracks: HashMap<(u64, String), TrackStats>,
    next_id: u64,
    clock: u64,
}

/// Process-lifetime playback statistics, keyed by guild and track id.
#[derive(Default)]
pub struct MemoryHistory {
    table: Mutex<HistoryTable>,
}

impl MemoryHistory {
    pub fn new() -> MemoryHistory {
        MemoryHistory::default()
    }

    #[cfg(test)]
    pub async fn stats(&self, guild_id: u64, track_id: &str) -> Option<TrackStats> {
        let table = self.table.lock().await;
        table.tracks.get(&(guild_id, track_id.to_string())).cloned()
    }

    /// Looks up a track of one guild by the id shown in its history.
    pub async fn track_by_id(&self, guild_id: u64, id: u64) -> Option<TrackStats> {
        let table = self.table.lock().await;
        table
            .tracks
            .iter()
            .find(|((guild, _), stats)| *guild == guild_id && stats.id == id)
            .map(|(_, stats)| stats.clone())
    }

    pub async fn guild_history(&self, guild_id: u64, sort: HistorySort) -> Vec<TrackStats> {
        let table = self.table.lock().await;
        let mut history: Vec<_> = table
            .tracks
            .iter()
            .filter(|((guild, _), _)| *guild == guild_id)
            .map(|(_, stats)| stats.clone())
            .collect();
        match sort {
            HistorySort::Recent => history.sort_by(|a, b| b.last_played.cmp(&a.last_played)),
            HistorySort::PlayCount => history.sort_by(|a, b| {
                b.play_count
                    .cmp(&a.play_count)
                    .then_with(|| b.duration.total_cmp(&a.duration))
            }),
            HistorySort::Duration => history.sort_by(|a, b| {
                b.duration
                    .total_cmp(&a.duration)
                    .then_with(|| b.play_count.cmp(&a.play_count))
            }),
        }
        history
    }

    async fn update<F>(&self, guild_id: u64, track_id: &str, f: F) -> Result<(), HistoryError>
    where
        F: FnOnce(&mut TrackStats),
    {
        let mut table = self.table.lock().await;
        let stats = table
            .tracks
            .get_mut(&(guild_id, track_id.to_string()))
            .ok_or_else(|| HistoryError::UnknownTrack(track_id.to_string()))?;
        f(stats);
        Ok(())
    }
}

#[async_trait]
impl HistoryRecorder for MemoryHistory {
    async fn record_start(&self, guild_id: u64, song: &Song) -> Result<(), HistoryError> {
        let mut table = self.table.lock().await;
        table.clock += 1;
        let clock = table.clock;
        let key = (guild_id, song.id.clone());
        if !table.tracks.contains_key(&key) {
            table.next_id += 1;
            let stats = TrackStats {
                id: table.next_id,
                track_id: song.id.clone(),
                title: song.title.clone(),
                user_url: song.user_url.clone(),
                ..TrackStats::default()
            };
            table.tracks.insert(key.clone(), stats);
        }
        if let Some(stats) = table.tracks.get_mut(&key) {
            stats.starts += 1;
            stats.last_played = clock;
        }
        Ok(())
    }

    async fn record_play_count(&self, guild_id: u64, track_id: &str) -> Result<(), HistoryError> {
        self.update(guild_id, track_id, |stats| stats.play_count += 1)
            .await
    }

    async fn record_duration(
        &self,
        guild_id: u64,
        track_id: &str,
        seconds: f64,
    ) -> Result<(), HistoryError> {
        self.update(guild_id, track_id, |stats| stats.duration += seconds)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::song::SourceKind;

    fn song(id: &str) -> Song {
        Song {
            id: id.to_string(),
            title: format!("title {id}"),
            user_url: format!("https://youtu.be/{id}"),
            download_url: format!("https://media.example/{id}"),
            duration: None,
            thumbnail: None,
            source_kind: SourceKind::OnDemand,
        }
    }

    fn ids(history: Vec<TrackStats>) -> Vec<String> {
        history.into_iter().map(|stats| stats.track_id).collect()
    }

    #[tokio::test]
    async fn counts_are_kept_per_guild() {
        let history = MemoryHistory::new();
        history.record_start(1, &song("a")).await.unwrap();
        history.record_start(2, &song("a")).await.unwrap();
        history.record_play_count(1, "a").await.unwrap();
        history.record_duration(1, "a", 2.0).await.unwrap();
        history.record_duration(1, "a", 2.0).await.unwrap();

        let stats = history.stats(1, "a").await.unwrap();
        assert_eq!(stats.play_count, 1);
        assert_eq!(stats.duration, 4.0);
        assert_eq!(stats.title, "title a");
        assert_eq!(history.stats(2, "a").await.unwrap().play_count, 0);
    }

    #[tokio::test]
    async fn unknown_tracks_are_rejected() {
        let history = MemoryHistory::new();
        let err = history.record_play_count(1, "missing").await.unwrap_err();
        assert!(matches!(err, HistoryError::UnknownTrack(id) if id == "missing"));
    }

    #[tokio::test]
    async fn restarting_a_track_keeps_its_id() {
        let history = MemoryHistory::new();
        history.record_start(1, &song("a")).await.unwrap();
        let id = history.stats(1, "a").await.unwrap().id;
        history.record_start(1, &song("b")).await.unwrap();
        history.record_start(1, &song("a")).await.unwrap();

        let stats = history.stats(1, "a").await.unwrap();
        assert_eq!(stats.id, id);
        assert_eq!(stats.starts, 2);
        assert_eq!(history.guild_history(1, HistorySort::Recent).await.len(), 2);
        assert_eq!(history.track_by_id(1, id).await.unwrap().track_id, "a");
        assert!(history.track_by_id(2, id).await.is_none());
    }

    #[tokio::test]
    async fn history_sort_modes() {
        let history = MemoryHistory::new();
        for id in ["a", "b", "c"] {
            history.record_start(1, &song(id)).await.unwrap();
        }
        history.record_play_count(1, "a").await.unwrap();
        history.record_play_count(1, "a").await.unwrap();
        history.record_play_count(1, "b").await.unwrap();
        history.record_duration(1, "b", 60.0).await.unwrap();
        history.record_duration(1, "c", 10.0).await.unwrap();
        history.record_start(1, &song("b")).await.unwrap();

        let recent = history.guild_history(1, HistorySort::Recent).await;
        assert_eq!(ids(recent), vec!["b", "c", "a"]);
        let count = history.guild_history(1, HistorySort::PlayCount).await;
        assert_eq!(ids(count), vec!["a", "b", "c"]);
        let duration = history.guild_history(1, HistorySort::Duration).await;
        assert_eq!(ids(duration), vec!["b", "c", "a"]);
    }

    #[test]
    fn parses_sort_mode() {
        assert_eq!("count".parse::<HistorySort>(), Ok(HistorySort::PlayCount));
        assert_eq!("time".parse::<HistorySort>(), Ok(HistorySort::PlayCount));
        assert_eq!("dur".parse::<HistorySort>(), Ok(HistorySort::Duration));
        assert_eq!("".parse::<HistorySort>(), Ok(HistorySort::Recent));
        assert_eq!("whatever".parse::<HistorySort>(), Ok(HistorySort::Recent));
    }
}
