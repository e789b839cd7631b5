//! Works out how far into a track playback actually got when its stream
//! ended, and whether that counts as finished.

use std::time::{SystemTime, UNIX_EPOCH};

use reqwest::Url;

use super::{
    song::Song,
    traits::{EncodeSession, StreamSession},
    types::PlaybackStatus,
};

/// Position reached in the source, in seconds. The encoder runs ahead of the
/// transport, so its lead over the streamed position is added back.
pub fn song_position(start_offset: f64, streamed: f64, encoded: f64) -> f64 {
    let delay = encoded - streamed;
    start_offset + streamed + delay
}

fn query_param(url: &str, keys: &[&str]) -> Option<String> {
    let url = Url::parse(url).ok()?;
    let value = url
        .query_pairs()
        .find(|(key, _)| keys.contains(&key.as_ref()))
        .map(|(_, value)| value.into_owned());
    value
}

/// Track length in seconds, taken from the resolved link when it carries one
/// (`dur=` / `duration=`), else from the descriptor.
pub fn nominal_duration(song: &Song) -> Option<f64> {
    query_param(&song.download_url, &["dur", "duration"])
        .and_then(|value| value.trim_end_matches('s').parse::<f64>().ok())
        .or_else(|| song.duration.map(|duration| duration.as_secs_f64()))
        .filter(|seconds| seconds.is_finite() && *seconds > 0.0)
}

/// Whether a resolved link has passed its `expire=` timestamp. Links without
/// one never expire.
pub fn link_expired(url: &str, now: SystemTime) -> bool {
    let expire = match query_param(url, &["expire"]).and_then(|v| v.parse::<u64>().ok()) {
        Some(expire) => expire,
        None => return false,
    };
    let now = now
        .duration_since(UNIX_EPOCH)
        .map(|since| since.as_secs())
        .unwrap_or_default();
    expire <= now
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlaybackMetrics {
    pub start_offset: f64,
    pub streamed: f64,
    pub encoded: f64,
    pub delay: f64,
    pub position: f64,
    pub duration: Option<f64>,
}

impl PlaybackMetrics {
    pub fn new(start_offset: f64, streamed: f64, encoded: f64, duration: Option<f64>) -> Self {
        PlaybackMetrics {
            start_offset,
            streamed,
            encoded,
            delay: encoded - streamed,
            position: song_position(start_offset, streamed, encoded),
            duration,
        }
    }

    pub async fn measure(
        session: &dyn EncodeSession,
        stream: &dyn StreamSession,
        song: &Song,
    ) -> Self {
        let streamed = stream.playback_position().await.as_secs_f64();
        let metrics = PlaybackMetrics::new(
            session.start_offset(),
            streamed,
            session.stats().elapsed.as_secs_f64(),
            nominal_duration(song),
        );
        log::info!(
            "total duration: {:?}s, stopped at: {:.2}s",
            metrics.duration,
            metrics.position
        );
        log::info!(
            "encoding ahead of streaming: {:.2}s, encoding started at: {:.2}s",
            metrics.delay,
            metrics.start_offset
        );
        metrics
    }

    /// The stream ended before the track's content was delivered. Positions
    /// that are zero or negative, or an unknown duration, never count.
    pub fn is_premature(&self, status: PlaybackStatus) -> bool {
        if status != PlaybackStatus::Playing || self.encoded <= 0.0 || self.position <= 0.0 {
            return false;
        }
        match self.duration {
            Some(duration) => self.position < duration,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::song::SourceKind;
    use std::time::Duration;

    fn song(download_url: &str, duration: Option<u64>) -> Song {
        Song {
            id: "id".to_string(),
            title: "title".to_string(),
            user_url: "https://youtu.be/id".to_string(),
            download_url: download_url.to_string(),
            duration: duration.map(Duration::from_secs),
            thumbnail: None,
            source_kind: SourceKind::OnDemand,
        }
    }

    #[test]
    fn adds_encoder_lead_back_to_position() {
        assert_eq!(song_position(10.0, 30.0, 41.0), 51.0);
        let metrics = PlaybackMetrics::new(10.0, 30.0, 41.0, Some(180.0));
        assert_eq!(metrics.delay, 11.0);
        assert_eq!(metrics.position, 51.0);
        assert!(metrics.is_premature(PlaybackStatus::Playing));
    }

    #[test]
    fn finished_track_is_not_premature() {
        let metrics = PlaybackMetrics::new(0.0, 179.0, 180.0, Some(180.0));
        assert!(!metrics.is_premature(PlaybackStatus::Playing));
    }

    #[test]
    fn nothing_encoded_is_not_premature() {
        let metrics = PlaybackMetrics::new(0.0, 0.0, 0.0, Some(180.0));
        assert!(!metrics.is_premature(PlaybackStatus::Playing));
        let metrics = PlaybackMetrics::new(-5.0, 0.0, 1.0, Some(180.0));
        assert!(!metrics.is_premature(PlaybackStatus::Playing));
    }

    #[test]
    fn only_playing_status_resumes() {
        let metrics = PlaybackMetrics::new(0.0, 30.0, 31.0, Some(180.0));
        assert!(!metrics.is_premature(PlaybackStatus::Paused));
        assert!(!metrics.is_premature(PlaybackStatus::Resting));
        let unknown = PlaybackMetrics::new(0.0, 30.0, 31.0, None);
        assert!(!unknown.is_premature(PlaybackStatus::Playing));
    }

    #[test]
    fn duration_comes_from_link_first() {
        let s = song("https://media.example/v?id=1&dur=212.5&mime=audio", Some(100));
        assert_eq!(nominal_duration(&s), Some(212.5));
        let s = song("https://media.example/v?duration=90s", None);
        assert_eq!(nominal_duration(&s), Some(90.0));
    }

    #[test]
    fn duration_falls_back_to_descriptor() {
        let s = song("https://media.example/v?id=1", Some(100));
        assert_eq!(nominal_duration(&s), Some(100.0));
        let s = song("not a url", None);
        assert_eq!(nominal_duration(&s), None);
        let s = song("https://media.example/v?dur=0", None);
        assert_eq!(nominal_duration(&s), None);
    }

    #[test]
    fn expiry_is_read_from_link() {
        let now = UNIX_EPOCH + Duration::from_secs(1_000);
        assert!(link_expired("https://media.example/v?expire=999", now));
        assert!(link_expired("https://media.example/v?expire=1000", now));
        assert!(!link_expired("https://media.example/v?expire=1001", now));
        assert!(!link_expired("https://media.example/v", now));
        assert!(!link_expired("https://media.example/v?expire=soon", now));
    }
}
