use std::{fmt, time::Duration};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PlaybackStatus {
    #[default]
    Resting,
    Playing,
    Paused,
    Error,
}

impl PlaybackStatus {
    pub fn emoji(self) -> &'static str {
        match self {
            PlaybackStatus::Resting => "⏹️",
            PlaybackStatus::Playing => "▶️",
            PlaybackStatus::Paused => "⏸",
            PlaybackStatus::Error => "⚠️",
        }
    }
}

impl fmt::Display for PlaybackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PlaybackStatus::Resting => "Resting",
            PlaybackStatus::Playing => "Playing",
            PlaybackStatus::Paused => "Paused",
            PlaybackStatus::Error => "Error",
        };
        f.write_str(name)
    }
}

/// Pending request to break the playback loop out of its stream wait.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Interrupt {
    Skip,
    Stop,
}

/// How an attached stream ended, as reported by the streamer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamEnd {
    Finished,
    EndOfStream,
    Failed(String),
}

impl StreamEnd {
    pub fn is_clean(&self) -> bool {
        matches!(self, StreamEnd::Finished | StreamEnd::EndOfStream)
    }
}

impl fmt::Display for StreamEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamEnd::Finished => f.write_str("finished"),
            StreamEnd::EndOfStream => f.write_str("end of stream"),
            StreamEnd::Failed(why) => write!(f, "failed: {}", why),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct EncodeOptions {
    /// Seconds into the source to start from.
    pub start_offset: f64,
    pub volume: f64,
    pub reconnect_delay_max: u64,
    pub user_agent: Option<String>,
    pub ffmpeg_path: String,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct EncodeStats {
    /// Audio produced by the encoder since it started.
    pub elapsed: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_eof_and_success_are_clean() {
        assert!(StreamEnd::Finished.is_clean());
        assert!(StreamEnd::EndOfStream.is_clean());
        assert!(!StreamEnd::Failed("reset by peer".to_string()).is_clean());
    }

    #[test]
    fn status_names() {
        assert_eq!(PlaybackStatus::default(), PlaybackStatus::Resting);
        assert_eq!(PlaybackStatus::Paused.to_string(), "Paused");
    }
}
