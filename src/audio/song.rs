use std::time::Duration;

/// How a song behaves when its stream ends.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SourceKind {
    /// Finite track with a meaningful duration.
    #[default]
    OnDemand,
    /// Radio-like stream; never considered finished.
    LiveStream,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Thumbnail {
    pub url: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// An already-resolved playable item. Songs are passed around by value and
/// never mutated in place; a refreshed link produces a new `Song`.
#[derive(Clone, Debug, PartialEq)]
pub struct Song {
    pub id: String,
    pub title: String,
    pub user_url: String,
    pub download_url: String,
    pub duration: Option<Duration>,
    pub thumbnail: Option<Thumbnail>,
    pub source_kind: SourceKind,
}

impl Song {
    pub fn with_download_url(&self, download_url: String) -> Song {
        Song {
            download_url,
            ..self.clone()
        }
    }

    pub fn is_live(&self) -> bool {
        self.source_kind == SourceKind::LiveStream
    }

    pub fn get_string(&self) -> String {
        let duration = match (self.source_kind, self.duration) {
            (SourceKind::LiveStream, _) => "live".to_string(),
            (_, Some(duration)) => {
                let secs = duration.as_secs();
                let mins = secs / 60;
                format!("{}:{:0>2}", mins, secs - mins * 60)
            }
            (_, None) => "unknown duration".to_string(),
        };
        format!("[{}]({}) | {}", self.title, self.user_url, duration)
    }
}
