use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tokio::process::Command as TokioCommand;

use super::{
    error::ResolveError,
    song::{SourceKind, Song, Thumbnail},
    traits::SongResolver,
};

#[derive(Debug, Deserialize)]
struct TrackInfo {
    id: String,
    title: String,
    webpage_url: Option<String>,
    original_url: Option<String>,
    url: Option<String>,
    duration: Option<f64>,
    thumbnail: Option<String>,
    #[serde(default)]
    thumbnails: Vec<ThumbnailInfo>,
    is_live: Option<bool>,
    live_status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ThumbnailInfo {
    url: String,
    width: Option<u32>,
    height: Option<u32>,
}

impl TrackInfo {
    fn into_song(self) -> Option<Song> {
        let download_url = self.url?;
        let live = self.is_live.unwrap_or(false)
            || matches!(self.live_status.as_deref(), Some("is_live"));
        let thumbnail = self
            .thumbnails
            .into_iter()
            .filter(|t| t.width.is_some())
            .max_by_key(|t| t.width)
            .map(|t| Thumbnail {
                url: t.url,
                width: t.width,
                height: t.height,
            })
            .or_else(|| {
                self.thumbnail.map(|url| Thumbnail {
                    url,
                    ..Thumbnail::default()
                })
            });
        Some(Song {
            user_url: self
                .webpage_url
                .or(self.original_url)
                .unwrap_or_else(|| download_url.clone()),
            id: self.id,
            title: self.title,
            download_url,
            duration: self
                .duration
                .filter(|d| d.is_finite() && *d > 0.0)
                .map(Duration::from_secs_f64),
            thumbnail,
            source_kind: if live {
                SourceKind::LiveStream
            } else {
                SourceKind::OnDemand
            },
        })
    }
}

/// Parses `yt-dlp -j` output, one JSON document per line.
pub fn parse_ytdl_output(stdout: &str) -> Vec<Song> {
    stdout
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| {
            match serde_json::from_str::<TrackInfo>(line)
                .context("failed to parse output from ytdl query")
            {
                Err(err) => {
                    log::error!("parse_ytdl_output error: {err}");
                    None
                }
                Ok(track_info) => {
                    let id = track_info.id.clone();
                    let song = track_info.into_song();
                    if song.is_none() {
                        log::warn!("track {id} has no streamable url");
                    }
                    song
                }
            }
        })
        .collect()
}

fn ytdl_target(query: &str) -> String {
    if query.starts_with("http://") || query.starts_with("https://") {
        query.to_string()
    } else {
        format!("ytsearch:{}", query)
    }
}

/// Resolves queries and links through a `yt-dlp` binary.
pub struct YtDlp {
    binary: String,
}

impl YtDlp {
    pub fn new(binary: impl Into<String>) -> YtDlp {
        YtDlp {
            binary: binary.into(),
        }
    }
}

#[async_trait]
impl SongResolver for YtDlp {
    async fn resolve(&self, query: &str) -> Result<Vec<Song>, ResolveError> {
        let out = TokioCommand::new(&self.binary)
            .arg("-f")
            .arg("bestaudio/best")
            .arg("-j")
            .arg("--no-playlist")
            .arg(ytdl_target(query))
            .output()
            .await?;
        if !out.status.success() {
            let stderr = String::from_utf8_lossy(&out.stderr);
            return Err(ResolveError::Failed(stderr.trim().to_string()));
        }
        let songs = parse_ytdl_output(&String::from_utf8_lossy(&out.stdout));
        if songs.is_empty() {
            return Err(ResolveError::NotFound(query.to_string()));
        }
        Ok(songs)
    }

    async fn refresh(&self, song: &Song) -> Result<Song, ResolveError> {
        let fresh = self
            .resolve(&song.user_url)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ResolveError::NotFound(song.user_url.clone()))?;
        Ok(song.with_download_url(fresh.download_url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VIDEO: &str = r#"{"id":"abc","title":"A Song","webpage_url":"https://www.youtube.com/watch?v=abc","url":"https://media.example/abc?expire=1700000000&dur=212.5","duration":212.5,"thumbnail":"https://img.example/abc.jpg","thumbnails":[{"url":"https://img.example/small.jpg","width":120,"height":90},{"url":"https://img.example/big.jpg","width":1280,"height":720}],"is_live":false}"#;
    const LIVE: &str = r#"{"id":"radio","title":"Radio","original_url":"https://www.youtube.com/watch?v=radio","url":"https://media.example/radio.m3u8","live_status":"is_live"}"#;

    #[test]
    fn parses_on_demand_track() {
        let songs = parse_ytdl_output(VIDEO);
        assert_eq!(songs.len(), 1);
        let song = &songs[0];
        assert_eq!(song.id, "abc");
        assert_eq!(song.user_url, "https://www.youtube.com/watch?v=abc");
        assert_eq!(song.duration, Some(Duration::from_secs_f64(212.5)));
        assert_eq!(song.source_kind, SourceKind::OnDemand);
        let thumbnail = song.thumbnail.as_ref().unwrap();
        assert_eq!(thumbnail.url, "https://img.example/big.jpg");
        assert_eq!(thumbnail.width, Some(1280));
    }

    #[test]
    fn parses_live_stream() {
        let songs = parse_ytdl_output(LIVE);
        assert_eq!(songs[0].source_kind, SourceKind::LiveStream);
        assert_eq!(songs[0].user_url, "https://www.youtube.com/watch?v=radio");
        assert_eq!(songs[0].duration, None);
        assert_eq!(songs[0].thumbnail, None);
    }

    #[test]
    fn skips_bad_lines() {
        let stdout = format!("{VIDEO}\nnot json\n\n{}\n{LIVE}\n", r#"{"id":"x","title":"no url"}"#);
        let ids: Vec<_> = parse_ytdl_output(&stdout).into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec!["abc".to_string(), "radio".to_string()]);
    }

    #[test]
    fn searches_plain_queries() {
        assert_eq!(ytdl_target("lofi beats"), "ytsearch:lofi beats");
        assert_eq!(
            ytdl_target("https://youtu.be/abc"),
            "https://youtu.be/abc"
        );
    }
}
