use std::{
    io::{Read, Seek, SeekFrom},
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use symphonia::core::io::MediaSource;
use tokio::sync::oneshot;

use super::{
    error::{EncodeError, HistoryError, ResolveError, StreamError, TransportError},
    song::Song,
    types::{EncodeOptions, EncodeStats, StreamEnd},
};

/// A joined voice channel.
#[async_trait]
pub trait VoiceTransport: Send + Sync {
    async fn is_ready(&self) -> bool;
    async fn set_speaking(&self, speaking: bool) -> Result<(), TransportError>;
    async fn disconnect(&self) -> Result<(), TransportError>;
}

#[async_trait]
pub trait VoiceConnector: Send + Sync {
    async fn connect(
        &self,
        guild_id: u64,
        channel_id: u64,
    ) -> Result<Arc<dyn VoiceTransport>, TransportError>;
}

#[async_trait]
pub trait Encoder: Send + Sync {
    async fn encode(
        &self,
        url: &str,
        options: &EncodeOptions,
    ) -> Result<Arc<dyn EncodeSession>, EncodeError>;
}

pub trait EncodeSession: Send + Sync {
    fn stats(&self) -> EncodeStats;
    fn start_offset(&self) -> f64;
    /// Hands the produced audio to a streamer. Only the first call gets it.
    fn take_output(&self) -> Option<PcmSource>;
    /// Stops encoding. Safe to call more than once.
    fn cleanup(&self);
}

#[async_trait]
pub trait Streamer: Send + Sync {
    async fn attach(
        &self,
        session: &dyn EncodeSession,
        transport: &dyn VoiceTransport,
    ) -> Result<(Arc<dyn StreamSession>, oneshot::Receiver<StreamEnd>), StreamError>;
}

#[async_trait]
pub trait StreamSession: Send + Sync {
    async fn playback_position(&self) -> Duration;
    fn set_paused(&self, paused: bool);
    fn is_paused(&self) -> bool;
}

#[async_trait]
pub trait HistoryRecorder: Send + Sync {
    async fn record_start(&self, guild_id: u64, song: &Song) -> Result<(), HistoryError>;
    async fn record_play_count(&self, guild_id: u64, track_id: &str) -> Result<(), HistoryError>;
    async fn record_duration(
        &self,
        guild_id: u64,
        track_id: &str,
        seconds: f64,
    ) -> Result<(), HistoryError>;
}

#[async_trait]
pub trait SongResolver: Send + Sync {
    async fn resolve(&self, query: &str) -> Result<Vec<Song>, ResolveError>;
    /// Re-resolves the streamable link of an already known song.
    async fn refresh(&self, song: &Song) -> Result<Song, ResolveError>;
}

/// Raw interleaved f32 PCM handed from an encoder to a streamer.
pub struct PcmSource(Box<dyn MediaSource>);

impl PcmSource {
    pub fn new<S: MediaSource + 'static>(source: S) -> PcmSource {
        PcmSource(Box::new(source))
    }
}

impl Read for PcmSource {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.0.read(buf)
    }
}

impl Seek for PcmSource {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.0.seek(pos)
    }
}

impl MediaSource for PcmSource {
    fn is_seekable(&self) -> bool {
        self.0.is_seekable()
    }

    fn byte_len(&self) -> Option<u64> {
        self.0.byte_len()
    }
}
