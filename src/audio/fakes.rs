//! In-memory collaborators for driving a [`Player`] in tests.

use async_trait::async_trait;
use std::{
    collections::VecDeque,
    future::Future,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};
use tokio::sync::oneshot;

use super::{
    config::PlayerConfig,
    error::{EncodeError, ResolveError, StreamError, TransportError},
    history::MemoryHistory,
    player::Player,
    song::{SourceKind, Song},
    traits::{
        EncodeSession, Encoder, PcmSource, SongResolver, StreamSession, Streamer, VoiceTransport,
    },
    types::{EncodeOptions, EncodeStats, StreamEnd},
};

pub const GUILD: u64 = 42;

pub fn test_config() -> PlayerConfig {
    PlayerConfig {
        ready_poll_interval_ms: 1,
        ready_timeout_ms: 200,
        stats_interval_ms: 5,
        settle_delay_ms: 0,
        ..PlayerConfig::default()
    }
}

pub fn song(id: &str) -> Song {
    Song {
        id: id.to_string(),
        title: format!("song {id}"),
        user_url: format!("https://youtu.be/{id}"),
        download_url: format!("https://media.example/{id}?dur=180"),
        duration: Some(Duration::from_secs(180)),
        thumbnail: None,
        source_kind: SourceKind::OnDemand,
    }
}

pub fn live_song(id: &str) -> Song {
    Song {
        download_url: format!("https://media.example/{id}.m3u8"),
        duration: None,
        source_kind: SourceKind::LiveStream,
        ..song(id)
    }
}

/// Polls `check` until it holds, giving the player task time to run.
pub async fn wait_until<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..2000 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    panic!("condition not reached in time");
}

#[derive(Default)]
pub struct FakeSession {
    start_offset: f64,
    elapsed: Duration,
    pub cleaned: AtomicBool,
}

impl EncodeSession for FakeSession {
    fn stats(&self) -> EncodeStats {
        EncodeStats {
            elapsed: self.elapsed,
        }
    }

    fn start_offset(&self) -> f64 {
        self.start_offset
    }

    fn take_output(&self) -> Option<PcmSource> {
        None
    }

    fn cleanup(&self) {
        self.cleaned.store(true, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct FakeEncoder {
    pub calls: Mutex<Vec<(String, EncodeOptions)>>,
    pub sessions: Mutex<Vec<Arc<FakeSession>>>,
    /// Encoded seconds reported by successive sessions; zero once drained.
    pub elapsed: Mutex<VecDeque<Duration>>,
    pub fail_next: AtomicBool,
}

impl FakeEncoder {
    pub fn offsets(&self) -> Vec<f64> {
        let calls = self.calls.lock().unwrap();
        calls.iter().map(|(_, options)| options.start_offset).collect()
    }

    pub fn urls(&self) -> Vec<String> {
        let calls = self.calls.lock().unwrap();
        calls.iter().map(|(url, _)| url.clone()).collect()
    }

    pub fn script_elapsed(&self, seconds: &[u64]) {
        let mut elapsed = self.elapsed.lock().unwrap();
        elapsed.extend(seconds.iter().map(|s| Duration::from_secs(*s)));
    }
}

#[async_trait]
impl Encoder for FakeEncoder {
    async fn encode(
        &self,
        url: &str,
        options: &EncodeOptions,
    ) -> Result<Arc<dyn EncodeSession>, EncodeError> {
        self.calls
            .lock()
            .unwrap()
            .push((url.to_string(), options.clone()));
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(EncodeError::NoOutput);
        }
        let elapsed = self.elapsed.lock().unwrap().pop_front().unwrap_or_default();
        let session = Arc::new(FakeSession {
            start_offset: options.start_offset,
            elapsed,
            cleaned: AtomicBool::new(false),
        });
        self.sessions.lock().unwrap().push(session.clone());
        Ok(session)
    }
}

#[derive(Default)]
pub struct FakeTransport {
    pub ready: AtomicBool,
    pub speaking: Mutex<Vec<bool>>,
    pub disconnected: AtomicBool,
}

impl FakeTransport {
    pub fn ready() -> Arc<FakeTransport> {
        let transport = FakeTransport::default();
        transport.ready.store(true, Ordering::SeqCst);
        Arc::new(transport)
    }
}

#[async_trait]
impl VoiceTransport for FakeTransport {
    async fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    async fn set_speaking(&self, speaking: bool) -> Result<(), TransportError> {
        self.speaking.lock().unwrap().push(speaking);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.disconnected.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeStream {
    position: Mutex<Duration>,
    paused: AtomicBool,
}

#[async_trait]
impl StreamSession for FakeStream {
    async fn playback_position(&self) -> Duration {
        *self.position.lock().unwrap()
    }

    fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::SeqCst);
    }

    fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
pub struct FakeStreamer {
    pub attached: AtomicUsize,
    pub streams: Mutex<Vec<Arc<FakeStream>>>,
    senders: Mutex<Vec<oneshot::Sender<StreamEnd>>>,
    /// Position reported by the next attached stream.
    pub next_position: Mutex<Duration>,
    pub fail_next: AtomicBool,
}

impl FakeStreamer {
    /// Ends the most recently attached stream.
    pub fn finish(&self, end: StreamEnd) {
        let sender = self.senders.lock().unwrap().pop();
        if let Some(sender) = sender {
            let _ = sender.send(end);
        }
    }

    pub fn attached(&self) -> usize {
        self.attached.load(Ordering::SeqCst)
    }

    pub fn set_position(&self, position: Duration) {
        *self.next_position.lock().unwrap() = position;
    }

    pub fn latest(&self) -> Option<Arc<FakeStream>> {
        self.streams.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl Streamer for FakeStreamer {
    async fn attach(
        &self,
        _session: &dyn EncodeSession,
        _transport: &dyn VoiceTransport,
    ) -> Result<(Arc<dyn StreamSession>, oneshot::Receiver<StreamEnd>), StreamError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(StreamError::Attach("refused".to_string()));
        }
        let stream = Arc::new(FakeStream {
            position: Mutex::new(*self.next_position.lock().unwrap()),
            paused: AtomicBool::new(false),
        });
        let (sender, receiver) = oneshot::channel();
        self.senders.lock().unwrap().push(sender);
        self.streams.lock().unwrap().push(stream.clone());
        self.attached.fetch_add(1, Ordering::SeqCst);
        Ok((stream, receiver))
    }
}

/// Hands out a fresh link for every refresh.
#[derive(Default)]
pub struct FakeResolver {
    pub refreshed: AtomicUsize,
    /// Queries that resolve to nothing.
    pub unknown: Mutex<Vec<String>>,
}

#[async_trait]
impl SongResolver for FakeResolver {
    async fn resolve(&self, query: &str) -> Result<Vec<Song>, ResolveError> {
        if self.unknown.lock().unwrap().iter().any(|q| q == query) {
            return Err(ResolveError::NotFound(query.to_string()));
        }
        Ok(vec![song(query)])
    }

    async fn refresh(&self, song: &Song) -> Result<Song, ResolveError> {
        self.refreshed.fetch_add(1, Ordering::SeqCst);
        Ok(song.with_download_url(format!("https://media.example/{}?dur=180&fresh=1", song.id)))
    }
}

pub struct Harness {
    pub config: PlayerConfig,
    pub encoder: Arc<FakeEncoder>,
    pub streamer: Arc<FakeStreamer>,
    pub history: Arc<MemoryHistory>,
}

impl Harness {
    pub fn new() -> Harness {
        Harness {
            config: test_config(),
            encoder: Arc::new(FakeEncoder::default()),
            streamer: Arc::new(FakeStreamer::default()),
            history: Arc::new(MemoryHistory::new()),
        }
    }

    pub fn into_player(self) -> Player {
        Player::new(GUILD, self.config, self.encoder, self.streamer, self.history)
    }

    /// A player already attached to a ready transport.
    pub async fn player(&self) -> (Arc<Player>, Arc<FakeTransport>) {
        let player = Player::new(
            GUILD,
            self.config.clone(),
            self.encoder.clone(),
            self.streamer.clone(),
            self.history.clone(),
        );
        let transport = FakeTransport::ready();
        player.set_voice_connection(Some(transport.clone())).await;
        (Arc::new(player), transport)
    }

    pub async fn wait_attached(&self, count: usize) {
        let streamer = self.streamer.clone();
        wait_until(move || {
            let streamer = streamer.clone();
            async move { streamer.attached() >= count }
        })
        .await;
    }
}
