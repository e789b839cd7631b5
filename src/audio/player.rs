use std::{sync::Arc, time::SystemTime};

use log::{debug, error, info, warn};
use tokio::{
    sync::{Mutex, Notify},
    task::JoinHandle,
    time::{interval, sleep, Instant},
};

use super::{
    config::PlayerConfig,
    error::PlayerError,
    metrics::{link_expired, PlaybackMetrics},
    song::Song,
    song_queue::SongQueue,
    traits::{
        EncodeSession, Encoder, HistoryRecorder, SongResolver, StreamSession, Streamer,
        VoiceTransport,
    },
    types::{Interrupt, PlaybackStatus, StreamEnd},
};

struct PlaybackState {
    status: PlaybackStatus,
    current_song: Option<Song>,
    queue: SongQueue,
    transport: Option<Arc<dyn VoiceTransport>>,
    encode_session: Option<Arc<dyn EncodeSession>>,
    stream_session: Option<Arc<dyn StreamSession>>,
    // single slot, consumed by the playback loop
    interrupt: Option<Interrupt>,
    loop_active: bool,
    // a loaded song is waiting on its stream and can be skipped
    session_live: bool,
}

impl PlaybackState {
    fn new() -> Self {
        PlaybackState {
            status: PlaybackStatus::Resting,
            current_song: None,
            queue: SongQueue::new(),
            transport: None,
            encode_session: None,
            stream_session: None,
            interrupt: None,
            loop_active: false,
            session_live: false,
        }
    }

    /// Unloads the current song. Queue and transport are left alone.
    fn rest(&mut self) -> Option<Arc<dyn EncodeSession>> {
        self.status = PlaybackStatus::Resting;
        self.current_song = None;
        self.stream_session = None;
        self.session_live = false;
        self.encode_session.take()
    }

    /// Clears the queue, unloads the current song and detaches the
    /// transport. A running loop is told to stop.
    fn halt(&mut self) -> (Option<Arc<dyn VoiceTransport>>, Option<Arc<dyn EncodeSession>>) {
        self.queue.clear();
        if self.loop_active {
            self.interrupt = Some(Interrupt::Stop);
        }
        let session = self.rest();
        (self.transport.take(), session)
    }

    fn release_loop(&mut self) {
        self.loop_active = false;
        self.interrupt = None;
    }
}

enum SessionEnd {
    Resume { offset: f64, song: Song },
    Advance,
    /// Nothing left to play, or stopped.
    Idle,
    /// Fatal stream error; the queue is kept for the caller.
    Halt,
}

struct StatsTicker(JoinHandle<()>);

impl Drop for StatsTicker {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Plays the songs of one guild into its voice channel.
///
/// [`Player::play`] runs the playback loop on the calling task and only
/// returns once the queue is exhausted, playback is stopped, or a song fails
/// fatally. Every other operation returns promptly and can be called while
/// the loop is running.
pub struct Player {
    guild_id: u64,
    config: PlayerConfig,
    state: Mutex<PlaybackState>,
    wake: Notify,
    encoder: Arc<dyn Encoder>,
    streamer: Arc<dyn Streamer>,
    history: Arc<dyn HistoryRecorder>,
    resolver: Option<Arc<dyn SongResolver>>,
}

impl Player {
    pub fn new(
        guild_id: u64,
        config: PlayerConfig,
        encoder: Arc<dyn Encoder>,
        streamer: Arc<dyn Streamer>,
        history: Arc<dyn HistoryRecorder>,
    ) -> Player {
        Player {
            guild_id,
            config,
            state: Mutex::new(PlaybackState::new()),
            wake: Notify::new(),
            encoder,
            streamer,
            history,
            resolver: None,
        }
    }

    /// Lets the player refresh expired links before resuming a song.
    pub fn with_resolver(mut self, resolver: Arc<dyn SongResolver>) -> Player {
        self.resolver = Some(resolver);
        self
    }

    pub fn guild_id(&self) -> u64 {
        self.guild_id
    }

    /// Plays `song` from `offset` seconds, or the head of the queue when no
    /// song is given, and keeps going through the queue.
    ///
    /// If a playback loop is already running, a call without a song returns
    /// immediately since that loop will reach the queue anyway; a call with a
    /// song fails with [`PlayerError::Busy`].
    pub async fn play(&self, offset: f64, song: Option<Song>) -> Result<(), PlayerError> {
        {
            let mut state = self.state.lock().await;
            if state.loop_active {
                return match song {
                    None => {
                        debug!("playback loop already running");
                        Ok(())
                    }
                    Some(_) => Err(PlayerError::Busy),
                };
            }
            state.loop_active = true;
            state.interrupt = None;
        }
        self.run_loop(offset, song).await
    }

    async fn run_loop(&self, offset: f64, song: Option<Song>) -> Result<(), PlayerError> {
        let mut offset = offset;
        let mut song = song;
        loop {
            let end = match self.play_session(offset, song.take()).await {
                Ok(end) => end,
                Err(why) => {
                    self.state.lock().await.release_loop();
                    return Err(why);
                }
            };
            match end {
                SessionEnd::Resume {
                    offset: resume_at,
                    song: resumed,
                } => {
                    offset = resume_at;
                    song = Some(resumed);
                }
                SessionEnd::Advance => {
                    offset = 0.0;
                }
                SessionEnd::Halt => {
                    self.state.lock().await.release_loop();
                    return Ok(());
                }
                SessionEnd::Idle => {
                    let mut state = self.state.lock().await;
                    // songs queued while the loop was winding down
                    if state.queue.is_empty() || state.transport.is_none() {
                        state.release_loop();
                        return Ok(());
                    }
                    info!("new songs were queued, continuing playback");
                    state.interrupt = None;
                    offset = 0.0;
                }
            }
        }
    }

    async fn play_session(
        &self,
        offset: f64,
        song: Option<Song>,
    ) -> Result<SessionEnd, PlayerError> {
        let song = match song {
            Some(song) => song,
            None => {
                let mut state = self.state.lock().await;
                match state.queue.dequeue() {
                    Some(song) => song,
                    None => {
                        info!("no songs in queue");
                        if let Some(session) = state.rest() {
                            session.cleanup();
                        }
                        return Ok(SessionEnd::Idle);
                    }
                }
            }
        };
        info!("playing song: {} at {:.2}s", song.title, offset);

        let options = self.config.encode_options(offset);
        let session = match self.encoder.encode(&song.download_url, &options).await {
            Ok(session) => session,
            Err(why) => {
                error!("error encoding song {}: {}", song.title, why);
                self.rest().await;
                return Err(why.into());
            }
        };

        {
            let mut state = self.state.lock().await;
            if state.interrupt == Some(Interrupt::Stop) {
                drop(state);
                session.cleanup();
                return Ok(SessionEnd::Idle);
            }
            if let Some(previous) = state.encode_session.replace(session.clone()) {
                previous.cleanup();
            }
            state.current_song = Some(song.clone());
            state.stream_session = None;
            state.status = PlaybackStatus::Playing;
            state.session_live = true;
        }

        let transport = match self.await_transport().await {
            Ok(Some(transport)) => transport,
            Ok(None) => {
                let interrupt = self.end_session().await;
                session.cleanup();
                return Ok(match interrupt {
                    Some(Interrupt::Skip) => SessionEnd::Advance,
                    _ => SessionEnd::Idle,
                });
            }
            Err(why) => {
                error!("voice connection never became ready: {}", why);
                session.cleanup();
                self.rest().await;
                return Err(why);
            }
        };

        if let Err(why) = transport.set_speaking(true).await {
            error!("error connecting to voice: {}", why);
            self.release_voice(transport.as_ref()).await;
            session.cleanup();
            self.rest().await;
            return Err(why.into());
        }

        let (stream, mut completion) = match self
            .streamer
            .attach(session.as_ref(), transport.as_ref())
            .await
        {
            Ok(attached) => attached,
            Err(why) => {
                error!("error attaching stream: {}", why);
                self.release_voice(transport.as_ref()).await;
                session.cleanup();
                self.rest().await;
                return Err(why.into());
            }
        };
        self.state.lock().await.stream_session = Some(stream.clone());
        info!("stream is created, waiting for finish or error");

        if let Err(why) = self.history.record_start(self.guild_id, &song).await {
            warn!("error adding track to history: {}", why);
        }
        let ticker = self.spawn_stats_ticker(&song, stream.clone());

        let finished = loop {
            let pending = self.state.lock().await.interrupt.is_some();
            if pending {
                break None;
            }
            tokio::select! {
                end = &mut completion => {
                    break Some(end.unwrap_or_else(|_| {
                        StreamEnd::Failed("completion signal dropped".to_string())
                    }));
                }
                _ = self.wake.notified() => {}
            }
        };
        drop(ticker);

        let status = self.state.lock().await.status;
        let end = match (self.end_session().await, finished) {
            (Some(Interrupt::Stop), _) => {
                info!("song is interrupted by stop");
                session.cleanup();
                return Ok(SessionEnd::Idle);
            }
            (Some(Interrupt::Skip), _) => {
                info!("song is interrupted for skip, stopping playback");
                self.release_voice(transport.as_ref()).await;
                session.cleanup();
                return Ok(SessionEnd::Advance);
            }
            (None, Some(end)) => end,
            (None, None) => StreamEnd::Failed("stream wait ended without a result".to_string()),
        };

        if song.is_live() {
            warn!("song is done but it's a stream so it's never finished, restarting");
            session.cleanup();
            self.release_voice(transport.as_ref()).await;
            sleep(self.config.settle_delay()).await;
            let song = self.refreshed(song).await;
            return Ok(SessionEnd::Resume { offset: 0.0, song });
        }

        let metrics = PlaybackMetrics::measure(session.as_ref(), stream.as_ref(), &song).await;
        if metrics.is_premature(status) {
            warn!(
                "song is done but still unfinished, restarting from {:.2}s",
                metrics.position
            );
            session.cleanup();
            self.release_voice(transport.as_ref()).await;
            let song = self.refreshed(song).await;
            return Ok(SessionEnd::Resume {
                offset: metrics.position,
                song,
            });
        }

        self.record_play_count(&song).await;

        if !end.is_clean() {
            warn!("song is done but an unexpected error occurred: {}", end);
            sleep(self.config.settle_delay()).await;
            self.release_voice(transport.as_ref()).await;
            session.cleanup();
            self.rest().await;
            return Ok(SessionEnd::Halt);
        }

        info!("song is done");
        sleep(self.config.settle_delay()).await;
        let finished = {
            let mut state = self.state.lock().await;
            // checked and torn down under one lock
            if state.queue.is_empty() {
                Some(state.halt())
            } else {
                None
            }
        };
        if let Some((transport, stopped)) = finished {
            info!("queue is done");
            self.release(transport, stopped).await;
            return Ok(SessionEnd::Idle);
        }
        session.cleanup();
        info!("playing next song in queue");
        Ok(SessionEnd::Advance)
    }

    /// Polls until the attached transport is ready. `Ok(None)` means an
    /// interrupt arrived first.
    async fn await_transport(&self) -> Result<Option<Arc<dyn VoiceTransport>>, PlayerError> {
        let started = Instant::now();
        loop {
            let transport = {
                let state = self.state.lock().await;
                if state.interrupt.is_some() {
                    return Ok(None);
                }
                state.transport.clone()
            };
            if let Some(transport) = transport {
                if transport.is_ready().await {
                    return Ok(Some(transport));
                }
            }
            if let Some(limit) = self.config.ready_timeout() {
                if started.elapsed() >= limit {
                    return Err(PlayerError::TransportNotReady(limit));
                }
            }
            sleep(self.config.ready_poll_interval()).await;
        }
    }

    async fn end_session(&self) -> Option<Interrupt> {
        let mut state = self.state.lock().await;
        state.session_live = false;
        state.interrupt.take()
    }

    async fn rest(&self) {
        let session = self.state.lock().await.rest();
        if let Some(session) = session {
            session.cleanup();
        }
    }

    async fn release_voice(&self, transport: &dyn VoiceTransport) {
        if let Err(why) = transport.set_speaking(false).await {
            warn!("error releasing voice: {}", why);
        }
    }

    async fn record_play_count(&self, song: &Song) {
        if let Err(why) = self.history.record_play_count(self.guild_id, &song.id).await {
            warn!("error adding playback count stats to history: {}", why);
        }
    }

    async fn refreshed(&self, song: Song) -> Song {
        let resolver = match &self.resolver {
            Some(resolver) if link_expired(&song.download_url, SystemTime::now()) => resolver,
            _ => return song,
        };
        info!("download link of {} expired, resolving it again", song.title);
        match resolver.refresh(&song).await {
            Ok(fresh) => fresh,
            Err(why) => {
                warn!("failed to refresh {}: {}", song.title, why);
                song
            }
        }
    }

    fn spawn_stats_ticker(&self, song: &Song, stream: Arc<dyn StreamSession>) -> StatsTicker {
        let history = self.history.clone();
        let guild_id = self.guild_id;
        let track_id = song.id.clone();
        let period = self.config.stats_interval();
        StatsTicker(tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if stream.is_paused() {
                    continue;
                }
                if let Err(why) = history
                    .record_duration(guild_id, &track_id, period.as_secs_f64())
                    .await
                {
                    warn!("error adding playback duration stats to history: {}", why);
                }
            }
        }))
    }

    pub async fn skip(&self) -> Result<(), PlayerError> {
        info!("skipping to next song");
        let mut state = self.state.lock().await;
        if state.interrupt.is_some() {
            debug!("an interrupt is already pending");
            return Ok(());
        }
        let status = state.status;
        match (status, state.current_song.clone()) {
            (PlaybackStatus::Playing | PlaybackStatus::Paused, Some(song)) => {
                if !state.session_live {
                    debug!("between songs, nothing to skip");
                    return Ok(());
                }
                // a song still waiting on its transport never started
                let started = state.stream_session.is_some();
                state.interrupt = Some(Interrupt::Skip);
                drop(state);
                self.wake.notify_one();
                if started {
                    self.record_play_count(&song).await;
                }
                Ok(())
            }
            _ if !state.queue.is_empty() => {
                drop(state);
                self.play(0.0, None).await
            }
            _ => {
                debug!("nothing to skip");
                Ok(())
            }
        }
    }

    pub async fn pause(&self) {
        info!("pausing audio playback");
        let mut state = self.state.lock().await;
        if state.status != PlaybackStatus::Playing {
            return;
        }
        if let Some(stream) = state.stream_session.clone() {
            stream.set_paused(true);
            state.status = PlaybackStatus::Paused;
        }
    }

    /// Resumes a paused stream, or starts the queue when resting.
    pub async fn unpause(&self) -> Result<(), PlayerError> {
        info!("resuming playback");
        let mut state = self.state.lock().await;
        let status = state.status;
        match status {
            PlaybackStatus::Paused => {
                if let Some(stream) = state.stream_session.clone() {
                    stream.set_paused(false);
                    state.status = PlaybackStatus::Playing;
                }
                Ok(())
            }
            PlaybackStatus::Resting if !state.queue.is_empty() => {
                drop(state);
                self.play(0.0, None).await
            }
            _ => Ok(()),
        }
    }

    /// Clears the queue, leaves the voice channel and unloads the current
    /// song. Always ends in [`PlaybackStatus::Resting`].
    pub async fn stop(&self) {
        info!("stopping audio playback and disconnecting from voice channel");
        let (transport, session) = self.state.lock().await.halt();
        self.wake.notify_one();
        self.release(transport, session).await;
    }

    async fn release(
        &self,
        transport: Option<Arc<dyn VoiceTransport>>,
        session: Option<Arc<dyn EncodeSession>>,
    ) {
        if let Some(transport) = transport {
            self.release_voice(transport.as_ref()).await;
            if let Err(why) = transport.disconnect().await {
                error!("error disconnecting voice connection: {}", why);
            }
        }
        if let Some(session) = session {
            session.cleanup();
        }
    }

    pub async fn enqueue(&self, song: Song) {
        info!("enqueuing song to queue: {}", song.title);
        self.state.lock().await.queue.enqueue(song);
    }

    pub async fn dequeue(&self) -> Option<Song> {
        self.state.lock().await.queue.dequeue()
    }

    pub async fn clear_queue(&self) {
        info!("clearing song queue");
        self.state.lock().await.queue.clear();
    }

    pub async fn song_queue(&self) -> Vec<Song> {
        self.state.lock().await.queue.snapshot()
    }

    pub async fn current_status(&self) -> PlaybackStatus {
        self.state.lock().await.status
    }

    /// Overrides the status as seen by callers. The playback loop still
    /// decides what happens to the current song.
    ///
    /// `Resting` is only accepted with no song loaded and every other status
    /// only with one; a rejected change is logged and returns `false`.
    pub async fn set_current_status(&self, status: PlaybackStatus) -> bool {
        let mut state = self.state.lock().await;
        let loaded = state.current_song.is_some();
        if (status == PlaybackStatus::Resting) == loaded {
            warn!(
                "refusing to set status {} while a song is {}",
                status,
                if loaded { "loaded" } else { "not loaded" }
            );
            return false;
        }
        state.status = status;
        true
    }

    pub async fn current_song(&self) -> Option<Song> {
        self.state.lock().await.current_song.clone()
    }

    pub async fn voice_connection(&self) -> Option<Arc<dyn VoiceTransport>> {
        self.state.lock().await.transport.clone()
    }

    pub async fn set_voice_connection(&self, transport: Option<Arc<dyn VoiceTransport>>) {
        self.state.lock().await.transport = transport;
    }

    pub async fn get_string(&self) -> String {
        let state = self.state.lock().await;
        let current_song = match &state.current_song {
            Some(song) => format!("{} {} {}", state.status.emoji(), song.get_string(), state.status),
            None => "*Not playing*".to_string(),
        };
        format!(
            "**Current Song:**\n{}\n\n**Queue:**\n{}",
            current_song,
            state.queue.get_string()
        )
    }
}
