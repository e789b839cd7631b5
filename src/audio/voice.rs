use async_trait::async_trait;
use poise::serenity_prelude::{ChannelId, GuildId};
use songbird::{
    driver::Bitrate,
    input::RawAdapter,
    tracks::{PlayMode, TrackHandle},
    Call, Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    time::{Duration, SystemTime},
};
use tokio::sync::{oneshot, Mutex as SerenityMutex};

use super::{
    config::audio as audio_config,
    error::{StreamError, TransportError},
    traits::{EncodeSession, StreamSession, Streamer, VoiceConnector, VoiceTransport},
    types::StreamEnd,
};

pub struct SongbirdTransport {
    handler: Arc<SerenityMutex<Call>>,
}

impl SongbirdTransport {
    pub fn new(handler: Arc<SerenityMutex<Call>>) -> SongbirdTransport {
        SongbirdTransport { handler }
    }
}

#[async_trait]
impl VoiceTransport for SongbirdTransport {
    async fn is_ready(&self) -> bool {
        self.handler.lock().await.current_connection().is_some()
    }

    async fn set_speaking(&self, speaking: bool) -> Result<(), TransportError> {
        // the driver starts sending as soon as a track is queued
        if !speaking {
            self.handler.lock().await.stop();
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        let mut handler = self.handler.lock().await;
        handler
            .leave()
            .await
            .map_err(|why| TransportError::Leave(why.to_string()))
    }
}

pub struct SongbirdConnector {
    manager: Arc<Songbird>,
}

impl SongbirdConnector {
    pub fn new(manager: Arc<Songbird>) -> SongbirdConnector {
        SongbirdConnector { manager }
    }
}

#[async_trait]
impl VoiceConnector for SongbirdConnector {
    async fn connect(
        &self,
        guild_id: u64,
        channel_id: u64,
    ) -> Result<Arc<dyn VoiceTransport>, TransportError> {
        let handler = self
            .manager
            .join(GuildId::new(guild_id), ChannelId::new(channel_id))
            .await
            .map_err(|why| TransportError::Join(why.to_string()))?;
        Ok(Arc::new(SongbirdTransport::new(handler)))
    }
}

/// Plays encoder output through a guild's songbird call.
pub struct SongbirdStreamer {
    handler: Arc<SerenityMutex<Call>>,
    bitrate: u32,
}

impl SongbirdStreamer {
    pub fn new(handler: Arc<SerenityMutex<Call>>, bitrate: u32) -> SongbirdStreamer {
        SongbirdStreamer { handler, bitrate }
    }
}

#[async_trait]
impl Streamer for SongbirdStreamer {
    async fn attach(
        &self,
        session: &dyn EncodeSession,
        transport: &dyn VoiceTransport,
    ) -> Result<(Arc<dyn StreamSession>, oneshot::Receiver<StreamEnd>), StreamError> {
        if !transport.is_ready().await {
            return Err(StreamError::NotReady);
        }
        let source = session.take_output().ok_or(StreamError::NoSource)?;
        let input = RawAdapter::new(source, audio_config::SAMPLE_RATE, audio_config::CHANNELS);

        let mut handler = self.handler.lock().await;
        handler.set_bitrate(Bitrate::BitsPerSecond(self.bitrate as i32 * 1000));
        let handle = handler.play_input(input.into());

        let (sender, receiver) = oneshot::channel();
        let notifier = StreamEndNotifier {
            sender: Arc::new(Mutex::new(Some(sender))),
        };
        for event in [TrackEvent::End, TrackEvent::Error] {
            if let Err(why) = handle.add_event(Event::Track(event), notifier.clone()) {
                handle.stop().ok();
                return Err(StreamError::Attach(format!("{:?}", why)));
            }
        }
        Ok((Arc::new(SongbirdStream::new(handle)), receiver))
    }
}

pub struct SongbirdStream {
    handle: TrackHandle,
    paused: AtomicBool,
}

impl SongbirdStream {
    pub fn new(handle: TrackHandle) -> SongbirdStream {
        SongbirdStream {
            handle,
            paused: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl StreamSession for SongbirdStream {
    async fn playback_position(&self) -> Duration {
        match self.handle.get_info().await {
            Ok(info) => info.position,
            Err(why) => {
                log::warn!("failed to read track position: {:?}", why);
                Duration::ZERO
            }
        }
    }

    fn set_paused(&self, paused: bool) {
        let res = if paused {
            self.handle.pause()
        } else {
            self.handle.play()
        };
        match res {
            Ok(()) => self.paused.store(paused, Ordering::Relaxed),
            Err(why) => log::error!("failed to change track pause state: {:?}", why),
        }
    }

    fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Relaxed)
    }
}

/// An error on any track wins; a track that ran out of input is an end of
/// stream, anything else (stopped, dropped) counts as finished.
fn stream_end<'a>(modes: impl IntoIterator<Item = &'a PlayMode>) -> StreamEnd {
    let mut end = StreamEnd::Finished;
    for mode in modes {
        match mode {
            PlayMode::Errored(why) => return StreamEnd::Failed(format!("{:?}", why)),
            PlayMode::End => end = StreamEnd::EndOfStream,
            _ => {}
        }
    }
    end
}

/// Reports the first end or error event of a track.
#[derive(Clone)]
struct StreamEndNotifier {
    sender: Arc<Mutex<Option<oneshot::Sender<StreamEnd>>>>,
}

#[async_trait]
impl VoiceEventHandler for StreamEndNotifier {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        log::info!("track ended, {:?}", SystemTime::now());
        let end = match ctx {
            EventContext::Track(tracks) => {
                stream_end(tracks.iter().map(|(state, _)| &state.playing))
            }
            _ => StreamEnd::Finished,
        };
        let sender = match self.sender.lock() {
            Ok(mut sender) => sender.take(),
            Err(_) => None,
        };
        if let Some(sender) = sender {
            // receiver is gone once the session was interrupted
            let _ = sender.send(end);
        }
        None
    }
}
