use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to join voice channel: {0}")]
    Join(String),
    #[error("failed to leave voice channel: {0}")]
    Leave(String),
}

#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("failed to spawn encoder: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("encoder has no output pipe")]
    NoOutput,
}

#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("voice transport is not ready")]
    NotReady,
    #[error("encode session has no audio output")]
    NoSource,
    #[error("failed to attach stream: {0}")]
    Attach(String),
}

#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("track {0} has no history entry")]
    UnknownTrack(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("failed to run resolver: {0}")]
    Io(#[from] std::io::Error),
    #[error("resolver exited with an error: {0}")]
    Failed(String),
    #[error("no results for {0}")]
    NotFound(String),
}

#[derive(Debug, thiserror::Error)]
pub enum PlayerError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Encode(#[from] EncodeError),
    #[error(transparent)]
    Stream(#[from] StreamError),
    #[error("voice transport not ready after {0:?}")]
    TransportNotReady(Duration),
    #[error("another song is already being played")]
    Busy,
}
