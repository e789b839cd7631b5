pub mod commands;
pub mod config;
pub mod error;
pub mod history;
pub mod metrics;
pub mod player;
pub mod registry;
pub mod request;
pub mod song;
pub mod song_queue;
pub mod subprocess;
pub mod traits;
pub mod types;
pub mod voice;
pub mod ytdl;

#[cfg(test)]
mod fakes;

pub use commands::*;
