use async_trait::async_trait;
use std::{
    io::{BufReader, Read, Seek},
    process::{Child, ChildStdout, Command, Stdio},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};
use symphonia::core::io::MediaSource;

use super::{
    config::audio as audio_config,
    error::EncodeError,
    traits::{EncodeSession, Encoder, PcmSource},
    types::{EncodeOptions, EncodeStats},
};

const BYTES_PER_SAMPLE: u64 = 4;

fn bytes_per_second() -> u64 {
    audio_config::SAMPLE_RATE as u64 * audio_config::CHANNELS as u64 * BYTES_PER_SAMPLE
}

/// Arguments for an ffmpeg process that turns `url` into raw f32le stereo
/// PCM on stdout.
pub fn ffmpeg_args(url: &str, options: &EncodeOptions) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "-reconnect".into(),
        "1".into(),
        "-reconnect_streamed".into(),
        "1".into(),
        "-reconnect_delay_max".into(),
        options.reconnect_delay_max.to_string(),
    ];
    if let Some(user_agent) = &options.user_agent {
        args.push("-user_agent".into());
        args.push(user_agent.clone());
    }
    if options.start_offset > 0.0 {
        args.push("-ss".into());
        args.push(format!("{:.3}", options.start_offset));
    }
    args.extend([
        "-i".into(),
        url.to_string(),
        "-vn".into(),
        "-af".into(),
        format!("volume={}", options.volume),
        "-f".into(),
        "f32le".into(),
        "-ar".into(),
        audio_config::SAMPLE_RATE.to_string(),
        "-ac".into(),
        audio_config::CHANNELS.to_string(),
        "pipe:1".into(),
    ]);
    args
}

/// Reads ffmpeg's stdout and counts every byte handed on, so the session can
/// tell how much audio has been produced.
pub struct MeteredPcmReader<T: Read + Send> {
    inner: BufReader<T>,
    bytes: Arc<AtomicU64>,
}

impl<T: Read + Send> MeteredPcmReader<T> {
    pub fn new(inner: T, bytes: Arc<AtomicU64>) -> MeteredPcmReader<T> {
        MeteredPcmReader {
            inner: BufReader::with_capacity(16384 * 32, inner),
            bytes,
        }
    }
}

impl<T: Read + Send> Read for MeteredPcmReader<T> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let read = self.inner.read(buf)?;
        self.bytes.fetch_add(read as u64, Ordering::Relaxed);
        Ok(read)
    }
}

impl<T: Read + Send> Seek for MeteredPcmReader<T> {
    fn seek(&mut self, _: std::io::SeekFrom) -> std::io::Result<u64> {
        Err(std::io::Error::new(
            std::io::ErrorKind::Other,
            "seek not supported",
        ))
    }
}

impl<T: Read + Send + Sync> MediaSource for MeteredPcmReader<T> {
    fn is_seekable(&self) -> bool {
        false
    }

    fn byte_len(&self) -> Option<u64> {
        None
    }
}

pub struct FfmpegSession {
    start_offset: f64,
    bytes: Arc<AtomicU64>,
    output: Mutex<Option<MeteredPcmReader<ChildStdout>>>,
    child: Mutex<Option<Child>>,
}

impl EncodeSession for FfmpegSession {
    fn stats(&self) -> EncodeStats {
        let bytes = self.bytes.load(Ordering::Relaxed);
        EncodeStats {
            elapsed: Duration::from_secs_f64(bytes as f64 / bytes_per_second() as f64),
        }
    }

    fn start_offset(&self) -> f64 {
        self.start_offset
    }

    fn take_output(&self) -> Option<PcmSource> {
        let mut output = self.output.lock().ok()?;
        output.take().map(PcmSource::new)
    }

    fn cleanup(&self) {
        let child = match self.child.lock() {
            Ok(mut child) => child.take(),
            Err(_) => None,
        };
        if let Some(mut child) = child {
            if let Err(why) = child.kill() {
                log::debug!("ffmpeg already exited: {}", why);
            }
            reap(child);
        }
    }
}

/// Waits for a killed child off the async workers when a runtime is
/// available, inline otherwise.
fn reap(mut child: Child) {
    let mut wait = move || {
        if let Err(why) = child.wait() {
            log::warn!("failed to reap ffmpeg: {}", why);
        }
    };
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn_blocking(wait);
        }
        Err(_) => wait(),
    }
}

impl Drop for FfmpegSession {
    fn drop(&mut self) {
        self.cleanup();
    }
}

/// Spawns one ffmpeg process per song.
pub struct FfmpegEncoder;

#[async_trait]
impl Encoder for FfmpegEncoder {
    async fn encode(
        &self,
        url: &str,
        options: &EncodeOptions,
    ) -> Result<Arc<dyn EncodeSession>, EncodeError> {
        let mut cmd = Command::new(&options.ffmpeg_path);
        let cmd = cmd
            .args(ffmpeg_args(url, options))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());
        let mut child = cmd.spawn()?;
        let stdout = match child.stdout.take() {
            Some(stdout) => stdout,
            None => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(EncodeError::NoOutput);
            }
        };
        log::info!("encoding started at {:.2}s", options.start_offset);
        let bytes = Arc::new(AtomicU64::new(0));
        Ok(Arc::new(FfmpegSession {
            start_offset: options.start_offset,
            bytes: bytes.clone(),
            output: Mutex::new(Some(MeteredPcmReader::new(stdout, bytes))),
            child: Mutex::new(Some(child)),
        }))
    }
}
