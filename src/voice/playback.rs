//! Audio playback to speakers
//!
//! Clips are decoded up front (WAV via hound, MP3 via minimp3) so their
//! duration is known before playback starts, then played on a dedicated
//! thread. Completion is reported asynchronously on a channel so the
//! cooperative loop can keep animating while audio plays.

use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};
use tokio::sync::mpsc;

use crate::{Error, Result};

/// Playback completion notice, tagged with the session that started it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackDone {
    /// Identifier the caller attached when starting playback
    pub session_id: u64,
}

/// A decoded, mono audio clip ready for playback
#[derive(Debug, Clone)]
pub struct LoadedClip {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl LoadedClip {
    /// Decode a clip from disk
    ///
    /// `.mp3` files go through minimp3; everything else is treated as WAV.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or decoded.
    pub fn load(path: &Path) -> Result<Self> {
        let is_mp3 = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("mp3"));

        if is_mp3 {
            decode_mp3(&std::fs::read(path)?)
        } else {
            decode_wav(path)
        }
    }

    /// Build a clip from raw samples (used by diagnostics and tests)
    #[must_use]
    pub const fn from_samples(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Clip length in seconds
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn duration(&self) -> f32 {
        self.samples.len() as f32 / self.sample_rate.max(1) as f32
    }

    /// Decoded mono samples
    #[must_use]
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Sample rate of the decoded audio
    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

/// Remote control for a playing clip
#[derive(Debug)]
pub struct SoundHandle {
    stop_flag: Arc<AtomicBool>,
}

impl SoundHandle {
    /// Ask the playback thread to stop early
    ///
    /// The completion notice still arrives; teardown bookkeeping decides
    /// whether anyone is left to care.
    pub fn stop(&self) {
        self.stop_flag.store(true, Ordering::Release);
    }
}

/// Plays clips to the default output device
pub struct AudioSink {
    done_tx: mpsc::Sender<PlaybackDone>,
}

impl AudioSink {
    /// Create a sink reporting completions on `done_tx`
    ///
    /// # Errors
    ///
    /// Returns an error if no output device is available.
    pub fn new(done_tx: mpsc::Sender<PlaybackDone>) -> Result<Self> {
        cpal::default_host()
            .default_output_device()
            .ok_or_else(|| Error::Audio("no output device available".to_string()))?;

        Ok(Self { done_tx })
    }

    /// Start playing `clip`, returning immediately
    ///
    /// A [`PlaybackDone`] tagged with `session_id` is sent when the clip
    /// finishes, is stopped, or fails mid-flight, so the caller always
    /// hears back exactly once per started clip.
    pub fn play(&self, clip: LoadedClip, session_id: u64) -> SoundHandle {
        let stop_flag = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop_flag);
        let done_tx = self.done_tx.clone();

        std::thread::spawn(move || {
            if let Err(e) = play_blocking(&clip, &thread_stop) {
                tracing::error!(error = %e, "playback failed");
            }
            // Exactly one completion per started clip
            if done_tx.blocking_send(PlaybackDone { session_id }).is_err() {
                tracing::trace!("playback done receiver gone");
            }
        });

        SoundHandle { stop_flag }
    }
}

/// Play a clip on the current thread until it ends or `stop_flag` is set
fn play_blocking(clip: &LoadedClip, stop_flag: &AtomicBool) -> Result<()> {
    if clip.samples.is_empty() {
        return Ok(());
    }

    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| Error::Audio("no output device".to_string()))?;

    let rate = clip.sample_rate;
    let supported_config = device
        .supported_output_configs()
        .map_err(|e| Error::Audio(e.to_string()))?
        .find(|c| {
            c.channels() == 1
                && c.min_sample_rate() <= SampleRate(rate)
                && c.max_sample_rate() >= SampleRate(rate)
        })
        .or_else(|| {
            // Fallback: duplicate mono samples into a stereo config
            device.supported_output_configs().ok()?.find(|c| {
                c.channels() == 2
                    && c.min_sample_rate() <= SampleRate(rate)
                    && c.max_sample_rate() >= SampleRate(rate)
            })
        })
        .ok_or_else(|| Error::Audio("no suitable output config found".to_string()))?;

    let config: StreamConfig = supported_config.with_sample_rate(SampleRate(rate)).config();
    let channels = usize::from(config.channels);

    let samples = Arc::new(clip.samples.clone());
    let position = Arc::new(AtomicUsize::new(0));
    let finished = Arc::new(AtomicBool::new(false));

    let cb_samples = Arc::clone(&samples);
    let cb_position = Arc::clone(&position);
    let cb_finished = Arc::clone(&finished);

    let stream = device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let mut pos = cb_position.load(Ordering::Relaxed);
                for frame in data.chunks_mut(channels) {
                    let sample = if pos < cb_samples.len() {
                        let s = cb_samples[pos];
                        pos += 1;
                        s
                    } else {
                        cb_finished.store(true, Ordering::Release);
                        0.0
                    };
                    for out in frame.iter_mut() {
                        *out = sample;
                    }
                }
                cb_position.store(pos, Ordering::Relaxed);
            },
            |err| {
                tracing::error!(error = %err, "audio output error");
            },
            None,
        )
        .map_err(|e| Error::Audio(e.to_string()))?;

    stream.play().map_err(|e| Error::Audio(e.to_string()))?;

    // Wait for the clip to drain, bounded by its length plus headroom
    let deadline = std::time::Instant::now()
        + Duration::from_secs_f32(clip.duration().max(0.0))
        + Duration::from_millis(500);

    while !finished.load(Ordering::Acquire) && !stop_flag.load(Ordering::Acquire) {
        if std::time::Instant::now() > deadline {
            tracing::warn!("playback deadline passed before drain");
            break;
        }
        std::thread::sleep(Duration::from_millis(50));
    }

    // Let the device flush its last buffer
    if !stop_flag.load(Ordering::Acquire) {
        std::thread::sleep(Duration::from_millis(100));
    }

    drop(stream);
    tracing::debug!(samples = samples.len(), "playback complete");
    Ok(())
}

/// Decode a WAV file into mono f32 samples
fn decode_wav(path: &Path) -> Result<LoadedClip> {
    let mut reader =
        hound::WavReader::open(path).map_err(|e| Error::Audio(e.to_string()))?;
    let spec = reader.spec();
    let channels = usize::from(spec.channels.max(1));

    let raw: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| Error::Audio(e.to_string()))?,
        hound::SampleFormat::Int => {
            #[allow(clippy::cast_precision_loss)]
            let scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| {
                    #[allow(clippy::cast_precision_loss)]
                    let v = v as f32;
                    v / scale
                }))
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| Error::Audio(e.to_string()))?
        }
    };

    Ok(LoadedClip {
        samples: downmix(&raw, channels),
        sample_rate: spec.sample_rate,
    })
}

/// Decode MP3 bytes into mono f32 samples
fn decode_mp3(mp3_data: &[u8]) -> Result<LoadedClip> {
    let mut decoder = minimp3::Decoder::new(Cursor::new(mp3_data));
    let mut samples = Vec::new();
    let mut sample_rate = 0u32;

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                if sample_rate == 0 && frame.sample_rate > 0 {
                    #[allow(clippy::cast_sign_loss)]
                    {
                        sample_rate = frame.sample_rate as u32;
                    }
                }
                let channels = frame.channels.max(1);
                let scaled: Vec<f32> = frame
                    .data
                    .iter()
                    .map(|&s| f32::from(s) / 32768.0)
                    .collect();
                samples.extend(downmix(&scaled, channels));
            }
            Err(minimp3::Error::Eof) => break,
            Err(e) => return Err(Error::Audio(format!("MP3 decode error: {e}"))),
        }
    }

    if sample_rate == 0 {
        return Err(Error::Audio("MP3 contained no frames".to_string()));
    }

    Ok(LoadedClip {
        samples,
        sample_rate,
    })
}

/// Average interleaved channels down to mono
fn downmix(samples: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    samples
        .chunks(channels)
        .map(|frame| {
            #[allow(clippy::cast_precision_loss)]
            let len = frame.len() as f32;
            frame.iter().sum::<f32>() / len
        })
        .collect()
}
