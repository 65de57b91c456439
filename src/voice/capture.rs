//! Microphone capture
//!
//! Two capture styles sit on top of cpal: [`CpalCapture`] hands out
//! fixed-length frames through a blocking [`CaptureDevice`] read for the
//! wake word thread, and [`AudioCapture`] accumulates a buffer the
//! cooperative loop polls while recording a command utterance.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleRate, Stream, StreamConfig};

use crate::{Error, Result};

/// Sample rate for all capture paths (16kHz for speech)
pub const SAMPLE_RATE: u32 = 16000;

/// How long a blocking frame read waits before reporting a dead device
const READ_TIMEOUT: Duration = Duration::from_secs(2);

/// A microphone the wake word thread can read fixed frames from
///
/// `read` blocks until one frame of samples is available. Implementations
/// must release the underlying device on `stop` (and on drop). The device
/// is created and destroyed on the listener thread, so implementations
/// need not be `Send` (cpal streams are not).
pub trait CaptureDevice {
    /// Open the device and begin capturing
    ///
    /// # Errors
    ///
    /// Returns an error if the device cannot be opened.
    fn start(&mut self) -> Result<()>;

    /// Read one frame, blocking until it is available
    ///
    /// # Errors
    ///
    /// Returns an error if the device stops delivering audio.
    fn read(&mut self) -> Result<Vec<i16>>;

    /// Stop capturing and release the device
    fn stop(&mut self);
}

/// Open an input device by index, falling back to the system default
fn open_input(device_index: i32) -> Result<(Device, StreamConfig)> {
    let host = cpal::default_host();

    let device = if device_index > 0 {
        #[allow(clippy::cast_sign_loss)]
        host.input_devices()
            .map_err(|e| Error::Capture(e.to_string()))?
            .nth(device_index as usize)
    } else {
        None
    }
    .or_else(|| host.default_input_device())
    .ok_or_else(|| Error::Capture("no input device available".to_string()))?;

    let supported_config = device
        .supported_input_configs()
        .map_err(|e| Error::Capture(e.to_string()))?
        .find(|c| {
            c.channels() == 1
                && c.min_sample_rate() <= SampleRate(SAMPLE_RATE)
                && c.max_sample_rate() >= SampleRate(SAMPLE_RATE)
        })
        .ok_or_else(|| Error::Capture("no suitable input config found".to_string()))?;

    let config = supported_config
        .with_sample_rate(SampleRate(SAMPLE_RATE))
        .config();

    tracing::debug!(
        device = device.name().unwrap_or_default(),
        sample_rate = SAMPLE_RATE,
        channels = config.channels,
        "input device opened"
    );

    Ok((device, config))
}

/// Queue of captured samples shared with the cpal callback
#[derive(Default)]
struct FrameQueue {
    samples: Mutex<VecDeque<i16>>,
    available: Condvar,
}

/// Frame-oriented capture for the wake word thread
pub struct CpalCapture {
    device_index: i32,
    frame_length: usize,
    queue: Arc<FrameQueue>,
    stream: Option<Stream>,
}

impl CpalCapture {
    /// Prepare a capture for `frame_length`-sample reads
    ///
    /// The device itself is opened by `start`, on the thread that will
    /// read from it.
    #[must_use]
    pub fn new(device_index: i32, frame_length: usize) -> Self {
        Self {
            device_index,
            frame_length: frame_length.max(1),
            queue: Arc::new(FrameQueue::default()),
            stream: None,
        }
    }
}

impl CaptureDevice for CpalCapture {
    fn start(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let (device, config) = open_input(self.device_index)?;
        let queue = Arc::clone(&self.queue);

        let stream = device
            .build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    if let Ok(mut samples) = queue.samples.lock() {
                        for &sample in data {
                            #[allow(clippy::cast_possible_truncation)]
                            samples.push_back((sample * 32767.0).clamp(-32768.0, 32767.0) as i16);
                        }
                        queue.available.notify_one();
                    }
                },
                |err| {
                    tracing::error!(error = %err, "wake capture error");
                },
                None,
            )
            .map_err(|e| Error::Capture(e.to_string()))?;

        stream.play().map_err(|e| Error::Capture(e.to_string()))?;
        self.stream = Some(stream);

        tracing::debug!(frame_length = self.frame_length, "wake capture started");
        Ok(())
    }

    fn read(&mut self) -> Result<Vec<i16>> {
        let mut samples = self
            .queue
            .samples
            .lock()
            .map_err(|_| Error::Capture("capture queue poisoned".to_string()))?;

        let mut waited = Duration::ZERO;
        while samples.len() < self.frame_length {
            if waited >= READ_TIMEOUT {
                return Err(Error::Capture("capture device stopped delivering".to_string()));
            }
            let (guard, timeout) = self
                .queue
                .available
                .wait_timeout(samples, Duration::from_millis(100))
                .map_err(|_| Error::Capture("capture queue poisoned".to_string()))?;
            samples = guard;
            if timeout.timed_out() {
                waited += Duration::from_millis(100);
            }
        }

        Ok(samples.drain(..self.frame_length).collect())
    }

    fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            tracing::debug!("wake capture stopped");
        }
    }
}

/// Buffer-oriented capture for command utterances
pub struct AudioCapture {
    device_index: i32,
    buffer: Arc<Mutex<Vec<f32>>>,
    stream: Option<Stream>,
}

impl AudioCapture {
    /// Prepare a capture; the device opens on `start`
    #[must_use]
    pub fn new(device_index: i32) -> Self {
        Self {
            device_index,
            buffer: Arc::new(Mutex::new(Vec::new())),
            stream: None,
        }
    }

    /// Start capturing into the shared buffer
    ///
    /// # Errors
    ///
    /// Returns an error if the device cannot be opened.
    pub fn start(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let (device, config) = open_input(self.device_index)?;
        let buffer = Arc::clone(&self.buffer);

        let stream = device
            .build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    if let Ok(mut buf) = buffer.lock() {
                        buf.extend_from_slice(data);
                    }
                },
                |err| {
                    tracing::error!(error = %err, "utterance capture error");
                },
                None,
            )
            .map_err(|e| Error::Capture(e.to_string()))?;

        stream.play().map_err(|e| Error::Capture(e.to_string()))?;
        self.stream = Some(stream);

        tracing::debug!("utterance capture started");
        Ok(())
    }

    /// Stop capturing and release the device
    pub fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            tracing::debug!("utterance capture stopped");
        }
    }

    /// Samples captured since the last call, clearing the buffer
    #[must_use]
    pub fn take_buffer(&self) -> Vec<f32> {
        self.buffer
            .lock()
            .map(|mut buf| std::mem::take(&mut *buf))
            .unwrap_or_default()
    }

    /// Samples captured so far without clearing
    #[must_use]
    pub fn peek_buffer(&self) -> Vec<f32> {
        self.buffer
            .lock()
            .map(|buf| buf.clone())
            .unwrap_or_default()
    }

    /// Discard everything captured so far
    pub fn clear_buffer(&self) {
        if let Ok(mut buf) = self.buffer.lock() {
            buf.clear();
        }
    }
}

/// Convert f32 samples to WAV bytes for transcription APIs
///
/// # Errors
///
/// Returns an error if WAV encoding fails.
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;

        for &sample in samples {
            #[allow(clippy::cast_possible_truncation)]
            let sample_i16 = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
            writer
                .write_sample(sample_i16)
                .map_err(|e| Error::Audio(e.to_string()))?;
        }

        writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn samples_to_wav_writes_a_riff_header() {
        let samples = vec![0.0f32, 0.5, -0.5, 1.0, -1.0];
        let wav = samples_to_wav(&samples, SAMPLE_RATE).unwrap();

        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        assert!(wav.len() > 44);
    }

    #[test]
    fn samples_to_wav_round_trips_lengths() {
        let samples = vec![0.25f32; 160];
        let wav = samples_to_wav(&samples, SAMPLE_RATE).unwrap();

        let mut reader = hound::WavReader::new(std::io::Cursor::new(wav)).unwrap();
        assert_eq!(reader.spec().sample_rate, SAMPLE_RATE);
        assert_eq!(reader.spec().channels, 1);
        assert_eq!(reader.samples::<i16>().count(), samples.len());
    }
}
