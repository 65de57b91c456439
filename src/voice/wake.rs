//! Wake word listening
//!
//! A dedicated background thread owns the microphone and detector while
//! the device listens for its wake phrase. The thread does exactly one
//! thing: blocking frame reads fed to the detector, with positive matches
//! enqueued as [`WakeEvent`]s for the cooperative loop. All device-mode
//! decisions happen on the loop when the event is consumed; the thread
//! never touches shared state.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::thread::JoinHandle;

use tokio::sync::mpsc;

use super::capture::CaptureDevice;
use crate::Result;

/// Minimum RMS energy (of full-scale) treated as speech
const ENERGY_THRESHOLD: f32 = 0.03;

/// Samples of audio a candidate segment must span (0.3s at 16kHz)
const MIN_SPEECH_SAMPLES: usize = 4800;

/// Samples of silence that end a segment (0.5s at 16kHz)
const SILENCE_SAMPLES: usize = 8000;

/// Frame size handed to the bundled detector
const DEFAULT_FRAME_LENGTH: usize = 512;

/// A wake word detection backend
///
/// The capture device must deliver frames of exactly `frame_length`
/// samples. `process` returns the index of the matched keyword, or a
/// negative value when nothing matched. Like the capture device, a
/// detector lives entirely on the listener thread.
pub trait WakeDetector {
    /// Samples per frame this detector expects
    fn frame_length(&self) -> usize;

    /// Feed one frame; ≥ 0 is the matched keyword index
    ///
    /// # Errors
    ///
    /// Returns an error if the detector backend fails.
    fn process(&mut self, frame: &[i16]) -> Result<i32>;
}

/// The resources owned by a running listener thread
///
/// Created when the thread starts and destroyed when it exits; the capture
/// device is released unconditionally on the way out.
pub struct WakeWordSession {
    /// Microphone delivering detector-sized frames
    pub capture: Box<dyn CaptureDevice>,
    /// Detection backend
    pub detector: Box<dyn WakeDetector>,
}

/// Raised to the cooperative loop when the wake phrase is heard
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WakeEvent {
    /// Index of the keyword the detector matched
    pub keyword_index: i32,
}

/// Listener lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    /// No thread running
    Stopped,
    /// Thread spawned, acquiring resources
    Starting,
    /// Thread reading frames
    Running,
    /// Stop requested, thread winding down
    Stopping,
}

const STATE_STOPPED: u8 = 0;
const STATE_STARTING: u8 = 1;
const STATE_RUNNING: u8 = 2;
const STATE_STOPPING: u8 = 3;

impl ListenerState {
    const fn from_u8(value: u8) -> Self {
        match value {
            STATE_STARTING => Self::Starting,
            STATE_RUNNING => Self::Running,
            STATE_STOPPING => Self::Stopping,
            _ => Self::Stopped,
        }
    }
}

/// Manages the background wake word thread
pub struct WakeWordListener {
    events_tx: mpsc::Sender<WakeEvent>,
    stop_flag: Arc<AtomicBool>,
    state: Arc<AtomicU8>,
    thread: Option<JoinHandle<()>>,
}

impl WakeWordListener {
    /// Create a listener that reports detections on `events_tx`
    #[must_use]
    pub fn new(events_tx: mpsc::Sender<WakeEvent>) -> Self {
        Self {
            events_tx,
            stop_flag: Arc::new(AtomicBool::new(false)),
            state: Arc::new(AtomicU8::new(STATE_STOPPED)),
            thread: None,
        }
    }

    /// Current lifecycle state
    #[must_use]
    pub fn state(&self) -> ListenerState {
        ListenerState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Whether a listener thread is active
    #[must_use]
    pub fn is_running(&self) -> bool {
        matches!(self.state(), ListenerState::Starting | ListenerState::Running)
    }

    /// Start the background thread, acquiring resources via `factory`
    ///
    /// A no-op when the listener is already starting or running: the
    /// factory is not invoked, so resource acquisition is idempotent. The
    /// factory runs on the spawned thread, which then owns the session for
    /// its whole life.
    pub fn start<F>(&mut self, factory: F)
    where
        F: FnOnce() -> Result<WakeWordSession> + Send + 'static,
    {
        if self.is_running() {
            tracing::debug!("wake word listener already active");
            return;
        }

        // Reap a previous thread that exited on its own
        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                tracing::error!("previous wake word thread panicked");
            }
        }

        self.stop_flag.store(false, Ordering::Release);
        self.state.store(STATE_STARTING, Ordering::Release);

        let stop_flag = Arc::clone(&self.stop_flag);
        let state = Arc::clone(&self.state);
        let events_tx = self.events_tx.clone();

        self.thread = Some(std::thread::spawn(move || {
            run_listener(factory, &stop_flag, &state, &events_tx);
        }));
    }

    /// Stop the background thread and wait for it to release its resources
    ///
    /// Blocks until the thread has exited; when this returns the capture
    /// device and detector are guaranteed released and no further wake
    /// events will be enqueued.
    pub fn stop(&mut self) {
        let Some(handle) = self.thread.take() else {
            return;
        };

        self.state.store(STATE_STOPPING, Ordering::Release);
        self.stop_flag.store(true, Ordering::Release);

        if handle.join().is_err() {
            tracing::error!("wake word thread panicked during stop");
        }
        self.state.store(STATE_STOPPED, Ordering::Release);
        tracing::debug!("wake word listener stopped");
    }
}

impl Drop for WakeWordListener {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Thread body: acquire resources, run the loop, always release
fn run_listener<F>(
    factory: F,
    stop_flag: &AtomicBool,
    state: &AtomicU8,
    events_tx: &mpsc::Sender<WakeEvent>,
) where
    F: FnOnce() -> Result<WakeWordSession>,
{
    let mut session = match factory() {
        Ok(session) => session,
        Err(e) => {
            // Listening capability is lost, but device mode is untouched
            // and a manual power-down still works
            tracing::error!(error = %e, "failed to acquire wake word resources");
            state.store(STATE_STOPPED, Ordering::Release);
            return;
        }
    };

    state.store(STATE_RUNNING, Ordering::Release);
    let result = listen_loop(&mut session, stop_flag, events_tx);

    // Release runs no matter how the loop ended
    session.capture.stop();
    drop(session);
    state.store(STATE_STOPPED, Ordering::Release);

    if let Err(e) = result {
        tracing::error!(error = %e, "wake word loop ended with error");
    }
}

/// Read frames and report detections until the stop signal is observed
fn listen_loop(
    session: &mut WakeWordSession,
    stop_flag: &AtomicBool,
    events_tx: &mpsc::Sender<WakeEvent>,
) -> Result<()> {
    session.capture.start()?;

    while !stop_flag.load(Ordering::Acquire) {
        let frame = session.capture.read()?;
        let keyword_index = session.detector.process(&frame)?;
        if keyword_index >= 0 {
            tracing::debug!(keyword_index, "wake word candidate");
            // The loop decides whether the device may act on it; a full
            // queue just drops the event
            if events_tx.try_send(WakeEvent { keyword_index }).is_err() {
                tracing::trace!("wake event dropped, queue full or closed");
            }
        }
    }

    Ok(())
}

/// Segment tracking state for [`EnergyDetector`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SegmentState {
    /// Waiting for speech energy
    Quiet,
    /// Accumulating a candidate segment
    Tracking,
}

/// Energy-based wake detection
///
/// Stands in for an external keyword model: it reports a match after a
/// sustained burst of speech energy followed by a pause. Keyword selection
/// and access credentials in the wake configuration apply to external
/// detector backends; this one fires on any utterance.
pub struct EnergyDetector {
    frame_length: usize,
    state: SegmentState,
    speech_samples: usize,
    silence_samples: usize,
}

impl Default for EnergyDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl EnergyDetector {
    /// Detector with the default frame size
    #[must_use]
    pub const fn new() -> Self {
        Self {
            frame_length: DEFAULT_FRAME_LENGTH,
            state: SegmentState::Quiet,
            speech_samples: 0,
            silence_samples: 0,
        }
    }

    fn reset(&mut self) {
        self.state = SegmentState::Quiet;
        self.speech_samples = 0;
        self.silence_samples = 0;
    }
}

impl WakeDetector for EnergyDetector {
    fn frame_length(&self) -> usize {
        self.frame_length
    }

    fn process(&mut self, frame: &[i16]) -> Result<i32> {
        let energy = frame_energy(frame);
        let is_speech = energy > ENERGY_THRESHOLD;

        match self.state {
            SegmentState::Quiet => {
                if is_speech {
                    self.state = SegmentState::Tracking;
                    self.speech_samples = frame.len();
                    self.silence_samples = 0;
                    tracing::trace!(energy, "speech started");
                }
            }
            SegmentState::Tracking => {
                if is_speech {
                    self.speech_samples += frame.len();
                    self.silence_samples = 0;
                } else {
                    self.silence_samples += frame.len();
                }

                if self.silence_samples > SILENCE_SAMPLES
                    && self.speech_samples > MIN_SPEECH_SAMPLES
                {
                    tracing::debug!(samples = self.speech_samples, "speech segment complete");
                    self.reset();
                    return Ok(0);
                }

                // Too much silence without enough speech: give up on the segment
                if self.silence_samples > SILENCE_SAMPLES * 2 {
                    tracing::trace!("segment abandoned");
                    self.reset();
                }
            }
        }

        Ok(-1)
    }
}

/// RMS energy of an i16 frame, scaled to `[0, 1]`
#[allow(clippy::cast_precision_loss)]
fn frame_energy(frame: &[i16]) -> f32 {
    if frame.is_empty() {
        return 0.0;
    }
    let sum_squares: f32 = frame
        .iter()
        .map(|&s| {
            let normalized = f32::from(s) / 32768.0;
            normalized * normalized
        })
        .sum();
    (sum_squares / frame.len() as f32).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loud_frame() -> Vec<i16> {
        vec![8000; DEFAULT_FRAME_LENGTH]
    }

    fn quiet_frame() -> Vec<i16> {
        vec![0; DEFAULT_FRAME_LENGTH]
    }

    #[test]
    fn energy_of_silence_is_zero() {
        assert!(frame_energy(&quiet_frame()) < 0.001);
        assert!(frame_energy(&loud_frame()) > 0.2);
    }

    #[test]
    fn silence_never_triggers() {
        let mut detector = EnergyDetector::new();
        for _ in 0..200 {
            assert_eq!(detector.process(&quiet_frame()).unwrap(), -1);
        }
    }

    #[test]
    fn sustained_speech_then_pause_triggers_once() {
        let mut detector = EnergyDetector::new();

        // ~0.32s of speech
        for _ in 0..10 {
            assert_eq!(detector.process(&loud_frame()).unwrap(), -1);
        }

        // Silence until the segment closes
        let mut fired = 0;
        for _ in 0..40 {
            if detector.process(&quiet_frame()).unwrap() >= 0 {
                fired += 1;
            }
        }
        assert_eq!(fired, 1);
    }

    #[test]
    fn short_blip_is_abandoned() {
        let mut detector = EnergyDetector::new();

        // One frame of noise is under the minimum segment length
        detector.process(&loud_frame()).unwrap();
        for _ in 0..80 {
            assert_eq!(detector.process(&quiet_frame()).unwrap(), -1);
        }
    }
}
