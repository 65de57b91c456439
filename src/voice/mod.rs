//! Voice processing module
//!
//! Microphone capture, wake word listening, playback, and the STT/TTS
//! service clients.

mod capture;
mod playback;
mod stt;
mod tts;
mod wake;

pub use capture::{AudioCapture, CaptureDevice, CpalCapture, SAMPLE_RATE, samples_to_wav};
pub use playback::{AudioSink, LoadedClip, PlaybackDone, SoundHandle};
pub use stt::SpeechToText;
pub use tts::SpeechSynthesizer;
pub use wake::{
    EnergyDetector, ListenerState, WakeDetector, WakeEvent, WakeWordListener, WakeWordSession,
};
