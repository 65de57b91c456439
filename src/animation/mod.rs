//! Face animation engine
//!
//! Envelope extraction, viseme scheduling, and per-clip playback sessions.
//! The assistant loop drives these at a fixed tick rate while the audio
//! sink plays the clip.

mod envelope;
mod frames;
mod scheduler;
mod session;

pub use envelope::{AudioEnvelope, EnvelopePoint};
pub use frames::FaceSet;
pub use scheduler::VisemeScheduler;
pub use session::{Continuation, PlaybackSession, Tick};
