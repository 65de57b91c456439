//! Beamo - voice-driven companion device
//!
//! Beamo listens for a wake word, captures a spoken command, routes it to
//! a language-model-backed resolver, speaks the synthesized reply, and
//! animates a face lip-synced to whatever audio is playing.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                Cooperative loop                      │
//! │  mode transitions │ animation ticks │ renderer calls │
//! └──────▲─────────────────▲───────────────────▲─────────┘
//!        │ wake events     │ playback done     │ 30 Hz
//! ┌──────┴────────┐  ┌─────┴─────────┐  ┌──────┴────────┐
//! │ Wake word     │  │ Playback      │  │ Animation     │
//! │ thread        │  │ thread        │  │ clock         │
//! │ (mic+detector)│  │ (cpal output) │  │ (interval)    │
//! └───────────────┘  └───────────────┘  └───────────────┘
//! ```
//!
//! The cooperative loop is the single writer of device mode and the only
//! caller of the renderer. Background threads communicate exclusively over
//! channels; stopping the wake thread is synchronous and releases the
//! microphone before returning.

pub mod animation;
pub mod assistant;
pub mod config;
pub mod error;
pub mod face;
pub mod router;
pub mod state;
pub mod voice;

pub use animation::{AudioEnvelope, Continuation, FaceSet, PlaybackSession, Tick, VisemeScheduler};
pub use assistant::Assistant;
pub use config::{AnimationConfig, Config, Responses};
pub use error::{Error, Result};
pub use face::{FaceRenderer, LogRenderer};
pub use router::{CommandRouter, RoutedReply};
pub use state::{AssistantState, DeviceMode};
