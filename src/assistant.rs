//! Assistant orchestration
//!
//! The single cooperative loop that owns device mode, the animation clock,
//! and every renderer side effect. The wake word thread and the playback
//! thread only talk to it through channels; all decisions happen here, one
//! event at a time.

use std::path::Path;
use std::sync::Arc;

use tempfile::TempPath;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

use crate::animation::{AudioEnvelope, Continuation, FaceSet, PlaybackSession, Tick};
use crate::config::{Config, Responses, WakeConfig};
use crate::face::FaceRenderer;
use crate::router::CommandRouter;
use crate::state::{AssistantState, DeviceMode};
use crate::voice::{
    AudioSink, CpalCapture, EnergyDetector, LoadedClip, PlaybackDone, SpeechSynthesizer,
    SpeechToText, WakeDetector, WakeEvent, WakeWordListener, WakeWordSession,
};
use crate::{Error, Result};

/// Queue depths for the wake-event and playback-done channels
const CHANNEL_DEPTH: usize = 4;

/// Whether the loop keeps going after handling an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Exit,
}

/// The companion device
pub struct Assistant {
    config: Config,
    responses: Responses,
    faces: Arc<FaceSet>,
    renderer: Box<dyn FaceRenderer>,
    state: AssistantState,
    listener: WakeWordListener,
    wake_rx: mpsc::Receiver<WakeEvent>,
    done_rx: mpsc::Receiver<PlaybackDone>,
    sink: AudioSink,
    stt: SpeechToText,
    tts: SpeechSynthesizer,
    router: CommandRouter,
    session: Option<PlaybackSession>,
    sessions_started: u64,
}

impl Assistant {
    /// Wire up the device from configuration
    ///
    /// # Errors
    ///
    /// Fails when a startup resource is unavailable: faces missing, no
    /// audio output, or a service credential absent.
    pub fn new(config: Config, renderer: Box<dyn FaceRenderer>) -> Result<Self> {
        let faces = Arc::new(FaceSet::load(&config.faces_dir)?);
        let (wake_tx, wake_rx) = mpsc::channel(CHANNEL_DEPTH);
        let (done_tx, done_rx) = mpsc::channel(CHANNEL_DEPTH);

        let sink = AudioSink::new(done_tx)?;
        let stt = SpeechToText::new(&config.stt, config.wake.device_index)?;
        let tts = SpeechSynthesizer::new(&config.tts)?;
        let router = CommandRouter::new(&config.router);
        let listener = WakeWordListener::new(wake_tx);
        let responses = config.responses();

        Ok(Self {
            config,
            responses,
            faces,
            renderer,
            state: AssistantState::new(),
            listener,
            wake_rx,
            done_rx,
            sink,
            stt,
            tts,
            router,
            session: None,
            sessions_started: 0,
        })
    }

    /// Run the device until power-down
    ///
    /// Must be driven from the main thread (cpal streams aren't Send).
    ///
    /// # Errors
    ///
    /// Returns an error only for loop-level failures; per-utterance
    /// failures are absorbed with canned replies.
    #[allow(clippy::future_not_send)]
    pub async fn run(mut self) -> Result<()> {
        let mut ticker = tokio::time::interval(self.config.animation.tick_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        self.renderer.show_frame(self.faces.random_idle());
        if self.power_up() == Flow::Exit {
            self.listener.stop();
            return Ok(());
        }

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("power down requested");
                    if self.power_down() == Flow::Exit {
                        break;
                    }
                }
                Some(event) = self.wake_rx.recv() => {
                    self.on_wake(event).await;
                }
                Some(done) = self.done_rx.recv() => {
                    if self.on_playback_done(done) == Flow::Exit {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    if self.drive_animation() == Flow::Exit {
                        break;
                    }
                }
            }
        }

        self.listener.stop();
        tracing::info!("assistant stopped");
        Ok(())
    }

    /// Play the startup clip, enabling commands when it finishes
    fn power_up(&mut self) -> Flow {
        tracing::info!("powering up");
        let clip = self.responses.startup.clone();
        self.play_clip(&clip, Continuation::EnableCommands, None)
    }

    /// Play the farewell clip, exiting when it finishes
    ///
    /// The listener is stopped first so the device cannot re-trigger while
    /// saying goodbye.
    fn power_down(&mut self) -> Flow {
        self.state.begin_shutdown();
        self.listener.stop();
        let clip = self.responses.farewell.clone();
        self.play_clip(&clip, Continuation::Shutdown, None)
    }

    /// One animation tick
    fn drive_animation(&mut self) -> Flow {
        let Some(session) = self.session.as_mut() else {
            return Flow::Continue;
        };

        match session.tick() {
            Tick::ShowFrame(frame) => {
                self.renderer.show_frame(&frame);
                Flow::Continue
            }
            Tick::Unchanged => Flow::Continue,
            Tick::Finished => self.finish_active_session(),
        }
    }

    /// Asynchronous completion notice from the playback thread
    fn on_playback_done(&mut self, done: PlaybackDone) -> Flow {
        if self
            .session
            .as_ref()
            .is_some_and(|session| session.id() == done.session_id)
        {
            return self.finish_active_session();
        }
        // A superseded clip, or the grace timeout already won the race
        tracing::trace!(session_id = done.session_id, "stale playback notice");
        Flow::Continue
    }

    /// Tear down the active session and run its continuation exactly once
    fn finish_active_session(&mut self) -> Flow {
        let Some(session) = self.session.take() else {
            return Flow::Continue;
        };
        let continuation = session.finish();
        self.renderer.fade_to(self.faces.random_idle());
        self.run_continuation(continuation)
    }

    /// What happens after a clip: the explicit continuation value
    fn run_continuation(&mut self, continuation: Continuation) -> Flow {
        match continuation {
            Continuation::EnableCommands => {
                if self.state.enable_commands() {
                    self.start_listening();
                }
                Flow::Continue
            }
            Continuation::ResumeListening => {
                if self.state.playback_finished()
                    && self.state.mode() == DeviceMode::Listening
                {
                    self.start_listening();
                }
                Flow::Continue
            }
            Continuation::Shutdown => {
                self.state.shutdown_complete();
                Flow::Exit
            }
        }
    }

    /// Consume a wake event on the loop, where mode can be checked safely
    #[allow(clippy::future_not_send)]
    async fn on_wake(&mut self, event: WakeEvent) {
        if !self.state.wake_detected() {
            tracing::debug!(mode = ?self.state.mode(), "wake event ignored");
            return;
        }
        tracing::info!(keyword = event.keyword_index, "wake word accepted");

        // Release the microphone before command capture reuses it; stop is
        // synchronous, so no detection can arrive after this line
        self.listener.stop();
        self.capture_command().await;
    }

    /// Capture one command utterance and respond to it
    #[allow(clippy::future_not_send)]
    async fn capture_command(&mut self) {
        match self.stt.listen().await {
            Ok(utterance) => self.process_command(&utterance).await,
            Err(Error::SpeechUnrecognized) => {
                tracing::info!("speech not recognized");
                self.play_response(self.responses.unrecognized.clone());
            }
            Err(e) => {
                tracing::warn!(error = %e, "speech capture failed");
                self.play_response(self.responses.failure.clone());
            }
        }
    }

    /// Route the utterance and speak the reply
    #[allow(clippy::future_not_send)]
    async fn process_command(&mut self, utterance: &str) {
        tracing::info!(utterance, "routing command");

        match self.router.route(utterance).await {
            Ok(reply) if !reply.text.trim().is_empty() => {
                if let Some(tool) = &reply.used_tool {
                    tracing::info!(tool = %tool, "tool handled the command");
                }
                self.speak(&reply.text).await;
            }
            Ok(_) => {
                tracing::warn!("router returned an empty reply");
                self.play_response(self.responses.failure.clone());
            }
            Err(e) => {
                tracing::warn!(error = %e, "routing failed");
                self.play_response(self.responses.failure.clone());
            }
        }
    }

    /// Synthesize the reply and play it lip-synced
    #[allow(clippy::future_not_send)]
    async fn speak(&mut self, text: &str) {
        tracing::info!(reply = text, "speaking");

        match self.tts.synthesize_to_file(text).await {
            Ok(temp) => {
                let path = temp.to_path_buf();
                self.state.begin_playback();
                self.play_clip(&path, Continuation::ResumeListening, Some(temp));
            }
            Err(e) => {
                tracing::error!(error = %e, "synthesis failed");
                self.play_response(self.responses.failure.clone());
            }
        }
    }

    /// Play a canned response clip from command-capture context
    fn play_response(&mut self, clip: std::path::PathBuf) {
        self.state.begin_playback();
        self.play_clip(&clip, Continuation::ResumeListening, None);
    }

    /// Start a clip with lip-sync animation
    ///
    /// Any prior session is torn down before the new one is installed, so
    /// two sessions can never run concurrently. A clip that fails to load
    /// or start skips straight to its continuation.
    fn play_clip(&mut self, path: &Path, continuation: Continuation, temp: Option<TempPath>) -> Flow {
        if let Some(previous) = self.session.take() {
            // Superseded: clean up but do not run the old continuation
            previous.finish();
        }

        let clip = match LoadedClip::load(path) {
            Ok(clip) => clip,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "cannot load clip");
                drop(temp);
                return self.run_continuation(continuation);
            }
        };

        let duration = clip.duration();
        let envelope =
            AudioEnvelope::from_wav_file(path, duration, self.config.animation.window_secs);

        self.sessions_started += 1;
        let session_id = self.sessions_started;
        let handle = self.sink.play(clip, session_id);

        tracing::debug!(
            path = %path.display(),
            duration,
            envelope_points = envelope.points().len(),
            session_id,
            "playback session started"
        );

        self.session = Some(PlaybackSession::new(
            session_id,
            envelope,
            Arc::clone(&self.faces),
            Some(duration),
            &self.config.animation,
            Some(handle),
            continuation,
            temp,
        ));
        Flow::Continue
    }

    /// Start the wake word listener thread
    fn start_listening(&mut self) {
        let wake = self.config.wake.clone();
        self.listener.start(move || build_wake_session(&wake));
        tracing::info!(keyword = %wake_label(&self.config.wake), "listening for wake word");
    }
}

/// Acquire the capture device and detector for a listener session
///
/// Runs on the listener thread; a failure here disables listening but
/// leaves device mode intact.
fn build_wake_session(config: &WakeConfig) -> Result<WakeWordSession> {
    let detector = EnergyDetector::new();
    let capture = CpalCapture::new(config.device_index, detector.frame_length());

    Ok(WakeWordSession {
        capture: Box::new(capture),
        detector: Box::new(detector),
    })
}

/// Human-readable wake phrase for logs
fn wake_label(config: &WakeConfig) -> String {
    config.keyword_path.as_ref().map_or_else(
        || config.keyword().to_string(),
        |path| path.display().to_string(),
    )
}
