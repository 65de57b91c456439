//! Active playback session
//!
//! A [`PlaybackSession`] is the transient record tying one playing clip to
//! its envelope scheduler, frame set, and the continuation to run when the
//! clip ends. Exactly one session is active at a time; it is owned by the
//! assistant loop and consumed on teardown, so no tick can ever observe a
//! session after its teardown began.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tempfile::TempPath;

use super::envelope::AudioEnvelope;
use super::frames::FaceSet;
use super::scheduler::VisemeScheduler;
use crate::config::AnimationConfig;
use crate::voice::SoundHandle;

/// What happens after the current clip finishes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Continuation {
    /// Power-up clip done: enable command handling and start listening
    EnableCommands,
    /// Reply or response clip done: resume wake word listening
    ResumeListening,
    /// Farewell clip done: exit the process
    Shutdown,
}

/// Outcome of one animation tick
#[derive(Debug, PartialEq, Eq)]
pub enum Tick {
    /// The target frame changed; the renderer should display it
    ShowFrame(PathBuf),
    /// The target frame is already on screen
    Unchanged,
    /// Elapsed time passed the clip duration plus grace; tear down
    Finished,
}

/// One clip's worth of lip-sync playback state
#[derive(Debug)]
pub struct PlaybackSession {
    id: u64,
    scheduler: VisemeScheduler,
    faces: Arc<FaceSet>,
    started: Instant,
    duration: Option<f32>,
    grace: f32,
    current_frame: Option<usize>,
    handle: Option<SoundHandle>,
    continuation: Continuation,
    temp: Option<TempPath>,
}

impl PlaybackSession {
    /// Install a new session starting now
    ///
    /// `id` ties asynchronous completion notices back to this session so a
    /// stale notice from a superseded clip cannot tear down its successor.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: u64,
        envelope: AudioEnvelope,
        faces: Arc<FaceSet>,
        duration: Option<f32>,
        animation: &AnimationConfig,
        handle: Option<SoundHandle>,
        continuation: Continuation,
        temp: Option<TempPath>,
    ) -> Self {
        Self {
            id,
            scheduler: VisemeScheduler::new(envelope, animation.smoothing),
            faces,
            started: Instant::now(),
            duration,
            grace: animation.grace_secs,
            current_frame: None,
            handle,
            continuation,
            temp,
        }
    }

    /// Identifier attached to this session's completion notice
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Seconds since playback started
    #[must_use]
    pub fn elapsed(&self) -> f32 {
        self.started.elapsed().as_secs_f32()
    }

    /// Drive one animation tick against the wall clock
    pub fn tick(&mut self) -> Tick {
        self.tick_at(self.elapsed())
    }

    /// Drive one animation tick at an explicit elapsed time
    ///
    /// Elapsed times are monotonic for a live session since they derive
    /// from a single `Instant`.
    pub fn tick_at(&mut self, elapsed: f32) -> Tick {
        if let Some(duration) = self.duration
            && elapsed > duration + self.grace
        {
            return Tick::Finished;
        }

        self.scheduler.advance(elapsed);
        let index = self.scheduler.frame_index(self.faces.viseme_count());
        if self.current_frame == Some(index) {
            return Tick::Unchanged;
        }
        self.current_frame = Some(index);
        Tick::ShowFrame(self.faces.viseme(index).to_path_buf())
    }

    /// The continuation this session will run on teardown
    #[must_use]
    pub const fn continuation(&self) -> Continuation {
        self.continuation
    }

    /// Tear the session down and return its continuation
    ///
    /// Stops the sound if it is still playing and removes any synthesized
    /// temp file (the owned [`TempPath`] deletes on drop, so cleanup
    /// happens no matter how the continuation is handled afterwards).
    /// Consuming `self` makes double teardown unrepresentable: whichever of
    /// the explicit stop signal and the grace timeout arrives first wins,
    /// and the loser finds no session left to finish.
    pub fn finish(mut self) -> Continuation {
        if let Some(handle) = self.handle.take() {
            handle.stop();
        }
        if let Some(temp) = self.temp.take() {
            if let Err(e) = temp.close() {
                tracing::warn!(error = %e, "failed to remove synthesized audio file");
            }
        }
        self.continuation
    }
}
