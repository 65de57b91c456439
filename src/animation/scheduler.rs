//! Viseme scheduling
//!
//! Samples an [`AudioEnvelope`] at an elapsed playback time, low-pass
//! filters the result, and maps it onto a discrete mouth frame index.

use super::envelope::AudioEnvelope;

/// Guard against zero-width interpolation segments
const MIN_SEGMENT: f32 = 1e-6;

/// Angular rate of the fallback oscillation when no envelope is available
const FALLBACK_RATE: f32 = 8.0;

/// Maps elapsed playback time to a smoothed mouth intensity
#[derive(Debug)]
pub struct VisemeScheduler {
    envelope: AudioEnvelope,
    smoothing: f32,
    smoothed: f32,
}

impl VisemeScheduler {
    /// Create a scheduler over `envelope`
    ///
    /// `smoothing` is the per-tick exponential filter factor; the smoothed
    /// intensity moves that fraction of the way toward the target each
    /// tick, damping abrupt envelope jumps at the animation tick rate.
    #[must_use]
    pub const fn new(envelope: AudioEnvelope, smoothing: f32) -> Self {
        Self {
            envelope,
            smoothing,
            smoothed: 0.0,
        }
    }

    /// Raw interpolated envelope intensity at `elapsed` seconds
    ///
    /// Before the first point the first intensity is returned; between
    /// points the value is linearly interpolated; past the last point the
    /// last value is held. An empty envelope substitutes a smooth
    /// oscillation so the face keeps moving even when analysis failed.
    #[must_use]
    pub fn target_intensity(&self, elapsed: f32) -> f32 {
        let points = self.envelope.points();
        if points.is_empty() {
            return 0.5 + 0.5 * (elapsed * FALLBACK_RATE).sin();
        }

        for (idx, point) in points.iter().enumerate() {
            if elapsed <= point.time {
                if idx == 0 {
                    return point.intensity;
                }
                let prev = points[idx - 1];
                let progress = (elapsed - prev.time) / (point.time - prev.time).max(MIN_SEGMENT);
                return prev.intensity + (point.intensity - prev.intensity) * progress;
            }
        }
        points[points.len() - 1].intensity
    }

    /// Advance one tick: pull the smoothed intensity toward the target
    pub fn advance(&mut self, elapsed: f32) -> f32 {
        let target = self.target_intensity(elapsed);
        self.smoothed += (target - self.smoothed) * self.smoothing;
        self.smoothed
    }

    /// Current smoothed intensity without advancing
    #[must_use]
    pub const fn smoothed(&self) -> f32 {
        self.smoothed
    }

    /// Map the smoothed intensity onto a frame index in `0..frame_count`
    #[must_use]
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn frame_index(&self, frame_count: usize) -> usize {
        let count = frame_count.max(1);
        let scaled = (self.smoothed.clamp(0.0, 1.0) * (count - 1) as f32).round() as usize;
        scaled.min(count - 1)
    }
}
