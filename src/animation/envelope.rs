//! Audio envelope extraction
//!
//! Turns a WAV clip into a normalized amplitude-over-time timeline that
//! drives the viseme scheduler. Decode failures are non-fatal: they yield
//! an empty envelope and the scheduler animates with a synthetic
//! oscillation instead of freezing the face.

use std::path::Path;

/// One point of the amplitude timeline
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnvelopePoint {
    /// Seconds from clip start
    pub time: f32,
    /// Peak-normalized amplitude in `[0, 1]`
    pub intensity: f32,
}

/// Time-ordered amplitude profile of an audio clip
///
/// Timestamps are non-decreasing, the first point sits at t≈0 and the last
/// at or beyond the clip duration with intensity 0. Immutable once built.
#[derive(Debug, Clone, Default)]
pub struct AudioEnvelope {
    points: Vec<EnvelopePoint>,
}

impl AudioEnvelope {
    /// An empty envelope (extraction failed; scheduler falls back)
    #[must_use]
    pub const fn empty() -> Self {
        Self { points: Vec::new() }
    }

    /// Build an envelope from raw `(time, intensity)` pairs
    ///
    /// Used by tests and by callers that analyzed audio elsewhere.
    #[must_use]
    pub fn from_points(points: Vec<(f32, f32)>) -> Self {
        Self {
            points: points
                .into_iter()
                .map(|(time, intensity)| EnvelopePoint { time, intensity })
                .collect(),
        }
    }

    /// Analyze a WAV file into an envelope
    ///
    /// Windows of `window_secs` of audio are reduced to their RMS
    /// amplitude, normalized by the loudest window. If the last window
    /// starts before `expected_duration`, a terminal silence point at the
    /// declared duration forces a fade to closed. Any decode error (corrupt
    /// file, truncated stream, non-WAV input) yields an empty envelope.
    #[must_use]
    pub fn from_wav_file(path: &Path, expected_duration: f32, window_secs: f32) -> Self {
        match analyze(path, expected_duration, window_secs) {
            Ok(points) => Self { points },
            Err(e) => {
                tracing::debug!(
                    path = %path.display(),
                    error = %e,
                    "envelope extraction failed, using fallback"
                );
                Self::empty()
            }
        }
    }

    /// Whether extraction produced no points
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// The timeline points
    #[must_use]
    pub fn points(&self) -> &[EnvelopePoint] {
        &self.points
    }
}

/// Windowed RMS analysis over a WAV file
#[allow(clippy::cast_precision_loss)]
fn analyze(
    path: &Path,
    expected_duration: f32,
    window_secs: f32,
) -> std::result::Result<Vec<EnvelopePoint>, hound::Error> {
    let mut reader = hound::WavReader::open(path)?;
    let spec = reader.spec();
    let channels = usize::from(spec.channels.max(1));

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let window_frames = ((spec.sample_rate as f32 * window_secs) as usize).max(1);
    let window_samples = window_frames * channels;

    let samples = read_normalized_samples(&mut reader)?;

    let mut points = Vec::with_capacity(samples.len() / window_samples + 1);
    let mut frame_offset = 0usize;
    for window in samples.chunks(window_samples) {
        let sum_squares: f32 = window.iter().map(|s| s * s).sum();
        let rms = (sum_squares / window.len() as f32).sqrt();
        points.push(EnvelopePoint {
            time: frame_offset as f32 / spec.sample_rate as f32,
            intensity: rms,
        });
        frame_offset += window_frames;
    }

    if points.is_empty() {
        return Ok(points);
    }

    let peak = points
        .iter()
        .map(|p| p.intensity)
        .fold(0.0f32, f32::max);
    // A fully silent clip normalizes against 1 instead of dividing by zero
    let peak = if peak > 0.0 { peak } else { 1.0 };
    for point in &mut points {
        point.intensity /= peak;
    }

    if expected_duration > 0.0
        && points.last().is_some_and(|p| p.time < expected_duration)
    {
        points.push(EnvelopePoint {
            time: expected_duration,
            intensity: 0.0,
        });
    }

    Ok(points)
}

/// Read all samples scaled to `[-1, 1]` regardless of the stored format
fn read_normalized_samples<R: std::io::Read>(
    reader: &mut hound::WavReader<R>,
) -> std::result::Result<Vec<f32>, hound::Error> {
    let spec = reader.spec();
    match spec.sample_format {
        hound::SampleFormat::Float => reader.samples::<f32>().collect(),
        hound::SampleFormat::Int => {
            #[allow(clippy::cast_precision_loss)]
            let scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_wav(dir: &std::path::Path, name: &str, samples: &[i16]) -> std::path::PathBuf {
        let path = dir.join(name);
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 16000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for &sample in samples {
            writer.write_sample(sample).unwrap();
        }
        writer.finalize().unwrap();
        path
    }

    #[test]
    fn silent_clip_has_zero_intensity_and_duration_pad() {
        let dir = tempfile::tempdir().unwrap();
        // 0.5s of silence, declared duration 1.0s
        let path = write_wav(dir.path(), "silent.wav", &vec![0i16; 8000]);

        let envelope = AudioEnvelope::from_wav_file(&path, 1.0, 0.08);
        assert!(!envelope.is_empty());

        let points = envelope.points();
        assert!(points.iter().all(|p| p.intensity.abs() < f32::EPSILON));
        assert!(points.last().unwrap().time >= 1.0);
    }

    #[test]
    fn timestamps_are_non_decreasing_from_zero() {
        let dir = tempfile::tempdir().unwrap();
        let samples: Vec<i16> = (0..16000)
            .map(|i| {
                #[allow(clippy::cast_precision_loss)]
                let t = i as f32 / 16000.0;
                #[allow(clippy::cast_possible_truncation)]
                let s = ((t * 440.0 * std::f32::consts::TAU).sin() * 12000.0) as i16;
                s
            })
            .collect();
        let path = write_wav(dir.path(), "tone.wav", &samples);

        let envelope = AudioEnvelope::from_wav_file(&path, 1.0, 0.08);
        let points = envelope.points();
        assert!(points[0].time.abs() < f32::EPSILON);
        assert!(points.windows(2).all(|w| w[0].time <= w[1].time));
    }

    #[test]
    fn loudest_window_normalizes_to_one() {
        let dir = tempfile::tempdir().unwrap();
        // Quiet first half, loud second half
        let mut samples = vec![800i16; 8000];
        samples.extend(vec![16000i16; 8000]);
        let path = write_wav(dir.path(), "ramp.wav", &samples);

        let envelope = AudioEnvelope::from_wav_file(&path, 1.0, 0.08);
        let peak = envelope
            .points()
            .iter()
            .map(|p| p.intensity)
            .fold(0.0f32, f32::max);
        assert!((peak - 1.0).abs() < 1e-4);
        assert!(envelope.points().iter().all(|p| (0.0..=1.0).contains(&p.intensity)));
    }

    #[test]
    fn missing_file_yields_empty_envelope() {
        let envelope =
            AudioEnvelope::from_wav_file(Path::new("/nonexistent/clip.wav"), 1.0, 0.08);
        assert!(envelope.is_empty());
    }

    #[test]
    fn garbage_file_yields_empty_envelope() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garbage.wav");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(b"not a wav file at all")
            .unwrap();

        let envelope = AudioEnvelope::from_wav_file(&path, 1.0, 0.08);
        assert!(envelope.is_empty());
    }

    #[test]
    fn no_pad_when_clip_covers_declared_duration() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_wav(dir.path(), "full.wav", &vec![4000i16; 16000]);

        let envelope = AudioEnvelope::from_wav_file(&path, 0.5, 0.08);
        // Last analyzed window starts past 0.5s, so no terminal point is added
        let last = envelope.points().last().unwrap();
        assert!(last.time >= 0.5);
        assert!(last.intensity > 0.0);
    }
}
