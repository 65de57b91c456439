//! Animation pipeline integration tests
//!
//! Covers envelope extraction from real WAV fixtures, scheduler sampling
//! behavior, and playback session teardown semantics. No audio hardware
//! required.

use std::path::PathBuf;
use std::sync::Arc;

use beamo::animation::{AudioEnvelope, Continuation, FaceSet, PlaybackSession, Tick};
use beamo::{AnimationConfig, VisemeScheduler};

/// Write a mono 16kHz WAV of the given samples
fn write_wav(dir: &std::path::Path, name: &str, samples: &[i16]) -> PathBuf {
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

/// Sine samples at 16kHz
fn sine_samples(frequency: f32, duration_secs: f32, amplitude: f32) -> Vec<i16> {
    let num_samples = (16000.0 * duration_secs) as usize;
    (0..num_samples)
        .map(|i| {
            let t = i as f32 / 16000.0;
            ((std::f32::consts::TAU * frequency * t).sin() * amplitude * 32767.0) as i16
        })
        .collect()
}

fn frame_set() -> Arc<FaceSet> {
    Arc::new(
        FaceSet::from_paths(vec![
            PathBuf::from("m0.png"),
            PathBuf::from("m1.png"),
            PathBuf::from("m2.png"),
            PathBuf::from("m3.png"),
        ])
        .unwrap(),
    )
}

#[test]
fn silent_clip_envelope_is_flat_and_padded() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_wav(dir.path(), "silent.wav", &vec![0i16; 16000]);

    // Declared duration past the actual audio forces a terminal pad
    let envelope = AudioEnvelope::from_wav_file(&path, 1.5, 0.08);
    assert!(!envelope.is_empty());

    let points = envelope.points();
    assert!(points.iter().all(|p| p.intensity.abs() < f32::EPSILON));
    assert!(points.last().unwrap().time >= 1.5);
}

#[test]
fn spoken_clip_envelope_is_normalized() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_wav(dir.path(), "tone.wav", &sine_samples(220.0, 1.0, 0.6));

    let envelope = AudioEnvelope::from_wav_file(&path, 1.0, 0.08);
    let intensities: Vec<f32> = envelope.points().iter().map(|p| p.intensity).collect();

    assert!(intensities.iter().all(|v| (0.0..=1.0).contains(v)));
    assert!(intensities.iter().copied().fold(0.0f32, f32::max) > 0.99);
}

#[test]
fn scheduler_matches_the_reference_interpolation() {
    let envelope = AudioEnvelope::from_points(vec![(0.0, 0.2), (0.5, 1.0), (1.0, 0.0)]);
    let scheduler = VisemeScheduler::new(envelope, 0.35);

    // 0.2 + (1.0 - 0.2) * 0.5 before smoothing
    assert!((scheduler.target_intensity(0.25) - 0.6).abs() < 1e-6);
}

#[test]
fn scheduler_holds_exactly_past_the_last_point() {
    let envelope = AudioEnvelope::from_points(vec![(0.0, 0.4), (0.8, 0.9)]);
    let scheduler = VisemeScheduler::new(envelope, 0.35);

    assert!((scheduler.target_intensity(0.8) - 0.9).abs() < f32::EPSILON);
    assert!((scheduler.target_intensity(5.0) - 0.9).abs() < f32::EPSILON);
    assert!((scheduler.target_intensity(500.0) - 0.9).abs() < f32::EPSILON);
}

#[test]
fn scheduler_output_is_bounded_for_real_clips() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_wav(dir.path(), "speech.wav", &sine_samples(180.0, 0.8, 0.4));

    let envelope = AudioEnvelope::from_wav_file(&path, 0.8, 0.08);
    let mut scheduler = VisemeScheduler::new(envelope, 0.35);

    for tick in 0..60 {
        let elapsed = tick as f32 / 30.0;
        let value = scheduler.advance(elapsed);
        assert!((0.0..=1.0).contains(&value), "tick {tick} produced {value}");
    }
}

#[test]
fn empty_envelope_keeps_the_face_moving() {
    let scheduler = VisemeScheduler::new(AudioEnvelope::empty(), 0.35);

    let samples: Vec<f32> = (0..30)
        .map(|tick| scheduler.target_intensity(tick as f32 / 30.0))
        .collect();

    let min = samples.iter().copied().fold(f32::MAX, f32::min);
    let max = samples.iter().copied().fold(f32::MIN, f32::max);
    assert!(max - min > 0.1, "fallback must vary over a second of ticks");
}

#[test]
fn session_finishes_after_duration_plus_grace() {
    let animation = AnimationConfig::default();
    let mut session = PlaybackSession::new(
        1,
        AudioEnvelope::from_points(vec![(0.0, 0.5), (1.0, 0.0)]),
        frame_set(),
        Some(1.0),
        &animation,
        None,
        Continuation::ResumeListening,
        None,
    );

    // Inside the clip and inside the grace window: still animating
    assert_ne!(session.tick_at(0.5), Tick::Finished);
    assert_ne!(session.tick_at(1.0 + animation.grace_secs - 0.01), Tick::Finished);

    // Past the grace window: done
    assert_eq!(session.tick_at(1.0 + animation.grace_secs + 0.01), Tick::Finished);
}

#[test]
fn end_of_audio_fires_exactly_once_when_signals_race() {
    let session = PlaybackSession::new(
        1,
        AudioEnvelope::from_points(vec![(0.0, 0.5), (1.0, 0.0)]),
        frame_set(),
        Some(1.0),
        &AnimationConfig::default(),
        None,
        Continuation::ResumeListening,
        None,
    );

    // The loop owns at most one session; both the grace timeout and the
    // explicit stop signal funnel through take(), so the first wins
    let mut slot = Some(session);

    let mut continuations = 0;
    for _ in 0..2 {
        if let Some(active) = slot.take() {
            let _continuation = active.finish();
            continuations += 1;
        }
    }

    assert_eq!(continuations, 1);
}

#[test]
fn superseding_session_cleans_up_its_predecessor() {
    let animation = AnimationConfig::default();
    let file = tempfile::NamedTempFile::new().unwrap();
    let temp_path = file.path().to_path_buf();

    let first = PlaybackSession::new(
        1,
        AudioEnvelope::empty(),
        frame_set(),
        Some(10.0),
        &animation,
        None,
        Continuation::ResumeListening,
        Some(file.into_temp_path()),
    );

    let mut slot = Some(first);

    // Installing a new session tears the old one down first; its temp file
    // goes with it, but its continuation is not run
    if let Some(previous) = slot.take() {
        previous.finish();
    }
    assert!(!temp_path.exists());

    slot = Some(PlaybackSession::new(
        2,
        AudioEnvelope::empty(),
        frame_set(),
        Some(10.0),
        &animation,
        None,
        Continuation::ResumeListening,
        None,
    ));
    assert_eq!(slot.as_ref().unwrap().id(), 2);
}

#[test]
fn first_tick_always_produces_a_frame() {
    let mut session = PlaybackSession::new(
        1,
        AudioEnvelope::from_points(vec![(0.0, 0.0), (1.0, 1.0)]),
        frame_set(),
        Some(1.0),
        &AnimationConfig::default(),
        None,
        Continuation::ResumeListening,
        None,
    );

    assert!(matches!(session.tick_at(0.0), Tick::ShowFrame(_)));
}

#[test]
fn mp3_named_file_yields_fallback_envelope() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("reply.mp3");
    std::fs::write(&path, b"\xff\xfb\x90\x00fake").unwrap();

    // Envelope analysis only understands WAV; an MP3 reply animates with
    // the synthetic oscillation instead
    let envelope = AudioEnvelope::from_wav_file(&path, 2.0, 0.08);
    assert!(envelope.is_empty());
}
