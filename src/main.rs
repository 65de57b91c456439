use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use beamo::voice::{AudioCapture, AudioSink, LoadedClip, SpeechSynthesizer};
use beamo::{Assistant, AudioEnvelope, Config, LogRenderer};

/// Beamo - voice-driven companion device
#[derive(Parser)]
#[command(name = "beamo", version, about)]
struct Cli {
    /// Directory holding face images
    #[arg(long, env = "BEAMO_FACES_DIR")]
    faces_dir: Option<PathBuf>,

    /// Microphone device index
    #[arg(short, long, env = "BEAMO_DEVICE_INDEX")]
    device_index: Option<i32>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
#[allow(clippy::enum_variant_names)]
enum Command {
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Test speaker output
    TestSpeaker,
    /// Analyze a WAV file and print its animation envelope
    TestEnvelope {
        /// Path to the WAV file
        file: PathBuf,
    },
    /// Test TTS output
    TestTts {
        /// Text to speak
        #[arg(default_value = "Hello! This is a test of the text to speech system.")]
        text: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,beamo=info",
        1 => "info,beamo=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::future_not_send)]
async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load()?;
    if let Some(faces_dir) = cli.faces_dir {
        config.faces_dir = faces_dir;
    }
    if let Some(device_index) = cli.device_index {
        config.wake.device_index = device_index;
    }

    if let Some(cmd) = cli.command {
        return match cmd {
            Command::TestMic { duration } => test_mic(&config, duration).await,
            Command::TestSpeaker => test_speaker().await,
            Command::TestEnvelope { file } => test_envelope(&config, &file),
            Command::TestTts { text } => test_tts(&config, &text).await,
        };
    }

    tracing::info!(
        faces_dir = %config.faces_dir.display(),
        device_index = config.wake.device_index,
        "starting beamo"
    );

    let assistant = Assistant::new(config, Box::new(LogRenderer::default()))?;
    assistant.run().await?;

    Ok(())
}

/// Test microphone input
#[allow(clippy::future_not_send)]
async fn test_mic(config: &Config, duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let mut capture = AudioCapture::new(config.wake.device_index);
    capture.start()?;
    println!("---");

    for i in 0..duration {
        tokio::time::sleep(Duration::from_secs(1)).await;

        let samples = capture.peek_buffer();
        let energy = calculate_rms(&samples);
        let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);

        // Visual meter
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (energy * 100.0).min(50.0) as usize;
        let meter: String = "█".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!(
            "[{:2}s] RMS: {:.4} | Peak: {:.4} | [{}]",
            i + 1,
            energy,
            peak,
            meter
        );

        capture.clear_buffer();
    }

    capture.stop();

    println!("\n---");
    println!("If you saw movement in the meter, your mic is working!");
    println!("If RMS stayed near 0, check:");
    println!("  1. Is your mic plugged in?");
    println!("  2. Run: pactl info | grep 'Default Source'");
    println!("  3. Run: arecord -l (to list devices)");

    Ok(())
}

/// Calculate RMS energy
#[allow(clippy::cast_precision_loss)]
fn calculate_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

/// Test speaker output with a sine wave
async fn test_speaker() -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let (done_tx, mut done_rx) = tokio::sync::mpsc::channel(1);
    let sink = AudioSink::new(done_tx)?;

    // 2 seconds of 440Hz sine at 24kHz, 30% volume
    let sample_rate = 24000u32;
    #[allow(clippy::cast_precision_loss)]
    let samples: Vec<f32> = (0..sample_rate * 2)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            (std::f32::consts::TAU * 440.0 * t).sin() * 0.3
        })
        .collect();

    println!("Playing {} samples at {sample_rate} Hz...", samples.len());
    let _handle = sink.play(LoadedClip::from_samples(samples, sample_rate), 1);
    let _ = done_rx.recv().await;

    println!("\n---");
    println!("If you heard the tone, your speakers are working!");
    println!("If you didn't hear anything, check:");
    println!("  1. Run: pactl info | grep 'Default Sink'");
    println!("  2. Try: pavucontrol (to check output levels)");

    Ok(())
}

/// Analyze a WAV file and print its envelope as a meter
fn test_envelope(config: &Config, file: &std::path::Path) -> anyhow::Result<()> {
    let clip = LoadedClip::load(file)?;
    let duration = clip.duration();
    println!(
        "{}: {:.2}s at {} Hz",
        file.display(),
        duration,
        clip.sample_rate()
    );

    let envelope = AudioEnvelope::from_wav_file(file, duration, config.animation.window_secs);
    if envelope.is_empty() {
        println!("No envelope extracted (not a WAV?); playback would use the fallback oscillation.");
        return Ok(());
    }

    println!("---");
    for point in envelope.points() {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (point.intensity * 50.0).min(50.0) as usize;
        let meter: String = "█".repeat(meter_len);
        println!("[{:6.2}s] {:.3} | {}", point.time, point.intensity, meter);
    }

    Ok(())
}

/// Test TTS output
async fn test_tts(config: &Config, text: &str) -> anyhow::Result<()> {
    println!("Testing TTS with text: \"{text}\"\n");

    let synthesizer = SpeechSynthesizer::new(&config.tts)?;

    println!("Synthesizing speech...");
    let temp = synthesizer.synthesize_to_file(text).await?;
    let clip = LoadedClip::load(&temp)?;
    println!("Got {:.2}s of audio", clip.duration());

    println!("Playing audio...");
    let (done_tx, mut done_rx) = tokio::sync::mpsc::channel(1);
    let sink = AudioSink::new(done_tx)?;
    let _handle = sink.play(clip, 1);
    let _ = done_rx.recv().await;

    println!("\n---");
    println!("If you heard the speech, TTS is working!");

    Ok(())
}
