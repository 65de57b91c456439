//! Command capture and transcription
//!
//! Records one utterance from the microphone with energy-based
//! endpointing, then transcribes it through a Whisper-compatible API.
//! "Didn't understand" and "service unreachable" are distinct failures so
//! the assistant can answer each with its own canned clip.

use std::time::Duration;

use super::capture::{AudioCapture, SAMPLE_RATE, samples_to_wav};
use crate::config::SttConfig;
use crate::{Error, Result};

/// Minimum RMS energy treated as speech while endpointing
const ENERGY_THRESHOLD: f32 = 0.03;

/// Samples of speech required for a usable utterance (0.3s)
const MIN_SPEECH_SAMPLES: usize = 4800;

/// Samples of trailing silence that end the utterance (0.5s)
const SILENCE_SAMPLES: usize = 8000;

/// How long to wait for the user to start talking
const SPEECH_WAIT: Duration = Duration::from_secs(8);

/// Hard cap on utterance length
const MAX_UTTERANCE: Duration = Duration::from_secs(12);

/// Buffer poll cadence while recording
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Response from the transcription API
#[derive(serde::Deserialize)]
struct TranscriptionResponse {
    text: String,
}

/// Captures a spoken command and turns it into text
pub struct SpeechToText {
    client: reqwest::Client,
    api_key: String,
    model: String,
    device_index: i32,
}

impl SpeechToText {
    /// Create a transcriber for the configured service
    ///
    /// # Errors
    ///
    /// Returns an error if no API key is configured.
    pub fn new(config: &SttConfig, device_index: i32) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| Error::Config("API key required for transcription".to_string()))?;

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            model: config.model.clone(),
            device_index,
        })
    }

    /// Record one utterance and transcribe it
    ///
    /// # Errors
    ///
    /// [`Error::SpeechUnrecognized`] when no usable speech was captured or
    /// the transcript came back empty; [`Error::Stt`] when the service is
    /// unreachable or rejects the request.
    #[allow(clippy::future_not_send)]
    pub async fn listen(&self) -> Result<String> {
        let samples = self.record_utterance().await?;
        let wav = samples_to_wav(&samples, SAMPLE_RATE)?;
        self.transcribe(&wav).await
    }

    /// Record from the microphone until the utterance ends
    #[allow(clippy::future_not_send)]
    async fn record_utterance(&self) -> Result<Vec<f32>> {
        let mut capture = AudioCapture::new(self.device_index);
        capture.start()?;

        let mut utterance: Vec<f32> = Vec::new();
        let mut speech_samples = 0usize;
        let mut silence_samples = 0usize;
        let mut speech_started = false;
        let started = std::time::Instant::now();

        loop {
            tokio::time::sleep(POLL_INTERVAL).await;
            let chunk = capture.take_buffer();
            if chunk.is_empty() {
                if started.elapsed() > SPEECH_WAIT && !speech_started {
                    break;
                }
                continue;
            }

            let is_speech = rms(&chunk) > ENERGY_THRESHOLD;
            if is_speech {
                speech_started = true;
                speech_samples += chunk.len();
                silence_samples = 0;
            } else if speech_started {
                silence_samples += chunk.len();
            }

            if speech_started {
                utterance.extend_from_slice(&chunk);
            }

            if speech_started
                && silence_samples > SILENCE_SAMPLES
                && speech_samples > MIN_SPEECH_SAMPLES
            {
                break;
            }
            if !speech_started && started.elapsed() > SPEECH_WAIT {
                break;
            }
            if started.elapsed() > MAX_UTTERANCE {
                break;
            }
        }

        capture.stop();

        if speech_samples < MIN_SPEECH_SAMPLES {
            tracing::debug!(speech_samples, "no usable speech captured");
            return Err(Error::SpeechUnrecognized);
        }

        tracing::debug!(samples = utterance.len(), "utterance recorded");
        Ok(utterance)
    }

    /// Transcribe WAV bytes through the service
    async fn transcribe(&self, wav: &[u8]) -> Result<String> {
        tracing::debug!(audio_bytes = wav.len(), "starting transcription");

        let form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(wav.to_vec())
                    .file_name("audio.wav")
                    .mime_str("audio/wav")
                    .map_err(|e| Error::Stt(e.to_string()))?,
            )
            .text("model", self.model.clone());

        let response = self
            .client
            .post("https://api.openai.com/v1/audio/transcriptions")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .multipart(form)
            .send()
            .await
            .map_err(|e| Error::Stt(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "transcription API error");
            return Err(Error::Stt(format!("transcription error {status}: {body}")));
        }

        let result: TranscriptionResponse = response
            .json()
            .await
            .map_err(|e| Error::Stt(e.to_string()))?;

        let text = result.text.trim().to_string();
        if text.is_empty() {
            return Err(Error::SpeechUnrecognized);
        }

        tracing::info!(transcript = %text, "transcription complete");
        Ok(text)
    }
}

/// RMS energy of f32 samples
#[allow(clippy::cast_precision_loss)]
fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_api_key_is_a_config_error() {
        let config = SttConfig {
            api_key: None,
            model: "whisper-1".to_string(),
        };
        assert!(SpeechToText::new(&config, 0).is_err());

        let config = SttConfig {
            api_key: Some(String::new()),
            model: "whisper-1".to_string(),
        };
        assert!(SpeechToText::new(&config, 0).is_err());
    }

    #[test]
    fn rms_distinguishes_speech_from_silence() {
        assert!(rms(&vec![0.0f32; 100]) < ENERGY_THRESHOLD);
        assert!(rms(&vec![0.3f32; 100]) > ENERGY_THRESHOLD);
    }

    #[test]
    fn transcription_response_parses() {
        let parsed: TranscriptionResponse =
            serde_json::from_str(r#"{"text": "play something upbeat"}"#).unwrap();
        assert_eq!(parsed.text, "play something upbeat");
    }
}
