//! Speech synthesis client
//!
//! Exchanges reply text for a synthesized audio clip on disk. Requests are
//! retried a bounded number of times with a fixed delay; the final failure
//! is fatal for that utterance only, never for the process. The returned
//! [`TempPath`] deletes the file when dropped, so scratch audio can never
//! outlive its playback session.

use std::io::Write;

use tempfile::TempPath;

use crate::config::TtsConfig;
use crate::{Error, Result};

/// Synthesis request payload
#[derive(serde::Serialize)]
struct SynthesisRequest<'a> {
    text: &'a str,
    model: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    speaker_id: Option<&'a str>,
}

/// Synthesizes speech through a Fish-Audio-compatible endpoint
pub struct SpeechSynthesizer {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    speaker_id: Option<String>,
    retries: u32,
    retry_delay: std::time::Duration,
}

impl SpeechSynthesizer {
    /// Create a synthesizer for the configured service
    ///
    /// # Errors
    ///
    /// Returns an error if no API key is configured or the HTTP client
    /// cannot be built.
    pub fn new(config: &TtsConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| Error::Config("API key required for speech synthesis".to_string()))?;

        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| Error::Tts(e.to_string()))?;

        Ok(Self {
            client,
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            speaker_id: config.speaker_id.clone(),
            retries: config.retries.max(1),
            retry_delay: config.retry_delay(),
        })
    }

    /// Synthesize `text` into a temporary audio file
    ///
    /// The caller owns the returned [`TempPath`]; dropping it removes the
    /// file.
    ///
    /// # Errors
    ///
    /// Returns the last error after the configured attempts are exhausted.
    pub async fn synthesize_to_file(&self, text: &str) -> Result<TempPath> {
        let mut last_error: Option<Error> = None;

        for attempt in 1..=self.retries {
            match self.request(text).await {
                Ok((audio, content_type)) => {
                    return write_temp_file(&audio, content_type.as_deref());
                }
                Err(e) => {
                    tracing::warn!(
                        attempt,
                        retries = self.retries,
                        error = %e,
                        "synthesis attempt failed"
                    );
                    last_error = Some(e);
                    if attempt < self.retries {
                        tokio::time::sleep(self.retry_delay).await;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| Error::Tts("synthesis failed".to_string())))
    }

    /// One synthesis request; returns the audio bytes and content type
    async fn request(&self, text: &str) -> Result<(Vec<u8>, Option<String>)> {
        let request = SynthesisRequest {
            text,
            model: &self.model,
            speaker_id: self.speaker_id.as_deref(),
        };

        let response = self
            .client
            .post(format!("{}/tts", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Tts(format!("synthesis error {status}: {body}")));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string);

        let audio = response.bytes().await?;
        tracing::debug!(bytes = audio.len(), "synthesis complete");
        Ok((audio.to_vec(), content_type))
    }
}

/// Write audio bytes to a temp file whose suffix matches the content type
fn write_temp_file(audio: &[u8], content_type: Option<&str>) -> Result<TempPath> {
    let mut file = tempfile::Builder::new()
        .prefix("beamo-reply-")
        .suffix(infer_extension(content_type))
        .tempfile()?;
    file.write_all(audio)?;
    file.flush()?;
    Ok(file.into_temp_path())
}

/// Map a response content type onto a file extension
fn infer_extension(content_type: Option<&str>) -> &'static str {
    let Some(content_type) = content_type else {
        return ".wav";
    };
    if content_type.contains("wav") {
        ".wav"
    } else if content_type.contains("mpeg") || content_type.contains("mp3") {
        ".mp3"
    } else if content_type.contains("ogg") {
        ".ogg"
    } else {
        ".wav"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_follows_content_type() {
        assert_eq!(infer_extension(Some("audio/wav")), ".wav");
        assert_eq!(infer_extension(Some("audio/x-wav")), ".wav");
        assert_eq!(infer_extension(Some("audio/mpeg")), ".mp3");
        assert_eq!(infer_extension(Some("audio/mp3")), ".mp3");
        assert_eq!(infer_extension(Some("audio/ogg")), ".ogg");
        assert_eq!(infer_extension(Some("application/octet-stream")), ".wav");
        assert_eq!(infer_extension(None), ".wav");
    }

    #[test]
    fn temp_file_carries_audio_bytes() {
        let temp = write_temp_file(b"fake audio", Some("audio/mpeg")).unwrap();
        assert!(temp.to_string_lossy().ends_with(".mp3"));
        assert_eq!(std::fs::read(&temp).unwrap(), b"fake audio");

        let path = temp.to_path_buf();
        drop(temp);
        assert!(!path.exists());
    }

    #[test]
    fn missing_api_key_is_a_config_error() {
        let config = TtsConfig {
            api_key: None,
            ..TtsConfig::default()
        };
        assert!(SpeechSynthesizer::new(&config).is_err());
    }

    #[test]
    fn speaker_id_is_omitted_when_unset() {
        let request = SynthesisRequest {
            text: "hello",
            model: "gpt_sovits",
            speaker_id: None,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("speaker_id").is_none());
        assert_eq!(json["text"], "hello");
    }
}
