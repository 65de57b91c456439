//! Configuration management for the Beamo device
//!
//! Configuration is layered: built-in defaults, then an optional
//! `config.toml` in the XDG config directory, then environment variables.
//! Timing constants for the animation engine live in [`AnimationConfig`] so
//! they are tunable without a rebuild.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::Result;

/// Default wake phrase when no custom keyword model is configured
const DEFAULT_KEYWORD: &str = "bumblebee";

/// Beamo device configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding idle face and viseme frame images
    pub faces_dir: PathBuf,

    /// Directory holding canned response clips
    pub responses_dir: PathBuf,

    /// Wake word listener configuration
    pub wake: WakeConfig,

    /// Speech-to-text configuration
    pub stt: SttConfig,

    /// Speech synthesis configuration
    pub tts: TtsConfig,

    /// Command router configuration
    pub router: RouterConfig,

    /// Animation timing configuration
    pub animation: AnimationConfig,
}

/// Wake word listener configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WakeConfig {
    /// Which microphone to open for wake word frames
    pub device_index: i32,

    /// Detector access credential, if the detector backend needs one
    pub access_key: Option<String>,

    /// Path to a custom keyword model; takes precedence over `keyword`
    pub keyword_path: Option<PathBuf>,

    /// Built-in wake phrase used when no keyword model is given
    pub keyword: Option<String>,
}

impl WakeConfig {
    /// The effective wake phrase
    #[must_use]
    pub fn keyword(&self) -> &str {
        self.keyword.as_deref().unwrap_or(DEFAULT_KEYWORD)
    }
}

/// Speech-to-text configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SttConfig {
    /// API key for the transcription service
    pub api_key: Option<String>,

    /// Transcription model identifier
    pub model: String,
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "whisper-1".to_string(),
        }
    }
}

/// Speech synthesis configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TtsConfig {
    /// API key for the synthesis service
    pub api_key: Option<String>,

    /// Synthesis API base URL
    pub base_url: String,

    /// Synthesis model identifier
    pub model: String,

    /// Optional speaker/voice identifier
    pub speaker_id: Option<String>,

    /// Per-request timeout in seconds
    pub timeout_secs: u64,

    /// Total attempts before a synthesis request is declared failed
    pub retries: u32,

    /// Fixed delay between attempts, in seconds
    pub retry_delay_secs: u64,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.fish.audio/v1".to_string(),
            model: "gpt_sovits".to_string(),
            speaker_id: None,
            timeout_secs: 30,
            retries: 3,
            retry_delay_secs: 1,
        }
    }
}

impl TtsConfig {
    /// Per-request timeout
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Delay between retry attempts
    #[must_use]
    pub const fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }
}

/// Command router configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// LLM model identifier
    pub model: String,

    /// Ollama-compatible chat endpoint base URL
    pub base_url: String,

    /// Persona system prompt for non-tool replies
    pub persona_prompt: String,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            model: "llama3.1".to_string(),
            base_url: "http://localhost:11434".to_string(),
            persona_prompt: "You are Beamo, a playful handheld companion. \
                             Keep replies concise and in-character while being helpful."
                .to_string(),
        }
    }
}

/// Animation timing configuration
///
/// Defaults preserve the tuned behavior of the animation engine; change
/// them only with a reason.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct AnimationConfig {
    /// Envelope analysis window, in seconds of audio
    pub window_secs: f32,

    /// Exponential smoothing factor applied to intensity each tick
    pub smoothing: f32,

    /// Grace period past the declared clip duration before end-of-audio
    pub grace_secs: f32,

    /// Animation tick rate in Hz
    pub tick_hz: u32,
}

impl Default for AnimationConfig {
    fn default() -> Self {
        Self {
            window_secs: 0.08,
            smoothing: 0.35,
            grace_secs: 0.25,
            tick_hz: 30,
        }
    }
}

impl AnimationConfig {
    /// Interval between animation ticks
    #[must_use]
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.tick_hz.max(1)))
    }
}

/// Canned response clips, resolved against the responses directory
#[derive(Debug, Clone)]
pub struct Responses {
    /// Played during power-up, before command handling is enabled
    pub startup: PathBuf,

    /// Played during power-down, before the process exits
    pub farewell: PathBuf,

    /// Played when captured speech could not be understood
    pub unrecognized: PathBuf,

    /// Played when the router or synthesis service failed
    pub failure: PathBuf,
}

impl Responses {
    /// Resolve the standard clip names inside `dir`
    #[must_use]
    pub fn in_dir(dir: &std::path::Path) -> Self {
        Self {
            startup: dir.join("startup.mp3"),
            farewell: dir.join("goodnight.wav"),
            unrecognized: dir.join("unknown-value-error.wav"),
            failure: dir.join("fatal-error.wav"),
        }
    }
}

/// Optional file-based configuration (`config.toml`)
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    faces_dir: Option<PathBuf>,
    responses_dir: Option<PathBuf>,
    wake: Option<WakeConfig>,
    stt: Option<SttConfig>,
    tts: Option<TtsConfig>,
    router: Option<RouterConfig>,
    animation: Option<AnimationConfig>,
}

/// Return the XDG config directory for Beamo
///
/// Uses `~/.config/beamo/` on Linux
#[must_use]
pub fn config_dir() -> PathBuf {
    directories::ProjectDirs::from("dev", "beamo", "beamo")
        .map_or_else(|| PathBuf::from(".beamo"), |d| d.config_dir().to_path_buf())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            faces_dir: PathBuf::from("./faces"),
            responses_dir: PathBuf::from("./responses"),
            wake: WakeConfig::default(),
            stt: SttConfig::default(),
            tts: TtsConfig::default(),
            router: RouterConfig::default(),
            animation: AnimationConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration: defaults, then `config.toml`, then environment
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be parsed.
    pub fn load() -> Result<Self> {
        let mut config = Self::default();

        let file_path = config_dir().join("config.toml");
        if file_path.exists() {
            let content = std::fs::read_to_string(&file_path)?;
            let file: FileConfig = toml::from_str(&content)?;
            tracing::info!(path = %file_path.display(), "loaded config file");
            config.apply_file(file);
        }

        config.apply_env();
        Ok(config)
    }

    /// Merge file-level overrides
    fn apply_file(&mut self, file: FileConfig) {
        if let Some(dir) = file.faces_dir {
            self.faces_dir = dir;
        }
        if let Some(dir) = file.responses_dir {
            self.responses_dir = dir;
        }
        if let Some(wake) = file.wake {
            self.wake = wake;
        }
        if let Some(stt) = file.stt {
            self.stt = stt;
        }
        if let Some(tts) = file.tts {
            self.tts = tts;
        }
        if let Some(router) = file.router {
            self.router = router;
        }
        if let Some(animation) = file.animation {
            self.animation = animation;
        }
    }

    /// Merge environment-variable overrides
    fn apply_env(&mut self) {
        if let Some(dir) = std::env::var_os("BEAMO_FACES_DIR") {
            self.faces_dir = PathBuf::from(dir);
        }
        if let Some(dir) = std::env::var_os("BEAMO_RESPONSES_DIR") {
            self.responses_dir = PathBuf::from(dir);
        }
        if let Some(index) = std::env::var("BEAMO_DEVICE_INDEX")
            .ok()
            .and_then(|s| s.parse().ok())
        {
            self.wake.device_index = index;
        }
        if let Ok(key) = std::env::var("BEAMO_ACCESS_KEY") {
            self.wake.access_key = Some(key);
        }
        if let Some(path) = std::env::var_os("BEAMO_KEYWORD_PATH") {
            self.wake.keyword_path = Some(PathBuf::from(path));
        }
        if let Ok(keyword) = std::env::var("BEAMO_KEYWORD") {
            self.wake.keyword = Some(keyword);
        }
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            self.stt.api_key = Some(key);
        }
        if let Ok(model) = std::env::var("BEAMO_STT_MODEL") {
            self.stt.model = model;
        }
        if let Ok(key) = std::env::var("FISH_AUDIO_API_KEY") {
            self.tts.api_key = Some(key);
        }
        if let Ok(url) = std::env::var("FISH_AUDIO_BASE_URL") {
            self.tts.base_url = url;
        }
        if let Ok(model) = std::env::var("FISH_AUDIO_MODEL") {
            self.tts.model = model;
        }
        if let Ok(speaker) = std::env::var("FISH_AUDIO_SPEAKER_ID") {
            self.tts.speaker_id = Some(speaker);
        }
        if let Ok(model) = std::env::var("OLLAMA_MODEL") {
            self.router.model = model;
        }
        if let Ok(host) = std::env::var("OLLAMA_HOST") {
            self.router.base_url = host;
        }
    }

    /// Canned response clip paths for this configuration
    #[must_use]
    pub fn responses(&self) -> Responses {
        Responses::in_dir(&self.responses_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn animation_defaults_match_tuned_values() {
        let animation = AnimationConfig::default();
        assert!((animation.window_secs - 0.08).abs() < f32::EPSILON);
        assert!((animation.smoothing - 0.35).abs() < f32::EPSILON);
        assert!((animation.grace_secs - 0.25).abs() < f32::EPSILON);
        assert_eq!(animation.tick_hz, 30);
    }

    #[test]
    fn tick_interval_is_one_thirtieth() {
        let animation = AnimationConfig::default();
        let interval = animation.tick_interval();
        assert!((interval.as_secs_f64() - 1.0 / 30.0).abs() < 1e-9);
    }

    #[test]
    fn tts_defaults_bound_retries() {
        let tts = TtsConfig::default();
        assert_eq!(tts.retries, 3);
        assert_eq!(tts.retry_delay(), Duration::from_secs(1));
        assert_eq!(tts.timeout(), Duration::from_secs(30));
    }

    #[test]
    fn responses_resolve_standard_names() {
        let responses = Responses::in_dir(std::path::Path::new("/srv/clips"));
        assert_eq!(responses.startup, PathBuf::from("/srv/clips/startup.mp3"));
        assert_eq!(responses.failure, PathBuf::from("/srv/clips/fatal-error.wav"));
    }

    #[test]
    fn file_config_parses_partial_sections() {
        let file: FileConfig = toml::from_str(
            r#"
            faces_dir = "/data/faces"

            [animation]
            smoothing = 0.5

            [wake]
            device_index = 2
            keyword = "beamo"
            "#,
        )
        .unwrap();

        let mut config = Config::default();
        config.apply_file(file);

        assert_eq!(config.faces_dir, PathBuf::from("/data/faces"));
        assert!((config.animation.smoothing - 0.5).abs() < f32::EPSILON);
        assert_eq!(config.wake.device_index, 2);
        assert_eq!(config.wake.keyword(), "beamo");
    }

    #[test]
    fn default_keyword_when_unset() {
        let wake = WakeConfig::default();
        assert_eq!(wake.keyword(), "bumblebee");
    }
}
