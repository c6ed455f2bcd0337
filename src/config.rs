use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context as _;

use crate::export::ExportTimings;
use crate::foundation::core::{Canvas, Fps, Rgba8};
use crate::foundation::error::{ReelError, ReelResult};
use crate::narration::PcmFormat;

/// Environment variable overriding [`ServiceConfig::url`] of the synthesizer.
pub const ENV_SYNTH_URL: &str = "SKETCHREEL_SYNTH_URL";
/// Environment variable overriding [`ServiceConfig::url`] of the planner.
pub const ENV_PLANNER_URL: &str = "SKETCHREEL_PLANNER_URL";
/// Environment variable providing the API key for both services.
pub const ENV_API_KEY: &str = "SKETCHREEL_API_KEY";

/// Endpoint settings for one HTTP service.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServiceConfig {
    /// Full endpoint URL; `None` disables the HTTP client.
    pub url: Option<String>,
    /// Sent as a bearer token when present.
    pub api_key: Option<String>,
    /// Request timeout.
    #[serde(with = "duration_ms", rename = "timeout_ms")]
    pub timeout: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            url: None,
            api_key: None,
            timeout: Duration::from_secs(60),
        }
    }
}

/// Runtime configuration.
///
/// Every field has a default, so an empty JSON object (or no file at all) is a valid config.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub canvas: Canvas,
    pub fps: Fps,
    /// Stage background, `#rrggbb`; must be opaque.
    pub background: String,
    /// Delay between consecutive draw commands.
    #[serde(with = "duration_ms", rename = "stagger_ms")]
    pub stagger: Duration,
    /// Quiet period after a step change before the next step's narration is prefetched.
    #[serde(with = "duration_ms", rename = "prefetch_debounce_ms")]
    pub prefetch_debounce: Duration,
    /// Layout of raw PCM returned by the synthesizer.
    pub pcm: PcmFormat,
    /// Consecutive rate limits that trip the sticky quota breaker.
    pub quota_breaker_threshold: u32,
    pub export: ExportTimings,
    pub synth: ServiceConfig,
    pub planner: ServiceConfig,
    /// Extra directories scanned for `.ttf`/`.otf`/`.ttc` fonts.
    pub font_dirs: Vec<PathBuf>,
    /// Query history file; `None` disables history.
    pub history_path: Option<PathBuf>,
    pub history_cap: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            canvas: Canvas {
                width: 1280,
                height: 720,
            },
            fps: Fps { num: 30, den: 1 },
            background: "#ffffff".to_owned(),
            stagger: Duration::from_millis(200),
            prefetch_debounce: Duration::from_millis(1500),
            pcm: PcmFormat::default(),
            quota_breaker_threshold: 2,
            export: ExportTimings::default(),
            synth: ServiceConfig::default(),
            planner: ServiceConfig::default(),
            font_dirs: Vec::new(),
            history_path: None,
            history_cap: 20,
        }
    }
}

impl Config {
    /// Load from an optional JSON file, apply environment overrides, then validate.
    pub fn load(path: Option<&Path>) -> ReelResult<Self> {
        let mut cfg = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("read config '{}'", path.display()))?;
                Self::from_json_str(&text)?
            }
            None => Self::default(),
        };
        cfg.apply_env(|key| std::env::var(key).ok());
        cfg.validate()?;
        Ok(cfg)
    }

    /// Parse JSON without validating.
    pub fn from_json_str(text: &str) -> ReelResult<Self> {
        serde_json::from_str(text)
            .map_err(|e| ReelError::validation(format!("invalid config json: {e}")))
    }

    /// Apply `SKETCHREEL_*` overrides using `lookup` to read variables.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(url) = non_empty(ENV_SYNTH_URL) {
            self.synth.url = Some(url);
        }
        if let Some(url) = non_empty(ENV_PLANNER_URL) {
            self.planner.url = Some(url);
        }
        if let Some(key) = non_empty(ENV_API_KEY) {
            self.synth.api_key.get_or_insert_with(|| key.clone());
            self.planner.api_key.get_or_insert(key);
        }
    }

    /// Parsed, opaque background color.
    pub fn background_color(&self) -> ReelResult<Rgba8> {
        let c = Rgba8::parse(&self.background)?;
        if c.a != 255 {
            return Err(ReelError::validation(format!(
                "background '{}' must be opaque",
                self.background
            )));
        }
        Ok(c)
    }

    pub fn validate(&self) -> ReelResult<()> {
        self.canvas.validate()?;
        if self.canvas.width % 2 != 0 || self.canvas.height % 2 != 0 {
            return Err(ReelError::validation(format!(
                "canvas {}x{} must have even dimensions for yuv420p video",
                self.canvas.width, self.canvas.height
            )));
        }
        Fps::new(self.fps.num, self.fps.den)?;
        if self.fps.as_f64() > 240.0 {
            return Err(ReelError::validation("fps must be <= 240"));
        }
        self.background_color()?;
        self.pcm.validate()?;
        if self.quota_breaker_threshold == 0 {
            return Err(ReelError::validation("quota_breaker_threshold must be >= 1"));
        }
        if self.stagger > Duration::from_secs(10) {
            return Err(ReelError::validation("stagger_ms must be <= 10000"));
        }
        self.export.validate()?;
        if self.history_cap == 0 {
            return Err(ReelError::validation("history_cap must be >= 1"));
        }
        Ok(())
    }
}

/// Serde adapter storing a [`Duration`] as whole milliseconds.
pub(crate) mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub(crate) fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }

    pub(crate) fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

#[cfg(test)]
#[path = "../tests/unit/config.rs"]
mod tests;
