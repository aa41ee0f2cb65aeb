use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

// ============================================================================
// Top-level config
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RillConfig {
    pub stream: StreamConfig,
    pub http: HttpConfig,
    pub output: OutputConfig,
    pub run: RunConfig,
}

impl RillConfig {
    /// Load config from a TOML file, falling back to defaults for missing fields.
    /// After loading, env var overrides are applied.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;
        let mut config: RillConfig =
            toml::from_str(&content).with_context(|| "Failed to parse TOML config")?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Try to load from path; if the file doesn't exist, return defaults with env overrides.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::load(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::info!("Config file not found or invalid ({}), using defaults", e);
                let mut cfg = Self::default();
                cfg.apply_env_overrides();
                cfg
            }
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("RILL_URL") {
            self.http.url = Some(v);
        }
        if let Ok(v) = std::env::var("RILL_OUTPUT") {
            self.output.path = Some(PathBuf::from(v));
        }
        if let Ok(v) = std::env::var("RILL_SKIP_EMPTY") {
            self.stream.skip_empty_events = v == "true" || v == "1";
        }
        if let Ok(v) = std::env::var("RILL_MAX_PENDING_BYTES") {
            if let Ok(n) = v.parse() {
                self.stream.max_pending_bytes = Some(n);
            }
        }
        if let Ok(v) = std::env::var("RILL_DURATION_SECS") {
            if let Ok(n) = v.parse() {
                self.run.duration_secs = Some(n);
            }
        }
    }
}

// ============================================================================
// Sub-configs
// ============================================================================

/// Parsing policy for one stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Drop events with no text (two delimiters in a row) instead of delivering them.
    pub skip_empty_events: bool,
    /// Fail the stream if this many bytes accumulate without a delimiter.
    pub max_pending_bytes: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub url: Option<String>,
    pub accept: String,
    pub headers: BTreeMap<String, String>,
    pub connect_timeout_secs: Option<u64>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            url: None,
            accept: "text/event-stream".to_string(),
            headers: BTreeMap::new(),
            connect_timeout_secs: Some(10),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// File that parsed events are appended to.
    pub path: Option<PathBuf>,
    pub format: OutputFormat,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    /// The event text followed by a newline.
    #[default]
    Raw,
    /// One `{"seq":n,"event":"..."}` object per line.
    Json,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Cancel the stream after this many seconds.
    pub duration_secs: Option<u64>,
}

// ============================================================================
// Tests
// ============================================================================
