//! Configuration (layered: defaults < TOML file < environment < code).

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConduitError;
use crate::progress::CorrelationMode;

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_MAX_TURNS: usize = 5;
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 5_000;
pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 30_000;
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;

/// Completions endpoint settings used by the tool loop.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CompletionsConfig {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
    pub max_turns: usize,
}

impl Default for CompletionsConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            temperature: Some(0.7),
            max_tokens: Some(1_024),
            max_turns: DEFAULT_MAX_TURNS,
        }
    }
}

/// Remote agent session settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    pub url: Option<String>,
    pub token: Option<String>,
    pub workspace: Option<String>,
    pub reconnect_delay_ms: u64,
    /// `None` retries forever.
    pub max_reconnect_attempts: Option<usize>,
    /// Fraction of the delay to randomize, 0.0 disables jitter.
    pub reconnect_jitter: f64,
    pub heartbeat_interval_ms: u64,
    pub connect_timeout_ms: u64,
    pub correlation: CorrelationMode,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            url: None,
            token: None,
            workspace: None,
            reconnect_delay_ms: DEFAULT_RECONNECT_DELAY_MS,
            max_reconnect_attempts: None,
            reconnect_jitter: 0.1,
            heartbeat_interval_ms: DEFAULT_HEARTBEAT_INTERVAL_MS,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            correlation: CorrelationMode::LastOpen,
        }
    }
}

impl SessionConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConduitConfig {
    pub completions: CompletionsConfig,
    pub session: SessionConfig,
}

impl ConduitConfig {
    /// Defaults, then the default config file if present, then environment.
    pub fn load() -> Result<Self, ConduitError> {
        let mut config = match default_config_path() {
            Some(path) if path.exists() => Self::from_file(&path)?,
            _ => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConduitError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw).map_err(|error| {
            ConduitError::Configuration(format!("{}: {error}", path.display()))
        })
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConduitError> {
        let config: Self = toml::from_str(raw)
            .map_err(|error| ConduitError::Configuration(error.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overlaid with environment variables (and `.env`, if present).
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Overlay environment variables onto this config.
    pub fn apply_env(&mut self) {
        let _ = dotenvy::dotenv();

        let completions = &mut self.completions;
        if let Some(key) = env_string(&["CONDUIT_API_KEY", "OPENAI_API_KEY"]) {
            completions.api_key = Some(key);
        }
        if let Some(url) = env_string(&["CONDUIT_BASE_URL", "OPENAI_BASE_URL"]) {
            completions.base_url = Some(url);
        }
        if let Some(model) = env_string(&["CONDUIT_MODEL"]) {
            completions.model = model;
        }
        if let Some(temperature) = env_parse::<f64>("CONDUIT_TEMPERATURE") {
            completions.temperature = Some(temperature);
        }
        if let Some(max_tokens) = env_parse::<u32>("CONDUIT_MAX_TOKENS") {
            completions.max_tokens = Some(max_tokens);
        }
        if let Some(max_turns) = env_parse::<usize>("CONDUIT_MAX_TURNS").filter(|n| *n > 0) {
            completions.max_turns = max_turns;
        }

        let session = &mut self.session;
        if let Some(url) = env_string(&["CONDUIT_SESSION_URL"]) {
            session.url = Some(url);
        }
        if let Some(token) = env_string(&["CONDUIT_SESSION_TOKEN"]) {
            session.token = Some(token);
        }
        if let Some(workspace) = env_string(&["CONDUIT_WORKSPACE"]) {
            session.workspace = Some(workspace);
        }
        if let Some(delay) = env_parse::<u64>("CONDUIT_RECONNECT_DELAY_MS") {
            session.reconnect_delay_ms = delay;
        }
        if let Some(attempts) = env_parse::<usize>("CONDUIT_MAX_RECONNECT_ATTEMPTS") {
            session.max_reconnect_attempts = Some(attempts);
        }
        if let Some(mode) = env_parse::<CorrelationMode>("CONDUIT_CORRELATION") {
            session.correlation = mode;
        }
    }

    pub fn validate(&self) -> Result<(), ConduitError> {
        if self.completions.max_turns == 0 {
            return Err(ConduitError::Configuration(
                "completions.max_turns must be at least 1".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.session.reconnect_jitter) {
            return Err(ConduitError::Configuration(
                "session.reconnect_jitter must be within 0.0..=1.0".into(),
            ));
        }
        if self.session.heartbeat_interval_ms == 0 {
            return Err(ConduitError::Configuration(
                "session.heartbeat_interval_ms must be positive".into(),
            ));
        }
        if self.session.connect_timeout_ms == 0 {
            return Err(ConduitError::Configuration(
                "session.connect_timeout_ms must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// `<config dir>/conduit/config.toml`, when a home directory is known.
pub fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "conduit")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

fn env_string(keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|key| std::env::var(key).ok())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparseable environment value");
            None
        }
    }
}
