//! Tests for configuration layering.

use std::sync::{Mutex, OnceLock};

use conduit::agent_loop::LoopSettings;
use conduit::config::{ConduitConfig, DEFAULT_MODEL};
use conduit::error::ConduitError;
use conduit::progress::CorrelationMode;
use pretty_assertions::assert_eq;

static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

const CONFIG_ENV_VARS: [&str; 14] = [
    "CONDUIT_API_KEY",
    "OPENAI_API_KEY",
    "CONDUIT_BASE_URL",
    "OPENAI_BASE_URL",
    "CONDUIT_MODEL",
    "CONDUIT_TEMPERATURE",
    "CONDUIT_MAX_TOKENS",
    "CONDUIT_MAX_TURNS",
    "CONDUIT_SESSION_URL",
    "CONDUIT_SESSION_TOKEN",
    "CONDUIT_WORKSPACE",
    "CONDUIT_RECONNECT_DELAY_MS",
    "CONDUIT_MAX_RECONNECT_ATTEMPTS",
    "CONDUIT_CORRELATION",
];

struct EnvGuard {
    saved: Vec<(String, Option<String>)>,
}

impl EnvGuard {
    fn capture(keys: &[&str]) -> Self {
        let saved = keys
            .iter()
            .map(|key| ((*key).to_string(), std::env::var(key).ok()))
            .collect();
        Self { saved }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, value) in &self.saved {
            match value {
                Some(v) => std::env::set_var(key, v),
                None => std::env::remove_var(key),
            }
        }
    }
}

fn env_lock_guard() -> std::sync::MutexGuard<'static, ()> {
    ENV_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn clear_env() {
    for key in CONFIG_ENV_VARS {
        std::env::remove_var(key);
    }
}

#[test]
fn file_values_load_from_disk() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
        [completions]
        model = "gpt-4.1-mini"
        max_turns = 8
        temperature = 0.1

        [session]
        url = "wss://agent.example/ws"
        reconnect_delay_ms = 2000
        max_reconnect_attempts = 10
        reconnect_jitter = 0.25
        "#,
    )
    .expect("write config");

    let config = ConduitConfig::from_file(&path).expect("config should parse");
    assert_eq!(config.completions.model, "gpt-4.1-mini");
    assert_eq!(config.completions.max_turns, 8);
    assert_eq!(config.completions.temperature, Some(0.1));
    assert_eq!(config.session.reconnect_delay_ms, 2000);
    assert_eq!(config.session.max_reconnect_attempts, Some(10));
    assert_eq!(config.session.reconnect_jitter, 0.25);
}

#[test]
fn invalid_file_reports_its_path() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("broken.toml");
    std::fs::write(&path, "[session]\nreconnect_jitter = 3.0\n").expect("write config");

    let err = ConduitConfig::from_file(&path).unwrap_err();
    match err {
        ConduitError::Configuration(message) => assert!(message.contains("broken.toml")),
        other => panic!("expected Configuration, got {other:?}"),
    }
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let err = ConduitConfig::from_file(&dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, ConduitError::Io(_)));
}

#[test]
fn environment_overrides_file_values() {
    let _lock = env_lock_guard();
    let _guard = EnvGuard::capture(&CONFIG_ENV_VARS);
    clear_env();

    std::env::set_var("OPENAI_API_KEY", "sk-openai");
    std::env::set_var("CONDUIT_API_KEY", "sk-conduit");
    std::env::set_var("CONDUIT_MODEL", "gpt-4o");
    std::env::set_var("CONDUIT_MAX_TURNS", "2");
    std::env::set_var("CONDUIT_SESSION_URL", "ws://localhost:9000/ws");
    std::env::set_var("CONDUIT_CORRELATION", "strict");
    std::env::set_var("CONDUIT_RECONNECT_DELAY_MS", "not-a-number");

    let mut config =
        ConduitConfig::from_toml_str("[completions]\nmodel = \"from-file\"\n").expect("parse");
    config.apply_env();

    assert_eq!(config.completions.api_key.as_deref(), Some("sk-conduit"));
    assert_eq!(config.completions.model, "gpt-4o");
    assert_eq!(config.completions.max_turns, 2);
    assert_eq!(config.session.url.as_deref(), Some("ws://localhost:9000/ws"));
    assert_eq!(config.session.correlation, CorrelationMode::Strict);
    // Unparseable values are ignored.
    assert_eq!(config.session.reconnect_delay_ms, 5_000);
}

#[test]
fn openai_variables_are_accepted_as_fallbacks() {
    let _lock = env_lock_guard();
    let _guard = EnvGuard::capture(&CONFIG_ENV_VARS);
    clear_env();

    std::env::set_var("OPENAI_API_KEY", "sk-openai");
    std::env::set_var("OPENAI_BASE_URL", "http://localhost:11434/v1");

    let config = ConduitConfig::from_env();
    assert_eq!(config.completions.api_key.as_deref(), Some("sk-openai"));
    assert_eq!(
        config.completions.base_url.as_deref(),
        Some("http://localhost:11434/v1")
    );
    assert_eq!(config.completions.model, DEFAULT_MODEL);
}

#[test]
fn loop_settings_follow_completions_config() {
    let config = ConduitConfig::from_toml_str(
        "[completions]\nmodel = \"gpt-4.1\"\nmax_turns = 4\nmax_tokens = 300\n",
    )
    .expect("parse");
    let settings = LoopSettings::from(&config.completions);
    assert_eq!(settings.model, "gpt-4.1");
    assert_eq!(settings.max_turns, 4);
    assert_eq!(settings.max_tokens, Some(300));
}
