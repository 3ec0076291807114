//! Application-level configuration loading for the live session backend.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "QUIZ_LIVE_BACK_CONFIG_PATH";

/// Bound on collision retries when generating a session code.
const DEFAULT_CODE_ATTEMPTS: u32 = 10;
/// Participant cap applied when a create request does not specify one.
const DEFAULT_MAX_PARTICIPANTS: u32 = 50;
/// Bound (seconds) on the durable work of a planned transition.
const DEFAULT_TRANSITION_TIMEOUT_SECS: u64 = 5;

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    session_code_attempts: u32,
    default_max_participants: u32,
    transition_timeout_secs: u64,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to baked-in
    /// defaults when the file is absent or malformed.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let app_config: Self = raw.into();
                    info!(path = %path.display(), "loaded configuration from file");
                    app_config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// How many random codes may be drawn before session creation fails.
    pub fn session_code_attempts(&self) -> u32 {
        self.session_code_attempts
    }

    /// Participant cap used when a create request omits one.
    pub fn default_max_participants(&self) -> u32 {
        self.default_max_participants
    }

    /// Bound on the durable work of a planned transition; `None` disables it.
    pub fn transition_timeout(&self) -> Option<Duration> {
        match self.transition_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            session_code_attempts: DEFAULT_CODE_ATTEMPTS,
            default_max_participants: DEFAULT_MAX_PARTICIPANTS,
            transition_timeout_secs: DEFAULT_TRANSITION_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Deserialize)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    #[serde(default)]
    session_code_attempts: Option<u32>,
    #[serde(default)]
    default_max_participants: Option<u32>,
    #[serde(default)]
    transition_timeout_secs: Option<u64>,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let defaults = Self::default();
        Self {
            session_code_attempts: value
                .session_code_attempts
                .unwrap_or(defaults.session_code_attempts),
            default_max_participants: value
                .default_max_participants
                .unwrap_or(defaults.default_max_participants),
            transition_timeout_secs: value
                .transition_timeout_secs
                .unwrap_or(defaults.transition_timeout_secs),
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
