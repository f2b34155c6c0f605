// src/config.rs
// Runtime configuration, read once from the environment at start-up.

use std::env;
use std::time::Duration;

use crate::error::FocusError;

pub const DEFAULT_BIND: &str = "127.0.0.1:8080";
pub const DEFAULT_MODERATOR: &str = "主持人";
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub api_key: Option<String>,
    pub bind: String,
    /// Explicit model id. `None` means discover one at run start.
    pub model: Option<String>,
    pub request_timeout: Duration,
    pub moderator_label: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            bind: DEFAULT_BIND.to_string(),
            model: None,
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            moderator_label: DEFAULT_MODERATOR.to_string(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, FocusError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup, so tests never touch the process env.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, FocusError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        let request_timeout = match non_empty("FOCUS_ROOM_REQUEST_TIMEOUT_SECS") {
            Some(raw) => {
                let secs: u64 = raw.parse().map_err(|_| {
                    FocusError::Config(format!("FOCUS_ROOM_REQUEST_TIMEOUT_SECS must be an integer, got '{}'", raw))
                })?;
                if secs == 0 {
                    return Err(FocusError::Config("FOCUS_ROOM_REQUEST_TIMEOUT_SECS must be positive".into()));
                }
                Duration::from_secs(secs)
            }
            None => defaults.request_timeout,
        };

        Ok(Self {
            api_key: non_empty("GOOGLE_GENERATIVE_AI_API_KEY"),
            bind: non_empty("FOCUS_ROOM_BIND").unwrap_or(defaults.bind),
            model: non_empty("FOCUS_ROOM_MODEL"),
            request_timeout,
            moderator_label: non_empty("FOCUS_ROOM_MODERATOR").unwrap_or(defaults.moderator_label),
        })
    }
}
