//! Settings for both assistant variants
//!
//! Precedence, lowest first: `config/default.yaml`, the `config/{env}.yaml`
//! overlay, then `ROOM_ASSISTANT__*` variables. `.env.local` is read into the
//! process environment before any of that, without overriding what is set.
//! The system prompt file is read on its own by [`load_prompt`].

pub mod env_file;
pub mod prompt;
pub mod settings;

pub use env_file::load_env_file;
pub use prompt::load_prompt;
pub use settings::{
    load_settings, load_settings_from, AgentSettings, EmbeddingProvider, EmbeddingSettings,
    LlmSettings, ObservabilitySettings, RagSettings, RuntimeEnvironment, Settings,
    SpeechSettings, TransportKind, TransportSettings, VadSettings, MAX_POLL_INTERVAL_MS,
};

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0} does not exist")]
    FileNotFound(String),

    #[error("cannot read {path}: {message}")]
    Io { path: PathBuf, message: String },

    #[error("settings could not be parsed: {0}")]
    ParseError(String),

    #[error("{0} must be set")]
    MissingField(String),

    #[error("{field} is invalid: {message}")]
    InvalidValue { field: String, message: String },

    #[error("environment: {0}")]
    Environment(String),
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}

impl From<ConfigError> for room_assistant_core::Error {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::FileNotFound(path) => room_assistant_core::Error::FileAccess {
                path: PathBuf::from(path),
                message: "not found".to_string(),
            },
            ConfigError::Io { path, message } => {
                room_assistant_core::Error::FileAccess { path, message }
            }
            other => room_assistant_core::Error::Config(other.to_string()),
        }
    }
}
