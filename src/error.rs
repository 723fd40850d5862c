use thiserror::Error;

use crate::audio_system::AudioCategory;

/// Engine-level errors using thiserror for structured error handling.
///
/// Invalid operations always surface to the caller. Missing resources are
/// checked before use on the dispatch paths and never reach this type.
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Audio engine has been shut down")]
    EngineShutDown,

    #[error("Wait for completion was cancelled")]
    Cancelled,

    #[error("Audio file not found: {0}")]
    NotFound(String),

    #[error("Failed to load audio file: {path}")]
    LoadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to decode audio format")]
    DecodeFailed(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("Failed to initialize audio output stream")]
    StreamInitFailed(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("Failed to create output channel for {category}")]
    ChannelCreateFailed {
        category: AudioCategory,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Playlist index {index} out of range (len {len})")]
    IndexOutOfRange { index: usize, len: usize },
}

impl AudioError {
    pub(crate) fn stopped_handle() -> Self {
        AudioError::InvalidOperation(
            "a stopped audio handle cannot be used again; create a new handle".to_string(),
        )
    }

    /// True for the terminal-handle error.
    pub fn is_invalid_operation(&self) -> bool {
        matches!(self, AudioError::InvalidOperation(_))
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration from {path}")]
    LoadFailed {
        path: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Failed to save configuration to {path}")]
    SaveFailed {
        path: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to create config directory: {path}")]
    DirectoryCreationFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Result alias for engine operations
pub type Result<T> = std::result::Result<T, AudioError>;

/// Type alias for application Results using anyhow for context chaining
pub type AppResult<T> = anyhow::Result<T>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_error_display() {
        let err = AudioError::IndexOutOfRange { index: 4, len: 3 };
        assert_eq!(err.to_string(), "Playlist index 4 out of range (len 3)");

        let err = AudioError::EngineShutDown;
        assert_eq!(err.to_string(), "Audio engine has been shut down");
    }

    #[test]
    fn test_stopped_handle_is_invalid_operation() {
        let err = AudioError::stopped_handle();
        assert!(err.is_invalid_operation());
        assert!(err.to_string().starts_with("Invalid operation"));
        assert!(!AudioError::Cancelled.is_invalid_operation());
    }

    #[test]
    fn test_error_source_chain() {
        use std::io;

        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let config_err = ConfigError::LoadFailed {
            path: "/test/config.json".to_string(),
            source: Box::new(io_err),
        };

        assert!(config_err.source().is_some());
        assert_eq!(
            config_err.to_string(),
            "Failed to load configuration from /test/config.json"
        );
    }
}
