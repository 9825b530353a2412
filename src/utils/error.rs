//! Error types for tvplay
//!
//! This module defines the error type shared by the playback controller and
//! its collaborators. We use thiserror for the library error type and anyhow
//! for application-level error handling in the binary.

use thiserror::Error;

/// Main error type for tvplay
#[derive(Error, Debug)]
pub enum PlaybackError {
    /// Adaptive bitrate engine errors
    #[error("Engine error: {0}")]
    Engine(String),

    /// Media sink errors
    #[error("Sink error: {0}")]
    Sink(String),

    /// The platform cannot play this kind of stream
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O errors
    #[error("File error: {0}")]
    FileIO(#[from] std::io::Error),

    /// Scenario script errors
    #[error("Scenario error: {0}")]
    Scenario(String),

    /// Generic error for unexpected situations
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<toml::de::Error> for PlaybackError {
    fn from(err: toml::de::Error) -> Self {
        PlaybackError::Config(format!("TOML error: {}", err))
    }
}

impl PlaybackError {
    /// Create an engine error from string
    pub fn engine_error<S: Into<String>>(msg: S) -> Self {
        PlaybackError::Engine(msg.into())
    }

    /// Create a sink error from string
    pub fn sink_error<S: Into<String>>(msg: S) -> Self {
        PlaybackError::Sink(msg.into())
    }
}

/// Convenience type alias for Results in tvplay
pub type Result<T> = std::result::Result<T, PlaybackError>;

/// Extension trait for converting other errors to PlaybackError
pub trait IntoPlaybackError<T> {
    /// Convert this error into a configuration error with the given context
    fn config_err(self, context: &str) -> Result<T>;
}

impl<T, E: std::fmt::Display> IntoPlaybackError<T> for std::result::Result<T, E> {
    fn config_err(self, context: &str) -> Result<T> {
        self.map_err(|e| PlaybackError::Config(format!("{}: {}", context, e)))
    }
}

/// Helper macro for creating internal errors with file and line information
#[macro_export]
macro_rules! internal_error {
    ($msg:expr) => {
        $crate::utils::error::PlaybackError::Internal(
            format!("{} at {}:{}", $msg, file!(), line!())
        )
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::utils::error::PlaybackError::Internal(
            format!("{} at {}:{}", format!($fmt, $($arg)*), file!(), line!())
        )
    };
}
