//! Error types for runbridge

use thiserror::Error;

/// Result type alias for runbridge operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in runbridge
///
/// None of these cross the host boundary from `submit_input_line` or
/// `run_program`; they surface only through the fallible siblings
/// (`try_submit_input_line`, `start_run`, `resume`, `stop`).
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration value error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// TOML serialization error
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// The worker thread for a run could not be created
    #[error("Failed to spawn worker thread: {0}")]
    Spawn(#[source] std::io::Error),

    /// A non-blocking write found the input channel at capacity
    #[error("Input channel is full ({capacity} lines)")]
    InputFull { capacity: usize },

    /// No run is in flight
    #[error("No program is running")]
    NoActiveRun,

    /// No in-flight run is waiting at a pause checkpoint
    #[error("No program is paused")]
    NotPaused,

    /// The process-wide bridge was installed twice
    #[error("A default bridge is already installed")]
    AlreadyInstalled,

    /// The process-wide bridge was used before installation
    #[error("No default bridge is installed")]
    NotInstalled,
}
