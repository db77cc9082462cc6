//! Jira-Harvest: a resumable issue harvester
//!
//! This crate pages through issue collections on a remote REST API, normalizes every
//! issue into a JSONL training record, and checkpoints its progress so an interrupted
//! run picks up exactly where the last durable flush left off.

pub mod config;
pub mod harvest;
pub mod output;
pub mod remote;
pub mod state;
pub mod transform;

use thiserror::Error;

/// Main error type for Jira-Harvest operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Remote error: {0}")]
    Remote(#[from] remote::RemoteError),

    #[error("State error: {0}")]
    State(#[from] state::StateError),

    #[error("Output error: {0}")]
    Output(#[from] output::OutputError),

    #[error("Transform error: {0}")]
    Transform(#[from] transform::TransformError),
}

impl HarvestError {
    /// Returns true if the run cannot continue after this error
    ///
    /// State and output failures are fatal: continuing could claim progress that is
    /// not reflected in the output stream.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::State(_) | Self::Output(_))
    }

    /// Returns true if the same item may succeed on a later attempt
    ///
    /// Only an unreachable remote qualifies; rejected or malformed items stay broken.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Remote(e) if e.is_unavailable())
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Result type alias for Jira-Harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use harvest::{CancelFlag, CollectionOutcome, Orchestrator, RunReport};
pub use remote::{IssueSource, JiraClient};
pub use state::{CollectionKey, Cursor, ItemId, ProgressSnapshot, ProgressStore};
