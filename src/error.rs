//! Error types for the `word_cleaner` crate.
//!
//! None of these ever reach the caller of a cleaning entry point: the
//! orchestrator turns every one of them into "content returned unchanged".
//! They exist so the internal stages can use `?` and so that backends and
//! configuration loaders have something precise to report.

/// All errors that can occur inside the cleaning engine and its cache tiers.
#[derive(Debug, thiserror::Error)]
pub enum CleanerError {
    /// The fragment could not be turned into a usable tree.
    #[error("Parse failed: {0}")]
    Parse(String),

    /// A cleaning rule's pattern could not be built.
    #[error("Pattern rule `{rule}` unavailable: {reason}")]
    Pattern { rule: &'static str, reason: String },

    /// The external cache tier failed.
    #[error("Cache backend failed: {0}")]
    CacheBackend(Box<dyn std::error::Error + Send + Sync>),

    /// The external cache tier did not answer in time.
    #[error("Cache backend timed out")]
    CacheTimeout,

    /// Rebuilt markup did not survive the structure round-trip check.
    #[error("Reconstruction rejected: {0}")]
    Reconstruction(String),

    /// The write-behind queue to the background worker is closed or full.
    #[error("Channel closed or full")]
    ChannelClosed,

    /// The builder or policy configuration is invalid.
    #[error("Config error: {0}")]
    Config(String),
}

/// A type alias for `Result<T, CleanerError>`.
pub type Result<T> = std::result::Result<T, CleanerError>;
