//! Error types for redbetter
//!
//! The taxonomy mirrors how failures are handled in the run loop:
//! - configuration and authentication errors are fatal before any candidate
//!   is processed
//! - network errors abandon the current candidate and the run continues
//! - a malformed API payload terminates the whole run, since every later
//!   decision would be built on a response we cannot interpret
//! - gate rejections are *not* errors; they are recorded outcomes

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for redbetter operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for redbetter
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "tracker.api_key")
        key: Option<String>,
    },

    /// The tracker rejected the API key at startup
    #[error("not authenticated: the tracker rejected the configured API key")]
    NotAuthenticated,

    /// Network or HTTP-level error talking to the tracker
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// An API payload that could not be parsed as the expected shape.
    ///
    /// This is distinct from an empty-but-well-formed page (a normal
    /// pagination stop) and from a `status: failure` envelope (a normal
    /// per-request refusal). It is the one error class that terminates the
    /// whole run.
    #[error("malformed response from action '{action}': {message}")]
    MalformedResponse {
        /// The AJAX action whose response could not be interpreted
        action: String,
        /// What failed to parse
        message: String,
    },

    /// Transcode or packaging error
    #[error("transcode error: {0}")]
    Transcode(#[from] TranscodeError),

    /// Tag validator infrastructure failure (not a failed tag check)
    #[error("tag validation error: {0}")]
    Tag(String),

    /// Serialization error (outcome cache, request bodies)
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Transcode and packaging errors
///
/// A mislabelled bit depth discovered mid-transcode is *not* represented
/// here: it is an expected outcome (`TranscodeOutcome::BitDepthMismatch`)
/// that the orchestrator records, not an error that propagates.
#[derive(Debug, Error)]
pub enum TranscodeError {
    /// A required external binary (flac, lame, sox, mktorrent) was not found
    #[error("required binary '{name}' not found; install it or set its path in the config")]
    BinaryNotFound {
        /// The binary that could not be located
        name: String,
    },

    /// An external tool exited unsuccessfully
    #[error("'{tool}' failed on {path}: {stderr}")]
    ToolFailed {
        /// The tool that failed
        tool: String,
        /// The file or directory it was operating on
        path: PathBuf,
        /// Captured stderr, trimmed
        stderr: String,
    },

    /// The source directory contains no FLAC files to transcode
    #[error("no FLAC files found under {0}")]
    NoSourceFiles(PathBuf),

    /// I/O error while staging or copying transcode artifacts
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
