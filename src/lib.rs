//! # redbetter
//!
//! Automated transcode-and-publish pipeline for seeded FLAC releases on a
//! Gazelle tracker.
//!
//! ## Design Philosophy
//!
//! redbetter is designed to be:
//! - **Cautious** - ordered eligibility gates reject anything that could
//!   produce a bad upload before any encoder runs
//! - **Resumable** - every terminal decision is persisted, so a rerun
//!   skips everything already settled without touching the network
//! - **Sequential** - one candidate at a time; the only concurrency is
//!   per-file encoding inside a release
//! - **Testable** - the tracker, the encoder chain and the operator are
//!   all trait seams
//!
//! ## Quick Start
//!
//! ```no_run
//! use redbetter::api::{RedactedApi, TrackerApi};
//! use redbetter::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load("config.toml")?;
//!     let api = RedactedApi::connect(&config.tracker).await?;
//!     println!("logged in as {}", api.account().username);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Tracker API client and wire types
pub mod api;
/// Persistent outcome cache
pub mod cache;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Format specification and gap resolver
pub mod formats;
/// Eligibility gates
pub mod gates;
/// Publish pipeline orchestration
pub mod pipeline;
/// Source tag validation
pub mod tagging;
/// Transcode engine and torrent packaging
pub mod transcode;
/// Shared helpers
pub mod utils;

pub use cache::{Outcome, OutcomeCache};
pub use config::Config;
pub use error::{Error, Result};
pub use formats::Format;
pub use pipeline::{Pipeline, PipelineOptions, RunSummary};
