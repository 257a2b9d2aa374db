//! Configuration types for redbetter
//!
//! Loaded from a TOML file. Every field has a sensible default so a config
//! only needs to state what differs; a missing file gets a commented
//! template written in its place so the operator has something to edit.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Tracker connection settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// API key generated in the tracker's access settings
    #[serde(default)]
    pub api_key: String,

    /// Base URL of the tracker site (default: "https://redacted.ch/")
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Base URL of the announce host (default: "https://flacsfor.me/")
    #[serde(default = "default_announce_url")]
    pub announce_url: String,

    /// Minimum milliseconds between API requests (default: 1000)
    #[serde(default = "default_rate_limit_ms")]
    pub rate_limit_ms: u64,

    /// Seeding results fetched per page (default: 500)
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_base_url(),
            announce_url: default_announce_url(),
            rate_limit_ms: default_rate_limit_ms(),
            page_size: default_page_size(),
        }
    }
}

/// Where source files live and where outputs go
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DirectoriesConfig {
    /// Directories searched (in order) for downloaded source files
    #[serde(default)]
    pub data_dirs: Vec<PathBuf>,

    /// Directory transcoded releases are written to
    #[serde(default)]
    pub output_dir: PathBuf,

    /// Directory finished .torrent files are copied to
    #[serde(default)]
    pub torrent_dir: PathBuf,
}

/// Transcode targets and encoder tuning
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TranscodeConfig {
    /// Wanted formats, checked per release (default: FLAC, V0, 320)
    #[serde(default = "default_formats")]
    pub formats: Vec<String>,

    /// Encoder worker count; 0 means all cores but one (default: 0)
    #[serde(default)]
    pub threads: usize,

    /// Torrent piece length exponent, 2^n bytes (default: 18)
    #[serde(default = "default_piece_length")]
    pub piece_length: u32,
}

impl Default for TranscodeConfig {
    fn default() -> Self {
        Self {
            formats: default_formats(),
            threads: 0,
            piece_length: default_piece_length(),
        }
    }
}

/// What to do when a release labelled 16-bit turns out to be 24-bit
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MislabelPolicy {
    /// Correct the listing via the API without asking
    Correct,
    /// Ask the operator before correcting (default)
    #[default]
    Prompt,
    /// Leave the listing alone and skip the release
    Skip,
}

/// Pipeline behaviour toggles
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BehaviourConfig {
    /// Policy for mislabelled 24-bit sources (default: prompt)
    #[serde(default)]
    pub mislabelled_24bit: MislabelPolicy,

    /// Upload finished torrents immediately; false stages them for manual
    /// upload instead (default: true)
    #[serde(default = "default_true")]
    pub upload: bool,
}

impl Default for BehaviourConfig {
    fn default() -> Self {
        Self {
            mislabelled_24bit: MislabelPolicy::default(),
            upload: true,
        }
    }
}

/// Root configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Tracker connection settings
    #[serde(default)]
    pub tracker: TrackerConfig,
    /// Source and output directories
    #[serde(default)]
    pub directories: DirectoriesConfig,
    /// Transcode targets and tuning
    #[serde(default)]
    pub transcode: TranscodeConfig,
    /// Behaviour toggles
    #[serde(default)]
    pub behaviour: BehaviourConfig,
}

const TEMPLATE: &str = "\
# redbetter configuration

[tracker]
# API key from your tracker's access settings (required)
api_key = \"\"
# base_url = \"https://redacted.ch/\"
# announce_url = \"https://flacsfor.me/\"
# rate_limit_ms = 1000
# page_size = 500

[directories]
# Directories searched for downloaded source files, in order
data_dirs = []
# Where transcoded releases are written
output_dir = \"\"
# Where finished .torrent files are copied
torrent_dir = \"\"

[transcode]
# formats = [\"FLAC\", \"V0\", \"320\"]
# threads = 0          # 0 = all cores but one
# piece_length = 18    # 2^18 = 256 KiB pieces

[behaviour]
# mislabelled_24bit = \"prompt\"   # correct | prompt | skip
# upload = true
";

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// If the file does not exist, a commented template is written there and
    /// a configuration error is returned asking the operator to fill it in.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            std::fs::write(path, TEMPLATE)?;
            return Err(Error::Config {
                message: format!(
                    "no config file found; a template was created at {} - edit it and rerun",
                    path.display()
                ),
                key: None,
            });
        }

        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents).map_err(|e| Error::Config {
            message: format!("failed to parse {}: {}", path.display(), e),
            key: None,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check invariants that serde defaults cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.tracker.api_key.trim().is_empty() {
            return Err(Error::Config {
                message: "api_key is empty".to_string(),
                key: Some("tracker.api_key".to_string()),
            });
        }
        if self.directories.data_dirs.is_empty() {
            return Err(Error::Config {
                message: "at least one data directory is required".to_string(),
                key: Some("directories.data_dirs".to_string()),
            });
        }
        if self.transcode.piece_length < 15 || self.transcode.piece_length > 24 {
            return Err(Error::Config {
                message: format!(
                    "piece_length {} outside the accepted 15..=24 exponent range",
                    self.transcode.piece_length
                ),
                key: Some("transcode.piece_length".to_string()),
            });
        }
        for f in &self.transcode.formats {
            f.parse::<crate::formats::Format>()?;
        }
        Ok(())
    }

    /// The wanted-format list parsed into [`crate::formats::Format`] values.
    pub fn wanted_formats(&self) -> Result<Vec<crate::formats::Format>> {
        self.transcode.formats.iter().map(|f| f.parse()).collect()
    }

    /// Effective encoder worker count (0 means all cores but one).
    pub fn effective_threads(&self) -> usize {
        if self.transcode.threads > 0 {
            self.transcode.threads
        } else {
            std::thread::available_parallelism()
                .map(|n| n.get().saturating_sub(1).max(1))
                .unwrap_or(1)
        }
    }
}

fn default_base_url() -> String {
    "https://redacted.ch/".to_string()
}

fn default_announce_url() -> String {
    "https://flacsfor.me/".to_string()
}

fn default_rate_limit_ms() -> u64 {
    1000
}

fn default_page_size() -> u32 {
    500
}

fn default_formats() -> Vec<String> {
    vec!["FLAC".to_string(), "V0".to_string(), "320".to_string()]
}

fn default_piece_length() -> u32 {
    18
}

fn default_true() -> bool {
    true
}
