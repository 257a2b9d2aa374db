//! Persistent outcome cache.
//!
//! Every candidate that reaches a terminal decision gets one entry here,
//! keyed by torrent id, so later runs can skip it without any API traffic.
//! The store is a single JSON object rewritten in full on every add: writes
//! go to a sibling temp file which is synced and renamed over the store, so
//! a crash either leaves the previous state or the new one, never a torn
//! file. There is no cross-process locking; two processes sharing one cache
//! file can lose each other's updates.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Terminal outcome recorded for a processed candidate.
///
/// Serialized with the store's historical string tags, which are also what
/// the `--retry` flag matches against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    /// Source torrent is not lossless; transcoding is impossible
    #[serde(rename = "no flac")]
    NoFlac,
    /// Scene release; requires manual descening first
    #[serde(rename = "scene")]
    Scene,
    /// Marked trumpable; only processed when supplied explicitly
    #[serde(rename = "trumpable")]
    Trumpable,
    /// Source is really 24-bit; listing corrected or release set aside
    #[serde(rename = "24bit")]
    TwentyFourBit,
    /// All needed formats exist or were published
    #[serde(rename = "done")]
    Done,
    /// The tracker rejected the upload with a recognized failure payload
    #[serde(rename = "no_upload")]
    NoUpload,
    /// The upload response had an unrecognized shape
    #[serde(rename = "error")]
    Error,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            Outcome::NoFlac => "no flac",
            Outcome::Scene => "scene",
            Outcome::Trumpable => "trumpable",
            Outcome::TwentyFourBit => "24bit",
            Outcome::Done => "done",
            Outcome::NoUpload => "no_upload",
            Outcome::Error => "error",
        };
        write!(f, "{}", tag)
    }
}

impl FromStr for Outcome {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "no flac" | "no-flac" | "no_flac" => Ok(Outcome::NoFlac),
            "scene" => Ok(Outcome::Scene),
            "trumpable" => Ok(Outcome::Trumpable),
            "24bit" => Ok(Outcome::TwentyFourBit),
            "done" => Ok(Outcome::Done),
            "no_upload" | "no-upload" => Ok(Outcome::NoUpload),
            "error" => Ok(Outcome::Error),
            other => Err(Error::Config {
                message: format!("unknown outcome tag '{}'", other),
                key: None,
            }),
        }
    }
}

/// On-disk shape of the store. Keys are serialized as strings (JSON object
/// keys always are) and coerced back to integers on load by serde_json's
/// map-key handling.
#[derive(Debug, Default, Serialize, Deserialize)]
struct Store {
    ids: HashMap<u64, Outcome>,
}

/// Persistent mapping from torrent id to terminal outcome.
#[derive(Debug)]
pub struct OutcomeCache {
    store: Store,
    path: PathBuf,
}

impl OutcomeCache {
    /// Load the cache from `path`, creating and persisting an empty store if
    /// none exists.
    ///
    /// A store that exists but cannot be parsed is an error, not an empty
    /// cache: this file is the only record of completed uploads, and
    /// silently discarding it would republish everything.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let cache = if path.is_file() {
            let contents = std::fs::read_to_string(&path)?;
            let store: Store = serde_json::from_str(&contents)?;
            Self { store, path }
        } else {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            let cache = Self {
                store: Store::default(),
                path,
            };
            cache.persist()?;
            cache
        };
        tracing::debug!(entries = cache.store.ids.len(), path = %cache.path.display(), "outcome cache loaded");
        Ok(cache)
    }

    /// Whether a terminal outcome is recorded for `id`.
    pub fn contains(&self, id: u64) -> bool {
        self.store.ids.contains_key(&id)
    }

    /// The recorded outcome for `id`, if any.
    pub fn get(&self, id: u64) -> Option<Outcome> {
        self.store.ids.get(&id).copied()
    }

    /// Number of recorded outcomes.
    pub fn len(&self) -> usize {
        self.store.ids.len()
    }

    /// Whether the cache holds no outcomes.
    pub fn is_empty(&self) -> bool {
        self.store.ids.is_empty()
    }

    /// Record (or overwrite) the outcome for `id` and persist the entire
    /// store before returning. Once this returns, the write survives a
    /// crash; if it errors, the previous on-disk state is intact.
    pub fn add(&mut self, id: u64, outcome: Outcome) -> Result<()> {
        self.store.ids.insert(id, outcome);
        self.persist()
    }

    fn persist(&self) -> Result<()> {
        let tmp = self.path.with_extension("tmp");
        {
            let mut file = std::fs::File::create(&tmp)?;
            let json = serde_json::to_string_pretty(&self.store)?;
            file.write_all(json.as_bytes())?;
            file.sync_all()?;
        }
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_store_initialized_and_persisted() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("cache.json");

        let cache = OutcomeCache::load(&path).unwrap();
        assert!(cache.is_empty());
        // The empty store is written immediately, not lazily on first add.
        assert!(path.is_file());
    }

    #[test]
    fn test_add_then_reload_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("cache.json");

        let mut cache = OutcomeCache::load(&path).unwrap();
        cache.add(7, Outcome::Done).unwrap();
        drop(cache);

        let reloaded = OutcomeCache::load(&path).unwrap();
        assert!(reloaded.contains(7));
        assert_eq!(reloaded.get(7), Some(Outcome::Done));
        assert_eq!(reloaded.len(), 1);
    }

    #[test]
    fn test_keys_stored_as_strings_read_as_integers() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("cache.json");

        let mut cache = OutcomeCache::load(&path).unwrap();
        cache.add(42, Outcome::Scene).unwrap();

        // JSON object keys are strings on disk.
        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"42\""));
        assert!(raw.contains("\"scene\""));

        let reloaded = OutcomeCache::load(&path).unwrap();
        assert_eq!(reloaded.get(42), Some(Outcome::Scene));
    }

    #[test]
    fn test_last_write_wins() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("cache.json");

        let mut cache = OutcomeCache::load(&path).unwrap();
        cache.add(9, Outcome::TwentyFourBit).unwrap();
        cache.add(9, Outcome::Done).unwrap();
        assert_eq!(cache.len(), 1);

        let reloaded = OutcomeCache::load(&path).unwrap();
        assert_eq!(reloaded.get(9), Some(Outcome::Done));
    }

    #[test]
    fn test_corrupt_store_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("cache.json");
        std::fs::write(&path, "not json at all").unwrap();

        assert!(OutcomeCache::load(&path).is_err());
    }

    #[test]
    fn test_no_tmp_file_left_behind() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("cache.json");

        let mut cache = OutcomeCache::load(&path).unwrap();
        cache.add(1, Outcome::NoFlac).unwrap();
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn test_outcome_tag_roundtrip() {
        for outcome in [
            Outcome::NoFlac,
            Outcome::Scene,
            Outcome::Trumpable,
            Outcome::TwentyFourBit,
            Outcome::Done,
            Outcome::NoUpload,
            Outcome::Error,
        ] {
            let tag = outcome.to_string();
            assert_eq!(tag.parse::<Outcome>().unwrap(), outcome);
        }
        assert!("bogus".parse::<Outcome>().is_err());
    }
}
