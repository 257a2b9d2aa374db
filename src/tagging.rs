//! Tag validation for source FLAC files.
//!
//! An upload built from untagged sources would be trumped immediately, so
//! every source file must carry the minimal tag set before any encoder
//! runs. The check shells out to `metaflac` per file; the parsing of its
//! output is kept pure so it can be tested without the binary.

use crate::error::{Result, TranscodeError};
use async_trait::async_trait;
use std::collections::HashSet;
use std::path::Path;
use tokio::process::Command;

/// Tags every source file must define (non-empty) for an upload to stand.
pub const REQUIRED_TAGS: [&str; 4] = ["ARTIST", "ALBUM", "TITLE", "TRACKNUMBER"];

/// Result of checking one file's tags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagCheck {
    /// Whether all required tags are present and non-empty
    pub ok: bool,
    /// Human-readable reason when not ok
    pub message: Option<String>,
}

impl TagCheck {
    fn pass() -> Self {
        Self {
            ok: true,
            message: None,
        }
    }

    fn fail(message: String) -> Self {
        Self {
            ok: false,
            message: Some(message),
        }
    }
}

/// Checks that a FLAC file carries the required tags.
#[async_trait]
pub trait TagValidator: Send + Sync {
    /// Inspect one file.
    async fn check(&self, path: &Path) -> Result<TagCheck>;
}

/// Tag validator backed by the `metaflac` command-line tool.
#[derive(Debug, Default)]
pub struct MetaflacTagValidator;

#[async_trait]
impl TagValidator for MetaflacTagValidator {
    async fn check(&self, path: &Path) -> Result<TagCheck> {
        let output = Command::new("metaflac")
            .arg("--export-tags-to=-")
            .arg(path)
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    TranscodeError::BinaryNotFound {
                        name: "metaflac".to_string(),
                    }
                } else {
                    TranscodeError::Io(e)
                }
            })?;
        if !output.status.success() {
            return Ok(TagCheck::fail(format!(
                "metaflac could not read {}: {}",
                path.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        let tags = String::from_utf8_lossy(&output.stdout);
        Ok(check_exported_tags(&tags, path))
    }
}

/// Validate the `NAME=value` lines `metaflac --export-tags-to=-` emits.
///
/// Tag names are case-insensitive; a tag present with an empty value
/// counts as missing.
pub fn check_exported_tags(exported: &str, path: &Path) -> TagCheck {
    let present: HashSet<String> = exported
        .lines()
        .filter_map(|line| {
            let (name, value) = line.split_once('=')?;
            if value.trim().is_empty() {
                None
            } else {
                Some(name.trim().to_uppercase())
            }
        })
        .collect();

    let missing: Vec<&str> = REQUIRED_TAGS
        .iter()
        .copied()
        .filter(|tag| !present.contains(*tag))
        .collect();

    if missing.is_empty() {
        TagCheck::pass()
    } else {
        TagCheck::fail(format!(
            "{} is missing tags: {}",
            path.display(),
            missing.join(", ")
        ))
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn path() -> PathBuf {
        PathBuf::from("01 - Intro.flac")
    }

    #[test]
    fn test_all_required_tags_pass() {
        let exported = "ARTIST=Logistics\nALBUM=Fear Not\nTITLE=Intro\nTRACKNUMBER=01\nDATE=2012\n";
        assert!(check_exported_tags(exported, &path()).ok);
    }

    #[test]
    fn test_tag_names_case_insensitive() {
        let exported = "artist=Logistics\nAlbum=Fear Not\ntitle=Intro\ntracknumber=1\n";
        assert!(check_exported_tags(exported, &path()).ok);
    }

    #[test]
    fn test_missing_tag_named_in_message() {
        let exported = "ARTIST=Logistics\nALBUM=Fear Not\nTITLE=Intro\n";
        let check = check_exported_tags(exported, &path());
        assert!(!check.ok);
        let message = check.message.unwrap();
        assert!(message.contains("TRACKNUMBER"));
        assert!(!message.contains("ARTIST,"));
    }

    #[test]
    fn test_empty_value_counts_as_missing() {
        let exported = "ARTIST=\nALBUM=Fear Not\nTITLE=Intro\nTRACKNUMBER=1\n";
        let check = check_exported_tags(exported, &path());
        assert!(!check.ok);
        assert!(check.message.unwrap().contains("ARTIST"));
    }

    #[test]
    fn test_value_containing_equals_sign() {
        let exported =
            "ARTIST=A=B\nALBUM=Fear Not\nTITLE=Intro\nTRACKNUMBER=1\n";
        assert!(check_exported_tags(exported, &path()).ok);
    }

    #[test]
    fn test_no_tags_at_all() {
        let check = check_exported_tags("", &path());
        assert!(!check.ok);
        for tag in REQUIRED_TAGS {
            assert!(check.message.as_ref().unwrap().contains(tag));
        }
    }
}
