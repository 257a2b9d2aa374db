//! Format specification and the format-gap resolver.
//!
//! A [`Format`] is a canonical short name for a transcode target, mapped to
//! the `(container, encoding label)` pair the tracker uses to describe an
//! existing torrent. The resolver compares the pairs already present among a
//! release's sibling editions against the operator's wanted-format list and
//! returns what is still missing.

use crate::api::types::Encoding;
use crate::api::types::ReleaseGroup;
use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

/// A transcode target format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    /// Lossless FLAC (16-bit)
    Flac,
    /// MP3 V0 (VBR)
    V0,
    /// MP3 V2 (VBR)
    V2,
    /// MP3 320 CBR
    Mp3320,
}

/// All supported formats, in canonical order.
pub const ALL_FORMATS: [Format; 4] = [Format::Flac, Format::V0, Format::V2, Format::Mp3320];

impl Format {
    /// The container name the tracker uses for this format ("FLAC" or "MP3").
    pub fn container(self) -> &'static str {
        match self {
            Format::Flac => "FLAC",
            Format::V0 | Format::V2 | Format::Mp3320 => "MP3",
        }
    }

    /// The encoding label the tracker uses for this format.
    pub fn encoding_label(self) -> &'static str {
        match self {
            Format::Flac => "Lossless",
            Format::V0 => "V0 (VBR)",
            Format::V2 => "V2 (VBR)",
            Format::Mp3320 => "320",
        }
    }

    /// Whether the tracker treats this encoding label as variable bitrate.
    pub fn is_vbr(self) -> bool {
        matches!(self, Format::V0 | Format::V2)
    }

    /// File extension of encoded output.
    pub fn extension(self) -> &'static str {
        match self {
            Format::Flac => "flac",
            Format::V0 | Format::V2 | Format::Mp3320 => "mp3",
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Format::Flac => "FLAC",
            Format::V0 => "V0",
            Format::V2 => "V2",
            Format::Mp3320 => "320",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for Format {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_uppercase().as_str() {
            "FLAC" => Ok(Format::Flac),
            "V0" => Ok(Format::V0),
            "V2" => Ok(Format::V2),
            "320" => Ok(Format::Mp3320),
            other => Err(Error::Config {
                message: format!("unknown format '{}'; expected FLAC, V0, V2 or 320", other),
                key: Some("transcode.formats".to_string()),
            }),
        }
    }
}

/// The edition-equality key: two torrents of a release are the same edition
/// iff all five fields match exactly, including empty-string defaults.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RemasterIdentity {
    /// Source media (CD, WEB, Vinyl, ...)
    pub media: String,
    /// Remaster year (0 when unremastered)
    pub year: u32,
    /// Remaster title ("" when unremastered)
    pub title: String,
    /// Record label of the edition
    pub record_label: String,
    /// Catalogue number of the edition
    pub catalogue_number: String,
}

impl RemasterIdentity {
    /// Extract the edition key from a torrent.
    pub fn of(encoding: &Encoding) -> Self {
        Self {
            media: encoding.media.clone(),
            year: encoding.remaster_year,
            title: encoding.remaster_title.clone(),
            record_label: encoding.remaster_record_label.clone(),
            catalogue_number: encoding.remaster_catalogue_number.clone(),
        }
    }
}

fn preemphasis_re() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| {
        #[allow(clippy::expect_used)] // pattern is a literal, cannot fail at runtime
        regex::Regex::new(r"(?i)pre[- ]?emphasi(s(ed)?|zed)").expect("valid regex")
    })
}

/// Formats this torrent may legally be transcoded to.
///
/// Pre-emphasized editions must not be transcoded without de-emphasis,
/// which the encoder chain does not perform, so they allow nothing.
pub fn allowed_transcodes(encoding: &Encoding) -> Vec<Format> {
    if preemphasis_re().is_match(&encoding.remaster_title) {
        Vec::new()
    } else {
        ALL_FORMATS.to_vec()
    }
}

/// Compute which wanted formats are missing from the candidate's edition.
///
/// Siblings are the release's torrents whose [`RemasterIdentity`] equals the
/// candidate's. A wanted format is needed iff its `(container, label)` pair
/// is absent among the siblings. Output preserves wanted-list order; the
/// result depends only on the release snapshot and the wanted list.
pub fn formats_needed(group: &ReleaseGroup, encoding: &Encoding, wanted: &[Format]) -> Vec<Format> {
    let identity = RemasterIdentity::of(encoding);
    let present: std::collections::HashSet<(&str, &str)> = group
        .torrents
        .iter()
        .filter(|t| RemasterIdentity::of(t) == identity)
        .map(|t| (t.format.as_str(), t.encoding.as_str()))
        .collect();

    let allowed = allowed_transcodes(encoding);
    wanted
        .iter()
        .copied()
        .filter(|f| !present.contains(&(f.container(), f.encoding_label())))
        .filter(|f| allowed.contains(f))
        .collect()
}
