//! Naming, descriptions and upload triage for finished transcodes.

use crate::api::types::{Encoding, Release};
use crate::api::UploadOutcome;
use crate::cache::Outcome;
use crate::formats::Format;
use crate::utils::{html_unescape, prettify_bytes};
use std::path::Path;

/// Longest directory name we will generate; longer ones break on common
/// filesystems once the per-track paths are appended.
const MAX_DIR_NAME: usize = 180;

/// The artist credit used in directory names and the info box.
pub fn display_artist(group: &Release) -> String {
    match group.music_info.artists.as_slice() {
        [] => "Unknown Artist".to_string(),
        [one] => html_unescape(&one.name),
        _ => "Various Artists".to_string(),
    }
}

/// Replace characters that are unsafe in a directory name.
pub fn sanitize_component(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}

/// Directory name for a transcoded release:
/// `Artist - Album (Edition) (Year) [Media - Format]`.
pub fn release_dir_name(group: &Release, edition: &Encoding, format: Format) -> String {
    let artist = display_artist(group);
    let mut album = html_unescape(&group.name);
    if !edition.remaster_title.is_empty() {
        album.push_str(&format!(" ({})", html_unescape(&edition.remaster_title)));
    }
    let year = if edition.remaster_year > 0 {
        edition.remaster_year
    } else {
        group.year
    };
    let name = sanitize_component(&format!(
        "{} - {} ({}) [{} - {}]",
        artist, album, year, edition.media, format
    ));
    if name.len() > MAX_DIR_NAME {
        let mut truncated: String = name.chars().take(MAX_DIR_NAME).collect();
        truncated.push('_');
        truncated
    } else {
        name
    }
}

/// The command chain shown in the release description for provenance.
pub fn transcode_steps(format: Format) -> &'static str {
    match format {
        Format::Flac => "sox input.flac -qG -b 16 output.flac rate -v -L 44100 dither",
        Format::V0 => "flac -dcs -- input.flac | lame -V 0 --vbr-new - output.mp3",
        Format::V2 => "flac -dcs -- input.flac | lame -V 2 --vbr-new - output.mp3",
        Format::Mp3320 => "flac -dcs -- input.flac | lame -h -b 320 - output.mp3",
    }
}

/// BBCode description for an uploaded transcode, linking back to its source.
pub fn transcode_description(source_permalink: &str, format: Format) -> String {
    format!(
        "Transcode of [url={permalink}]{permalink}[/url]\n\n\
         Transcode process:\n[code]{steps}[/code]\n\n\
         Created with redbetter {version}",
        permalink = source_permalink,
        steps = transcode_steps(format),
        version = env!("CARGO_PKG_VERSION"),
    )
}

/// Operator-facing summary of what is about to be processed.
pub fn release_summary(
    group: &Release,
    edition: &Encoding,
    needed: &[Format],
    release_url: &str,
) -> String {
    let formats: Vec<String> = needed.iter().map(|f| f.to_string()).collect();
    format!(
        "Release: {} - {} ({})\nMedia: {} [{} / {}]\nSize: {} in {} files\nTranscoding to: {}\n{}",
        display_artist(group),
        html_unescape(&group.name),
        group.year,
        edition.media,
        edition.format,
        edition.encoding,
        prettify_bytes(edition.size),
        edition.file_count,
        formats.join(", "),
        release_url,
    )
}

/// Everything the operator needs to upload a staged torrent by hand:
/// the torrent file, the source listing and the filled-in upload fields.
pub fn staged_upload_notice(
    edition: &Encoding,
    format: Format,
    source_permalink: &str,
    torrent_path: &Path,
    description: &str,
) -> String {
    format!(
        "Staged {} for manual upload\nTorrent file: {}\nSource: {}\nEdition: {} [{} / {}]\nDescription:\n{}",
        format,
        torrent_path.display(),
        source_permalink,
        edition.media,
        format.container(),
        format.encoding_label(),
        description,
    )
}

/// The cache outcome an upload result maps to.
pub fn upload_cache_outcome(outcome: &UploadOutcome) -> Outcome {
    match outcome {
        UploadOutcome::Uploaded { .. } => Outcome::Done,
        UploadOutcome::Rejected { .. } => Outcome::NoUpload,
        UploadOutcome::Unrecognized { .. } => Outcome::Error,
    }
}

/// Combine per-format outcomes into the candidate's recorded outcome.
/// Severity order: `error` over `no_upload` over `done`.
pub fn worst_outcome(a: Outcome, b: Outcome) -> Outcome {
    let rank = |o: Outcome| match o {
        Outcome::Error => 2,
        Outcome::NoUpload => 1,
        _ => 0,
    };
    if rank(b) > rank(a) {
        b
    } else {
        a
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::types::test_support::{encoding, group_with};
    use crate::api::types::{Artist, MusicInfo};

    #[test]
    fn test_release_dir_name_plain() {
        let group = group_with(vec![]).group;
        let edition = encoding(1, "FLAC", "Lossless");
        assert_eq!(
            release_dir_name(&group, &edition, Format::V0),
            "Logistics - Fear Not (2012) [CD - V0]"
        );
    }

    #[test]
    fn test_release_dir_name_remaster() {
        let group = group_with(vec![]).group;
        let mut edition = encoding(1, "FLAC", "Lossless");
        edition.media = "WEB".to_string();
        edition.remaster_year = 2020;
        edition.remaster_title = "Deluxe Edition".to_string();
        assert_eq!(
            release_dir_name(&group, &edition, Format::Flac),
            "Logistics - Fear Not (Deluxe Edition) (2020) [WEB - FLAC]"
        );
    }

    #[test]
    fn test_release_dir_name_sanitized() {
        let mut group = group_with(vec![]).group;
        group.name = "What/If: Part?2".to_string();
        let edition = encoding(1, "FLAC", "Lossless");
        let name = release_dir_name(&group, &edition, Format::Mp3320);
        assert!(!name.contains('/'));
        assert!(!name.contains('?'));
        assert!(!name.contains(':'));
    }

    #[test]
    fn test_release_dir_name_truncated() {
        let mut group = group_with(vec![]).group;
        group.name = "x".repeat(400);
        let edition = encoding(1, "FLAC", "Lossless");
        let name = release_dir_name(&group, &edition, Format::V0);
        assert!(name.len() <= MAX_DIR_NAME + 1);
        assert!(name.ends_with('_'));
    }

    #[test]
    fn test_various_artists() {
        let mut group = group_with(vec![]).group;
        group.music_info = MusicInfo {
            artists: vec![
                Artist {
                    id: 1,
                    name: "A".to_string(),
                },
                Artist {
                    id: 2,
                    name: "B".to_string(),
                },
            ],
            ..Default::default()
        };
        assert_eq!(display_artist(&group), "Various Artists");
    }

    #[test]
    fn test_description_links_source() {
        let desc = transcode_description("https://redacted.ch/torrents.php?torrentid=17", Format::V0);
        assert!(desc.contains("[url=https://redacted.ch/torrents.php?torrentid=17]"));
        assert!(desc.contains("lame -V 0"));
    }

    #[test]
    fn test_staged_notice_carries_upload_fields() {
        let edition = encoding(1, "FLAC", "Lossless");
        let notice = staged_upload_notice(
            &edition,
            Format::V0,
            "https://redacted.ch/torrents.php?torrentid=17",
            Path::new("/torrents/release.torrent"),
            "Transcode of ...",
        );
        assert!(notice.contains("Staged V0"));
        assert!(notice.contains("/torrents/release.torrent"));
        assert!(notice.contains("CD [MP3 / V0 (VBR)]"));
        assert!(notice.contains("Transcode of ..."));
    }

    #[test]
    fn test_upload_triage_mapping() {
        assert_eq!(
            upload_cache_outcome(&UploadOutcome::Uploaded {
                torrent_id: 1,
                group_id: 2
            }),
            Outcome::Done
        );
        assert_eq!(
            upload_cache_outcome(&UploadOutcome::Rejected {
                message: "dupe".to_string()
            }),
            Outcome::NoUpload
        );
        assert_eq!(
            upload_cache_outcome(&UploadOutcome::Unrecognized {
                body: "<html>".to_string()
            }),
            Outcome::Error
        );
    }

    #[test]
    fn test_worst_outcome_ordering() {
        assert_eq!(worst_outcome(Outcome::Done, Outcome::NoUpload), Outcome::NoUpload);
        assert_eq!(worst_outcome(Outcome::NoUpload, Outcome::Error), Outcome::Error);
        assert_eq!(worst_outcome(Outcome::Error, Outcome::Done), Outcome::Error);
        assert_eq!(worst_outcome(Outcome::Done, Outcome::Done), Outcome::Done);
    }
}
