//! Eligibility gates.
//!
//! Pure functions over a release snapshot, checked in a fixed order so a
//! candidate tripping several gates always records the same outcome. No
//! I/O happens here; the pipeline owns cache writes and file inspection.

use crate::api::types::Encoding;
use crate::cache::Outcome;
use crate::transcode::SourceProbe;

/// What the gates decided for a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// All gates passed; continue into the resolver
    Proceed,
    /// Permanently ineligible; record the outcome and move on
    Reject(Outcome),
    /// Pass over without recording; the condition may not hold next run
    Skip,
}

/// Whether the tracker's listing describes a lossless source.
pub fn is_lossless(edition: &Encoding) -> bool {
    edition.format.contains("FLAC") || edition.encoding.contains("Lossless")
}

/// Whether the listing already declares a 24-bit source.
pub fn labelled_24bit(edition: &Encoding) -> bool {
    edition.encoding.contains("24bit")
}

/// Run the metadata gates in order: lossless, scene, trumpable.
///
/// The order is observable through the recorded outcome: a scene release
/// that is also not lossless records `no flac`, never `scene`. Trumpable
/// only blocks discovered candidates; an explicitly supplied URL is taken
/// as the operator overriding that gate.
pub fn screen(edition: &Encoding, explicit: bool) -> GateDecision {
    if !is_lossless(edition) {
        return GateDecision::Reject(Outcome::NoFlac);
    }
    if edition.scene {
        return GateDecision::Reject(Outcome::Scene);
    }
    if edition.trumpable && !explicit {
        return GateDecision::Reject(Outcome::Trumpable);
    }
    GateDecision::Proceed
}

/// Gate over the probed stream properties of the actual files.
///
/// Multichannel is a skip, not a rejection: the id stays uncached so a
/// later stereo re-rip under the same listing is retried naturally.
pub fn screen_probe(probe: &SourceProbe) -> GateDecision {
    if probe.is_multichannel() {
        return GateDecision::Skip;
    }
    GateDecision::Proceed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::types::test_support::encoding;

    #[test]
    fn test_lossless_by_format_or_label() {
        assert!(is_lossless(&encoding(1, "FLAC", "Lossless")));
        assert!(is_lossless(&encoding(1, "FLAC", "24bit Lossless")));
        // some listings carry the label but not the container name
        assert!(is_lossless(&encoding(1, "", "Lossless")));
        assert!(!is_lossless(&encoding(1, "MP3", "320")));
    }

    #[test]
    fn test_clean_flac_proceeds() {
        let e = encoding(1, "FLAC", "Lossless");
        assert_eq!(screen(&e, false), GateDecision::Proceed);
    }

    #[test]
    fn test_non_lossless_rejected_first() {
        // A scene MP3 records "no flac", not "scene"; the gate order is
        // part of the cache contract.
        let mut e = encoding(1, "MP3", "320");
        e.scene = true;
        assert_eq!(screen(&e, false), GateDecision::Reject(Outcome::NoFlac));
    }

    #[test]
    fn test_scene_rejected_before_trumpable() {
        let mut e = encoding(1, "FLAC", "Lossless");
        e.scene = true;
        e.trumpable = true;
        assert_eq!(screen(&e, false), GateDecision::Reject(Outcome::Scene));
    }

    #[test]
    fn test_trumpable_blocks_discovered_only() {
        let mut e = encoding(1, "FLAC", "Lossless");
        e.trumpable = true;
        assert_eq!(screen(&e, false), GateDecision::Reject(Outcome::Trumpable));
        assert_eq!(screen(&e, true), GateDecision::Proceed);
    }

    #[test]
    fn test_scene_not_overridden_by_explicit() {
        let mut e = encoding(1, "FLAC", "Lossless");
        e.scene = true;
        assert_eq!(screen(&e, true), GateDecision::Reject(Outcome::Scene));
    }

    #[test]
    fn test_labelled_24bit() {
        assert!(labelled_24bit(&encoding(1, "FLAC", "24bit Lossless")));
        assert!(!labelled_24bit(&encoding(1, "FLAC", "Lossless")));
    }

    #[test]
    fn test_multichannel_is_a_skip() {
        let mut probe = SourceProbe {
            bits_per_sample: 16,
            channels: 2,
            sample_rate: 44100,
        };
        assert_eq!(screen_probe(&probe), GateDecision::Proceed);
        probe.channels = 6;
        assert_eq!(screen_probe(&probe), GateDecision::Skip);
    }
}
