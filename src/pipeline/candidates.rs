//! Candidate selection: explicit release URLs or the seeding listing.

use crate::api::TrackerApi;
use crate::error::{Error, Result};
use url::Url;

/// One torrent queued for processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
    /// Release (group) id
    pub group_id: u64,
    /// Torrent id, the cache key
    pub torrent_id: u64,
    /// Whether the operator named this torrent on the command line.
    /// Explicit candidates override the trumpable gate.
    pub explicit: bool,
}

/// Parse a `torrents.php?id=G&torrentid=T` permalink into a candidate.
pub fn parse_release_url(input: &str) -> Result<Candidate> {
    let url = Url::parse(input).map_err(|e| Error::Other(format!("invalid URL '{}': {}", input, e)))?;
    let mut group_id = None;
    let mut torrent_id = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "id" => group_id = value.parse().ok(),
            "torrentid" => torrent_id = value.parse().ok(),
            _ => {}
        }
    }
    match (group_id, torrent_id) {
        (Some(group_id), Some(torrent_id)) => Ok(Candidate {
            group_id,
            torrent_id,
            explicit: true,
        }),
        _ => Err(Error::Other(format!(
            "'{}' does not look like a release permalink (need both id and torrentid)",
            input
        ))),
    }
}

/// All of the account's seeded torrents as discovered candidates, in the
/// tracker's listing order.
pub async fn discover(api: &dyn TrackerApi) -> Result<Vec<Candidate>> {
    let seeding = api.seeding().await?;
    Ok(seeding
        .into_iter()
        .map(|item| Candidate {
            group_id: item.group_id,
            torrent_id: item.torrent_id,
            explicit: false,
        })
        .collect())
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_permalink() {
        let c = parse_release_url("https://redacted.ch/torrents.php?id=72189681&torrentid=29991962")
            .unwrap();
        assert_eq!(c.group_id, 72189681);
        assert_eq!(c.torrent_id, 29991962);
        assert!(c.explicit);
    }

    #[test]
    fn test_parse_with_fragment_and_extra_params() {
        let c = parse_release_url(
            "https://redacted.ch/torrents.php?page=2&id=4&torrentid=17#torrent17",
        )
        .unwrap();
        assert_eq!(c.group_id, 4);
        assert_eq!(c.torrent_id, 17);
    }

    #[test]
    fn test_parse_rejects_group_only_url() {
        assert!(parse_release_url("https://redacted.ch/torrents.php?id=4").is_err());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_release_url("not a url").is_err());
        assert!(parse_release_url("https://redacted.ch/torrents.php?id=x&torrentid=y").is_err());
    }
}
