//! Typed wire records for the tracker's AJAX responses.
//!
//! Every response kind the pipeline consumes is an explicit record with
//! named fields and validated deserialization; nothing is read out of
//! untyped JSON maps. Fields the tracker sometimes omits are `Option` or
//! defaulted. Numeric ids arrive as either JSON numbers or strings
//! depending on the endpoint, so id fields go through a lenient
//! deserializer.

use serde::{Deserialize, Deserializer, Serialize};

/// The outer envelope every AJAX response is wrapped in.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    /// `"success"` or `"failure"`
    pub status: String,
    /// Present on success; shape depends on the action
    #[serde(default)]
    pub response: Option<serde_json::Value>,
    /// Present on failure
    #[serde(default)]
    pub error: Option<String>,
}

/// Deserialize a u64 that the tracker may send as a number or a string.
pub(crate) fn lenient_u64<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumOrStr {
        Num(u64),
        Str(String),
    }
    match NumOrStr::deserialize(deserializer)? {
        NumOrStr::Num(n) => Ok(n),
        NumOrStr::Str(s) => s.parse().map_err(serde::de::Error::custom),
    }
}

/// Like [`lenient_u64`] but tolerating absence (defaults to 0).
pub(crate) fn lenient_u64_default<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Maybe {
        Num(u64),
        Str(String),
        Null,
    }
    match Maybe::deserialize(deserializer)? {
        Maybe::Num(n) => Ok(n),
        Maybe::Str(s) if s.is_empty() => Ok(0),
        Maybe::Str(s) => s.parse().map_err(serde::de::Error::custom),
        Maybe::Null => Ok(0),
    }
}

/// Account details from `action=index`, needed for discovery paging and
/// announce credentials.
#[derive(Debug, Clone, Deserialize)]
pub struct AccountInfo {
    /// Numeric user id, used to page the account's torrent listings
    #[serde(deserialize_with = "lenient_u64")]
    pub id: u64,
    /// Display name, logged at startup
    pub username: String,
    /// Announce passkey embedded in built torrents
    #[serde(default)]
    pub passkey: String,
}

/// One item from a `user_torrents` page.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserTorrentItem {
    /// Release (torrent group) id
    #[serde(deserialize_with = "lenient_u64")]
    pub group_id: u64,
    /// Torrent (encoding) id
    #[serde(deserialize_with = "lenient_u64")]
    pub torrent_id: u64,
    /// Release name
    #[serde(default)]
    pub name: String,
    /// Main artist name
    #[serde(default)]
    pub artist_name: Option<String>,
}

/// A page of the account's currently-seeded torrents. An empty `seeding`
/// list is the normal end-of-listing signal, not an error.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SeedingPage {
    /// Items on this page
    #[serde(default)]
    pub seeding: Vec<UserTorrentItem>,
}

/// One artist credit on a release.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Artist {
    /// Artist id
    #[serde(default, deserialize_with = "lenient_u64_default")]
    pub id: u64,
    /// Artist display name (HTML-escaped on the wire)
    pub name: String,
}

/// Artist credits grouped by role. Only main artists drive naming; the
/// rest are carried for completeness.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MusicInfo {
    /// Main artists
    #[serde(default)]
    pub artists: Vec<Artist>,
    /// Guest artists
    #[serde(default, rename = "with")]
    pub with_artists: Vec<Artist>,
}

/// Release (torrent group) metadata.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Release {
    /// Group id
    #[serde(default, deserialize_with = "lenient_u64_default")]
    pub id: u64,
    /// Release name (HTML-escaped on the wire)
    #[serde(default)]
    pub name: String,
    /// Original release year
    #[serde(default)]
    pub year: u32,
    /// Record label of the original release
    #[serde(default)]
    pub record_label: String,
    /// Catalogue number of the original release
    #[serde(default)]
    pub catalogue_number: String,
    /// Artist credits
    #[serde(default)]
    pub music_info: MusicInfo,
    /// Descriptive tags, first one is used on upload
    #[serde(default)]
    pub tags: Vec<String>,
}

/// One torrent (encoding) of a release.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Encoding {
    /// Torrent id
    #[serde(default, deserialize_with = "lenient_u64_default")]
    pub id: u64,
    /// Source media (CD, WEB, Vinyl, ...)
    #[serde(default)]
    pub media: String,
    /// Container format (FLAC, MP3, ...)
    #[serde(default)]
    pub format: String,
    /// Encoding label (Lossless, 24bit Lossless, V0 (VBR), 320, ...)
    #[serde(default)]
    pub encoding: String,
    /// Whether this is a remaster
    #[serde(default)]
    pub remastered: bool,
    /// Remaster year (0 when unremastered)
    #[serde(default)]
    pub remaster_year: u32,
    /// Remaster title ("" when unremastered)
    #[serde(default)]
    pub remaster_title: String,
    /// Edition record label
    #[serde(default)]
    pub remaster_record_label: String,
    /// Edition catalogue number
    #[serde(default)]
    pub remaster_catalogue_number: String,
    /// Scene-sourced release flag
    #[serde(default)]
    pub scene: bool,
    /// Trumpable flag (absent on some endpoints)
    #[serde(default)]
    pub trumpable: bool,
    /// Number of files in the torrent
    #[serde(default)]
    pub file_count: u32,
    /// Total size in bytes
    #[serde(default)]
    pub size: u64,
    /// `name{{{size}}}|||...` manifest of the torrent's contents
    #[serde(default)]
    pub file_list: String,
    /// Folder the torrent's files live in ("" when the torrent is a bare file)
    #[serde(default)]
    pub file_path: String,
}

/// A release together with all of its encodings (`action=torrentgroup`).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReleaseGroup {
    /// Release metadata
    pub group: Release,
    /// All encodings of the release, the candidate's siblings included
    #[serde(default)]
    pub torrents: Vec<Encoding>,
}

/// Success payload of `action=upload`.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadResponse {
    /// Id of the torrent that was created
    #[serde(rename = "torrentid", deserialize_with = "lenient_u64")]
    pub torrent_id: u64,
    /// Group the torrent landed in
    #[serde(default, rename = "groupid", deserialize_with = "lenient_u64_default")]
    pub group_id: u64,
}

/// One entry from the requests browse feed.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestItem {
    /// Request id
    #[serde(default, deserialize_with = "lenient_u64_default")]
    pub request_id: u64,
    /// Requesting user's display name
    #[serde(default)]
    pub requestor_name: String,
    /// Requested title
    #[serde(default)]
    pub title: String,
    /// Requested year
    #[serde(default)]
    pub year: u32,
    /// Current bounty in bytes
    #[serde(default)]
    pub bounty: u64,
    /// Number of votes
    #[serde(default)]
    pub vote_count: u32,
    /// Acceptable formats, comma-separated as the tracker sends it
    #[serde(default)]
    pub format_list: String,
    /// Whether the request has been filled
    #[serde(default)]
    pub is_filled: bool,
}

/// A page of request results.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestsPage {
    /// Page number this payload describes
    #[serde(default)]
    pub current_page: u32,
    /// Total pages available
    #[serde(default)]
    pub pages: u32,
    /// Results on this page; empty means past the end
    #[serde(default)]
    pub results: Vec<RequestItem>,
}

/// One entry from the notifications feed.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationItem {
    /// Torrent the notification refers to
    #[serde(default, deserialize_with = "lenient_u64_default")]
    pub torrent_id: u64,
    /// Its release group
    #[serde(default, deserialize_with = "lenient_u64_default")]
    pub group_id: u64,
    /// Release name
    #[serde(default)]
    pub group_name: String,
    /// Container format of the new torrent
    #[serde(default)]
    pub format: String,
    /// Encoding label of the new torrent
    #[serde(default)]
    pub encoding: String,
    /// Whether the notification is unread
    #[serde(default)]
    pub unread: bool,
}

/// A page of notifications.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationsPage {
    /// Total pages available
    #[serde(default)]
    pub pages: u32,
    /// Unread count
    #[serde(default)]
    pub num_new: u32,
    /// Results on this page; empty means past the end
    #[serde(default)]
    pub results: Vec<NotificationItem>,
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Builders shared by unit tests across the crate.

    use super::*;

    /// A torrent with the given format/label and empty remaster identity.
    pub(crate) fn encoding(id: u64, format: &str, label: &str) -> Encoding {
        Encoding {
            id,
            media: "CD".to_string(),
            format: format.to_string(),
            encoding: label.to_string(),
            ..Default::default()
        }
    }

    /// A release group named "Fear Not" holding the given torrents.
    pub(crate) fn group_with(torrents: Vec<Encoding>) -> ReleaseGroup {
        ReleaseGroup {
            group: Release {
                id: 72189681,
                name: "Fear Not".to_string(),
                year: 2012,
                music_info: MusicInfo {
                    artists: vec![Artist {
                        id: 1460,
                        name: "Logistics".to_string(),
                    }],
                    ..Default::default()
                },
                tags: vec!["drum.and.bass".to_string()],
                ..Default::default()
            },
            torrents,
        }
    }
}
