//! Utility functions shared across the pipeline.

/// A single entry from a torrent's file manifest: file name and size in bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    /// File name relative to the torrent's folder
    pub name: String,
    /// File size in bytes
    pub size: u64,
}

/// Split a tracker file-list manifest into its entries.
///
/// The tracker encodes a torrent's contents as
/// `name{{{size}}}|||name{{{size}}}|||...` with HTML entities in the names.
/// Entries whose size field does not parse are dropped rather than failing
/// the whole manifest — the pipeline only ever needs the leading entries.
pub fn split_filelist(file_list: &str) -> Vec<ManifestEntry> {
    html_unescape(file_list)
        .split("|||")
        .filter_map(|entry| {
            let entry = entry.trim_end_matches("}}}");
            let (name, size) = entry.split_once("{{{")?;
            Some(ManifestEntry {
                name: name.to_string(),
                size: size.parse().ok()?,
            })
        })
        .collect()
}

/// Decode the HTML entities the tracker embeds in names and file lists.
///
/// Handles the named entities Gazelle actually emits plus numeric
/// (`&#NNN;` / `&#xHH;`) references. Unknown entities are passed through
/// verbatim. No crate in our stack covers entity decoding, so this stays
/// local and deliberately small.
pub fn html_unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        match tail.find(';') {
            // Entities are short; anything longer is just a stray ampersand.
            Some(end) if end <= 10 => {
                let entity = &tail[1..end];
                match decode_entity(entity) {
                    Some(decoded) => out.push_str(&decoded),
                    None => out.push_str(&tail[..=end]),
                }
                rest = &tail[end + 1..];
            }
            _ => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(entity: &str) -> Option<String> {
    match entity {
        "amp" => Some("&".to_string()),
        "lt" => Some("<".to_string()),
        "gt" => Some(">".to_string()),
        "quot" => Some("\"".to_string()),
        "apos" => Some("'".to_string()),
        "nbsp" => Some("\u{a0}".to_string()),
        _ => {
            let code = entity.strip_prefix('#')?;
            let value = match code.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => code.parse().ok()?,
            };
            char::from_u32(value).map(|c| c.to_string())
        }
    }
}

/// Convert a byte count to a rounded human-readable size.
pub fn prettify_bytes(bytes: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = 1024 * 1024;
    const GIB: u64 = 1024 * 1024 * 1024;
    const TIB: u64 = 1024 * 1024 * 1024 * 1024;
    match bytes {
        b if b >= TIB => format!("{:.1} TB", b as f64 / TIB as f64),
        b if b >= GIB => format!("{:.1} GB", b as f64 / GIB as f64),
        b if b >= MIB => format!("{:.0} MB", b as f64 / MIB as f64),
        b if b >= KIB => format!("{:.0} KB", b as f64 / KIB as f64),
        b => format!("{} B", b),
    }
}

/// Wrap a multi-line message in a dashed box for operator-facing output.
pub fn border_msg(msg: &str) -> String {
    let width = msg.lines().map(str::len).max().unwrap_or(0);
    let dash = "-".repeat(width.saturating_sub(1).max(1));
    format!("+{dash}+\n{msg}\n+{dash}+")
}
