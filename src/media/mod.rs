//! Media assets: the image allow-list and the stored-filename scheme.

pub mod sniff;

use std::sync::LazyLock;

use chrono::{DateTime, SecondsFormat, Utc};
use regex::Regex;
use serde::{Serialize, Serializer};

use crate::storage::{StoredObject, leaf_name};

/// Image types accepted for upload, each with its canonical extension.
pub const ALLOWED_TYPES: [(&str, &str); 5] = [
    ("image/jpeg", ".jpg"),
    ("image/png", ".png"),
    ("image/gif", ".gif"),
    ("image/webp", ".webp"),
    ("image/svg+xml", ".svg"),
];

/// Base name used when normalization leaves nothing behind.
pub const FALLBACK_BASE: &str = "media";

/// Bytes of CSPRNG output drawn per filename suffix.
const TOKEN_BYTES: usize = 8;
/// Hex characters of the token kept in the filename.
const TOKEN_HEX_LEN: usize = 12;

static DISALLOWED_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9_-]+").expect("valid regex"));
static HYPHEN_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"-{2,}").expect("valid regex"));

/// Canonical extension (with leading dot) for an allow-listed MIME type.
pub fn extension_for(mime: &str) -> Option<&'static str> {
    ALLOWED_TYPES
        .iter()
        .find(|(allowed, _)| *allowed == mime)
        .map(|(_, ext)| *ext)
}

/// One stored image, as reported by the listing and upload endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaAsset {
    /// Human-friendly name.
    pub name: String,
    /// Unique key within the uploads store.
    pub filename: String,
    pub url: String,
    pub size: u64,
    pub mime: String,
    #[serde(serialize_with = "iso8601")]
    pub uploaded_at: DateTime<Utc>,
}

impl MediaAsset {
    /// Describe an object found by listing the uploads store.
    pub fn from_stored(object: StoredObject) -> Self {
        Self {
            name: stem(&object.name).to_string(),
            url: media_url(&object.name),
            filename: object.name,
            size: object.size,
            mime: object.mime,
            uploaded_at: object.modified,
        }
    }
}

fn iso8601<S: Serializer>(at: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&at.to_rfc3339_opts(SecondsFormat::Secs, false))
}

/// URL at which the media endpoint serves `filename`.
pub fn media_url(filename: &str) -> String {
    let encoded: String = url::form_urlencoded::byte_serialize(filename.as_bytes()).collect();
    format!("media.php?file={encoded}")
}

/// The leaf name of `path` without its final extension.
///
/// `photo.final.png` gives `photo.final`; `.hidden` gives an empty stem.
pub fn stem(path: &str) -> &str {
    let leaf = leaf_name(path).unwrap_or("");
    match leaf.rfind('.') {
        Some(dot) => &leaf[..dot],
        None => leaf,
    }
}

/// Derive the base of a stored filename from the client's original name.
///
/// Strips the extension, lowercases, collapses every run of characters
/// outside `[a-z0-9_-]` into one hyphen and trims hyphens from both ends.
pub fn normalize_base(original_name: &str) -> String {
    let lowered = stem(original_name).to_lowercase();
    let replaced = DISALLOWED_RUN.replace_all(&lowered, "-");
    let collapsed = HYPHEN_RUN.replace_all(&replaced, "-");
    let trimmed = collapsed.trim_matches('-');

    if trimmed.is_empty() {
        FALLBACK_BASE.to_string()
    } else {
        trimmed.to_string()
    }
}

/// `YYYYMMDD-HHMMSS-<12 hex>` suffix for a stored filename.
pub fn unique_suffix(now: DateTime<Utc>) -> String {
    let token: [u8; TOKEN_BYTES] = rand::random();
    let hex = hex::encode(token);
    format!("{}-{}", now.format("%Y%m%d-%H%M%S"), &hex[..TOKEN_HEX_LEN])
}

/// Compose `{base}-{suffix}{extension}`.
pub fn stored_filename(original_name: &str, extension: &str, now: DateTime<Utc>) -> String {
    format!(
        "{}-{}{}",
        normalize_base(original_name),
        unique_suffix(now),
        extension
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 18, 9, 5, 7).unwrap()
    }

    #[test]
    fn normalize_strips_extension_and_symbols() {
        assert_eq!(normalize_base("My Photo!.png"), "my-photo");
        assert_eq!(normalize_base("  --Hello__World--.JPG"), "hello__world");
        assert_eq!(normalize_base("a---b...c.gif"), "a-b-c");
        assert_eq!(normalize_base("Résumé 2024.webp"), "r-sum-2024");
    }

    #[test]
    fn normalize_handles_odd_names() {
        assert_eq!(normalize_base("no_extension"), "no_extension");
        assert_eq!(normalize_base("!!!.png"), FALLBACK_BASE);
        assert_eq!(normalize_base(""), FALLBACK_BASE);
        assert_eq!(normalize_base(".png"), FALLBACK_BASE);
        assert_eq!(normalize_base("../../evil/Shot.png"), "shot");
    }

    #[test]
    fn suffix_has_timestamp_and_hex_token() {
        let suffix = unique_suffix(fixed_now());
        let (stamp, token) = suffix.rsplit_once('-').unwrap();
        assert_eq!(stamp, "20261018-090507");
        assert_eq!(token.len(), TOKEN_HEX_LEN);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn suffixes_differ_within_the_same_second() {
        let now = fixed_now();
        assert_ne!(unique_suffix(now), unique_suffix(now));
    }

    #[test]
    fn stored_filename_layout() {
        let name = stored_filename("My Photo!.png", ".png", fixed_now());
        assert!(name.starts_with("my-photo-20261018-090507-"));
        assert!(name.ends_with(".png"));
        assert_eq!(name.len(), "my-photo-20261018-090507-".len() + TOKEN_HEX_LEN + 4);
    }

    #[test]
    fn allow_list_maps_extensions() {
        assert_eq!(extension_for("image/jpeg"), Some(".jpg"));
        assert_eq!(extension_for("image/svg+xml"), Some(".svg"));
        assert_eq!(extension_for("image/bmp"), None);
        assert_eq!(extension_for("text/html"), None);
    }

    #[test]
    fn asset_serializes_with_iso_timestamp() {
        let asset = MediaAsset::from_stored(StoredObject {
            name: "cat photo.png".into(),
            size: 12,
            modified: fixed_now(),
            mime: "image/png".into(),
        });
        let json = serde_json::to_value(&asset).unwrap();
        assert_eq!(json["name"], "cat photo");
        assert_eq!(json["url"], "media.php?file=cat+photo.png");
        assert_eq!(json["uploadedAt"], "2026-10-18T09:05:07+00:00");
    }
}
