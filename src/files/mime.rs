//! Static extension → MIME table
//!
//! The table is immutable; two indexes (by extension, by MIME) are built on
//! first use.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

/// Generic fallback type, always accepted by the validator
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Broad family a MIME type belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MimeCategory {
    Image,
    Document,
    Archive,
    Audio,
    Video,
    Binary,
}

impl MimeCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            MimeCategory::Image => "image",
            MimeCategory::Document => "document",
            MimeCategory::Archive => "archive",
            MimeCategory::Audio => "audio",
            MimeCategory::Video => "video",
            MimeCategory::Binary => "binary",
        }
    }
}

impl fmt::Display for MimeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the lookup table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MimeTypeEntry {
    pub mime: &'static str,
    pub extensions: &'static [&'static str],
    pub category: MimeCategory,
}

const fn entry(
    mime: &'static str,
    extensions: &'static [&'static str],
    category: MimeCategory,
) -> MimeTypeEntry {
    MimeTypeEntry {
        mime,
        extensions,
        category,
    }
}

/// Every MIME type the client knows about
pub static MIME_TYPES: &[MimeTypeEntry] = &[
    // Images
    entry("image/jpeg", &["jpg", "jpeg"], MimeCategory::Image),
    entry("image/png", &["png"], MimeCategory::Image),
    entry("image/gif", &["gif"], MimeCategory::Image),
    entry("image/webp", &["webp"], MimeCategory::Image),
    entry("image/svg+xml", &["svg"], MimeCategory::Image),
    entry("image/bmp", &["bmp"], MimeCategory::Image),
    entry("image/tiff", &["tif", "tiff"], MimeCategory::Image),
    entry("image/x-icon", &["ico"], MimeCategory::Image),
    entry("image/heic", &["heic"], MimeCategory::Image),
    entry("image/avif", &["avif"], MimeCategory::Image),
    // Documents
    entry("application/pdf", &["pdf"], MimeCategory::Document),
    entry("application/msword", &["doc"], MimeCategory::Document),
    entry(
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        &["docx"],
        MimeCategory::Document,
    ),
    entry("application/vnd.ms-excel", &["xls"], MimeCategory::Document),
    entry(
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        &["xlsx"],
        MimeCategory::Document,
    ),
    entry("application/vnd.ms-powerpoint", &["ppt"], MimeCategory::Document),
    entry(
        "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        &["pptx"],
        MimeCategory::Document,
    ),
    entry("application/vnd.oasis.opendocument.text", &["odt"], MimeCategory::Document),
    entry("application/rtf", &["rtf"], MimeCategory::Document),
    entry("text/plain", &["txt", "log"], MimeCategory::Document),
    entry("text/csv", &["csv"], MimeCategory::Document),
    entry("text/markdown", &["md"], MimeCategory::Document),
    entry("application/json", &["json"], MimeCategory::Document),
    entry("application/xml", &["xml"], MimeCategory::Document),
    // Archives
    entry("application/zip", &["zip"], MimeCategory::Archive),
    entry("application/x-tar", &["tar"], MimeCategory::Archive),
    entry("application/gzip", &["gz", "tgz"], MimeCategory::Archive),
    entry("application/x-7z-compressed", &["7z"], MimeCategory::Archive),
    entry("application/vnd.rar", &["rar"], MimeCategory::Archive),
    // Audio
    entry("audio/mpeg", &["mp3"], MimeCategory::Audio),
    entry("audio/wav", &["wav"], MimeCategory::Audio),
    entry("audio/ogg", &["ogg", "oga"], MimeCategory::Audio),
    entry("audio/mp4", &["m4a"], MimeCategory::Audio),
    entry("audio/aac", &["aac"], MimeCategory::Audio),
    entry("audio/flac", &["flac"], MimeCategory::Audio),
    // Video
    entry("video/mp4", &["mp4", "m4v"], MimeCategory::Video),
    entry("video/webm", &["webm"], MimeCategory::Video),
    entry("video/quicktime", &["mov"], MimeCategory::Video),
    entry("video/x-msvideo", &["avi"], MimeCategory::Video),
    entry("video/x-matroska", &["mkv"], MimeCategory::Video),
    // Binary
    entry(OCTET_STREAM, &["bin"], MimeCategory::Binary),
];

static BY_EXTENSION: LazyLock<HashMap<&'static str, &'static MimeTypeEntry>> =
    LazyLock::new(|| {
        MIME_TYPES
            .iter()
            .flat_map(|entry| entry.extensions.iter().map(move |ext| (*ext, entry)))
            .collect()
    });

static BY_MIME: LazyLock<HashMap<&'static str, &'static MimeTypeEntry>> =
    LazyLock::new(|| MIME_TYPES.iter().map(|entry| (entry.mime, entry)).collect());

/// Look up an extension (case-insensitive, without the dot)
pub fn lookup_extension(ext: &str) -> Option<&'static MimeTypeEntry> {
    BY_EXTENSION.get(ext.to_ascii_lowercase().as_str()).copied()
}

/// Look up a MIME type, ignoring parameters such as `; charset=utf-8`
pub fn lookup_mime(mime: &str) -> Option<&'static MimeTypeEntry> {
    BY_MIME.get(essence(mime).as_str()).copied()
}

/// Lowercased extension of `filename`, if it has one.
///
/// Dot-files such as `.env` have no extension.
pub fn extension_of(filename: &str) -> Option<String> {
    let name = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => Some(ext.to_ascii_lowercase()),
        _ => None,
    }
}

/// MIME type for `filename`, `application/octet-stream` when unknown
pub fn resolve_content_type(filename: &str) -> &'static str {
    extension_of(filename)
        .and_then(|ext| lookup_extension(&ext))
        .map_or(OCTET_STREAM, |entry| entry.mime)
}

/// Category of `mime`; unknown types count as binary
pub fn category_of(mime: &str) -> MimeCategory {
    lookup_mime(mime).map_or(MimeCategory::Binary, |entry| entry.category)
}

/// Every MIME type in the table, in table order
pub fn known_mime_types() -> Vec<String> {
    MIME_TYPES.iter().map(|entry| entry.mime.to_string()).collect()
}

/// `type/subtype` without parameters, lowercased
pub(crate) fn essence(mime: &str) -> String {
    mime.split(';').next().unwrap_or("").trim().to_ascii_lowercase()
}
