//! Object key generation
//!
//! Keys look like `[prefix/]YYYY/MM/DD/<uuid>.<ext>`. The random part is a
//! v4 UUID (122 random bits), so two calls never collide in practice even
//! for the same filename.

use chrono::{DateTime, Utc};
use std::fmt::Write as FmtWrite;
use uuid::Uuid;

use super::mime::extension_of;
use crate::s3::ValidationError;

/// Extension used when the filename has none
pub const DEFAULT_EXTENSION: &str = "bin";

/// Longest key S3 accepts, in bytes
pub const MAX_KEY_LEN: usize = 1024;

/// Bucket name length bounds
const BUCKET_NAME_LEN: std::ops::RangeInclusive<usize> = 3..=63;

/// Generate a fresh, date-partitioned key for `filename`
pub fn generate_object_key(filename: &str, prefix: Option<&str>) -> String {
    generate_object_key_at(filename, prefix, Utc::now())
}

/// Same as [`generate_object_key`] with an explicit clock
pub fn generate_object_key_at(filename: &str, prefix: Option<&str>, now: DateTime<Utc>) -> String {
    let ext = extension_of(filename)
        .filter(|ext| ext.bytes().all(|b| b.is_ascii_alphanumeric()))
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_string());

    let mut key = String::with_capacity(64);
    if let Some(prefix) = prefix.map(|p| p.trim_matches('/')).filter(|p| !p.is_empty()) {
        key.push_str(prefix);
        key.push('/');
    }
    let _ = write!(key, "{}/{}.{}", now.format("%Y/%m/%d"), Uuid::new_v4(), ext);
    key
}

/// Reject keys S3 would refuse or that would produce ambiguous URLs
pub fn validate_object_key(key: &str) -> Result<(), ValidationError> {
    let valid = !key.is_empty()
        && !key.starts_with('/')
        && key.len() <= MAX_KEY_LEN
        && !key.chars().any(char::is_control);

    if valid {
        Ok(())
    } else {
        Err(ValidationError::InvalidKey {
            key: key.to_string(),
        })
    }
}

/// Check a bucket name against S3 naming rules: 3-63 characters of
/// `[a-z0-9.-]`, starting and ending with a letter or digit, no `..`
pub fn validate_bucket_name(bucket: &str) -> Result<(), ValidationError> {
    let edge_ok = |b: Option<&u8>| b.is_some_and(|b| b.is_ascii_lowercase() || b.is_ascii_digit());
    let bytes = bucket.as_bytes();

    let valid = BUCKET_NAME_LEN.contains(&bucket.len())
        && bytes
            .iter()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || *b == b'.' || *b == b'-')
        && edge_ok(bytes.first())
        && edge_ok(bytes.last())
        && !bucket.contains("..");

    if valid {
        Ok(())
    } else {
        Err(ValidationError::InvalidBucket {
            bucket: bucket.to_string(),
        })
    }
}
