//! S3 request options and response structures

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::files::FileValidationOptions;

/// Options for [`crate::S3Client::upload`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadOptions {
    /// Key prefix, e.g. `avatars` → `avatars/2024/01/31/<id>.png`
    pub prefix: Option<String>,
    /// Bucket override
    pub bucket: Option<String>,
    /// Use this exact key instead of generating one
    pub key: Option<String>,
    /// Overrides the file's declared content type
    pub content_type: Option<String>,
    /// Sent as `x-amz-meta-<name>` headers
    pub metadata: BTreeMap<String, String>,
    pub validation: FileValidationOptions,
}

impl UploadOptions {
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn with_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = Some(bucket.into());
        self
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_metadata(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(name.into(), value.into());
        self
    }

    pub fn with_validation(mut self, validation: FileValidationOptions) -> Self {
        self.validation = validation;
        self
    }
}

/// Outcome of a successful upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResult {
    pub object_key: String,
    pub bucket: String,
    pub size_bytes: u64,
    pub content_type: String,
    /// ETag without surrounding quotes, if the backend returned one
    pub etag: Option<String>,
    pub public_url: String,
}

/// Metadata returned by a HEAD request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMetadata {
    pub content_type: Option<String>,
    pub content_length: Option<u64>,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}
