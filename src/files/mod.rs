//! File handling around uploads
//!
//! - MIME resolution from a static extension table
//! - Date-partitioned, collision-resistant object keys
//! - Size / type / category validation

pub mod key;
pub mod mime;
pub mod validate;

use bytes::Bytes;
use std::path::Path;

pub use key::{generate_object_key, validate_bucket_name, validate_object_key};
pub use mime::{resolve_content_type, MimeCategory, MimeTypeEntry, OCTET_STREAM};
pub use validate::{validate_file, FileValidationOptions};

/// A file to upload. The client only borrows it for the duration of a call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDescriptor {
    pub content: Bytes,
    pub filename: String,
    pub content_type: Option<String>,
}

impl FileDescriptor {
    pub fn new(content: impl Into<Bytes>, filename: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            filename: filename.into(),
            content_type: None,
        }
    }

    /// Declare the content type instead of inferring it from the filename
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Read a file from disk, keeping only its final path component as the name
    pub async fn from_path(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read(path).await?;
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self::new(content, filename))
    }

    pub fn size(&self) -> u64 {
        self.content.len() as u64
    }
}
