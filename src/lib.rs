//! s3upload - S3-compatible upload client with first-principles SigV4 signing

pub mod config;
pub mod files;
pub mod s3;

pub use config::ClientConfig;
pub use files::{FileDescriptor, FileValidationOptions, MimeCategory};
pub use s3::{
    ErrorKind, ObjectMetadata, S3Client, S3Error, UploadOptions, UploadResult, ValidationError,
};
