//! S3 client module with AWS SigV4 signing
//!
//! This module provides:
//! - SHA-256 / HMAC primitives and the SigV4 signing-key chain
//! - Header signing and presigned-URL query signing
//! - Async upload / delete / exists operations
//! - A typed error taxonomy (configuration, validation, transport, API)

pub mod client;
pub mod crypto;
pub mod error;
pub mod signer;
pub mod types;

// Re-export main types for convenience
pub use client::S3Client;
pub use error::{ErrorKind, Result, S3Error, ValidationError};
pub use signer::{S3SignerV4, SigningContext};
pub use types::{ObjectMetadata, UploadOptions, UploadResult};
