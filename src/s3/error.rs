//! S3 client errors
//!
//! Every failure is scoped to a single operation and falls into one of four
//! [`ErrorKind`]s, so callers can tell "fix your input" from "retry the
//! network call" from "the backend rejected the request".

use hyper::StatusCode;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::time::Duration;
use thiserror::Error;

use crate::files::MimeCategory;

/// Coarse error classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Required client settings are missing or malformed
    Configuration,
    /// The file or request arguments were rejected before any network call
    Validation,
    /// DNS / connect / TLS / timeout failures
    Transport,
    /// The storage backend answered with an unexpected status
    Api,
}

/// Reasons a file or argument fails local validation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("file content is empty")]
    EmptyContent,

    #[error("filename is empty")]
    MissingFilename,

    #[error("file size {size} exceeds the maximum of {max} bytes")]
    TooLarge { size: u64, max: u64 },

    #[error("content type {mime} is not allowed")]
    DisallowedType { mime: String },

    #[error("content type {mime} ({category}) is not in the allowed categories")]
    DisallowedCategory { mime: String, category: MimeCategory },

    #[error("object key {key:?} is invalid")]
    InvalidKey { key: String },

    #[error("bucket name {bucket:?} is invalid")]
    InvalidBucket { bucket: String },

    #[error("expiry of {seconds}s is outside 1..=604800")]
    InvalidExpiry { seconds: u64 },

    #[error("header {name} has an invalid name or value")]
    InvalidHeader { name: String },
}

impl ValidationError {
    /// Name of the offending input
    pub fn field(&self) -> &str {
        match self {
            ValidationError::EmptyContent | ValidationError::TooLarge { .. } => "content",
            ValidationError::MissingFilename => "filename",
            ValidationError::DisallowedType { .. } | ValidationError::DisallowedCategory { .. } => {
                "content_type"
            }
            ValidationError::InvalidKey { .. } => "key",
            ValidationError::InvalidBucket { .. } => "bucket",
            ValidationError::InvalidExpiry { .. } => "expiry",
            ValidationError::InvalidHeader { name } => name.as_str(),
        }
    }
}

/// S3 client errors
#[derive(Error, Debug)]
pub enum S3Error {
    #[error("missing required configuration: {field}")]
    MissingConfig { field: &'static str },

    #[error("invalid endpoint {endpoint:?}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    #[error("TLS setup failed: {0}")]
    Tls(#[from] native_tls::Error),

    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("transport error: {message}")]
    Transport {
        message: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("request timed out after {after:?}")]
    Timeout { after: Duration },

    #[error("S3 error: {status} - {message}")]
    Api {
        status: StatusCode,
        code: Option<String>,
        message: String,
        body: String,
    },
}

pub type Result<T> = std::result::Result<T, S3Error>;

impl From<hyper_util::client::legacy::Error> for S3Error {
    fn from(err: hyper_util::client::legacy::Error) -> Self {
        S3Error::Transport {
            message: format!("request failed: {}", err),
            source: Box::new(err),
        }
    }
}

impl From<hyper::Error> for S3Error {
    fn from(err: hyper::Error) -> Self {
        S3Error::Transport {
            message: format!("body error: {}", err),
            source: Box::new(err),
        }
    }
}

impl S3Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            S3Error::MissingConfig { .. } | S3Error::InvalidEndpoint { .. } | S3Error::Tls(_) => {
                ErrorKind::Configuration
            }
            S3Error::Validation(_) => ErrorKind::Validation,
            S3Error::Transport { .. } | S3Error::Timeout { .. } => ErrorKind::Transport,
            S3Error::Api { .. } => ErrorKind::Api,
        }
    }

    /// HTTP status for API errors
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            S3Error::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Name of the configuration field or input at fault, if any
    pub fn field(&self) -> Option<&str> {
        match self {
            S3Error::MissingConfig { field } => Some(*field),
            S3Error::InvalidEndpoint { .. } => Some("endpoint"),
            S3Error::Validation(err) => Some(err.field()),
            _ => None,
        }
    }

    /// Whether re-issuing the same call could succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            S3Error::Transport { .. } | S3Error::Timeout { .. } => true,
            S3Error::Api { status, .. } => {
                *status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
            }
            _ => false,
        }
    }

    /// Build an API error from a non-2xx response, pulling `Code` and
    /// `Message` out of the S3 XML error document when there is one.
    pub fn from_response(status: StatusCode, body: &[u8]) -> Self {
        let body = String::from_utf8_lossy(body).into_owned();
        let (code, message) = parse_error_document(&body);
        let message = message
            .or_else(|| code.clone())
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("unexpected status").to_string());
        S3Error::Api {
            status,
            code,
            message,
            body,
        }
    }
}

/// Extract `<Code>` and `<Message>` from an S3 `<Error>` document
fn parse_error_document(xml: &str) -> (Option<String>, Option<String>) {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text_start = true;
    reader.config_mut().trim_text_end = true;

    let mut code = None;
    let mut message = None;
    let mut current_text = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Text(e)) => {
                current_text.clear();
                if let Ok(text) = e.unescape() {
                    current_text.push_str(&text);
                }
            }
            Ok(Event::End(e)) => {
                match e.local_name().as_ref() {
                    b"Code" => code = Some(std::mem::take(&mut current_text)),
                    b"Message" => message = Some(std::mem::take(&mut current_text)),
                    _ => {}
                }
                current_text.clear();
            }
            Ok(Event::Eof) | Err(_) => break,
            _ => {}
        }
    }

    (
        code.filter(|c| !c.is_empty()),
        message.filter(|m| !m.is_empty()),
    )
}
