//! S3 client implementation
//!
//! - HTTP/1.1 over hyper-util's pooled client, native-tls for TLS
//! - One signed request per operation, no internal retry
//! - Every exchange bounded by a timeout: `request_timeout` for HEAD/DELETE,
//!   `upload_timeout` for PUT
//! - Path-style URLs: `{endpoint}/{bucket}/{key}`

use crate::config::{self, ClientConfig};
use crate::files::{self, FileDescriptor, FileValidationOptions};
use crate::s3::error::{Result, S3Error, ValidationError};
use crate::s3::signer::{S3SignerV4, MAX_PRESIGN_EXPIRY_SECS};
use crate::s3::types::{ObjectMetadata, UploadOptions, UploadResult};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use http_body_util::{BodyExt, Full};
use hyper::header::{HeaderName, HeaderValue};
use hyper::{HeaderMap, Method, Request, StatusCode};
use hyper_tls::HttpsConnector;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client as HyperClient;
use hyper_util::rt::TokioExecutor;
use native_tls::TlsConnector;
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Hex lookup table for URI encoding
static HEX_UPPER: &[u8; 16] = b"0123456789ABCDEF";

/// S3 upload client
///
/// Holds only immutable state, so one instance can be shared by any number
/// of concurrent callers. Clone is cheap - the HTTP pool and config are
/// reference counted.
#[derive(Clone)]
pub struct S3Client {
    /// Hyper HTTP client with connection pool
    client: HyperClient<HttpsConnector<HttpConnector>, Full<Bytes>>,
    /// AWS SigV4 signer
    signer: S3SignerV4,
    config: Arc<ClientConfig>,
}

impl std::fmt::Debug for S3Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Client")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl S3Client {
    /// Create a client for `config`.
    ///
    /// The configuration is not required to be complete here; each
    /// operation checks it before touching the network.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let mut http = HttpConnector::new();
        http.set_nodelay(true);
        http.enforce_http(false);
        http.set_connect_timeout(Some(config.request_timeout()));
        http.set_keepalive(Some(Duration::from_secs(90)));

        let tls = if config.insecure_tls {
            warn!("INSECURE TLS MODE ENABLED: Certificate verification is disabled!");
            TlsConnector::builder()
                .danger_accept_invalid_certs(true)
                .danger_accept_invalid_hostnames(true)
                .build()?
        } else {
            TlsConnector::new()?
        };

        let https = HttpsConnector::from((http, tls.into()));

        let client = HyperClient::builder(TokioExecutor::new())
            .pool_idle_timeout(Duration::from_secs(90))
            .set_host(true)
            .build(https);

        let signer = S3SignerV4::new(
            config.access_key.clone(),
            config.secret_key.clone(),
            config.region.clone(),
        );

        Ok(Self {
            client,
            signer,
            config: Arc::new(config),
        })
    }

    /// Build a client from `S3_*` / `AWS_*` environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        let config = config::load_from_env()?;
        Ok(Self::new(config)?)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Run the file validator with this client's limits and allow-list.
    ///
    /// Returns the content type the file would be stored with.
    pub fn validate(&self, file: &FileDescriptor, options: &FileValidationOptions) -> Result<String> {
        Ok(files::validate_file(
            file,
            options,
            self.config.max_file_size,
            &self.config.allowed_types,
        )?)
    }

    /// Upload a file with a single signed PUT.
    ///
    /// The key is generated as `[prefix/]YYYY/MM/DD/<uuid>.<ext>` unless
    /// `options.key` is set.
    pub async fn upload(&self, file: &FileDescriptor, options: &UploadOptions) -> Result<UploadResult> {
        self.config.validate()?;

        let declared;
        let file = match &options.content_type {
            Some(content_type) => {
                declared = file.clone().with_content_type(content_type.clone());
                &declared
            }
            None => file,
        };
        let content_type = self.validate(file, &options.validation)?;

        let bucket = self.bucket_or_default(options.bucket.as_deref())?;
        let key = match options.key.as_deref() {
            Some(key) => key.to_string(),
            None => files::generate_object_key(&file.filename, options.prefix.as_deref()),
        };
        files::validate_object_key(&key)?;

        let mut headers = BTreeMap::new();
        headers.insert("content-type".to_string(), content_type.clone());
        headers.insert("content-length".to_string(), file.content.len().to_string());
        for (name, value) in &options.metadata {
            let (name, value) = metadata_header(name, value)?;
            headers.insert(name, value);
        }

        let url = Self::build_url(&self.config.endpoint, bucket, &key);
        debug!(bucket, key = %key, size = file.size(), content_type = %content_type, "put_object");

        let signed = self.signer.sign("PUT", &url, headers, &file.content);
        let (status, response_headers, body) = self
            .send(Method::PUT, &url, signed, file.content.clone(), self.config.upload_timeout())
            .await?;

        if !status.is_success() {
            return Err(S3Error::from_response(status, &body));
        }

        let etag = header_str(&response_headers, "etag").map(|etag| etag.trim_matches('"').to_string());
        info!(bucket, key = %key, size = file.size(), "object_uploaded");

        Ok(UploadResult {
            public_url: self.public_url(bucket, &key),
            object_key: key,
            bucket: bucket.to_string(),
            size_bytes: file.size(),
            content_type,
            etag,
        })
    }

    /// Delete an object. Succeeds on 200 or 204.
    pub async fn delete(&self, key: &str, bucket: Option<&str>) -> Result<()> {
        self.config.validate()?;
        files::validate_object_key(key)?;

        let bucket = self.bucket_or_default(bucket)?;
        let url = Self::build_url(&self.config.endpoint, bucket, key);
        debug!(bucket, key, "delete_object");

        let signed = self.signer.sign("DELETE", &url, BTreeMap::new(), b"");
        let (status, _, body) = self
            .send(Method::DELETE, &url, signed, Bytes::new(), self.config.request_timeout())
            .await?;

        if status != StatusCode::OK && status != StatusCode::NO_CONTENT {
            return Err(S3Error::from_response(status, &body));
        }

        info!(bucket, key, "object_deleted");
        Ok(())
    }

    /// HEAD an object.
    ///
    /// `Ok(None)` means the object does not exist. Any non-200 answer is
    /// treated as "does not exist"; statuses other than 404 are logged at
    /// WARN since they usually point at credentials or backend trouble.
    /// Transport failures are still returned as errors.
    pub async fn exists(&self, key: &str, bucket: Option<&str>) -> Result<Option<ObjectMetadata>> {
        self.config.validate()?;
        files::validate_object_key(key)?;

        let bucket = self.bucket_or_default(bucket)?;
        let url = Self::build_url(&self.config.endpoint, bucket, key);
        debug!(bucket, key, "head_object");

        let signed = self.signer.sign("HEAD", &url, BTreeMap::new(), b"");
        let (status, headers, _) = self
            .send(Method::HEAD, &url, signed, Bytes::new(), self.config.request_timeout())
            .await?;

        if status != StatusCode::OK {
            if status != StatusCode::NOT_FOUND {
                warn!(bucket, key, status = %status, "head_object_unexpected_status");
            }
            return Ok(None);
        }

        Ok(Some(ObjectMetadata {
            content_type: header_str(&headers, "content-type").map(str::to_string),
            content_length: header_str(&headers, "content-length").and_then(|v| v.parse().ok()),
            etag: header_str(&headers, "etag").map(|etag| etag.trim_matches('"').to_string()),
            last_modified: header_str(&headers, "last-modified").map(str::to_string),
        }))
    }

    /// Presigned GET URL valid for `expiry_secs` seconds from now.
    ///
    /// No network I/O; the URL points at the signing endpoint since the
    /// host is part of the signature.
    pub fn presigned_url(&self, key: &str, expiry_secs: u64, bucket: Option<&str>) -> Result<String> {
        self.presigned_url_at(key, expiry_secs, bucket, Utc::now())
    }

    /// Same as [`S3Client::presigned_url`] with an explicit signing time
    pub fn presigned_url_at(
        &self,
        key: &str,
        expiry_secs: u64,
        bucket: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<String> {
        self.config.validate()?;
        files::validate_object_key(key)?;
        if expiry_secs == 0 || expiry_secs > MAX_PRESIGN_EXPIRY_SECS {
            return Err(ValidationError::InvalidExpiry { seconds: expiry_secs }.into());
        }

        let bucket = self.bucket_or_default(bucket)?;
        let url = Self::build_url(&self.config.endpoint, bucket, key);
        debug!(bucket, key, expiry_secs, "presign_get_object");

        Ok(self.signer.presign("GET", &url, expiry_secs, now))
    }

    /// Browser-facing URL of an object: `public_url` when configured,
    /// otherwise the signing endpoint
    pub fn public_url(&self, bucket: &str, key: &str) -> String {
        let base = self
            .config
            .public_url
            .as_deref()
            .unwrap_or(&self.config.endpoint);
        Self::build_url(base, bucket, key)
    }

    /// The override when given, else the configured bucket; either must be
    /// a valid bucket name
    fn bucket_or_default<'a>(&'a self, bucket: Option<&'a str>) -> Result<&'a str> {
        let bucket = bucket
            .map(str::trim)
            .filter(|b| !b.is_empty())
            .unwrap_or(&self.config.bucket);
        files::validate_bucket_name(bucket)?;
        Ok(bucket)
    }

    /// Send one signed request and collect the full response.
    async fn send(
        &self,
        method: Method,
        url: &str,
        signed_headers: BTreeMap<String, String>,
        body: Bytes,
        timeout: Duration,
    ) -> Result<(StatusCode, HeaderMap, Bytes)> {
        let mut req = Request::builder().method(method).uri(url);
        for (key, value) in signed_headers.iter() {
            req = req.header(key, value);
        }

        let request = req.body(Full::new(body)).map_err(|e| S3Error::InvalidEndpoint {
            endpoint: self.config.endpoint.clone(),
            reason: format!("request build error: {}", e),
        })?;

        let exchange = async {
            let response = self.client.request(request).await?;
            let status = response.status();
            let headers = response.headers().clone();
            let body = response.into_body().collect().await?.to_bytes();
            Ok::<_, S3Error>((status, headers, body))
        };

        tokio::time::timeout(timeout, exchange)
            .await
            .map_err(|_| S3Error::Timeout { after: timeout })?
    }

    /// Encode an S3 key, preserving forward slashes
    /// Returns Cow::Borrowed when no encoding is needed
    fn encode_s3_key(key: &str) -> Cow<'_, str> {
        let needs_encoding = key
            .bytes()
            .any(|b| !matches!(b, b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b'/'));

        if !needs_encoding {
            return Cow::Borrowed(key);
        }

        let mut result = String::with_capacity(key.len() + 32);
        for byte in key.bytes() {
            match byte {
                b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b'/' => {
                    result.push(byte as char);
                }
                _ => {
                    result.push('%');
                    result.push(HEX_UPPER[(byte >> 4) as usize] as char);
                    result.push(HEX_UPPER[(byte & 0xf) as usize] as char);
                }
            }
        }
        Cow::Owned(result)
    }

    /// Build full S3 URL for a key with pre-allocated capacity
    fn build_url(base: &str, bucket: &str, key: &str) -> String {
        let base = base.trim_end_matches('/');
        let encoded_key = Self::encode_s3_key(key);
        let mut url = String::with_capacity(base.len() + 1 + bucket.len() + 1 + encoded_key.len());
        url.push_str(base);
        url.push('/');
        url.push_str(bucket);
        url.push('/');
        url.push_str(&encoded_key);
        url
    }
}

/// Turn a user metadata entry into a checked `x-amz-meta-*` header
fn metadata_header(name: &str, value: &str) -> Result<(String, String)> {
    let name = name.trim().to_ascii_lowercase();
    let header = if name.starts_with("x-amz-meta-") {
        name
    } else {
        format!("x-amz-meta-{}", name)
    };

    let valid = header.len() > "x-amz-meta-".len()
        && HeaderName::from_bytes(header.as_bytes()).is_ok()
        && HeaderValue::from_str(value).is_ok();
    if !valid {
        return Err(ValidationError::InvalidHeader { name: header }.into());
    }
    Ok((header, value.to_string()))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}
