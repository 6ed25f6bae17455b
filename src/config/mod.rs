//! Client configuration
//!
//! A [`ClientConfig`] is built once (from YAML, the environment, or code)
//! and handed to [`crate::S3Client`]. Loading never fails on missing
//! credentials; completeness is checked by [`ClientConfig::validate`] before
//! each operation so that a half-configured client reports a typed
//! configuration error instead of failing at startup.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::time::Duration;

use crate::files::mime::known_mime_types;
use crate::s3::S3Error;

/// Connection and upload settings for one S3-compatible backend
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Signing endpoint, e.g. `http://minio:9000`
    #[serde(default)]
    pub endpoint: String,

    /// Externally reachable base URL for links handed to browsers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_url: Option<String>,

    #[serde(default)]
    pub access_key: String,

    #[serde(default)]
    pub secret_key: String,

    /// Default bucket
    #[serde(default)]
    pub bucket: String,

    /// AWS region (default: us-east-1)
    #[serde(default = "default_region")]
    pub region: String,

    /// Upload size limit in bytes
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,

    /// MIME allow-list (default: every type in the built-in table)
    #[serde(default = "known_mime_types")]
    pub allowed_types: Vec<String>,

    /// Timeout in seconds for HEAD / DELETE
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,

    /// Timeout in seconds for PUT
    #[serde(default = "default_upload_timeout")]
    pub upload_timeout: u64,

    /// Skip TLS certificate verification
    #[serde(default)]
    pub insecure_tls: bool,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_max_file_size() -> u64 {
    10 * 1024 * 1024
}

fn default_request_timeout() -> u64 {
    10
}

fn default_upload_timeout() -> u64 {
    30
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("endpoint", &self.endpoint)
            .field("public_url", &self.public_url)
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("max_file_size", &self.max_file_size)
            .field("allowed_types", &self.allowed_types.len())
            .field("request_timeout", &self.request_timeout)
            .field("upload_timeout", &self.upload_timeout)
            .field("insecure_tls", &self.insecure_tls)
            .finish()
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            public_url: None,
            access_key: String::new(),
            secret_key: String::new(),
            bucket: String::new(),
            region: default_region(),
            max_file_size: default_max_file_size(),
            allowed_types: known_mime_types(),
            request_timeout: default_request_timeout(),
            upload_timeout: default_upload_timeout(),
            insecure_tls: false,
        }
    }
}

impl ClientConfig {
    /// Create a configuration with the identity fields set and defaults
    /// for everything else
    pub fn new(
        endpoint: impl Into<String>,
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
        bucket: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            access_key: access_key.into(),
            secret_key: secret_key.into(),
            bucket: bucket.into(),
            ..Self::default()
        }
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    pub fn with_public_url(mut self, public_url: impl Into<String>) -> Self {
        self.public_url = Some(public_url.into());
        self
    }

    pub fn with_max_file_size(mut self, max_file_size: u64) -> Self {
        self.max_file_size = max_file_size;
        self
    }

    pub fn with_allowed_types(mut self, allowed_types: Vec<String>) -> Self {
        self.allowed_types = allowed_types;
        self
    }

    pub fn with_timeouts(mut self, request: Duration, upload: Duration) -> Self {
        self.request_timeout = request.as_secs().max(1);
        self.upload_timeout = upload.as_secs().max(1);
        self
    }

    /// HEAD / DELETE timeout, at least one second
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout.max(1))
    }

    /// PUT timeout, at least one second
    pub fn upload_timeout(&self) -> Duration {
        Duration::from_secs(self.upload_timeout.max(1))
    }

    /// Check that every field needed to sign a request is present.
    pub fn validate(&self) -> std::result::Result<(), S3Error> {
        let required = [
            ("endpoint", &self.endpoint),
            ("access_key", &self.access_key),
            ("secret_key", &self.secret_key),
            ("bucket", &self.bucket),
            ("region", &self.region),
        ];
        if let Some(&(field, _)) = required.iter().find(|(_, value)| value.trim().is_empty()) {
            return Err(S3Error::MissingConfig { field });
        }

        validate_base_url(&self.endpoint)?;
        if let Some(public_url) = &self.public_url {
            validate_base_url(public_url)?;
        }
        Ok(())
    }
}

fn validate_base_url(url: &str) -> std::result::Result<(), S3Error> {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .ok_or_else(|| S3Error::InvalidEndpoint {
            endpoint: url.to_string(),
            reason: "scheme must be http or https".to_string(),
        })?;

    let authority = rest.split('/').next().unwrap_or("");
    if authority.is_empty() {
        return Err(S3Error::InvalidEndpoint {
            endpoint: url.to_string(),
            reason: "missing host".to_string(),
        });
    }
    if rest.contains('?') || rest.contains('#') {
        return Err(S3Error::InvalidEndpoint {
            endpoint: url.to_string(),
            reason: "query and fragment are not allowed".to_string(),
        });
    }
    Ok(())
}

/// Named client profiles, as stored in a YAML file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub profiles: HashMap<String, ClientConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_profile: Option<String>,
}

impl Config {
    /// Get a profile by name, or the default profile if not specified
    pub fn get_profile(&self, name: Option<&str>) -> Option<&ClientConfig> {
        if let Some(name) = name {
            self.profiles.get(name)
        } else if let Some(default) = &self.default_profile {
            self.profiles.get(default)
        } else if self.profiles.len() == 1 {
            self.profiles.values().next()
        } else {
            None
        }
    }
}

/// Load profiles from a YAML file
pub fn load_from_yaml<P: AsRef<Path>>(path: P) -> Result<Config> {
    let content = std::fs::read_to_string(path.as_ref())
        .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

    let config: Config =
        serde_yaml::from_str(&content).context("Failed to parse YAML configuration")?;

    Ok(config)
}

/// Load a client configuration from environment variables
///
/// A `.env` file in the working directory is honoured. Variables:
/// - S3_ENDPOINT
/// - S3_PUBLIC_URL (optional)
/// - S3_ACCESS_KEY / AWS_ACCESS_KEY_ID
/// - S3_SECRET_KEY / AWS_SECRET_ACCESS_KEY
/// - S3_BUCKET
/// - S3_REGION / AWS_REGION (optional, defaults to us-east-1)
/// - S3_MAX_FILE_SIZE (optional, bytes)
/// - S3_ALLOWED_TYPES (optional, comma-separated)
/// - S3_REQUEST_TIMEOUT / S3_UPLOAD_TIMEOUT (optional, seconds)
/// - S3_INSECURE_TLS (optional, `true` or `1`)
pub fn load_from_env() -> Result<ClientConfig> {
    let _ = dotenvy::dotenv();

    let var = |names: &[&str]| names.iter().find_map(|name| std::env::var(name).ok());

    let mut config = ClientConfig::new(
        var(&["S3_ENDPOINT"]).unwrap_or_default(),
        var(&["S3_ACCESS_KEY", "AWS_ACCESS_KEY_ID"]).unwrap_or_default(),
        var(&["S3_SECRET_KEY", "AWS_SECRET_ACCESS_KEY"]).unwrap_or_default(),
        var(&["S3_BUCKET"]).unwrap_or_default(),
    );

    if let Some(region) = var(&["S3_REGION", "AWS_REGION"]) {
        config.region = region;
    }

    config.public_url = var(&["S3_PUBLIC_URL"]).filter(|url| !url.trim().is_empty());

    if let Some(size) = var(&["S3_MAX_FILE_SIZE"]) {
        config.max_file_size = size
            .trim()
            .parse()
            .with_context(|| format!("S3_MAX_FILE_SIZE is not a byte count: {size}"))?;
    }

    if let Some(types) = var(&["S3_ALLOWED_TYPES"]) {
        config.allowed_types = types
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
    }

    if let Some(timeout) = var(&["S3_REQUEST_TIMEOUT"]) {
        config.request_timeout = timeout
            .trim()
            .parse()
            .with_context(|| format!("S3_REQUEST_TIMEOUT is not a number of seconds: {timeout}"))?;
    }

    if let Some(timeout) = var(&["S3_UPLOAD_TIMEOUT"]) {
        config.upload_timeout = timeout
            .trim()
            .parse()
            .with_context(|| format!("S3_UPLOAD_TIMEOUT is not a number of seconds: {timeout}"))?;
    }

    config.insecure_tls = var(&["S3_INSECURE_TLS"])
        .map(|v| v == "true" || v == "1")
        .unwrap_or(false);

    Ok(config)
}

/// Load a client configuration from a YAML file or the environment
///
/// # Arguments
/// * `config_path` - Optional path to YAML config file
/// * `profile_name` - Optional profile name (only relevant for YAML configs)
pub fn load_config(config_path: Option<&str>, profile_name: Option<&str>) -> Result<ClientConfig> {
    if let Some(path) = config_path {
        let config = load_from_yaml(path)?;
        let profile = config.get_profile(profile_name).with_context(|| match profile_name {
            Some(name) => format!("Profile '{}' not found in config file", name),
            None => "No default profile in config file".to_string(),
        })?;
        Ok(profile.clone())
    } else {
        load_from_env()
    }
}
