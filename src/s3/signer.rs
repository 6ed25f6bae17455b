//! AWS Signature Version 4 signer for S3 requests
//!
//! Two flavours are supported:
//! - header signing (`Authorization` header) for PUT / DELETE / HEAD
//! - query signing (`X-Amz-Signature` query parameter) for presigned GET URLs
//!
//! Every signature is built from a fresh [`SigningContext`]; the signer keeps
//! no mutable state, so one instance can be shared by any number of tasks.
//! The signing key is re-derived per request (4 HMACs, sub-microsecond).

use crate::s3::crypto::{hmac_sha256, hmac_sha256_hex, sha256_hex};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;

/// Signing algorithm identifier
pub const ALGORITHM: &str = "AWS4-HMAC-SHA256";

/// Service name used in the credential scope
pub const SERVICE: &str = "s3";

/// Payload hash literal for presigned URLs
pub const UNSIGNED_PAYLOAD: &str = "UNSIGNED-PAYLOAD";

/// Longest expiry SigV4 accepts for a presigned URL (7 days)
pub const MAX_PRESIGN_EXPIRY_SECS: u64 = 604_800;

/// Hex lookup table for zero-allocation percent encoding
static HEX_UPPER: &[u8; 16] = b"0123456789ABCDEF";

/// Everything needed to produce one canonical request.
///
/// Header names are stored lowercase in a `BTreeMap`, so iteration order is
/// already the sorted order SigV4 requires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningContext {
    pub method: String,
    pub canonical_uri: String,
    pub canonical_query: String,
    pub headers: BTreeMap<String, String>,
    pub signed_headers: String,
    pub payload_hash: String,
    /// `YYYYMMDDTHHMMSSZ`
    pub timestamp: String,
    /// `YYYYMMDD`
    pub date_stamp: String,
}

impl SigningContext {
    /// Build a context, normalising header names and values.
    pub fn new<I, K, V>(
        method: &str,
        canonical_uri: &str,
        canonical_query: &str,
        headers: I,
        payload_hash: &str,
        at: DateTime<Utc>,
    ) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let headers: BTreeMap<String, String> = headers
            .into_iter()
            .map(|(k, v)| (k.as_ref().to_ascii_lowercase(), normalize_header_value(v.as_ref())))
            .collect();
        let signed_headers = headers.keys().map(String::as_str).collect::<Vec<_>>().join(";");
        let (timestamp, date_stamp) = format_amz_date(at);

        Self {
            method: method.to_ascii_uppercase(),
            canonical_uri: if canonical_uri.is_empty() {
                "/".to_string()
            } else {
                canonical_uri.to_string()
            },
            canonical_query: canonical_query.to_string(),
            headers,
            signed_headers,
            payload_hash: payload_hash.to_string(),
            timestamp,
            date_stamp,
        }
    }

    /// `name:value\n` for every header, in sorted order
    pub fn canonical_headers(&self) -> String {
        let mut result = String::with_capacity(self.headers.len() * 64);
        for (k, v) in &self.headers {
            result.push_str(k);
            result.push(':');
            result.push_str(v);
            result.push('\n');
        }
        result
    }

    /// The canonical request string hashed into the string-to-sign
    pub fn canonical_request(&self) -> String {
        format!(
            "{}\n{}\n{}\n{}\n{}\n{}",
            self.method,
            self.canonical_uri,
            self.canonical_query,
            self.canonical_headers(),
            self.signed_headers,
            self.payload_hash
        )
    }

    /// `dateStamp/region/s3/aws4_request`
    pub fn credential_scope(&self, region: &str) -> String {
        format!("{}/{}/{}/aws4_request", self.date_stamp, region, SERVICE)
    }

    pub fn string_to_sign(&self, region: &str) -> String {
        format!(
            "{}\n{}\n{}\n{}",
            ALGORITHM,
            self.timestamp,
            self.credential_scope(region),
            sha256_hex(self.canonical_request().as_bytes())
        )
    }
}

/// AWS Signature Version 4 signer
#[derive(Clone)]
pub struct S3SignerV4 {
    access_key: String,
    secret_key: String,
    region: String,
}

impl fmt::Debug for S3SignerV4 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3SignerV4")
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .field("region", &self.region)
            .finish()
    }
}

impl S3SignerV4 {
    /// Create a new S3 signer
    pub fn new(access_key: String, secret_key: String, region: String) -> Self {
        Self {
            access_key,
            secret_key,
            region,
        }
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    /// Sign a request at the current time, hashing `payload` into
    /// `x-amz-content-sha256`.
    pub fn sign(
        &self,
        method: &str,
        url: &str,
        headers: BTreeMap<String, String>,
        payload: &[u8],
    ) -> BTreeMap<String, String> {
        self.sign_at(method, url, headers, &sha256_hex(payload), Utc::now())
    }

    /// Sign with an explicit payload hash and clock.
    ///
    /// Adds `host`, `x-amz-date`, `x-amz-content-sha256` and `authorization`
    /// to `headers` and returns the full header set to send.
    pub fn sign_at(
        &self,
        method: &str,
        url: &str,
        headers: BTreeMap<String, String>,
        payload_hash: &str,
        now: DateTime<Utc>,
    ) -> BTreeMap<String, String> {
        let (host, path, query) = split_url(url);
        let (amz_date, _) = format_amz_date(now);

        let mut headers: BTreeMap<String, String> = headers
            .into_iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), v))
            .collect();
        headers.insert("host".to_string(), host.to_string());
        headers.insert("x-amz-date".to_string(), amz_date);
        headers.insert("x-amz-content-sha256".to_string(), payload_hash.to_string());

        let canonical_query = canonical_query_string(&parse_query(query));
        let ctx = SigningContext::new(method, path, &canonical_query, &headers, payload_hash, now);

        headers.insert("authorization".to_string(), self.authorization(&ctx));
        headers
    }

    /// Value of the `Authorization` header for `ctx`
    pub fn authorization(&self, ctx: &SigningContext) -> String {
        format!(
            "{} Credential={}/{}, SignedHeaders={}, Signature={}",
            ALGORITHM,
            self.access_key,
            ctx.credential_scope(&self.region),
            ctx.signed_headers,
            self.signature(ctx)
        )
    }

    /// Hex signature of `ctx`
    pub fn signature(&self, ctx: &SigningContext) -> String {
        let string_to_sign = ctx.string_to_sign(&self.region);
        tracing::trace!(
            canonical_request = %ctx.canonical_request(),
            string_to_sign = %string_to_sign,
            "sigv4"
        );
        let key = derive_signing_key(&self.secret_key, &ctx.date_stamp, &self.region, SERVICE);
        hmac_sha256_hex(&key, string_to_sign.as_bytes())
    }

    /// Presign `url` for `method`, valid for `expires_secs` from `now`.
    ///
    /// Only `host` is signed and the payload is `UNSIGNED-PAYLOAD`. The
    /// returned URL carries the credential, date, expiry and signature in
    /// its query string.
    pub fn presign(&self, method: &str, url: &str, expires_secs: u64, now: DateTime<Utc>) -> String {
        let (host, path, query) = split_url(url);
        let (amz_date, date_stamp) = format_amz_date(now);
        let credential = format!(
            "{}/{}/{}/{}/aws4_request",
            self.access_key, date_stamp, self.region, SERVICE
        );

        let mut params = parse_query(query);
        params.push(("X-Amz-Algorithm".to_string(), ALGORITHM.to_string()));
        params.push(("X-Amz-Credential".to_string(), credential));
        params.push(("X-Amz-Date".to_string(), amz_date));
        params.push(("X-Amz-Expires".to_string(), expires_secs.to_string()));
        params.push(("X-Amz-SignedHeaders".to_string(), "host".to_string()));

        let canonical_query = canonical_query_string(&params);
        let ctx = SigningContext::new(
            method,
            path,
            &canonical_query,
            [("host", host)],
            UNSIGNED_PAYLOAD,
            now,
        );
        let signature = self.signature(&ctx);

        let base = url.split_once('?').map_or(url, |(base, _)| base);
        format!("{}?{}&X-Amz-Signature={}", base, canonical_query, signature)
    }
}

/// Derive the request-scoped signing key:
/// `HMAC(HMAC(HMAC(HMAC("AWS4" + secret, date), region), service), "aws4_request")`
pub fn derive_signing_key(secret_key: &str, date_stamp: &str, region: &str, service: &str) -> [u8; 32] {
    let k_secret = format!("AWS4{}", secret_key);
    let k_date = hmac_sha256(k_secret.as_bytes(), date_stamp.as_bytes());
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}

/// `(YYYYMMDDTHHMMSSZ, YYYYMMDD)` for `at`
pub fn format_amz_date(at: DateTime<Utc>) -> (String, String) {
    (
        at.format("%Y%m%dT%H%M%SZ").to_string(),
        at.format("%Y%m%d").to_string(),
    )
}

/// URI encode a string (RFC 3986) using hex lookup table
pub fn uri_encode(s: &str, encode_slash: bool) -> String {
    let mut result = String::with_capacity(s.len() + 16);
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                result.push(byte as char);
            }
            b'/' if !encode_slash => {
                result.push('/');
            }
            _ => {
                result.push('%');
                result.push(HEX_UPPER[(byte >> 4) as usize] as char);
                result.push(HEX_UPPER[(byte & 0xf) as usize] as char);
            }
        }
    }
    result
}

/// Canonical query string: keys and values URI-encoded, sorted by encoded
/// key (then value), joined with `&`.
pub fn canonical_query_string<K, V>(params: &[(K, V)]) -> String
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut encoded: Vec<(String, String)> = params
        .iter()
        .map(|(k, v)| (uri_encode(k.as_ref(), true), uri_encode(v.as_ref(), true)))
        .collect();
    encoded.sort_unstable();

    encoded
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

/// Decode a raw query string into `(key, value)` pairs.
///
/// Parameters without `=` (like `?uploads`) get an empty value.
pub fn parse_query(query: &str) -> Vec<(String, String)> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            let key = urlencoding::decode(key).unwrap_or_else(|_| key.into());
            let value = urlencoding::decode(value).unwrap_or_else(|_| value.into());
            (key.into_owned(), value.into_owned())
        })
        .collect()
}

/// Split a URL into (host_with_port, path, query) without allocating.
///
/// Default ports (:443 for https, :80 for http) are stripped from the host.
pub fn split_url(url: &str) -> (&str, &str, &str) {
    let after_scheme = if let Some(rest) = url.strip_prefix("https://") {
        rest
    } else if let Some(rest) = url.strip_prefix("http://") {
        rest
    } else {
        url
    };

    let (authority, path_and_query) = match after_scheme.find('/') {
        Some(pos) => (&after_scheme[..pos], &after_scheme[pos..]),
        None => (after_scheme, "/"),
    };

    let (path, query) = match path_and_query.find('?') {
        Some(pos) => (&path_and_query[..pos], &path_and_query[pos + 1..]),
        None => (path_and_query, ""),
    };

    let host = if url.starts_with("https") {
        authority.strip_suffix(":443").unwrap_or(authority)
    } else {
        authority.strip_suffix(":80").unwrap_or(authority)
    };

    (host, path, query)
}

/// Trim and collapse internal whitespace runs to a single space
fn normalize_header_value(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}
