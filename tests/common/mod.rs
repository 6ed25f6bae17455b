//! In-process S3 stand-in for integration tests
//!
//! Serves path-style PUT / GET / HEAD / DELETE over HTTP/1.1, keeps objects
//! in memory and checks SigV4 on every request: `Authorization` headers for
//! direct calls, `X-Amz-*` query parameters (including expiry) for
//! presigned URLs.

#![allow(dead_code)]

use bytes::Bytes;
use chrono::{DateTime, NaiveDateTime, Utc};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use s3upload::s3::crypto::sha256_hex;
use s3upload::s3::signer::{canonical_query_string, parse_query, UNSIGNED_PAYLOAD};
use s3upload::s3::{S3SignerV4, SigningContext};
use s3upload::ClientConfig;
use std::collections::{BTreeMap, HashMap};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

pub const ACCESS_KEY: &str = "AKIAMOCKEXAMPLE";
pub const SECRET_KEY: &str = "mock/secret/key";
pub const REGION: &str = "us-east-1";
pub const BUCKET: &str = "uploads";

#[derive(Debug, Clone)]
pub struct StoredObject {
    pub body: Bytes,
    pub content_type: String,
    pub etag: String,
    pub metadata: BTreeMap<String, String>,
}

#[derive(Default)]
struct MockState {
    objects: Mutex<HashMap<String, StoredObject>>,
    requests: AtomicUsize,
    fail_next: Mutex<Option<StatusCode>>,
    delay: Mutex<Option<Duration>>,
    delete_status: Mutex<Option<StatusCode>>,
}

pub struct MockS3 {
    addr: SocketAddr,
    state: Arc<MockState>,
    handle: JoinHandle<()>,
}

impl Drop for MockS3 {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

impl MockS3 {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(MockState::default());

        let server_state = Arc::clone(&state);
        let handle = tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    continue;
                };
                let state = Arc::clone(&server_state);
                tokio::spawn(async move {
                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { Ok::<_, Infallible>(handle_request(&state, req).await) }
                    });
                    let _ = http1::Builder::new()
                        .serve_connection(TokioIo::new(stream), service)
                        .await;
                });
            }
        });

        Self { addr, state, handle }
    }

    pub fn endpoint(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Complete client configuration pointing at this server
    pub fn config(&self) -> ClientConfig {
        ClientConfig::new(self.endpoint(), ACCESS_KEY, SECRET_KEY, BUCKET).with_region(REGION)
    }

    pub fn request_count(&self) -> usize {
        self.state.requests.load(Ordering::SeqCst)
    }

    /// Stored object at `bucket/key` (key as it appears in the URL path)
    pub fn object(&self, bucket: &str, encoded_key: &str) -> Option<StoredObject> {
        let path = format!("/{}/{}", bucket, encoded_key);
        self.state.objects.lock().unwrap().get(&path).cloned()
    }

    pub fn object_count(&self) -> usize {
        self.state.objects.lock().unwrap().len()
    }

    /// Answer the next request with `status` and an S3 error document
    pub fn fail_next_with(&self, status: StatusCode) {
        *self.state.fail_next.lock().unwrap() = Some(status);
    }

    /// Status returned by successful DELETEs (default 204)
    pub fn set_delete_status(&self, status: StatusCode) {
        *self.state.delete_status.lock().unwrap() = Some(status);
    }

    /// Hold every response for `delay`
    pub fn set_delay(&self, delay: Duration) {
        *self.state.delay.lock().unwrap() = Some(delay);
    }
}

async fn handle_request(state: &MockState, req: Request<Incoming>) -> Response<Full<Bytes>> {
    state.requests.fetch_add(1, Ordering::SeqCst);

    let delay = *state.delay.lock().unwrap();
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }

    let forced = state.fail_next.lock().unwrap().take();
    if let Some(status) = forced {
        let code = match status {
            StatusCode::FORBIDDEN => "AccessDenied",
            StatusCode::SERVICE_UNAVAILABLE => "SlowDown",
            _ => "InternalError",
        };
        return error_response(status, code, "Injected failure");
    }

    let (parts, body) = req.into_parts();
    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(_) => return error_response(StatusCode::BAD_REQUEST, "IncompleteBody", "Body read failed"),
    };

    let path = parts.uri.path().to_string();
    let query = parts.uri.query().unwrap_or("");

    let verified = if query.contains("X-Amz-Signature=") {
        verify_presigned(&parts, &path, query)
    } else {
        verify_header_signature(&parts, &path, query, &body)
    };
    if let Err((code, message)) = verified {
        return error_response(StatusCode::FORBIDDEN, code, message);
    }

    let mut objects = state.objects.lock().unwrap();
    match parts.method {
        Method::PUT => {
            let header = |name: &str| {
                parts
                    .headers
                    .get(name)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string)
            };
            let metadata = parts
                .headers
                .iter()
                .filter(|(name, _)| name.as_str().starts_with("x-amz-meta-"))
                .filter_map(|(name, value)| Some((name.to_string(), value.to_str().ok()?.to_string())))
                .collect();
            let etag = sha256_hex(&body)[..32].to_string();
            objects.insert(
                path,
                StoredObject {
                    body,
                    content_type: header("content-type").unwrap_or_default(),
                    etag: etag.clone(),
                    metadata,
                },
            );
            Response::builder()
                .status(StatusCode::OK)
                .header("etag", format!("\"{}\"", etag))
                .body(Full::new(Bytes::new()))
                .unwrap()
        }
        Method::GET | Method::HEAD => match objects.get(&path) {
            Some(object) => {
                let body = if parts.method == Method::GET {
                    object.body.clone()
                } else {
                    Bytes::new()
                };
                Response::builder()
                    .status(StatusCode::OK)
                    .header("content-type", &object.content_type)
                    .header("content-length", object.body.len())
                    .header("etag", format!("\"{}\"", object.etag))
                    .header("last-modified", "Wed, 21 Oct 2015 07:28:00 GMT")
                    .body(Full::new(body))
                    .unwrap()
            }
            None => error_response(StatusCode::NOT_FOUND, "NoSuchKey", "The specified key does not exist."),
        },
        Method::DELETE => {
            objects.remove(&path);
            let status = state
                .delete_status
                .lock()
                .unwrap()
                .unwrap_or(StatusCode::NO_CONTENT);
            Response::builder()
                .status(status)
                .body(Full::new(Bytes::new()))
                .unwrap()
        }
        _ => error_response(StatusCode::METHOD_NOT_ALLOWED, "MethodNotAllowed", "Unsupported method"),
    }
}

fn error_response(status: StatusCode, code: &str, message: &str) -> Response<Full<Bytes>> {
    let body = format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<Error><Code>{}</Code><Message>{}</Message></Error>",
        code, message
    );
    Response::builder()
        .status(status)
        .header("content-type", "application/xml")
        .body(Full::new(Bytes::from(body)))
        .unwrap()
}

fn signer() -> S3SignerV4 {
    S3SignerV4::new(ACCESS_KEY.to_string(), SECRET_KEY.to_string(), REGION.to_string())
}

fn parse_amz_date(value: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value, "%Y%m%dT%H%M%SZ")
        .ok()
        .map(|naive| naive.and_utc())
}

type AuthFailure = (&'static str, &'static str);

fn verify_header_signature(
    parts: &hyper::http::request::Parts,
    path: &str,
    query: &str,
    body: &Bytes,
) -> Result<(), AuthFailure> {
    let missing = ("AccessDenied", "Missing authentication");
    let header = |name: &str| parts.headers.get(name).and_then(|v| v.to_str().ok());

    let authorization = header("authorization").ok_or(missing)?;
    let fields = authorization
        .strip_prefix("AWS4-HMAC-SHA256 ")
        .ok_or(("AccessDenied", "Unsupported algorithm"))?;

    let mut credential = None;
    let mut signed_headers = None;
    let mut signature = None;
    for field in fields.split(", ") {
        match field.split_once('=') {
            Some(("Credential", v)) => credential = Some(v),
            Some(("SignedHeaders", v)) => signed_headers = Some(v),
            Some(("Signature", v)) => signature = Some(v),
            _ => {}
        }
    }
    let (credential, signed_headers, signature) = match (credential, signed_headers, signature) {
        (Some(c), Some(h), Some(s)) => (c, h, s),
        _ => return Err(("AccessDenied", "Malformed authorization header")),
    };
    if !credential.starts_with(&format!("{}/", ACCESS_KEY)) {
        return Err(("InvalidAccessKeyId", "Unknown access key"));
    }

    let payload_hash = header("x-amz-content-sha256").ok_or(missing)?;
    if payload_hash != sha256_hex(body) {
        return Err(("XAmzContentSHA256Mismatch", "Payload hash mismatch"));
    }

    let at = header("x-amz-date").and_then(parse_amz_date).ok_or(missing)?;

    let mut signed = Vec::new();
    for name in signed_headers.split(';') {
        let value = header(name).ok_or(("AccessDenied", "Signed header not present"))?;
        signed.push((name, value));
    }

    let canonical_query = canonical_query_string(&parse_query(query));
    let ctx = SigningContext::new(
        parts.method.as_str(),
        path,
        &canonical_query,
        signed,
        payload_hash,
        at,
    );

    if signer().signature(&ctx) != signature {
        return Err(("SignatureDoesNotMatch", "The request signature we calculated does not match"));
    }
    Ok(())
}

fn verify_presigned(
    parts: &hyper::http::request::Parts,
    path: &str,
    query: &str,
) -> Result<(), AuthFailure> {
    let malformed = ("AuthorizationQueryParametersError", "Malformed presigned query");

    let mut params = parse_query(query);
    let signature = params
        .iter()
        .position(|(k, _)| k == "X-Amz-Signature")
        .map(|idx| params.remove(idx).1)
        .ok_or(malformed)?;
    let param = |name: &str| {
        params
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.clone())
    };

    let at = param("X-Amz-Date").as_deref().and_then(parse_amz_date).ok_or(malformed)?;
    let expires: i64 = param("X-Amz-Expires")
        .and_then(|v| v.parse().ok())
        .ok_or(malformed)?;
    if Utc::now() > at + chrono::Duration::seconds(expires) {
        return Err(("AccessDenied", "Request has expired"));
    }

    let host = parts
        .headers
        .get("host")
        .and_then(|v| v.to_str().ok())
        .ok_or(malformed)?;

    let ctx = SigningContext::new(
        parts.method.as_str(),
        path,
        &canonical_query_string(&params),
        [("host", host)],
        UNSIGNED_PAYLOAD,
        at,
    );

    if signer().signature(&ctx) != signature {
        return Err(("SignatureDoesNotMatch", "The request signature we calculated does not match"));
    }
    Ok(())
}

/// Plain HTTP GET used to consume presigned URLs
pub async fn http_get(url: &str) -> (StatusCode, Bytes) {
    let client = hyper_util::client::legacy::Client::builder(hyper_util::rt::TokioExecutor::new())
        .build_http::<Full<Bytes>>();
    let request = Request::builder()
        .method(Method::GET)
        .uri(url)
        .body(Full::new(Bytes::new()))
        .unwrap();
    let response = client.request(request).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, body)
}

/// An endpoint nothing is listening on
pub async fn closed_endpoint() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}
