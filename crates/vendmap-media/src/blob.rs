//! Blob storage for photos and thumbnails.
//!
//! [`HttpBlobStore`] speaks the Firebase Storage REST dialect
//! (`/v0/b/{bucket}/o/{object}`). [`MemoryBlobStore`] keeps objects in
//! process and counts calls for tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use tracing::debug;

use crate::error::{BlobError, DeleteImageError};

const DEFAULT_BASE_URL: &str = "https://firebasestorage.googleapis.com";
const MEMORY_BASE_URL: &str = "https://storage.memory.test";

/// Characters left alone when an object name becomes a single URL path segment.
const OBJECT_NAME: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Handle to a stored object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobRef {
    pub path: String,
    /// Access token the backend issued for public download, if any.
    pub download_token: Option<String>,
}

impl BlobRef {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            download_token: None,
        }
    }
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, path: &str, bytes: Vec<u8>, content_type: &str)
        -> Result<BlobRef, BlobError>;

    async fn public_url(&self, blob: &BlobRef) -> Result<String, BlobError>;

    async fn delete(&self, blob: &BlobRef) -> Result<(), BlobError>;
}

fn encode_object_name(path: &str) -> String {
    utf8_percent_encode(path, OBJECT_NAME).to_string()
}

/// Storage path for `url`, which is either a public object URL of the form
/// `{host}/v0/b/{bucket}/o/{encoded path}` or a bare object path.
///
/// # Errors
///
/// Returns [`DeleteImageError::InvalidStorageUrl`] for an http(s) URL that is
/// not an object URL, or for an empty path.
pub fn resolve_storage_path(url: &str) -> Result<String, DeleteImageError> {
    let trimmed = url.trim();
    let invalid = || DeleteImageError::InvalidStorageUrl(url.to_string());

    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        return if trimmed.is_empty() {
            Err(invalid())
        } else {
            Ok(trimmed.to_string())
        };
    }

    let parsed = Url::parse(trimmed).map_err(|_| invalid())?;
    let (bucket, object) = parsed
        .path()
        .strip_prefix("/v0/b/")
        .and_then(|rest| rest.split_once("/o/"))
        .ok_or_else(invalid)?;
    if bucket.is_empty() || bucket.contains('/') || object.is_empty() {
        return Err(invalid());
    }
    let decoded = percent_decode_str(object)
        .decode_utf8()
        .map_err(|_| invalid())?;
    Ok(decoded.into_owned())
}

// ---------------------------------------------------------------------------
// HTTP
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct UploadResponse {
    name: String,
    #[serde(rename = "downloadTokens")]
    download_tokens: Option<String>,
}

/// Client for a Firebase-Storage-compatible REST endpoint.
///
/// Use [`HttpBlobStore::new`] for production or
/// [`HttpBlobStore::with_base_url`] to point at a mock server in tests.
pub struct HttpBlobStore {
    client: Client,
    base_url: String,
    bucket: String,
    token: Option<String>,
}

impl std::fmt::Debug for HttpBlobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpBlobStore")
            .field("base_url", &self.base_url)
            .field("bucket", &self.bucket)
            .field("token", &self.token.as_ref().map(|_| "[redacted]"))
            .finish_non_exhaustive()
    }
}

impl HttpBlobStore {
    /// Creates a client for the hosted storage service.
    ///
    /// # Errors
    ///
    /// Returns [`BlobError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed.
    pub fn new(bucket: &str, token: Option<String>, timeout_secs: u64) -> Result<Self, BlobError> {
        Self::with_base_url(DEFAULT_BASE_URL, bucket, token, timeout_secs)
    }

    /// Creates a client with a custom base URL (for testing with wiremock).
    ///
    /// # Errors
    ///
    /// Returns [`BlobError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed, or [`BlobError::InvalidBaseUrl`] if `base_url`
    /// is not an absolute URL.
    pub fn with_base_url(
        base_url: &str,
        bucket: &str,
        token: Option<String>,
        timeout_secs: u64,
    ) -> Result<Self, BlobError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent("vendmap/0.1 (photo-upload)")
            .build()?;

        Url::parse(base_url).map_err(|e| BlobError::InvalidBaseUrl {
            url: base_url.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            bucket: bucket.to_string(),
            token,
        })
    }

    fn bucket_url(&self) -> String {
        format!("{}/v0/b/{}/o", self.base_url, self.bucket)
    }

    fn object_url(&self, path: &str) -> String {
        format!("{}/{}", self.bucket_url(), encode_object_name(path))
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait]
impl BlobStore for HttpBlobStore {
    async fn put(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<BlobRef, BlobError> {
        let size = bytes.len();
        let request = self
            .client
            .post(self.bucket_url())
            .query(&[("uploadType", "media"), ("name", path)])
            .header(CONTENT_TYPE, content_type)
            .body(bytes);
        let response = self.authorize(request).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(BlobError::Status {
                status: status.as_u16(),
                path: path.to_string(),
            });
        }

        let body: UploadResponse =
            response
                .json()
                .await
                .map_err(|e| BlobError::InvalidResponse {
                    path: path.to_string(),
                    reason: e.to_string(),
                })?;
        debug!(path = %body.name, bytes = size, "blob stored");

        Ok(BlobRef {
            path: body.name,
            download_token: body
                .download_tokens
                .and_then(|tokens| tokens.split(',').next().map(str::to_string))
                .filter(|t| !t.is_empty()),
        })
    }

    async fn public_url(&self, blob: &BlobRef) -> Result<String, BlobError> {
        let mut url = format!("{}?alt=media", self.object_url(&blob.path));
        if let Some(token) = &blob.download_token {
            url.push_str("&token=");
            url.push_str(&encode_object_name(token));
        }
        Ok(url)
    }

    async fn delete(&self, blob: &BlobRef) -> Result<(), BlobError> {
        let request = self.client.delete(self.object_url(&blob.path));
        let response = self.authorize(request).send().await?;

        match response.status() {
            status if status.is_success() => {
                debug!(path = %blob.path, "blob deleted");
                Ok(())
            }
            StatusCode::NOT_FOUND => Err(BlobError::NotFound(blob.path.clone())),
            status => Err(BlobError::Status {
                status: status.as_u16(),
                path: blob.path.clone(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// In memory
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    objects: Mutex<HashMap<String, StoredObject>>,
    puts: AtomicUsize,
    deletes: AtomicUsize,
    fail_puts_after: Mutex<Option<usize>>,
    fail_deletes: AtomicBool,
}

impl MemoryBlobStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn objects(&self) -> MutexGuard<'_, HashMap<String, StoredObject>> {
        self.objects.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Let `successes` more puts succeed, then fail every later one.
    pub fn fail_puts_after(&self, successes: usize) {
        *self
            .fail_puts_after
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(self.put_calls() + successes);
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    /// Number of `put` calls made, including failed ones.
    #[must_use]
    pub fn put_calls(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn delete_calls(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn object(&self, path: &str) -> Option<StoredObject> {
        self.objects().get(path).cloned()
    }

    #[must_use]
    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.objects().keys().cloned().collect();
        paths.sort();
        paths
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<BlobRef, BlobError> {
        let call = self.puts.fetch_add(1, Ordering::SeqCst);
        let limit = *self
            .fail_puts_after
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if limit.is_some_and(|limit| call >= limit) {
            return Err(BlobError::Backend("injected put failure".to_string()));
        }
        self.objects().insert(
            path.to_string(),
            StoredObject {
                bytes,
                content_type: content_type.to_string(),
            },
        );
        Ok(BlobRef::new(path))
    }

    async fn public_url(&self, blob: &BlobRef) -> Result<String, BlobError> {
        if !self.objects().contains_key(&blob.path) {
            return Err(BlobError::NotFound(blob.path.clone()));
        }
        Ok(format!(
            "{MEMORY_BASE_URL}/v0/b/memory/o/{}?alt=media",
            encode_object_name(&blob.path)
        ))
    }

    async fn delete(&self, blob: &BlobRef) -> Result<(), BlobError> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(BlobError::Backend("injected delete failure".to_string()));
        }
        self.objects()
            .remove(&blob.path)
            .map(|_| ())
            .ok_or_else(|| BlobError::NotFound(blob.path.clone()))
    }
}
