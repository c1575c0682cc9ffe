//! Versioned response cache — named buckets of request→response pairs.
//!
//! One bucket generation is "current" at a time, identified by a version
//! label (see [`crate::config::ProxyConfig::cache_version`]). Superseded
//! generations are pruned when the worker activates
//! ([`crate::worker::Worker::activate`]).
//!
//! All access goes through [`tokio::sync::RwLock`], so concurrent
//! connection tasks never observe a half-written entry. Handles are cheap
//! `Arc` clones.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::RwLock;
use tracing::debug;

use crate::http::{Headers, RequestIdentity, Response, StatusCode};

/// A snapshot of a response, as held by a cache bucket.
///
/// `Bytes`-backed so that cloning an entry out of the bucket does not copy
/// the body.
#[derive(Debug, Clone)]
pub struct StoredResponse {
    status: StatusCode,
    headers: Headers,
    body: Bytes,
}

impl StoredResponse {
    /// Snapshots a response for storage.
    pub fn snapshot(response: &Response) -> Self {
        Self {
            status: response.status(),
            headers: response.headers().clone(),
            body: Bytes::copy_from_slice(response.body_slice()),
        }
    }

    /// Returns the stored status code.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Rehydrates the snapshot into a servable [`Response`].
    pub fn into_response(self) -> Response {
        Response::from_parts(self.status, self.headers, self.body.to_vec())
    }
}

/// A named bucket mapping request identities to stored responses.
///
/// Obtained from [`CacheStorage::open`]. Cloning a `Bucket` yields another
/// handle to the same underlying map.
#[derive(Debug, Clone)]
pub struct Bucket {
    name: Arc<str>,
    entries: Arc<RwLock<HashMap<RequestIdentity, StoredResponse>>>,
}

impl Bucket {
    fn new(name: &str) -> Self {
        Self {
            name: Arc::from(name),
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Returns the bucket's name (its version label).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stores a response under the given identity, replacing any previous entry.
    pub async fn put(&self, identity: RequestIdentity, response: StoredResponse) {
        debug!(bucket = %self.name, %identity, "caching response");
        self.entries.write().await.insert(identity, response);
    }

    /// Looks up a stored response by request identity.
    pub async fn lookup(&self, identity: &RequestIdentity) -> Option<StoredResponse> {
        self.entries.read().await.get(identity).cloned()
    }

    /// Returns the number of entries in the bucket.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Returns `true` if the bucket holds no entries.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

/// The storage handle owning all cache bucket generations.
///
/// Buckets are created lazily: [`open`](Self::open) on an unknown name
/// creates an empty bucket. Cloning a `CacheStorage` yields another handle
/// to the same storage.
///
/// # Examples
///
/// ```
/// use portico::cache::CacheStorage;
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let storage = CacheStorage::new();
/// let bucket = storage.open("portal-v1").await;
/// assert_eq!(bucket.name(), "portal-v1");
/// assert_eq!(storage.bucket_names().await, vec!["portal-v1".to_owned()]);
/// # });
/// ```
#[derive(Debug, Clone, Default)]
pub struct CacheStorage {
    buckets: Arc<RwLock<HashMap<String, Bucket>>>,
}

impl CacheStorage {
    /// Creates an empty storage handle with no buckets.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the bucket with the given name, creating it if absent.
    pub async fn open(&self, name: &str) -> Bucket {
        let mut buckets = self.buckets.write().await;
        buckets
            .entry(name.to_owned())
            .or_insert_with(|| {
                debug!(bucket = name, "creating cache bucket");
                Bucket::new(name)
            })
            .clone()
    }

    /// Returns the names of all existing buckets, in no particular order.
    pub async fn bucket_names(&self) -> Vec<String> {
        self.buckets.read().await.keys().cloned().collect()
    }

    /// Returns `true` if a bucket with the given name exists.
    pub async fn contains(&self, name: &str) -> bool {
        self.buckets.read().await.contains_key(name)
    }

    /// Deletes the bucket with the given name, dropping all of its entries.
    ///
    /// Returns `true` if a bucket was removed.
    pub async fn delete(&self, name: &str) -> bool {
        let removed = self.buckets.write().await.remove(name).is_some();
        if removed {
            debug!(bucket = name, "deleted cache bucket");
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::Method;

    fn identity(target: &str) -> RequestIdentity {
        RequestIdentity::new(Method::Get, target)
    }

    fn stored(body: &str) -> StoredResponse {
        StoredResponse::snapshot(&Response::new(StatusCode::Ok).body(body))
    }

    #[tokio::test]
    async fn open_creates_lazily() {
        let storage = CacheStorage::new();
        assert!(storage.bucket_names().await.is_empty());

        let bucket = storage.open("portal-v1").await;
        assert_eq!(bucket.name(), "portal-v1");
        assert!(storage.contains("portal-v1").await);
        assert_eq!(storage.bucket_names().await, vec!["portal-v1"]);
    }

    #[tokio::test]
    async fn open_is_idempotent() {
        let storage = CacheStorage::new();
        let a = storage.open("portal-v1").await;
        a.put(identity("/app.js"), stored("console.log(1)")).await;

        // Second open returns a handle to the same bucket, entries intact.
        let b = storage.open("portal-v1").await;
        assert_eq!(b.len().await, 1);
        assert_eq!(storage.bucket_names().await.len(), 1);
    }

    #[tokio::test]
    async fn put_then_lookup() {
        let storage = CacheStorage::new();
        let bucket = storage.open("portal-v1").await;

        bucket.put(identity("/index.html"), stored("<html>")).await;

        let hit = bucket.lookup(&identity("/index.html")).await.unwrap();
        assert_eq!(hit.status(), StatusCode::Ok);
        assert_eq!(hit.into_response().body_slice(), b"<html>");

        assert!(bucket.lookup(&identity("/missing")).await.is_none());
    }

    #[tokio::test]
    async fn put_replaces_previous_entry() {
        let storage = CacheStorage::new();
        let bucket = storage.open("portal-v1").await;

        bucket.put(identity("/a"), stored("old")).await;
        bucket.put(identity("/a"), stored("new")).await;

        assert_eq!(bucket.len().await, 1);
        let hit = bucket.lookup(&identity("/a")).await.unwrap();
        assert_eq!(hit.into_response().body_slice(), b"new");
    }

    #[tokio::test]
    async fn delete_drops_entries() {
        let storage = CacheStorage::new();
        let bucket = storage.open("portal-v0").await;
        bucket.put(identity("/a"), stored("x")).await;

        assert!(storage.delete("portal-v0").await);
        assert!(!storage.contains("portal-v0").await);
        assert!(!storage.delete("portal-v0").await); // already gone
    }

    #[tokio::test]
    async fn handles_share_storage() {
        let storage = CacheStorage::new();
        let clone = storage.clone();
        clone.open("portal-v1").await;
        assert!(storage.contains("portal-v1").await);
    }
}
