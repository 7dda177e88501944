//! Response metadata sidecar.
//!
//! Typed operation results carry only the decoded payload. The status
//! and headers of the response that produced them are parked in a
//! bounded [`MetadataMap`], retrievable through the [`Tracked`] handle.

use lru::LruCache;
use reqwest::header::HeaderMap;
use std::num::NonZeroUsize;
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::defaults::{METADATA_CAPACITY, X_REQUEST_ID};
use crate::types::HttpResponse;

/// Status and headers of the response behind a typed result.
#[derive(Debug, Clone)]
pub struct ResponseMetadata {
    pub status: u16,
    pub headers: HeaderMap,
}

impl ResponseMetadata {
    pub fn from_response<T>(response: &HttpResponse<T>) -> Self {
        Self {
            status: response.status,
            headers: response.headers.clone(),
        }
    }

    pub fn request_id(&self) -> Option<&str> {
        self.headers.get(X_REQUEST_ID).and_then(|v| v.to_str().ok())
    }
}

/// Opaque key tying a [`Tracked`] value to its metadata entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MetaKey(u64);

/// A typed result plus the key of its response metadata.
#[derive(Debug, Clone)]
pub struct Tracked<T> {
    value: T,
    key: MetaKey,
}

impl<T> Tracked<T> {
    pub fn into_inner(self) -> T {
        self.value
    }

    pub fn key(&self) -> MetaKey {
        self.key
    }

    /// Transforms the value while keeping the metadata key.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Tracked<U> {
        Tracked {
            value: f(self.value),
            key: self.key,
        }
    }
}

impl<T> Deref for Tracked<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

/// Bounded store of response metadata, evicting least-recently-used
/// entries once full.
pub struct MetadataMap {
    entries: Mutex<LruCache<MetaKey, ResponseMetadata>>,
    next_key: AtomicU64,
}

impl Default for MetadataMap {
    fn default() -> Self {
        Self::new()
    }
}

impl MetadataMap {
    pub fn new() -> Self {
        Self::with_capacity(METADATA_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            next_key: AtomicU64::new(0),
        }
    }

    pub fn insert(&self, metadata: ResponseMetadata) -> MetaKey {
        let key = MetaKey(self.next_key.fetch_add(1, Ordering::Relaxed));
        self.entries.lock().unwrap().put(key, metadata);
        key
    }

    pub fn get(&self, key: MetaKey) -> Option<ResponseMetadata> {
        self.entries.lock().unwrap().get(&key).cloned()
    }

    /// Wraps `value` and records the response it came from.
    pub fn track<T, R>(&self, value: T, response: &HttpResponse<R>) -> Tracked<T> {
        let key = self.insert(ResponseMetadata::from_response(response));
        Tracked { value, key }
    }
}
