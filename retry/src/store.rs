use crate::TokenBucket;
use log::debug;
use lru::LruCache;
use std::fmt::{self, Debug};
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, PoisonError};

/// Tokens a bucket holds when full, unless configured otherwise.
pub const DEFAULT_MAX_CAPACITY: usize = 500;

/// Number of scopes kept before the least recently used one is evicted.
pub const DEFAULT_STORE_CAPACITY: NonZeroUsize = match NonZeroUsize::new(128) {
    Some(v) => v,
    None => unreachable!(),
};

/// A bounded map from scope to [`TokenBucket`].
///
/// The same scope yields the same bucket as long as it stays in the store.
/// Once more than `store_capacity` scopes are in use the least recently used
/// one is dropped; callers still holding its `Arc` keep working on it.
pub struct TokenBucketStore {
    max_capacity: usize,
    buckets: Mutex<LruCache<String, Arc<TokenBucket>>>,
}

impl Default for TokenBucketStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for TokenBucketStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let buckets = self.buckets.lock().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("TokenBucketStore")
            .field("max_capacity", &self.max_capacity)
            .field("scopes", &buckets.len())
            .field("store_capacity", &buckets.cap())
            .finish()
    }
}

impl TokenBucketStore {
    /// Create a store with 500 token buckets and room for 128 scopes.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_CAPACITY, DEFAULT_STORE_CAPACITY)
    }

    /// Create a store with the given bucket size and number of scopes.
    pub fn with_capacity(max_capacity: usize, store_capacity: NonZeroUsize) -> Self {
        Self {
            max_capacity,
            buckets: Mutex::new(LruCache::new(store_capacity)),
        }
    }

    /// Capacity of every bucket created by this store.
    pub fn max_capacity(&self) -> usize {
        self.max_capacity
    }

    /// Number of scopes currently tracked.
    pub fn len(&self) -> usize {
        self.buckets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether no scope is tracked.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get the bucket for `scope`, creating a full one on first use.
    pub fn bucket_for(&self, scope: &str) -> Arc<TokenBucket> {
        let mut buckets = self.buckets.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(bucket) = buckets.get(scope) {
            return bucket.clone();
        }

        let bucket = Arc::new(TokenBucket::new(self.max_capacity));
        if let Some((evicted, _)) = buckets.push(scope.to_string(), bucket.clone()) {
            debug!("token bucket store is full, evicted scope: {evicted}");
        }
        bucket
    }
}
