//! Per-key bucket storage.

use std::sync::Arc;

use dashmap::DashMap;

use super::backend::Dimension;

/// A concurrent map from an opaque key to its bucket state.
///
/// Buckets are handed out as `Arc`s so that callers update them with atomics
/// or a per-bucket lock after the shard lock has been released. A bucket is
/// never replaced in place; removing a key only means the next access creates
/// a fresh one.
pub struct BucketStore<S> {
    buckets: DashMap<String, Arc<S>>,
}

impl<S> BucketStore<S> {
    pub fn new() -> Self {
        Self {
            buckets: DashMap::new(),
        }
    }

    /// Return the bucket for `key`, installing `init()` if there is none.
    ///
    /// Concurrent callers racing on an absent key all observe the same bucket.
    pub fn get_or_create_with<F>(&self, key: &str, init: F) -> Arc<S>
    where
        F: FnOnce() -> S,
    {
        if let Some(bucket) = self.buckets.get(key) {
            return Arc::clone(bucket.value());
        }

        let bucket = self
            .buckets
            .entry(key.to_owned())
            .or_insert_with(|| Arc::new(init()));
        Arc::clone(bucket.value())
    }

    /// Look up an existing bucket.
    pub fn get(&self, key: &str) -> Option<Arc<S>> {
        self.buckets.get(key).map(|bucket| Arc::clone(bucket.value()))
    }

    /// Remove a key. Returns whether it was present.
    pub fn remove(&self, key: &str) -> bool {
        self.buckets.remove(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Visit every bucket and remove those for which `keep` returns false.
    ///
    /// The map is snapshotted first so `keep` runs without holding shard
    /// locks. A key re-created between the snapshot and the removal is left
    /// alone. Returns the number of removed buckets.
    pub fn sweep<F>(&self, mut keep: F) -> usize
    where
        F: FnMut(&S) -> bool,
    {
        let snapshot: Vec<(String, Arc<S>)> = self
            .buckets
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect();

        let mut removed = 0;
        for (key, bucket) in snapshot {
            if keep(&bucket) {
                continue;
            }
            if self
                .buckets
                .remove_if(&key, |_, current| Arc::ptr_eq(current, &bucket))
                .is_some()
            {
                removed += 1;
            }
        }
        removed
    }
}

impl<S> Default for BucketStore<S> {
    fn default() -> Self {
        Self::new()
    }
}

/// One bucket store per rate limited dimension.
pub struct DimensionStores<S> {
    ip: BucketStore<S>,
    password: BucketStore<S>,
    login: BucketStore<S>,
}

impl<S> DimensionStores<S> {
    pub fn new() -> Self {
        Self {
            ip: BucketStore::new(),
            password: BucketStore::new(),
            login: BucketStore::new(),
        }
    }

    pub fn get(&self, dimension: Dimension) -> &BucketStore<S> {
        match dimension {
            Dimension::Ip => &self.ip,
            Dimension::Password => &self.password,
            Dimension::Login => &self.login,
        }
    }
}

impl<S> Default for DimensionStores<S> {
    fn default() -> Self {
        Self::new()
    }
}
