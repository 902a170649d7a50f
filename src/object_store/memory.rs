// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::ObjectStoreError;

use super::{ObjectInfo, ObjectStore};

/// In-process object store with call accounting and failure injection
///
/// Useful for tests and dry runs: it records every upload and removal,
/// tracks how many uploads are in flight at once and can be told to reject
/// specific keys.
#[derive(Debug)]
pub struct MemoryObjectStore {
    base_url: String,
    latency: Duration,
    objects: Mutex<HashMap<String, u64>>,
    failing: Mutex<HashSet<String>>,
    failing_stat: Mutex<HashSet<String>>,
    put_calls: AtomicUsize,
    remove_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl Default for MemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self {
            base_url: "memory://bucket".to_string(),
            latency: Duration::ZERO,
            objects: Mutex::new(HashMap::new()),
            failing: Mutex::new(HashSet::new()),
            failing_stat: Mutex::new(HashSet::new()),
            put_calls: AtomicUsize::new(0),
            remove_calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Delay every upload by `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Location an object with this key is reported at
    pub fn location_of(&self, key: &str) -> String {
        format!("{}/{}", self.base_url, key)
    }

    /// Pretend an object of `size` bytes already exists
    pub fn insert(&self, key: &str, size: u64) {
        lock(&self.objects).insert(key.to_string(), size);
    }

    /// Make every upload and removal of `key` fail
    pub fn fail_on(&self, key: &str) {
        lock(&self.failing).insert(key.to_string());
    }

    /// Make every size check of `key` fail as if access were forbidden
    pub fn fail_stat_on(&self, key: &str) {
        lock(&self.failing_stat).insert(key.to_string());
    }

    pub fn contains(&self, key: &str) -> bool {
        lock(&self.objects).contains_key(key)
    }

    pub fn put_count(&self) -> usize {
        self.put_calls.load(Ordering::SeqCst)
    }

    pub fn remove_count(&self) -> usize {
        self.remove_calls.load(Ordering::SeqCst)
    }

    /// Highest number of uploads observed running at the same time
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn is_failing(&self, key: &str) -> bool {
        lock(&self.failing).contains(key)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Decrements the in-flight counter when an upload ends, however it ends
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(
        &self,
        key: &str,
        local_path: &Path,
        _content_type: &str,
    ) -> Result<String, ObjectStoreError> {
        self.put_calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = InFlight(&self.in_flight);
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        if self.is_failing(key) {
            return Err(ObjectStoreError::Rejected {
                operation: "put",
                key: key.to_string(),
            });
        }

        let size = tokio::fs::metadata(local_path)
            .await
            .map_err(|e| ObjectStoreError::LocalFileFailed {
                path: local_path.to_path_buf(),
                source: e,
            })?
            .len();

        self.insert(key, size);
        Ok(self.location_of(key))
    }

    async fn remove(&self, key: &str) -> Result<(), ObjectStoreError> {
        self.remove_calls.fetch_add(1, Ordering::SeqCst);

        if self.is_failing(key) {
            return Err(ObjectStoreError::Rejected {
                operation: "remove",
                key: key.to_string(),
            });
        }

        lock(&self.objects).remove(key);
        Ok(())
    }

    async fn stat(&self, key: &str) -> Result<Option<ObjectInfo>, ObjectStoreError> {
        if lock(&self.failing_stat).contains(key) {
            return Err(ObjectStoreError::HttpStatus {
                url: self.location_of(key),
                status: 403,
            });
        }

        Ok(lock(&self.objects).get(key).map(|size| ObjectInfo {
            size: *size,
            location: self.location_of(key),
        }))
    }
}
