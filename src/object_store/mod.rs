// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

mod http;
mod local;
mod memory;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::ObjectStoreError;

pub use http::{Credentials, HttpObjectStore};
pub use local::LocalObjectStore;
pub use memory::MemoryObjectStore;

/// Size and public location of a remote object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    pub size: u64,
    pub location: String,
}

/// Remote bucket abstraction for testability
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Upload a local file, creating the bucket on first use. Returns the object location.
    async fn put(
        &self,
        key: &str,
        local_path: &Path,
        content_type: &str,
    ) -> Result<String, ObjectStoreError>;

    /// Remove an object; removing a missing object succeeds
    async fn remove(&self, key: &str) -> Result<(), ObjectStoreError>;

    /// Look up an object; a missing object is `Ok(None)`
    async fn stat(&self, key: &str) -> Result<Option<ObjectInfo>, ObjectStoreError>;
}

/// A shared reference to an object store
pub type SharedObjectStore = Arc<dyn ObjectStore>;

/// Remote key of a file inside a podcast folder
pub fn object_key(folder: &str, filename: &str) -> String {
    let folder = folder.trim_matches('/');
    if folder.is_empty() {
        filename.to_string()
    } else {
        format!("{}/{}", folder, filename)
    }
}
