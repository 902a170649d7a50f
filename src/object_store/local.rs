// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::info;
use url::Url;

use crate::error::ObjectStoreError;

use super::{ObjectInfo, ObjectStore};

/// Object store backed by a local directory, e.g. the document root of a web server
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
    public_url: Option<Url>,
}

impl LocalObjectStore {
    /// Objects are written below `root`; locations are `file://` URLs
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            public_url: None,
        }
    }

    /// Report locations relative to a public base URL instead of `file://` URLs
    pub fn with_public_url(mut self, public_url: Url) -> Self {
        self.public_url = Some(public_url);
        self
    }

    fn object_path(&self, key: &str) -> PathBuf {
        key.split('/')
            .filter(|segment| !segment.is_empty() && *segment != "..")
            .fold(self.root.clone(), |path, segment| path.join(segment))
    }

    fn location(&self, key: &str, path: &Path) -> String {
        if let Some(base) = &self.public_url {
            let mut url = base.clone();
            let joined = match url.path_segments_mut() {
                Ok(mut segments) => {
                    segments
                        .pop_if_empty()
                        .extend(key.split('/').filter(|s| !s.is_empty()));
                    true
                }
                Err(()) => false,
            };
            if joined {
                return url.to_string();
            }
        }

        Url::from_file_path(path)
            .map(|url| url.to_string())
            .unwrap_or_else(|_| path.display().to_string())
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn put(
        &self,
        key: &str,
        local_path: &Path,
        _content_type: &str,
    ) -> Result<String, ObjectStoreError> {
        let target = self.object_path(key);
        let write_error = |e| ObjectStoreError::WriteFailed {
            key: key.to_string(),
            source: e,
        };

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(write_error)?;
        }

        let bytes = tokio::fs::copy(local_path, &target)
            .await
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => ObjectStoreError::LocalFileFailed {
                    path: local_path.to_path_buf(),
                    source: e,
                },
                _ => write_error(e),
            })?;

        info!(key, bytes, "object copied");
        Ok(self.location(key, &target))
    }

    async fn remove(&self, key: &str) -> Result<(), ObjectStoreError> {
        match tokio::fs::remove_file(self.object_path(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ObjectStoreError::RemoveFailed {
                key: key.to_string(),
                source: e,
            }),
        }
    }

    async fn stat(&self, key: &str) -> Result<Option<ObjectInfo>, ObjectStoreError> {
        let path = self.object_path(key);

        match tokio::fs::metadata(&path).await {
            Ok(metadata) if metadata.is_file() => Ok(Some(ObjectInfo {
                size: metadata.len(),
                location: self.location(key, &path),
            })),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ObjectStoreError::LocalFileFailed { path, source: e }),
        }
    }
}
