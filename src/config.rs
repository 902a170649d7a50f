// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;
use url::Url;

use crate::error::ConfigError;
use crate::object_store::{Credentials, HttpObjectStore, LocalObjectStore, SharedObjectStore};

/// Location tried when the configured config file does not exist
pub const FALLBACK_CONFIG_PATH: &str = "configs/podgen.yml";

/// Chunk size used when `upload.chunk_size` is missing or zero
pub const DEFAULT_CHUNK_SIZE: usize = 3;

const DEFAULT_AUTHOR: &str = "PodGen";
const DEFAULT_OWNER: &str = "PodGen";
const DEFAULT_EMAIL: &str = "podgen@localhost.com";
const DEFAULT_CATEGORY: &str = "History";
const DEFAULT_LANGUAGE: &str = "EN";

/// Top-level YAML configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub podcasts: BTreeMap<String, Podcast>,
    #[serde(default)]
    pub cloud_storage: CloudStorage,
    #[serde(default)]
    pub upload: UploadConfig,
    /// Path of the record store database
    #[serde(default)]
    pub db: Option<PathBuf>,
    pub storage: StorageConfig,
}

/// One podcast section
#[derive(Debug, Clone, Deserialize)]
pub struct Podcast {
    pub title: String,
    /// Folder below the storage root holding the recordings
    pub folder: String,
    /// Upload budget per run in bytes; zero or less means unlimited
    #[serde(default)]
    pub max_size: i64,
    #[serde(default)]
    pub delete_old_episodes: bool,
    #[serde(default)]
    pub info: PodcastInfo,
}

/// Feed metadata of a podcast; unset fields fall back to defaults
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PodcastInfo {
    pub author: Option<String>,
    pub owner: Option<String>,
    pub email: Option<String>,
    pub category: Option<String>,
    pub language: Option<String>,
}

impl PodcastInfo {
    pub fn author(&self) -> &str {
        or_default(&self.author, DEFAULT_AUTHOR)
    }

    pub fn owner(&self) -> &str {
        or_default(&self.owner, DEFAULT_OWNER)
    }

    pub fn email(&self) -> &str {
        or_default(&self.email, DEFAULT_EMAIL)
    }

    pub fn category(&self) -> &str {
        or_default(&self.category, DEFAULT_CATEGORY)
    }

    pub fn language(&self) -> &str {
        or_default(&self.language, DEFAULT_LANGUAGE)
    }
}

fn or_default<'a>(value: &'a Option<String>, default: &'a str) -> &'a str {
    value
        .as_deref()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or(default)
}

/// Which object store implementation to use
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    /// Path-style HTTP bucket endpoint
    #[default]
    Http,
    /// Directory on the local filesystem
    Local,
}

/// `cloud_storage` section
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CloudStorage {
    #[serde(default)]
    pub kind: StorageKind,
    /// HTTP endpoint, or the target directory for the local kind
    #[serde(default)]
    pub endpoint_url: String,
    #[serde(default)]
    pub bucket: String,
    #[serde(default)]
    pub region: Option<String>,
    /// Base URL under which locally stored objects are served
    #[serde(default)]
    pub public_url: Option<String>,
    #[serde(default)]
    pub secrets: Option<Secrets>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Secrets {
    #[serde(default)]
    pub aws_key: String,
    #[serde(default)]
    pub aws_secret: String,
}

/// `upload` section
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UploadConfig {
    #[serde(default)]
    pub chunk_size: Option<usize>,
}

impl UploadConfig {
    /// Effective chunk size: the configured value, or the default when unset or zero
    pub fn chunk_size(&self) -> usize {
        match self.chunk_size {
            Some(size) if size > 0 => size,
            _ => DEFAULT_CHUNK_SIZE,
        }
    }
}

/// `storage` section
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Root folder containing one sub folder per podcast
    pub folder: PathBuf,
}

impl Config {
    /// Read and parse a YAML config file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFailed {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::parse(&content, path)
    }

    /// Parse YAML text; `path` is only used for error messages
    pub fn parse(content: &str, path: &Path) -> Result<Self, ConfigError> {
        serde_yaml::from_str(content).map_err(|e| ConfigError::ParseFailed {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Resolve the config file: the requested path, else the fallback location
    pub fn locate(requested: &Path) -> Result<PathBuf, ConfigError> {
        let candidates = [requested.to_path_buf(), PathBuf::from(FALLBACK_CONFIG_PATH)];

        candidates
            .iter()
            .find(|candidate| candidate.is_file())
            .cloned()
            .ok_or_else(|| ConfigError::NotFound(candidates.to_vec()))
    }

    /// Fail when the storage root is missing
    pub fn ensure_storage(&self) -> Result<(), ConfigError> {
        if self.storage.folder.is_dir() {
            Ok(())
        } else {
            Err(ConfigError::StorageNotFound(self.storage.folder.clone()))
        }
    }

    /// Database path, preferring an explicit override over the config value
    pub fn database_path(&self, override_path: Option<&Path>) -> Result<PathBuf, ConfigError> {
        override_path
            .map(Path::to_path_buf)
            .or_else(|| self.db.clone())
            .filter(|path| !path.as_os_str().is_empty())
            .ok_or(ConfigError::MissingDatabase)
    }

    /// Build the object store described by `cloud_storage`
    pub fn object_store(&self) -> Result<SharedObjectStore, ConfigError> {
        let cloud = &self.cloud_storage;

        let public_url = cloud
            .public_url
            .as_deref()
            .map(|url| {
                Url::parse(url).map_err(|e| ConfigError::InvalidEndpoint {
                    url: url.to_string(),
                    source: e,
                })
            })
            .transpose()?;

        match cloud.kind {
            StorageKind::Http => {
                let endpoint =
                    Url::parse(&cloud.endpoint_url).map_err(|e| ConfigError::InvalidEndpoint {
                        url: cloud.endpoint_url.clone(),
                        source: e,
                    })?;
                let mut store = HttpObjectStore::new(endpoint, cloud.bucket.clone())?;

                if let Some(secrets) = &cloud.secrets
                    && !secrets.aws_key.is_empty()
                {
                    store = store.with_credentials(Credentials {
                        key: secrets.aws_key.clone(),
                        secret: secrets.aws_secret.clone(),
                    });
                }

                Ok(Arc::new(store))
            }
            StorageKind::Local => {
                let root = PathBuf::from(&cloud.endpoint_url).join(&cloud.bucket);
                let store = match public_url {
                    Some(url) => LocalObjectStore::new(root).with_public_url(url),
                    None => LocalObjectStore::new(root),
                };
                Ok(Arc::new(store))
            }
        }
    }
}
