// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur when loading the YAML configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    ParseFailed {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Config file not found (tried {0:?})")]
    NotFound(Vec<PathBuf>),

    #[error("Storage folder does not exist: {0}")]
    StorageNotFound(PathBuf),

    #[error("No record store database configured")]
    MissingDatabase,

    #[error("Invalid object storage endpoint '{url}': {source}")]
    InvalidEndpoint {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("Unknown podcast '{0}'")]
    UnknownPodcast(String),

    #[error("No podcasts selected")]
    NoPodcastsSelected,
}

/// Errors raised by the episode record store
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Failed to create database directory {path}: {source}")]
    CreateDirectoryFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize episode record: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Record store lock poisoned")]
    Poisoned,

    #[error("Migration error: {0}")]
    Migration(String),
}

/// Errors that can occur when listing a podcast folder
#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("Podcast folder does not exist: {0}")]
    FolderNotFound(PathBuf),

    #[error("Failed to read directory {path}: {source}")]
    ReadDirectoryFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors that can occur when talking to the remote object store
#[derive(Error, Debug)]
pub enum ObjectStoreError {
    #[error("HTTP request failed for {url}: {source}")]
    HttpFailed {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP error {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Failed to read local file {path}: {source}")]
    LocalFileFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write object {key}: {source}")]
    WriteFailed {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to remove object {key}: {source}")]
    RemoveFailed {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Object store rejected {operation} of {key}")]
    Rejected { operation: &'static str, key: String },
}

/// Errors that can occur when rendering or writing a feed
#[derive(Error, Debug)]
pub enum FeedError {
    #[error("Failed to render RSS feed: {0}")]
    RenderFailed(#[from] rss::Error),

    #[error("Rendered feed is not valid UTF-8")]
    InvalidEncoding(#[from] std::string::FromUtf8Error),

    #[error("Failed to write feed file {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Top-level errors for engine operations
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Discovery error: {0}")]
    Discovery(#[from] DiscoveryError),

    #[error("Object store error: {0}")]
    ObjectStore(#[from] ObjectStoreError),

    #[error("Feed error: {0}")]
    Feed(#[from] FeedError),

    #[error("Podcast image not found (tried {0:?})")]
    ImageNotFound(Vec<PathBuf>),

    #[error("Podcast task panicked: {0}")]
    TaskFailed(String),
}
