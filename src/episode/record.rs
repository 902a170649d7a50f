// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Publication state of an episode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Discovered locally, not (or no longer) published
    New,
    /// Present in the remote object store
    Uploaded,
    /// Removed from the remote object store
    Deleted,
}

impl Status {
    /// Stable name used in the store's status column
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::New => "new",
            Status::Uploaded => "uploaded",
            Status::Deleted => "deleted",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persistent record of one audio file of a podcast
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Episode {
    /// Filename within the podcast folder; unique per podcast
    pub filename: String,
    pub pub_date: DateTime<Utc>,
    /// Size of the local file in bytes
    pub size: u64,
    pub status: Status,
    /// Remote location, set on first upload and kept afterwards
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// Token of the upload run that published this episode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,
}

impl Episode {
    /// Create a freshly discovered episode
    pub fn new(filename: impl Into<String>, size: u64, pub_date: DateTime<Utc>) -> Self {
        Self {
            filename: filename.into(),
            pub_date,
            size,
            status: Status::New,
            location: None,
            session: None,
        }
    }

    /// Record a successful upload (or a reused remote object)
    pub fn mark_uploaded(&mut self, location: impl Into<String>, session: &str) {
        self.status = Status::Uploaded;
        self.location = Some(location.into());
        self.session = Some(session.to_string());
    }

    /// Record a successful remote removal
    ///
    /// Location and session stay as the upload left them, so rolling back the
    /// upload session also restores its deleted episodes.
    pub fn mark_deleted(&mut self) {
        self.status = Status::Deleted;
    }

    /// Put the episode back into the upload queue
    pub fn restore(&mut self) {
        self.status = Status::New;
    }
}
