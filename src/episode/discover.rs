// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::Path;

use chrono::{DateTime, Utc};

use crate::error::DiscoveryError;

use super::audio::{is_audio_file, parse_publish_date};

/// An audio file found in a podcast folder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFile {
    pub filename: String,
    pub size: u64,
    /// Date parsed from the filename, if it contains one
    pub pub_date: Option<DateTime<Utc>>,
}

/// List the audio files of a podcast folder, sorted by filename
///
/// Directories, non-audio files and entries with non UTF-8 names are skipped.
pub fn list_audio_files(folder: &Path) -> Result<Vec<AudioFile>, DiscoveryError> {
    if !folder.is_dir() {
        return Err(DiscoveryError::FolderNotFound(folder.to_path_buf()));
    }

    let entries = std::fs::read_dir(folder).map_err(|e| DiscoveryError::ReadDirectoryFailed {
        path: folder.to_path_buf(),
        source: e,
    })?;

    let mut files = Vec::new();

    for entry in entries {
        let entry = entry.map_err(|e| DiscoveryError::ReadDirectoryFailed {
            path: folder.to_path_buf(),
            source: e,
        })?;

        let Some(filename) = entry.file_name().to_str().map(String::from) else {
            continue;
        };

        if !is_audio_file(&filename) {
            continue;
        }

        let metadata = entry
            .metadata()
            .map_err(|e| DiscoveryError::ReadDirectoryFailed {
                path: entry.path(),
                source: e,
            })?;

        if !metadata.is_file() {
            continue;
        }

        files.push(AudioFile {
            pub_date: parse_publish_date(&filename),
            size: metadata.len(),
            filename,
        });
    }

    files.sort_by(|a, b| a.filename.cmp(&b.filename));

    Ok(files)
}
