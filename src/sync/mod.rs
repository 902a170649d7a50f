// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The episode lifecycle engine.
//!
//! One [`Engine`] serves every podcast of a run. It moves episodes between
//! the record store and the object store:
//!
//! - [`Engine::update`] records newly discovered audio files as New
//! - [`Engine::upload_new_episodes`] uploads New episodes in chunks under a byte budget
//! - [`Engine::delete_old_episodes`] removes Uploaded episodes remotely
//! - [`Engine::rollback_last`] and [`Engine::rollback_session`] put episodes back to New
//! - [`Engine::regenerate_feed`] and [`Engine::upload_podcast_image`] publish podcast artifacts

mod delete;
mod publish;
mod rollback;
mod upload;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};

use crate::config::{DEFAULT_CHUNK_SIZE, Podcast};
use crate::episode::{Episode, list_audio_files};
use crate::error::SyncError;
use crate::object_store::SharedObjectStore;
use crate::progress::{NoopReporter, ProgressEvent, SharedProgressReporter};
use crate::store::RecordStore;

pub use delete::DeleteResult;
pub use publish::{FEED_CONTENT_TYPE, IMAGE_CONTENT_TYPE, PODCAST_IMAGE};
pub use rollback::RollbackResult;
pub use upload::UploadResult;

/// Synchronizes podcast folders, the record store and the object store
#[derive(Clone)]
pub struct Engine {
    store: Arc<RecordStore>,
    objects: SharedObjectStore,
    storage_root: PathBuf,
    chunk_size: usize,
    reporter: SharedProgressReporter,
}

impl Engine {
    pub fn new(
        store: Arc<RecordStore>,
        objects: SharedObjectStore,
        storage_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            store,
            objects,
            storage_root: storage_root.into(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            reporter: NoopReporter::shared(),
        }
    }

    /// Number of concurrent uploads per chunk; values below one become one
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn with_reporter(mut self, reporter: SharedProgressReporter) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    fn podcast_folder(&self, podcast: &Podcast) -> PathBuf {
        self.storage_root.join(&podcast.folder)
    }

    fn storage_root(&self) -> &Path {
        &self.storage_root
    }

    /// Record every audio file of the podcast folder not yet known to the store
    ///
    /// Returns the number of newly recorded episodes. Files without a date in
    /// their name are dated at discovery time.
    pub fn update(&self, podcast_id: &str, podcast: &Podcast) -> Result<usize, SyncError> {
        let folder = self.podcast_folder(podcast);
        let files = list_audio_files(&folder)?;

        let mut discovered = 0;
        for file in files {
            if self
                .store
                .find_by_filename(podcast_id, &file.filename)?
                .is_some()
            {
                continue;
            }

            let pub_date = file.pub_date.unwrap_or_else(Utc::now);
            let episode = Episode::new(file.filename, file.size, pub_date);
            self.store.upsert(podcast_id, &episode)?;

            debug!(podcast = podcast_id, filename = %episode.filename, "new episode");
            discovered += 1;
        }

        if discovered > 0 {
            info!(
                podcast = podcast_id,
                count = discovered,
                "found new episodes for {}",
                podcast.title
            );
        }

        self.reporter.report(ProgressEvent::ScanCompleted {
            podcast_id: podcast_id.to_string(),
            discovered,
        });

        Ok(discovered)
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::episode::Status;
    use crate::object_store::MemoryObjectStore;
    use tempfile::tempdir;

    #[test]
    fn update_records_new_audio_files() {
        let dir = tempdir().unwrap();
        write_file(dir.path(), "history", "2024-01-15-first.mp3", 100);
        write_file(dir.path(), "history", "second.m4a", 200);
        write_file(dir.path(), "history", "notes.txt", 10);

        let engine = engine(dir.path(), Arc::new(MemoryObjectStore::new()));
        let podcast = podcast("history");

        assert_eq!(engine.update("history", &podcast).unwrap(), 2);

        let episodes = engine.store().find_by_status("history", Status::New).unwrap();
        assert_eq!(episodes.len(), 2);
        assert_eq!(episodes[0].filename, "2024-01-15-first.mp3");
        assert_eq!(episodes[0].size, 100);
        assert_eq!(
            episodes[0].pub_date.format("%Y-%m-%d").to_string(),
            "2024-01-15"
        );
        assert!(episodes.iter().all(|e| e.location.is_none()));
    }

    #[test]
    fn update_is_idempotent() {
        let dir = tempdir().unwrap();
        write_file(dir.path(), "history", "ep1.mp3", 100);
        write_file(dir.path(), "history", "ep2.mp3", 100);

        let engine = engine(dir.path(), Arc::new(MemoryObjectStore::new()));
        let podcast = podcast("history");

        assert_eq!(engine.update("history", &podcast).unwrap(), 2);
        assert_eq!(engine.update("history", &podcast).unwrap(), 0);

        write_file(dir.path(), "history", "ep3.mp3", 100);
        assert_eq!(engine.update("history", &podcast).unwrap(), 1);
    }

    #[test]
    fn update_keeps_existing_status() {
        let dir = tempdir().unwrap();
        write_file(dir.path(), "history", "ep1.mp3", 100);

        let engine = engine(dir.path(), Arc::new(MemoryObjectStore::new()));
        let podcast = podcast("history");
        engine.update("history", &podcast).unwrap();

        let mut episode = engine
            .store()
            .find_by_filename("history", "ep1.mp3")
            .unwrap()
            .unwrap();
        episode.mark_uploaded("memory://bucket/history/ep1.mp3", "s1");
        engine.store().upsert("history", &episode).unwrap();

        engine.update("history", &podcast).unwrap();

        let episode = engine
            .store()
            .find_by_filename("history", "ep1.mp3")
            .unwrap()
            .unwrap();
        assert_eq!(episode.status, Status::Uploaded);
    }

    #[test]
    fn update_fails_for_missing_folder() {
        let dir = tempdir().unwrap();
        let engine = engine(dir.path(), Arc::new(MemoryObjectStore::new()));

        let result = engine.update("history", &podcast("missing"));
        assert!(matches!(result, Err(SyncError::Discovery(_))));
    }

    #[test]
    fn chunk_size_has_a_floor_of_one() {
        let dir = tempdir().unwrap();
        let engine = engine(dir.path(), Arc::new(MemoryObjectStore::new())).with_chunk_size(0);
        assert_eq!(engine.chunk_size(), 1);
    }
}
