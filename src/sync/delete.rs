// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use futures::StreamExt;
use futures::stream::FuturesUnordered;
use tracing::{debug, info, warn};

use crate::config::Podcast;
use crate::episode::Status;
use crate::error::SyncError;
use crate::object_store::object_key;
use crate::progress::ProgressEvent;

use super::Engine;

/// Result of one delete run for one podcast
#[derive(Debug, Clone, Default)]
pub struct DeleteResult {
    pub deleted: usize,
    pub failed: usize,
    /// Details of failed episodes (filename, error message)
    pub failed_episodes: Vec<(String, String)>,
}

impl Engine {
    /// Remove every Uploaded episode of the podcast from the object store
    ///
    /// Does nothing unless the podcast has `delete_old_episodes` set. All
    /// removals run concurrently. Deleted episodes keep their location and the
    /// session of the upload that published them.
    pub async fn delete_old_episodes(
        &self,
        podcast_id: &str,
        podcast: &Podcast,
    ) -> Result<DeleteResult, SyncError> {
        let mut result = DeleteResult::default();

        if !podcast.delete_old_episodes {
            debug!(podcast = podcast_id, "deleting old episodes disabled");
            return Ok(result);
        }

        let episodes = self.store.find_by_status(podcast_id, Status::Uploaded)?;
        if episodes.is_empty() {
            return Ok(result);
        }

        info!(
            podcast = podcast_id,
            episodes = episodes.len(),
            "deleting old episodes"
        );

        let mut removals: FuturesUnordered<_> = episodes
            .into_iter()
            .map(|episode| {
                let objects = self.objects.clone();
                let key = object_key(&podcast.folder, &episode.filename);
                async move {
                    let removed = objects.remove(&key).await;
                    (episode, removed)
                }
            })
            .collect();

        while let Some((mut episode, removed)) = removals.next().await {
            match removed {
                Ok(()) => {
                    episode.mark_deleted();
                    self.store.upsert(podcast_id, &episode)?;

                    info!(podcast = podcast_id, filename = %episode.filename, "episode deleted");
                    self.reporter.report(ProgressEvent::EpisodeDeleted {
                        podcast_id: podcast_id.to_string(),
                        filename: episode.filename,
                    });
                    result.deleted += 1;
                }
                Err(e) => {
                    warn!(
                        podcast = podcast_id,
                        filename = %episode.filename,
                        error = %e,
                        "failed to delete episode"
                    );
                    self.reporter.report(ProgressEvent::DeleteFailed {
                        podcast_id: podcast_id.to_string(),
                        filename: episode.filename.clone(),
                        error: e.to_string(),
                    });
                    result.failed += 1;
                    result.failed_episodes.push((episode.filename, e.to_string()));
                }
            }
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::super::testing::*;
    use super::*;
    use crate::object_store::MemoryObjectStore;
    use crate::session::Session;
    use tempfile::tempdir;

    async fn uploaded_engine(
        root: &std::path::Path,
        objects: Arc<MemoryObjectStore>,
        files: &[&str],
    ) -> Engine {
        for file in files {
            write_file(root, "history", file, 10);
        }
        let engine = engine(root, objects);
        let podcast = podcast("history");
        engine.update("history", &podcast).unwrap();
        engine
            .upload_new_episodes("history", &podcast, &Session::from("upload"))
            .await
            .unwrap();
        engine
    }

    #[tokio::test]
    async fn deletes_uploaded_episodes_and_keeps_upload_session() {
        let dir = tempdir().unwrap();
        let objects = Arc::new(MemoryObjectStore::new());
        let engine = uploaded_engine(dir.path(), objects.clone(), &["ep1.mp3", "ep2.mp3"]).await;

        let result = engine
            .delete_old_episodes("history", &podcast("history"))
            .await
            .unwrap();

        assert_eq!(result.deleted, 2);
        assert_eq!(result.failed, 0);
        assert!(!objects.contains("history/ep1.mp3"));

        let deleted = engine
            .store()
            .find_by_status("history", Status::Deleted)
            .unwrap();
        assert_eq!(deleted.len(), 2);
        for episode in deleted {
            assert!(episode.location.is_some());
            assert_eq!(episode.session.as_deref(), Some("upload"));
        }
    }

    #[tokio::test]
    async fn disabled_flag_skips_deletion() {
        let dir = tempdir().unwrap();
        let objects = Arc::new(MemoryObjectStore::new());
        let engine = uploaded_engine(dir.path(), objects.clone(), &["ep1.mp3"]).await;

        let mut podcast = podcast("history");
        podcast.delete_old_episodes = false;

        let result = engine.delete_old_episodes("history", &podcast).await.unwrap();

        assert_eq!(result.deleted, 0);
        assert_eq!(objects.remove_count(), 0);
    }

    #[tokio::test]
    async fn failed_removal_keeps_episode_uploaded() {
        let dir = tempdir().unwrap();
        let objects = Arc::new(MemoryObjectStore::new());
        let engine = uploaded_engine(dir.path(), objects.clone(), &["ep1.mp3", "ep2.mp3"]).await;
        objects.fail_on("history/ep1.mp3");

        let result = engine
            .delete_old_episodes("history", &podcast("history"))
            .await
            .unwrap();

        assert_eq!(result.deleted, 1);
        assert_eq!(result.failed, 1);

        let kept = engine
            .store()
            .find_by_filename("history", "ep1.mp3")
            .unwrap()
            .unwrap();
        assert_eq!(kept.status, Status::Uploaded);
        assert_eq!(kept.session.as_deref(), Some("upload"));
    }
}
