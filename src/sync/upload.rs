// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::HashSet;
use std::path::PathBuf;

use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::config::Podcast;
use crate::episode::{Episode, Status, content_type_for};
use crate::error::{ObjectStoreError, SyncError};
use crate::object_store::{SharedObjectStore, object_key};
use crate::progress::ProgressEvent;
use crate::session::Session;

use super::Engine;

/// Result of one upload run for one podcast
#[derive(Debug, Clone, Default)]
pub struct UploadResult {
    /// Session token written into every uploaded episode
    pub session: String,
    /// Number of episodes selected under the budget
    pub selected: usize,
    /// Episodes now marked Uploaded (including reused objects)
    pub uploaded: usize,
    /// Subset of `uploaded` whose remote object already existed
    pub reused: usize,
    /// Number of episodes that stayed New because their task failed
    pub failed: usize,
    /// Details of failed episodes (filename, error message)
    pub failed_episodes: Vec<(String, String)>,
    /// Number of chunks processed
    pub chunks: usize,
}

/// Outcome of a single upload task
struct TaskOutput {
    slot: usize,
    episode: Episode,
    result: Result<Uploaded, ObjectStoreError>,
}

struct Uploaded {
    location: String,
    reused: bool,
}

impl Engine {
    /// Upload the New episodes of a podcast that fit into its byte budget
    ///
    /// Episodes are processed in chunks of `chunk_size`. Uploads within a
    /// chunk run concurrently and the next chunk starts only once every task
    /// of the current one finished and its results were stored. A failed
    /// task leaves its episode New so the next run retries it; store errors
    /// abort the run.
    pub async fn upload_new_episodes(
        &self,
        podcast_id: &str,
        podcast: &Podcast,
        session: &Session,
    ) -> Result<UploadResult, SyncError> {
        let batch = self
            .store
            .select_by_size_budget(podcast_id, Status::New, podcast.max_size)?;

        let chunks: Vec<&[Episode]> = batch.chunks(self.chunk_size).collect();
        let total_chunks = chunks.len();
        let total_bytes: u64 = batch.iter().map(|e| e.size).sum();

        let mut result = UploadResult {
            session: session.to_string(),
            selected: batch.len(),
            chunks: total_chunks,
            ..Default::default()
        };

        if batch.is_empty() {
            debug!(podcast = podcast_id, "nothing to upload");
            return Ok(result);
        }

        info!(
            podcast = podcast_id,
            session = %session,
            episodes = batch.len(),
            bytes = total_bytes,
            chunks = total_chunks,
            "starting upload"
        );

        self.reporter.report(ProgressEvent::UploadPlanned {
            podcast_id: podcast_id.to_string(),
            session: session.to_string(),
            episodes: batch.len(),
            total_bytes,
            chunks: total_chunks,
        });

        let folder = self.podcast_folder(podcast);

        for (chunk_index, chunk) in chunks.into_iter().enumerate() {
            let mut tasks = JoinSet::new();
            let mut pending: HashSet<String> = HashSet::new();

            for (slot, episode) in chunk.iter().enumerate() {
                pending.insert(episode.filename.clone());

                self.reporter.report(ProgressEvent::UploadStarting {
                    podcast_id: podcast_id.to_string(),
                    slot,
                    filename: episode.filename.clone(),
                    size: episode.size,
                });

                let objects = self.objects.clone();
                let key = object_key(&podcast.folder, &episode.filename);
                let local_path = folder.join(&episode.filename);
                let episode = episode.clone();

                tasks.spawn(async move {
                    let content_type = content_type_for(&episode.filename);
                    let result =
                        upload_episode(objects, &key, local_path, episode.size, content_type)
                            .await;
                    TaskOutput {
                        slot,
                        episode,
                        result,
                    }
                });
            }

            let mut chunk_uploaded = 0;
            let mut chunk_failed = 0;

            // Results are applied in completion order
            while let Some(joined) = tasks.join_next().await {
                let output = match joined {
                    Ok(output) => output,
                    Err(e) => {
                        error!(podcast = podcast_id, error = %e, "upload task aborted");
                        continue;
                    }
                };
                pending.remove(&output.episode.filename);

                match output.result {
                    Ok(uploaded) => {
                        self.apply_upload(podcast_id, &output.episode, &uploaded, session)?;

                        self.reporter.report(ProgressEvent::UploadCompleted {
                            podcast_id: podcast_id.to_string(),
                            slot: output.slot,
                            filename: output.episode.filename.clone(),
                            location: uploaded.location,
                            reused: uploaded.reused,
                        });

                        chunk_uploaded += 1;
                        if uploaded.reused {
                            result.reused += 1;
                        }
                    }
                    Err(e) => {
                        warn!(
                            podcast = podcast_id,
                            filename = %output.episode.filename,
                            error = %e,
                            "upload failed"
                        );

                        self.reporter.report(ProgressEvent::UploadFailed {
                            podcast_id: podcast_id.to_string(),
                            slot: output.slot,
                            filename: output.episode.filename.clone(),
                            error: e.to_string(),
                        });

                        chunk_failed += 1;
                        result
                            .failed_episodes
                            .push((output.episode.filename, e.to_string()));
                    }
                }
            }

            // Tasks that panicked never reported back
            let mut aborted: Vec<String> = pending.into_iter().collect();
            aborted.sort();
            for filename in aborted {
                chunk_failed += 1;
                result
                    .failed_episodes
                    .push((filename, "upload task aborted".to_string()));
            }

            result.uploaded += chunk_uploaded;
            result.failed += chunk_failed;

            debug!(
                podcast = podcast_id,
                chunk = chunk_index + 1,
                of = total_chunks,
                uploaded = chunk_uploaded,
                failed = chunk_failed,
                "chunk completed"
            );

            self.reporter.report(ProgressEvent::ChunkCompleted {
                podcast_id: podcast_id.to_string(),
                chunk_index,
                total_chunks,
                uploaded: chunk_uploaded,
                failed: chunk_failed,
            });
        }

        if result.failed > 0 {
            error!(
                podcast = podcast_id,
                session = %session,
                failed = result.failed,
                "upload run finished with failures"
            );
        }

        Ok(result)
    }

    /// Mark an episode Uploaded, starting from its current stored record
    fn apply_upload(
        &self,
        podcast_id: &str,
        selected: &Episode,
        uploaded: &Uploaded,
        session: &Session,
    ) -> Result<(), SyncError> {
        let mut episode = self
            .store
            .find_by_filename(podcast_id, &selected.filename)?
            .unwrap_or_else(|| selected.clone());

        episode.mark_uploaded(uploaded.location.clone(), session.as_str());
        self.store.upsert(podcast_id, &episode)?;

        info!(
            podcast = podcast_id,
            filename = %episode.filename,
            location = %uploaded.location,
            reused = uploaded.reused,
            "episode uploaded"
        );
        Ok(())
    }
}

/// Upload one file unless an object of the same size already exists
///
/// The size check is best effort: when it fails the file is uploaded anyway.
async fn upload_episode(
    objects: SharedObjectStore,
    key: &str,
    local_path: PathBuf,
    size: u64,
    content_type: &str,
) -> Result<Uploaded, ObjectStoreError> {
    match objects.stat(key).await {
        Ok(Some(existing)) if existing.size == size => {
            return Ok(Uploaded {
                location: existing.location,
                reused: true,
            });
        }
        Ok(_) => {}
        Err(e) => {
            warn!(key, error = %e, "remote size check failed, uploading anyway");
        }
    }

    let location = objects.put(key, &local_path, content_type).await?;

    Ok(Uploaded {
        location,
        reused: false,
    })
}
