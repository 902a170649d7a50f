// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Runs engine operations across the selected podcasts.

use std::collections::{BTreeSet, HashMap};
use std::future::Future;

use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::config::{Config, Podcast};
use crate::error::{ConfigError, SyncError};
use crate::session::Session;
use crate::sync::Engine;

/// What a single invocation should do
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunPlan {
    /// Record newly discovered episodes
    pub scan: bool,
    /// Delete old episodes, upload new ones, then regenerate feeds
    pub upload: bool,
    /// Regenerate feeds
    pub feed: bool,
    /// Re-upload podcast images
    pub image: bool,
    /// Roll back the most recent delete
    pub rollback: bool,
    /// Roll back a named session; ignored when `rollback` is set
    pub rollback_session: Option<String>,
}

/// A podcast-level failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub podcast_id: String,
    /// Affected episode, if the failure is per episode
    pub filename: Option<String>,
    pub error: String,
}

/// Aggregated counts of one run across all selected podcasts
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    /// Session token of the upload run
    pub session: Option<String>,
    pub discovered: usize,
    pub uploaded: usize,
    pub reused: usize,
    pub deleted: usize,
    pub restored: usize,
    pub images: usize,
    /// Feed locations by podcast id
    pub feeds: Vec<(String, String)>,
    pub failures: Vec<Failure>,
}

impl RunReport {
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    fn fail(&mut self, podcast_id: &str, filename: Option<String>, error: impl ToString) {
        self.failures.push(Failure {
            podcast_id: podcast_id.to_string(),
            filename,
            error: error.to_string(),
        });
    }
}

/// Resolve `-p a,b` or `--all` into the list of podcasts to process
///
/// An explicit selection wins over `all`. Unknown ids are an error.
pub fn select_podcasts(
    config: &Config,
    selection: Option<&str>,
    all: bool,
) -> Result<Vec<(String, Podcast)>, ConfigError> {
    let selection = selection.map(str::trim).filter(|s| !s.is_empty());

    let ids: BTreeSet<String> = match selection {
        Some(list) => list
            .split(',')
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(String::from)
            .collect(),
        None if all => config.podcasts.keys().cloned().collect(),
        None => BTreeSet::new(),
    };

    if ids.is_empty() {
        return Err(ConfigError::NoPodcastsSelected);
    }

    ids.into_iter()
        .map(|id| match config.podcasts.get(&id) {
            Some(podcast) => Ok((id, podcast.clone())),
            None => Err(ConfigError::UnknownPodcast(id)),
        })
        .collect()
}

/// Fans engine operations out over the selected podcasts
pub struct App {
    engine: Engine,
    podcasts: Vec<(String, Podcast)>,
}

impl App {
    pub fn new(engine: Engine, podcasts: Vec<(String, Podcast)>) -> Self {
        Self { engine, podcasts }
    }

    pub fn podcasts(&self) -> &[(String, Podcast)] {
        &self.podcasts
    }

    /// Execute a plan: scan, images, rollback, upload and feeds, in that order
    ///
    /// Per-episode and per-podcast failures are collected in the report.
    /// Only record store failures abort the run.
    pub async fn run(&self, plan: &RunPlan) -> Result<RunReport, SyncError> {
        let mut report = RunReport::default();

        if plan.scan {
            self.scan(&mut report).await?;
        }

        let mut images = None;
        if plan.image {
            images = Some(self.upload_images(&mut report).await?);
        }

        if plan.rollback {
            self.rollback_last(&mut report).await?;
        } else if let Some(session) = plan.rollback_session.as_deref() {
            self.rollback_session(session, &mut report).await?;
        }

        if plan.upload {
            self.delete_old_episodes(&mut report).await?;
            self.upload_episodes(&mut report).await?;
        }

        if plan.upload || plan.feed {
            let images = match images {
                Some(images) => images,
                None => self.image_locations().await?,
            };
            self.generate_feeds(&images, &mut report).await?;
        }

        Ok(report)
    }

    async fn scan(&self, report: &mut RunReport) -> Result<(), SyncError> {
        let results = self
            .for_each_podcast(|engine, id, podcast| async move { engine.update(&id, &podcast) })
            .await;

        for (id, result) in results {
            if let Some(count) = absorb(&id, result, report)? {
                report.discovered += count;
            }
        }
        Ok(())
    }

    async fn upload_images(
        &self,
        report: &mut RunReport,
    ) -> Result<HashMap<String, String>, SyncError> {
        let results = self
            .for_each_podcast(|engine, id, podcast| async move {
                engine.upload_podcast_image(&id, &podcast).await
            })
            .await;

        let mut images = HashMap::new();
        for (id, result) in results {
            if let Some(location) = absorb(&id, result, report)? {
                report.images += 1;
                images.insert(id, location);
            }
        }
        Ok(images)
    }

    async fn image_locations(&self) -> Result<HashMap<String, String>, SyncError> {
        let results = self
            .for_each_podcast(|engine, id, podcast| async move {
                engine.podcast_image_location(&id, &podcast).await
            })
            .await;

        let mut images = HashMap::new();
        for (id, result) in results {
            match result {
                Ok(Some(location)) => {
                    images.insert(id, location);
                }
                Ok(None) => {}
                Err(SyncError::Store(e)) => return Err(SyncError::Store(e)),
                // A missing cover only degrades the feed
                Err(e) => warn!(podcast = %id, error = %e, "can't look up podcast image"),
            }
        }
        Ok(images)
    }

    async fn rollback_last(&self, report: &mut RunReport) -> Result<(), SyncError> {
        let results = self
            .for_each_podcast(|engine, id, _| async move { engine.rollback_last(&id) })
            .await;

        for (id, result) in results {
            if let Some(rollback) = absorb(&id, result, report)? {
                report.restored += rollback.restored;
            }
        }
        Ok(())
    }

    async fn rollback_session(
        &self,
        session: &str,
        report: &mut RunReport,
    ) -> Result<(), SyncError> {
        let session = session.trim().to_string();
        let results = self
            .for_each_podcast(move |engine, id, _| {
                let session = session.clone();
                async move { engine.rollback_session(&id, &session) }
            })
            .await;

        for (id, result) in results {
            if let Some(rollback) = absorb(&id, result, report)? {
                report.restored += rollback.restored;
            }
        }
        Ok(())
    }

    async fn delete_old_episodes(&self, report: &mut RunReport) -> Result<(), SyncError> {
        let results = self
            .for_each_podcast(|engine, id, podcast| async move {
                engine.delete_old_episodes(&id, &podcast).await
            })
            .await;

        for (id, result) in results {
            if let Some(deleted) = absorb(&id, result, report)? {
                report.deleted += deleted.deleted;
                for (filename, error) in deleted.failed_episodes {
                    report.fail(&id, Some(filename), error);
                }
            }
        }
        Ok(())
    }

    /// Upload new episodes of every podcast under one shared session
    async fn upload_episodes(&self, report: &mut RunReport) -> Result<(), SyncError> {
        let session = Session::mint();
        info!(session = %session, "starting upload session");
        report.session = Some(session.to_string());

        let results = self
            .for_each_podcast(move |engine, id, podcast| {
                let session = session.clone();
                async move { engine.upload_new_episodes(&id, &podcast, &session).await }
            })
            .await;

        for (id, result) in results {
            if let Some(uploaded) = absorb(&id, result, report)? {
                report.uploaded += uploaded.uploaded;
                report.reused += uploaded.reused;
                for (filename, error) in uploaded.failed_episodes {
                    report.fail(&id, Some(filename), error);
                }
            }
        }
        Ok(())
    }

    async fn generate_feeds(
        &self,
        images: &HashMap<String, String>,
        report: &mut RunReport,
    ) -> Result<(), SyncError> {
        let images = images.clone();
        let results = self
            .for_each_podcast(move |engine, id, podcast| {
                let image_url = images.get(&id).cloned().unwrap_or_default();
                async move { engine.regenerate_feed(&id, &podcast, &image_url).await }
            })
            .await;

        for (id, result) in results {
            if let Some(location) = absorb(&id, result, report)? {
                info!(podcast = %id, location = %location, "feed url");
                report.feeds.push((id, location));
            }
        }
        Ok(())
    }

    /// Run `op` for every selected podcast concurrently
    ///
    /// Results come back sorted by podcast id. A task that panics is reported
    /// as `SyncError::TaskFailed` for its podcast.
    async fn for_each_podcast<T, F, Fut>(&self, op: F) -> Vec<(String, Result<T, SyncError>)>
    where
        T: Send + 'static,
        F: Fn(Engine, String, Podcast) -> Fut,
        Fut: Future<Output = Result<T, SyncError>> + Send + 'static,
    {
        let mut tasks = JoinSet::new();
        let mut pending = BTreeSet::new();

        for (id, podcast) in &self.podcasts {
            pending.insert(id.clone());
            let task = op(self.engine.clone(), id.clone(), podcast.clone());
            let id = id.clone();
            tasks.spawn(async move { (id, task.await) });
        }

        let mut results = Vec::with_capacity(self.podcasts.len());
        let mut panic_message = String::new();

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((id, result)) => {
                    pending.remove(&id);
                    results.push((id, result));
                }
                Err(e) => {
                    error!(error = %e, "podcast task failed");
                    panic_message = e.to_string();
                }
            }
        }

        for id in pending {
            results.push((id, Err(SyncError::TaskFailed(panic_message.clone()))));
        }

        results.sort_by(|a, b| a.0.cmp(&b.0));
        results
    }
}

/// Record a podcast-level failure in the report; store failures abort the run
fn absorb<T>(
    podcast_id: &str,
    result: Result<T, SyncError>,
    report: &mut RunReport,
) -> Result<Option<T>, SyncError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(SyncError::Store(e)) => {
            error!(podcast = podcast_id, error = %e, "record store failure");
            Err(SyncError::Store(e))
        }
        Err(e) => {
            error!(podcast = podcast_id, error = %e, "podcast operation failed");
            report.fail(podcast_id, None, &e);
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::Arc;

    use super::*;
    use crate::episode::Status;
    use crate::feed::feed_filename;
    use crate::object_store::MemoryObjectStore;
    use crate::store::RecordStore;
    use tempfile::tempdir;

    const CONFIG: &str = r#"
podcasts:
  history:
    title: History Hour
    folder: history
    delete_old_episodes: true
  music:
    title: Music Corner
    folder: music
storage:
  folder: /tmp
"#;

    fn config() -> Config {
        Config::parse(CONFIG, Path::new("podgen.yml")).unwrap()
    }

    fn write_file(root: &Path, folder: &str, filename: &str, size: usize) {
        let dir = root.join(folder);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(filename), vec![0u8; size]).unwrap();
    }

    fn app(root: &Path, objects: Arc<MemoryObjectStore>, selection: &str) -> App {
        let store = Arc::new(RecordStore::open_in_memory().unwrap());
        let engine = Engine::new(store, objects, root);
        let podcasts = select_podcasts(&config(), Some(selection), false).unwrap();
        App::new(engine, podcasts)
    }

    #[test]
    fn select_trims_comma_separated_ids() {
        let podcasts = select_podcasts(&config(), Some(" music , history"), false).unwrap();
        let ids: Vec<_> = podcasts.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["history", "music"]);
    }

    #[test]
    fn select_all() {
        let podcasts = select_podcasts(&config(), None, true).unwrap();
        assert_eq!(podcasts.len(), 2);
    }

    #[test]
    fn explicit_selection_wins_over_all() {
        let podcasts = select_podcasts(&config(), Some("music"), true).unwrap();
        assert_eq!(podcasts.len(), 1);
        assert_eq!(podcasts[0].0, "music");
    }

    #[test]
    fn select_rejects_unknown_podcast() {
        let result = select_podcasts(&config(), Some("history,nope"), false);
        assert!(matches!(result, Err(ConfigError::UnknownPodcast(id)) if id == "nope"));
    }

    #[test]
    fn select_requires_a_podcast() {
        assert!(matches!(
            select_podcasts(&config(), None, false),
            Err(ConfigError::NoPodcastsSelected)
        ));
        assert!(matches!(
            select_podcasts(&config(), Some(" , "), false),
            Err(ConfigError::NoPodcastsSelected)
        ));
    }

    #[tokio::test]
    async fn scan_and_upload_cover_every_podcast() {
        let dir = tempdir().unwrap();
        write_file(dir.path(), "history", "ep1.mp3", 10);
        write_file(dir.path(), "history", "ep2.mp3", 10);
        write_file(dir.path(), "music", "song.mp3", 10);

        let objects = Arc::new(MemoryObjectStore::new());
        let app = app(dir.path(), objects.clone(), "history,music");

        let plan = RunPlan {
            scan: true,
            upload: true,
            ..Default::default()
        };
        let report = app.run(&plan).await.unwrap();

        assert_eq!(report.discovered, 3);
        assert_eq!(report.uploaded, 3);
        assert_eq!(report.deleted, 0);
        assert!(!report.has_failures());
        assert!(report.session.is_some());

        let feeds: Vec<_> = report.feeds.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(feeds, vec!["history", "music"]);
        assert!(objects.contains(&format!("history/{}", feed_filename("history"))));
        assert!(objects.contains(&format!("music/{}", feed_filename("music"))));
    }

    #[tokio::test]
    async fn second_upload_deletes_previous_batch() {
        let dir = tempdir().unwrap();
        write_file(dir.path(), "history", "ep1.mp3", 10);

        let objects = Arc::new(MemoryObjectStore::new());
        let app = app(dir.path(), objects.clone(), "history");
        let plan = RunPlan {
            scan: true,
            upload: true,
            ..Default::default()
        };

        app.run(&plan).await.unwrap();

        write_file(dir.path(), "history", "ep2.mp3", 10);
        let report = app.run(&plan).await.unwrap();

        assert_eq!(report.deleted, 1);
        assert_eq!(report.uploaded, 1);
        assert!(!objects.contains("history/ep1.mp3"));
        assert!(objects.contains("history/ep2.mp3"));

        // Undo the delete
        let report = app
            .run(&RunPlan {
                rollback: true,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(report.restored, 1);

        let episode = app
            .engine
            .store()
            .find_by_filename("history", "ep1.mp3")
            .unwrap()
            .unwrap();
        assert_eq!(episode.status, Status::New);
    }

    #[tokio::test]
    async fn upload_failures_are_reported_not_fatal() {
        let dir = tempdir().unwrap();
        write_file(dir.path(), "history", "ep1.mp3", 10);
        write_file(dir.path(), "music", "song.mp3", 10);

        let objects = Arc::new(MemoryObjectStore::new());
        objects.fail_on("history/ep1.mp3");
        let app = app(dir.path(), objects.clone(), "history,music");

        let report = app
            .run(&RunPlan {
                scan: true,
                upload: true,
                ..Default::default()
            })
            .await
            .unwrap();

        assert!(report.has_failures());
        assert_eq!(report.uploaded, 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].podcast_id, "history");
        assert_eq!(report.failures[0].filename.as_deref(), Some("ep1.mp3"));
        assert_eq!(report.feeds.len(), 2);
    }

    #[tokio::test]
    async fn missing_folder_fails_only_that_podcast() {
        let dir = tempdir().unwrap();
        write_file(dir.path(), "music", "song.mp3", 10);

        let app = app(dir.path(), Arc::new(MemoryObjectStore::new()), "history,music");
        let report = app
            .run(&RunPlan {
                scan: true,
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(report.discovered, 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].podcast_id, "history");
    }

    #[tokio::test]
    async fn feed_uses_uploaded_image() {
        let dir = tempdir().unwrap();
        write_file(dir.path(), "history", "podcast.png", 4);

        let objects = Arc::new(MemoryObjectStore::new());
        let app = app(dir.path(), objects.clone(), "history");

        let report = app
            .run(&RunPlan {
                image: true,
                feed: true,
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(report.images, 1);
        let feed = std::fs::read_to_string(
            dir.path().join("history").join(feed_filename("history")),
        )
        .unwrap();
        assert!(feed.contains(&objects.location_of("history/podcast.png")));
    }

    #[tokio::test]
    async fn rollback_session_applies_to_selected_podcasts() {
        let dir = tempdir().unwrap();
        write_file(dir.path(), "history", "ep1.mp3", 10);

        let objects = Arc::new(MemoryObjectStore::new());
        let app = app(dir.path(), objects.clone(), "history");
        let report = app
            .run(&RunPlan {
                scan: true,
                upload: true,
                ..Default::default()
            })
            .await
            .unwrap();
        let session = report.session.unwrap();

        let report = app
            .run(&RunPlan {
                rollback_session: Some(session),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(report.restored, 1);
        assert!(report.feeds.is_empty());
    }
}
