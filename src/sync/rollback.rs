// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use tracing::info;

use crate::episode::Status;
use crate::error::SyncError;
use crate::progress::ProgressEvent;

use super::Engine;

/// Outcome of a rollback for one podcast
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RollbackResult {
    /// Session that was rolled back, if the rollback was session-wide
    pub session: Option<String>,
    /// Number of episodes put back to New
    pub restored: usize,
}

impl Engine {
    /// Undo the most recent delete
    ///
    /// When the most recently written Deleted episode carries a session tag
    /// the whole session is rolled back, otherwise only that episode.
    pub fn rollback_last(&self, podcast_id: &str) -> Result<RollbackResult, SyncError> {
        let Some(mut episode) = self
            .store
            .find_most_recent_by_status(podcast_id, Status::Deleted)?
        else {
            info!(podcast = podcast_id, "no deleted episodes to roll back");
            return Ok(self.report_rollback(podcast_id, RollbackResult::default()));
        };

        if let Some(session) = episode.session.clone().filter(|s| !s.is_empty()) {
            return self.rollback_session(podcast_id, &session);
        }

        episode.restore();
        self.store.upsert(podcast_id, &episode)?;
        info!(podcast = podcast_id, filename = %episode.filename, "episode rolled back");

        Ok(self.report_rollback(
            podcast_id,
            RollbackResult {
                session: None,
                restored: 1,
            },
        ))
    }

    /// Put every episode tagged with `session` back to New, whatever its status
    pub fn rollback_session(
        &self,
        podcast_id: &str,
        session: &str,
    ) -> Result<RollbackResult, SyncError> {
        let episodes = self.store.find_by_session(podcast_id, session)?;

        let mut restored = 0;
        for mut episode in episodes {
            episode.restore();
            self.store.upsert(podcast_id, &episode)?;
            restored += 1;
        }

        info!(podcast = podcast_id, session, restored, "session rolled back");

        Ok(self.report_rollback(
            podcast_id,
            RollbackResult {
                session: Some(session.to_string()),
                restored,
            },
        ))
    }

    fn report_rollback(&self, podcast_id: &str, result: RollbackResult) -> RollbackResult {
        self.reporter.report(ProgressEvent::RollbackCompleted {
            podcast_id: podcast_id.to_string(),
            session: result.session.clone(),
            restored: result.restored,
        });
        result
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;

    use super::super::testing::*;
    use super::*;
    use crate::episode::Episode;
    use crate::object_store::MemoryObjectStore;
    use crate::session::Session;
    use tempfile::tempdir;

    fn seed(engine: &Engine, filename: &str, status: Status, session: Option<&str>) {
        let mut episode = Episode::new(filename, 10, Utc::now());
        episode.status = status;
        episode.session = session.map(String::from);
        if status != Status::New {
            episode.location = Some(format!("memory://bucket/history/{}", filename));
        }
        engine.store().upsert("history", &episode).unwrap();
    }

    fn status_of(engine: &Engine, filename: &str) -> Status {
        engine
            .store()
            .find_by_filename("history", filename)
            .unwrap()
            .unwrap()
            .status
    }

    #[test]
    fn session_rollback_restores_exactly_the_tagged_set() {
        let dir = tempdir().unwrap();
        let engine = engine(dir.path(), Arc::new(MemoryObjectStore::new()));

        seed(&engine, "a.mp3", Status::Uploaded, Some("s1"));
        seed(&engine, "b.mp3", Status::Deleted, Some("s1"));
        seed(&engine, "c.mp3", Status::Uploaded, Some("s2"));

        let result = engine.rollback_session("history", "s1").unwrap();

        assert_eq!(result.restored, 2);
        assert_eq!(status_of(&engine, "a.mp3"), Status::New);
        assert_eq!(status_of(&engine, "b.mp3"), Status::New);
        assert_eq!(status_of(&engine, "c.mp3"), Status::Uploaded);

        let restored = engine
            .store()
            .find_by_filename("history", "b.mp3")
            .unwrap()
            .unwrap();
        assert!(restored.location.is_some());
    }

    #[tokio::test]
    async fn upload_session_restores_its_deleted_episodes() {
        let dir = tempdir().unwrap();
        write_file(dir.path(), "history", "a.mp3", 10);
        write_file(dir.path(), "history", "b.mp3", 10);
        let engine = engine(dir.path(), Arc::new(MemoryObjectStore::new()));
        let podcast = podcast("history");

        engine.update("history", &podcast).unwrap();
        engine
            .upload_new_episodes("history", &podcast, &Session::from("S"))
            .await
            .unwrap();
        let deleted = engine
            .delete_old_episodes("history", &podcast)
            .await
            .unwrap();
        assert_eq!(deleted.deleted, 2);
        seed(&engine, "c.mp3", Status::Deleted, Some("T"));

        let result = engine.rollback_session("history", "S").unwrap();

        assert_eq!(result.restored, 2);
        assert_eq!(status_of(&engine, "a.mp3"), Status::New);
        assert_eq!(status_of(&engine, "b.mp3"), Status::New);
        assert_eq!(status_of(&engine, "c.mp3"), Status::Deleted);
    }

    #[test]
    fn unknown_session_is_a_noop() {
        let dir = tempdir().unwrap();
        let engine = engine(dir.path(), Arc::new(MemoryObjectStore::new()));
        seed(&engine, "a.mp3", Status::Uploaded, Some("s1"));

        let result = engine.rollback_session("history", "nope").unwrap();

        assert_eq!(result.restored, 0);
        assert_eq!(status_of(&engine, "a.mp3"), Status::Uploaded);
    }

    #[test]
    fn rollback_last_delegates_to_session() {
        let dir = tempdir().unwrap();
        let engine = engine(dir.path(), Arc::new(MemoryObjectStore::new()));

        seed(&engine, "old.mp3", Status::Deleted, Some("s0"));
        seed(&engine, "a.mp3", Status::Deleted, Some("s1"));
        seed(&engine, "b.mp3", Status::Deleted, Some("s1"));

        let result = engine.rollback_last("history").unwrap();

        assert_eq!(result.session.as_deref(), Some("s1"));
        assert_eq!(result.restored, 2);
        assert_eq!(status_of(&engine, "a.mp3"), Status::New);
        assert_eq!(status_of(&engine, "b.mp3"), Status::New);
        assert_eq!(status_of(&engine, "old.mp3"), Status::Deleted);
    }

    #[test]
    fn rollback_last_without_session_restores_one_episode() {
        let dir = tempdir().unwrap();
        let engine = engine(dir.path(), Arc::new(MemoryObjectStore::new()));

        seed(&engine, "a.mp3", Status::Deleted, None);
        seed(&engine, "b.mp3", Status::Deleted, None);

        let result = engine.rollback_last("history").unwrap();

        assert_eq!(result.session, None);
        assert_eq!(result.restored, 1);
        assert_eq!(status_of(&engine, "a.mp3"), Status::Deleted);
        assert_eq!(status_of(&engine, "b.mp3"), Status::New);
    }

    #[test]
    fn rollback_last_with_nothing_deleted() {
        let dir = tempdir().unwrap();
        let engine = engine(dir.path(), Arc::new(MemoryObjectStore::new()));
        seed(&engine, "a.mp3", Status::Uploaded, Some("s1"));

        let result = engine.rollback_last("history").unwrap();

        assert_eq!(result, RollbackResult::default());
        assert_eq!(status_of(&engine, "a.mp3"), Status::Uploaded);
    }
}
