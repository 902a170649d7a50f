// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Durable episode records, partitioned by podcast id.
//!
//! Every write stamps the record with a store-wide sequence number and all
//! scans return records in ascending sequence order. "Most recent" therefore
//! means "most recently written", not "most recently discovered".

mod migration;

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{Connection, OptionalExtension, params};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::episode::{Episode, Status};
use crate::error::StoreError;

/// Derive the storage key of an episode from its filename
pub fn record_key(filename: &str) -> String {
    format!("{:x}", Sha256::digest(filename.as_bytes()))
}

/// SQLite backed record store.
///
/// A single connection behind a mutex serializes all writers.
pub struct RecordStore {
    conn: Mutex<Connection>,
}

impl RecordStore {
    /// Open (or create) the database file, creating parent directories as needed
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::CreateDirectoryFailed {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        debug!(path = %path.display(), "record store opened");

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open a throwaway in-memory store
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn with_conn<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> Result<T, StoreError>,
    {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        f(&conn)
    }

    /// Insert or overwrite the record for `episode.filename`
    pub fn upsert(&self, podcast_id: &str, episode: &Episode) -> Result<(), StoreError> {
        let record = serde_json::to_string(episode)?;
        let key = record_key(&episode.filename);

        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO episodes
                    (podcast_id, record_key, filename, status, session, size, seq, record)
                 VALUES
                    (?1, ?2, ?3, ?4, ?5, ?6, (SELECT COALESCE(MAX(seq), 0) + 1 FROM episodes), ?7)
                 ON CONFLICT (podcast_id, record_key) DO UPDATE SET
                    filename = excluded.filename,
                    status = excluded.status,
                    session = excluded.session,
                    size = excluded.size,
                    seq = excluded.seq,
                    record = excluded.record",
                params![
                    podcast_id,
                    key,
                    episode.filename,
                    episode.status.as_str(),
                    episode.session,
                    episode.size as i64,
                    record,
                ],
            )?;
            Ok(())
        })?;

        debug!(
            podcast = podcast_id,
            filename = %episode.filename,
            status = %episode.status,
            "episode saved"
        );
        Ok(())
    }

    /// Point lookup by filename; a miss is `Ok(None)`
    pub fn find_by_filename(
        &self,
        podcast_id: &str,
        filename: &str,
    ) -> Result<Option<Episode>, StoreError> {
        let key = record_key(filename);

        let record: Option<String> = self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT record FROM episodes WHERE podcast_id = ?1 AND record_key = ?2",
                    params![podcast_id, key],
                    |row| row.get(0),
                )
                .optional()?)
        })?;

        Ok(record.and_then(|json| decode_record(podcast_id, &key, &json)))
    }

    /// All episodes with the given status, in scan order
    pub fn find_by_status(
        &self,
        podcast_id: &str,
        status: Status,
    ) -> Result<Vec<Episode>, StoreError> {
        self.scan(
            podcast_id,
            "SELECT record_key, record FROM episodes
             WHERE podcast_id = ?1 AND status = ?2 ORDER BY seq ASC",
            status.as_str(),
        )
    }

    /// All episodes tagged with the given session, in scan order
    pub fn find_by_session(
        &self,
        podcast_id: &str,
        session: &str,
    ) -> Result<Vec<Episode>, StoreError> {
        self.scan(
            podcast_id,
            "SELECT record_key, record FROM episodes
             WHERE podcast_id = ?1 AND session = ?2 ORDER BY seq ASC",
            session,
        )
    }

    /// The last episode with the given status in scan order
    pub fn find_most_recent_by_status(
        &self,
        podcast_id: &str,
        status: Status,
    ) -> Result<Option<Episode>, StoreError> {
        let episodes = self.scan(
            podcast_id,
            "SELECT record_key, record FROM episodes
             WHERE podcast_id = ?1 AND status = ?2 ORDER BY seq DESC LIMIT 1",
            status.as_str(),
        )?;

        Ok(episodes.into_iter().next())
    }

    /// Prefix of `find_by_status` whose total size stays below `budget`
    ///
    /// Selection stops before the first episode that would make the running
    /// total reach or exceed the budget. A budget of zero or less means no limit.
    pub fn select_by_size_budget(
        &self,
        podcast_id: &str,
        status: Status,
        budget: i64,
    ) -> Result<Vec<Episode>, StoreError> {
        let episodes = self.find_by_status(podcast_id, status)?;

        if budget <= 0 {
            return Ok(episodes);
        }

        let budget = budget as u64;
        let mut total: u64 = 0;
        let mut selected = Vec::new();

        for episode in episodes {
            let next_total = total.saturating_add(episode.size);
            if next_total >= budget {
                break;
            }
            total = next_total;
            selected.push(episode);
        }

        Ok(selected)
    }

    fn scan(&self, podcast_id: &str, sql: &str, filter: &str) -> Result<Vec<Episode>, StoreError> {
        let rows: Vec<(String, String)> = self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(sql)?;
            let rows = stmt
                .query_map(params![podcast_id, filter], |row| {
                    Ok((row.get(0)?, row.get(1)?))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;

        Ok(rows
            .iter()
            .filter_map(|(key, json)| decode_record(podcast_id, key, json))
            .collect())
    }
}

/// Decode a stored record; malformed records are logged and skipped
fn decode_record(podcast_id: &str, key: &str, json: &str) -> Option<Episode> {
    match serde_json::from_str(json) {
        Ok(episode) => Some(episode),
        Err(e) => {
            warn!(podcast = podcast_id, key, error = %e, "skipping malformed episode record");
            None
        }
    }
}
