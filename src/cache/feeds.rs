// SPDX-License-Identifier: MPL-2.0

use crate::cache::eviction::{self, EvictionReport, Scope};
use crate::cache::schema::NOTES_TABLE;
use crate::cache::{CacheDb, CacheError};
use crate::nostr::Note;
use rusqlite::{OptionalExtension, params};
use std::collections::HashSet;

/// A note as it sits in a feed partition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredNote {
    pub id: String,
    pub content: String,
    pub pubkey: String,
    /// Unix seconds
    pub created_at: i64,
    pub tags: Vec<Vec<String>>,
    pub sig: String,
    /// Unix millis; eviction order only
    pub cached_at: i64,
}

impl From<StoredNote> for Note {
    fn from(stored: StoredNote) -> Self {
        Note {
            id: stored.id,
            pubkey: stored.pubkey,
            created_at: stored.created_at,
            content: stored.content,
            tags: stored.tags,
            sig: stored.sig,
        }
    }
}

/// Bookkeeping for one feed partition
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedState {
    /// When the partition was first registered
    pub created_at: Option<i64>,
    /// When a forward sync last completed
    pub last_refresh_at: Option<i64>,
}

/// Cache operations for per-user note feeds
pub struct FeedCache<'a> {
    db: &'a CacheDb,
}

impl<'a> FeedCache<'a> {
    pub fn new(db: &'a CacheDb) -> Self {
        Self { db }
    }

    /// Store notes not already in the partition. Notes already present keep
    /// their original `cached_at`. The batch commits as a whole or not at all.
    /// Returns how many notes were new.
    pub fn add_notes(&self, user_key: &str, notes: &[Note]) -> Result<usize, CacheError> {
        if user_key.is_empty() {
            return Err(CacheError::invalid("user key is required"));
        }
        if notes.iter().any(|note| note.id.is_empty()) {
            return Err(CacheError::invalid("every note needs an id"));
        }
        if notes.is_empty() {
            return Ok(0);
        }

        self.db.create_partition(user_key)?;

        let policy = self.db.settings().notes;
        let now = self.db.now();
        let mut conn = self.db.conn();
        let tx = conn.transaction()?;
        let mut added = 0;

        {
            let mut stmt = tx.prepare_cached(
                r#"
                INSERT INTO notes (
                    owner_key, id, pubkey, content, created_at, tags_json, sig, cached_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                ON CONFLICT(owner_key, id) DO NOTHING
                "#,
            )?;

            for note in notes {
                let tags_json = serde_json::to_string(&note.tags)?;
                added += stmt.execute(params![
                    user_key,
                    note.id,
                    note.pubkey,
                    note.content,
                    note.created_at,
                    tags_json,
                    note.sig,
                    now,
                ])?;
            }
        }

        tx.commit()?;
        tracing::debug!(partition = user_key, offered = notes.len(), added, "stored notes");

        eviction::after_write(
            &mut conn,
            Scope::partition(NOTES_TABLE, user_key),
            &policy,
            now,
        );

        Ok(added)
    }

    /// Newest-first page of notes. With `before`, only notes strictly older
    /// than that `created_at` are returned; callers pass the timestamp of the
    /// oldest note they already hold.
    pub fn get_notes(
        &self,
        user_key: &str,
        limit: usize,
        before: Option<i64>,
    ) -> Result<Vec<StoredNote>, CacheError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let conn = self.db.conn();

        let mut stmt = conn.prepare_cached(
            r#"
            SELECT id, content, pubkey, created_at, tags_json, sig, cached_at
            FROM notes
            WHERE owner_key = ?1 AND created_at < ?2
            ORDER BY created_at DESC, id ASC
            "#,
        )?;

        let mut rows = stmt.query(params![user_key, before.unwrap_or(i64::MAX)])?;
        let mut seen = HashSet::new();
        let mut notes = Vec::new();

        while let Some(row) = rows.next()? {
            let note = Self::row_to_note(row)?;
            if seen.insert(note.id.clone()) {
                notes.push(note);
                if notes.len() >= limit {
                    break;
                }
            }
        }

        Ok(notes)
    }

    /// `created_at` of the newest note in the partition
    pub fn get_latest_timestamp(&self, user_key: &str) -> Result<Option<i64>, CacheError> {
        self.edge_timestamp(user_key, "DESC")
    }

    /// `created_at` of the oldest note in the partition
    pub fn get_oldest_timestamp(&self, user_key: &str) -> Result<Option<i64>, CacheError> {
        self.edge_timestamp(user_key, "ASC")
    }

    fn edge_timestamp(&self, user_key: &str, order: &str) -> Result<Option<i64>, CacheError> {
        let conn = self.db.conn();

        let timestamp = conn
            .query_row(
                &format!(
                    "SELECT created_at FROM notes WHERE owner_key = ? ORDER BY created_at {order} LIMIT 1"
                ),
                [user_key],
                |row| row.get(0),
            )
            .optional()?;

        Ok(timestamp)
    }

    /// Get count of cached notes in a partition
    pub fn count(&self, user_key: &str) -> Result<usize, CacheError> {
        let conn = self.db.conn();
        eviction::count(&conn, Scope::partition(NOTES_TABLE, user_key))
    }

    /// Get partition bookkeeping; default if the partition does not exist
    pub fn state(&self, user_key: &str) -> Result<FeedState, CacheError> {
        let conn = self.db.conn();

        let state = conn
            .query_row(
                "SELECT created_at, last_refresh_at FROM partitions WHERE owner_key = ?",
                [user_key],
                |row| {
                    Ok(FeedState {
                        created_at: row.get(0)?,
                        last_refresh_at: row.get(1)?,
                    })
                },
            )
            .optional()?;

        Ok(state.unwrap_or_default())
    }

    /// Record that a forward sync just completed
    pub fn mark_refreshed(&self, user_key: &str) -> Result<(), CacheError> {
        self.db.create_partition(user_key)?;
        let now = self.db.now();
        let conn = self.db.conn();

        conn.execute(
            "UPDATE partitions SET last_refresh_at = ?1 WHERE owner_key = ?2",
            params![now, user_key],
        )?;

        Ok(())
    }

    /// Check if the feed was refreshed within `max_age_ms`
    pub fn is_fresh(&self, user_key: &str, max_age_ms: i64) -> bool {
        if let Ok(state) = self.state(user_key)
            && let Some(last_refresh) = state.last_refresh_at
        {
            return (self.db.now() - last_refresh) < max_age_ms;
        }
        false
    }

    /// Drop a partition and everything in it
    pub fn clear(&self, user_key: &str) -> Result<(), CacheError> {
        let mut conn = self.db.conn();
        let tx = conn.transaction()?;

        tx.execute("DELETE FROM notes WHERE owner_key = ?", [user_key])?;
        tx.execute("DELETE FROM partitions WHERE owner_key = ?", [user_key])?;

        tx.commit()?;
        Ok(())
    }

    /// Run eviction over one partition
    pub fn cleanup(&self, user_key: &str) -> Result<EvictionReport, CacheError> {
        let policy = self.db.settings().notes;
        let now = self.db.now();
        let mut conn = self.db.conn();
        eviction::evict(
            &mut conn,
            Scope::partition(NOTES_TABLE, user_key),
            &policy,
            now,
        )
    }

    /// Run eviction over every partition
    pub fn cleanup_all(&self) -> Result<EvictionReport, CacheError> {
        let mut report = EvictionReport::default();
        for key in self.db.partitions()? {
            report += self.cleanup(&key)?;
        }
        Ok(report)
    }

    /// Convert a database row to a StoredNote
    fn row_to_note(row: &rusqlite::Row) -> Result<StoredNote, rusqlite::Error> {
        let tags_json: String = row.get(4)?;

        Ok(StoredNote {
            id: row.get(0)?,
            content: row.get(1)?,
            pubkey: row.get(2)?,
            created_at: row.get(3)?,
            tags: serde_json::from_str(&tags_json).unwrap_or_default(),
            sig: row.get(5)?,
            cached_at: row.get(6)?,
        })
    }
}
