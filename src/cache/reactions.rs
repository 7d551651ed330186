// SPDX-License-Identifier: MPL-2.0

use crate::cache::eviction::{self, EvictionReport, Scope};
use crate::cache::schema::REACTIONS_TABLE;
use crate::cache::{CacheDb, CacheError};
use crate::nostr::{KIND_REACTION, KIND_REPOST};
use rusqlite::{OptionalExtension, params};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReactionType {
    Like,
    Repost,
}

impl ReactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReactionType::Like => "like",
            ReactionType::Repost => "repost",
        }
    }

    /// Event kind that carries this reaction on the wire
    pub fn event_kind(&self) -> u16 {
        match self {
            ReactionType::Like => KIND_REACTION,
            ReactionType::Repost => KIND_REPOST,
        }
    }
}

impl fmt::Display for ReactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReactionType {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "like" => Ok(ReactionType::Like),
            "repost" => Ok(ReactionType::Repost),
            other => Err(CacheError::InvalidInput(format!(
                "unknown reaction type: {other}"
            ))),
        }
    }
}

/// A reaction as written to the cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reaction {
    pub note_id: String,
    pub pubkey: String,
    pub kind: ReactionType,
    /// Unix seconds
    pub created_at: i64,
}

impl Reaction {
    pub fn new(note_id: &str, pubkey: &str, kind: ReactionType, created_at: i64) -> Self {
        Self {
            note_id: note_id.to_string(),
            pubkey: pubkey.to_string(),
            kind,
            created_at,
        }
    }

    /// One reaction per (pubkey, note, type)
    pub fn key(&self) -> String {
        reaction_key(&self.note_id, &self.pubkey, self.kind)
    }
}

fn reaction_key(note_id: &str, pubkey: &str, kind: ReactionType) -> String {
    format!("{pubkey}:{note_id}:{kind}")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredReaction {
    pub id: String,
    pub note_id: String,
    pub pubkey: String,
    pub kind: ReactionType,
    pub created_at: i64,
    pub cached_at: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReactionCounts {
    pub like: usize,
    pub repost: usize,
}

impl ReactionCounts {
    pub fn get(&self, kind: ReactionType) -> usize {
        match kind {
            ReactionType::Like => self.like,
            ReactionType::Repost => self.repost,
        }
    }
}

/// Cache operations for likes and reposts
pub struct ReactionCache<'a> {
    db: &'a CacheDb,
}

impl<'a> ReactionCache<'a> {
    pub fn new(db: &'a CacheDb) -> Self {
        Self { db }
    }

    /// Store a reaction. Returns false when it was already cached, in which
    /// case only `cached_at` moves.
    pub fn add_reaction(&self, reaction: &Reaction) -> Result<bool, CacheError> {
        if reaction.note_id.is_empty() {
            return Err(CacheError::invalid("reaction must reference a note"));
        }
        if reaction.pubkey.is_empty() {
            return Err(CacheError::invalid("reaction must have a pubkey"));
        }

        let id = reaction.key();
        let policy = self.db.settings().reactions;
        let now = self.db.now();
        let mut conn = self.db.conn();

        let refreshed = conn.execute(
            "UPDATE reactions SET cached_at = ?1 WHERE id = ?2",
            params![now, id],
        )?;

        if refreshed > 0 {
            return Ok(false);
        }

        conn.execute(
            r#"
            INSERT INTO reactions (id, note_id, pubkey, kind, created_at, cached_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                id,
                reaction.note_id,
                reaction.pubkey,
                reaction.kind.as_str(),
                reaction.created_at,
                now
            ],
        )?;

        eviction::after_write(&mut conn, Scope::table(REACTIONS_TABLE), &policy, now);
        Ok(true)
    }

    /// Reactions on a note, newest first, optionally of one type
    pub fn get_reactions_for_note(
        &self,
        note_id: &str,
        kind: Option<ReactionType>,
    ) -> Result<Vec<StoredReaction>, CacheError> {
        let conn = self.db.conn();
        let mut reactions = Vec::new();

        let mut stmt = conn.prepare_cached(
            r#"
            SELECT id, note_id, pubkey, kind, created_at, cached_at
            FROM reactions
            WHERE note_id = ?1 AND (?2 IS NULL OR kind = ?2)
            ORDER BY created_at DESC, id ASC
            "#,
        )?;

        let mut rows = stmt.query(params![note_id, kind.map(|k| k.as_str())])?;
        while let Some(row) = rows.next()? {
            let kind: String = row.get(3)?;
            // Rows of a type this build does not know are skipped
            let Ok(kind) = kind.parse() else {
                continue;
            };
            reactions.push(StoredReaction {
                id: row.get(0)?,
                note_id: row.get(1)?,
                pubkey: row.get(2)?,
                kind,
                created_at: row.get(4)?,
                cached_at: row.get(5)?,
            });
        }

        Ok(reactions)
    }

    pub fn get_reaction_counts_for_note(&self, note_id: &str) -> Result<ReactionCounts, CacheError> {
        let conn = self.db.conn();
        let mut counts = ReactionCounts::default();

        let mut stmt = conn.prepare_cached(
            "SELECT kind, COUNT(*) FROM reactions WHERE note_id = ? GROUP BY kind",
        )?;

        let mut rows = stmt.query([note_id])?;
        while let Some(row) = rows.next()? {
            let kind: String = row.get(0)?;
            let count: i64 = row.get(1)?;
            match kind.parse() {
                Ok(ReactionType::Like) => counts.like = count as usize,
                Ok(ReactionType::Repost) => counts.repost = count as usize,
                Err(_) => {}
            }
        }

        Ok(counts)
    }

    pub fn has_user_reacted(
        &self,
        note_id: &str,
        pubkey: &str,
        kind: ReactionType,
    ) -> Result<bool, CacheError> {
        let conn = self.db.conn();
        let mut stmt = conn.prepare_cached("SELECT 1 FROM reactions WHERE id = ?")?;
        Ok(stmt.exists([reaction_key(note_id, pubkey, kind)])?)
    }

    /// Local-only removal. Returns false if nothing was cached under the key.
    pub fn remove_reaction(
        &self,
        note_id: &str,
        pubkey: &str,
        kind: ReactionType,
    ) -> Result<bool, CacheError> {
        let conn = self.db.conn();
        let removed = conn.execute(
            "DELETE FROM reactions WHERE id = ?",
            [reaction_key(note_id, pubkey, kind)],
        )?;
        Ok(removed > 0)
    }

    /// Newest cached reaction `created_at` on a note, for incremental sync
    pub fn most_recent_reaction_timestamp(
        &self,
        note_id: &str,
        kind: Option<ReactionType>,
    ) -> Result<Option<i64>, CacheError> {
        let conn = self.db.conn();
        let latest: Option<i64> = conn
            .query_row(
                "SELECT MAX(created_at) FROM reactions WHERE note_id = ?1 AND (?2 IS NULL OR kind = ?2)",
                params![note_id, kind.map(|k| k.as_str())],
                |row| row.get(0),
            )
            .optional()?
            .flatten();
        Ok(latest)
    }

    pub fn count(&self) -> Result<usize, CacheError> {
        let conn = self.db.conn();
        eviction::count(&conn, Scope::table(REACTIONS_TABLE))
    }

    pub fn cleanup(&self) -> Result<EvictionReport, CacheError> {
        let policy = self.db.settings().reactions;
        let now = self.db.now();
        let mut conn = self.db.conn();
        eviction::evict(&mut conn, Scope::table(REACTIONS_TABLE), &policy, now)
    }
}
