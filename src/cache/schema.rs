// SPDX-License-Identifier: MPL-2.0

use crate::cache::CacheError;
use rusqlite::{Connection, Transaction};

/// Schema version this build migrates to
pub const SCHEMA_VERSION: i64 = 2;

pub(crate) const NOTES_TABLE: &str = "notes";
pub(crate) const PROFILES_TABLE: &str = "profiles";
pub(crate) const REACTIONS_TABLE: &str = "reactions";

/// Single-partition note table written before notes were keyed by owner
pub(crate) const LEGACY_FEED_TABLE: &str = "feed";
/// Where the legacy table waits until the home feed adopts its rows
pub(crate) const PENDING_LEGACY_TABLE: &str = "legacy_feed";

/// SQL schema for the cache database
const TABLES: &str = r#"
-- partitions: one row per owning feed key
CREATE TABLE IF NOT EXISTS partitions (
    owner_key TEXT PRIMARY KEY,
    created_at INTEGER NOT NULL,
    last_refresh_at INTEGER
);

-- notes: keyed by (owner, id) so each feed is its own partition
CREATE TABLE IF NOT EXISTS notes (
    owner_key TEXT NOT NULL,
    id TEXT NOT NULL,
    pubkey TEXT NOT NULL,
    content TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    tags_json TEXT NOT NULL,
    sig TEXT NOT NULL,
    cached_at INTEGER NOT NULL,
    PRIMARY KEY (owner_key, id)
);

CREATE INDEX IF NOT EXISTS idx_notes_created_at ON notes(owner_key, created_at DESC);
CREATE INDEX IF NOT EXISTS idx_notes_cached_at ON notes(owner_key, cached_at);

-- profiles: pubkey-keyed, full or metadata-only
CREATE TABLE IF NOT EXISTS profiles (
    pubkey TEXT PRIMARY KEY,
    metadata_json TEXT NOT NULL,
    followers_json TEXT NOT NULL,
    following_json TEXT NOT NULL,
    is_full INTEGER NOT NULL DEFAULT 0,
    cached_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_profiles_cached_at ON profiles(cached_at);

-- reactions: id is pubkey:note_id:kind
CREATE TABLE IF NOT EXISTS reactions (
    id TEXT PRIMARY KEY,
    note_id TEXT NOT NULL,
    pubkey TEXT NOT NULL,
    kind TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    cached_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_reactions_note_id ON reactions(note_id);
CREATE INDEX IF NOT EXISTS idx_reactions_kind ON reactions(kind);
CREATE INDEX IF NOT EXISTS idx_reactions_created_at ON reactions(note_id, created_at DESC);
CREATE INDEX IF NOT EXISTS idx_reactions_cached_at ON reactions(cached_at);
"#;

type Migration = fn(&Transaction) -> Result<(), CacheError>;

/// Step `i` upgrades from version `i` to `i + 1`
const MIGRATIONS: &[Migration] = &[create_tables, park_legacy_feed];

fn create_tables(tx: &Transaction) -> Result<(), CacheError> {
    tx.execute_batch(TABLES)?;
    Ok(())
}

/// Move the pre-partition table out of the way. Its rows are adopted by the
/// first partition created afterwards.
fn park_legacy_feed(tx: &Transaction) -> Result<(), CacheError> {
    if has_table(tx, LEGACY_FEED_TABLE)? && !has_table(tx, PENDING_LEGACY_TABLE)? {
        tx.execute_batch(&format!(
            "ALTER TABLE {LEGACY_FEED_TABLE} RENAME TO {PENDING_LEGACY_TABLE}"
        ))?;
        tracing::info!("parked legacy single-partition feed table");
    }
    Ok(())
}

pub(crate) fn has_table(conn: &Connection, name: &str) -> Result<bool, CacheError> {
    let mut stmt =
        conn.prepare_cached("SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?")?;
    Ok(stmt.exists([name])?)
}

pub(crate) fn user_version(conn: &Connection) -> Result<i64, CacheError> {
    Ok(conn.query_row("PRAGMA user_version", [], |row| row.get(0))?)
}

/// Bring the store up to [`SCHEMA_VERSION`] and return the version in effect.
///
/// Each step commits together with its `user_version` bump, so an interrupted
/// upgrade resumes from the last finished step. A store written by a newer
/// build is left untouched and its version adopted.
pub(crate) fn migrate(conn: &mut Connection) -> Result<i64, CacheError> {
    let current = user_version(conn)?;

    if current > SCHEMA_VERSION {
        tracing::warn!(
            found = current,
            known = SCHEMA_VERSION,
            "cache store is newer than this build, opening without migrating"
        );
        return Ok(current);
    }

    for (step, migration) in MIGRATIONS.iter().enumerate().skip(current as usize) {
        let target = step as i64 + 1;
        let tx = conn.transaction()?;
        migration(&tx)?;
        tx.pragma_update(None, "user_version", target)?;
        tx.commit()?;
        tracing::info!(version = target, "migrated cache schema");
    }

    Ok(SCHEMA_VERSION)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_store_reaches_current_version() {
        let mut conn = Connection::open_in_memory().unwrap();
        assert_eq!(migrate(&mut conn).unwrap(), SCHEMA_VERSION);
        assert_eq!(user_version(&conn).unwrap(), SCHEMA_VERSION);

        for table in [NOTES_TABLE, PROFILES_TABLE, REACTIONS_TABLE, "partitions"] {
            assert!(has_table(&conn, table).unwrap(), "missing {table}");
        }
    }

    #[test]
    fn test_migrate_is_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();
        conn.execute(
            "INSERT INTO partitions (owner_key, created_at) VALUES ('u1', 1)",
            [],
        )
        .unwrap();

        assert_eq!(migrate(&mut conn).unwrap(), SCHEMA_VERSION);
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM partitions", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_resumes_from_partial_upgrade() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(TABLES).unwrap();
        conn.pragma_update(None, "user_version", 1).unwrap();
        conn.execute_batch(
            "CREATE TABLE feed (id TEXT PRIMARY KEY, content TEXT, pubkey TEXT,
             created_at INTEGER, tags TEXT, sig TEXT, cached_at INTEGER)",
        )
        .unwrap();

        assert_eq!(migrate(&mut conn).unwrap(), SCHEMA_VERSION);
        assert!(!has_table(&conn, LEGACY_FEED_TABLE).unwrap());
        assert!(has_table(&conn, PENDING_LEGACY_TABLE).unwrap());
    }

    #[test]
    fn test_newer_version_is_adopted() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.pragma_update(None, "user_version", 7).unwrap();

        assert_eq!(migrate(&mut conn).unwrap(), 7);
        assert_eq!(user_version(&conn).unwrap(), 7);
        assert!(!has_table(&conn, NOTES_TABLE).unwrap());
    }
}
