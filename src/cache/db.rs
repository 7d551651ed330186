// SPDX-License-Identifier: MPL-2.0

use crate::cache::eviction::EvictionReport;
use crate::cache::schema::{self, NOTES_TABLE, PENDING_LEGACY_TABLE};
use crate::cache::{CacheError, Clock, FeedCache, ProfileCache, ReactionCache, SystemClock};
use crate::config::{APP_NAME, CACHE_FILE};
use crate::settings::CacheSettings;
use rusqlite::{Connection, params};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Handle to the cache database
#[derive(Clone)]
pub struct CacheDb {
    conn: Arc<Mutex<Connection>>,
    clock: Arc<dyn Clock>,
    settings: Arc<CacheSettings>,
    version: i64,
}

impl CacheDb {
    /// Open or create the cache database
    /// Path: ~/.local/share/perch/cache.db
    pub fn open() -> Result<Self, CacheError> {
        let path = Self::cache_path()?;
        Self::open_at(&path)
    }

    /// Open or create a cache database at an explicit path
    pub fn open_at(path: &Path) -> Result<Self, CacheError> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| CacheError::Path(format!("failed to create cache dir: {}", e)))?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        Self::from_connection(conn)
    }

    /// Throwaway store, mostly for tests
    pub fn open_in_memory() -> Result<Self, CacheError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(mut conn: Connection) -> Result<Self, CacheError> {
        let version = schema::migrate(&mut conn)?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
            clock: Arc::new(SystemClock),
            settings: Arc::new(CacheSettings::default()),
            version,
        };

        // Expired records go on every open
        if let Err(e) = db.cleanup_stale() {
            tracing::warn!("cache cleanup on open failed: {}", e);
        }

        Ok(db)
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_settings(mut self, settings: CacheSettings) -> Self {
        self.settings = Arc::new(settings);
        self
    }

    /// Get XDG data directory for cache
    fn cache_path() -> Result<PathBuf, CacheError> {
        let data_dir = dirs::data_dir()
            .ok_or_else(|| CacheError::Path("could not find data directory".to_string()))?;

        Ok(data_dir.join(APP_NAME).join(CACHE_FILE))
    }

    /// Schema version in effect. Higher than [`schema::SCHEMA_VERSION`] when
    /// a newer build wrote the store.
    pub fn version(&self) -> i64 {
        self.version
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    /// Access connection for operations
    pub fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current time in unix milliseconds
    pub fn now(&self) -> i64 {
        self.clock.now_millis()
    }

    /// Register a partition. Returns true if it did not exist before.
    pub fn create_partition(&self, key: &str) -> Result<bool, CacheError> {
        if key.is_empty() {
            return Err(CacheError::invalid("partition key is required"));
        }

        let now = self.now();
        let conn = self.conn();
        let created = Self::register_partition(&conn, key, now)?;

        if created {
            tracing::debug!(partition = key, "created partition");
        }
        Ok(created)
    }

    /// Move notes from the pre-partition feed table into `key` and drop that
    /// table. Only the home feed owned those notes, so only the home feed's
    /// partition should call this. Returns how many notes were adopted; zero
    /// once the table is gone.
    pub fn adopt_legacy_feed(&self, key: &str) -> Result<usize, CacheError> {
        if key.is_empty() {
            return Err(CacheError::invalid("partition key is required"));
        }

        let now = self.now();
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        if !schema::has_table(&tx, PENDING_LEGACY_TABLE)? {
            return Ok(0);
        }

        Self::register_partition(&tx, key, now)?;
        let adopted = tx.execute(
            &format!(
                r#"
                INSERT OR IGNORE INTO {NOTES_TABLE} (
                    owner_key, id, pubkey, content, created_at, tags_json, sig, cached_at
                )
                SELECT ?1, id, COALESCE(pubkey, ''), COALESCE(content, ''), created_at,
                       COALESCE(tags, '[]'), COALESCE(sig, ''), COALESCE(cached_at, ?2)
                FROM {PENDING_LEGACY_TABLE}
                WHERE id IS NOT NULL AND created_at IS NOT NULL
                "#
            ),
            params![key, now],
        )?;
        tx.execute_batch(&format!("DROP TABLE {PENDING_LEGACY_TABLE}"))?;
        tx.commit()?;

        tracing::info!(partition = key, adopted, "migrated legacy feed into partition");
        Ok(adopted)
    }

    fn register_partition(conn: &Connection, key: &str, now: i64) -> Result<bool, CacheError> {
        let inserted = conn.execute(
            "INSERT INTO partitions (owner_key, created_at) VALUES (?1, ?2)
             ON CONFLICT(owner_key) DO NOTHING",
            params![key, now],
        )?;
        Ok(inserted > 0)
    }

    /// Keys of every registered partition
    pub fn partitions(&self) -> Result<Vec<String>, CacheError> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT owner_key FROM partitions ORDER BY owner_key")?;
        let keys = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(keys)
    }

    /// Run eviction over every cache concern and note partition
    pub fn cleanup_stale(&self) -> Result<EvictionReport, CacheError> {
        let mut report = FeedCache::new(self).cleanup_all()?;
        report += ProfileCache::new(self).cleanup()?;
        report += ReactionCache::new(self).cleanup()?;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::schema::SCHEMA_VERSION;
    use crate::nostr::Note;
    use tempfile::tempdir;

    fn ids(notes: &[crate::cache::StoredNote]) -> Vec<&str> {
        notes.iter().map(|n| n.id.as_str()).collect()
    }

    fn note(id: &str, created_at: i64) -> Note {
        Note {
            id: id.to_string(),
            pubkey: "author".to_string(),
            created_at,
            content: format!("note {id}"),
            tags: vec![],
            sig: "sig".to_string(),
        }
    }

    #[test]
    fn test_open_creates_file_and_reopens() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("cache.db");

        let db = CacheDb::open_at(&path).unwrap();
        assert_eq!(db.version(), SCHEMA_VERSION);
        FeedCache::new(&db).add_notes("u1", &[note("a", 100)]).unwrap();
        drop(db);

        let db = CacheDb::open_at(&path).unwrap();
        assert_eq!(db.version(), SCHEMA_VERSION);
        assert_eq!(FeedCache::new(&db).count("u1").unwrap(), 1);
    }

    #[test]
    fn test_version_skew_is_adopted_without_data_loss() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.db");

        let db = CacheDb::open_at(&path).unwrap();
        FeedCache::new(&db).add_notes("u1", &[note("a", 100)]).unwrap();
        drop(db);

        let raw = Connection::open(&path).unwrap();
        raw.pragma_update(None, "user_version", SCHEMA_VERSION + 3).unwrap();
        drop(raw);

        let db = CacheDb::open_at(&path).unwrap();
        assert_eq!(db.version(), SCHEMA_VERSION + 3);
        assert_eq!(FeedCache::new(&db).count("u1").unwrap(), 1);
    }

    #[test]
    fn test_create_partition_is_idempotent() {
        let db = CacheDb::open_in_memory().unwrap();

        assert!(db.create_partition("u1").unwrap());
        assert!(!db.create_partition("u1").unwrap());
        assert!(db.create_partition("u2").unwrap());
        assert_eq!(db.partitions().unwrap(), vec!["u1", "u2"]);
    }

    #[test]
    fn test_create_partition_rejects_empty_key() {
        let db = CacheDb::open_in_memory().unwrap();
        assert!(matches!(
            db.create_partition(""),
            Err(CacheError::InvalidInput(_))
        ));
    }

    fn store_with_legacy_feed(path: &Path) {
        let raw = Connection::open(path).unwrap();
        raw.execute_batch(
            r#"
            CREATE TABLE feed (
                id TEXT PRIMARY KEY, content TEXT, pubkey TEXT,
                created_at INTEGER, tags TEXT, sig TEXT, cached_at INTEGER
            );
            INSERT INTO feed VALUES ('old-1', 'hello', 'pk', 100, '[["t","nostr"]]', 's', NULL);
            INSERT INTO feed VALUES ('old-2', 'world', 'pk', 200, NULL, NULL, NULL);
            "#,
        )
        .unwrap();
    }

    #[test]
    fn test_legacy_feed_is_adopted_once() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.db");
        store_with_legacy_feed(&path);

        let db = CacheDb::open_at(&path).unwrap();
        assert_eq!(db.adopt_legacy_feed("following:me").unwrap(), 2);
        assert_eq!(db.adopt_legacy_feed("following:other").unwrap(), 0);

        let feeds = FeedCache::new(&db);
        let adopted = feeds.get_notes("following:me", 10, None).unwrap();
        assert_eq!(ids(&adopted), vec!["old-2", "old-1"]);
        assert_eq!(adopted[1].tags, vec![vec!["t".to_string(), "nostr".to_string()]]);
        assert_eq!(adopted[0].sig, "");
        assert_eq!(feeds.count("following:other").unwrap(), 0);
        assert_eq!(db.partitions().unwrap(), vec!["following:me"]);

        let conn = db.conn();
        assert!(!schema::has_table(&conn, PENDING_LEGACY_TABLE).unwrap());
        assert!(!schema::has_table(&conn, "feed").unwrap());
    }

    #[test]
    fn test_other_partitions_leave_legacy_feed_alone() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.db");
        store_with_legacy_feed(&path);

        let db = CacheDb::open_at(&path).unwrap();
        db.create_partition("notes:alice").unwrap();
        FeedCache::new(&db)
            .add_notes("notes:bob", &[note("b1", 10)])
            .unwrap();

        assert_eq!(FeedCache::new(&db).count("notes:alice").unwrap(), 0);
        assert_eq!(FeedCache::new(&db).count("notes:bob").unwrap(), 1);
        assert!(schema::has_table(&db.conn(), PENDING_LEGACY_TABLE).unwrap());

        assert_eq!(db.adopt_legacy_feed("following:me").unwrap(), 2);
    }

    #[test]
    fn test_reopen_sweeps_expired_records() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.db");

        // Written at the epoch, far outside every age window by now
        let clock = Arc::new(crate::cache::ManualClock::new(0));
        let db = CacheDb::open_at(&path).unwrap().with_clock(clock);
        FeedCache::new(&db).add_notes("u1", &[note("a", 100)]).unwrap();
        ProfileCache::new(&db)
            .update_profile(&crate::cache::Profile::new("pk"))
            .unwrap();
        ReactionCache::new(&db)
            .add_reaction(&crate::cache::Reaction::new(
                "a",
                "pk",
                crate::cache::ReactionType::Like,
                100,
            ))
            .unwrap();
        drop(db);

        let db = CacheDb::open_at(&path).unwrap();
        assert_eq!(FeedCache::new(&db).count("u1").unwrap(), 0);
        assert_eq!(ProfileCache::new(&db).count().unwrap(), 0);
        assert_eq!(ReactionCache::new(&db).count().unwrap(), 0);
    }

    #[test]
    fn test_reopen_keeps_recent_records() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.db");

        let db = CacheDb::open_at(&path).unwrap();
        FeedCache::new(&db).add_notes("u1", &[note("a", 100)]).unwrap();
        drop(db);

        let db = CacheDb::open_at(&path).unwrap();
        assert_eq!(FeedCache::new(&db).count("u1").unwrap(), 1);
    }

    #[test]
    fn test_cleanup_stale_covers_every_concern() {
        let clock = Arc::new(crate::cache::ManualClock::new(0));
        let db = CacheDb::open_in_memory().unwrap().with_clock(clock.clone());

        FeedCache::new(&db).add_notes("u1", &[note("a", 100)]).unwrap();
        ProfileCache::new(&db)
            .update_profile(&crate::cache::Profile::new("pk"))
            .unwrap();

        // Past every age window
        clock.advance(31 * 24 * 60 * 60 * 1000);
        let report = db.cleanup_stale().unwrap();

        assert_eq!(report.expired, 2);
        assert_eq!(FeedCache::new(&db).count("u1").unwrap(), 0);
        assert_eq!(ProfileCache::new(&db).count().unwrap(), 0);
    }
}
