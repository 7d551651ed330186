// SPDX-License-Identifier: MPL-2.0

use crate::cache::eviction::{self, EvictionReport, Scope};
use crate::cache::schema::PROFILES_TABLE;
use crate::cache::{CacheDb, CacheError};
use crate::nostr::{ProfileMetadata, RemoteProfile};
use rusqlite::{OptionalExtension, params};
use std::collections::BTreeSet;

/// Profile as written to the cache
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Profile {
    pub pubkey: String,
    pub metadata: ProfileMetadata,
    pub followers: BTreeSet<String>,
    pub following: BTreeSet<String>,
}

impl Profile {
    pub fn new(pubkey: &str) -> Self {
        Self {
            pubkey: pubkey.to_string(),
            ..Self::default()
        }
    }

    pub fn from_remote(pubkey: &str, remote: RemoteProfile) -> Self {
        Self {
            pubkey: pubkey.to_string(),
            metadata: remote.metadata,
            followers: remote.followers.into_iter().collect(),
            following: remote.following.into_iter().collect(),
        }
    }
}

/// Profile as read back from the cache
#[derive(Debug, Clone, PartialEq)]
pub struct StoredProfile {
    pub pubkey: String,
    pub metadata: ProfileMetadata,
    pub followers: BTreeSet<String>,
    pub following: BTreeSet<String>,
    /// False when only metadata was ever fetched; the follow sets are then empty
    pub is_full: bool,
    /// Unix millis
    pub cached_at: i64,
}

impl From<StoredProfile> for Profile {
    fn from(stored: StoredProfile) -> Self {
        Self {
            pubkey: stored.pubkey,
            metadata: stored.metadata,
            followers: stored.followers,
            following: stored.following,
        }
    }
}

/// Cached profile with its staleness at read time
#[derive(Debug, Clone, PartialEq)]
pub struct CachedProfile {
    pub profile: StoredProfile,
    pub is_stale: bool,
}

/// Cache operations for profiles
pub struct ProfileCache<'a> {
    db: &'a CacheDb,
}

impl<'a> ProfileCache<'a> {
    pub fn new(db: &'a CacheDb) -> Self {
        Self { db }
    }

    /// Get a profile by pubkey. Stale profiles are still returned.
    pub fn get_profile(&self, pubkey: &str) -> Result<Option<CachedProfile>, CacheError> {
        let stored = {
            let conn = self.db.conn();

            let mut stmt = conn.prepare_cached(
                r#"
                SELECT pubkey, metadata_json, followers_json, following_json, is_full, cached_at
                FROM profiles
                WHERE pubkey = ?
                "#,
            )?;

            stmt.query_row([pubkey], Self::row_to_profile).optional()?
        };

        let stale_after = self.db.settings().profile_stale_after_ms();
        let now = self.db.now();

        Ok(stored.map(|profile| CachedProfile {
            is_stale: now - profile.cached_at > stale_after,
            profile,
        }))
    }

    /// Store a full profile (upserts, overwrites metadata-only entries)
    pub fn update_profile(&self, profile: &Profile) -> Result<(), CacheError> {
        if profile.pubkey.is_empty() {
            return Err(CacheError::invalid("profile must have a pubkey"));
        }

        let metadata_json = serde_json::to_string(&profile.metadata)?;
        let followers_json = serde_json::to_string(&profile.followers)?;
        let following_json = serde_json::to_string(&profile.following)?;

        let policy = self.db.settings().profiles;
        let now = self.db.now();
        let mut conn = self.db.conn();

        conn.execute(
            r#"
            INSERT INTO profiles (
                pubkey, metadata_json, followers_json, following_json, is_full, cached_at
            ) VALUES (?1, ?2, ?3, ?4, 1, ?5)
            ON CONFLICT(pubkey) DO UPDATE SET
                metadata_json = excluded.metadata_json,
                followers_json = excluded.followers_json,
                following_json = excluded.following_json,
                is_full = 1,
                cached_at = excluded.cached_at
            "#,
            params![
                profile.pubkey,
                metadata_json,
                followers_json,
                following_json,
                now
            ],
        )?;

        eviction::after_write(&mut conn, Scope::table(PROFILES_TABLE), &policy, now);
        Ok(())
    }

    /// Store metadata from a metadata-only lookup. A full entry keeps its
    /// follow sets and its `cached_at`, so it still goes stale on schedule.
    pub fn update_metadata(
        &self,
        pubkey: &str,
        metadata: &ProfileMetadata,
    ) -> Result<(), CacheError> {
        if pubkey.is_empty() {
            return Err(CacheError::invalid("profile must have a pubkey"));
        }

        let metadata_json = serde_json::to_string(metadata)?;
        let policy = self.db.settings().profiles;
        let now = self.db.now();
        let mut conn = self.db.conn();

        conn.execute(
            r#"
            INSERT INTO profiles (
                pubkey, metadata_json, followers_json, following_json, is_full, cached_at
            ) VALUES (?1, ?2, '[]', '[]', 0, ?3)
            ON CONFLICT(pubkey) DO UPDATE SET
                metadata_json = excluded.metadata_json,
                cached_at = CASE WHEN profiles.is_full = 1
                    THEN profiles.cached_at
                    ELSE excluded.cached_at
                END
            "#,
            params![pubkey, metadata_json, now],
        )?;

        eviction::after_write(&mut conn, Scope::table(PROFILES_TABLE), &policy, now);
        Ok(())
    }

    pub fn count(&self) -> Result<usize, CacheError> {
        let conn = self.db.conn();
        eviction::count(&conn, Scope::table(PROFILES_TABLE))
    }

    pub fn cleanup(&self) -> Result<EvictionReport, CacheError> {
        let policy = self.db.settings().profiles;
        let now = self.db.now();
        let mut conn = self.db.conn();
        eviction::evict(&mut conn, Scope::table(PROFILES_TABLE), &policy, now)
    }

    fn row_to_profile(row: &rusqlite::Row) -> Result<StoredProfile, rusqlite::Error> {
        let metadata_json: String = row.get(1)?;
        let followers_json: String = row.get(2)?;
        let following_json: String = row.get(3)?;

        Ok(StoredProfile {
            pubkey: row.get(0)?,
            metadata: serde_json::from_str(&metadata_json).unwrap_or_default(),
            followers: serde_json::from_str(&followers_json).unwrap_or_default(),
            following: serde_json::from_str(&following_json).unwrap_or_default(),
            is_full: row.get::<_, i32>(4)? != 0,
            cached_at: row.get(5)?,
        })
    }
}
