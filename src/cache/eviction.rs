// SPDX-License-Identifier: MPL-2.0

use crate::cache::CacheError;
use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};

/// Age and size ceiling for one cache concern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvictionPolicy {
    /// Records whose `cached_at` is older than this are dropped first
    pub max_age_hours: i64,
    /// Item ceiling, per partition where the concern is partitioned
    pub max_items: usize,
}

impl EvictionPolicy {
    pub const fn new(max_age_hours: i64, max_items: usize) -> Self {
        Self {
            max_age_hours,
            max_items,
        }
    }

    pub fn max_age_ms(&self) -> i64 {
        self.max_age_hours * 60 * 60 * 1000
    }

    /// Writes trigger eviction once a partition holds more than 90% of the ceiling
    pub fn should_evict(&self, count: usize) -> bool {
        count * 10 > self.max_items * 9
    }
}

/// What one eviction pass removed
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EvictionReport {
    /// Removed for being older than the age window
    pub expired: usize,
    /// Removed, oldest `cached_at` first, to get back under the ceiling
    pub overflow: usize,
}

impl EvictionReport {
    pub fn total(&self) -> usize {
        self.expired + self.overflow
    }
}

impl std::ops::AddAssign for EvictionReport {
    fn add_assign(&mut self, other: Self) {
        self.expired += other.expired;
        self.overflow += other.overflow;
    }
}

/// Table (and owner partition, for partitioned tables) to trim
#[derive(Debug, Clone, Copy)]
pub(crate) struct Scope<'a> {
    pub table: &'static str,
    pub owner: Option<&'a str>,
}

impl<'a> Scope<'a> {
    pub fn table(table: &'static str) -> Self {
        Self { table, owner: None }
    }

    pub fn partition(table: &'static str, owner: &'a str) -> Self {
        Self {
            table,
            owner: Some(owner),
        }
    }
}

pub(crate) fn count(conn: &Connection, scope: Scope) -> Result<usize, CacheError> {
    let count: i64 = match scope.owner {
        Some(owner) => conn.query_row(
            &format!("SELECT COUNT(*) FROM {} WHERE owner_key = ?", scope.table),
            [owner],
            |row| row.get(0),
        )?,
        None => conn.query_row(&format!("SELECT COUNT(*) FROM {}", scope.table), [], |row| {
            row.get(0)
        })?,
    };
    Ok(count as usize)
}

/// Drop expired records, then trim the oldest-cached ones down to the ceiling.
pub(crate) fn evict(
    conn: &mut Connection,
    scope: Scope,
    policy: &EvictionPolicy,
    now: i64,
) -> Result<EvictionReport, CacheError> {
    let table = scope.table;
    let cutoff = now - policy.max_age_ms();
    let tx = conn.transaction()?;
    let mut report = EvictionReport::default();

    report.expired = match scope.owner {
        Some(owner) => tx.execute(
            &format!("DELETE FROM {table} WHERE owner_key = ?1 AND cached_at < ?2"),
            params![owner, cutoff],
        )?,
        None => tx.execute(
            &format!("DELETE FROM {table} WHERE cached_at < ?1"),
            [cutoff],
        )?,
    };

    let remaining = count(&tx, scope)?;
    if remaining > policy.max_items {
        let excess = (remaining - policy.max_items) as i64;
        report.overflow = match scope.owner {
            Some(owner) => tx.execute(
                &format!(
                    r#"
                    DELETE FROM {table} WHERE rowid IN (
                        SELECT rowid FROM {table}
                        WHERE owner_key = ?1
                        ORDER BY cached_at ASC, rowid ASC
                        LIMIT ?2
                    )
                    "#
                ),
                params![owner, excess],
            )?,
            None => tx.execute(
                &format!(
                    r#"
                    DELETE FROM {table} WHERE rowid IN (
                        SELECT rowid FROM {table}
                        ORDER BY cached_at ASC, rowid ASC
                        LIMIT ?1
                    )
                    "#
                ),
                [excess],
            )?,
        };
    }

    tx.commit()?;

    if report.total() > 0 {
        tracing::info!(
            table,
            owner = scope.owner.unwrap_or("*"),
            expired = report.expired,
            overflow = report.overflow,
            "evicted cached records"
        );
    }

    Ok(report)
}

/// Post-write hook. The write has already committed, so a failure here is
/// logged and the write still counts as done.
pub(crate) fn after_write(conn: &mut Connection, scope: Scope, policy: &EvictionPolicy, now: i64) {
    let result = match count(conn, scope) {
        Ok(count) if policy.should_evict(count) => evict(conn, scope, policy, now).map(|_| ()),
        Ok(_) => Ok(()),
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        tracing::warn!(table = scope.table, "eviction after write failed: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR_MS: i64 = 60 * 60 * 1000;

    fn table_with(rows: &[(&str, &str, i64)]) -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE items (owner_key TEXT NOT NULL, id TEXT NOT NULL, cached_at INTEGER NOT NULL)",
        )
        .unwrap();
        for (owner, id, cached_at) in rows {
            conn.execute(
                "INSERT INTO items (owner_key, id, cached_at) VALUES (?1, ?2, ?3)",
                params![owner, id, cached_at],
            )
            .unwrap();
        }
        conn
    }

    fn ids(conn: &Connection, owner: &str) -> Vec<String> {
        let mut stmt = conn
            .prepare("SELECT id FROM items WHERE owner_key = ? ORDER BY id")
            .unwrap();
        stmt.query_map([owner], |row| row.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap()
    }

    #[test]
    fn test_threshold_is_ninety_percent() {
        let policy = EvictionPolicy::new(1, 100);
        assert!(!policy.should_evict(90));
        assert!(policy.should_evict(91));
    }

    #[test]
    fn test_age_pass_runs_before_capacity_pass() {
        let now = 100 * HOUR_MS;
        let mut conn = table_with(&[
            ("u1", "old-1", now - 5 * HOUR_MS),
            ("u1", "old-2", now - 4 * HOUR_MS),
            ("u1", "new-1", now - HOUR_MS),
            ("u1", "new-2", now),
        ]);
        let policy = EvictionPolicy::new(2, 3);

        let report = evict(&mut conn, Scope::partition("items", "u1"), &policy, now).unwrap();

        // Dropping the two expired rows already satisfies the ceiling
        assert_eq!(report, EvictionReport { expired: 2, overflow: 0 });
        assert_eq!(ids(&conn, "u1"), vec!["new-1", "new-2"]);
    }

    #[test]
    fn test_capacity_pass_drops_oldest_cached() {
        let now = 10 * HOUR_MS;
        let mut conn = table_with(&[
            ("u1", "a", now - 3),
            ("u1", "b", now - 2),
            ("u1", "c", now - 1),
            ("u1", "d", now),
        ]);
        let policy = EvictionPolicy::new(24, 2);

        let report = evict(&mut conn, Scope::partition("items", "u1"), &policy, now).unwrap();

        assert_eq!(report, EvictionReport { expired: 0, overflow: 2 });
        assert_eq!(ids(&conn, "u1"), vec!["c", "d"]);
    }

    #[test]
    fn test_partition_scope_leaves_other_owners_alone() {
        let now = 10 * HOUR_MS;
        let mut conn = table_with(&[
            ("u1", "a", 0),
            ("u1", "b", now),
            ("u2", "c", 0),
        ]);
        let policy = EvictionPolicy::new(1, 10);

        evict(&mut conn, Scope::partition("items", "u1"), &policy, now).unwrap();

        assert_eq!(ids(&conn, "u1"), vec!["b"]);
        assert_eq!(ids(&conn, "u2"), vec!["c"]);
    }

    #[test]
    fn test_after_write_below_threshold_is_noop() {
        let mut conn = table_with(&[("u1", "a", 0), ("u1", "b", 0)]);
        let policy = EvictionPolicy::new(1, 10);

        after_write(&mut conn, Scope::table("items"), &policy, 10 * HOUR_MS);

        assert_eq!(count(&conn, Scope::table("items")).unwrap(), 2);
    }
}
