//! Pending confirmations
//!
//! When the conflict resolver answers `ask_confirmation`, nothing is written
//! to the fact table. The proposed fact is parked here under a caller-chosen
//! key (conversation or question id) until a person confirms the update,
//! asks to save anyway, or cancels. Keys are scoped to a team: two teams may
//! use the same key without seeing each other's entries. Entries expire; an
//! expired key behaves like an unknown one.
//!
//! Kept in SQLite rather than process memory so any server instance
//! pointing at the same database can resolve it.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use super::conflict::ConflictType;
use super::error::{StoreError, StoreResult};
use super::fact::NewFact;
use super::storage::{parse_ts, ts};

/// A proposed fact waiting for a person's decision
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PendingConfirmation {
    pub key: String,
    pub team_id: String,
    pub proposed: NewFact,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub related_fact_id: Option<Ulid>,
    pub conflict_type: ConflictType,
    pub reason: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl PendingConfirmation {
    pub fn new(
        key: impl Into<String>,
        team_id: impl Into<String>,
        proposed: NewFact,
        related_fact_id: Option<Ulid>,
        conflict_type: ConflictType,
        reason: impl Into<String>,
        ttl: Duration,
    ) -> Self {
        let now = Utc::now();
        let ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::days(1));

        Self {
            key: key.into(),
            team_id: team_id.into(),
            proposed,
            related_fact_id,
            conflict_type,
            reason: reason.into(),
            created_at: now,
            expires_at: now + ttl,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }
}

/// Storage for pending confirmations
pub struct PendingStore {
    conn: Mutex<Connection>,
}

impl PendingStore {
    /// Open or create the pending database
    pub fn open(path: &Path) -> StoreResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA busy_timeout=5000;")?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;

        Ok(store)
    }

    /// Open in-memory database (for testing)
    pub fn open_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| StoreError::Lock(e.to_string()))
    }

    fn init_schema(&self) -> StoreResult<()> {
        let conn = self.conn()?;

        // Early databases keyed entries by `key` alone. Pending state is
        // short-lived, so the old table is dropped rather than migrated.
        let key_pk: i64 = conn.query_row(
            "SELECT COUNT(*) FROM pragma_table_info('pending_confirmations') WHERE pk > 0",
            [],
            |row| row.get(0),
        )?;
        if key_pk == 1 {
            tracing::warn!("dropping pending confirmations stored without a team key");
            conn.execute_batch("DROP TABLE pending_confirmations;")?;
        }

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS pending_confirmations (
                team_id TEXT NOT NULL,
                key TEXT NOT NULL,
                proposed TEXT NOT NULL,  -- JSON NewFact
                related_fact_id TEXT,
                conflict_type TEXT NOT NULL,
                reason TEXT NOT NULL,
                created_at TEXT NOT NULL,
                expires_at TEXT NOT NULL,
                PRIMARY KEY (team_id, key)
            );

            CREATE INDEX IF NOT EXISTS idx_pending_team ON pending_confirmations(team_id, expires_at);
            "#,
        )?;
        Ok(())
    }

    /// Park a confirmation. A newer entry under the same team and key replaces the older one.
    pub fn put(&self, pending: &PendingConfirmation) -> StoreResult<()> {
        let proposed_json = serde_json::to_string(&pending.proposed)?;

        self.conn()?.execute(
            r#"
            INSERT OR REPLACE INTO pending_confirmations (
                key, team_id, proposed, related_fact_id, conflict_type, reason, created_at, expires_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                pending.key,
                pending.team_id,
                proposed_json,
                pending.related_fact_id.map(|u| u.to_string()),
                pending.conflict_type.to_string(),
                pending.reason,
                ts(&pending.created_at),
                ts(&pending.expires_at),
            ],
        )?;

        Ok(())
    }

    /// Look up an unexpired entry of `team_id`
    pub fn get(&self, team_id: &str, key: &str) -> StoreResult<Option<PendingConfirmation>> {
        let conn = self.conn()?;
        Self::get_in(&conn, team_id, key)
    }

    fn get_in(conn: &Connection, team_id: &str, key: &str) -> StoreResult<Option<PendingConfirmation>> {
        let mut stmt = conn.prepare(
            "SELECT * FROM pending_confirmations WHERE team_id = ?1 AND key = ?2 AND expires_at > ?3",
        )?;

        let result = stmt.query_row(params![team_id, key, ts(&Utc::now())], Self::row_to_pending);

        match result {
            Ok(p) => Ok(Some(p?)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove and return an unexpired entry. Two callers racing on the same
    /// key: exactly one gets `Some`.
    pub fn take(&self, team_id: &str, key: &str) -> StoreResult<Option<PendingConfirmation>> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let found = Self::get_in(&tx, team_id, key)?;
        if found.is_some() {
            tx.execute(
                "DELETE FROM pending_confirmations WHERE team_id = ?1 AND key = ?2",
                params![team_id, key],
            )?;
        }
        tx.commit()?;

        Ok(found)
    }

    /// Unexpired entries for a team, newest first
    pub fn list_for_team(&self, team_id: &str) -> StoreResult<Vec<PendingConfirmation>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT * FROM pending_confirmations WHERE team_id = ?1 AND expires_at > ?2 \
             ORDER BY created_at DESC",
        )?;

        let rows = stmt
            .query_map(params![team_id, ts(&Utc::now())], Self::row_to_pending)?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter().collect()
    }

    /// Delete expired entries, returning how many were removed
    pub fn purge_expired(&self) -> StoreResult<usize> {
        let removed = self.conn()?.execute(
            "DELETE FROM pending_confirmations WHERE expires_at <= ?1",
            [ts(&Utc::now())],
        )?;
        if removed > 0 {
            tracing::debug!(removed, "purged expired confirmations");
        }
        Ok(removed)
    }

    /// Count unexpired entries for a team
    pub fn count_for_team(&self, team_id: &str) -> StoreResult<usize> {
        let count: i64 = self.conn()?.query_row(
            "SELECT COUNT(*) FROM pending_confirmations WHERE team_id = ?1 AND expires_at > ?2",
            params![team_id, ts(&Utc::now())],
            |row| row.get(0),
        )?;

        Ok(count as usize)
    }

    /// Rows decode in two steps: SQL columns first, then the JSON payload
    fn row_to_pending(row: &rusqlite::Row) -> rusqlite::Result<StoreResult<PendingConfirmation>> {
        let proposed_json: String = row.get("proposed")?;
        let related: Option<String> = row.get("related_fact_id")?;
        let conflict_type: String = row.get("conflict_type")?;
        let created_at: String = row.get("created_at")?;
        let expires_at: String = row.get("expires_at")?;

        let proposed: NewFact = match serde_json::from_str(&proposed_json) {
            Ok(p) => p,
            Err(e) => return Ok(Err(e.into())),
        };

        Ok(Ok(PendingConfirmation {
            key: row.get("key")?,
            team_id: row.get("team_id")?,
            proposed,
            related_fact_id: related.and_then(|s| Ulid::from_string(&s).ok()),
            conflict_type: conflict_type.parse().unwrap_or(ConflictType::Contradiction),
            reason: row.get("reason")?,
            created_at: parse_ts(&created_at)?,
            expires_at: parse_ts(&expires_at)?,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    fn pending(key: &str, team: &str, ttl: Duration) -> PendingConfirmation {
        PendingConfirmation::new(
            key,
            team,
            NewFact::new("There are 6 dwarfs"),
            Some(Ulid::new()),
            ConflictType::Contradiction,
            "contradicts \"There are 7 dwarfs\"",
            ttl,
        )
    }

    #[test]
    fn test_put_and_get() -> Result<()> {
        let store = PendingStore::open_memory()?;
        let p = pending("conv-1", "acme", Duration::from_secs(60));
        store.put(&p)?;

        let got = store.get("acme", "conv-1")?.expect("stored");
        assert_eq!(got.proposed.content, "There are 6 dwarfs");
        assert_eq!(got.conflict_type, ConflictType::Contradiction);
        assert_eq!(got.related_fact_id, p.related_fact_id);

        Ok(())
    }

    #[test]
    fn test_take_removes() -> Result<()> {
        let store = PendingStore::open_memory()?;
        store.put(&pending("conv-1", "acme", Duration::from_secs(60)))?;

        assert!(store.take("acme", "conv-1")?.is_some());
        assert!(store.take("acme", "conv-1")?.is_none());
        assert!(store.get("acme", "conv-1")?.is_none());

        Ok(())
    }

    #[test]
    fn test_expired_entries_are_invisible() -> Result<()> {
        let store = PendingStore::open_memory()?;
        let mut p = pending("old", "acme", Duration::from_secs(60));
        p.expires_at = Utc::now() - chrono::Duration::seconds(1);
        store.put(&p)?;
        store.put(&pending("fresh", "acme", Duration::from_secs(60)))?;

        assert!(store.get("acme", "old")?.is_none());
        assert!(store.take("acme", "old")?.is_none());
        assert_eq!(store.count_for_team("acme")?, 1);

        assert_eq!(store.purge_expired()?, 1);
        assert_eq!(store.list_for_team("acme")?.len(), 1);

        Ok(())
    }

    #[test]
    fn test_same_key_replaces() -> Result<()> {
        let store = PendingStore::open_memory()?;
        store.put(&pending("conv-1", "acme", Duration::from_secs(60)))?;

        let mut newer = pending("conv-1", "acme", Duration::from_secs(60));
        newer.proposed = NewFact::new("There are 5 dwarfs");
        store.put(&newer)?;

        assert_eq!(store.count_for_team("acme")?, 1);
        assert_eq!(store.get("acme", "conv-1")?.unwrap().proposed.content, "There are 5 dwarfs");

        Ok(())
    }

    #[test]
    fn test_keys_are_scoped_to_team() -> Result<()> {
        let store = PendingStore::open_memory()?;
        store.put(&pending("conv-1", "acme", Duration::from_secs(60)))?;

        let mut other = pending("conv-1", "globex", Duration::from_secs(60));
        other.proposed = NewFact::new("We have 4 offices");
        store.put(&other)?;

        assert_eq!(store.count_for_team("acme")?, 1);
        assert_eq!(store.count_for_team("globex")?, 1);

        let taken = store.take("globex", "conv-1")?.expect("globex entry");
        assert_eq!(taken.proposed.content, "We have 4 offices");
        assert!(store.take("globex", "conv-1")?.is_none());

        let acme = store.get("acme", "conv-1")?.expect("acme entry untouched");
        assert_eq!(acme.proposed.content, "There are 6 dwarfs");

        Ok(())
    }

    #[test]
    fn test_survives_reopen() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("pending.db");

        {
            let store = PendingStore::open(&path)?;
            store.put(&pending("conv-9", "acme", Duration::from_secs(60)))?;
        }

        let reopened = PendingStore::open(&path)?;
        assert!(reopened.get("acme", "conv-9")?.is_some());

        Ok(())
    }
}
