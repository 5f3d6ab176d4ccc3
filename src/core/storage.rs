//! Storage - SQLite backend
//!
//! # Key Points
//! - One row per fact version; rows are never deleted
//! - `valid_until IS NULL` marks the active set, every default read filters on it
//! - `superseded_by` links a retired fact to its replacement in the same team
//! - Embeddings are stored as JSON arrays, `NULL` when missing
//!
//! The connection sits behind a mutex. Callers must not hold it across an
//! external (embedding / language model) call; every method here is a short
//! synchronous statement or transaction.

use std::path::Path as FilePath;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, params_from_iter, Connection, OpenFlags};
use ulid::Ulid;

use super::decision::Decision;
use super::error::{StoreError, StoreResult};
use super::fact::{empty_metadata, Category, Fact, FactSource, FactUpdate};

/// Filter for listing facts
#[derive(Debug, Clone)]
pub struct FactFilter {
    pub category: Option<Category>,
    pub limit: usize,
    pub include_invalid: bool,
}

impl Default for FactFilter {
    fn default() -> Self {
        Self {
            category: None,
            limit: 50,
            include_invalid: false,
        }
    }
}

impl FactFilter {
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_category(mut self, category: Category) -> Self {
        self.category = Some(category);
        self
    }

    pub fn include_invalid(mut self) -> Self {
        self.include_invalid = true;
        self
    }
}

/// Database storage
pub struct Storage {
    conn: Mutex<Connection>,
}

impl Storage {
    /// Open or create a database
    pub fn open(path: &FilePath) -> StoreResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        // WAL lets readers proceed while another process writes
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA busy_timeout=5000;")?;

        let storage = Self {
            conn: Mutex::new(conn),
        };
        storage.init_schema()?;

        Ok(storage)
    }

    /// Open an in-memory database (for testing)
    pub fn open_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        let storage = Self {
            conn: Mutex::new(conn),
        };
        storage.init_schema()?;
        Ok(storage)
    }

    fn conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| StoreError::Lock(e.to_string()))
    }

    /// Initialize database schema
    fn init_schema(&self) -> StoreResult<()> {
        self.conn()?.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS facts (
                id TEXT PRIMARY KEY,
                team_id TEXT NOT NULL,
                content TEXT NOT NULL,
                category TEXT NOT NULL DEFAULT 'general',
                entity_type TEXT,
                entity_name TEXT,
                attribute TEXT,
                value TEXT,
                confidence_score REAL NOT NULL DEFAULT 1.0,
                source_type TEXT NOT NULL DEFAULT 'manual',
                source_id TEXT,
                created_by TEXT NOT NULL DEFAULT '',
                metadata TEXT NOT NULL DEFAULT '{}',
                embedding TEXT,  -- JSON array or NULL
                valid_from TEXT NOT NULL,
                valid_until TEXT,
                superseded_by TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            -- Active set per team, newest first
            CREATE INDEX IF NOT EXISTS idx_facts_team_active
                ON facts(team_id, valid_until, valid_from);

            -- Backward walk of supersession chains
            CREATE INDEX IF NOT EXISTS idx_facts_superseded_by ON facts(superseded_by);

            CREATE TABLE IF NOT EXISTS decisions (
                id TEXT PRIMARY KEY,
                team_id TEXT NOT NULL,
                what TEXT NOT NULL,
                why TEXT NOT NULL DEFAULT '',
                alternatives TEXT NOT NULL DEFAULT '[]',
                made_by TEXT NOT NULL DEFAULT '',
                related_facts TEXT NOT NULL DEFAULT '[]',
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_decisions_team ON decisions(team_id, created_at);
            "#,
        )?;

        Ok(())
    }

    // ============== Facts ==============

    /// Insert a new fact
    pub fn insert_fact(&self, fact: &Fact) -> StoreResult<()> {
        let conn = self.conn()?;
        Self::insert_fact_in(&conn, fact)
    }

    fn insert_fact_in(conn: &Connection, fact: &Fact) -> StoreResult<()> {
        let metadata_json = serde_json::to_string(&fact.metadata)?;
        let embedding_json = match &fact.embedding {
            Some(e) => Some(serde_json::to_string(e)?),
            None => None,
        };

        conn.execute(
            r#"
            INSERT INTO facts (
                id, team_id, content, category, entity_type, entity_name,
                attribute, value, confidence_score, source_type, source_id,
                created_by, metadata, embedding, valid_from, valid_until,
                superseded_by, created_at, updated_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6,
                ?7, ?8, ?9, ?10, ?11,
                ?12, ?13, ?14, ?15, ?16,
                ?17, ?18, ?19
            )
            "#,
            params![
                fact.id.to_string(),
                fact.team_id,
                fact.content,
                fact.category.as_str(),
                fact.entity_type,
                fact.entity_name,
                fact.attribute,
                fact.value,
                fact.confidence_score,
                fact.source.source_type.to_string(),
                fact.source.source_id,
                fact.created_by,
                metadata_json,
                embedding_json,
                ts(&fact.valid_from),
                fact.valid_until.as_ref().map(ts),
                fact.superseded_by.map(|u| u.to_string()),
                ts(&fact.created_at),
                ts(&fact.updated_at),
            ],
        )?;

        Ok(())
    }

    /// Get a fact by ID (active or not)
    pub fn get_fact(&self, id: &Ulid) -> StoreResult<Option<Fact>> {
        let conn = self.conn()?;
        Self::get_fact_in(&conn, id)
    }

    fn get_fact_in(conn: &Connection, id: &Ulid) -> StoreResult<Option<Fact>> {
        let mut stmt = conn.prepare("SELECT * FROM facts WHERE id = ?1")?;

        let result = stmt.query_row([id.to_string()], Self::row_to_fact);

        match result {
            Ok(fact) => Ok(Some(fact)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// List facts for a team, newest first
    pub fn list_facts(&self, team_id: &str, filter: &FactFilter) -> StoreResult<Vec<Fact>> {
        let mut sql = String::from("SELECT * FROM facts WHERE team_id = ?1");
        let mut args: Vec<String> = vec![team_id.to_string()];

        if !filter.include_invalid {
            sql.push_str(" AND valid_until IS NULL");
        }
        if let Some(category) = filter.category {
            args.push(category.as_str().to_string());
            sql.push_str(&format!(" AND category = ?{}", args.len()));
        }
        sql.push_str(&format!(
            " ORDER BY valid_from DESC, rowid DESC LIMIT {}",
            filter.limit
        ));

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let facts = stmt
            .query_map(params_from_iter(args.iter()), Self::row_to_fact)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(facts)
    }

    /// All active facts of a team that carry an embedding
    pub fn embedded_active_facts(&self, team_id: &str) -> StoreResult<Vec<Fact>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT * FROM facts WHERE team_id = ?1 AND valid_until IS NULL AND embedding IS NOT NULL",
        )?;

        let facts = stmt
            .query_map([team_id], Self::row_to_fact)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(facts)
    }

    /// Active facts whose content contains at least one of `terms`
    /// (case-insensitive), newest first
    ///
    /// Terms are expected lowercase.
    pub fn keyword_facts(&self, team_id: &str, terms: &[String], limit: usize) -> StoreResult<Vec<Fact>> {
        if terms.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        // Matched in Rust: SQLite's lower() only folds ASCII
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT * FROM facts WHERE team_id = ?1 AND valid_until IS NULL \
             ORDER BY valid_from DESC, rowid DESC",
        )?;

        let mut facts = Vec::new();
        for fact in stmt.query_map([team_id], Self::row_to_fact)? {
            let fact = fact?;
            if contains_any(&fact.content, terms) {
                facts.push(fact);
                if facts.len() == limit {
                    break;
                }
            }
        }

        Ok(facts)
    }

    /// Active facts still waiting for an embedding, oldest first
    pub fn facts_missing_embedding(&self, team_id: &str, limit: usize) -> StoreResult<Vec<Fact>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT * FROM facts WHERE team_id = ?1 AND valid_until IS NULL AND embedding IS NULL \
             ORDER BY valid_from ASC, rowid ASC LIMIT ?2",
        )?;

        let facts = stmt
            .query_map(params![team_id, limit as i64], Self::row_to_fact)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(facts)
    }

    /// Edit content/category in place. Validity and embedding are untouched.
    pub fn update_fact(&self, id: &Ulid, update: &FactUpdate) -> StoreResult<Fact> {
        update.validate()?;

        let conn = self.conn()?;
        let mut fact = Self::get_fact_in(&conn, id)?.ok_or_else(|| StoreError::fact_not_found(id))?;

        if let Some(content) = &update.content {
            fact.content = content.trim().to_string();
        }
        if let Some(category) = update.category {
            fact.category = category;
        }
        fact.updated_at = Utc::now();

        conn.execute(
            "UPDATE facts SET content = ?2, category = ?3, updated_at = ?4 WHERE id = ?1",
            params![
                id.to_string(),
                fact.content,
                fact.category.as_str(),
                ts(&fact.updated_at),
            ],
        )?;

        Ok(fact)
    }

    /// Store an embedding for a fact
    pub fn set_embedding(&self, id: &Ulid, embedding: &[f32]) -> StoreResult<()> {
        let json = serde_json::to_string(embedding)?;
        let updated = self.conn()?.execute(
            "UPDATE facts SET embedding = ?2 WHERE id = ?1",
            params![id.to_string(), json],
        )?;

        if updated == 0 {
            return Err(StoreError::fact_not_found(id));
        }
        Ok(())
    }

    /// Retire a fact: set `valid_until = now` and optionally link its replacement.
    ///
    /// Invalidating an inactive fact returns it unchanged.
    pub fn invalidate_fact(&self, id: &Ulid, superseded_by: Option<&Ulid>) -> StoreResult<Fact> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let fact = Self::invalidate_in(&tx, id, superseded_by)?;
        tx.commit()?;
        Ok(fact)
    }

    fn invalidate_in(conn: &Connection, id: &Ulid, superseded_by: Option<&Ulid>) -> StoreResult<Fact> {
        let mut fact = Self::get_fact_in(conn, id)?.ok_or_else(|| StoreError::fact_not_found(id))?;

        if !fact.is_active() {
            return Ok(fact);
        }

        if let Some(by) = superseded_by {
            if by == id {
                return Err(StoreError::validation("a fact cannot supersede itself"));
            }
            let replacement = Self::get_fact_in(conn, by)?.ok_or_else(|| StoreError::fact_not_found(by))?;
            if replacement.team_id != fact.team_id {
                return Err(StoreError::validation(
                    "superseding fact belongs to a different team",
                ));
            }
        }

        let now = Utc::now();
        conn.execute(
            "UPDATE facts SET valid_until = ?2, superseded_by = ?3, updated_at = ?2 \
             WHERE id = ?1 AND valid_until IS NULL",
            params![id.to_string(), ts(&now), superseded_by.map(|u| u.to_string())],
        )?;

        fact.valid_until = Some(now);
        fact.superseded_by = superseded_by.copied();
        fact.updated_at = now;
        Ok(fact)
    }

    /// Insert `new` and retire `old_id` in favour of it, in one transaction.
    ///
    /// Returns `(new, old)`. If `old_id` was already retired it is left as is.
    pub fn supersede(&self, old_id: &Ulid, new: &Fact) -> StoreResult<(Fact, Fact)> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let old = Self::get_fact_in(&tx, old_id)?.ok_or_else(|| StoreError::fact_not_found(old_id))?;
        if old.team_id != new.team_id {
            return Err(StoreError::validation(
                "cannot supersede a fact from a different team",
            ));
        }
        if !old.is_active() {
            return Err(StoreError::AlreadyRetired(old_id.to_string()));
        }

        Self::insert_fact_in(&tx, new)?;
        let old = Self::invalidate_in(&tx, old_id, Some(&new.id))?;
        tx.commit()?;

        Ok((new.clone(), old))
    }

    /// Full supersession chain through a fact, oldest first
    pub fn history_chain(&self, id: &Ulid) -> StoreResult<Vec<Fact>> {
        let conn = self.conn()?;
        let start = Self::get_fact_in(&conn, id)?.ok_or_else(|| StoreError::fact_not_found(id))?;

        // Backwards: who was replaced by the current head
        let mut earlier = Vec::new();
        let mut stmt = conn.prepare("SELECT * FROM facts WHERE superseded_by = ?1 LIMIT 1")?;
        let mut cursor = start.id;
        loop {
            let prev = match stmt.query_row([cursor.to_string()], Self::row_to_fact) {
                Ok(f) => f,
                Err(rusqlite::Error::QueryReturnedNoRows) => break,
                Err(e) => return Err(e.into()),
            };
            // Guards against a corrupted cycle
            if prev.id == start.id || earlier.iter().any(|f: &Fact| f.id == prev.id) {
                break;
            }
            cursor = prev.id;
            earlier.push(prev);
        }
        earlier.reverse();

        // Forwards: follow superseded_by
        let mut chain = earlier;
        let mut next = start.superseded_by;
        chain.push(start);
        while let Some(next_id) = next {
            if chain.iter().any(|f| f.id == next_id) {
                break;
            }
            match Self::get_fact_in(&conn, &next_id)? {
                Some(f) => {
                    next = f.superseded_by;
                    chain.push(f);
                }
                None => break,
            }
        }

        Ok(chain)
    }

    // ============== Decisions ==============

    pub fn insert_decision(&self, decision: &Decision) -> StoreResult<()> {
        let alternatives = serde_json::to_string(&decision.alternatives)?;
        let related = serde_json::to_string(&decision.related_facts)?;

        self.conn()?.execute(
            r#"
            INSERT INTO decisions (id, team_id, what, why, alternatives, made_by, related_facts, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                decision.id.to_string(),
                decision.team_id,
                decision.what,
                decision.why,
                alternatives,
                decision.made_by,
                related,
                ts(&decision.created_at),
            ],
        )?;

        Ok(())
    }

    pub fn list_decisions(&self, team_id: &str, limit: usize) -> StoreResult<Vec<Decision>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT * FROM decisions WHERE team_id = ?1 ORDER BY created_at DESC, rowid DESC LIMIT ?2",
        )?;

        let decisions = stmt
            .query_map(params![team_id, limit as i64], Self::row_to_decision)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(decisions)
    }

    /// Decisions whose `what` or `why` contains any of `terms` (lowercase)
    pub fn keyword_decisions(&self, team_id: &str, terms: &[String], limit: usize) -> StoreResult<Vec<Decision>> {
        if terms.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT * FROM decisions WHERE team_id = ?1 ORDER BY created_at DESC, rowid DESC",
        )?;

        let mut decisions = Vec::new();
        for decision in stmt.query_map([team_id], Self::row_to_decision)? {
            let decision = decision?;
            if contains_any(&decision.what, terms) || contains_any(&decision.why, terms) {
                decisions.push(decision);
                if decisions.len() == limit {
                    break;
                }
            }
        }

        Ok(decisions)
    }

    // ============== Stats ==============

    pub fn stats(&self, team_id: &str) -> StoreResult<StorageStats> {
        let conn = self.conn()?;

        let (total, active, embedded): (i64, i64, i64) = conn.query_row(
            r#"
            SELECT
                COUNT(*),
                COALESCE(SUM(CASE WHEN valid_until IS NULL THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN valid_until IS NULL AND embedding IS NOT NULL THEN 1 ELSE 0 END), 0)
            FROM facts WHERE team_id = ?1
            "#,
            [team_id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;

        let decisions: i64 = conn.query_row(
            "SELECT COUNT(*) FROM decisions WHERE team_id = ?1",
            [team_id],
            |row| row.get(0),
        )?;

        Ok(StorageStats {
            total_facts: total as usize,
            active_facts: active as usize,
            inactive_facts: (total - active) as usize,
            embedded_facts: embedded as usize,
            decisions: decisions as usize,
        })
    }

    // ============== Row mapping ==============

    /// Convert a database row to a Fact
    fn row_to_fact(row: &rusqlite::Row) -> rusqlite::Result<Fact> {
        let id_str: String = row.get("id")?;
        let category_str: String = row.get("category")?;
        let source_type_str: String = row.get("source_type")?;
        let metadata_json: String = row.get("metadata")?;
        let embedding_json: Option<String> = row.get("embedding")?;
        let valid_from: String = row.get("valid_from")?;
        let valid_until: Option<String> = row.get("valid_until")?;
        let superseded_by: Option<String> = row.get("superseded_by")?;
        let created_at: String = row.get("created_at")?;
        let updated_at: String = row.get("updated_at")?;

        Ok(Fact {
            id: parse_ulid(&id_str)?,
            team_id: row.get("team_id")?,
            content: row.get("content")?,
            category: category_str.parse().unwrap_or_default(),
            entity_type: row.get("entity_type")?,
            entity_name: row.get("entity_name")?,
            attribute: row.get("attribute")?,
            value: row.get("value")?,
            confidence_score: row.get::<_, f64>("confidence_score")? as f32,
            source: FactSource {
                source_type: source_type_str.parse().unwrap_or_default(),
                source_id: row.get("source_id")?,
            },
            metadata: serde_json::from_str(&metadata_json).unwrap_or_else(|_| empty_metadata()),
            // A malformed vector is treated like a missing one
            embedding: embedding_json.and_then(|s| serde_json::from_str(&s).ok()),
            valid_from: parse_ts(&valid_from)?,
            valid_until: valid_until.as_deref().map(parse_ts).transpose()?,
            superseded_by: superseded_by.as_deref().map(parse_ulid).transpose()?,
            created_by: row.get("created_by")?,
            created_at: parse_ts(&created_at)?,
            updated_at: parse_ts(&updated_at)?,
        })
    }

    fn row_to_decision(row: &rusqlite::Row) -> rusqlite::Result<Decision> {
        let id_str: String = row.get("id")?;
        let alternatives: String = row.get("alternatives")?;
        let related: String = row.get("related_facts")?;
        let created_at: String = row.get("created_at")?;

        Ok(Decision {
            id: parse_ulid(&id_str)?,
            team_id: row.get("team_id")?,
            what: row.get("what")?,
            why: row.get("why")?,
            alternatives: serde_json::from_str(&alternatives).unwrap_or_default(),
            made_by: row.get("made_by")?,
            related_facts: serde_json::from_str(&related).unwrap_or_default(),
            created_at: parse_ts(&created_at)?,
        })
    }
}

/// Fixed-width RFC 3339 so that text ordering matches time ordering
/// Case-insensitive (Unicode) containment of any lowercase term
fn contains_any(text: &str, terms: &[String]) -> bool {
    let lowered = text.to_lowercase();
    terms.iter().any(|t| lowered.contains(t.as_str()))
}

pub(crate) fn ts(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_ts(s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e)))
}

fn parse_ulid(s: &str) -> rusqlite::Result<Ulid> {
    Ulid::from_string(s)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e)))
}

/// Per-team statistics
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct StorageStats {
    pub total_facts: usize,
    pub active_facts: usize,
    pub inactive_facts: usize,
    pub embedded_facts: usize,
    pub decisions: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::decision::NewDecision;
    use crate::core::fact::NewFact;
    use anyhow::Result;

    fn fact(team: &str, content: &str) -> Fact {
        Fact::from_new(team, NewFact::new(content))
    }

    #[test]
    fn test_create_and_get() -> Result<()> {
        let storage = Storage::open_memory()?;

        let f = Fact::from_new(
            "acme",
            NewFact::new("Launch date is March 22")
                .with_category(Category::Product)
                .with_subject("product", "Dungeon Crawlers", "launch date", "2025-03-22")
                .with_metadata(serde_json::json!({"urls": ["https://example.com"]}))
                .with_embedding(vec![0.1, 0.2, 0.3]),
        );
        storage.insert_fact(&f)?;

        let got = storage.get_fact(&f.id)?.expect("fact stored");
        assert_eq!(got.content, "Launch date is March 22");
        assert_eq!(got.category, Category::Product);
        assert_eq!(got.entity_name.as_deref(), Some("Dungeon Crawlers"));
        assert_eq!(got.embedding, Some(vec![0.1, 0.2, 0.3]));
        assert_eq!(got.metadata["urls"][0], "https://example.com");
        assert!(got.is_active());

        Ok(())
    }

    #[test]
    fn test_get_missing_is_none() -> Result<()> {
        let storage = Storage::open_memory()?;
        assert!(storage.get_fact(&Ulid::new())?.is_none());
        Ok(())
    }

    #[test]
    fn test_list_newest_first_and_scoped_to_team() -> Result<()> {
        let storage = Storage::open_memory()?;

        storage.insert_fact(&fact("acme", "first"))?;
        storage.insert_fact(&fact("acme", "second"))?;
        storage.insert_fact(&fact("other", "not ours"))?;

        let facts = storage.list_facts("acme", &FactFilter::default())?;
        let contents: Vec<_> = facts.iter().map(|f| f.content.as_str()).collect();
        assert_eq!(contents, vec!["second", "first"]);

        Ok(())
    }

    #[test]
    fn test_list_filters_category_and_limit() -> Result<()> {
        let storage = Storage::open_memory()?;

        storage.insert_fact(&Fact::from_new(
            "acme",
            NewFact::new("Margin is 40%").with_category(Category::Finance),
        ))?;
        storage.insert_fact(&fact("acme", "general one"))?;
        storage.insert_fact(&fact("acme", "general two"))?;

        let finance = storage.list_facts("acme", &FactFilter::default().with_category(Category::Finance))?;
        assert_eq!(finance.len(), 1);

        let limited = storage.list_facts("acme", &FactFilter::default().with_limit(2))?;
        assert_eq!(limited.len(), 2);

        Ok(())
    }

    #[test]
    fn test_invalidated_facts_hidden_by_default() -> Result<()> {
        let storage = Storage::open_memory()?;

        let f = fact("acme", "We use Slack");
        storage.insert_fact(&f)?;
        storage.invalidate_fact(&f.id, None)?;

        assert!(storage.list_facts("acme", &FactFilter::default())?.is_empty());
        let all = storage.list_facts("acme", &FactFilter::default().include_invalid())?;
        assert_eq!(all.len(), 1);
        assert!(!all[0].is_active());

        Ok(())
    }

    #[test]
    fn test_invalidate_is_idempotent() -> Result<()> {
        let storage = Storage::open_memory()?;

        let f = fact("acme", "old");
        storage.insert_fact(&f)?;

        let first = storage.invalidate_fact(&f.id, None)?;
        let second = storage.invalidate_fact(&f.id, None)?;
        assert_eq!(first.valid_until, second.valid_until);

        let stored = storage.get_fact(&f.id)?.unwrap();
        assert_eq!(stored.valid_until, first.valid_until);

        Ok(())
    }

    #[test]
    fn test_superseded_by_is_never_cleared() -> Result<()> {
        let storage = Storage::open_memory()?;

        let old = fact("acme", "7 dwarfs");
        let new = fact("acme", "6 dwarfs");
        storage.insert_fact(&old)?;
        storage.insert_fact(&new)?;

        storage.invalidate_fact(&old.id, Some(&new.id))?;
        // Second call without a link must not wipe the first one
        let again = storage.invalidate_fact(&old.id, None)?;
        assert_eq!(again.superseded_by, Some(new.id));

        let stored = storage.get_fact(&old.id)?.unwrap();
        assert_eq!(stored.superseded_by, Some(new.id));

        Ok(())
    }

    #[test]
    fn test_invalidate_rejects_cross_team_link() -> Result<()> {
        let storage = Storage::open_memory()?;

        let ours = fact("acme", "ours");
        let theirs = fact("globex", "theirs");
        storage.insert_fact(&ours)?;
        storage.insert_fact(&theirs)?;

        let err = storage.invalidate_fact(&ours.id, Some(&theirs.id)).unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
        assert!(storage.get_fact(&ours.id)?.unwrap().is_active());

        Ok(())
    }

    #[test]
    fn test_invalidate_missing_is_not_found() -> Result<()> {
        let storage = Storage::open_memory()?;
        let err = storage.invalidate_fact(&Ulid::new(), None).unwrap_err();
        assert!(err.is_not_found());
        Ok(())
    }

    #[test]
    fn test_update_keeps_validity_and_embedding() -> Result<()> {
        let storage = Storage::open_memory()?;

        let f = Fact::from_new("acme", NewFact::new("old text").with_embedding(vec![1.0, 0.0]));
        storage.insert_fact(&f)?;

        let updated = storage.update_fact(
            &f.id,
            &FactUpdate {
                content: Some("new text".into()),
                category: Some(Category::Sales),
            },
        )?;
        assert_eq!(updated.content, "new text");
        assert_eq!(updated.category, Category::Sales);

        let stored = storage.get_fact(&f.id)?.unwrap();
        assert_eq!(stored.content, "new text");
        assert_eq!(stored.embedding, Some(vec![1.0, 0.0]));
        assert!(stored.is_active());

        Ok(())
    }

    #[test]
    fn test_supersede_links_both_rows() -> Result<()> {
        let storage = Storage::open_memory()?;

        let old = fact("acme", "Launch date is March 22");
        storage.insert_fact(&old)?;
        let new = fact("acme", "Launch date is March 25");

        let (new, old) = storage.supersede(&old.id, &new)?;
        assert!(!old.is_active());
        assert_eq!(old.superseded_by, Some(new.id));
        assert!(storage.get_fact(&new.id)?.unwrap().is_active());

        Ok(())
    }

    #[test]
    fn test_supersede_rejects_other_team_without_writing() -> Result<()> {
        let storage = Storage::open_memory()?;

        let old = fact("acme", "ours");
        storage.insert_fact(&old)?;
        let new = fact("globex", "theirs");

        assert!(storage.supersede(&old.id, &new).is_err());
        assert!(storage.get_fact(&new.id)?.is_none());

        Ok(())
    }

    #[test]
    fn test_supersede_rejects_retired_target() -> Result<()> {
        let storage = Storage::open_memory()?;

        let old = fact("acme", "Launch date is March 22");
        storage.insert_fact(&old)?;
        storage.supersede(&old.id, &fact("acme", "Launch date is March 25"))?;

        let late = fact("acme", "Launch date is March 28");
        let err = storage.supersede(&old.id, &late).unwrap_err();
        assert!(err.is_already_retired());
        assert!(storage.get_fact(&late.id)?.is_none());
        assert_eq!(storage.list_facts("acme", &FactFilter::default())?.len(), 1);

        Ok(())
    }

    #[test]
    fn test_history_chain() -> Result<()> {
        let storage = Storage::open_memory()?;

        let v1 = fact("acme", "v1");
        storage.insert_fact(&v1)?;
        let (v2, _) = storage.supersede(&v1.id, &fact("acme", "v2"))?;
        let (v3, _) = storage.supersede(&v2.id, &fact("acme", "v3"))?;

        for id in [v1.id, v2.id, v3.id] {
            let chain = storage.history_chain(&id)?;
            let contents: Vec<_> = chain.iter().map(|f| f.content.as_str()).collect();
            assert_eq!(contents, vec!["v1", "v2", "v3"]);
        }

        Ok(())
    }

    #[test]
    fn test_keyword_facts_case_insensitive() -> Result<()> {
        let storage = Storage::open_memory()?;

        storage.insert_fact(&fact("acme", "We use SLACK for chat"))?;
        storage.insert_fact(&fact("acme", "Payroll runs on Fridays"))?;

        let hits = storage.keyword_facts("acme", &["slack".to_string()], 10)?;
        assert_eq!(hits.len(), 1);
        assert!(hits[0].content.contains("SLACK"));

        assert!(storage.keyword_facts("acme", &[], 10)?.is_empty());

        Ok(())
    }

    #[test]
    fn test_keyword_match_folds_non_ascii_case() -> Result<()> {
        let storage = Storage::open_memory()?;

        storage.insert_fact(&fact("acme", "ÉCOLE partnership signed"))?;
        storage.insert_fact(&fact("acme", "Büro in MÜNCHEN eröffnet"))?;

        let hits = storage.keyword_facts("acme", &["école".to_string()], 10)?;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].content, "ÉCOLE partnership signed");

        let hits = storage.keyword_facts("acme", &["münchen".to_string()], 10)?;
        assert_eq!(hits.len(), 1);

        let mut decision = NewDecision::new("Renew the ÉCOLE contract", "");
        decision.made_by = "ana".to_string();
        storage.insert_decision(&Decision::from_new("acme", decision))?;
        assert_eq!(storage.keyword_decisions("acme", &["école".to_string()], 10)?.len(), 1);

        Ok(())
    }

    #[test]
    fn test_embedding_bookkeeping() -> Result<()> {
        let storage = Storage::open_memory()?;

        let bare = fact("acme", "no vector yet");
        storage.insert_fact(&bare)?;
        assert_eq!(storage.facts_missing_embedding("acme", 10)?.len(), 1);
        assert!(storage.embedded_active_facts("acme")?.is_empty());

        storage.set_embedding(&bare.id, &[0.5, 0.5])?;
        assert!(storage.facts_missing_embedding("acme", 10)?.is_empty());
        assert_eq!(storage.embedded_active_facts("acme")?.len(), 1);

        Ok(())
    }

    #[test]
    fn test_decisions() -> Result<()> {
        let storage = Storage::open_memory()?;

        let mut nd = NewDecision::new("Switch payments to Stripe", "Lower fees than PayPal");
        nd.alternatives = vec!["PayPal".into(), "Adyen".into()];
        let d = Decision::from_new("acme", nd);
        storage.insert_decision(&d)?;

        let listed = storage.list_decisions("acme", 10)?;
        assert_eq!(listed, vec![d.clone()]);

        let hits = storage.keyword_decisions("acme", &["fees".to_string()], 10)?;
        assert_eq!(hits.len(), 1);
        assert!(storage.keyword_decisions("globex", &["fees".to_string()], 10)?.is_empty());

        Ok(())
    }

    #[test]
    fn test_stats() -> Result<()> {
        let storage = Storage::open_memory()?;

        let a = Fact::from_new("acme", NewFact::new("a").with_embedding(vec![1.0]));
        let b = fact("acme", "b");
        storage.insert_fact(&a)?;
        storage.insert_fact(&b)?;
        storage.invalidate_fact(&b.id, None)?;

        let stats = storage.stats("acme")?;
        assert_eq!(stats.total_facts, 2);
        assert_eq!(stats.active_facts, 1);
        assert_eq!(stats.inactive_facts, 1);
        assert_eq!(stats.embedded_facts, 1);
        assert_eq!(stats.decisions, 0);

        Ok(())
    }
}
