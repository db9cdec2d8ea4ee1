//! Schema versioning and migrations, modeled on this workspace's
//! `scripts/migrations/*.sql` + `_migrations` ledger convention: each
//! migration is a `const &str` SQL batch with a monotonic id, applied only
//! when the stored schema version is below the compiled-in current version.

use rusqlite::OptionalExtension;

use sa_domain::error::Result;

use crate::connection::ConnectionManager;

const BOOTSTRAP: &str = r#"
CREATE TABLE IF NOT EXISTS _meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS _migrations (
    id INTEGER PRIMARY KEY,
    filename TEXT UNIQUE NOT NULL,
    applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);
"#;

const MIGRATION_0001_INIT: &str = r#"
CREATE TABLE IF NOT EXISTS sessions (
    session_id      TEXT PRIMARY KEY,
    summary         TEXT,
    key_topics      TEXT NOT NULL DEFAULT '[]',
    emotional_tone  TEXT,
    turn_count      INTEGER NOT NULL DEFAULT 0,
    started_at      TEXT NOT NULL,
    ended_at        TEXT,
    expires_at      TEXT NOT NULL,
    messages_json   TEXT
);
CREATE INDEX IF NOT EXISTS idx_sessions_expires_at ON sessions(expires_at);

CREATE TABLE IF NOT EXISTS messages (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id          TEXT NOT NULL,
    turn_id             INTEGER NOT NULL,
    role                TEXT NOT NULL,
    content             TEXT NOT NULL,
    timestamp           TEXT NOT NULL,
    emotional_context   TEXT
);
CREATE INDEX IF NOT EXISTS idx_messages_session_id ON messages(session_id);
CREATE INDEX IF NOT EXISTS idx_messages_timestamp ON messages(timestamp);

CREATE TABLE IF NOT EXISTS archived_messages (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id  TEXT NOT NULL,
    turn_id     INTEGER NOT NULL,
    role        TEXT NOT NULL,
    content     TEXT NOT NULL,
    timestamp   TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_archived_messages_timestamp ON archived_messages(timestamp);

CREATE TABLE IF NOT EXISTS interaction_logs (
    id                      INTEGER PRIMARY KEY AUTOINCREMENT,
    ts                      TEXT NOT NULL,
    conversation_id         TEXT NOT NULL,
    turn_id                 INTEGER NOT NULL,
    effective_model         TEXT NOT NULL,
    tier                    TEXT NOT NULL,
    router_reason           TEXT NOT NULL,
    routing_features_json   TEXT NOT NULL DEFAULT '{}',
    manual_override         INTEGER NOT NULL DEFAULT 0,
    latency_ms              INTEGER NOT NULL,
    ttft_ms                 INTEGER,
    tokens_in               INTEGER NOT NULL,
    tokens_out              INTEGER NOT NULL,
    tool_calls_json         TEXT NOT NULL DEFAULT '[]',
    refusal_detected        INTEGER NOT NULL DEFAULT 0,
    response_chars          INTEGER NOT NULL,
    hedge_ratio             REAL NOT NULL,
    avg_sentence_len        REAL NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_interaction_logs_tier ON interaction_logs(tier);
CREATE INDEX IF NOT EXISTS idx_interaction_logs_router_reason ON interaction_logs(router_reason);
CREATE INDEX IF NOT EXISTS idx_interaction_logs_ts ON interaction_logs(ts);

CREATE TABLE IF NOT EXISTS entities (
    entity_id       TEXT PRIMARY KEY,
    name            TEXT NOT NULL,
    entity_type     TEXT NOT NULL,
    properties_json TEXT NOT NULL DEFAULT '{}',
    mentions        INTEGER NOT NULL DEFAULT 1,
    created_at      TEXT NOT NULL,
    last_accessed   TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS relations (
    source_id       TEXT NOT NULL,
    relation_type   TEXT NOT NULL,
    target_id       TEXT NOT NULL,
    weight          REAL NOT NULL DEFAULT 1.0,
    context         TEXT,
    created_at      TEXT NOT NULL,
    PRIMARY KEY (source_id, relation_type, target_id)
);

CREATE TABLE IF NOT EXISTS memories (
    uuid                TEXT PRIMARY KEY,
    content             TEXT NOT NULL,
    memory_type         TEXT NOT NULL,
    importance          REAL NOT NULL,
    repetitions         INTEGER NOT NULL DEFAULT 1,
    access_count        INTEGER NOT NULL DEFAULT 0,
    created_at          TEXT NOT NULL,
    last_accessed       TEXT NOT NULL,
    preserved           INTEGER NOT NULL DEFAULT 0,
    decayed_importance  REAL,
    embedding           BLOB NOT NULL
);

CREATE TABLE IF NOT EXISTS memory_access_patterns (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    memory_uuid     TEXT NOT NULL,
    accessed_at     TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_memory_access_patterns_memory_uuid ON memory_access_patterns(memory_uuid);
"#;

const MIGRATIONS: &[(u32, &str, &str)] = &[(1, "0001_init.sql", MIGRATION_0001_INIT)];

#[derive(Debug, Clone)]
pub struct SchemaStatus {
    pub current_version: u32,
    pub latest_version: u32,
    pub applied: Vec<String>,
    pub pending: Vec<String>,
}

pub struct SchemaManager;

impl SchemaManager {
    pub const CURRENT_VERSION: u32 = 1;

    /// Apply any migration whose id exceeds the stored schema version.
    /// Idempotent: a second call with nothing pending is a no-op.
    pub fn ensure_schema(manager: &ConnectionManager) -> Result<()> {
        manager.with_connection(|conn| {
            conn.execute_batch(BOOTSTRAP)?;
            Ok(())
        })?;

        let current = Self::current_version(manager)?;

        for (id, filename, sql) in MIGRATIONS {
            if *id <= current {
                continue;
            }
            manager.transaction(|tx| {
                tx.execute_batch(sql)?;
                tx.execute(
                    "INSERT INTO _migrations (id, filename) VALUES (?1, ?2)",
                    rusqlite::params![id, filename],
                )?;
                tx.execute(
                    "INSERT INTO _meta (key, value) VALUES ('schema_version', ?1)
                     ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                    rusqlite::params![id.to_string()],
                )?;
                Ok(())
            })?;
            tracing::info!(migration = filename, "applied schema migration");
        }

        Ok(())
    }

    pub fn current_version(manager: &ConnectionManager) -> Result<u32> {
        manager.with_connection(|conn| {
            let value: Option<String> = conn
                .query_row(
                    "SELECT value FROM _meta WHERE key = 'schema_version'",
                    [],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(value.and_then(|v| v.parse().ok()).unwrap_or(0))
        })
    }

    pub fn status(manager: &ConnectionManager) -> Result<SchemaStatus> {
        manager.with_connection(|conn| {
            conn.execute_batch(BOOTSTRAP)?;
            Ok(())
        })?;
        let current = Self::current_version(manager)?;
        let applied: Vec<String> = manager.with_connection(|conn| {
            let mut stmt = conn.prepare("SELECT filename FROM _migrations ORDER BY id")?;
            let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row?);
            }
            Ok(out)
        })?;
        let pending: Vec<String> = MIGRATIONS
            .iter()
            .filter(|(id, ..)| *id > current)
            .map(|(_, filename, _)| filename.to_string())
            .collect();

        Ok(SchemaStatus {
            current_version: current,
            latest_version: Self::CURRENT_VERSION,
            applied,
            pending,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_schema_creates_all_tables() {
        let manager = ConnectionManager::open_in_memory().unwrap();
        SchemaManager::ensure_schema(&manager).unwrap();

        manager
            .with_connection(|conn| {
                for table in [
                    "sessions",
                    "messages",
                    "archived_messages",
                    "interaction_logs",
                    "entities",
                    "relations",
                    "memories",
                    "memory_access_patterns",
                ] {
                    conn.query_row(
                        &format!("SELECT COUNT(*) FROM {table}"),
                        [],
                        |row| row.get::<_, i64>(0),
                    )?;
                }
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn ensure_schema_is_idempotent() {
        let manager = ConnectionManager::open_in_memory().unwrap();
        SchemaManager::ensure_schema(&manager).unwrap();
        SchemaManager::ensure_schema(&manager).unwrap();
        assert_eq!(SchemaManager::current_version(&manager).unwrap(), 1);
    }

    #[test]
    fn status_reports_no_pending_after_apply() {
        let manager = ConnectionManager::open_in_memory().unwrap();
        SchemaManager::ensure_schema(&manager).unwrap();
        let status = SchemaManager::status(&manager).unwrap();
        assert!(status.pending.is_empty());
        assert_eq!(status.applied, vec!["0001_init.sql".to_string()]);
    }
}
