//! `SessionRepository`: the active-session half of the short-term archive.
//! Owns no connection itself — borrows a `ConnectionManager` — so the
//! facade can share one handle across repositories.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use sa_domain::config::BudgetConfig;
use sa_domain::error::{ErrorKind, MemoryError, Result};
use sa_domain::model::{Role, Session, SessionStatus, Turn};

use crate::connection::ConnectionManager;
use crate::transcript_index::{SearchHit, TranscriptIndex};

pub struct SessionDetail {
    pub session: Session,
    pub turns: Vec<Turn>,
}

pub struct SessionRepository {
    conn: Arc<ConnectionManager>,
    index: TranscriptIndex,
}

impl SessionRepository {
    /// Construct a repository over an already-migrated connection, rebuilding
    /// the in-memory search index from the `messages` table.
    pub fn new(conn: Arc<ConnectionManager>) -> Result<Self> {
        let index = TranscriptIndex::new();
        conn.with_connection(|c| {
            let mut stmt = c.prepare("SELECT session_id, content FROM messages")?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;
            for row in rows {
                let (session_id, content) = row?;
                index.index_content(&session_id, &content);
            }
            Ok(())
        })?;
        Ok(Self { conn, index })
    }

    /// Append a turn, assigning the next monotonic turn index for the
    /// session atomically.
    pub fn append_turn(
        &self,
        session_id: &str,
        role: Role,
        content: &str,
        timestamp: DateTime<Utc>,
        emotion: Option<&str>,
    ) -> Result<u64> {
        let turn_index = self.conn.transaction(|tx| {
            let next: i64 = tx
                .query_row(
                    "SELECT COALESCE(MAX(turn_id), -1) + 1 FROM messages WHERE session_id = ?1",
                    params![session_id],
                    |row| row.get(0),
                )?;
            tx.execute(
                "INSERT INTO messages (session_id, turn_id, role, content, timestamp, emotional_context)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    session_id,
                    next,
                    role.to_string(),
                    content,
                    timestamp.to_rfc3339(),
                    emotion,
                ],
            )?;
            tx.execute(
                "UPDATE sessions SET turn_count = turn_count + 1 WHERE session_id = ?1",
                params![session_id],
            )?;
            Ok(next as u64)
        })?;

        self.index.index_content(session_id, content);
        Ok(turn_index)
    }

    /// Write a session header and all its turns in one transaction. Failure
    /// leaves no partial session.
    pub fn save_session(&self, session: &Session, turns: &[Turn]) -> Result<()> {
        self.conn.transaction(|tx| {
            tx.execute(
                "INSERT INTO sessions
                    (session_id, summary, key_topics, emotional_tone, turn_count, started_at, ended_at, expires_at, messages_json)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, NULL)
                 ON CONFLICT(session_id) DO UPDATE SET
                    summary = excluded.summary,
                    key_topics = excluded.key_topics,
                    emotional_tone = excluded.emotional_tone,
                    turn_count = excluded.turn_count,
                    started_at = excluded.started_at,
                    ended_at = excluded.ended_at,
                    expires_at = excluded.expires_at",
                params![
                    session.id,
                    session.summary,
                    serde_json::to_string(&session.key_topics).unwrap_or_else(|_| "[]".into()),
                    session.emotional_tone,
                    session.turn_count as i64,
                    session.started_at.to_rfc3339(),
                    session.ended_at.map(|t| t.to_rfc3339()),
                    session.expires_at.to_rfc3339(),
                ],
            )?;

            for turn in turns {
                tx.execute(
                    "INSERT INTO messages (session_id, turn_id, role, content, timestamp, emotional_context)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        turn.session_id,
                        turn.turn_index as i64,
                        turn.role.to_string(),
                        turn.content,
                        turn.timestamp.to_rfc3339(),
                        turn.emotion,
                    ],
                )?;
            }
            Ok(())
        })?;

        for turn in turns {
            self.index.index_content(&session.id, &turn.content);
        }
        Ok(())
    }

    pub fn session_messages(&self, session_id: &str) -> Result<Vec<Turn>> {
        self.conn.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT session_id, turn_id, role, content, timestamp, emotional_context
                 FROM messages WHERE session_id = ?1 ORDER BY turn_id ASC",
            )?;
            let rows = stmt.query_map(params![session_id], row_to_turn)?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row?);
            }
            Ok(out)
        })
    }

    /// Falls back to the `messages` table when the session header's
    /// `messages_json` blob is absent (the normal case for active sessions).
    pub fn session_detail(&self, session_id: &str) -> Result<Option<SessionDetail>> {
        let session = self.conn.with_connection(|conn| {
            conn.query_row(
                "SELECT session_id, summary, key_topics, emotional_tone, turn_count,
                        started_at, ended_at, expires_at
                 FROM sessions WHERE session_id = ?1",
                params![session_id],
                row_to_session,
            )
            .optional()
        })?;

        let Some(session) = session else {
            return Ok(None);
        };

        let turns = self.session_messages(session_id)?;
        Ok(Some(SessionDetail { session, turns }))
    }

    /// Search sessions by topic via the in-memory reverse index, returning
    /// size-bounded serialized snippets.
    pub fn search_by_topic(&self, query: &str, max_tokens: usize, budget: &BudgetConfig) -> Vec<String> {
        let hits: Vec<SearchHit> = self.index.search(query);
        bound_by_budget(
            hits.into_iter()
                .map(|h| format!("[{}] ({} matches) {}", h.session_id, h.match_count, h.preview))
                .collect(),
            max_tokens,
            budget,
        )
    }

    pub fn sessions_by_date(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        limit: usize,
        max_tokens: usize,
        budget: &BudgetConfig,
    ) -> Result<Vec<String>> {
        let rows: Vec<String> = self.conn.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT session_id, summary, started_at FROM sessions
                 WHERE started_at >= ?1 AND started_at <= ?2
                 ORDER BY started_at DESC LIMIT ?3",
            )?;
            let result = stmt.query_map(
                params![from.to_rfc3339(), to.to_rfc3339(), limit as i64],
                |row| {
                    let id: String = row.get(0)?;
                    let summary: Option<String> = row.get(1)?;
                    let started_at: String = row.get(2)?;
                    Ok(format!(
                        "[{id}] {started_at}: {}",
                        summary.unwrap_or_else(|| "(no summary)".into())
                    ))
                },
            )?;
            let mut out = Vec::new();
            for row in result {
                out.push(row?);
            }
            Ok(out)
        })?;
        Ok(bound_by_budget(rows, max_tokens, budget))
    }

    pub fn recent_summaries(&self, limit: usize, max_tokens: usize, budget: &BudgetConfig) -> Result<Vec<String>> {
        let rows: Vec<String> = self.conn.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT session_id, summary FROM sessions
                 WHERE summary IS NOT NULL
                 ORDER BY started_at DESC LIMIT ?1",
            )?;
            let result = stmt.query_map(params![limit as i64], |row| {
                let id: String = row.get(0)?;
                let summary: String = row.get(1)?;
                Ok(format!("[{id}] {summary}"))
            })?;
            let mut out = Vec::new();
            for row in result {
                out.push(row?);
            }
            Ok(out)
        })?;
        Ok(bound_by_budget(rows, max_tokens, budget))
    }

    pub fn time_since_last_session(&self) -> Result<Option<chrono::Duration>> {
        let last: Option<String> = self.conn.with_connection(|conn| {
            conn.query_row(
                "SELECT started_at FROM sessions ORDER BY started_at DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()
        })?;

        match last {
            None => Ok(None),
            Some(raw) => {
                let started = DateTime::parse_from_rfc3339(&raw)
                    .map_err(|e| MemoryError::new(ErrorKind::BadFormat, e.to_string()))?
                    .with_timezone(&Utc);
                Ok(Some(Utc::now().signed_duration_since(started)))
            }
        }
    }
}

fn row_to_turn(row: &rusqlite::Row<'_>) -> rusqlite::Result<Turn> {
    let role_str: String = row.get(2)?;
    let ts_str: String = row.get(4)?;
    Ok(Turn {
        session_id: row.get(0)?,
        turn_index: {
            let v: i64 = row.get(1)?;
            v as u64
        },
        role: role_str.parse().unwrap_or(Role::User),
        content: row.get(3)?,
        timestamp: DateTime::parse_from_rfc3339(&ts_str)
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        emotion: row.get(5)?,
    })
}

fn row_to_session(row: &rusqlite::Row<'_>) -> rusqlite::Result<Session> {
    let key_topics_json: String = row.get(2)?;
    let started_at: String = row.get(5)?;
    let ended_at: Option<String> = row.get(6)?;
    let expires_at: String = row.get(7)?;
    let summary: Option<String> = row.get(1)?;

    let status = match (&ended_at, &summary) {
        (_, Some(_)) => SessionStatus::Summarized,
        (Some(_), None) => SessionStatus::Closed,
        (None, None) => SessionStatus::Open,
    };

    Ok(Session {
        id: row.get(0)?,
        summary,
        key_topics: serde_json::from_str(&key_topics_json).unwrap_or_default(),
        emotional_tone: row.get(3)?,
        turn_count: {
            let v: i64 = row.get(4)?;
            v as u64
        },
        started_at: DateTime::parse_from_rfc3339(&started_at)
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        ended_at: ended_at.and_then(|s| {
            DateTime::parse_from_rfc3339(&s)
                .ok()
                .map(|t| t.with_timezone(&Utc))
        }),
        expires_at: DateTime::parse_from_rfc3339(&expires_at)
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        status,
    })
}

/// Accumulate whole items until appending the next one would exceed the
/// character budget implied by `max_tokens` (`chars_per_token` scaled).
fn bound_by_budget(items: Vec<String>, max_tokens: usize, budget: &BudgetConfig) -> Vec<String> {
    let char_budget = budget.chars_for(max_tokens);
    let mut out = Vec::new();
    let mut used = 0usize;
    for item in items {
        let len = item.chars().count();
        if used + len > char_budget && !out.is_empty() {
            break;
        }
        used += len;
        out.push(item);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaManager;
    use sa_domain::model::SessionStatus;

    fn repo() -> SessionRepository {
        let conn = Arc::new(ConnectionManager::open_in_memory().unwrap());
        SchemaManager::ensure_schema(&conn).unwrap();
        SessionRepository::new(conn).unwrap()
    }

    fn new_session(id: &str) -> Session {
        let now = Utc::now();
        Session {
            id: id.to_string(),
            started_at: now,
            ended_at: None,
            expires_at: now + chrono::Duration::hours(1),
            turn_count: 0,
            key_topics: vec!["rust".into()],
            emotional_tone: None,
            summary: None,
            status: SessionStatus::Open,
        }
    }

    #[test]
    fn append_turn_assigns_monotonic_index() {
        let repo = repo();
        repo.save_session(&new_session("s1"), &[]).unwrap();
        let i0 = repo.append_turn("s1", Role::User, "hello", Utc::now(), None).unwrap();
        let i1 = repo.append_turn("s1", Role::Assistant, "hi", Utc::now(), None).unwrap();
        assert_eq!(i0, 0);
        assert_eq!(i1, 1);
    }

    #[test]
    fn session_messages_are_ordered() {
        let repo = repo();
        repo.save_session(&new_session("s1"), &[]).unwrap();
        repo.append_turn("s1", Role::User, "first", Utc::now(), None).unwrap();
        repo.append_turn("s1", Role::Assistant, "second", Utc::now(), None).unwrap();
        let turns = repo.session_messages("s1").unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].content, "first");
        assert_eq!(turns[1].content, "second");
    }

    #[test]
    fn session_detail_falls_back_to_messages_table() {
        let repo = repo();
        repo.save_session(&new_session("s1"), &[]).unwrap();
        repo.append_turn("s1", Role::User, "hello there", Utc::now(), None).unwrap();
        let detail = repo.session_detail("s1").unwrap().unwrap();
        assert_eq!(detail.turns.len(), 1);
        assert_eq!(detail.session.id, "s1");
    }

    #[test]
    fn search_by_topic_finds_indexed_turns() {
        let repo = repo();
        repo.save_session(&new_session("s1"), &[]).unwrap();
        repo.append_turn("s1", Role::User, "I love Rust programming", Utc::now(), None).unwrap();
        let budget = BudgetConfig::default();
        let hits = repo.search_by_topic("rust", 1000, &budget);
        assert_eq!(hits.len(), 1);
        assert!(hits[0].contains("s1"));
    }

    #[test]
    fn time_since_last_session_is_none_when_empty() {
        let repo = repo();
        assert!(repo.time_since_last_session().unwrap().is_none());
    }

    #[test]
    fn save_session_rejects_no_partial_writes_on_conflict_turn() {
        let repo = repo();
        repo.save_session(&new_session("s1"), &[]).unwrap();
        // saving again with the same id updates rather than duplicating
        repo.save_session(&new_session("s1"), &[]).unwrap();
        let turns = repo.session_messages("s1").unwrap();
        assert_eq!(turns.len(), 0);
    }
}
