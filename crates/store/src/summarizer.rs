//! Expired-session summarization: generate a short natural-language summary
//! for sessions past their TTL, then migrate their turns into cold storage.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rusqlite::params;

use sa_domain::collaborators::{GenerateOptions, LLMClient};
use sa_domain::error::Result;

use crate::connection::ConnectionManager;

const PROMPT_TEMPLATE: &str = "Summarize the following conversation in two or three sentences, \
capturing the main topics discussed and any decisions made. Respond with the summary only.\n\nConversation:\n";

const MAX_SUMMARY_CHARS: usize = 500;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SummarizeReport {
    pub sessions_processed: u64,
    pub messages_archived: u64,
}

pub struct Summarizer {
    conn: Arc<ConnectionManager>,
}

impl Summarizer {
    pub fn new(conn: Arc<ConnectionManager>) -> Self {
        Self { conn }
    }

    /// Generate a summary for a transcript. Returns `None` without calling
    /// the LLM when there is nothing to summarize, and `None` (rather than
    /// propagating) on any LLM failure — an un-summarized session is left
    /// for the next maintenance pass rather than blocking it.
    pub async fn generate_summary(
        &self,
        messages: &[(String, String)],
        llm: &dyn LLMClient,
    ) -> Option<String> {
        if messages.is_empty() {
            return None;
        }

        let transcript: String = messages
            .iter()
            .map(|(role, content)| format!("{role}: {content}\n"))
            .collect();
        let prompt = format!("{PROMPT_TEMPLATE}{transcript}");
        let opts = GenerateOptions {
            temperature: 0.3,
            max_tokens: 256,
            timeout: Duration::from_secs(30),
        };

        match llm.generate(&prompt, opts).await {
            Ok(summary) => {
                let trimmed = summary.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(trimmed.chars().take(MAX_SUMMARY_CHARS).collect())
                }
            }
            Err(error) => {
                tracing::warn!(%error, "session summary generation failed");
                None
            }
        }
    }

    /// Summarize every session whose `expires_at` has passed and which has
    /// no summary yet, archiving its turns into `archived_messages` and
    /// clearing them from the live `messages` table. Sessions whose
    /// transcript is empty or whose summary call fails are skipped and
    /// revisited on the next run rather than aborting the whole pass.
    pub async fn summarize_expired(&self, llm: &dyn LLMClient) -> Result<SummarizeReport> {
        let now = Utc::now().to_rfc3339();

        let candidates: Vec<String> = self.conn.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT session_id FROM sessions WHERE expires_at < ?1 AND summary IS NULL",
            )?;
            let rows = stmt.query_map(params![now], |row| row.get::<_, String>(0))?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row?);
            }
            Ok(out)
        })?;

        let mut report = SummarizeReport::default();

        for session_id in candidates {
            let messages: Vec<(String, String)> = self.conn.with_connection(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT role, content FROM messages WHERE session_id = ?1 ORDER BY turn_id ASC",
                )?;
                let rows = stmt.query_map(params![session_id], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })?;
                let mut out = Vec::new();
                for row in rows {
                    out.push(row?);
                }
                Ok(out)
            })?;

            let Some(summary) = self.generate_summary(&messages, llm).await else {
                continue;
            };

            let archived = self.conn.transaction(|tx| {
                tx.execute(
                    "UPDATE sessions SET summary = ?1 WHERE session_id = ?2",
                    params![summary, session_id],
                )?;
                tx.execute(
                    "INSERT INTO archived_messages (session_id, turn_id, role, content, timestamp)
                     SELECT session_id, turn_id, role, content, timestamp FROM messages
                     WHERE session_id = ?1",
                    params![session_id],
                )?;
                let archived = tx.execute(
                    "DELETE FROM messages WHERE session_id = ?1",
                    params![session_id],
                )?;
                Ok(archived as u64)
            })?;

            report.sessions_processed += 1;
            report.messages_archived += archived;
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaManager;
    use async_trait::async_trait;
    use sa_domain::error::{ErrorKind, MemoryError};
    use chrono::Duration as ChronoDuration;

    struct StubLlm(Result<String>);

    #[async_trait]
    impl LLMClient for StubLlm {
        async fn generate(&self, _prompt: &str, _opts: GenerateOptions) -> Result<String> {
            self.0.clone()
        }
    }

    fn summarizer() -> Summarizer {
        let conn = Arc::new(ConnectionManager::open_in_memory().unwrap());
        SchemaManager::ensure_schema(&conn).unwrap();
        Summarizer::new(conn)
    }

    fn insert_expired_session(summarizer: &Summarizer, session_id: &str) {
        let expired = (Utc::now() - ChronoDuration::days(1)).to_rfc3339();
        let started = (Utc::now() - ChronoDuration::days(2)).to_rfc3339();
        summarizer
            .conn
            .with_connection(|conn| {
                conn.execute(
                    "INSERT INTO sessions (session_id, turn_count, started_at, expires_at)
                     VALUES (?1, 2, ?2, ?3)",
                    params![session_id, started, expired],
                )?;
                conn.execute(
                    "INSERT INTO messages (session_id, turn_id, role, content, timestamp)
                     VALUES (?1, 0, 'user', 'hello', ?2)",
                    params![session_id, started],
                )?;
                conn.execute(
                    "INSERT INTO messages (session_id, turn_id, role, content, timestamp)
                     VALUES (?1, 1, 'assistant', 'hi there', ?2)",
                    params![session_id, started],
                )?;
                Ok(())
            })
            .unwrap();
    }

    #[tokio::test]
    async fn empty_messages_skip_llm_and_return_none() {
        let summarizer = summarizer();
        let llm = StubLlm(Ok("should not be used".into()));
        assert!(summarizer.generate_summary(&[], &llm).await.is_none());
    }

    #[tokio::test]
    async fn llm_failure_returns_none() {
        let summarizer = summarizer();
        let llm = StubLlm(Err(MemoryError::new(ErrorKind::Timeout, "timed out")));
        let messages = vec![("user".to_string(), "hi".to_string())];
        assert!(summarizer.generate_summary(&messages, &llm).await.is_none());
    }

    #[tokio::test]
    async fn summarize_expired_archives_and_clears_messages() {
        let summarizer = summarizer();
        insert_expired_session(&summarizer, "sess-1");
        let llm = StubLlm(Ok("Discussed hello and greetings.".into()));

        let report = summarizer.summarize_expired(&llm).await.unwrap();
        assert_eq!(report.sessions_processed, 1);
        assert_eq!(report.messages_archived, 2);

        let remaining: i64 = summarizer
            .conn
            .with_connection(|conn| {
                conn.query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))
                    .map_err(MemoryError::from)
            })
            .unwrap();
        assert_eq!(remaining, 0);

        let archived_count: i64 = summarizer
            .conn
            .with_connection(|conn| {
                conn.query_row("SELECT COUNT(*) FROM archived_messages", [], |row| row.get(0))
                    .map_err(MemoryError::from)
            })
            .unwrap();
        assert_eq!(archived_count, 2);
    }

    #[tokio::test]
    async fn sessions_with_no_messages_are_skipped_not_errored() {
        let summarizer = summarizer();
        let expired = (Utc::now() - ChronoDuration::days(1)).to_rfc3339();
        let started = (Utc::now() - ChronoDuration::days(2)).to_rfc3339();
        summarizer
            .conn
            .with_connection(|conn| {
                conn.execute(
                    "INSERT INTO sessions (session_id, turn_count, started_at, expires_at)
                     VALUES ('empty-sess', 0, ?1, ?2)",
                    params![started, expired],
                )?;
                Ok(())
            })
            .unwrap();

        let llm = StubLlm(Ok("unused".into()));
        let report = summarizer.summarize_expired(&llm).await.unwrap();
        assert_eq!(report.sessions_processed, 0);
        assert_eq!(report.messages_archived, 0);
    }
}
