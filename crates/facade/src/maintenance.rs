//! `MaintenanceJobs`: the periodic garbage-collection sweep over the whole
//! store — sanitize, summarize, dedup, decay, archive/access-pattern
//! cleanup, graph cleanup, and compaction. Grounded on this subsystem's own
//! `scripts/pg_memory_gc.py`-shaped ordered-phase runner: each phase is
//! independently wrapped, a failure is logged into the report rather than
//! aborting the run, and every phase accepts a `dry_run` flag.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use rusqlite::params;
use sha2::{Digest, Sha256};

use mnemo_graph::KnowledgeGraph;
use mnemo_longterm::{Consolidator, LongTermStore};
use mnemo_store::ConnectionManager;
use mnemo_text::TextSanitizer;
use sa_domain::collaborators::GenerateOptions;
use sa_domain::config::{DecayConfig, MaintenanceConfig};
use sa_domain::error::Result;

use crate::credential_rotator::CredentialRotator;

/// One phase's outcome.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct PhaseReport {
    pub phase: String,
    pub examined: u64,
    pub affected: u64,
    pub dry_run: bool,
    pub duration_ms: u64,
}

/// A phase that failed outright rather than merely affecting zero rows.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PhaseError {
    pub phase: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct MaintenanceReport {
    pub phases: Vec<PhaseReport>,
    pub errors: Vec<PhaseError>,
}

impl MaintenanceReport {
    pub fn ok(&self) -> bool {
        self.errors.is_empty()
    }
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct CheckReport {
    pub table_counts: HashMap<String, u64>,
    pub graph_entities: u64,
    pub graph_relations: u64,
}

const MANAGED_TABLES: &[&str] = &[
    "sessions",
    "messages",
    "archived_messages",
    "interaction_logs",
    "entities",
    "relations",
    "memories",
    "memory_access_patterns",
];

pub struct MaintenanceJobs<'a> {
    conn: &'a ConnectionManager,
    graph: &'a KnowledgeGraph,
    long_term: &'a LongTermStore,
    sanitizer: &'a TextSanitizer,
    config: &'a MaintenanceConfig,
    decay: &'a DecayConfig,
}

impl<'a> MaintenanceJobs<'a> {
    pub fn new(
        conn: &'a ConnectionManager,
        graph: &'a KnowledgeGraph,
        long_term: &'a LongTermStore,
        sanitizer: &'a TextSanitizer,
        config: &'a MaintenanceConfig,
        decay: &'a DecayConfig,
    ) -> Self {
        Self {
            conn,
            graph,
            long_term,
            sanitizer,
            config,
            decay,
        }
    }

    /// Row counts for every managed table, plus the in-memory graph's
    /// entity/relation counts.
    pub fn run_check(&self) -> Result<CheckReport> {
        let mut table_counts = HashMap::new();
        for table in MANAGED_TABLES {
            let count: i64 = self.conn.with_connection(|conn| {
                conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
                    row.get(0)
                })
                .map_err(sa_domain::error::MemoryError::from)
            })?;
            table_counts.insert((*table).to_string(), count as u64);
        }
        let stats = self.graph.stats();
        Ok(CheckReport {
            table_counts,
            graph_entities: stats.entity_count as u64,
            graph_relations: stats.relation_count as u64,
        })
    }

    /// Run phases 1-7 in sequence, each independently wrapped so a failure
    /// in one does not prevent the rest from running. Phase 8 (compaction)
    /// runs afterward, outside this report's phase list's transaction
    /// scope, and is skipped entirely in `dry_run`.
    pub async fn run_full(
        &self,
        dry_run: bool,
        rotator: Option<&CredentialRotator>,
    ) -> MaintenanceReport {
        let mut report = MaintenanceReport::default();

        self.run_phase(&mut report, "sanitize", dry_run, || self.phase_sanitize(dry_run));

        let summarize = self.phase_summarize(dry_run, rotator).await;
        self.record_phase(&mut report, "summarize", dry_run, summarize);

        self.run_phase(&mut report, "hash_dedup", dry_run, || self.phase_hash_dedup(dry_run));
        self.run_phase(&mut report, "decay_sweep", dry_run, || self.phase_decay_sweep(dry_run));
        self.run_phase(&mut report, "archive_cleanup", dry_run, || {
            self.phase_archive_cleanup(dry_run)
        });
        self.run_phase(&mut report, "access_pattern_cleanup", dry_run, || {
            self.phase_access_pattern_cleanup(dry_run)
        });
        self.run_phase(&mut report, "graph_cleanup", dry_run, || {
            self.phase_graph_cleanup(dry_run)
        });

        if !dry_run {
            self.run_phase(&mut report, "compact", dry_run, || self.phase_compact());
        }

        report
    }

    fn run_phase(
        &self,
        report: &mut MaintenanceReport,
        phase: &str,
        dry_run: bool,
        f: impl FnOnce() -> Result<u64>,
    ) {
        let start = Instant::now();
        let outcome = f();
        self.finish_phase(report, phase, dry_run, start, outcome);
    }

    fn record_phase(
        &self,
        report: &mut MaintenanceReport,
        phase: &str,
        dry_run: bool,
        outcome: Result<u64>,
    ) {
        self.finish_phase(report, phase, dry_run, Instant::now(), outcome);
    }

    fn finish_phase(
        &self,
        report: &mut MaintenanceReport,
        phase: &str,
        dry_run: bool,
        start: Instant,
        outcome: Result<u64>,
    ) {
        let duration_ms = start.elapsed().as_millis() as u64;
        match outcome {
            Ok(affected) => {
                sa_domain::TraceEvent::MaintenancePhaseCompleted {
                    phase: phase.to_string(),
                    dry_run,
                    duration_ms,
                }
                .emit();
                report.phases.push(PhaseReport {
                    phase: phase.to_string(),
                    examined: affected,
                    affected,
                    dry_run,
                    duration_ms,
                });
            }
            Err(error) => {
                sa_domain::TraceEvent::MaintenancePhaseFailed {
                    phase: phase.to_string(),
                    error: error.to_string(),
                }
                .emit();
                report.errors.push(PhaseError {
                    phase: phase.to_string(),
                    error: error.to_string(),
                });
            }
        }
    }

    fn phase_sanitize(&self, dry_run: bool) -> Result<u64> {
        let rows: Vec<(i64, String, String)> = self.conn.with_connection(|conn| {
            let mut stmt = conn.prepare("SELECT id, 'message', content FROM messages
                UNION ALL SELECT rowid, 'memory', content FROM memories")?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?))
            })?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row?);
            }
            Ok(out)
        })?;

        let mut affected = 0u64;
        for (id, table, content) in rows {
            let sanitized = self.sanitizer.sanitize(&content);
            if sanitized != content {
                affected += 1;
                if !dry_run {
                    self.conn.with_connection(|conn| {
                        let sql = if table == "message" {
                            "UPDATE messages SET content = ?1 WHERE id = ?2"
                        } else {
                            "UPDATE memories SET content = ?1 WHERE rowid = ?2"
                        };
                        conn.execute(sql, params![sanitized, id])?;
                        Ok(())
                    })?;
                }
            }
        }
        Ok(affected)
    }

    async fn phase_summarize(&self, dry_run: bool, rotator: Option<&CredentialRotator>) -> Result<u64> {
        let Some(rotator) = rotator else {
            return Ok(0);
        };

        let threshold = self.config.summarize_min_chars as i64;
        let candidates: Vec<(String, String)> = self.conn.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT uuid, content FROM memories WHERE LENGTH(content) > ?1",
            )?;
            let rows = stmt.query_map(params![threshold], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row?);
            }
            Ok(out)
        })?;

        if candidates.is_empty() {
            return Ok(0);
        }

        let permits = self.config.parallel_workers.max(1);
        let semaphore = Arc::new(tokio::sync::Semaphore::new(permits));
        let retry_attempts = self.config.retry_attempts;
        let backoff_base = self.config.retry_backoff_base_secs;

        let tasks = candidates.into_iter().map(|(uuid, content)| {
            let semaphore = semaphore.clone();
            async move {
                let _permit = semaphore.acquire().await.expect("semaphore not closed");
                let prompt = format!(
                    "Summarize the following note in one or two sentences, preserving the key fact:\n\n{content}"
                );
                let mut last_err = None;
                for attempt in 0..=retry_attempts {
                    match rotator
                        .generate(
                            &prompt,
                            GenerateOptions {
                                temperature: 0.2,
                                max_tokens: 256,
                                timeout: Duration::from_secs(30),
                            },
                        )
                        .await
                    {
                        Ok(summary) => return Some((uuid, summary)),
                        Err(error) => {
                            last_err = Some(error);
                            if attempt < retry_attempts {
                                tokio::time::sleep(Duration::from_secs(
                                    (attempt as u64 + 1) * backoff_base,
                                ))
                                .await;
                            }
                        }
                    }
                }
                tracing::warn!(uuid, error = ?last_err, "maintenance summarize exhausted retries");
                None
            }
        });

        let results: Vec<Option<(String, String)>> = futures_util::future::join_all(tasks).await;
        let summarized: Vec<(String, String)> = results.into_iter().flatten().collect();

        if !dry_run {
            for (uuid, summary) in &summarized {
                self.conn.with_connection(|conn| {
                    conn.execute(
                        "UPDATE memories SET content = ?1 WHERE uuid = ?2",
                        params![summary, uuid],
                    )?;
                    Ok(())
                })?;
            }
        }

        Ok(summarized.len() as u64)
    }

    fn phase_hash_dedup(&self, dry_run: bool) -> Result<u64> {
        let hash_chars = self.config.dedup_hash_chars;
        let rows: Vec<(String, String, f64)> = self.conn.with_connection(|conn| {
            let mut stmt = conn.prepare("SELECT uuid, content, importance FROM memories")?;
            let rows = stmt.query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, f64>(2)?,
                ))
            })?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row?);
            }
            Ok(out)
        })?;

        let mut groups: HashMap<String, Vec<(String, f64)>> = HashMap::new();
        for (uuid, content, importance) in rows {
            let normalized: String = content.trim().to_lowercase().chars().take(hash_chars).collect();
            let mut hasher = Sha256::new();
            hasher.update(normalized.as_bytes());
            let digest = hex::encode(hasher.finalize());
            groups.entry(digest).or_default().push((uuid, importance));
        }

        let mut to_delete = Vec::new();
        for members in groups.values() {
            if members.len() < 2 {
                continue;
            }
            let keep = members
                .iter()
                .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
                .map(|(uuid, _)| uuid.clone());
            for (uuid, _) in members {
                if Some(uuid) != keep.as_ref() {
                    to_delete.push(uuid.clone());
                }
            }
        }

        if !to_delete.is_empty() && !dry_run {
            self.long_term.delete(&to_delete)?;
        }
        Ok(to_delete.len() as u64)
    }

    fn phase_decay_sweep(&self, dry_run: bool) -> Result<u64> {
        if dry_run {
            let memories = self.long_term.all_memories()?;
            let calculator = mnemo_longterm::DecayCalculator::new(*self.decay);
            let now = Utc::now();
            let deletable = memories
                .iter()
                .filter(|m| !m.preserved)
                .filter(|m| {
                    let input = mnemo_longterm::DecayInput {
                        importance: m.importance,
                        created_at: m.created_at,
                        access_count: m.access_count,
                        connection_count: 0,
                        last_accessed: m.last_accessed,
                        memory_type: m.memory_type,
                    };
                    let decayed = calculator.calculate(&input, now);
                    decayed < self.decay.decay_delete_threshold && m.repetitions < 2 && m.access_count < 3
                })
                .count();
            return Ok(deletable as u64);
        }

        let consolidator = Consolidator::new(self.long_term, *self.decay);
        let result = consolidator.run();
        Ok(result.deleted)
    }

    fn phase_archive_cleanup(&self, dry_run: bool) -> Result<u64> {
        let cutoff = (Utc::now() - chrono::Duration::days(self.config.archive_retention_days)).to_rfc3339();
        self.conn.with_connection(|conn| {
            if dry_run {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM archived_messages WHERE timestamp < ?1",
                    params![cutoff],
                    |row| row.get(0),
                )?;
                Ok(count as u64)
            } else {
                let count = conn.execute(
                    "DELETE FROM archived_messages WHERE timestamp < ?1",
                    params![cutoff],
                )?;
                Ok(count as u64)
            }
        })
    }

    fn phase_access_pattern_cleanup(&self, dry_run: bool) -> Result<u64> {
        let cutoff =
            (Utc::now() - chrono::Duration::days(self.config.access_pattern_retention_days)).to_rfc3339();
        self.conn.with_connection(|conn| {
            if dry_run {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM memory_access_patterns WHERE accessed_at < ?1",
                    params![cutoff],
                    |row| row.get(0),
                )?;
                Ok(count as u64)
            } else {
                let count = conn.execute(
                    "DELETE FROM memory_access_patterns WHERE accessed_at < ?1",
                    params![cutoff],
                )?;
                Ok(count as u64)
            }
        })
    }

    fn phase_graph_cleanup(&self, dry_run: bool) -> Result<u64> {
        let age = chrono::Duration::days(self.config.orphan_entity_age_days);
        let stale_entities = self
            .graph
            .entities_older_than_with_mentions_below(age, self.config.orphan_entity_min_mentions);
        let weak_count = self.graph.weak_relation_count(self.config.min_relation_weight);
        let orphan_count = self.graph.orphan_relation_count();

        if dry_run {
            return Ok(stale_entities.len() as u64 + weak_count + orphan_count);
        }

        for entity_id in &stale_entities {
            self.graph.remove_entity(entity_id);
        }
        let removed_weak = self.graph.remove_weak_relations(self.config.min_relation_weight);
        let removed_orphan = self.graph.remove_orphan_relations();
        self.graph.save_if_configured()?;

        Ok(stale_entities.len() as u64 + removed_weak + removed_orphan)
    }

    fn phase_compact(&self) -> Result<u64> {
        self.conn.with_connection(|conn| {
            conn.execute_batch("VACUUM")?;
            Ok(0)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mnemo_store::SchemaManager;
    use sa_domain::config::LongTermConfig;

    fn setup() -> (ConnectionManager, KnowledgeGraph, TextSanitizer) {
        let conn = ConnectionManager::open_in_memory().unwrap();
        SchemaManager::ensure_schema(&conn).unwrap();
        (conn, KnowledgeGraph::new(), TextSanitizer::new())
    }

    #[tokio::test]
    async fn check_reports_zero_counts_on_empty_store() {
        let (conn, graph, sanitizer) = setup();
        let long_term = LongTermStore::new(Arc::new(ConnectionManager::open_in_memory().unwrap()), LongTermConfig::default());
        let maint_config = MaintenanceConfig::default();
        let decay = DecayConfig::default();
        let jobs = MaintenanceJobs::new(&conn, &graph, &long_term, &sanitizer, &maint_config, &decay);
        let report = jobs.run_check().unwrap();
        assert_eq!(report.table_counts["sessions"], 0);
        assert_eq!(report.graph_entities, 0);
    }

    #[tokio::test]
    async fn dedup_keeps_highest_importance_duplicate() {
        let conn = Arc::new(ConnectionManager::open_in_memory().unwrap());
        SchemaManager::ensure_schema(&conn).unwrap();
        let now = Utc::now().to_rfc3339();
        conn.with_connection(|c| {
            c.execute(
                "INSERT INTO memories (uuid, content, memory_type, importance, repetitions, access_count, created_at, last_accessed, preserved, embedding)
                 VALUES ('a', 'the user likes rust', 'fact', 0.4, 1, 0, ?1, ?1, 0, X'')",
                params![now],
            )?;
            c.execute(
                "INSERT INTO memories (uuid, content, memory_type, importance, repetitions, access_count, created_at, last_accessed, preserved, embedding)
                 VALUES ('b', 'The User Likes Rust', 'fact', 0.9, 1, 0, ?1, ?1, 0, X'')",
                params![now],
            )?;
            Ok(())
        }).unwrap();

        let long_term = LongTermStore::new(conn.clone(), LongTermConfig::default());
        let graph = KnowledgeGraph::new();
        let sanitizer = TextSanitizer::new();
        let maint_config = MaintenanceConfig::default();
        let decay = DecayConfig::default();
        let jobs = MaintenanceJobs::new(&conn, &graph, &long_term, &sanitizer, &maint_config, &decay);

        let affected = jobs.phase_hash_dedup(false).unwrap();
        assert_eq!(affected, 1);

        let remaining = long_term.all_memories().unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].uuid, "b");
    }

    #[tokio::test]
    async fn dry_run_leaves_rows_untouched() {
        let conn = Arc::new(ConnectionManager::open_in_memory().unwrap());
        SchemaManager::ensure_schema(&conn).unwrap();
        let old = (Utc::now() - chrono::Duration::days(200)).to_rfc3339();
        conn.with_connection(|c| {
            c.execute(
                "INSERT INTO archived_messages (session_id, turn_id, role, content, timestamp)
                 VALUES ('s1', 0, 'user', 'hi', ?1)",
                params![old],
            )?;
            Ok(())
        }).unwrap();

        let long_term = LongTermStore::new(conn.clone(), LongTermConfig::default());
        let graph = KnowledgeGraph::new();
        let sanitizer = TextSanitizer::new();
        let maint_config = MaintenanceConfig::default();
        let decay = DecayConfig::default();
        let jobs = MaintenanceJobs::new(&conn, &graph, &long_term, &sanitizer, &maint_config, &decay);

        let affected = jobs.phase_archive_cleanup(true).unwrap();
        assert_eq!(affected, 1);

        let remaining: i64 = conn
            .with_connection(|c| {
                c.query_row("SELECT COUNT(*) FROM archived_messages", [], |row| row.get(0))
                    .map_err(sa_domain::error::MemoryError::from)
            })
            .unwrap();
        assert_eq!(remaining, 1, "dry run must not delete rows");
    }
}
