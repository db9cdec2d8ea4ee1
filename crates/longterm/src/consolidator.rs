//! Periodic re-scoring and pruning of long-term memories.
//!
//! Each of the five stages below is wrapped independently: a failure in one
//! stage is recorded in the report's `errors` and does not prevent the
//! remaining stages from running, stricter than a single outer try/except.

use chrono::Utc;

use sa_domain::config::DecayConfig;

use crate::decay::{DecayCalculator, DecayInput};
use crate::store::{LongTermStore, MemoryMetadataUpdate};

#[derive(Debug, Clone, Default)]
pub struct ConsolidationReport {
    pub checked: u64,
    pub preserved: u64,
    pub deleted: u64,
    pub surviving_updated: u64,
    pub errors: Vec<String>,
}

pub struct Consolidator<'a> {
    store: &'a LongTermStore,
    decay: DecayCalculator,
    preserve_repetitions: u32,
    decay_delete_threshold: f64,
}

impl<'a> Consolidator<'a> {
    pub fn new(store: &'a LongTermStore, decay_config: DecayConfig) -> Self {
        let preserve_repetitions = decay_config.preserve_repetitions;
        let decay_delete_threshold = decay_config.decay_delete_threshold;
        Self {
            store,
            decay: DecayCalculator::new(decay_config),
            preserve_repetitions,
            decay_delete_threshold,
        }
    }

    pub fn run(&self) -> ConsolidationReport {
        let mut report = ConsolidationReport::default();

        let memories = match self.store.all_memories() {
            Ok(m) => m,
            Err(e) => {
                report.errors.push(format!("stage 1 (stream memories): {e}"));
                return report;
            }
        };
        report.checked = memories.len() as u64;

        let mut preserve_candidates = Vec::new();
        let mut evaluation_batch = Vec::new();
        for memory in &memories {
            if memory.preserved {
                continue;
            }
            if memory.repetitions >= self.preserve_repetitions {
                preserve_candidates.push(memory.uuid.clone());
            } else {
                evaluation_batch.push(memory.clone());
            }
        }

        if !preserve_candidates.is_empty() {
            let updates = vec![
                MemoryMetadataUpdate {
                    preserved: Some(true),
                    ..Default::default()
                };
                preserve_candidates.len()
            ];
            match self.store.batch_update_metadata(&preserve_candidates, &updates) {
                Ok(n) => report.preserved = n,
                Err(e) => report.errors.push(format!("stage 3 (mark preserved): {e}")),
            }
        }

        let now = Utc::now();
        let decayed: Vec<(String, f64, &sa_domain::model::Memory)> = evaluation_batch
            .iter()
            .map(|m| {
                let input = DecayInput {
                    importance: m.importance,
                    created_at: m.created_at,
                    access_count: m.access_count,
                    connection_count: 0,
                    last_accessed: m.last_accessed,
                    memory_type: m.memory_type,
                };
                (m.uuid.clone(), self.decay.calculate(&input, now), m)
            })
            .collect();

        let mut deletable = Vec::new();
        let mut surviving = Vec::new();
        for (uuid, decayed_importance, memory) in &decayed {
            if *decayed_importance < self.decay_delete_threshold
                && memory.repetitions < 2
                && memory.access_count < 3
            {
                deletable.push(uuid.clone());
            } else {
                surviving.push((uuid.clone(), *decayed_importance));
            }
        }

        if !deletable.is_empty() {
            match self.store.delete(&deletable) {
                Ok(n) => report.deleted = n,
                Err(e) => report.errors.push(format!("stage 5a (delete): {e}")),
            }
        }

        if !surviving.is_empty() {
            let ids: Vec<String> = surviving.iter().map(|(id, _)| id.clone()).collect();
            let updates: Vec<MemoryMetadataUpdate> = surviving
                .iter()
                .map(|(_, decayed_importance)| MemoryMetadataUpdate {
                    decayed_importance: Some(*decayed_importance),
                    ..Default::default()
                })
                .collect();
            match self.store.batch_update_metadata(&ids, &updates) {
                Ok(n) => report.surviving_updated = n,
                Err(e) => report.errors.push(format!("stage 5b (update survivors): {e}")),
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mnemo_store::{ConnectionManager, SchemaManager};
    use sa_domain::collaborators::EmbeddingClient;
    use sa_domain::config::LongTermConfig;
    use sa_domain::error::Result;
    use sa_domain::model::MemoryType;
    use std::sync::Arc;

    struct StubEmbedder;

    #[async_trait]
    impl EmbeddingClient for StubEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![1.0, 0.0])
        }
        fn dimensions(&self) -> usize {
            2
        }
    }

    fn store() -> LongTermStore {
        let conn = Arc::new(ConnectionManager::open_in_memory().unwrap());
        SchemaManager::ensure_schema(&conn).unwrap();
        LongTermStore::new(conn, LongTermConfig::default())
    }

    #[tokio::test]
    async fn low_importance_old_memory_is_deleted() {
        let store = store();
        let old = (Utc::now() - chrono::Duration::days(400)).to_rfc3339();
        store
            .connection()
            .with_connection(|conn| {
                conn.execute(
                    "INSERT INTO memories (uuid, content, memory_type, importance, repetitions,
                        access_count, created_at, last_accessed, preserved, embedding)
                     VALUES ('old-1', 'stale note', 'event', 0.2, 1, 0, ?1, ?1, 0, X'')",
                    rusqlite::params![old],
                )?;
                Ok(())
            })
            .unwrap();

        let consolidator = Consolidator::new(&store, DecayConfig::default());
        let report = consolidator.run();
        assert_eq!(report.checked, 1);
        assert!(report.errors.is_empty());
        assert_eq!(report.deleted, 1);
    }

    #[tokio::test]
    async fn highly_repeated_memory_is_preserved_not_evaluated() {
        let store = store();
        let embedder = StubEmbedder;
        let uuid = store
            .add(&embedder, "repeated fact about the user", MemoryType::Fact, 0.5, false)
            .await
            .unwrap()
            .unwrap();

        // simulate repeated promotions by re-adding the same content
        for _ in 0..5 {
            store
                .add(&embedder, "repeated fact about the user", MemoryType::Fact, 0.5, false)
                .await
                .unwrap();
        }

        let memory = store
            .all_memories()
            .unwrap()
            .into_iter()
            .find(|m| m.uuid == uuid)
            .unwrap();
        assert!(memory.repetitions >= 5);

        let consolidator = Consolidator::new(&store, DecayConfig::default());
        let report = consolidator.run();
        assert_eq!(report.preserved, 1);
        assert_eq!(report.deleted, 0);
    }
}
