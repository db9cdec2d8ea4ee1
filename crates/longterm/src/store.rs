//! Embedded long-term memory store: promotion, embedding search, and
//! metadata maintenance over the `memories` table.

use std::sync::Arc;

use chrono::Utc;
use rusqlite::params;
use uuid::Uuid;

use mnemo_store::ConnectionManager;
use sa_domain::collaborators::EmbeddingClient;
use sa_domain::config::LongTermConfig;
use sa_domain::error::{ErrorKind, MemoryError, Result};
use sa_domain::model::{Memory, MemoryType};

/// Per-field metadata update for `batch_update_metadata`. Every field is
/// optional so callers only touch the columns they mean to change, matching
/// the opaque `update_metadata(ids, metadatas)` vector-store contract.
#[derive(Debug, Clone, Default)]
pub struct MemoryMetadataUpdate {
    pub importance: Option<f64>,
    pub decayed_importance: Option<f64>,
    pub preserved: Option<bool>,
    pub access_count: Option<u64>,
}

pub struct LongTermStore {
    conn: Arc<ConnectionManager>,
    config: LongTermConfig,
}

impl LongTermStore {
    pub fn new(conn: Arc<ConnectionManager>, config: LongTermConfig) -> Self {
        Self { conn, config }
    }

    /// Shared handle to the underlying connection, for callers (maintenance,
    /// the facade) that need to compose additional queries in the same
    /// transaction scope.
    pub fn connection(&self) -> &Arc<ConnectionManager> {
        &self.conn
    }

    fn meets_promotion_criteria(&self, content: &str, importance: f64) -> bool {
        let trimmed = content.trim();
        trimmed.chars().count() >= self.config.min_content_len
            && !trimmed.is_empty()
            && importance >= self.config.min_importance
    }

    /// Admit `content` into long-term storage. Returns `Ok(None)` when the
    /// content fails the promotion criteria and `force` is false. A
    /// near-duplicate (cosine similarity ≥ `dedup_similarity` against an
    /// existing memory) is merged instead of inserted: repetitions
    /// increment, importance takes the max of old and new, and
    /// `last_accessed` refreshes.
    pub async fn add(
        &self,
        embedder: &dyn EmbeddingClient,
        content: &str,
        memory_type: MemoryType,
        importance: f64,
        force: bool,
    ) -> Result<Option<String>> {
        if !force && !self.meets_promotion_criteria(content, importance) {
            return Ok(None);
        }

        let embedding = embedder.embed(content).await?;
        let candidates = self.all_embeddings()?;

        for (uuid, existing_importance, existing_embedding) in &candidates {
            let similarity = cosine_similarity(&embedding, existing_embedding);
            if similarity >= self.config.dedup_similarity {
                let merged_importance = existing_importance.max(importance);
                self.conn.with_connection(|conn| {
                    conn.execute(
                        "UPDATE memories SET repetitions = repetitions + 1,
                             importance = ?1, last_accessed = ?2 WHERE uuid = ?3",
                        params![merged_importance, Utc::now().to_rfc3339(), uuid],
                    )?;
                    Ok(())
                })?;
                return Ok(Some(uuid.clone()));
            }
        }

        let uuid = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        self.conn.with_connection(|conn| {
            conn.execute(
                "INSERT INTO memories (
                    uuid, content, memory_type, importance, repetitions, access_count,
                    created_at, last_accessed, preserved, decayed_importance, embedding
                 ) VALUES (?1, ?2, ?3, ?4, 1, 0, ?5, ?5, 0, NULL, ?6)",
                params![
                    uuid,
                    content,
                    memory_type.to_string(),
                    importance,
                    now,
                    encode_embedding(&embedding),
                ],
            )?;
            Ok(())
        })?;

        Ok(Some(uuid))
    }

    /// Rank stored memories by cosine similarity to `query`'s embedding,
    /// applying a score floor (`search_score_floor`) and an optional type
    /// filter. Each returned hit has its access_count incremented and
    /// last_accessed refreshed.
    pub async fn search(
        &self,
        embedder: &dyn EmbeddingClient,
        query: &str,
        k: usize,
        filter_type: Option<MemoryType>,
    ) -> Result<Vec<(Memory, f64)>> {
        let query_embedding = embedder.embed(query).await?;
        let all = self.all_memories()?;

        let mut scored: Vec<(Memory, f64)> = all
            .into_iter()
            .filter(|m| filter_type.map(|t| t == m.memory_type).unwrap_or(true))
            .map(|m| {
                let score = cosine_similarity(&query_embedding, &m.embedding);
                (m, score)
            })
            .filter(|(_, score)| *score >= self.config.search_score_floor)
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);

        let now = Utc::now().to_rfc3339();
        for (memory, _) in &scored {
            self.conn.with_connection(|conn| {
                conn.execute(
                    "UPDATE memories SET access_count = access_count + 1, last_accessed = ?1 WHERE uuid = ?2",
                    params![now, memory.uuid],
                )?;
                conn.execute(
                    "INSERT INTO memory_access_patterns (memory_uuid, accessed_at) VALUES (?1, ?2)",
                    params![memory.uuid, now],
                )?;
                Ok(())
            })?;
        }

        Ok(scored)
    }

    pub fn batch_update_metadata(
        &self,
        ids: &[String],
        metadatas: &[MemoryMetadataUpdate],
    ) -> Result<u64> {
        if ids.len() != metadatas.len() {
            return Err(MemoryError::new(
                ErrorKind::InvalidParam,
                "ids and metadatas must be the same length",
            ));
        }

        let mut updated = 0u64;
        self.conn.transaction(|tx| {
            for (id, update) in ids.iter().zip(metadatas.iter()) {
                if let Some(importance) = update.importance {
                    tx.execute(
                        "UPDATE memories SET importance = ?1 WHERE uuid = ?2",
                        params![importance, id],
                    )?;
                }
                if let Some(decayed) = update.decayed_importance {
                    tx.execute(
                        "UPDATE memories SET decayed_importance = ?1 WHERE uuid = ?2",
                        params![decayed, id],
                    )?;
                }
                if let Some(preserved) = update.preserved {
                    tx.execute(
                        "UPDATE memories SET preserved = ?1 WHERE uuid = ?2",
                        params![preserved as i64, id],
                    )?;
                }
                if let Some(access_count) = update.access_count {
                    tx.execute(
                        "UPDATE memories SET access_count = ?1 WHERE uuid = ?2",
                        params![access_count as i64, id],
                    )?;
                }
                updated += 1;
            }
            Ok(())
        })?;

        Ok(updated)
    }

    pub fn delete(&self, ids: &[String]) -> Result<u64> {
        let mut deleted = 0u64;
        self.conn.transaction(|tx| {
            for id in ids {
                tx.execute(
                    "DELETE FROM memory_access_patterns WHERE memory_uuid = ?1",
                    params![id],
                )?;
                deleted += tx.execute("DELETE FROM memories WHERE uuid = ?1", params![id])? as u64;
            }
            Ok(())
        })?;
        Ok(deleted)
    }

    /// Stream all memories with their current metadata. Used by the
    /// consolidator pass.
    pub fn all_memories(&self) -> Result<Vec<Memory>> {
        self.conn.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT uuid, content, memory_type, importance, repetitions, access_count,
                        created_at, last_accessed, preserved, decayed_importance, embedding
                 FROM memories",
            )?;
            let rows = stmt.query_map([], row_to_memory)?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row?);
            }
            Ok(out)
        })
    }

    fn all_embeddings(&self) -> Result<Vec<(String, f64, Vec<f32>)>> {
        self.conn.with_connection(|conn| {
            let mut stmt = conn.prepare("SELECT uuid, importance, embedding FROM memories")?;
            let rows = stmt.query_map([], |row| {
                let uuid: String = row.get(0)?;
                let importance: f64 = row.get(1)?;
                let blob: Vec<u8> = row.get(2)?;
                Ok((uuid, importance, decode_embedding(&blob)))
            })?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row?);
            }
            Ok(out)
        })
    }
}

fn row_to_memory(row: &rusqlite::Row<'_>) -> rusqlite::Result<Memory> {
    let created_at: String = row.get(6)?;
    let last_accessed: String = row.get(7)?;
    let memory_type: String = row.get(2)?;
    let preserved: i64 = row.get(8)?;
    let blob: Vec<u8> = row.get(10)?;

    Ok(Memory {
        uuid: row.get(0)?,
        content: row.get(1)?,
        memory_type: memory_type.parse().unwrap_or(MemoryType::Fact),
        importance: row.get(3)?,
        repetitions: row.get(4)?,
        access_count: {
            let v: i64 = row.get(5)?;
            v as u64
        },
        created_at: chrono::DateTime::parse_from_rfc3339(&created_at)
            .map(|d| d.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        last_accessed: chrono::DateTime::parse_from_rfc3339(&last_accessed)
            .map(|d| d.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        preserved: preserved != 0,
        decayed_importance: row.get(9)?,
        embedding: decode_embedding(&blob),
    })
}

pub fn encode_embedding(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

pub fn decode_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.is_empty() || b.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a * norm_b)) as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mnemo_store::SchemaManager;

    struct StubEmbedder(Vec<f32>);

    #[async_trait]
    impl EmbeddingClient for StubEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(self.0.clone())
        }

        fn dimensions(&self) -> usize {
            self.0.len()
        }
    }

    fn store() -> LongTermStore {
        let conn = Arc::new(ConnectionManager::open_in_memory().unwrap());
        SchemaManager::ensure_schema(&conn).unwrap();
        LongTermStore::new(conn, LongTermConfig::default())
    }

    #[test]
    fn embedding_round_trips_through_blob() {
        let v = vec![1.0_f32, -2.5, 3.25];
        assert_eq!(decode_embedding(&encode_embedding(&v)), v);
    }

    #[test]
    fn cosine_similarity_of_identical_vectors_is_one() {
        let v = vec![1.0_f32, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn short_content_is_rejected_without_force() {
        let store = store();
        let embedder = StubEmbedder(vec![1.0, 0.0]);
        let result = store
            .add(&embedder, "too short", MemoryType::Fact, 0.5, false)
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn forced_add_bypasses_criteria() {
        let store = store();
        let embedder = StubEmbedder(vec![1.0, 0.0]);
        let result = store
            .add(&embedder, "x", MemoryType::Fact, 0.01, true)
            .await
            .unwrap();
        assert!(result.is_some());
    }

    #[tokio::test]
    async fn near_duplicate_merges_into_existing_memory() {
        let store = store();
        let embedder = StubEmbedder(vec![1.0, 0.0, 0.0]);
        let first = store
            .add(
                &embedder,
                "the user prefers dark mode interfaces",
                MemoryType::Preference,
                0.5,
                false,
            )
            .await
            .unwrap()
            .unwrap();

        let second = store
            .add(
                &embedder,
                "the user prefers dark mode interfaces, confirmed again",
                MemoryType::Preference,
                0.7,
                false,
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(first, second);
        let memories = store.all_memories().unwrap();
        assert_eq!(memories.len(), 1);
        assert_eq!(memories[0].repetitions, 2);
        assert_eq!(memories[0].importance, 0.7);
    }

    #[tokio::test]
    async fn search_applies_score_floor() {
        let store = store();
        let embedder = StubEmbedder(vec![1.0, 0.0]);
        store
            .add(
                &embedder,
                "the user enjoys long hiking trips on weekends",
                MemoryType::Fact,
                0.5,
                false,
            )
            .await
            .unwrap();

        let orthogonal = StubEmbedder(vec![0.0, 1.0]);
        let hits = store.search(&orthogonal, "anything", 5, None).await.unwrap();
        assert!(hits.is_empty());

        let aligned = StubEmbedder(vec![1.0, 0.0]);
        let hits = store.search(&aligned, "anything", 5, None).await.unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn delete_removes_rows() {
        let store = store();
        store
            .conn
            .with_connection(|conn| {
                conn.execute(
                    "INSERT INTO memories (uuid, content, memory_type, importance, repetitions,
                        access_count, created_at, last_accessed, preserved, embedding)
                     VALUES ('a', 'c', 'fact', 0.5, 1, 0, '2024-01-01T00:00:00Z',
                             '2024-01-01T00:00:00Z', 0, X'')",
                    [],
                )?;
                Ok(())
            })
            .unwrap();
        let deleted = store.delete(&["a".to_string()]).unwrap();
        assert_eq!(deleted, 1);
        assert!(store.all_memories().unwrap().is_empty());
    }
}
