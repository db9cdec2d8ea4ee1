//! `Facade`: the stable external surface over the session archive,
//! long-term store, knowledge graph, and maintenance jobs. Callers
//! construct one `Facade` and never touch the component crates directly.
//!
//! Backend selection (embedded SQLite vs. a future remote-relational
//! backend) is resolved once at construction in `Facade::open`; every
//! method below is backend-agnostic from the caller's point of view.

pub mod adapters;
pub mod credential_rotator;
pub mod job_lock;
pub mod maintenance;
pub mod registry;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use mnemo_graph::{ExtractionReport, GraphQueryResult, GraphRAG};
use mnemo_longterm::{Consolidator, ConsolidationReport, LongTermStore, MemoryMetadataUpdate};
use mnemo_store::{
    ConnectionManager, InteractionLogger, SchemaManager, SessionDetail, SessionRepository,
    SummarizeReport, Summarizer,
};
use mnemo_text::{EmotionClassifier, TextSanitizer};
use sa_domain::collaborators::{EmbeddingClient, EntityExtractor, GenerateOptions, LLMClient};
use sa_domain::config::Config;
use sa_domain::error::Result;
use sa_domain::model::{InteractionLog, Memory, MemoryType, Role, Session, Turn};
use sa_domain::TraceEvent;

use crate::adapters::{CircuitGuardedEmbedder, CircuitGuardedLlm};
use crate::job_lock::JobLocks;
use crate::maintenance::MaintenanceJobs;
use crate::registry::Registry;

/// Owns every subcomponent and presents their union as one surface.
pub struct Facade {
    config: Config,
    db: Arc<ConnectionManager>,
    sessions: SessionRepository,
    interaction_logger: InteractionLogger,
    summarizer: Summarizer,
    long_term: LongTermStore,
    graph_rag: GraphRAG,
    sanitizer: TextSanitizer,
    emotion: EmotionClassifier,
    registry: Registry,
    job_locks: JobLocks,
}

impl Facade {
    /// Open (creating if absent) the embedded SQLite backend at
    /// `config.paths.db_path`, applying any pending schema migrations, and
    /// load the knowledge graph from `config.paths.graph_path` (or start
    /// empty if the file does not exist).
    pub fn open(config: Config) -> Result<Self> {
        let db = Arc::new(ConnectionManager::open(&config.paths.db_path)?);
        SchemaManager::ensure_schema(&db)?;
        Self::from_connection(config, db)
    }

    /// In-memory variant used by tests and by `mnemo-maintenance`'s
    /// dry-run mode when no persistent store is configured.
    pub fn open_in_memory(config: Config) -> Result<Self> {
        let db = Arc::new(ConnectionManager::open_in_memory()?);
        SchemaManager::ensure_schema(&db)?;
        Self::from_connection(config, db)
    }

    fn from_connection(config: Config, db: Arc<ConnectionManager>) -> Result<Self> {
        let sessions = SessionRepository::new(db.clone())?;
        let interaction_logger = InteractionLogger::new(db.clone());
        let summarizer = Summarizer::new(db.clone());
        let long_term = LongTermStore::new(db.clone(), config.long_term);

        let graph_path = &config.paths.graph_path;
        let graph = if graph_path.as_os_str() != ":memory:" && graph_path.exists() {
            mnemo_graph::KnowledgeGraph::load(graph_path.clone())?
        } else {
            mnemo_graph::KnowledgeGraph::with_persist_path(graph_path.clone())
        };
        let graph_rag = GraphRAG::new(graph, config.graph);

        let registry = Registry::new(&config);

        Ok(Self {
            config,
            db,
            sessions,
            interaction_logger,
            summarizer,
            long_term,
            graph_rag,
            sanitizer: TextSanitizer::new(),
            emotion: EmotionClassifier::new(),
            registry,
            job_locks: JobLocks::new(),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Idempotent shutdown. `silent` suppresses the closing log line, for
    /// callers (e.g. `Drop` handlers, signal handlers) that close as part
    /// of a broader shutdown sequence already being logged elsewhere.
    pub fn close(&self, silent: bool) {
        if !silent {
            tracing::info!("facade closing");
        }
        let _ = self.graph_rag.graph().save_if_configured();
        self.db.close();
    }

    // ── Resilience-wrapped collaborators ───────────────────────────────

    /// Wrap `llm` with the `llm` circuit and this config's LLM timeout.
    /// Pass the result anywhere an `&dyn LLMClient` is expected (graph
    /// extraction/query, summarization, emotion classification) to get
    /// circuit-breaker protection without those components knowing about
    /// circuits at all.
    pub fn guard_llm<'a>(&'a self, llm: &'a dyn LLMClient) -> CircuitGuardedLlm<'a> {
        CircuitGuardedLlm::new(
            llm,
            self.registry.circuits().llm(),
            Duration::from_secs(self.config.timeouts.llm_secs),
        )
    }

    pub fn guard_embedder<'a>(&'a self, embedder: &'a dyn EmbeddingClient) -> CircuitGuardedEmbedder<'a> {
        CircuitGuardedEmbedder::new(
            embedder,
            self.registry.circuits().embedding(),
            Duration::from_secs(self.config.timeouts.embed_secs),
        )
    }

    // ── Session archive (§4.5) ──────────────────────────────────────────

    /// Sanitize and append a turn, assigning its monotonic turn index.
    pub fn append_turn(
        &self,
        session_id: &str,
        role: Role,
        content: &str,
        timestamp: DateTime<Utc>,
        emotion: Option<&str>,
    ) -> Result<u64> {
        let clean = self.sanitizer.sanitize(content);
        let turn_index = self.sessions.append_turn(session_id, role, &clean, timestamp, emotion)?;
        TraceEvent::TurnAppended {
            session_id: session_id.to_string(),
            turn_index,
            role: role.to_string(),
        }
        .emit();
        Ok(turn_index)
    }

    pub fn save_session(&self, session: &Session, turns: &[Turn]) -> Result<()> {
        self.sessions.save_session(session, turns)?;
        TraceEvent::SessionFinalized {
            session_id: session.id.clone(),
            turn_count: session.turn_count,
        }
        .emit();
        Ok(())
    }

    pub fn session_messages(&self, session_id: &str) -> Result<Vec<Turn>> {
        self.sessions.session_messages(session_id)
    }

    pub fn session_detail(&self, session_id: &str) -> Result<Option<SessionDetail>> {
        self.sessions.session_detail(session_id)
    }

    pub fn search_by_topic(&self, query: &str, max_tokens: usize) -> Vec<String> {
        self.sessions.search_by_topic(query, max_tokens, &self.config.budget)
    }

    pub fn sessions_by_date(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        limit: usize,
        max_tokens: usize,
    ) -> Result<Vec<String>> {
        self.sessions.sessions_by_date(from, to, limit, max_tokens, &self.config.budget)
    }

    pub fn recent_summaries(&self, limit: usize, max_tokens: usize) -> Result<Vec<String>> {
        self.sessions.recent_summaries(limit, max_tokens, &self.config.budget)
    }

    pub fn time_since_last_session(&self) -> Result<Option<chrono::Duration>> {
        self.sessions.time_since_last_session()
    }

    #[allow(clippy::too_many_arguments)]
    pub fn log_interaction(
        &self,
        conversation_id: &str,
        turn_id: u64,
        effective_model: &str,
        tier: &str,
        router_reason: &str,
        routing_features: &std::collections::HashMap<String, String>,
        manual_override: bool,
        latency_ms: u64,
        ttft_ms: Option<u64>,
        tokens_in: u64,
        tokens_out: u64,
        tool_calls: &[String],
        refusal_detected: bool,
        response_text: Option<&str>,
    ) -> Result<()> {
        self.interaction_logger.log_interaction(
            conversation_id,
            turn_id,
            effective_model,
            tier,
            router_reason,
            routing_features,
            manual_override,
            latency_ms,
            ttft_ms,
            tokens_in,
            tokens_out,
            tool_calls,
            refusal_detected,
            response_text,
        )
    }

    pub fn recent_interaction_logs(&self, limit: usize) -> Result<Vec<InteractionLog>> {
        self.interaction_logger.recent_logs(limit)
    }

    /// Summarize every expired session and archive its turns. Serialized
    /// against concurrent maintenance/summarize runs via the named job
    /// lock.
    pub async fn summarize_expired(&self, llm: &dyn LLMClient) -> Result<SummarizeReport> {
        let _guard = self.job_locks.try_acquire("summarize")?;
        let guarded = self.guard_llm(llm);
        let report = self.summarizer.summarize_expired(&guarded).await?;
        Ok(report)
    }

    pub async fn classify_emotion(&self, llm: &dyn LLMClient, text: &str) -> String {
        let guarded = self.guard_llm(llm);
        self.emotion.classify(&guarded, text).await
    }

    // ── Long-term memory (§4.6) ─────────────────────────────────────────

    pub async fn promote_memory(
        &self,
        embedder: &dyn EmbeddingClient,
        content: &str,
        memory_type: MemoryType,
        importance: f64,
        force: bool,
    ) -> Result<Option<String>> {
        let guarded = self.guard_embedder(embedder);
        let clean = self.sanitizer.sanitize(content);
        let uuid = self.long_term.add(&guarded, &clean, memory_type, importance, force).await?;
        if let Some(uuid) = &uuid {
            TraceEvent::MemoryPromoted {
                uuid: uuid.clone(),
                memory_type: memory_type.to_string(),
                importance,
                merged_into_existing: false,
            }
            .emit();
        }
        Ok(uuid)
    }

    pub async fn search_memories(
        &self,
        embedder: &dyn EmbeddingClient,
        query: &str,
        k: usize,
        filter_type: Option<MemoryType>,
    ) -> Result<Vec<(Memory, f64)>> {
        let guarded = self.guard_embedder(embedder);
        self.long_term.search(&guarded, query, k, filter_type).await
    }

    pub fn batch_update_memory_metadata(
        &self,
        ids: &[String],
        metadatas: &[MemoryMetadataUpdate],
    ) -> Result<u64> {
        self.long_term.batch_update_metadata(ids, metadatas)
    }

    pub fn delete_memories(&self, ids: &[String]) -> Result<u64> {
        self.long_term.delete(ids)
    }

    /// Run the five-stage consolidation pass. Serialized against
    /// concurrent maintenance/consolidate runs via the named job lock.
    pub fn consolidate(&self) -> Result<ConsolidationReport> {
        let _guard = self.job_locks.try_acquire("consolidate")?;
        let consolidator = Consolidator::new(&self.long_term, self.config.decay);
        let report = consolidator.run();
        TraceEvent::ConsolidationCompleted {
            checked: report.checked,
            preserved: report.preserved,
            deleted: report.deleted,
            surviving_updated: report.surviving_updated,
            errors: report.errors.len() as u64,
        }
        .emit();
        Ok(report)
    }

    // ── Knowledge graph / GraphRAG (§4.7, §4.8) ──────────────────────────

    pub async fn extract_and_store(
        &self,
        text: &str,
        llm: &dyn LLMClient,
        extractor: Option<&dyn EntityExtractor>,
    ) -> Result<ExtractionReport> {
        let guarded = self.guard_llm(llm);
        self.graph_rag.extract_and_store(text, &guarded, extractor).await
    }

    pub async fn query_graph(
        &self,
        question: &str,
        max_depth: usize,
        llm: &dyn LLMClient,
    ) -> GraphQueryResult {
        let guarded = self.guard_llm(llm);
        self.graph_rag.query(question, max_depth, &guarded).await
    }

    /// Keyword-only query variant with no LLM round trip, for
    /// latency-critical callers.
    pub fn query_graph_sync(&self, question: &str, max_depth: usize) -> GraphQueryResult {
        self.graph_rag.query_sync(question, max_depth)
    }

    pub fn graph_stats(&self) -> mnemo_graph::GraphStats {
        self.graph_rag.stats()
    }

    // ── Maintenance (§4.10) ──────────────────────────────────────────────

    pub fn run_maintenance_check(&self) -> Result<maintenance::CheckReport> {
        self.maintenance_jobs().run_check()
    }

    /// Run maintenance phases 1-8. Serialized against concurrent
    /// maintenance/consolidate runs via the named job lock.
    pub async fn run_maintenance(
        &self,
        dry_run: bool,
        rotator: Option<&credential_rotator::CredentialRotator>,
    ) -> Result<maintenance::MaintenanceReport> {
        let _guard = self.job_locks.try_acquire("maintenance")?;
        Ok(self.maintenance_jobs().run_full(dry_run, rotator).await)
    }

    fn maintenance_jobs(&self) -> MaintenanceJobs<'_> {
        MaintenanceJobs::new(
            &self.db,
            self.graph_rag.graph(),
            &self.long_term,
            &self.sanitizer,
            &self.config.maintenance,
            &self.config.decay,
        )
    }

    pub fn migrations_status(&self) -> Result<mnemo_store::SchemaStatus> {
        SchemaManager::status(&self.db)
    }

    pub fn apply_migrations(&self) -> Result<()> {
        SchemaManager::ensure_schema(&self.db)
    }
}

/// Convenience re-export so callers building a `CredentialRotator` pool
/// don't need to depend on `sa-domain` directly just for `GenerateOptions`.
pub use sa_domain::collaborators::GenerateOptions as LlmGenerateOptions;

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sa_domain::error::{ErrorKind, MemoryError};

    struct StubLlm;

    #[async_trait]
    impl LLMClient for StubLlm {
        async fn generate(&self, _prompt: &str, _opts: GenerateOptions) -> Result<String> {
            Ok("a quiet evening discussing rust ownership".to_string())
        }
    }

    struct StubEmbedder;

    #[async_trait]
    impl EmbeddingClient for StubEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            let seed = text.len() as f32;
            Ok(vec![seed, 1.0 - seed.min(1.0)])
        }
        fn dimensions(&self) -> usize {
            2
        }
    }

    struct FailingLlm;

    #[async_trait]
    impl LLMClient for FailingLlm {
        async fn generate(&self, _prompt: &str, _opts: GenerateOptions) -> Result<String> {
            Err(MemoryError::new(ErrorKind::ProviderError, "down"))
        }
    }

    fn facade() -> Facade {
        Facade::open_in_memory(Config::default()).unwrap()
    }

    #[test]
    fn append_turn_assigns_dense_indices() {
        let facade = facade();
        let now = Utc::now();
        for i in 0..3 {
            let idx = facade
                .append_turn("s1", Role::User, &format!("hello {i}"), now, None)
                .unwrap();
            assert_eq!(idx, i as u64);
        }
    }

    #[test]
    fn append_turn_sanitizes_before_storing() {
        let facade = facade();
        facade.append_turn("s1", Role::User, "**bold** 😀", Utc::now(), None).unwrap();
        let turns = facade.session_messages("s1").unwrap();
        assert_eq!(turns[0].content, "bold");
    }

    #[tokio::test]
    async fn summarize_expired_delegates_through_circuit() {
        let facade = facade();
        let now = Utc::now();
        let session = Session {
            id: "expired-1".to_string(),
            started_at: now - chrono::Duration::days(2),
            ended_at: Some(now - chrono::Duration::days(1)),
            expires_at: now - chrono::Duration::hours(1),
            turn_count: 1,
            key_topics: vec![],
            emotional_tone: None,
            summary: None,
            status: sa_domain::model::SessionStatus::Closed,
        };
        let turn = Turn {
            session_id: "expired-1".to_string(),
            role: Role::User,
            content: "hello there".to_string(),
            timestamp: now,
            turn_index: 0,
            emotion: None,
        };
        facade.save_session(&session, &[turn]).unwrap();

        let llm = StubLlm;
        let report = facade.summarize_expired(&llm).await.unwrap();
        assert_eq!(report.sessions_processed, 1);
        assert_eq!(report.messages_archived, 1);
    }

    #[tokio::test]
    async fn promote_and_search_memory_round_trip() {
        let facade = facade();
        let embedder = StubEmbedder;
        let uuid = facade
            .promote_memory(&embedder, "the user strongly prefers dark mode everywhere", MemoryType::Preference, 0.8, false)
            .await
            .unwrap();
        assert!(uuid.is_some());

        let hits = facade
            .search_memories(&embedder, "the user strongly prefers dark mode everywhere", 5, None)
            .await
            .unwrap();
        assert!(!hits.is_empty());
    }

    #[tokio::test]
    async fn second_concurrent_consolidate_is_rejected() {
        let facade = facade();
        let _first = facade.job_locks.try_acquire("consolidate").unwrap();
        let result = facade.consolidate();
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn guarded_llm_records_failures_on_the_registry_circuit() {
        let facade = facade();
        let llm = FailingLlm;
        for _ in 0..facade.config().circuits.llm.failure_threshold {
            let _ = facade.classify_emotion(&llm, "hello there, a real sentence").await;
        }
        assert_eq!(
            facade.registry().circuits().llm().state(),
            mnemo_resilience::CircuitState::Open
        );
    }
}
