use serde::Serialize;

/// Structured trace events emitted across the memory subsystem.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    TurnAppended {
        session_id: String,
        turn_index: u64,
        role: String,
    },
    SessionFinalized {
        session_id: String,
        turn_count: u64,
    },
    SessionSummarized {
        session_id: String,
        summary_chars: usize,
        messages_archived: u64,
    },
    CircuitStateChange {
        name: String,
        old_state: String,
        new_state: String,
        failure_count: u32,
    },
    CircuitRejected {
        name: String,
        timeout_remaining_ms: u64,
    },
    CacheEviction {
        name: String,
        key: String,
        reason: String,
    },
    CacheHit {
        name: String,
        key: String,
    },
    CacheMiss {
        name: String,
        key: String,
    },
    EntityUpserted {
        entity_id: String,
        entity_type: String,
        mentions: u64,
        merged: bool,
    },
    RelationUpserted {
        source_id: String,
        target_id: String,
        relation_type: String,
        weight: f64,
        new_edge: bool,
    },
    WeightsRecalculated {
        total: u64,
        changed: u64,
    },
    GraphQueryExecuted {
        query_chars: usize,
        entities_matched: usize,
        relevance_score: f64,
    },
    MemoryPromoted {
        uuid: String,
        memory_type: String,
        importance: f64,
        merged_into_existing: bool,
    },
    ConsolidationCompleted {
        checked: u64,
        preserved: u64,
        deleted: u64,
        surviving_updated: u64,
        errors: u64,
    },
    MaintenancePhaseCompleted {
        phase: String,
        dry_run: bool,
        duration_ms: u64,
    },
    MaintenancePhaseFailed {
        phase: String,
        error: String,
    },
    MigrationApplied {
        filename: String,
        version: u32,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "mnemo_event");
    }
}
