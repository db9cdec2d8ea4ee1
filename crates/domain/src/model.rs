//! The shared data model: `Turn`, `Session`, `Memory`, `Entity`, `Relation`,
//! and `InteractionLog`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One role-tagged utterance within a session. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Turn {
    pub session_id: String,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    /// Monotonic index within the owning session, 0-based.
    pub turn_index: u64,
    pub emotion: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for Role {
    type Err = crate::error::MemoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            "system" => Ok(Role::System),
            other => Err(crate::error::MemoryError::new(
                crate::error::ErrorKind::BadFormat,
                format!("unknown role: {other}"),
            )),
        }
    }
}

/// Lifecycle state of a `Session`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Open,
    Closed,
    Summarized,
}

/// A contiguous conversation, bounded by explicit open/close.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    pub id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
    pub turn_count: u64,
    pub key_topics: Vec<String>,
    pub emotional_tone: Option<String>,
    pub summary: Option<String>,
    pub status: SessionStatus,
}

impl Session {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now && self.summary.is_none()
    }
}

/// The category of a `Memory`, used by `DecayCalculator` to pick a half-life.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MemoryType {
    Fact,
    Preference,
    Insight,
    Event,
}

impl std::fmt::Display for MemoryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MemoryType::Fact => "fact",
            MemoryType::Preference => "preference",
            MemoryType::Insight => "insight",
            MemoryType::Event => "event",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for MemoryType {
    type Err = crate::error::MemoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fact" => Ok(MemoryType::Fact),
            "preference" => Ok(MemoryType::Preference),
            "insight" => Ok(MemoryType::Insight),
            "event" => Ok(MemoryType::Event),
            other => Err(crate::error::MemoryError::new(
                crate::error::ErrorKind::BadFormat,
                format!("unknown memory type: {other}"),
            )),
        }
    }
}

/// A unit of long-term storage.
///
/// Invariants: `preserved ⇒` never deleted by decay; `decayed_importance <= importance`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Memory {
    pub uuid: String,
    pub content: String,
    pub memory_type: MemoryType,
    pub importance: f64,
    pub repetitions: u32,
    pub access_count: u64,
    pub created_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    pub preserved: bool,
    pub decayed_importance: Option<f64>,
    pub embedding: Vec<f32>,
}

/// The kind of an `Entity` node.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Person,
    Project,
    Tool,
    Concept,
    Preference,
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EntityType::Person => "person",
            EntityType::Project => "project",
            EntityType::Tool => "tool",
            EntityType::Concept => "concept",
            EntityType::Preference => "preference",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for EntityType {
    type Err = crate::error::MemoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "person" => Ok(EntityType::Person),
            "project" => Ok(EntityType::Project),
            "tool" => Ok(EntityType::Tool),
            "concept" => Ok(EntityType::Concept),
            "preference" => Ok(EntityType::Preference),
            other => Err(crate::error::MemoryError::new(
                crate::error::ErrorKind::BadFormat,
                format!("unknown entity type: {other}"),
            )),
        }
    }
}

/// A node in the knowledge graph.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Entity {
    pub id: String,
    pub name: String,
    pub entity_type: EntityType,
    pub properties: HashMap<String, String>,
    pub mentions: u64,
    pub created_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
}

/// A directed edge in the knowledge graph. Identity is `(source, type, target)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Relation {
    pub source_id: String,
    pub target_id: String,
    pub relation_type: String,
    pub weight: f64,
    pub context: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Relation {
    pub fn composite_id(&self) -> String {
        format!("{}|{}|{}", self.source_id, self.relation_type, self.target_id)
    }
}

/// A per-turn observability record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InteractionLog {
    pub ts: DateTime<Utc>,
    pub conversation_id: String,
    pub turn_id: u64,
    pub effective_model: String,
    pub tier: String,
    pub router_reason: String,
    pub routing_features: HashMap<String, String>,
    pub manual_override: bool,
    pub latency_ms: u64,
    pub ttft_ms: Option<u64>,
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub tool_calls: Vec<String>,
    pub refusal_detected: bool,
    pub response_chars: u64,
    pub hedge_ratio: f64,
    pub avg_sentence_len: f64,
}
