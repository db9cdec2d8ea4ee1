//! Shared vocabulary for the memory subsystem: errors, data model, collaborator
//! traits, trace events, and configuration. Every other crate in this workspace
//! depends on this one; this one depends on nothing internal.

pub mod collaborators;
pub mod config;
pub mod error;
pub mod model;
pub mod trace;

pub use collaborators::{EmbeddingClient, EntityExtractor, ExtractedEntity, GenerateOptions, LLMClient};
pub use config::Config;
pub use error::{ErrorKind, MemoryError, Result};
pub use model::{
    Entity, EntityType, InteractionLog, Memory, MemoryType, Relation, Role, Session,
    SessionStatus, Turn,
};
pub use trace::TraceEvent;
