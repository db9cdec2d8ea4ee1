//! External collaborator contracts.
//!
//! The memory subsystem never talks to a model, embedding service, or NER
//! backend directly — it depends only on these traits. Concrete adapters
//! (HTTP clients, local models, whatever the surrounding application uses)
//! live outside this workspace and are supplied at construction time.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::Result;

/// Options for a single `LLMClient::generate` call.
#[derive(Debug, Clone)]
pub struct GenerateOptions {
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            temperature: 0.3,
            max_tokens: 1024,
            timeout: Duration::from_secs(60),
        }
    }
}

/// Produces text completions for a prompt. Implementors must surface
/// timeout and rate-limit conditions as typed errors (`ErrorKind::Timeout`,
/// `ErrorKind::RateLimited`) rather than panicking or blocking indefinitely.
#[async_trait]
pub trait LLMClient: Send + Sync {
    async fn generate(&self, prompt: &str, opts: GenerateOptions) -> Result<String>;
}

/// Produces a fixed-dimension embedding vector for a piece of text.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// The dimensionality this client produces. Used to validate stored
    /// vectors at read time.
    fn dimensions(&self) -> usize;
}

/// A candidate entity produced by an `EntityExtractor`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExtractedEntity {
    pub name: String,
    pub type_label: String,
    pub confidence: f32,
}

/// Optional native named-entity-recognition backend. When absent, the
/// hybrid extraction path in `GraphRAG` always falls through to the LLM.
#[async_trait]
pub trait EntityExtractor: Send + Sync {
    async fn extract(&self, text: &str) -> Result<Vec<ExtractedEntity>>;
}
