//! Circuit-aware wrappers over the `LLMClient`/`EmbeddingClient` traits.
//!
//! Neither `GraphRAG`, `Summarizer`, nor `EmotionClassifier` knows about
//! circuit breakers — they just take `&dyn LLMClient`. The facade gets the
//! resilience layer in front of any collaborator by wrapping it in one of
//! these before handing it down, rather than threading a `CircuitBreaker`
//! through every component's constructor.

use std::time::Duration;

use async_trait::async_trait;

use mnemo_resilience::CircuitBreaker;
use sa_domain::collaborators::{EmbeddingClient, GenerateOptions, LLMClient};
use sa_domain::error::{ErrorKind, MemoryError, Result};
use sa_domain::TraceEvent;

/// Bounds every call with `timeout`, gates it on `circuit.can_execute()`,
/// and records the outcome on `circuit`.
pub struct CircuitGuardedLlm<'a> {
    inner: &'a dyn LLMClient,
    circuit: &'a CircuitBreaker,
    timeout: Duration,
}

impl<'a> CircuitGuardedLlm<'a> {
    pub fn new(inner: &'a dyn LLMClient, circuit: &'a CircuitBreaker, timeout: Duration) -> Self {
        Self { inner, circuit, timeout }
    }
}

#[async_trait]
impl<'a> LLMClient for CircuitGuardedLlm<'a> {
    async fn generate(&self, prompt: &str, opts: GenerateOptions) -> Result<String> {
        if !self.circuit.can_execute() {
            TraceEvent::CircuitRejected {
                name: "llm".to_string(),
                timeout_remaining_ms: 0,
            }
            .emit();
            return Err(MemoryError::new(ErrorKind::CircuitOpen, "llm circuit is open"));
        }

        match tokio::time::timeout(self.timeout, self.inner.generate(prompt, opts)).await {
            Ok(Ok(text)) => {
                self.circuit.record_success();
                Ok(text)
            }
            Ok(Err(error)) => {
                self.circuit.record_failure();
                Err(error)
            }
            Err(_) => {
                self.circuit.record_failure();
                Err(MemoryError::new(ErrorKind::Timeout, "llm call exceeded deadline"))
            }
        }
    }
}

pub struct CircuitGuardedEmbedder<'a> {
    inner: &'a dyn EmbeddingClient,
    circuit: &'a CircuitBreaker,
    timeout: Duration,
}

impl<'a> CircuitGuardedEmbedder<'a> {
    pub fn new(inner: &'a dyn EmbeddingClient, circuit: &'a CircuitBreaker, timeout: Duration) -> Self {
        Self { inner, circuit, timeout }
    }
}

#[async_trait]
impl<'a> EmbeddingClient for CircuitGuardedEmbedder<'a> {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if !self.circuit.can_execute() {
            TraceEvent::CircuitRejected {
                name: "embedding".to_string(),
                timeout_remaining_ms: 0,
            }
            .emit();
            return Err(MemoryError::new(
                ErrorKind::CircuitOpen,
                "embedding circuit is open",
            ));
        }

        match tokio::time::timeout(self.timeout, self.inner.embed(text)).await {
            Ok(Ok(vector)) => {
                self.circuit.record_success();
                Ok(vector)
            }
            Ok(Err(error)) => {
                self.circuit.record_failure();
                Err(error)
            }
            Err(_) => {
                self.circuit.record_failure();
                Err(MemoryError::new(
                    ErrorKind::EmbeddingFailed,
                    "embedding call exceeded deadline",
                ))
            }
        }
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sa_domain::config::CircuitConfig;

    struct AlwaysFailLlm;

    #[async_trait]
    impl LLMClient for AlwaysFailLlm {
        async fn generate(&self, _prompt: &str, _opts: GenerateOptions) -> Result<String> {
            Err(MemoryError::new(ErrorKind::ProviderError, "boom"))
        }
    }

    #[tokio::test]
    async fn opens_circuit_after_threshold_failures() {
        let circuit = CircuitBreaker::new(
            "llm",
            CircuitConfig {
                failure_threshold: 2,
                success_threshold: 1,
                timeout_secs: 60.0,
                half_open_max_calls: 1,
            },
        );
        let inner = AlwaysFailLlm;
        let guarded = CircuitGuardedLlm::new(&inner, &circuit, Duration::from_secs(1));

        for _ in 0..2 {
            let _ = guarded.generate("hi", GenerateOptions::default()).await;
        }

        let result = guarded.generate("hi", GenerateOptions::default()).await;
        assert!(matches!(
            result,
            Err(e) if e.kind == ErrorKind::CircuitOpen
        ));
    }
}
