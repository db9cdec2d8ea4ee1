//! Round-robin rotation over a pool of bound LLM clients.
//!
//! Each `Arc<dyn LLMClient>` in the pool is assumed to already be bound to
//! one of a set of externally configured credentials (the collaborator
//! trait boundary has no slot through which a raw key could flow). Rotation
//! spreads `generate` calls evenly across the pool; it carries no cooldown
//! bookkeeping, since a failing client is the caller's `CircuitBreaker`
//! concern, not the rotator's.

use sa_domain::collaborators::{GenerateOptions, LLMClient};
use sa_domain::error::{ErrorKind, MemoryError, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Round-robins `generate` calls across a fixed pool of bound clients.
pub struct CredentialRotator {
    clients: Vec<Arc<dyn LLMClient>>,
    index: AtomicUsize,
}

impl CredentialRotator {
    /// Build a rotator over `clients`.
    ///
    /// # Errors
    ///
    /// Returns an error if `clients` is empty.
    pub fn new(clients: Vec<Arc<dyn LLMClient>>) -> Result<Self> {
        if clients.is_empty() {
            return Err(MemoryError::new(
                ErrorKind::InvalidParam,
                "CredentialRotator requires at least one configured client",
            ));
        }
        Ok(Self {
            clients,
            index: AtomicUsize::new(0),
        })
    }

    /// Number of clients in the pool.
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// Return the next client in round-robin order.
    pub fn next_client(&self) -> Arc<dyn LLMClient> {
        let idx = self.index.fetch_add(1, Ordering::Relaxed) % self.clients.len();
        self.clients[idx].clone()
    }

    /// Generate text using whichever client is next in rotation.
    pub async fn generate(&self, prompt: &str, opts: GenerateOptions) -> Result<String> {
        self.next_client().generate(prompt, opts).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct TaggedClient {
        tag: &'static str,
        calls: Arc<Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl LLMClient for TaggedClient {
        async fn generate(&self, _prompt: &str, _opts: GenerateOptions) -> Result<String> {
            self.calls.lock().unwrap().push(self.tag);
            Ok(self.tag.to_string())
        }
    }

    #[test]
    fn rejects_empty_pool() {
        let result = CredentialRotator::new(Vec::new());
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn rotates_round_robin_across_clients() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let clients: Vec<Arc<dyn LLMClient>> = vec![
            Arc::new(TaggedClient { tag: "a", calls: calls.clone() }),
            Arc::new(TaggedClient { tag: "b", calls: calls.clone() }),
            Arc::new(TaggedClient { tag: "c", calls: calls.clone() }),
        ];
        let rotator = CredentialRotator::new(clients).unwrap();

        for _ in 0..6 {
            rotator.generate("hi", GenerateOptions::default()).await.unwrap();
        }

        let seen = calls.lock().unwrap().clone();
        assert_eq!(seen, vec!["a", "b", "c", "a", "b", "c"]);
    }

    #[test]
    fn len_reports_pool_size() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let clients: Vec<Arc<dyn LLMClient>> = vec![
            Arc::new(TaggedClient { tag: "a", calls: calls.clone() }),
            Arc::new(TaggedClient { tag: "b", calls }),
        ];
        let rotator = CredentialRotator::new(clients).unwrap();
        assert_eq!(rotator.len(), 2);
    }
}
