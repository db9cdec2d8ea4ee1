//! Circuit breaker: Closed / Open / HalfOpen state machine guarding a single
//! external dependency class (an LLM provider, a research fetcher, an
//! embedding service).

use std::time::Instant;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use sa_domain::config::CircuitConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half_open"),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CircuitStats {
    pub total_calls: u64,
    pub successful_calls: u64,
    pub failed_calls: u64,
    pub rejected_calls: u64,
    pub state_changes: u64,
    pub last_failure_time: Option<DateTime<Utc>>,
    pub last_success_time: Option<DateTime<Utc>>,
}

impl CircuitStats {
    pub fn failure_rate(&self) -> f64 {
        if self.total_calls == 0 {
            return 0.0;
        }
        self.failed_calls as f64 / self.total_calls as f64
    }
}

struct Inner {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    half_open_calls: u32,
    opened_at: Option<Instant>,
    stats: CircuitStats,
}

/// A single named circuit breaker. Cheap to call from many tasks: every
/// method takes `&self` and locks an internal mutex only for the duration of
/// the state check.
pub struct CircuitBreaker {
    name: String,
    config: CircuitConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                failure_count: 0,
                success_count: 0,
                half_open_calls: 0,
                opened_at: None,
                stats: CircuitStats::default(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    pub fn stats(&self) -> CircuitStats {
        self.inner.lock().stats.clone()
    }

    /// Ask whether a call may proceed. Transitions Open → HalfOpen once the
    /// configured timeout has elapsed. Returns `false` (and counts a
    /// rejection) when the circuit is open or the half-open trial quota is
    /// exhausted.
    pub fn can_execute(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => true,
            CircuitState::HalfOpen => {
                if inner.half_open_calls < self.config.half_open_max_calls {
                    inner.half_open_calls += 1;
                    true
                } else {
                    inner.stats.rejected_calls += 1;
                    false
                }
            }
            CircuitState::Open => {
                let elapsed = inner.opened_at.map(|t| t.elapsed().as_secs_f64()).unwrap_or(0.0);
                if elapsed >= self.config.timeout_secs {
                    inner.state = CircuitState::HalfOpen;
                    inner.half_open_calls = 1;
                    inner.success_count = 0;
                    inner.stats.state_changes += 1;
                    tracing::info!(circuit = %self.name, state = %inner.state, "circuit trial opened");
                    true
                } else {
                    inner.stats.rejected_calls += 1;
                    false
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        inner.stats.total_calls += 1;
        inner.stats.successful_calls += 1;
        inner.stats.last_success_time = Some(Utc::now());

        match inner.state {
            CircuitState::HalfOpen => {
                inner.success_count += 1;
                if inner.success_count >= self.config.success_threshold {
                    inner.state = CircuitState::Closed;
                    inner.failure_count = 0;
                    inner.success_count = 0;
                    inner.stats.state_changes += 1;
                    tracing::info!(circuit = %self.name, "circuit closed");
                }
            }
            CircuitState::Closed => {
                inner.failure_count = 0;
            }
            CircuitState::Open => {}
        }
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        inner.stats.total_calls += 1;
        inner.stats.failed_calls += 1;
        inner.stats.last_failure_time = Some(Utc::now());

        match inner.state {
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
                inner.failure_count = 0;
                inner.success_count = 0;
                inner.stats.state_changes += 1;
                tracing::warn!(circuit = %self.name, "circuit re-opened on half-open failure");
            }
            CircuitState::Closed => {
                inner.failure_count += 1;
                if inner.failure_count >= self.config.failure_threshold {
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(Instant::now());
                    inner.stats.state_changes += 1;
                    tracing::warn!(circuit = %self.name, failures = inner.failure_count, "circuit opened");
                }
            }
            CircuitState::Open => {}
        }
    }
}

/// The three pre-configured circuits this subsystem guards: `llm`,
/// `research`, `embedding`.
pub struct CircuitRegistry {
    llm: CircuitBreaker,
    research: CircuitBreaker,
    embedding: CircuitBreaker,
}

impl CircuitRegistry {
    pub fn new(config: &sa_domain::config::CircuitsConfig) -> Self {
        Self {
            llm: CircuitBreaker::new("llm", config.llm),
            research: CircuitBreaker::new("research", config.research),
            embedding: CircuitBreaker::new("embedding", config.embedding),
        }
    }

    pub fn llm(&self) -> &CircuitBreaker {
        &self.llm
    }
    pub fn research(&self) -> &CircuitBreaker {
        &self.research
    }
    pub fn embedding(&self) -> &CircuitBreaker {
        &self.embedding
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> CircuitConfig {
        CircuitConfig {
            failure_threshold: 2,
            success_threshold: 2,
            timeout_secs: 0.05,
            half_open_max_calls: 1,
        }
    }

    #[test]
    fn starts_closed() {
        let cb = CircuitBreaker::new("test", cfg());
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.can_execute());
    }

    #[test]
    fn opens_after_threshold_failures() {
        let cb = CircuitBreaker::new("test", cfg());
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Closed);
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(!cb.can_execute());
    }

    #[test]
    fn half_open_after_timeout_then_closes_on_success() {
        let cb = CircuitBreaker::new("test", cfg());
        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);

        std::thread::sleep(std::time::Duration::from_millis(80));
        assert!(cb.can_execute());
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        cb.record_success();
        cb.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn half_open_failure_reopens() {
        let cb = CircuitBreaker::new("test", cfg());
        cb.record_failure();
        cb.record_failure();
        std::thread::sleep(std::time::Duration::from_millis(80));
        assert!(cb.can_execute());
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[test]
    fn registry_exposes_three_named_circuits() {
        let registry = CircuitRegistry::new(&sa_domain::config::CircuitsConfig::default());
        assert_eq!(registry.llm().name(), "llm");
        assert_eq!(registry.research().name(), "research");
        assert_eq!(registry.embedding().name(), "embedding");
    }
}
