use serde::{Deserialize, Serialize};

/// Configuration for one named circuit breaker.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CircuitConfig {
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub timeout_secs: f64,
    pub half_open_max_calls: u32,
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            timeout_secs: 60.0,
            half_open_max_calls: 3,
        }
    }
}

/// The three pre-configured circuits this subsystem requires, each guarding
/// a different class of external dependency.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitsConfig {
    #[serde(default = "d_llm")]
    pub llm: CircuitConfig,
    #[serde(default = "d_research")]
    pub research: CircuitConfig,
    #[serde(default = "d_embedding")]
    pub embedding: CircuitConfig,
}

impl Default for CircuitsConfig {
    fn default() -> Self {
        Self {
            llm: d_llm(),
            research: d_research(),
            embedding: d_embedding(),
        }
    }
}

fn d_llm() -> CircuitConfig {
    CircuitConfig {
        failure_threshold: 3,
        success_threshold: 2,
        timeout_secs: 30.0,
        half_open_max_calls: 3,
    }
}
fn d_research() -> CircuitConfig {
    CircuitConfig {
        failure_threshold: 5,
        success_threshold: 2,
        timeout_secs: 60.0,
        half_open_max_calls: 3,
    }
}
fn d_embedding() -> CircuitConfig {
    CircuitConfig {
        failure_threshold: 3,
        success_threshold: 1,
        timeout_secs: 30.0,
        half_open_max_calls: 3,
    }
}
