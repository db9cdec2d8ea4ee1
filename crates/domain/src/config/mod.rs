mod cache;
mod circuits;
mod observability;
mod paths;
mod timeouts;

pub use cache::*;
pub use circuits::*;
pub use observability::*;
pub use paths::*;
pub use timeouts::*;

use serde::{Deserialize, Serialize};
use std::fmt;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Env-var helpers
//
// Every tunable below has a compile-time default and an environment
// override via this idiom: invalid or unset values fall back silently
// to the default rather than failing construction.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub(crate) fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

pub(crate) fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

pub(crate) fn env_f64(name: &str, default: f64) -> f64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Decay constants (§4.6)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Constants driving `DecayCalculator` and the consolidator/maintenance
/// deletion predicates.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct DecayConfig {
    #[serde(default = "d_min_retention")]
    pub min_retention: f64,
    #[serde(default = "d_preserve_repetitions")]
    pub preserve_repetitions: u32,
    #[serde(default = "d_decay_delete_threshold")]
    pub decay_delete_threshold: f64,
    #[serde(default = "d_half_life_fact")]
    pub half_life_fact_days: f64,
    #[serde(default = "d_half_life_preference")]
    pub half_life_preference_days: f64,
    #[serde(default = "d_half_life_insight")]
    pub half_life_insight_days: f64,
    #[serde(default = "d_half_life_event")]
    pub half_life_event_days: f64,
}

impl Default for DecayConfig {
    fn default() -> Self {
        Self {
            min_retention: d_min_retention(),
            preserve_repetitions: d_preserve_repetitions(),
            decay_delete_threshold: d_decay_delete_threshold(),
            half_life_fact_days: d_half_life_fact(),
            half_life_preference_days: d_half_life_preference(),
            half_life_insight_days: d_half_life_insight(),
            half_life_event_days: d_half_life_event(),
        }
    }
}

impl DecayConfig {
    pub fn from_env() -> Self {
        Self {
            min_retention: env_f64("MNEMO_DECAY_MIN_RETENTION", d_min_retention()),
            preserve_repetitions: env_u64(
                "MNEMO_PRESERVE_REPETITIONS",
                d_preserve_repetitions() as u64,
            ) as u32,
            decay_delete_threshold: env_f64(
                "MNEMO_DECAY_DELETE_THRESHOLD",
                d_decay_delete_threshold(),
            ),
            ..Self::default()
        }
    }

    /// Half-life in days for a given memory type.
    pub fn half_life_days(&self, memory_type: crate::model::MemoryType) -> f64 {
        use crate::model::MemoryType::*;
        match memory_type {
            Fact => self.half_life_fact_days,
            Preference => self.half_life_preference_days,
            Insight => self.half_life_insight_days,
            Event => self.half_life_event_days,
        }
    }
}

fn d_min_retention() -> f64 {
    0.05
}
fn d_preserve_repetitions() -> u32 {
    5
}
fn d_decay_delete_threshold() -> f64 {
    0.15
}
fn d_half_life_fact() -> f64 {
    180.0
}
fn d_half_life_preference() -> f64 {
    120.0
}
fn d_half_life_insight() -> f64 {
    90.0
}
fn d_half_life_event() -> f64 {
    30.0
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Long-term store (promotion/search) constants
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct LongTermConfig {
    #[serde(default = "d_min_content_len")]
    pub min_content_len: usize,
    #[serde(default = "d_min_importance")]
    pub min_importance: f64,
    #[serde(default = "d_dedup_similarity")]
    pub dedup_similarity: f64,
    #[serde(default = "d_search_score_floor")]
    pub search_score_floor: f64,
}

impl Default for LongTermConfig {
    fn default() -> Self {
        Self {
            min_content_len: d_min_content_len(),
            min_importance: d_min_importance(),
            dedup_similarity: d_dedup_similarity(),
            search_score_floor: d_search_score_floor(),
        }
    }
}

fn d_min_content_len() -> usize {
    20
}
fn d_min_importance() -> f64 {
    0.3
}
fn d_dedup_similarity() -> f64 {
    0.92
}
fn d_search_score_floor() -> f64 {
    0.2
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Knowledge graph / GraphRAG constants
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GraphConfig {
    #[serde(default = "d_max_query_entities")]
    pub max_query_entities: usize,
    #[serde(default = "d_max_relations")]
    pub max_relations: usize,
    #[serde(default = "d_max_paths")]
    pub max_paths: usize,
    #[serde(default = "d_max_format_entities")]
    pub max_format_entities: usize,
    #[serde(default = "d_max_format_relations")]
    pub max_format_relations: usize,
    #[serde(default = "d_import_threshold")]
    pub entity_importance_threshold: f64,
    #[serde(default = "d_ner_confidence_threshold")]
    pub ner_confidence_threshold: f32,
    #[serde(default = "d_ner_decision_len")]
    pub ner_decision_text_len: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            max_query_entities: d_max_query_entities(),
            max_relations: d_max_relations(),
            max_paths: d_max_paths(),
            max_format_entities: d_max_format_entities(),
            max_format_relations: d_max_format_relations(),
            entity_importance_threshold: d_import_threshold(),
            ner_confidence_threshold: d_ner_confidence_threshold(),
            ner_decision_text_len: d_ner_decision_len(),
        }
    }
}

fn d_max_query_entities() -> usize {
    3
}
fn d_max_relations() -> usize {
    10
}
fn d_max_paths() -> usize {
    5
}
fn d_max_format_entities() -> usize {
    5
}
fn d_max_format_relations() -> usize {
    5
}
fn d_import_threshold() -> f64 {
    0.6
}
fn d_ner_confidence_threshold() -> f32 {
    0.8
}
fn d_ner_decision_len() -> usize {
    200
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Context-budget constants (§6 budget constants)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct BudgetConfig {
    #[serde(default = "d_chars_per_token")]
    pub chars_per_token: usize,
    #[serde(default = "d_budget_session")]
    pub session_tokens: usize,
    #[serde(default = "d_budget_memory")]
    pub memory_tokens: usize,
    #[serde(default = "d_budget_graph")]
    pub graph_tokens: usize,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            chars_per_token: d_chars_per_token(),
            session_tokens: d_budget_session(),
            memory_tokens: d_budget_memory(),
            graph_tokens: d_budget_graph(),
        }
    }
}

impl BudgetConfig {
    pub fn from_env() -> Self {
        Self {
            session_tokens: env_u64("MNEMO_BUDGET_SESSION_TOKENS", d_budget_session() as u64)
                as usize,
            memory_tokens: env_u64("MNEMO_BUDGET_MEMORY_TOKENS", d_budget_memory() as u64)
                as usize,
            graph_tokens: env_u64("MNEMO_BUDGET_GRAPH_TOKENS", d_budget_graph() as u64) as usize,
            ..Self::default()
        }
    }

    /// Character budget equivalent to `tokens`, per `CHARS_PER_TOKEN`.
    pub fn chars_for(&self, tokens: usize) -> usize {
        tokens * self.chars_per_token
    }
}

fn d_chars_per_token() -> usize {
    4
}
fn d_budget_session() -> usize {
    2000
}
fn d_budget_memory() -> usize {
    1000
}
fn d_budget_graph() -> usize {
    500
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Maintenance constants
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct MaintenanceConfig {
    #[serde(default = "d_parallel_workers")]
    pub parallel_workers: usize,
    #[serde(default = "d_summarize_min_chars")]
    pub summarize_min_chars: usize,
    #[serde(default = "d_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "d_retry_backoff_secs")]
    pub retry_backoff_base_secs: u64,
    #[serde(default = "d_archive_retention_days")]
    pub archive_retention_days: i64,
    #[serde(default = "d_access_pattern_retention_days")]
    pub access_pattern_retention_days: i64,
    #[serde(default = "d_orphan_entity_age_days")]
    pub orphan_entity_age_days: i64,
    #[serde(default = "d_orphan_entity_min_mentions")]
    pub orphan_entity_min_mentions: u64,
    #[serde(default = "d_min_relation_weight")]
    pub min_relation_weight: f64,
    #[serde(default = "d_dedup_hash_chars")]
    pub dedup_hash_chars: usize,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            parallel_workers: d_parallel_workers(),
            summarize_min_chars: d_summarize_min_chars(),
            retry_attempts: d_retry_attempts(),
            retry_backoff_base_secs: d_retry_backoff_secs(),
            archive_retention_days: d_archive_retention_days(),
            access_pattern_retention_days: d_access_pattern_retention_days(),
            orphan_entity_age_days: d_orphan_entity_age_days(),
            orphan_entity_min_mentions: d_orphan_entity_min_mentions(),
            min_relation_weight: d_min_relation_weight(),
            dedup_hash_chars: d_dedup_hash_chars(),
        }
    }
}

fn d_parallel_workers() -> usize {
    4
}
fn d_summarize_min_chars() -> usize {
    2000
}
fn d_retry_attempts() -> u32 {
    2
}
fn d_retry_backoff_secs() -> u64 {
    3
}
fn d_archive_retention_days() -> i64 {
    90
}
fn d_access_pattern_retention_days() -> i64 {
    30
}
fn d_orphan_entity_age_days() -> i64 {
    30
}
fn d_orphan_entity_min_mentions() -> u64 {
    3
}
fn d_min_relation_weight() -> f64 {
    0.1
}
fn d_dedup_hash_chars() -> usize {
    500
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub timeouts: TimeoutsConfig,
    #[serde(default)]
    pub circuits: CircuitsConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub decay: DecayConfig,
    #[serde(default)]
    pub long_term: LongTermConfig,
    #[serde(default)]
    pub graph: GraphConfig,
    #[serde(default)]
    pub budget: BudgetConfig,
    #[serde(default)]
    pub maintenance: MaintenanceConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Build a `Config` from the environment, falling back to compiled-in
    /// defaults for every unset or unparseable variable.
    pub fn from_env() -> Self {
        Self {
            paths: PathsConfig::from_env(),
            timeouts: TimeoutsConfig::from_env(),
            decay: DecayConfig::from_env(),
            budget: BudgetConfig::from_env(),
            ..Self::default()
        }
    }

    /// Validate the configuration and return a list of issues. Empty on
    /// success.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.paths.data_dir.as_os_str().is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "paths.data_dir".into(),
                message: "data_dir must not be empty".into(),
            });
        }
        if self.paths.db_path.as_os_str().is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "paths.db_path".into(),
                message: "db_path must not be empty".into(),
            });
        }
        if self.paths.graph_path.as_os_str().is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "paths.graph_path".into(),
                message: "graph_path must not be empty".into(),
            });
        }

        for (field, secs) in [
            ("timeouts.llm_secs", self.timeouts.llm_secs),
            ("timeouts.embed_secs", self.timeouts.embed_secs),
            ("timeouts.http_secs", self.timeouts.http_secs),
        ] {
            if secs == 0 {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: field.into(),
                    message: "timeout must be greater than 0".into(),
                });
            }
        }

        if self.timeouts.max_retries == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "timeouts.max_retries".into(),
                message: "max_retries is 0, failures will never be retried by callers".into(),
            });
        }

        for (field, circuit) in [
            ("circuits.llm", &self.circuits.llm),
            ("circuits.research", &self.circuits.research),
            ("circuits.embedding", &self.circuits.embedding),
        ] {
            if circuit.failure_threshold == 0 {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: format!("{field}.failure_threshold"),
                    message: "failure_threshold must be greater than 0".into(),
                });
            }
            if circuit.success_threshold == 0 {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: format!("{field}.success_threshold"),
                    message: "success_threshold must be greater than 0".into(),
                });
            }
            if circuit.timeout_secs <= 0.0 {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: format!("{field}.timeout_secs"),
                    message: "timeout_secs must be greater than 0".into(),
                });
            }
        }

        if self.cache.maxsize == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "cache.maxsize".into(),
                message: "maxsize must be greater than 0".into(),
            });
        }

        for (field, v) in [
            ("decay.min_retention", self.decay.min_retention),
            (
                "decay.decay_delete_threshold",
                self.decay.decay_delete_threshold,
            ),
        ] {
            if !(0.0..=1.0).contains(&v) {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: field.into(),
                    message: format!("must be within [0,1] (got {v})"),
                });
            }
        }

        for (field, days) in [
            ("decay.half_life_fact_days", self.decay.half_life_fact_days),
            (
                "decay.half_life_preference_days",
                self.decay.half_life_preference_days,
            ),
            (
                "decay.half_life_insight_days",
                self.decay.half_life_insight_days,
            ),
            (
                "decay.half_life_event_days",
                self.decay.half_life_event_days,
            ),
        ] {
            if days <= 0.0 {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: field.into(),
                    message: "half-life must be greater than 0".into(),
                });
            }
        }

        if !(0.0..=1.0).contains(&self.long_term.min_importance) {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "long_term.min_importance".into(),
                message: "must be within [0,1]".into(),
            });
        }
        if !(0.0..=1.0).contains(&self.long_term.dedup_similarity) {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "long_term.dedup_similarity".into(),
                message: "must be within [0,1]".into(),
            });
        }

        if self.graph.max_query_entities == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "graph.max_query_entities".into(),
                message: "0 means graph queries will never resolve a seed entity".into(),
            });
        }

        if self.maintenance.parallel_workers == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "maintenance.parallel_workers".into(),
                message: "parallel_workers must be greater than 0".into(),
            });
        }

        if let Some(endpoint) = &self.observability.otlp_endpoint {
            if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: "observability.otlp_endpoint".into(),
                    message: format!(
                        "otlp_endpoint must start with http:// or https:// (got \"{endpoint}\")"
                    ),
                });
            }
        }
        if !(0.0..=1.0).contains(&self.observability.sample_rate) {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "observability.sample_rate".into(),
                message: "sample_rate must be within [0,1]".into(),
            });
        }

        errors
    }
}

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    fn find_issue<'a>(issues: &'a [ConfigError], field_prefix: &str) -> Option<&'a ConfigError> {
        issues.iter().find(|e| e.field.starts_with(field_prefix))
    }

    #[test]
    fn default_config_passes() {
        let issues = Config::default().validate();
        let errors: Vec<_> = issues
            .iter()
            .filter(|e| e.severity == ConfigSeverity::Error)
            .collect();
        assert!(errors.is_empty(), "expected no errors, got: {errors:?}");
    }

    #[test]
    fn zero_timeout_is_error() {
        let mut cfg = Config::default();
        cfg.timeouts.llm_secs = 0;
        let issues = cfg.validate();
        find_issue(&issues, "timeouts.llm_secs").expect("expected timeout error");
    }

    #[test]
    fn zero_circuit_failure_threshold_is_error() {
        let mut cfg = Config::default();
        cfg.circuits.llm.failure_threshold = 0;
        let issues = cfg.validate();
        find_issue(&issues, "circuits.llm.failure_threshold").expect("expected error");
    }

    #[test]
    fn decay_min_retention_out_of_range_is_error() {
        let mut cfg = Config::default();
        cfg.decay.min_retention = 1.5;
        let issues = cfg.validate();
        find_issue(&issues, "decay.min_retention").expect("expected error");
    }

    #[test]
    fn half_life_must_be_positive() {
        let mut cfg = Config::default();
        cfg.decay.half_life_event_days = 0.0;
        let issues = cfg.validate();
        find_issue(&issues, "decay.half_life_event_days").expect("expected error");
    }

    #[test]
    fn otlp_endpoint_must_be_http() {
        let mut cfg = Config::default();
        cfg.observability.otlp_endpoint = Some("localhost:4317".into());
        let issues = cfg.validate();
        find_issue(&issues, "observability.otlp_endpoint").expect("expected error");
    }

    #[test]
    fn env_overrides_bind_and_fall_back() {
        std::env::remove_var("MNEMO_LLM_TIMEOUT_SECS");
        let cfg = TimeoutsConfig::from_env();
        assert_eq!(cfg.llm_secs, 60);
    }

    #[test]
    fn from_env_produces_valid_config() {
        let cfg = Config::from_env();
        let errors: Vec<_> = cfg
            .validate()
            .into_iter()
            .filter(|e| e.severity == ConfigSeverity::Error)
            .collect();
        assert!(errors.is_empty());
    }

    #[test]
    fn half_life_lookup_matches_memory_type() {
        use crate::model::MemoryType;
        let cfg = DecayConfig::default();
        assert_eq!(cfg.half_life_days(MemoryType::Event), 30.0);
        assert_eq!(cfg.half_life_days(MemoryType::Fact), 180.0);
    }

    #[test]
    fn budget_chars_for_scales_by_chars_per_token() {
        let cfg = BudgetConfig::default();
        assert_eq!(cfg.chars_for(100), 400);
    }
}
