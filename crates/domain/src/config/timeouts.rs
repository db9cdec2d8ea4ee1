use serde::{Deserialize, Serialize};

use super::env_u64;

/// Deadlines bounding every outbound call to an external collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutsConfig {
    #[serde(default = "d_llm_secs")]
    pub llm_secs: u64,
    #[serde(default = "d_embed_secs")]
    pub embed_secs: u64,
    #[serde(default = "d_http_secs")]
    pub http_secs: u64,
    #[serde(default = "d_max_retries")]
    pub max_retries: u32,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            llm_secs: d_llm_secs(),
            embed_secs: d_embed_secs(),
            http_secs: d_http_secs(),
            max_retries: d_max_retries(),
        }
    }
}

impl TimeoutsConfig {
    pub fn from_env() -> Self {
        Self {
            llm_secs: env_u64("MNEMO_LLM_TIMEOUT_SECS", d_llm_secs()),
            embed_secs: env_u64("MNEMO_EMBED_TIMEOUT_SECS", d_embed_secs()),
            http_secs: env_u64("MNEMO_HTTP_TIMEOUT_SECS", d_http_secs()),
            max_retries: env_u64("MNEMO_MAX_RETRIES", d_max_retries() as u64) as u32,
        }
    }
}

fn d_llm_secs() -> u64 {
    60
}
fn d_embed_secs() -> u64 {
    15
}
fn d_http_secs() -> u64 {
    30
}
fn d_max_retries() -> u32 {
    2
}
