use serde::{Deserialize, Serialize};

/// Default parameters for a named `TTLCache` the first time it is requested.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CacheConfig {
    pub maxsize: usize,
    pub ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            maxsize: 100,
            ttl_seconds: 300,
        }
    }
}
