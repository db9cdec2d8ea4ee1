//! The explicit registry of shared singletons (circuits, caches) threaded
//! through the `Facade` rather than reached via a global. Tests construct a
//! fresh `Registry` per case instead of sharing process-global state.

use sa_domain::config::Config;

use mnemo_resilience::{CacheRegistry, CircuitRegistry};

/// Owns every circuit breaker and named cache this subsystem uses. A single
/// `Registry` is constructed at `Facade` startup and handed by reference to
/// whichever component needs to gate or cache a call.
pub struct Registry {
    circuits: CircuitRegistry,
    caches: CacheRegistry<String>,
}

impl Registry {
    pub fn new(config: &Config) -> Self {
        Self {
            circuits: CircuitRegistry::new(&config.circuits),
            caches: CacheRegistry::new(config.cache),
        }
    }

    pub fn circuits(&self) -> &CircuitRegistry {
        &self.circuits
    }

    pub fn caches(&self) -> &CacheRegistry<String> {
        &self.caches
    }
}
