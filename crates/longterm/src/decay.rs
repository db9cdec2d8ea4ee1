//! Age-based importance decay with recency/access/connection boosts.

use chrono::{DateTime, Utc};
use sa_domain::config::DecayConfig;
use sa_domain::model::MemoryType;

/// The inputs `DecayCalculator` needs for one memory. Deliberately separate
/// from `sa_domain::model::Memory` so callers can decay a candidate before
/// it has a row of its own (e.g. during the consolidator's batch pass).
#[derive(Debug, Clone, Copy)]
pub struct DecayInput {
    pub importance: f64,
    pub created_at: DateTime<Utc>,
    pub access_count: u64,
    pub connection_count: u64,
    pub last_accessed: DateTime<Utc>,
    pub memory_type: MemoryType,
}

pub struct DecayCalculator {
    config: DecayConfig,
}

impl DecayCalculator {
    pub fn new(config: DecayConfig) -> Self {
        Self { config }
    }

    fn half_life_days(&self, memory_type: MemoryType) -> f64 {
        match memory_type {
            MemoryType::Fact => self.config.half_life_fact_days,
            MemoryType::Preference => self.config.half_life_preference_days,
            MemoryType::Insight => self.config.half_life_insight_days,
            MemoryType::Event => self.config.half_life_event_days,
        }
    }

    /// Compute the decayed importance for one memory, clamped to
    /// `[min_retention, importance]`.
    pub fn calculate(&self, input: &DecayInput, now: DateTime<Utc>) -> f64 {
        let age_days = (now - input.created_at).num_seconds() as f64 / 86_400.0;
        let half_life = self.half_life_days(input.memory_type).max(f64::EPSILON);
        let decay_factor = (std::f64::consts::LN_2 * age_days / half_life).exp();

        let last_accessed_hours = (now - input.last_accessed).num_seconds() as f64 / 3_600.0;
        let recency_boost = if last_accessed_hours < 24.0 {
            1.3
        } else if last_accessed_hours < 168.0 {
            1.1
        } else {
            1.0
        };

        let access_boost =
            (1.0 + (1.0 + input.access_count as f64).log10() * 0.2).min(1.5);
        let connection_boost = (1.0 + 0.05 * input.connection_count as f64).min(1.25);

        let decayed = input.importance * recency_boost * access_boost * connection_boost
            / decay_factor.max(f64::EPSILON);

        decayed.clamp(self.config.min_retention, input.importance)
    }

    /// Batch entry point for consolidation throughput.
    pub fn calculate_batch(&self, inputs: &[DecayInput], now: DateTime<Utc>) -> Vec<f64> {
        inputs.iter().map(|i| self.calculate(i, now)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn calc() -> DecayCalculator {
        DecayCalculator::new(DecayConfig::default())
    }

    #[test]
    fn fresh_memory_clamps_recency_boost_to_importance() {
        let now = Utc::now();
        let input = DecayInput {
            importance: 0.8,
            created_at: now,
            access_count: 0,
            connection_count: 0,
            last_accessed: now,
            memory_type: MemoryType::Fact,
        };
        // decay_factor ~= 1, recency boost 1.3x would exceed importance, so
        // the upper clamp should bring it back down to exactly importance.
        let decayed = calc().calculate(&input, now);
        assert_eq!(decayed, 0.8);
    }

    #[test]
    fn very_old_memory_clamps_to_min_retention() {
        let now = Utc::now();
        let input = DecayInput {
            importance: 0.8,
            created_at: now - Duration::days(3650),
            access_count: 0,
            connection_count: 0,
            last_accessed: now - Duration::days(3650),
            memory_type: MemoryType::Event,
        };
        let decayed = calc().calculate(&input, now);
        assert_eq!(decayed, 0.05);
    }

    #[test]
    fn decayed_never_exceeds_importance() {
        let now = Utc::now();
        let input = DecayInput {
            importance: 0.5,
            created_at: now,
            access_count: 1000,
            connection_count: 1000,
            last_accessed: now,
            memory_type: MemoryType::Fact,
        };
        let decayed = calc().calculate(&input, now);
        assert!(decayed <= 0.5);
    }

    #[test]
    fn facts_decay_slower_than_events() {
        let now = Utc::now();
        let base = DecayInput {
            importance: 0.8,
            created_at: now - Duration::days(60),
            access_count: 0,
            connection_count: 0,
            last_accessed: now - Duration::days(60),
            memory_type: MemoryType::Fact,
        };
        let mut event = base;
        event.memory_type = MemoryType::Event;

        let calc = calc();
        assert!(calc.calculate(&base, now) > calc.calculate(&event, now));
    }

    #[test]
    fn batch_matches_individual() {
        let now = Utc::now();
        let input = DecayInput {
            importance: 0.6,
            created_at: now - Duration::days(10),
            access_count: 3,
            connection_count: 2,
            last_accessed: now - Duration::days(1),
            memory_type: MemoryType::Insight,
        };
        let calc = calc();
        let single = calc.calculate(&input, now);
        let batch = calc.calculate_batch(&[input], now);
        assert_eq!(batch[0], single);
    }
}
