//! Long-term adaptive-decay memory: importance decay, embedding-similarity
//! search, and periodic consolidation.

pub mod consolidator;
pub mod decay;
pub mod store;

pub use consolidator::{Consolidator, ConsolidationReport};
pub use decay::{DecayCalculator, DecayInput};
pub use store::{LongTermStore, MemoryMetadataUpdate};
