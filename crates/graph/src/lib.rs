//! In-memory knowledge graph and hybrid NER/LLM extraction over it.

pub mod graph_rag;
pub mod knowledge_graph;

pub use graph_rag::{ExtractionReport, GraphQueryResult, GraphRAG};
pub use knowledge_graph::{GraphStats, KnowledgeGraph, RecalculateReport};
