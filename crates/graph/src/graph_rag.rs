//! Hybrid NER+LLM entity extraction and graph-grounded retrieval.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use sa_domain::collaborators::{EntityExtractor, ExtractedEntity, GenerateOptions, LLMClient};
use sa_domain::config::GraphConfig;
use sa_domain::error::{ErrorKind, MemoryError, Result};
use sa_domain::model::{Entity, EntityType, Relation};

use crate::knowledge_graph::KnowledgeGraph;

const NER_TRUNCATE_CHARS: usize = 1000;

const EXTRACTION_PROMPT: &str = "Extract the entities and relations mentioned in the following text. \
Respond with ONLY a JSON object of the exact shape \
{\"entities\":[{\"name\":string,\"type\":\"person\"|\"project\"|\"tool\"|\"concept\"|\"preference\",\"importance\":number}],\
\"relations\":[{\"source\":string,\"target\":string,\"relation\":string}]}. \
No prose, no markdown fences.\n\nText:\n";

const QUERY_ENTITIES_PROMPT: &str = "List the key entity names mentioned or implied by the following \
question, as a JSON array of strings, nothing else.\n\nQuestion:\n";

#[derive(Debug, Deserialize)]
struct LlmExtraction {
    #[serde(default)]
    entities: Vec<LlmEntity>,
    #[serde(default)]
    relations: Vec<LlmRelation>,
}

#[derive(Debug, Deserialize)]
struct LlmEntity {
    name: String,
    #[serde(rename = "type")]
    type_label: String,
    importance: f64,
}

#[derive(Debug, Deserialize)]
struct LlmRelation {
    source: String,
    target: String,
    relation: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ExtractionReport {
    pub entities_added: u64,
    pub relations_added: u64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct GraphQueryResult {
    pub entities: Vec<Entity>,
    pub relations: Vec<Relation>,
    pub paths: Vec<Vec<String>>,
    pub context_text: String,
    pub relevance_score: f64,
}

struct MergedEntity {
    name: String,
    entity_type: EntityType,
    importance: f64,
}

pub struct GraphRAG {
    graph: KnowledgeGraph,
    config: GraphConfig,
}

impl GraphRAG {
    pub fn new(graph: KnowledgeGraph, config: GraphConfig) -> Self {
        Self { graph, config }
    }

    pub fn graph(&self) -> &KnowledgeGraph {
        &self.graph
    }

    fn map_ner_type(label: &str) -> EntityType {
        match label.to_lowercase().as_str() {
            "person" | "per" => EntityType::Person,
            "project" | "org" | "organization" => EntityType::Project,
            "tool" | "product" => EntityType::Tool,
            "preference" => EntityType::Preference,
            _ => EntityType::Concept,
        }
    }

    async fn run_ner(
        &self,
        extractor: Option<&dyn EntityExtractor>,
        text: &str,
    ) -> (Vec<ExtractedEntity>, f32) {
        let Some(extractor) = extractor else {
            return (vec![], 0.0);
        };
        let truncated: String = text.chars().take(NER_TRUNCATE_CHARS).collect();
        match extractor.extract(&truncated).await {
            Ok(mut candidates) => {
                let mut seen = std::collections::HashSet::new();
                candidates.retain(|c| seen.insert(c.name.to_lowercase()));
                let min_confidence = candidates
                    .iter()
                    .map(|c| c.confidence)
                    .fold(f32::INFINITY, f32::min);
                let confidence = if candidates.is_empty() { 0.0 } else { min_confidence };
                (candidates, confidence)
            }
            Err(error) => {
                tracing::warn!(%error, "NER extraction failed, falling through to LLM");
                (vec![], 0.0)
            }
        }
    }

    async fn run_llm_extraction(&self, llm: &dyn LLMClient, text: &str) -> Result<LlmExtraction> {
        let prompt = format!("{EXTRACTION_PROMPT}{text}");
        let opts = GenerateOptions {
            temperature: 0.1,
            max_tokens: 1024,
            timeout: Duration::from_secs(30),
        };
        let raw = llm.generate(&prompt, opts).await?;
        let cleaned = raw.trim().trim_start_matches("```json").trim_start_matches("```").trim_end_matches("```");
        serde_json::from_str(cleaned.trim())
            .map_err(|e| MemoryError::new(ErrorKind::BadFormat, format!("LLM extraction response was not valid JSON: {e}")))
    }

    /// Ingest `text`: NER baseline, decision gate, LLM extraction when
    /// warranted, merge, filter by importance, upsert into the graph.
    /// Already-added entities from the same call remain on a later failure
    /// (partial success is permitted by the merge-on-dedup invariant).
    pub async fn extract_and_store(
        &self,
        text: &str,
        llm: &dyn LLMClient,
        extractor: Option<&dyn EntityExtractor>,
    ) -> Result<ExtractionReport> {
        let (ner_entities, ner_confidence) = self.run_ner(extractor, text).await;

        let needs_llm = text.chars().count() >= self.config.ner_decision_text_len
            || ner_confidence < self.config.ner_confidence_threshold
            || ner_entities.is_empty();

        let mut merged: Vec<MergedEntity> = ner_entities
            .iter()
            .map(|e| MergedEntity {
                name: e.name.clone(),
                entity_type: Self::map_ner_type(&e.type_label),
                importance: 0.7,
            })
            .collect();
        let mut relations: Vec<LlmRelation> = Vec::new();

        if needs_llm {
            let extraction = self.run_llm_extraction(llm, text).await?;
            for llm_entity in extraction.entities {
                let entity_type = llm_entity
                    .type_label
                    .parse()
                    .unwrap_or(EntityType::Concept);
                if let Some(existing) = merged
                    .iter_mut()
                    .find(|m| m.name.eq_ignore_ascii_case(&llm_entity.name))
                {
                    existing.entity_type = entity_type;
                    existing.importance = llm_entity.importance;
                } else {
                    merged.push(MergedEntity {
                        name: llm_entity.name,
                        entity_type,
                        importance: llm_entity.importance,
                    });
                }
            }
            relations = extraction.relations;
        }

        merged.retain(|e| e.importance >= self.config.entity_importance_threshold);

        let mut name_to_id: HashMap<String, String> = HashMap::new();
        let mut entities_added = 0u64;
        for entity in &merged {
            let id = self.graph.add_entity(&entity.name, entity.entity_type, HashMap::new())?;
            name_to_id.insert(entity.name.to_lowercase(), id);
            entities_added += 1;
        }

        let mut relations_added = 0u64;
        for relation in relations {
            let (Some(source_id), Some(target_id)) = (
                name_to_id.get(&relation.source.to_lowercase()),
                name_to_id.get(&relation.target.to_lowercase()),
            ) else {
                continue;
            };
            self.graph
                .add_relation(source_id, target_id, &relation.relation, 0.5, None)?;
            relations_added += 1;
        }

        self.graph.save_if_configured()?;

        Ok(ExtractionReport {
            entities_added,
            relations_added,
        })
    }

    async fn extract_query_entity_names(&self, llm: &dyn LLMClient, query: &str) -> Vec<String> {
        let prompt = format!("{QUERY_ENTITIES_PROMPT}{query}");
        let opts = GenerateOptions {
            temperature: 0.0,
            max_tokens: 128,
            timeout: Duration::from_secs(15),
        };
        match llm.generate(&prompt, opts).await {
            Ok(raw) => serde_json::from_str::<Vec<String>>(raw.trim()).unwrap_or_default(),
            Err(error) => {
                tracing::warn!(%error, "query entity extraction failed, falling back to keyword match");
                vec![]
            }
        }
    }

    fn format_context(&self, entities: &[Entity], relations: &[Relation], paths: &[Vec<String>]) -> String {
        let mut out = String::new();
        out.push_str("Entities:\n");
        for entity in entities.iter().take(self.config.max_format_entities) {
            out.push_str(&format!("- {} ({})\n", entity.name, entity.entity_type));
        }
        out.push_str("Relations:\n");
        for relation in relations.iter().take(self.config.max_format_relations) {
            out.push_str(&format!(
                "- {} -[{}]-> {}\n",
                relation.source_id, relation.relation_type, relation.target_id
            ));
        }
        if !paths.is_empty() {
            out.push_str("Paths:\n");
            for path in paths {
                out.push_str(&format!("- {}\n", path.join(" -> ")));
            }
        }
        out
    }

    fn resolve_seeds(&self, names: &[String]) -> Vec<Entity> {
        names
            .iter()
            .filter_map(|n| self.graph.find_entity_by_name(n))
            .take(self.config.max_query_entities)
            .collect()
    }

    fn expand_and_collect(&self, seeds: &[Entity], max_depth: usize) -> (Vec<Entity>, Vec<Relation>) {
        let mut entity_ids: Vec<String> = seeds.iter().map(|e| e.id.clone()).collect();
        for seed in seeds {
            for neighbor in self.graph.get_neighbors(&seed.id, max_depth) {
                if !entity_ids.contains(&neighbor) {
                    entity_ids.push(neighbor);
                }
            }
        }

        let entities: Vec<Entity> = entity_ids
            .iter()
            .filter_map(|id| self.graph.get_entity(id))
            .collect();

        let mut seen_relations = std::collections::HashSet::new();
        let mut relations = Vec::new();
        for id in &entity_ids {
            for relation in self.graph.get_relations_for_entity(id) {
                if seen_relations.insert(relation.composite_id()) {
                    relations.push(relation);
                }
            }
        }
        relations.truncate(self.config.max_relations);

        (entities, relations)
    }

    fn pairwise_paths(&self, seeds: &[Entity], max_depth: usize) -> Vec<Vec<String>> {
        let mut paths = Vec::new();
        'outer: for i in 0..seeds.len() {
            for j in (i + 1)..seeds.len() {
                let path = self.graph.find_path(&seeds[i].id, &seeds[j].id, max_depth);
                if !path.is_empty() {
                    paths.push(path);
                    if paths.len() >= self.config.max_paths {
                        break 'outer;
                    }
                }
            }
        }
        paths
    }

    /// LLM-driven seed extraction, BFS expansion, and a rendered context
    /// block. Relations are capped by `config.max_relations`.
    pub async fn query(&self, question: &str, max_depth: usize, llm: &dyn LLMClient) -> GraphQueryResult {
        let names = self.extract_query_entity_names(llm, question).await;
        let seeds = if names.is_empty() {
            self.graph.find_entities_by_keyword(question)
                .into_iter()
                .take(self.config.max_query_entities)
                .collect()
        } else {
            self.resolve_seeds(&names)
        };

        let (entities, relations) = self.expand_and_collect(&seeds, max_depth);
        let paths = self.pairwise_paths(&seeds, max_depth);
        let context_text = self.format_context(&entities, &relations, &paths);
        let relevance_score = (0.2 * entities.len() as f64).min(1.0);

        GraphQueryResult {
            entities,
            relations,
            paths,
            context_text,
            relevance_score,
        }
    }

    /// Synchronous, keyword-only variant for latency-critical callers: no
    /// LLM round-trip, name-index lookups only. Caps returned relations by
    /// `config.max_relations`, same as the async path.
    pub fn query_sync(&self, question: &str, max_depth: usize) -> GraphQueryResult {
        let seeds: Vec<Entity> = self
            .graph
            .find_entities_by_keyword(question)
            .into_iter()
            .take(self.config.max_query_entities)
            .collect();

        let (entities, relations) = self.expand_and_collect(&seeds, max_depth);
        let paths = self.pairwise_paths(&seeds, max_depth);
        let context_text = self.format_context(&entities, &relations, &paths);
        let relevance_score = (0.2 * entities.len() as f64).min(1.0);

        GraphQueryResult {
            entities,
            relations,
            paths,
            context_text,
            relevance_score,
        }
    }

    pub fn stats(&self) -> crate::knowledge_graph::GraphStats {
        self.graph.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sa_domain::collaborators::GenerateOptions;

    struct StubLlm(String);

    #[async_trait]
    impl LLMClient for StubLlm {
        async fn generate(&self, _prompt: &str, _opts: GenerateOptions) -> Result<String> {
            Ok(self.0.clone())
        }
    }

    struct StubExtractor(Vec<ExtractedEntity>);

    #[async_trait]
    impl EntityExtractor for StubExtractor {
        async fn extract(&self, _text: &str) -> Result<Vec<ExtractedEntity>> {
            Ok(self.0.clone())
        }
    }

    fn rag() -> GraphRAG {
        GraphRAG::new(KnowledgeGraph::new(), GraphConfig::default())
    }

    #[tokio::test]
    async fn short_high_confidence_ner_skips_llm() {
        let rag = rag();
        let extractor = StubExtractor(vec![ExtractedEntity {
            name: "Alice".into(),
            type_label: "person".into(),
            confidence: 0.95,
        }]);
        let llm = StubLlm("should not be parsed as json".into());

        let report = rag
            .extract_and_store("Alice is here.", &llm, Some(&extractor))
            .await
            .unwrap();
        assert_eq!(report.entities_added, 1);
    }

    #[tokio::test]
    async fn low_confidence_ner_triggers_llm_merge() {
        let rag = rag();
        let extractor = StubExtractor(vec![ExtractedEntity {
            name: "Alice".into(),
            type_label: "person".into(),
            confidence: 0.2,
        }]);
        let llm = StubLlm(
            r#"{"entities":[{"name":"Alice","type":"person","importance":0.9},
                {"name":"Project X","type":"project","importance":0.8}],
                "relations":[{"source":"Alice","target":"Project X","relation":"leads"}]}"#
                .into(),
        );

        let report = rag
            .extract_and_store("Alice leads Project X.", &llm, Some(&extractor))
            .await
            .unwrap();
        assert_eq!(report.entities_added, 2);
        assert_eq!(report.relations_added, 1);
    }

    #[tokio::test]
    async fn entities_below_importance_threshold_are_dropped() {
        let rag = rag();
        let llm = StubLlm(
            r#"{"entities":[{"name":"Trivial","type":"concept","importance":0.1}],"relations":[]}"#.into(),
        );
        let report = rag.extract_and_store("something trivial", &llm, None).await.unwrap();
        assert_eq!(report.entities_added, 0);
    }

    #[tokio::test]
    async fn malformed_llm_json_is_a_typed_error() {
        let rag = rag();
        let llm = StubLlm("not json at all".into());
        let result = rag.extract_and_store("a very long piece of text ".repeat(20).as_str(), &llm, None).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn query_sync_and_query_cap_relations_identically() {
        let rag = rag();
        let a = rag.graph().add_entity("Alice", EntityType::Person, HashMap::new()).unwrap();
        let b = rag.graph().add_entity("Bob", EntityType::Person, HashMap::new()).unwrap();
        rag.graph().add_relation(&a, &b, "knows", 0.5, None).unwrap();

        let sync_result = rag.query_sync("Alice", 2);
        let llm = StubLlm(r#"["Alice"]"#.into());
        let async_result = rag.query("Alice", 2, &llm).await;

        assert!(sync_result.relations.len() <= rag.config.max_relations);
        assert!(async_result.relations.len() <= rag.config.max_relations);
    }
}
