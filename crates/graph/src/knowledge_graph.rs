//! In-memory entity/relation graph with derived indexes, rebuilt from
//! persisted state on load. Cyclic by nature — adjacency is always derived,
//! never itself serialized.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};

use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use sa_domain::error::{ErrorKind, MemoryError, Result};
use sa_domain::model::{Entity, EntityType, Relation};

/// English articles/pronouns/auxiliaries plus a handful of Korean
/// demonstratives and pronouns — concept-typed entities normalizing to one
/// of these are rejected outright rather than cluttering the graph.
const ENTITY_STOPWORDS: &[&str] = &[
    "the", "a", "an", "this", "that", "these", "those", "it", "he", "she", "they", "is", "are",
    "was", "were", "am", "be", "been", "그", "이", "저", "것", "그것", "이것",
];

#[derive(Debug, Clone, Default, Serialize)]
pub struct GraphStats {
    pub entity_count: usize,
    pub relation_count: usize,
    pub total_mentions: u64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RecalculateReport {
    pub total: u64,
    pub changed: u64,
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct GraphDocument {
    entities: Vec<Entity>,
    relations: Vec<Relation>,
    #[serde(default)]
    cooccurrence: HashMap<String, u64>,
    #[serde(default)]
    entity_mentions: HashMap<String, u64>,
}

struct Indexes {
    entities: HashMap<String, Entity>,
    relations: HashMap<String, Relation>,
    adjacency: HashMap<String, HashSet<String>>,
    name_index: HashMap<String, String>,
    relation_index: HashMap<String, Vec<String>>,
    cooccurrence: HashMap<(String, String), u64>,
    mentions: HashMap<String, u64>,
}

impl Indexes {
    fn empty() -> Self {
        Self {
            entities: HashMap::new(),
            relations: HashMap::new(),
            adjacency: HashMap::new(),
            name_index: HashMap::new(),
            relation_index: HashMap::new(),
            cooccurrence: HashMap::new(),
            mentions: HashMap::new(),
        }
    }

    fn from_document(doc: GraphDocument) -> Self {
        let mut idx = Self::empty();
        for entity in doc.entities {
            idx.name_index
                .insert(normalize_name(&entity.name), entity.id.clone());
            idx.mentions.insert(entity.id.clone(), entity.mentions);
            idx.adjacency.entry(entity.id.clone()).or_default();
            idx.relation_index.entry(entity.id.clone()).or_default();
            idx.entities.insert(entity.id.clone(), entity);
        }
        for relation in doc.relations {
            let composite = relation.composite_id();
            idx.adjacency
                .entry(relation.source_id.clone())
                .or_default()
                .insert(relation.target_id.clone());
            idx.adjacency
                .entry(relation.target_id.clone())
                .or_default()
                .insert(relation.source_id.clone());
            idx.relation_index
                .entry(relation.source_id.clone())
                .or_default()
                .push(composite.clone());
            idx.relation_index
                .entry(relation.target_id.clone())
                .or_default()
                .push(composite.clone());
            idx.relations.insert(composite, relation);
        }
        for (key, count) in doc.cooccurrence {
            if let Some((a, b)) = key.split_once('|') {
                idx.cooccurrence.insert((a.to_string(), b.to_string()), count);
            }
        }
        for (id, count) in doc.entity_mentions {
            idx.mentions.insert(id, count);
        }
        idx
    }

    fn to_document(&self) -> GraphDocument {
        GraphDocument {
            entities: self.entities.values().cloned().collect(),
            relations: self.relations.values().cloned().collect(),
            cooccurrence: self
                .cooccurrence
                .iter()
                .map(|((a, b), count)| (format!("{a}|{b}"), *count))
                .collect(),
            entity_mentions: self.mentions.clone(),
        }
    }
}

fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

fn sorted_pair(a: &str, b: &str) -> (String, String) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

pub struct KnowledgeGraph {
    indexes: RwLock<Indexes>,
    persist_path: Option<PathBuf>,
}

impl KnowledgeGraph {
    pub fn new() -> Self {
        Self {
            indexes: RwLock::new(Indexes::empty()),
            persist_path: None,
        }
    }

    pub fn with_persist_path(path: impl Into<PathBuf>) -> Self {
        Self {
            indexes: RwLock::new(Indexes::empty()),
            persist_path: Some(path.into()),
        }
    }

    /// Load from `path` if it exists; start empty otherwise. A structurally
    /// invalid document yields a typed `load-failed` error rather than
    /// panicking — callers decide whether to proceed from empty.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if !path.exists() {
            return Ok(Self::with_persist_path(path));
        }
        let raw = std::fs::read_to_string(&path)?;
        let doc: GraphDocument = serde_json::from_str(&raw).map_err(|e| {
            MemoryError::new(
                ErrorKind::PageLoadFailed,
                format!("graph document at {} is malformed: {e}", path.display()),
            )
        })?;
        Ok(Self {
            indexes: RwLock::new(Indexes::from_document(doc)),
            persist_path: Some(path),
        })
    }

    /// Atomic write-then-rename: write to a sibling temp file, then rename
    /// over the target so a crash mid-write never leaves a truncated graph.
    pub fn save(&self) -> Result<()> {
        let path = self
            .persist_path
            .as_ref()
            .ok_or_else(|| MemoryError::new(ErrorKind::InvalidParam, "graph has no persist path"))?;
        let doc = self.indexes.read().to_document();
        let json = serde_json::to_string_pretty(&doc)?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let tmp_path = tmp_path_for(path);
        std::fs::write(&tmp_path, format!("{json}\n"))?;
        std::fs::rename(&tmp_path, path)?;
        Ok(())
    }

    pub fn add_entity(
        &self,
        name: &str,
        entity_type: EntityType,
        properties: HashMap<String, String>,
    ) -> Result<String> {
        let normalized = normalize_name(name);
        if entity_type == EntityType::Concept && ENTITY_STOPWORDS.contains(&normalized.as_str()) {
            return Err(MemoryError::new(
                ErrorKind::InvalidParam,
                format!("entity name '{name}' is a stopword and cannot be added as a concept"),
            ));
        }

        let mut idx = self.indexes.write();
        if let Some(existing_id) = idx.name_index.get(&normalized).cloned() {
            let entity = idx.entities.get_mut(&existing_id).expect("name index points at a live entity");
            entity.mentions += 1;
            if entity.entity_type == EntityType::Concept && entity_type != EntityType::Concept {
                entity.entity_type = entity_type;
            }
            for (k, v) in properties {
                entity.properties.insert(k, v);
            }
            entity.last_accessed = Utc::now();
            idx.mentions.insert(existing_id.clone(), entity.mentions);
            return Ok(existing_id);
        }

        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let entity = Entity {
            id: id.clone(),
            name: name.to_string(),
            entity_type,
            properties,
            mentions: 1,
            created_at: now,
            last_accessed: now,
        };
        idx.name_index.insert(normalized, id.clone());
        idx.mentions.insert(id.clone(), 1);
        idx.adjacency.entry(id.clone()).or_default();
        idx.relation_index.entry(id.clone()).or_default();
        idx.entities.insert(id.clone(), entity);
        Ok(id)
    }

    pub fn add_relation(
        &self,
        source_id: &str,
        target_id: &str,
        relation_type: &str,
        weight: f64,
        context: Option<String>,
    ) -> Result<()> {
        let mut idx = self.indexes.write();
        if !idx.entities.contains_key(source_id) {
            return Err(MemoryError::new(ErrorKind::EntityNotFound, source_id));
        }
        if !idx.entities.contains_key(target_id) {
            return Err(MemoryError::new(ErrorKind::EntityNotFound, target_id));
        }

        let probe = Relation {
            source_id: source_id.to_string(),
            target_id: target_id.to_string(),
            relation_type: relation_type.to_string(),
            weight,
            context: context.clone(),
            created_at: Utc::now(),
        };
        let composite = probe.composite_id();

        let pair = sorted_pair(source_id, target_id);
        *idx.cooccurrence.entry(pair).or_insert(0) += 1;
        if let Some(e) = idx.entities.get_mut(source_id) {
            e.mentions += 1;
        }
        if let Some(e) = idx.entities.get_mut(target_id) {
            e.mentions += 1;
        }
        idx.mentions.insert(source_id.to_string(), idx.entities[source_id].mentions);
        idx.mentions.insert(target_id.to_string(), idx.entities[target_id].mentions);

        if let Some(existing) = idx.relations.get_mut(&composite) {
            existing.weight = (existing.weight + 0.1).min(1.0);
            return Ok(());
        }

        idx.adjacency.entry(source_id.to_string()).or_default().insert(target_id.to_string());
        idx.adjacency.entry(target_id.to_string()).or_default().insert(source_id.to_string());
        idx.relation_index.entry(source_id.to_string()).or_default().push(composite.clone());
        idx.relation_index.entry(target_id.to_string()).or_default().push(composite.clone());
        idx.relations.insert(composite, probe);
        Ok(())
    }

    pub fn get_entity(&self, id: &str) -> Option<Entity> {
        self.indexes.read().entities.get(id).cloned()
    }

    pub fn find_entity_by_name(&self, name: &str) -> Option<Entity> {
        let idx = self.indexes.read();
        idx.name_index
            .get(&normalize_name(name))
            .and_then(|id| idx.entities.get(id))
            .cloned()
    }

    /// Keyword-only lookup used by `query_sync`: every entity whose
    /// normalized name appears verbatim in the (lowercased) query text.
    pub fn find_entities_by_keyword(&self, query: &str) -> Vec<Entity> {
        let lowered = query.to_lowercase();
        let idx = self.indexes.read();
        idx.name_index
            .iter()
            .filter(|(name, _)| lowered.contains(name.as_str()))
            .filter_map(|(_, id)| idx.entities.get(id).cloned())
            .collect()
    }

    /// BFS over the undirected adjacency, excluding the start node, up to
    /// `depth` hops.
    pub fn get_neighbors(&self, entity_id: &str, depth: usize) -> HashSet<String> {
        let idx = self.indexes.read();
        let mut visited = HashSet::new();
        visited.insert(entity_id.to_string());
        let mut frontier = VecDeque::new();
        frontier.push_back((entity_id.to_string(), 0usize));
        let mut result = HashSet::new();

        while let Some((node, hops)) = frontier.pop_front() {
            if hops >= depth {
                continue;
            }
            if let Some(neighbors) = idx.adjacency.get(&node) {
                for neighbor in neighbors {
                    if visited.insert(neighbor.clone()) {
                        result.insert(neighbor.clone());
                        frontier.push_back((neighbor.clone(), hops + 1));
                    }
                }
            }
        }

        result
    }

    pub fn get_relations_for_entity(&self, entity_id: &str) -> Vec<Relation> {
        let idx = self.indexes.read();
        idx.relation_index
            .get(entity_id)
            .map(|ids| ids.iter().filter_map(|id| idx.relations.get(id).cloned()).collect())
            .unwrap_or_default()
    }

    /// Shortest-path BFS returning the node sequence inclusive of endpoints,
    /// or empty on disconnection / depth exhaustion. A branch whose path
    /// length would exceed `max_depth` is pruned rather than aborting the
    /// whole search.
    pub fn find_path(&self, source_id: &str, target_id: &str, max_depth: usize) -> Vec<String> {
        if source_id == target_id {
            return vec![source_id.to_string()];
        }
        let idx = self.indexes.read();
        if !idx.entities.contains_key(source_id) || !idx.entities.contains_key(target_id) {
            return vec![];
        }

        let mut visited = HashSet::new();
        visited.insert(source_id.to_string());
        let mut frontier = VecDeque::new();
        frontier.push_back(vec![source_id.to_string()]);

        while let Some(path) = frontier.pop_front() {
            let last = path.last().expect("path always has at least the source node");
            if path.len() - 1 >= max_depth {
                continue;
            }
            let Some(neighbors) = idx.adjacency.get(last) else {
                continue;
            };
            for neighbor in neighbors {
                if neighbor == target_id {
                    let mut found = path.clone();
                    found.push(neighbor.clone());
                    return found;
                }
                if visited.insert(neighbor.clone()) {
                    let mut extended = path.clone();
                    extended.push(neighbor.clone());
                    frontier.push_back(extended);
                }
            }
        }

        vec![]
    }

    /// Recompute every relation's weight from co-occurrence and per-entity
    /// mention frequency: `TF = pair_count / max(source_mentions, 1)`,
    /// `IDF = ln(total_entities / (1 + source_cooccur))`,
    /// `weight = clamp(0.7*TF*IDF + 0.3*baseline, 0, 1)`.
    pub fn recalculate_weights(&self) -> RecalculateReport {
        let mut idx = self.indexes.write();
        let total_entities = idx.entities.len().max(1) as f64;

        let mut source_cooccur: HashMap<String, u64> = HashMap::new();
        for (a, b) in idx.cooccurrence.keys() {
            *source_cooccur.entry(a.clone()).or_insert(0) += 1;
            *source_cooccur.entry(b.clone()).or_insert(0) += 1;
        }

        let mut total = 0u64;
        let mut changed = 0u64;
        for relation in idx.relations.values_mut() {
            total += 1;
            let pair = sorted_pair(&relation.source_id, &relation.target_id);
            let pair_count = *idx.cooccurrence.get(&pair).unwrap_or(&0) as f64;
            let source_mentions = idx
                .mentions
                .get(&relation.source_id)
                .copied()
                .unwrap_or(0)
                .max(1) as f64;
            let tf = pair_count / source_mentions;
            let cooccur = source_cooccur.get(&relation.source_id).copied().unwrap_or(0) as f64;
            let idf = (total_entities / (1.0 + cooccur)).ln();
            let baseline = relation.weight;
            let new_weight = (0.7 * tf * idf + 0.3 * baseline).clamp(0.0, 1.0);

            if (new_weight - relation.weight).abs() > 0.001 {
                changed += 1;
            }
            relation.weight = new_weight;
        }

        RecalculateReport { total, changed }
    }

    pub fn stats(&self) -> GraphStats {
        let idx = self.indexes.read();
        GraphStats {
            entity_count: idx.entities.len(),
            relation_count: idx.relations.len(),
            total_mentions: idx.mentions.values().sum(),
        }
    }

    pub fn entity_count(&self) -> usize {
        self.indexes.read().entities.len()
    }

    /// Save when a persist path is configured, otherwise a no-op. Callers
    /// that don't care whether persistence is wired up (ingestion,
    /// maintenance) use this instead of `save()`.
    pub fn save_if_configured(&self) -> Result<()> {
        if self.persist_path.is_some() {
            self.save()
        } else {
            Ok(())
        }
    }

    /// Delete an entity and every relation incident to it. Used by the
    /// maintenance graph-cleanup phase.
    pub fn remove_entity(&self, entity_id: &str) {
        let mut idx = self.indexes.write();
        let Some(entity) = idx.entities.remove(entity_id) else {
            return;
        };
        idx.name_index.remove(&normalize_name(&entity.name));
        idx.mentions.remove(entity_id);

        let incident = idx.relation_index.remove(entity_id).unwrap_or_default();
        for composite in incident {
            if let Some(relation) = idx.relations.remove(&composite) {
                let other = if relation.source_id == entity_id {
                    relation.target_id
                } else {
                    relation.source_id
                };
                if let Some(ids) = idx.relation_index.get_mut(&other) {
                    ids.retain(|id| id != &composite);
                }
            }
        }

        if let Some(neighbors) = idx.adjacency.remove(entity_id) {
            for neighbor in neighbors {
                if let Some(set) = idx.adjacency.get_mut(&neighbor) {
                    set.remove(entity_id);
                }
            }
        }
    }

    /// Delete every relation whose weight falls below `min_weight`. Used by
    /// the maintenance graph-cleanup phase.
    pub fn remove_weak_relations(&self, min_weight: f64) -> u64 {
        let mut idx = self.indexes.write();
        let to_remove: Vec<String> = idx
            .relations
            .iter()
            .filter(|(_, r)| r.weight < min_weight)
            .map(|(id, _)| id.clone())
            .collect();

        for composite in &to_remove {
            if let Some(relation) = idx.relations.remove(composite) {
                if let Some(set) = idx.adjacency.get_mut(&relation.source_id) {
                    set.remove(&relation.target_id);
                }
                if let Some(set) = idx.adjacency.get_mut(&relation.target_id) {
                    set.remove(&relation.source_id);
                }
                for id in [&relation.source_id, &relation.target_id] {
                    if let Some(ids) = idx.relation_index.get_mut(id) {
                        ids.retain(|c| c != composite);
                    }
                }
            }
        }
        to_remove.len() as u64
    }

    pub fn entities_older_than_with_mentions_below(
        &self,
        age: chrono::Duration,
        min_mentions: u64,
    ) -> Vec<String> {
        let idx = self.indexes.read();
        let cutoff = Utc::now() - age;
        idx.entities
            .values()
            .filter(|e| e.created_at < cutoff && e.mentions < min_mentions)
            .map(|e| e.id.clone())
            .collect()
    }

    /// Count of relations `remove_weak_relations(min_weight)` would delete,
    /// without deleting them. Used by the maintenance graph-cleanup phase's
    /// dry-run preview.
    pub fn weak_relation_count(&self, min_weight: f64) -> u64 {
        self.indexes
            .read()
            .relations
            .values()
            .filter(|r| r.weight < min_weight)
            .count() as u64
    }

    /// Delete relations whose source or target no longer has an entity.
    /// `remove_entity` and `remove_weak_relations` already keep the graph
    /// orphan-free by construction, so this is a defensive sweep rather than
    /// a normally-reachable path.
    pub fn remove_orphan_relations(&self) -> u64 {
        let mut idx = self.indexes.write();
        let to_remove: Vec<String> = idx
            .relations
            .iter()
            .filter(|(_, r)| {
                !idx.entities.contains_key(&r.source_id) || !idx.entities.contains_key(&r.target_id)
            })
            .map(|(id, _)| id.clone())
            .collect();

        for composite in &to_remove {
            if let Some(relation) = idx.relations.remove(composite) {
                if let Some(set) = idx.adjacency.get_mut(&relation.source_id) {
                    set.remove(&relation.target_id);
                }
                if let Some(set) = idx.adjacency.get_mut(&relation.target_id) {
                    set.remove(&relation.source_id);
                }
                for id in [&relation.source_id, &relation.target_id] {
                    if let Some(ids) = idx.relation_index.get_mut(id) {
                        ids.retain(|c| c != composite);
                    }
                }
            }
        }
        to_remove.len() as u64
    }

    /// Count of relations `remove_orphan_relations` would delete, without
    /// deleting them.
    pub fn orphan_relation_count(&self) -> u64 {
        let idx = self.indexes.read();
        idx.relations
            .values()
            .filter(|r| !idx.entities.contains_key(&r.source_id) || !idx.entities.contains_key(&r.target_id))
            .count() as u64
    }
}

impl Default for KnowledgeGraph {
    fn default() -> Self {
        Self::new()
    }
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}
