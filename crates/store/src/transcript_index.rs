//! In-memory reverse index for full-text session search. Same structure and
//! test style as this workspace's JSONL-backed transcript index, generalized
//! to SQL rows: built once from the `messages` table, then kept live as
//! turns are appended.

use std::collections::HashMap;

use parking_lot::RwLock;

#[derive(Debug, Clone)]
pub struct SearchHit {
    pub session_id: String,
    pub match_count: usize,
    pub preview: String,
}

const MAX_PREVIEW_LEN: usize = 160;
const MAX_RESULTS: usize = 50;

pub struct TranscriptIndex {
    index: RwLock<HashMap<String, HashMap<String, usize>>>,
    previews: RwLock<HashMap<(String, String), String>>,
}

impl TranscriptIndex {
    pub fn new() -> Self {
        Self {
            index: RwLock::new(HashMap::new()),
            previews: RwLock::new(HashMap::new()),
        }
    }

    pub fn index_content(&self, session_id: &str, content: &str) {
        let words = tokenize(content);
        if words.is_empty() {
            return;
        }

        let mut idx = self.index.write();
        let mut previews = self.previews.write();

        for word in &words {
            let sessions = idx.entry(word.clone()).or_default();
            *sessions.entry(session_id.to_owned()).or_insert(0) += 1;

            let key = (session_id.to_owned(), word.clone());
            previews
                .entry(key)
                .or_insert_with(|| truncate_preview(content));
        }
    }

    /// AND semantics across query words; results sorted by total match count
    /// descending, capped at 50.
    pub fn search(&self, query: &str) -> Vec<SearchHit> {
        let query_words = tokenize(query);
        if query_words.is_empty() {
            return vec![];
        }

        let idx = self.index.read();
        let previews = self.previews.read();

        let mut candidates: Option<HashMap<String, usize>> = None;
        for word in &query_words {
            let word_matches = match idx.get(word) {
                Some(m) => m,
                None => return vec![],
            };
            candidates = Some(match candidates {
                None => word_matches.clone(),
                Some(current) => current
                    .into_iter()
                    .filter_map(|(sid, count)| word_matches.get(&sid).map(|wc| (sid, count + wc)))
                    .collect(),
            });
        }

        let scored = match candidates {
            Some(c) => c,
            None => return vec![],
        };

        let mut results: Vec<_> = scored.into_iter().collect();
        results.sort_by(|a, b| b.1.cmp(&a.1));
        results.truncate(MAX_RESULTS);

        results
            .into_iter()
            .map(|(session_id, match_count)| {
                let preview = query_words
                    .iter()
                    .find_map(|w| previews.get(&(session_id.clone(), w.clone())).cloned())
                    .unwrap_or_default();
                SearchHit {
                    session_id,
                    match_count,
                    preview,
                }
            })
            .collect()
    }
}

impl Default for TranscriptIndex {
    fn default() -> Self {
        Self::new()
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() >= 2)
        .map(String::from)
        .collect()
}

fn truncate_preview(s: &str) -> String {
    if s.len() <= MAX_PREVIEW_LEN {
        return s.to_owned();
    }
    let mut end = MAX_PREVIEW_LEN;
    while !s.is_char_boundary(end) && end > 0 {
        end -= 1;
    }
    format!("{}...", &s[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_and_search_single_word() {
        let idx = TranscriptIndex::new();
        idx.index_content("s1", "Hello world");
        idx.index_content("s2", "Goodbye world");
        assert_eq!(idx.search("world").len(), 2);
    }

    #[test]
    fn search_and_semantics() {
        let idx = TranscriptIndex::new();
        idx.index_content("s1", "Hello world from Rust");
        idx.index_content("s2", "Hello from Python");
        let hits = idx.search("hello rust");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].session_id, "s1");
    }

    #[test]
    fn search_sorted_by_count() {
        let idx = TranscriptIndex::new();
        idx.index_content("s1", "rust rust rust");
        idx.index_content("s2", "rust");
        let hits = idx.search("rust");
        assert_eq!(hits[0].session_id, "s1");
        assert_eq!(hits[0].match_count, 3);
    }

    #[test]
    fn search_empty_query_is_empty() {
        let idx = TranscriptIndex::new();
        idx.index_content("s1", "Hello world");
        assert!(idx.search("").is_empty());
    }
}
