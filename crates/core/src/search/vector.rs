//! Vector store (C2): dense-vector index with metadata filtering, logically
//! separate from the relational store (spec.md §4.2). Backed by an exact
//! brute-force cosine scan rather than an embedded ANN library — the
//! right default for typical per-project corpora (low thousands of rows),
//! and it keeps payload filtering a first-class part of the contract
//! instead of a bolt-on side table an ANN index would otherwise need.

use std::collections::HashMap;

use crate::model::VectorPayload;

#[derive(Debug, Clone)]
struct Entry {
    vector: Vec<f32>,
    payload: VectorPayload,
}

#[derive(Debug, Clone, Default)]
pub struct VectorFilters {
    pub category: Option<String>,
    pub tags_any: Option<Vec<String>>,
    pub file_path: Option<String>,
}

impl VectorFilters {
    fn matches(&self, payload: &VectorPayload) -> bool {
        if let Some(c) = &self.category {
            if &payload.category != c {
                return false;
            }
        }
        if let Some(tags) = &self.tags_any {
            if !tags.is_empty() && !payload.tags.iter().any(|t| tags.contains(t)) {
                return false;
            }
        }
        if let Some(fp) = &self.file_path {
            if payload.file_path.as_deref() != Some(fp.as_str()) {
                return false;
            }
        }
        true
    }
}

/// One logical collection (`memories` or `code_entities`) at a fixed
/// dimensionality and cosine metric.
#[derive(Debug)]
pub struct VectorCollection {
    dimensions: usize,
    entries: HashMap<String, Entry>,
}

impl VectorCollection {
    pub fn new(dimensions: usize) -> Self {
        VectorCollection {
            dimensions,
            entries: HashMap::new(),
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn upsert(&mut self, id: &str, vector: Vec<f32>, payload: VectorPayload) -> Result<(), String> {
        if vector.len() != self.dimensions {
            return Err(format!(
                "expected {}-dim vector, got {}",
                self.dimensions,
                vector.len()
            ));
        }
        self.entries.insert(id.to_string(), Entry { vector, payload });
        Ok(())
    }

    pub fn delete(&mut self, id: &str) {
        self.entries.remove(id);
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Cosine similarity in `[-1, 1]`; callers treat only `[0, 1]` as
    /// meaningful per spec.md §4.2.
    pub fn search(
        &self,
        query_vector: &[f32],
        limit: usize,
        filters: &VectorFilters,
    ) -> Vec<(String, f32)> {
        let mut scored: Vec<(String, f32)> = self
            .entries
            .iter()
            .filter(|(_, e)| filters.matches(&e.payload))
            .map(|(id, e)| (id.clone(), cosine_similarity(query_vector, &e.vector)))
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal).then(a.0.cmp(&b.0)));
        scored.truncate(limit);
        scored
    }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        (dot / (norm_a * norm_b)).clamp(-1.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(category: &str, tags: &[&str]) -> VectorPayload {
        VectorPayload {
            category: category.to_string(),
            tags: tags.iter().map(|s| s.to_string()).collect(),
            file_path: None,
            worked: None,
            is_permanent: false,
        }
    }

    #[test]
    fn search_returns_nearest_first() {
        let mut coll = VectorCollection::new(3);
        coll.upsert("a", vec![1.0, 0.0, 0.0], payload("decision", &[])).unwrap();
        coll.upsert("b", vec![0.0, 1.0, 0.0], payload("decision", &[])).unwrap();

        let results = coll.search(&[0.9, 0.1, 0.0], 10, &VectorFilters::default());
        assert_eq!(results[0].0, "a");
    }

    #[test]
    fn filters_restrict_by_category() {
        let mut coll = VectorCollection::new(3);
        coll.upsert("a", vec![1.0, 0.0, 0.0], payload("decision", &[])).unwrap();
        coll.upsert("b", vec![1.0, 0.0, 0.0], payload("warning", &[])).unwrap();

        let filters = VectorFilters {
            category: Some("warning".to_string()),
            ..Default::default()
        };
        let results = coll.search(&[1.0, 0.0, 0.0], 10, &filters);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0, "b");
    }

    #[test]
    fn upsert_rejects_wrong_dimension() {
        let mut coll = VectorCollection::new(3);
        assert!(coll.upsert("a", vec![1.0, 0.0], payload("decision", &[])).is_err());
    }

    #[test]
    fn delete_removes_entry() {
        let mut coll = VectorCollection::new(2);
        coll.upsert("a", vec![1.0, 0.0], payload("decision", &[])).unwrap();
        coll.delete("a");
        assert!(!coll.contains("a"));
    }

    #[test]
    fn cosine_similarity_handles_zero_vector() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }
}
