//! TF-IDF index (C3): pure in-memory inverted index, rebuilt from the
//! relational store on demand. See spec.md §4.3 for the tokenizer and
//! scoring contract this module implements exactly.

use std::collections::{HashMap, HashSet};

const STOPWORDS: &[&str] = &[
    "a", "an", "the", "is", "are", "was", "were", "be", "been", "being", "to", "of", "in", "on",
    "at", "for", "with", "and", "or", "but", "not", "this", "that", "it", "as", "by", "from",
];

/// Tokenize per spec.md §4.3:
/// 1. lowercase, split on non-alphanumeric (dots preserved as part of step 2)
/// 2. dotted symbols emit both the whole token and their segments
/// 3. backtick-delimited identifiers get extra weight (handled by caller via
///    `backtick_terms`)
/// 4. drop tokens shorter than 2 chars and stopwords
pub fn tokenize(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    let mut tokens = Vec::new();

    for raw in split_candidates(&lower) {
        if raw.contains('.') && raw.chars().any(|c| c.is_alphanumeric()) {
            tokens.push(raw.clone());
            for seg in raw.split('.') {
                if !seg.is_empty() {
                    tokens.push(seg.to_string());
                }
            }
        } else {
            tokens.push(raw);
        }
    }

    tokens
        .into_iter()
        .filter(|t| t.len() >= 2 && !STOPWORDS.contains(&t.as_str()))
        .collect()
}

/// Split on any character that is not alphanumeric or a dot (dots are kept
/// so dotted symbols like `UserService.save` survive as one candidate).
fn split_candidates(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut cur = String::new();
    for ch in text.chars() {
        if ch.is_alphanumeric() || ch == '.' {
            cur.push(ch);
        } else if !cur.is_empty() {
            out.push(std::mem::take(&mut cur));
        }
    }
    if !cur.is_empty() {
        out.push(cur);
    }
    out.into_iter()
        .map(|s| s.trim_matches('.').to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Backtick-delimited identifiers mentioned in free text, e.g. `` `UserService.save` ``.
pub fn backtick_terms(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut chars = text.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if c == '`' {
            if let Some(end) = text[i + 1..].find('`') {
                out.push(text[i + 1..i + 1 + end].to_string());
            }
        }
    }
    out
}

const TAG_BOOST: f32 = 3.0;

#[derive(Debug, Clone)]
struct Document {
    term_counts: HashMap<String, f32>,
    norm: f32,
}

/// In-memory inverted index mapping document ids to TF-IDF vectors.
#[derive(Debug, Default)]
pub struct TfIdfIndex {
    documents: HashMap<i64, Document>,
    doc_frequency: HashMap<String, usize>,
    idf_cache: Option<HashMap<String, f32>>,
}

impl TfIdfIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn clear(&mut self) {
        self.documents.clear();
        self.doc_frequency.clear();
        self.idf_cache = None;
    }

    /// Index `(id, text, tags)`. Re-indexing an id replaces its prior
    /// document and invalidates IDF so the next query recomputes it.
    pub fn add_document(&mut self, id: i64, text: &str, tags: &[String]) {
        self.remove_document(id);

        let mut term_counts: HashMap<String, f32> = HashMap::new();
        for tok in tokenize(text) {
            *term_counts.entry(tok).or_insert(0.0) += 1.0;
        }
        for tag in tags {
            for tok in tokenize(tag) {
                *term_counts.entry(tok).or_insert(0.0) += TAG_BOOST;
            }
        }

        for term in term_counts.keys() {
            *self.doc_frequency.entry(term.clone()).or_insert(0) += 1;
        }

        let norm = term_counts.values().map(|v| v * v).sum::<f32>().sqrt();
        self.documents.insert(id, Document { term_counts, norm });
        self.idf_cache = None;
    }

    pub fn remove_document(&mut self, id: i64) {
        if let Some(doc) = self.documents.remove(&id) {
            for term in doc.term_counts.keys() {
                if let Some(count) = self.doc_frequency.get_mut(term) {
                    *count = count.saturating_sub(1);
                    if *count == 0 {
                        self.doc_frequency.remove(term);
                    }
                }
            }
            self.idf_cache = None;
        }
    }

    fn idf(&mut self) -> &HashMap<String, f32> {
        if self.idf_cache.is_none() {
            let n = self.documents.len().max(1) as f32;
            let idf = self
                .doc_frequency
                .iter()
                .map(|(term, df)| (term.clone(), (1.0 + n / (1.0 + *df as f32)).ln() + 1.0))
                .collect();
            self.idf_cache = Some(idf);
        }
        self.idf_cache.as_ref().unwrap()
    }

    /// Cosine similarity between a tokenized query and every document,
    /// filtered by `threshold`, sorted descending, truncated to `top_k`.
    pub fn query(&mut self, text: &str, top_k: usize, threshold: f32) -> Vec<(i64, f32)> {
        let query_tokens = tokenize(text);
        if query_tokens.is_empty() || self.documents.is_empty() {
            return Vec::new();
        }

        let mut query_tf: HashMap<String, f32> = HashMap::new();
        for tok in &query_tokens {
            *query_tf.entry(tok.clone()).or_insert(0.0) += 1.0;
        }

        let idf = self.idf().clone();
        let query_terms: HashSet<&String> = query_tf.keys().collect();

        let mut query_vec: HashMap<String, f32> = HashMap::new();
        for (term, tf) in &query_tf {
            let w = idf.get(term).copied().unwrap_or(1.0);
            query_vec.insert(term.clone(), tf * w);
        }
        let query_norm = query_vec.values().map(|v| v * v).sum::<f32>().sqrt();
        if query_norm == 0.0 {
            return Vec::new();
        }

        let mut scored: Vec<(i64, f32)> = Vec::new();
        for (id, doc) in &self.documents {
            if doc.norm == 0.0 {
                continue;
            }
            let mut dot = 0.0f32;
            for term in &query_terms {
                if let Some(tf) = doc.term_counts.get(*term) {
                    let w = idf.get(*term).copied().unwrap_or(1.0);
                    dot += query_vec.get(*term).copied().unwrap_or(0.0) * (tf * w);
                }
            }
            let score = dot / (query_norm * doc.norm);
            if score >= threshold {
                scored.push((*id, score));
            }
        }

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal).then(a.0.cmp(&b.0)));
        scored.truncate(top_k);
        scored
    }
}
