//! Search module: C3 (TF-IDF), C2 (vector store), and C5 (hybrid fusion).

pub mod hybrid;
pub mod tfidf;
pub mod vector;

pub use hybrid::{fuse_and_rank, HybridSearchConfig, ResultBundle, ScoredMemory, SearchFilters};
pub use tfidf::{backtick_terms, tokenize, TfIdfIndex};
pub use vector::{cosine_similarity, VectorCollection, VectorFilters};

/// A retrieval lane exposes `search(query, k)`, letting C5 compose lexical,
/// vector, and FTS-fallback sources interchangeably (spec.md §9).
pub trait SearchLane {
    fn search(&mut self, query: &str, k: usize) -> Vec<(i64, f32)>;
}
