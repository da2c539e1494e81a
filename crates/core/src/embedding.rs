//! Embedding provider (C4): a pure `text -> unit vector` function, treated
//! as an external collaborator. The core never implements a model; it only
//! defines the contract and a no-op fallback so C5/C6 degrade gracefully
//! when no provider is configured (spec.md §4.4, §7 `DependencyUnavailable`).

/// Object-safe so callers can hold `Arc<dyn EmbeddingProvider>` without
/// committing to a concrete model at compile time.
pub trait EmbeddingProvider: Send + Sync {
    /// Encode `text` into a vector of `dimensions()` length, or `None` if
    /// the provider is unavailable. Must never panic.
    fn encode(&self, text: &str) -> Option<Vec<f32>>;

    fn dimensions(&self) -> usize;

    fn model_name(&self) -> &str;
}

/// Always returns `None`. Used when no real provider is wired up; every
/// caller of C4 must already handle this per spec.md §4.4.
pub struct NullEmbedder {
    dimensions: usize,
}

impl NullEmbedder {
    pub fn new(dimensions: usize) -> Self {
        NullEmbedder { dimensions }
    }
}

impl EmbeddingProvider for NullEmbedder {
    fn encode(&self, _text: &str) -> Option<Vec<f32>> {
        None
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        "none"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_embedder_always_degrades() {
        let embedder = NullEmbedder::new(384);
        assert_eq!(embedder.encode("anything"), None);
        assert_eq!(embedder.dimensions(), 384);
    }
}
