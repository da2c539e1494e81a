//! Flat configuration surface (spec.md §6), overridable via environment
//! variables sharing a common prefix (e.g. `MEMENGINE_HYBRID_VECTOR_WEIGHT`).
//! Out-of-range values are clamped and logged, never rejected — construction
//! of `EngineConfig` cannot fail.

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub max_project_contexts: usize,
    pub context_ttl_seconds: u64,
    pub hybrid_vector_weight: f32,
    pub search_diversity_max_per_file: usize,
    pub search_default_limit: usize,
    pub search_tfidf_threshold: f32,
    pub search_vector_threshold: f32,
    pub embedding_model: String,
    pub embedding_dim: usize,
    pub parse_tree_cache_maxsize: usize,
    pub index_languages: Vec<String>,
    pub max_content_size: usize,
    pub max_chunks: usize,
    pub ingest_timeout_secs: u64,
    pub allowed_url_schemes: Vec<String>,
    pub busy_timeout_ms: u32,
    pub outcome_worked_boost: f32,
    pub outcome_failed_penalty: f32,
    pub decay_half_life_days: f32,
    pub index_stale_after_hours: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            max_project_contexts: 10,
            context_ttl_seconds: 3600,
            hybrid_vector_weight: 0.3,
            search_diversity_max_per_file: 3,
            search_default_limit: 20,
            search_tfidf_threshold: 0.1,
            search_vector_threshold: 0.3,
            embedding_model: "all-MiniLM-L6-v2".to_string(),
            embedding_dim: 384,
            parse_tree_cache_maxsize: 200,
            index_languages: Vec::new(),
            max_content_size: 1_000_000,
            max_chunks: 50,
            ingest_timeout_secs: 30,
            allowed_url_schemes: vec!["http".to_string(), "https".to_string()],
            busy_timeout_ms: 30_000,
            outcome_worked_boost: 0.10,
            outcome_failed_penalty: 0.20,
            decay_half_life_days: 30.0,
            index_stale_after_hours: 24,
        }
    }
}

impl EngineConfig {
    /// Overlay environment variables named `{prefix}_{UPPER_SNAKE_FIELD}` on
    /// top of the defaults. Unparseable values are ignored with a warning.
    pub fn from_env(prefix: &str) -> Self {
        let mut cfg = EngineConfig::default();

        macro_rules! overlay {
            ($field:ident, $parse:expr) => {
                if let Ok(raw) = std::env::var(format!(
                    "{prefix}_{}",
                    stringify!($field).to_uppercase()
                )) {
                    match $parse(raw.as_str()) {
                        Some(v) => cfg.$field = v,
                        None => tracing::warn!(
                            var = %format!("{prefix}_{}", stringify!($field).to_uppercase()),
                            value = %raw,
                            "could not parse environment override, keeping default"
                        ),
                    }
                }
            };
        }

        overlay!(max_project_contexts, |s: &str| s.parse().ok());
        overlay!(context_ttl_seconds, |s: &str| s.parse().ok());
        overlay!(hybrid_vector_weight, |s: &str| s
            .parse::<f32>()
            .ok()
            .map(|v| v.clamp(0.0, 1.0)));
        overlay!(search_diversity_max_per_file, |s: &str| s.parse().ok());
        overlay!(search_default_limit, |s: &str| s.parse().ok());
        overlay!(search_tfidf_threshold, |s: &str| s.parse().ok());
        overlay!(search_vector_threshold, |s: &str| s.parse().ok());
        overlay!(embedding_model, |s: &str| Some(s.to_string()));
        overlay!(embedding_dim, |s: &str| s.parse().ok());
        overlay!(parse_tree_cache_maxsize, |s: &str| s.parse().ok());
        overlay!(index_languages, |s: &str| Some(
            s.split(',').map(|p| p.trim().to_string()).filter(|p| !p.is_empty()).collect()
        ));
        overlay!(max_content_size, |s: &str| s.parse().ok());
        overlay!(max_chunks, |s: &str| s.parse().ok());
        overlay!(ingest_timeout_secs, |s: &str| s.parse().ok());
        overlay!(allowed_url_schemes, |s: &str| Some(
            s.split(',').map(|p| p.trim().to_string()).filter(|p| !p.is_empty()).collect()
        ));
        overlay!(busy_timeout_ms, |s: &str| s.parse().ok());

        cfg
    }

    /// Human-readable warnings surfaced by `health()`.
    pub fn warnings(&self) -> Vec<String> {
        let mut out = Vec::new();
        if self.hybrid_vector_weight == 0.0 {
            out.push("hybrid_vector_weight=0.0: lexical only".to_string());
        }
        if self.hybrid_vector_weight == 1.0 {
            out.push("hybrid_vector_weight=1.0: relies entirely on the embedding provider".to_string());
        }
        if self.search_diversity_max_per_file == 0 {
            out.push("search_diversity_max_per_file=0: per-file diversity cap disabled".to_string());
        }
        if self.max_project_contexts == 0 {
            out.push("max_project_contexts=0: every get_context call re-initializes".to_string());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_table() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.max_project_contexts, 10);
        assert_eq!(cfg.context_ttl_seconds, 3600);
        assert_eq!(cfg.hybrid_vector_weight, 0.3);
        assert_eq!(cfg.embedding_dim, 384);
        assert_eq!(cfg.busy_timeout_ms, 30_000);
    }

    #[test]
    fn env_override_is_clamped() {
        unsafe {
            std::env::set_var("TESTPFX_HYBRID_VECTOR_WEIGHT", "5.0");
        }
        let cfg = EngineConfig::from_env("TESTPFX");
        assert_eq!(cfg.hybrid_vector_weight, 1.0);
        unsafe {
            std::env::remove_var("TESTPFX_HYBRID_VECTOR_WEIGHT");
        }
    }

    #[test]
    fn zero_vector_weight_warns() {
        let mut cfg = EngineConfig::default();
        cfg.hybrid_vector_weight = 0.0;
        assert!(cfg.warnings().iter().any(|w| w.contains("lexical only")));
    }
}
