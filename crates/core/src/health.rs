//! Health/status reporting (spec.md §6). Aggregates state across C1, C3, C8,
//! and config warnings into one snapshot for external callers.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::code::{CodeIndexer, ParseCacheStats};
use crate::config::EngineConfig;
use crate::error::Result;
use crate::memory::MemoryManager;
use crate::rules::RulesEngine;
use crate::storage::{queries, Storage};

pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub engine_version: String,
    pub project_path: String,
    pub memory_counts_by_category: Vec<(String, i64)>,
    pub rules_count: usize,
    pub entity_counts_by_type: Vec<(String, i64)>,
    pub last_indexed_at: Option<DateTime<Utc>>,
    pub index_stale: bool,
    pub parse_cache: ParseCacheStatsDto,
    pub active_context_count: usize,
    pub config_warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ParseCacheStatsDto {
    pub hits: u64,
    pub misses: u64,
    pub size: usize,
}

impl From<ParseCacheStats> for ParseCacheStatsDto {
    fn from(s: ParseCacheStats) -> Self {
        ParseCacheStatsDto { hits: s.hits, misses: s.misses, size: s.size }
    }
}

#[allow(clippy::too_many_arguments)]
pub fn health(
    project_path: &str,
    storage: &Storage,
    memory: &MemoryManager,
    rules: &RulesEngine,
    code_indexer: &CodeIndexer,
    config: &EngineConfig,
    active_context_count: usize,
) -> Result<HealthReport> {
    let _ = memory;
    let memory_counts_by_category = storage.with_reader(|conn| {
        let mut stmt = conn.prepare("SELECT category, COUNT(*) FROM memories WHERE archived = 0 GROUP BY category")?;
        let rows = stmt.query_map([], |r| Ok((r.get(0)?, r.get(1)?)))?;
        Ok(rows.collect::<rusqlite::Result<Vec<(String, i64)>>>()?)
    })?;

    let rules_count = rules.list_rules(false)?.len();
    let entity_counts_by_type = storage.with_reader(|conn| queries::count_entities_by_type(conn))?;

    let last_indexed_at = storage.with_reader(|conn| {
        Ok(conn
            .query_row("SELECT MAX(indexed_at) FROM code_entities", [], |r| r.get::<_, Option<String>>(0))
            .unwrap_or(None))
    })?;
    let last_indexed_at = last_indexed_at.and_then(|s| DateTime::parse_from_rfc3339(&s).ok()).map(|d| d.with_timezone(&Utc));

    let index_stale = match last_indexed_at {
        Some(ts) => Utc::now() - ts > chrono::Duration::hours(config.index_stale_after_hours),
        None => false,
    };

    Ok(HealthReport {
        engine_version: ENGINE_VERSION.to_string(),
        project_path: project_path.to_string(),
        memory_counts_by_category,
        rules_count,
        entity_counts_by_type,
        last_indexed_at,
        index_stale,
        parse_cache: code_indexer.parse_cache_stats().into(),
        active_context_count,
        config_warnings: config.warnings(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::NullEmbedder;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn health_reports_counts_and_warnings() {
        let dir = TempDir::new().unwrap();
        let storage = Arc::new(Storage::open(&dir.path().join("s.db"), 5000).unwrap());
        let mut config = EngineConfig::default();
        config.hybrid_vector_weight = 0.0;
        let embedder = Arc::new(NullEmbedder::new(config.embedding_dim));
        let indexer = Arc::new(CodeIndexer::new("proj", 50));
        let memory = MemoryManager::new("proj", Arc::clone(&storage), embedder, Arc::clone(&indexer), config.clone()).unwrap();
        memory.remember("decision", "Use SQLite", None, vec![], None, None).unwrap();
        let rules = RulesEngine::new(Arc::clone(&storage), 0.1).unwrap();

        let report = health("proj", &storage, &memory, &rules, &indexer, &config, 1).unwrap();
        assert_eq!(report.memory_counts_by_category, vec![("decision".to_string(), 1)]);
        assert!(report.config_warnings.iter().any(|w| w.contains("lexical only")));
        assert!(!report.index_stale);
    }
}
