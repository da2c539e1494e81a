//! Context manager (C9): process-global map of project path to the storage
//! and manager handles for that project, with double-checked-locking
//! initialization, TTL+LRU eviction, and staleness-triggered index rebuilds
//! (spec.md §4.9).

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::code::CodeIndexer;
use crate::config::EngineConfig;
use crate::embedding::{EmbeddingProvider, NullEmbedder};
use crate::error::Result;
use crate::memory::MemoryManager;
use crate::rules::RulesEngine;
use crate::storage::Storage;

pub struct ProjectContext {
    pub project_path: String,
    pub storage: Arc<Storage>,
    pub memory: Arc<MemoryManager>,
    pub rules: Arc<RulesEngine>,
    pub code_indexer: Arc<CodeIndexer>,
    last_accessed: Mutex<DateTime<Utc>>,
}

impl ProjectContext {
    pub fn touch(&self) {
        *self.last_accessed.lock().expect("last_accessed mutex poisoned") = Utc::now();
    }

    pub fn last_accessed(&self) -> DateTime<Utc> {
        *self.last_accessed.lock().expect("last_accessed mutex poisoned")
    }

    /// Rebuilds C3 if the store has moved since the in-memory index was
    /// built; called before every recall/rules-check (spec.md §4.9).
    pub fn ensure_fresh(&self) -> Result<()> {
        self.memory.rebuild_index_if_stale()
    }

    pub fn health(&self, config: &EngineConfig, active_context_count: usize) -> Result<crate::health::HealthReport> {
        crate::health::health(
            &self.project_path,
            &self.storage,
            &self.memory,
            &self.rules,
            &self.code_indexer,
            config,
            active_context_count,
        )
    }
}

pub struct ContextManager {
    contexts: DashMap<String, Arc<ProjectContext>>,
    project_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    config: EngineConfig,
}

impl ContextManager {
    pub fn new(config: EngineConfig) -> Self {
        ContextManager {
            contexts: DashMap::new(),
            project_locks: Mutex::new(HashMap::new()),
            config,
        }
    }

    /// Normalize a project path so the same project always maps to the
    /// same key regardless of trailing slashes or symlink-relative spelling.
    pub fn normalize_path(path: &Path) -> String {
        path.canonicalize()
            .unwrap_or_else(|_| path.to_path_buf())
            .to_string_lossy()
            .replace('\\', "/")
    }

    /// Fast path: existing + initialized context just gets its timestamp
    /// bumped. Slow path: double-checked locking guarantees exactly one
    /// initialization runs per project across concurrent callers.
    pub fn get_context(&self, project_path: &Path) -> Result<Arc<ProjectContext>> {
        let key = Self::normalize_path(project_path);

        if let Some(ctx) = self.contexts.get(&key) {
            ctx.touch();
            return Ok(Arc::clone(&ctx));
        }

        let lock = {
            let mut locks = self.project_locks.lock().expect("project_locks mutex poisoned");
            Arc::clone(locks.entry(key.clone()).or_insert_with(|| Arc::new(Mutex::new(()))))
        };

        let _guard = lock.lock().expect("per-project mutex poisoned");

        if let Some(ctx) = self.contexts.get(&key) {
            ctx.touch();
            return Ok(Arc::clone(&ctx));
        }

        let ctx = Arc::new(self.initialize(&key)?);
        self.contexts.insert(key, Arc::clone(&ctx));
        self.evict_stale();
        Ok(ctx)
    }

    fn initialize(&self, project_path: &str) -> Result<ProjectContext> {
        let store_dir = Path::new(project_path).join(".projectstore");
        let db_path = store_dir.join("memengine.db");
        let storage = Arc::new(Storage::open(&db_path, self.config.busy_timeout_ms)?);

        let embedder: Arc<dyn EmbeddingProvider> = Arc::new(NullEmbedder::new(self.config.embedding_dim));
        let code_indexer = Arc::new(CodeIndexer::new(project_path, self.config.parse_tree_cache_maxsize));
        let memory = Arc::new(MemoryManager::new(
            project_path,
            Arc::clone(&storage),
            embedder,
            Arc::clone(&code_indexer),
            self.config.clone(),
        )?);
        let rules = Arc::new(RulesEngine::new(Arc::clone(&storage), self.config.search_tfidf_threshold)?);

        Ok(ProjectContext {
            project_path: project_path.to_string(),
            storage,
            memory,
            rules,
            code_indexer,
            last_accessed: Mutex::new(Utc::now()),
        })
    }

    /// TTL pass first (drop contexts idle past `context_ttl_seconds`), then
    /// LRU pass (drop oldest while over `max_project_contexts`).
    pub fn evict_stale(&self) -> usize {
        let now = Utc::now();
        let ttl = chrono::Duration::seconds(self.config.context_ttl_seconds as i64);

        let stale_keys: Vec<String> = self
            .contexts
            .iter()
            .filter(|entry| now - entry.value().last_accessed() > ttl)
            .map(|entry| entry.key().clone())
            .collect();

        let mut evicted = 0;
        for key in stale_keys {
            self.contexts.remove(&key);
            evicted += 1;
        }
        self.sweep_orphaned_locks();

        while self.contexts.len() > self.config.max_project_contexts {
            let oldest = self
                .contexts
                .iter()
                .min_by_key(|entry| entry.value().last_accessed())
                .map(|entry| entry.key().clone());
            match oldest {
                Some(key) => {
                    self.contexts.remove(&key);
                    evicted += 1;
                }
                None => break,
            }
        }
        self.sweep_orphaned_locks();
        evicted
    }

    fn sweep_orphaned_locks(&self) {
        let mut locks = self.project_locks.lock().expect("project_locks mutex poisoned");
        locks.retain(|key, _| self.contexts.contains_key(key));
    }

    pub fn active_context_count(&self) -> usize {
        self.contexts.len()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

impl Default for ContextManager {
    fn default() -> Self {
        ContextManager::new(EngineConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn get_context_initializes_once_and_caches() {
        let dir = TempDir::new().unwrap();
        let manager = ContextManager::new(EngineConfig::default());

        let ctx1 = manager.get_context(dir.path()).unwrap();
        let ctx2 = manager.get_context(dir.path()).unwrap();
        assert!(Arc::ptr_eq(&ctx1, &ctx2));
        assert_eq!(manager.active_context_count(), 1);
    }

    #[test]
    fn evict_stale_respects_ttl() {
        let dir = TempDir::new().unwrap();
        let mut config = EngineConfig::default();
        config.context_ttl_seconds = 0;
        let manager = ContextManager::new(config);

        let ctx = manager.get_context(dir.path()).unwrap();
        *ctx.last_accessed.lock().unwrap() = Utc::now() - chrono::Duration::seconds(10);

        let evicted = manager.evict_stale();
        assert_eq!(evicted, 1);
        assert_eq!(manager.active_context_count(), 0);
    }

    #[test]
    fn evict_stale_enforces_lru_cap() {
        let mut config = EngineConfig::default();
        config.max_project_contexts = 1;
        config.context_ttl_seconds = 3600;
        let manager = ContextManager::new(config);

        let dir_a = TempDir::new().unwrap();
        let dir_b = TempDir::new().unwrap();
        manager.get_context(dir_a.path()).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        manager.get_context(dir_b.path()).unwrap();

        assert_eq!(manager.active_context_count(), 1);
    }
}
