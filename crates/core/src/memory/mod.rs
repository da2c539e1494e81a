//! Memory manager (C6): CRUD over memories, tag inference, auto-linking to
//! code entities, and the operations driving C5's hybrid search. Orchestrates
//! C1 (storage), C2 (vector), C3 (TF-IDF), C4 (embedding), C8 (code indexer).

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::code::CodeIndexer;
use crate::config::EngineConfig;
use crate::embedding::EmbeddingProvider;
use crate::error::{EngineError, Result};
use crate::model::{Memory, MemoryCodeRef, Rule, VectorPayload};
use crate::search::{
    fuse_and_rank, tokenize, HybridSearchConfig, ResultBundle, SearchFilters, TfIdfIndex,
    VectorCollection, VectorFilters,
};
use crate::storage::{queries, MemoryFilter, Storage};

const BUGFIX_TERMS: &[&str] = &["fix", "bug", "error", "issue", "broken", "crash", "failure"];
const TECH_DEBT_TERMS: &[&str] = &[
    "todo", "hack", "workaround", "temporary", "temp fix", "quick fix", "tech debt", "refactor later",
];
const PERF_TERMS: &[&str] = &["perf", "performance", "slow", "fast", "optim", "speed", "latency", "cache"];
const WARNING_TERMS: &[&str] = &["warn", "avoid", "don't"];

/// Case-insensitive substring matching on `content` (spec.md §4.6); tags
/// are only added if not already present in the caller-supplied set.
pub fn infer_tags(category: &str, content: &str, existing: &[String]) -> Vec<String> {
    let lower = content.to_lowercase();
    let mut tags: Vec<String> = existing.to_vec();

    let mut add = |tag: &str| {
        if !tags.iter().any(|t| t == tag) {
            tags.push(tag.to_string());
        }
    };

    if BUGFIX_TERMS.iter().any(|t| lower.contains(t)) {
        add("bugfix");
    }
    if TECH_DEBT_TERMS.iter().any(|t| lower.contains(t)) {
        add("tech-debt");
    }
    if PERF_TERMS.iter().any(|t| lower.contains(t)) {
        add("perf");
    }
    if category == "warning" {
        add("warning");
    } else if WARNING_TERMS.iter().any(|t| lower.contains(t)) {
        add("warning");
    }

    tags
}

#[derive(Debug, Clone, Default)]
pub struct RecallArgs {
    pub categories: Option<Vec<String>>,
    pub tags: Option<Vec<String>>,
    pub file_path: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub offset: usize,
    pub limit: usize,
    pub include_archived: bool,
}

#[derive(Debug, Clone, Default)]
pub struct PruneReport {
    pub matched: usize,
    pub deleted: usize,
    pub sample_ids: Vec<i64>,
}

#[derive(Debug, Clone, Default)]
pub struct CleanupReport {
    pub groups: usize,
    pub removed: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ExportData {
    pub memories: Vec<Memory>,
    pub rules: Vec<Rule>,
}

#[derive(Debug, Clone, Default)]
pub struct ImportReport {
    pub memories_imported: usize,
    pub rules_imported: usize,
}

pub struct MemoryManager {
    project_path: String,
    storage: Arc<Storage>,
    embedder: Arc<dyn EmbeddingProvider>,
    code_indexer: Arc<CodeIndexer>,
    config: EngineConfig,
    tfidf: Mutex<TfIdfIndex>,
    vectors: Mutex<VectorCollection>,
    index_built_at: Mutex<DateTime<Utc>>,
}

impl MemoryManager {
    pub fn new(
        project_path: impl Into<String>,
        storage: Arc<Storage>,
        embedder: Arc<dyn EmbeddingProvider>,
        code_indexer: Arc<CodeIndexer>,
        config: EngineConfig,
    ) -> Result<Self> {
        let dim = config.embedding_dim;
        let manager = MemoryManager {
            project_path: project_path.into(),
            storage,
            embedder,
            code_indexer,
            config,
            tfidf: Mutex::new(TfIdfIndex::new()),
            vectors: Mutex::new(VectorCollection::new(dim)),
            index_built_at: Mutex::new(Utc::now()),
        };
        manager.rebuild_index()?;
        Ok(manager)
    }

    fn hybrid_config(&self) -> HybridSearchConfig {
        HybridSearchConfig {
            vector_weight: self.config.hybrid_vector_weight,
            diversity_max_per_file: self.config.search_diversity_max_per_file,
            decay_half_life_days: self.config.decay_half_life_days,
            outcome_worked_boost: self.config.outcome_worked_boost,
            outcome_failed_penalty: self.config.outcome_failed_penalty,
        }
    }

    pub fn remember(
        &self,
        category: &str,
        content: &str,
        rationale: Option<&str>,
        tags: Vec<String>,
        file_path: Option<&str>,
        context: Option<serde_json::Value>,
    ) -> Result<(Memory, Vec<MemoryCodeRef>)> {
        if content.trim().is_empty() {
            return Err(EngineError::validation("content must not be empty"));
        }
        if content.len() > 50_000 {
            return Err(EngineError::validation("content exceeds the 50,000 byte limit"));
        }
        if crate::model::Category::parse(category).is_none() {
            return Err(EngineError::validation(format!("unknown category '{category}'")));
        }

        let inferred_tags = infer_tags(category, content, &tags);
        let keywords = tokenize(content);
        let file_path_relative = file_path.map(|p| normalize_path(p));

        let id = self.storage.with_write_tx(|tx| {
            queries::insert_memory(
                tx,
                category,
                content,
                rationale,
                context.as_ref(),
                &inferred_tags,
                &keywords,
                file_path,
                file_path_relative.as_deref(),
                false,
            )
        })?;

        self.tfidf
            .lock()
            .expect("tfidf mutex poisoned")
            .add_document(id, content, &inferred_tags);

        if let Some(vector) = self.embedder.encode(content) {
            let payload = VectorPayload {
                category: category.to_string(),
                tags: inferred_tags.clone(),
                file_path: file_path_relative.clone(),
                worked: None,
                is_permanent: false,
            };
            let vector_ref = format!("mem:{id}");
            if self
                .vectors
                .lock()
                .expect("vector mutex poisoned")
                .upsert(&vector_ref, vector, payload)
                .is_ok()
            {
                self.storage
                    .with_write_tx(|tx| queries::set_vector_ref(tx, id, Some(&vector_ref)))?;
            }
        }

        let refs = self.auto_link(id, content)?;

        let memory = self
            .storage
            .with_reader(|conn| queries::get_memory(conn, id))?
            .ok_or_else(|| EngineError::fatal("memory vanished after insert"))?;
        Ok((memory, refs))
    }

    /// Extract backtick-delimited symbols and link each to a resolvable
    /// code entity (spec.md §4.6 step 5).
    fn auto_link(&self, memory_id: i64, content: &str) -> Result<Vec<MemoryCodeRef>> {
        let mut created = Vec::new();
        for symbol in crate::search::backtick_terms(content) {
            if let Some(entity) = self.code_indexer.find_entity(&self.storage, &symbol)? {
                self.storage
                    .with_write_tx(|tx| queries::insert_memory_code_ref(tx, memory_id, &entity, "about"))?;
                created.push(MemoryCodeRef {
                    id: 0,
                    memory_id,
                    code_entity_id: entity.id,
                    entity_type: entity.entity_type,
                    entity_name: entity.name,
                    file_path: entity.file_path,
                    line_number: Some(entity.line_start),
                    relationship: "about".to_string(),
                });
            }
        }
        Ok(created)
    }

    /// Run the lexical (C3), vector (C2), and FTS-fallback (C1) lanes for
    /// `query`, returning raw `(id, score)` pairs for each. Shared by
    /// `recall` and `search` so both fuse over the same lane inputs.
    fn search_lanes(&self, query: &str) -> Result<(Vec<(i64, f32)>, Vec<(i64, f32)>, Vec<(i64, f32)>)> {
        let lexical = if query.trim().is_empty() {
            Vec::new()
        } else {
            self.tfidf
                .lock()
                .expect("tfidf mutex poisoned")
                .query(query, 200, self.config.search_tfidf_threshold)
        };

        let vector = if let Some(qvec) = (!query.trim().is_empty()).then(|| self.embedder.encode(query)).flatten() {
            self.vectors
                .lock()
                .expect("vector mutex poisoned")
                .search(&qvec, 200, &VectorFilters::default())
                .into_iter()
                .filter_map(|(vid, score)| vid.strip_prefix("mem:").and_then(|s| s.parse().ok()).map(|id| (id, score)))
                .collect()
        } else {
            Vec::new()
        };

        let fts_fallback = if lexical.is_empty() && !query.trim().is_empty() {
            self.storage
                .with_reader(|conn| queries::fts_query(conn, query, 200))?
                .into_iter()
                .map(|hit| (hit.id, hit.score))
                .collect()
        } else {
            Vec::new()
        };

        Ok((lexical, vector, fts_fallback))
    }

    pub fn recall(&self, topic: &str, args: &RecallArgs) -> Result<ResultBundle> {
        self.rebuild_index_if_stale()?;

        let filter = MemoryFilter {
            categories: args.categories.clone(),
            tags_any: args.tags.clone(),
            file_path: args.file_path.clone(),
            include_archived: args.include_archived,
            since: args.since,
            until: args.until,
            ..Default::default()
        };
        let rows = self.storage.with_reader(|conn| queries::select_memories(conn, &filter))?;
        let (lexical, vector, fts_fallback) = self.search_lanes(topic)?;

        let search_filters = SearchFilters {
            tags_any: args.tags.clone(),
            file_path: args.file_path.clone(),
            offset: args.offset,
            limit: if args.limit == 0 { self.config.search_default_limit } else { args.limit },
        };

        Ok(fuse_and_rank(&lexical, &vector, &fts_fallback, rows, &self.hybrid_config(), &search_filters))
    }

    /// Like `recall`, but flat: no time decay, no per-file diversity cap,
    /// no category/tag/date filtering. Outcome weighting still applies.
    pub fn search(&self, query: &str, limit: usize) -> Result<Vec<Memory>> {
        self.rebuild_index_if_stale()?;

        let rows = self
            .storage
            .with_reader(|conn| queries::select_memories(conn, &MemoryFilter::default()))?;
        let (lexical, vector, fts_fallback) = self.search_lanes(query)?;

        let mut flat_config = self.hybrid_config();
        flat_config.decay_half_life_days = 0.0;
        flat_config.diversity_max_per_file = 0;

        let search_filters = SearchFilters {
            limit: if limit == 0 { self.config.search_default_limit } else { limit },
            ..Default::default()
        };

        let bundle = fuse_and_rank(&lexical, &vector, &fts_fallback, rows, &flat_config, &search_filters);
        Ok(bundle.results.into_iter().map(|s| s.memory).collect())
    }

    pub fn record_outcome(&self, id: i64, outcome: &str, worked: Option<bool>) -> Result<Memory> {
        self.storage.with_write_tx(|tx| queries::update_memory_outcome(tx, id, outcome, worked))?;
        let memory = self
            .storage
            .with_reader(|conn| queries::get_memory(conn, id))?
            .ok_or_else(|| EngineError::not_found(format!("memory {id} not found")))?;

        if let Some(vector_ref) = &memory.vector_embedding_ref {
            let mut vectors = self.vectors.lock().expect("vector mutex poisoned");
            if let Some(v) = self.embedder.encode(&memory.content) {
                let payload = VectorPayload {
                    category: memory.category.clone(),
                    tags: memory.tags.clone(),
                    file_path: memory.file_path_relative.clone(),
                    worked: memory.worked,
                    is_permanent: memory.is_permanent,
                };
                let _ = vectors.upsert(vector_ref, v, payload);
            }
        }
        Ok(memory)
    }

    pub fn pin(&self, id: i64, pinned: bool) -> Result<Memory> {
        self.storage.with_write_tx(|tx| queries::set_pin_archive(tx, id, Some(pinned), None))?;
        self.storage
            .with_reader(|conn| queries::get_memory(conn, id))?
            .ok_or_else(|| EngineError::not_found(format!("memory {id} not found")))
    }

    pub fn archive(&self, id: i64, archived: bool) -> Result<Memory> {
        self.storage.with_write_tx(|tx| queries::set_pin_archive(tx, id, None, Some(archived)))?;
        self.storage
            .with_reader(|conn| queries::get_memory(conn, id))?
            .ok_or_else(|| EngineError::not_found(format!("memory {id} not found")))
    }

    pub fn prune(&self, older_than_days: i64, categories: &[String], dry_run: bool) -> Result<PruneReport> {
        let cutoff = Utc::now() - chrono::Duration::days(older_than_days);
        let filter = MemoryFilter {
            categories: Some(categories.to_vec()),
            until: Some(cutoff),
            include_archived: false,
            ..Default::default()
        };
        let candidates: Vec<Memory> = self
            .storage
            .with_reader(|conn| queries::select_memories(conn, &filter))?
            .into_iter()
            .filter(|m| !m.is_permanent && !m.pinned && m.outcome.is_none())
            .collect();

        let sample_ids = candidates.iter().take(5).map(|m| m.id).collect();
        let matched = candidates.len();

        if dry_run {
            return Ok(PruneReport { matched, deleted: 0, sample_ids });
        }

        for m in &candidates {
            self.storage.with_write_tx(|tx| queries::delete_memory(tx, m.id))?;
            self.tfidf.lock().expect("tfidf mutex poisoned").remove_document(m.id);
            if let Some(vref) = &m.vector_embedding_ref {
                self.vectors.lock().expect("vector mutex poisoned").delete(vref);
            }
        }

        Ok(PruneReport { matched, deleted: matched, sample_ids })
    }

    pub fn cleanup_duplicates(&self, dry_run: bool) -> Result<CleanupReport> {
        let all = self
            .storage
            .with_reader(|conn| queries::select_memories(conn, &MemoryFilter { include_archived: true, ..Default::default() }))?;

        use std::collections::HashMap;
        let mut groups: HashMap<(String, String, Option<String>), Vec<Memory>> = HashMap::new();
        for m in all {
            let normalized = m.content.to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ");
            groups
                .entry((m.category.clone(), normalized, m.file_path_relative.clone()))
                .or_default()
                .push(m);
        }

        let mut removed = 0;
        let mut dup_groups = 0;
        for (_, mut members) in groups {
            if members.len() < 2 {
                continue;
            }
            dup_groups += 1;
            members.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            let keeper = &members[0];
            let absorbed_outcome = members.iter().find_map(|m| m.outcome.clone());
            let absorbed_worked = members.iter().find_map(|m| m.worked);

            if !dry_run {
                if let Some(outcome) = absorbed_outcome {
                    self.storage
                        .with_write_tx(|tx| queries::update_memory_outcome(tx, keeper.id, &outcome, absorbed_worked))?;
                }
                for loser in &members[1..] {
                    self.storage.with_write_tx(|tx| queries::delete_memory(tx, loser.id))?;
                    self.tfidf.lock().expect("tfidf mutex poisoned").remove_document(loser.id);
                }
            }
            removed += members.len() - 1;
        }

        Ok(CleanupReport { groups: dup_groups, removed })
    }

    /// Forces a full C3 reload from C1 (spec.md §4.6). Called at
    /// construction and whenever the context manager detects staleness.
    pub fn rebuild_index(&self) -> Result<()> {
        let rows = self
            .storage
            .with_reader(|conn| queries::select_memories(conn, &MemoryFilter { include_archived: true, ..Default::default() }))?;

        let mut tfidf = self.tfidf.lock().expect("tfidf mutex poisoned");
        tfidf.clear();
        for m in &rows {
            tfidf.add_document(m.id, &m.content, &m.tags);
        }
        drop(tfidf);

        *self.index_built_at.lock().expect("index_built_at mutex poisoned") = Utc::now();
        Ok(())
    }

    pub fn index_built_at(&self) -> DateTime<Utc> {
        *self.index_built_at.lock().expect("index_built_at mutex poisoned")
    }

    /// Compares the latest memory `updated_at` to `index_built_at` and
    /// rebuilds if the store has moved since (spec.md §4.9 freshness rule).
    pub fn rebuild_index_if_stale(&self) -> Result<()> {
        let latest: Option<String> = self.storage.with_reader(|conn| {
            Ok(conn
                .query_row("SELECT MAX(updated_at) FROM memories", [], |r| r.get::<_, Option<String>>(0))
                .unwrap_or(None))
        })?;
        if let Some(latest) = latest {
            if let Ok(latest_ts) = DateTime::parse_from_rfc3339(&latest) {
                if latest_ts.with_timezone(&Utc) > self.index_built_at() {
                    self.rebuild_index()?;
                }
            }
        }
        Ok(())
    }

    pub fn export(&self) -> Result<ExportData> {
        let memories = self
            .storage
            .with_reader(|conn| queries::select_memories(conn, &MemoryFilter { include_archived: true, ..Default::default() }))?;
        let rules = self.storage.with_reader(|conn| queries::list_rules(conn, false))?;
        Ok(ExportData { memories, rules })
    }

    /// `merge=true` keeps existing rows and appends; `merge=false` clears
    /// this project's memories/rules before importing.
    pub fn import(&self, data: &ExportData, merge: bool) -> Result<ImportReport> {
        if !merge {
            let existing = self
                .storage
                .with_reader(|conn| queries::select_memories(conn, &MemoryFilter { include_archived: true, ..Default::default() }))?;
            for m in existing {
                self.storage.with_write_tx(|tx| queries::delete_memory(tx, m.id))?;
            }
        }

        let mut memories_imported = 0;
        for m in &data.memories {
            let id = self.storage.with_write_tx(|tx| {
                queries::insert_memory(
                    tx,
                    &m.category,
                    &m.content,
                    m.rationale.as_deref(),
                    m.context.as_ref(),
                    &m.tags,
                    &m.keywords,
                    m.file_path_absolute.as_deref(),
                    m.file_path_relative.as_deref(),
                    m.is_permanent,
                )
            })?;
            if m.outcome.is_some() {
                self.storage.with_write_tx(|tx| {
                    queries::update_memory_outcome(tx, id, m.outcome.as_deref().unwrap_or_default(), m.worked)
                })?;
            }
            memories_imported += 1;
        }

        let mut rules_imported = 0;
        for r in &data.rules {
            self.storage
                .with_write_tx(|tx| queries::insert_rule(tx, &r.trigger, &r.must_do, &r.must_not, &r.ask_first, &r.warnings, r.priority))?;
            rules_imported += 1;
        }

        self.rebuild_index()?;
        Ok(ImportReport { memories_imported, rules_imported })
    }

    pub fn project_path(&self) -> &str {
        &self.project_path
    }
}

/// Normalize separators unconditionally; case-fold only on hosts whose
/// filesystem is case-insensitive (spec.md:142). Linux ext4/btrfs are
/// case-sensitive, so on-disk casing must survive here or exact-match
/// filtering against a caller-supplied `file_path` would break.
fn normalize_path(p: &str) -> String {
    let slashed = p.replace('\\', "/");
    if host_is_case_insensitive() {
        slashed.to_lowercase()
    } else {
        slashed
    }
}

fn host_is_case_insensitive() -> bool {
    cfg!(target_os = "windows") || cfg!(target_os = "macos")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::NullEmbedder;
    use tempfile::TempDir;

    fn manager() -> (TempDir, MemoryManager) {
        let dir = TempDir::new().unwrap();
        let storage = Arc::new(Storage::open(&dir.path().join("store.db"), 5000).unwrap());
        let embedder = Arc::new(NullEmbedder::new(8));
        let indexer = Arc::new(CodeIndexer::new("proj", 50));
        let config = EngineConfig::default();
        let manager = MemoryManager::new("proj", storage, embedder, indexer, config).unwrap();
        (dir, manager)
    }

    #[test]
    fn basic_remember_and_recall() {
        let (_dir, mgr) = manager();
        let (memory, _refs) = mgr
            .remember("decision", "Use PostgreSQL for the database layer", None, vec!["database".to_string()], None, None)
            .unwrap();
        assert_eq!(memory.id, 1);
        assert_eq!(memory.tags, vec!["database".to_string()]);

        let bundle = mgr.recall("PostgreSQL", &RecallArgs { limit: 10, ..Default::default() }).unwrap();
        assert!(!bundle.results.is_empty());
        assert_eq!(bundle.results[0].memory.id, 1);
        assert!(bundle.results[0].score > 0.3);
    }

    #[test]
    fn tag_inference_adds_bugfix() {
        let (_dir, mgr) = manager();
        let (memory, _) = mgr
            .remember("learning", "Fixed the login bug by adding retry", None, vec![], None, None)
            .unwrap();
        assert!(memory.tags.contains(&"bugfix".to_string()));

        let with_tag = mgr
            .recall("login", &RecallArgs { tags: Some(vec!["bugfix".to_string()]), limit: 10, ..Default::default() })
            .unwrap();
        assert!(!with_tag.results.is_empty());

        let without_tag = mgr
            .recall("login", &RecallArgs { tags: Some(vec!["perf".to_string()]), limit: 10, ..Default::default() })
            .unwrap();
        assert!(without_tag.results.is_empty());
    }

    #[test]
    fn record_outcome_is_idempotent() {
        let (_dir, mgr) = manager();
        let (memory, _) = mgr.remember("decision", "Adopt gRPC", None, vec![], None, None).unwrap();
        let first = mgr.record_outcome(memory.id, "shipped", Some(true)).unwrap();
        let second = mgr.record_outcome(memory.id, "shipped", Some(true)).unwrap();
        assert_eq!(first.outcome, second.outcome);
        assert_eq!(first.worked, second.worked);
    }

    #[test]
    fn prune_dry_run_reports_without_deleting() {
        let (_dir, mgr) = manager();
        mgr.remember("pattern", "some old pattern", None, vec![], None, None).unwrap();
        let report = mgr.prune(0, &["pattern".to_string()], true).unwrap();
        assert_eq!(report.matched, 1);
        assert_eq!(report.deleted, 0);

        let still_there = mgr.recall("pattern", &RecallArgs { limit: 10, ..Default::default() }).unwrap();
        assert!(!still_there.results.is_empty());
    }

    #[test]
    fn cleanup_duplicates_keeps_newest() {
        let (_dir, mgr) = manager();
        mgr.remember("pattern", "Repeated content here", None, vec![], None, None).unwrap();
        mgr.remember("pattern", "repeated   content   here", None, vec![], None, None).unwrap();

        let report = mgr.cleanup_duplicates(false).unwrap();
        assert_eq!(report.groups, 1);
        assert_eq!(report.removed, 1);
    }

    #[test]
    fn empty_query_returns_empty_result() {
        let (_dir, mgr) = manager();
        mgr.remember("decision", "anything", None, vec![], None, None).unwrap();
        let bundle = mgr.recall("", &RecallArgs { limit: 10, ..Default::default() }).unwrap();
        assert!(bundle.results.is_empty());
    }
}
