//! End-to-end scenarios from the specification's testable-properties
//! section, run against the public `memengine-core` surface the way a
//! C11 adapter would use it: through `ContextManager` only.

use std::sync::Arc;
use std::thread;

use memengine_core::config::EngineConfig;
use memengine_core::context::ContextManager;
use memengine_core::memory::RecallArgs;
use tempfile::TempDir;

fn manager_with(config: EngineConfig) -> (TempDir, ContextManager) {
    let dir = TempDir::new().unwrap();
    (dir, ContextManager::new(config))
}

#[test]
fn scenario_basic_remember_and_recall() {
    let (dir, manager) = manager_with(EngineConfig::default());
    let ctx = manager.get_context(dir.path()).unwrap();

    let (memory, _refs) = ctx
        .memory
        .remember("decision", "Use PostgreSQL for the database layer", None, vec!["database".to_string()], None, None)
        .unwrap();
    assert_eq!(memory.id, 1);
    assert_eq!(memory.tags, vec!["database".to_string()]);

    let bundle = ctx.memory.recall("PostgreSQL", &RecallArgs { limit: 10, ..Default::default() }).unwrap();
    assert!(bundle.results.len() >= 1);
    assert_eq!(bundle.results[0].memory.id, 1);
    assert!(bundle.results[0].score > 0.3);
}

#[test]
fn scenario_tag_inference() {
    let (dir, manager) = manager_with(EngineConfig::default());
    let ctx = manager.get_context(dir.path()).unwrap();

    let (memory, _) = ctx.memory.remember("learning", "Fixed the login bug by adding retry", None, vec![], None, None).unwrap();
    assert!(memory.tags.contains(&"bugfix".to_string()));

    let with_tag = ctx
        .memory
        .recall("login", &RecallArgs { tags: Some(vec!["bugfix".to_string()]), limit: 10, ..Default::default() })
        .unwrap();
    assert!(!with_tag.results.is_empty());

    let without_tag = ctx
        .memory
        .recall("login", &RecallArgs { tags: Some(vec!["perf".to_string()]), limit: 10, ..Default::default() })
        .unwrap();
    assert!(without_tag.results.is_empty());
}

#[test]
fn scenario_diversity_cap() {
    let mut config = EngineConfig::default();
    config.search_diversity_max_per_file = 3;
    let (dir, manager) = manager_with(config);
    let ctx = manager.get_context(dir.path()).unwrap();

    for i in 0..5 {
        ctx.memory
            .remember(
                "pattern",
                &format!("cache invalidation approach number {i}"),
                None,
                vec![],
                Some("api/handlers.py"),
                None,
            )
            .unwrap();
    }

    let bundle = ctx.memory.recall("cache", &RecallArgs { limit: 10, ..Default::default() }).unwrap();
    let from_file = bundle
        .results
        .iter()
        .filter(|r| r.memory.file_path_relative.as_deref() == Some("api/handlers.py"))
        .count();
    assert!(from_file <= 3, "expected at most 3 results from the capped file, got {from_file}");
}

#[test]
fn scenario_search_is_flat_unlike_recall() {
    let mut config = EngineConfig::default();
    config.search_diversity_max_per_file = 3;
    let (dir, manager) = manager_with(config);
    let ctx = manager.get_context(dir.path()).unwrap();

    for i in 0..5 {
        ctx.memory
            .remember(
                "pattern",
                &format!("cache invalidation approach number {i}"),
                None,
                vec![],
                Some("api/handlers.py"),
                None,
            )
            .unwrap();
    }

    let recalled = ctx.memory.recall("cache", &RecallArgs { limit: 10, ..Default::default() }).unwrap();
    let recalled_from_file = recalled
        .results
        .iter()
        .filter(|r| r.memory.file_path_relative.as_deref() == Some("api/handlers.py"))
        .count();
    assert!(recalled_from_file <= 3, "recall must honor the diversity cap");

    let searched = ctx.memory.search("cache", 10).unwrap();
    let searched_from_file = searched
        .iter()
        .filter(|m| m.file_path_relative.as_deref() == Some("api/handlers.py"))
        .count();
    assert_eq!(searched_from_file, 5, "search must be flat: no diversity cap");
}

#[test]
fn scenario_outcome_boost() {
    let (dir, manager) = manager_with(EngineConfig::default());
    let ctx = manager.get_context(dir.path()).unwrap();

    let (m1, _) = ctx.memory.remember("pattern", "retry with exponential backoff on network errors", None, vec![], None, None).unwrap();
    let (m2, _) = ctx.memory.remember("pattern", "retry with exponential backoff on network failures", None, vec![], None, None).unwrap();

    ctx.memory.record_outcome(m1.id, "shipped", Some(true)).unwrap();
    ctx.memory.record_outcome(m2.id, "reverted", Some(false)).unwrap();

    let bundle = ctx.memory.recall("retry exponential backoff", &RecallArgs { limit: 10, ..Default::default() }).unwrap();
    let rank_of = |id: i64| bundle.results.iter().position(|r| r.memory.id == id);
    let pos1 = rank_of(m1.id).expect("m1 present");
    let pos2 = rank_of(m2.id).expect("m2 present");
    assert!(pos1 < pos2, "worked=true memory should outrank worked=false memory");
}

#[test]
fn scenario_stable_entity_id_after_edit() {
    let (dir, manager) = manager_with(EngineConfig::default());
    let ctx = manager.get_context(dir.path()).unwrap();

    std::fs::write(
        dir.path().join("service.py"),
        "class UserService:\n    def authenticate(self):\n        pass\n",
    )
    .unwrap();

    ctx.code_indexer.index_project(dir.path(), &ctx.storage).unwrap();
    let before = ctx.code_indexer.find_entity(&ctx.storage, "authenticate").unwrap().expect("entity found");

    std::fs::write(
        dir.path().join("service.py"),
        "# added context\n# second comment line\nclass UserService:\n    def authenticate(self):\n        pass\n",
    )
    .unwrap();

    ctx.code_indexer.index_project(dir.path(), &ctx.storage).unwrap();
    let after = ctx.code_indexer.find_entity(&ctx.storage, "authenticate").unwrap().expect("entity still found");

    assert_eq!(before.id, after.id);
    assert_ne!(before.line_start, after.line_start);
}

#[test]
fn scenario_concurrent_init_safety() {
    let dir = TempDir::new().unwrap();
    let manager = Arc::new(ContextManager::new(EngineConfig::default()));
    let path = dir.path().to_path_buf();

    let handles: Vec<_> = (0..5)
        .map(|_| {
            let manager = Arc::clone(&manager);
            let path = path.clone();
            thread::spawn(move || manager.get_context(&path).unwrap())
        })
        .collect();

    let contexts: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let first = &contexts[0];
    for ctx in &contexts[1..] {
        assert!(Arc::ptr_eq(first, ctx), "all concurrent callers must observe the same context");
    }
    assert_eq!(manager.active_context_count(), 1);
}

#[test]
fn boundary_empty_query_returns_empty_result() {
    let (dir, manager) = manager_with(EngineConfig::default());
    let ctx = manager.get_context(dir.path()).unwrap();
    ctx.memory.remember("decision", "anything at all", None, vec![], None, None).unwrap();

    let bundle = ctx.memory.recall("", &RecallArgs { limit: 10, ..Default::default() }).unwrap();
    assert!(bundle.results.is_empty());
}

#[test]
fn boundary_oversized_content_is_rejected() {
    let (dir, manager) = manager_with(EngineConfig::default());
    let ctx = manager.get_context(dir.path()).unwrap();
    let huge = "a".repeat(50_001);

    let err = ctx.memory.remember("decision", &huge, None, vec![], None, None);
    assert!(err.is_err(), "content over max_content_size should be rejected");
}

#[test]
fn invariant_pinned_implies_permanent() {
    let (dir, manager) = manager_with(EngineConfig::default());
    let ctx = manager.get_context(dir.path()).unwrap();
    let (memory, _) = ctx.memory.remember("decision", "pin this decision", None, vec![], None, None).unwrap();

    let pinned = ctx.memory.pin(memory.id, true).unwrap();
    assert!(pinned.pinned);
    assert!(pinned.is_permanent, "pinned memories must be marked permanent");
}

#[test]
fn invariant_archived_excluded_from_recall() {
    let (dir, manager) = manager_with(EngineConfig::default());
    let ctx = manager.get_context(dir.path()).unwrap();
    let (memory, _) = ctx.memory.remember("decision", "archive this particular decision", None, vec![], None, None).unwrap();

    ctx.memory.archive(memory.id, true).unwrap();
    let bundle = ctx.memory.recall("archive this particular decision", &RecallArgs { limit: 10, ..Default::default() }).unwrap();
    assert!(bundle.results.iter().all(|r| r.memory.id != memory.id));
}

#[test]
fn roundtrip_export_import_preserves_rows() {
    let (dir_a, manager_a) = manager_with(EngineConfig::default());
    let ctx_a = manager_a.get_context(dir_a.path()).unwrap();
    ctx_a.memory.remember("decision", "use sqlite for storage", None, vec!["storage".to_string()], None, None).unwrap();
    ctx_a.rules.add_rule("touching storage code", &["write a migration".to_string()], &[], &[], &[], 3).unwrap();

    let exported = ctx_a.memory.export().unwrap();

    let (dir_b, manager_b) = manager_with(EngineConfig::default());
    let ctx_b = manager_b.get_context(dir_b.path()).unwrap();
    let report = ctx_b.memory.import(&exported, false).unwrap();
    assert_eq!(report.memories_imported, 1);
    assert_eq!(report.rules_imported, 1);

    let imported = ctx_b.memory.export().unwrap();
    assert_eq!(imported.memories[0].category, exported.memories[0].category);
    assert_eq!(imported.memories[0].content, exported.memories[0].content);
    assert_eq!(imported.memories[0].tags, exported.memories[0].tags);
    assert_eq!(imported.rules[0].trigger, exported.rules[0].trigger);
}

#[test]
fn idempotence_pin_twice_equals_pin_once() {
    let (dir, manager) = manager_with(EngineConfig::default());
    let ctx = manager.get_context(dir.path()).unwrap();
    let (memory, _) = ctx.memory.remember("decision", "pin idempotence check", None, vec![], None, None).unwrap();

    let once = ctx.memory.pin(memory.id, true).unwrap();
    let twice = ctx.memory.pin(memory.id, true).unwrap();
    assert_eq!(once.pinned, twice.pinned);
    assert_eq!(once.is_permanent, twice.is_permanent);
}

#[test]
fn vector_weight_zero_is_independent_of_embeddings() {
    let mut config = EngineConfig::default();
    config.hybrid_vector_weight = 0.0;
    let (dir, manager) = manager_with(config);
    let ctx = manager.get_context(dir.path()).unwrap();

    let (memory, _) = ctx.memory.remember("decision", "lexical only scoring check", None, vec![], None, None).unwrap();
    let bundle = ctx.memory.recall("lexical only scoring check", &RecallArgs { limit: 10, ..Default::default() }).unwrap();
    assert_eq!(bundle.results[0].memory.id, memory.id);
}
