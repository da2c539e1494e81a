//! Command dispatch: translates a flag-style argument vector into calls
//! against C6/C7/C8/C9, then shapes the result into a JSON value for
//! `main` to print. Kept free of I/O beyond what `memengine-core` returns.

use std::path::{Path, PathBuf};

use memengine_core::context::{ContextManager, ProjectContext};
use memengine_core::error::{EngineError, Result};
use memengine_core::memory::RecallArgs;
use memengine_core::model::Memory;

/// Minimal flag reader over a `&[String]`: `--flag value` and `--flag=value`
/// both supported, matching the teacher's `--data-dir`/`--data-dir=PATH` style.
struct Flags<'a> {
    args: &'a [String],
}

impl<'a> Flags<'a> {
    fn new(args: &'a [String]) -> Self {
        Flags { args }
    }

    fn get(&self, name: &str) -> Option<String> {
        let long = format!("--{name}");
        let mut i = 0;
        while i < self.args.len() {
            if self.args[i] == long {
                return self.args.get(i + 1).cloned();
            }
            if let Some(rest) = self.args[i].strip_prefix(&format!("{long}=")) {
                return Some(rest.to_string());
            }
            i += 1;
        }
        None
    }

    fn has(&self, name: &str) -> bool {
        let long = format!("--{name}");
        self.args.iter().any(|a| a == &long)
    }

    fn required(&self, name: &str) -> Result<String> {
        self.get(name)
            .ok_or_else(|| EngineError::validation(format!("missing required --{name}")))
    }

    fn csv(&self, name: &str) -> Option<Vec<String>> {
        self.get(name).map(|s| s.split(',').map(|p| p.trim().to_string()).filter(|p| !p.is_empty()).collect())
    }

    fn usize(&self, name: &str, default: usize) -> usize {
        self.get(name).and_then(|s| s.parse().ok()).unwrap_or(default)
    }

    fn i64(&self, name: &str) -> Result<i64> {
        self.required(name)?
            .parse()
            .map_err(|_| EngineError::validation(format!("--{name} must be an integer")))
    }
}

fn memory_json(m: &Memory) -> serde_json::Value {
    serde_json::to_value(m).unwrap_or(serde_json::Value::Null)
}

pub fn dispatch(ctx: &ProjectContext, manager: &ContextManager, command: &str, args: &[String]) -> Result<serde_json::Value> {
    let f = Flags::new(args);

    match command {
        "remember" => {
            let category = f.required("category")?;
            let content = f.required("content")?;
            let rationale = f.get("rationale");
            let tags = f.csv("tags").unwrap_or_default();
            let file_path = f.get("file-path");
            let (memory, refs) = ctx.memory.remember(
                &category,
                &content,
                rationale.as_deref(),
                tags,
                file_path.as_deref(),
                None,
            )?;
            Ok(serde_json::json!({"memory": memory_json(&memory), "code_refs": refs}))
        }

        "recall" => {
            let topic = f.get("topic").unwrap_or_default();
            let recall_args = RecallArgs {
                categories: f.csv("categories"),
                tags: f.csv("tags"),
                file_path: f.get("file-path"),
                limit: f.usize("limit", 0),
                include_archived: f.has("include-archived"),
                ..Default::default()
            };
            let bundle = ctx.memory.recall(&topic, &recall_args)?;
            Ok(serde_json::json!({
                "results": bundle.results.iter().map(|s| serde_json::json!({
                    "memory": memory_json(&s.memory),
                    "score": s.score,
                })).collect::<Vec<_>>(),
                "total_before_pagination": bundle.total_before_pagination,
                "has_more": bundle.has_more,
            }))
        }

        "search" => {
            let query = f.required("query")?;
            let limit = f.usize("limit", 0);
            let results = ctx.memory.search(&query, limit)?;
            Ok(serde_json::json!({"results": results.iter().map(memory_json).collect::<Vec<_>>()}))
        }

        "record-outcome" => {
            let id = f.i64("id")?;
            let outcome = f.required("outcome")?;
            let worked = f.get("worked").map(|v| v == "true");
            let memory = ctx.memory.record_outcome(id, &outcome, worked)?;
            Ok(serde_json::json!({"memory": memory_json(&memory)}))
        }

        "pin" => {
            let id = f.i64("id")?;
            let memory = ctx.memory.pin(id, !f.has("unpin"))?;
            Ok(serde_json::json!({"memory": memory_json(&memory)}))
        }

        "archive" => {
            let id = f.i64("id")?;
            let memory = ctx.memory.archive(id, !f.has("unarchive"))?;
            Ok(serde_json::json!({"memory": memory_json(&memory)}))
        }

        "prune" => {
            let older_than_days = f.get("older-than-days").and_then(|s| s.parse().ok()).unwrap_or(90);
            let categories = f.csv("categories").unwrap_or_default();
            let report = ctx.memory.prune(older_than_days, &categories, f.has("dry-run"))?;
            Ok(serde_json::json!({"matched": report.matched, "deleted": report.deleted, "sample_ids": report.sample_ids}))
        }

        "cleanup" => {
            let report = ctx.memory.cleanup_duplicates(f.has("dry-run"))?;
            Ok(serde_json::json!({"groups": report.groups, "removed": report.removed}))
        }

        "rebuild-index" => {
            ctx.memory.rebuild_index()?;
            ctx.rules.rebuild_index()?;
            Ok(serde_json::json!({"index_built_at": ctx.memory.index_built_at()}))
        }

        "export" => {
            let data = ctx.memory.export()?;
            serde_json::to_value(&data).map_err(|e| EngineError::fatal(e.to_string()))
        }

        "import" => {
            let file = f.required("file")?;
            let raw = std::fs::read_to_string(&file)?;
            let data = serde_json::from_str(&raw).map_err(|e| EngineError::validation(format!("malformed export file: {e}")))?;
            let report = ctx.memory.import(&data, f.has("merge"))?;
            Ok(serde_json::json!({"memories_imported": report.memories_imported, "rules_imported": report.rules_imported}))
        }

        "add-rule" => {
            let trigger = f.required("trigger")?;
            let must_do = f.csv("must-do").unwrap_or_default();
            let must_not = f.csv("must-not").unwrap_or_default();
            let ask_first = f.csv("ask-first").unwrap_or_default();
            let warnings = f.csv("warnings").unwrap_or_default();
            let priority = f.get("priority").and_then(|s| s.parse().ok()).unwrap_or(0);
            let rule = ctx.rules.add_rule(&trigger, &must_do, &must_not, &ask_first, &warnings, priority)?;
            Ok(serde_json::to_value(&rule).map_err(|e| EngineError::fatal(e.to_string()))?)
        }

        "list-rules" => {
            let rules = ctx.rules.list_rules(f.has("enabled-only"))?;
            Ok(serde_json::json!({"rules": rules}))
        }

        "check-rules" => {
            let text = f.required("text")?;
            let hits = ctx.rules.check_rules(&text)?;
            Ok(serde_json::json!({"rules": hits}))
        }

        "index-project" => {
            let root: PathBuf = f.get("root").map(PathBuf::from).unwrap_or_else(|| Path::new(&ctx.project_path).to_path_buf());
            let indexed = ctx.code_indexer.index_project(&root, &ctx.storage)?;
            Ok(serde_json::json!({"entities_indexed": indexed}))
        }

        "find-code" => {
            let name = f.required("name")?;
            let entity = ctx.code_indexer.find_entity(&ctx.storage, &name)?;
            Ok(serde_json::json!({"entity": entity}))
        }

        "analyze-impact" => {
            let entity_id = f.required("entity-id")?;
            let impact = ctx.code_indexer.analyze_impact(&ctx.storage, &entity_id)?;
            match impact {
                Some((entity, refs)) => Ok(serde_json::json!({"entity": entity, "referenced_by": refs})),
                None => Err(EngineError::not_found(format!("entity {entity_id} not found"))),
            }
        }

        "health" => {
            let report = ctx.health(manager.config(), manager.active_context_count())?;
            Ok(serde_json::to_value(&report).map_err(|e| EngineError::fatal(e.to_string()))?)
        }

        other => Err(EngineError::validation(format!("unknown command '{other}'"))),
    }
}
