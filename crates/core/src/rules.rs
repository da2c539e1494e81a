//! Rules engine (C7): trigger-matched guidance surfaced to callers before
//! they act. `check_rules` runs against a small dedicated TF-IDF index over
//! rule triggers, mirroring C3's scoring contract (spec.md §4.7).

use std::sync::Mutex;

use crate::error::Result;
use crate::model::Rule;
use crate::search::TfIdfIndex;
use crate::storage::{queries, Storage};

pub struct RulesEngine {
    storage: std::sync::Arc<Storage>,
    trigger_index: Mutex<TfIdfIndex>,
    threshold: f32,
}

impl RulesEngine {
    pub fn new(storage: std::sync::Arc<Storage>, threshold: f32) -> Result<Self> {
        let engine = RulesEngine {
            storage,
            trigger_index: Mutex::new(TfIdfIndex::new()),
            threshold,
        };
        engine.rebuild_index()?;
        Ok(engine)
    }

    pub fn rebuild_index(&self) -> Result<()> {
        let rules = self.storage.with_reader(|conn| queries::list_rules(conn, false))?;
        let mut index = self.trigger_index.lock().expect("trigger index mutex poisoned");
        index.clear();
        for rule in &rules {
            index.add_document(rule.id, &rule.trigger, &[]);
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    pub fn add_rule(
        &self,
        trigger: &str,
        must_do: &[String],
        must_not: &[String],
        ask_first: &[String],
        warnings: &[String],
        priority: i32,
    ) -> Result<Rule> {
        let id = self
            .storage
            .with_write_tx(|tx| queries::insert_rule(tx, trigger, must_do, must_not, ask_first, warnings, priority))?;

        self.trigger_index.lock().expect("trigger index mutex poisoned").add_document(id, trigger, &[]);

        self.storage
            .with_reader(|conn| queries::list_rules(conn, false))?
            .into_iter()
            .find(|r| r.id == id)
            .ok_or_else(|| crate::error::EngineError::fatal("rule vanished after insert"))
    }

    pub fn list_rules(&self, enabled_only: bool) -> Result<Vec<Rule>> {
        self.storage.with_reader(|conn| queries::list_rules(conn, enabled_only))
    }

    /// Tokenize `text`, score against every rule's trigger, return matches
    /// above `threshold` sorted by (score desc, priority desc).
    pub fn check_rules(&self, text: &str) -> Result<Vec<Rule>> {
        let scored = self
            .trigger_index
            .lock()
            .expect("trigger index mutex poisoned")
            .query(text, usize::MAX, self.threshold);

        if scored.is_empty() {
            return Ok(Vec::new());
        }

        let all_rules = self.list_rules(true)?;
        let mut matched: Vec<(Rule, f32)> = scored
            .into_iter()
            .filter_map(|(id, score)| all_rules.iter().find(|r| r.id == id).map(|r| (r.clone(), score)))
            .collect();

        matched.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.0.priority.cmp(&a.0.priority))
        });

        Ok(matched.into_iter().map(|(r, _)| r).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn engine() -> (TempDir, RulesEngine) {
        let dir = TempDir::new().unwrap();
        let storage = std::sync::Arc::new(Storage::open(&dir.path().join("store.db"), 5000).unwrap());
        (dir, RulesEngine::new(storage, 0.05).unwrap())
    }

    #[test]
    fn add_and_list_rule() {
        let (_dir, eng) = engine();
        eng.add_rule(
            "modifying authentication code",
            &["write tests".to_string()],
            &["skip review".to_string()],
            &[],
            &[],
            5,
        )
        .unwrap();
        let rules = eng.list_rules(true).unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].priority, 5);
    }

    #[test]
    fn check_rules_matches_trigger_terms() {
        let (_dir, eng) = engine();
        eng.add_rule("modifying authentication code", &[], &[], &[], &[], 1).unwrap();
        eng.add_rule("touching billing logic", &[], &[], &[], &[], 1).unwrap();

        let hits = eng.check_rules("about to change the authentication flow").unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].trigger.contains("authentication"));
    }

    #[test]
    fn higher_priority_breaks_equal_score_ties() {
        let (_dir, eng) = engine();
        eng.add_rule("deploy", &[], &[], &[], &[], 1).unwrap();
        eng.add_rule("deploy", &[], &[], &[], &[], 10).unwrap();

        let hits = eng.check_rules("deploy").unwrap();
        assert_eq!(hits[0].priority, 10);
    }
}
