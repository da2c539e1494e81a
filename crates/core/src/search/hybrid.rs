//! Hybrid search (C5): the central fusion algorithm. Lanes are produced
//! elsewhere (C3 lexical, C2 vector, C1 FTS fallback) and handed in here as
//! plain `(id, raw_score)` pairs so this module stays a pure function of
//! its inputs — the polymorphism-over-lanes design note in spec.md §9.

use std::collections::HashMap;

use chrono::Utc;

use crate::model::Memory;

#[derive(Debug, Clone)]
pub struct HybridSearchConfig {
    pub vector_weight: f32,
    pub diversity_max_per_file: usize,
    pub decay_half_life_days: f32,
    pub outcome_worked_boost: f32,
    pub outcome_failed_penalty: f32,
}

impl Default for HybridSearchConfig {
    fn default() -> Self {
        HybridSearchConfig {
            vector_weight: 0.3,
            diversity_max_per_file: 3,
            decay_half_life_days: 30.0,
            outcome_worked_boost: 0.10,
            outcome_failed_penalty: 0.20,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SearchFilters {
    pub tags_any: Option<Vec<String>>,
    pub file_path: Option<String>,
    pub offset: usize,
    pub limit: usize,
}

#[derive(Debug, Clone)]
pub struct ScoredMemory {
    pub memory: Memory,
    pub score: f32,
}

#[derive(Debug, Clone)]
pub struct ResultBundle {
    pub results: Vec<ScoredMemory>,
    pub total_before_pagination: usize,
    pub has_more: bool,
}

/// Max-scale a lane's raw scores into `[0, 1]`. Empty input stays empty.
fn normalize(scores: &[(i64, f32)]) -> HashMap<i64, f32> {
    let max = scores.iter().map(|(_, s)| *s).fold(0.0f32, f32::max);
    if max <= 0.0 {
        return scores.iter().map(|(id, _)| (*id, 0.0)).collect();
    }
    scores.iter().map(|(id, s)| (*id, (s / max).max(0.0))).collect()
}

fn decay_multiplier(memory: &Memory, half_life_days: f32) -> f32 {
    if memory.pinned || memory.is_permanent {
        return 1.0;
    }
    let age_days = (Utc::now() - memory.updated_at).num_seconds() as f32 / 86_400.0;
    if half_life_days <= 0.0 {
        return 1.0;
    }
    (-std::f32::consts::LN_2 * age_days.max(0.0) / half_life_days).exp()
}

fn outcome_multiplier(memory: &Memory, config: &HybridSearchConfig) -> f32 {
    match memory.worked {
        Some(true) => 1.0 + config.outcome_worked_boost,
        Some(false) => 1.0 - config.outcome_failed_penalty,
        None => 1.0,
    }
}

fn file_matches(candidate: Option<&str>, wanted: &str) -> bool {
    match candidate {
        Some(p) => p == wanted || p.ends_with(wanted),
        None => false,
    }
}

/// Fuse lexical + vector (+ FTS fallback) lane scores over already
/// category/archived/date-filtered rows, apply decay and outcome weighting,
/// filter by tags/file_path, cap per-file diversity, and paginate.
pub fn fuse_and_rank(
    lexical: &[(i64, f32)],
    vector: &[(i64, f32)],
    fts_fallback: &[(i64, f32)],
    rows: Vec<Memory>,
    config: &HybridSearchConfig,
    filters: &SearchFilters,
) -> ResultBundle {
    let lexical_scores = normalize(lexical);
    let vector_scores = normalize(vector);
    let fts_scores = normalize(fts_fallback);

    let mut scored: Vec<ScoredMemory> = rows
        .into_iter()
        .filter(|m| {
            if let Some(tags) = &filters.tags_any {
                if !tags.is_empty() && !m.tags.iter().any(|t| tags.contains(t)) {
                    return false;
                }
            }
            if let Some(fp) = &filters.file_path {
                if !file_matches(m.file_path_relative.as_deref(), fp) {
                    return false;
                }
            }
            true
        })
        .map(|m| {
            let l = lexical_scores
                .get(&m.id)
                .copied()
                .or_else(|| fts_scores.get(&m.id).copied())
                .unwrap_or(0.0);
            let v = vector_scores.get(&m.id).copied().unwrap_or(0.0);
            let fused = (1.0 - config.vector_weight) * l + config.vector_weight * v;
            let decayed = fused * decay_multiplier(&m, config.decay_half_life_days);
            let final_score = decayed * outcome_multiplier(&m, config);
            ScoredMemory { memory: m, score: final_score }
        })
        .collect();

    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.memory.updated_at.cmp(&a.memory.updated_at))
            .then_with(|| a.memory.id.cmp(&b.memory.id))
    });

    let diversified = apply_diversity_cap(scored, config.diversity_max_per_file);
    let total = diversified.len();

    let limit = if filters.limit == 0 { total } else { filters.limit };
    let page: Vec<ScoredMemory> = diversified.into_iter().skip(filters.offset).take(limit).collect();
    let has_more = total > filters.offset + limit;

    ResultBundle {
        results: page,
        total_before_pagination: total,
        has_more,
    }
}

fn apply_diversity_cap(scored: Vec<ScoredMemory>, max_per_file: usize) -> Vec<ScoredMemory> {
    if max_per_file == 0 {
        return scored;
    }
    let mut per_file: HashMap<String, usize> = HashMap::new();
    let mut out = Vec::with_capacity(scored.len());
    for item in scored {
        match item.memory.file_path_relative.clone() {
            Some(fp) => {
                let count = per_file.entry(fp).or_insert(0);
                if *count < max_per_file {
                    *count += 1;
                    out.push(item);
                }
            }
            None => out.push(item),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn memory(id: i64, file: Option<&str>) -> Memory {
        Memory {
            id,
            category: "decision".to_string(),
            content: "content".to_string(),
            rationale: None,
            context: None,
            tags: vec![],
            keywords: vec![],
            file_path_absolute: None,
            file_path_relative: file.map(|s| s.to_string()),
            is_permanent: false,
            pinned: false,
            archived: false,
            outcome: None,
            worked: None,
            vector_embedding_ref: None,
            sync: crate::model::SyncMeta::default(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn vector_weight_zero_ignores_vector_lane() {
        let rows = vec![memory(1, None), memory(2, None)];
        let config = HybridSearchConfig {
            vector_weight: 0.0,
            ..Default::default()
        };
        let bundle = fuse_and_rank(
            &[(1, 0.9), (2, 0.1)],
            &[(1, 0.0), (2, 10.0)],
            &[],
            rows,
            &config,
            &SearchFilters { limit: 10, ..Default::default() },
        );
        assert_eq!(bundle.results[0].memory.id, 1);
    }

    #[test]
    fn pinned_memories_bypass_decay() {
        let mut old = memory(1, None);
        old.pinned = true;
        old.is_permanent = true;
        old.updated_at = Utc::now() - Duration::days(365);

        let bundle = fuse_and_rank(
            &[(1, 1.0)],
            &[],
            &[],
            vec![old],
            &HybridSearchConfig::default(),
            &SearchFilters { limit: 10, ..Default::default() },
        );
        assert!(bundle.results[0].score > 0.9);
    }

    #[test]
    fn worked_true_outranks_worked_false_at_equal_prior_score() {
        let mut m1 = memory(1, None);
        m1.worked = Some(true);
        let mut m2 = memory(2, None);
        m2.worked = Some(false);

        let bundle = fuse_and_rank(
            &[(1, 1.0), (2, 1.0)],
            &[],
            &[],
            vec![m1, m2],
            &HybridSearchConfig::default(),
            &SearchFilters { limit: 10, ..Default::default() },
        );
        assert_eq!(bundle.results[0].memory.id, 1);
    }

    #[test]
    fn diversity_cap_limits_per_file_results() {
        let rows = (1..=5).map(|i| memory(i, Some("api/handlers.py"))).collect();
        let lexical: Vec<(i64, f32)> = (1..=5).map(|i| (i, 1.0)).collect();
        let mut config = HybridSearchConfig::default();
        config.diversity_max_per_file = 3;

        let bundle = fuse_and_rank(
            &lexical,
            &[],
            &[],
            rows,
            &config,
            &SearchFilters { limit: 10, ..Default::default() },
        );
        assert_eq!(bundle.results.len(), 3);
    }

    #[test]
    fn pagination_reports_has_more() {
        let rows: Vec<Memory> = (1..=5).map(|i| memory(i, None)).collect();
        let lexical: Vec<(i64, f32)> = (1..=5).map(|i| (i, 1.0)).collect();
        let bundle = fuse_and_rank(
            &lexical,
            &[],
            &[],
            rows,
            &HybridSearchConfig::default(),
            &SearchFilters { offset: 0, limit: 2, ..Default::default() },
        );
        assert_eq!(bundle.results.len(), 2);
        assert!(bundle.has_more);
    }
}
