//! The one deduplication routine shared by every retriever and the fusion engine.

use std::collections::HashMap;

use crate::types::Ranked;

/// Keep the best-scoring item per tool id, order by score descending, truncate to `limit`.
pub fn dedup_by_tool<T: Ranked>(items: Vec<T>, limit: usize) -> Vec<T> {
    dedup_by_tool_with(items, limit, T::rank_score)
}

/// Like [`dedup_by_tool`] but ranks by `score_of` instead of `Ranked::rank_score`.
///
/// Ties keep the first item seen; equal scores are ordered by tool id so the
/// output is deterministic and a second pass returns the same list.
pub fn dedup_by_tool_with<T, F>(items: Vec<T>, limit: usize, score_of: F) -> Vec<T>
where
    T: Ranked,
    F: Fn(&T) -> f32,
{
    let mut best: HashMap<String, T> = HashMap::with_capacity(items.len());
    for item in items {
        let replace = best.get(item.tool_id()).map_or(true, |kept| score_of(&item) > score_of(kept));
        if replace {
            best.insert(item.tool_id().to_string(), item);
        }
    }
    let mut out: Vec<T> = best.into_values().collect();
    out.sort_by(|a, b| {
        order_key(score_of(b)).total_cmp(&order_key(score_of(a))).then_with(|| a.tool_id().cmp(b.tool_id()))
    });
    out.truncate(limit);
    out
}

/// NaN ranks below every real score.
fn order_key(score: f32) -> f32 {
    if score.is_nan() {
        f32::NEG_INFINITY
    } else {
        score
    }
}
