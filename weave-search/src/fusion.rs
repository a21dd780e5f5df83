//! Result fusion (spec §4.9 "Result fusion", "Explanation"): merges FTS and
//! semantic candidate lists into one ranked page, grounded on the
//! accumulate-by-id pattern other agentic-memory retrieval engines use
//! (weighted contribution summed into a `HashMap`, then sorted).

use crate::types::SearchWeights;
use std::collections::HashMap;
use weave_core::{MatchType, SearchResult};

/// Fuse `fts` and `semantic` candidate lists keyed by `message_id`. A
/// message present in both sources keeps both component scores; the
/// combined score is `w_semantic * sem + w_fts * fts`, treating a missing
/// component as 0 (spec §4.9).
pub fn fuse(
    fts: Vec<SearchResult>,
    semantic: Vec<SearchResult>,
    weights: SearchWeights,
) -> Vec<SearchResult> {
    let mut merged: HashMap<_, SearchResult> = HashMap::new();

    for mut r in fts {
        r.scores.fts = Some(r.score);
        merged.insert(r.message_id, r);
    }
    for r in semantic {
        merged
            .entry(r.message_id)
            .and_modify(|existing| {
                existing.scores.semantic = r.scores.semantic;
                if existing.content.is_empty() {
                    existing.content = r.content.clone();
                }
            })
            .or_insert(r);
    }

    let mut out: Vec<SearchResult> = merged
        .into_values()
        .map(|mut r| {
            let sem = r.scores.semantic.unwrap_or(0.0);
            let fts = r.scores.fts.unwrap_or(0.0);
            let combined = weights.semantic * sem + weights.fts * fts;
            r.scores.combined = combined;
            r.score = combined;
            r.match_type = match (r.scores.semantic.is_some(), r.scores.fts.is_some()) {
                (true, true) => MatchType::Hybrid,
                (true, false) => MatchType::Semantic,
                (false, true) => MatchType::Fts,
                (false, false) => MatchType::Hybrid,
            };
            r
        })
        .collect();

    out.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.created_at.cmp(&a.created_at))
    });
    out
}

/// One-sentence rationale for a fused result (spec §4.9 "Explanation
/// (optional)").
pub fn explain(result: &SearchResult, weights: SearchWeights) -> String {
    match (result.scores.semantic, result.scores.fts) {
        (Some(sem), Some(fts)) => format!(
            "matched both semantic similarity ({:.2}, weight {:.2}) and full-text relevance ({:.2}, weight {:.2})",
            sem, weights.semantic, fts, weights.fts
        ),
        (Some(sem), None) => format!(
            "matched by semantic similarity only ({:.2}, weight {:.2})",
            sem, weights.semantic
        ),
        (None, Some(fts)) => format!(
            "matched by full-text relevance only ({:.2}, weight {:.2})",
            fts, weights.fts
        ),
        (None, None) => "matched with no surviving score component".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use weave_core::{ConversationId, MessageId, SourceScores};

    fn result(id: MessageId, score: f32, age_secs: i64) -> SearchResult {
        SearchResult {
            message_id: id,
            conversation_id: ConversationId::now_v7(),
            content: "x".into(),
            score,
            match_type: MatchType::Fts,
            scores: SourceScores::default(),
            highlights: vec![],
            conversation_title: None,
            created_at: Utc::now() - Duration::seconds(age_secs),
            explanation: None,
        }
    }

    #[test]
    fn shared_ids_merge_both_components() {
        let id = MessageId::now_v7();
        let fts = vec![result(id, 0.8, 0)];
        let semantic = vec![result(id, 0.6, 0)];
        let fused = fuse(fts, semantic, SearchWeights { semantic: 0.6, fts: 0.4 });
        assert_eq!(fused.len(), 1);
        assert_eq!(fused[0].match_type, MatchType::Hybrid);
        let expected = 0.6 * 0.6 + 0.4 * 0.8;
        assert!((fused[0].score - expected).abs() < 1e-6);
    }

    #[test]
    fn fts_only_result_keeps_fts_match_type() {
        let fused = fuse(vec![result(MessageId::now_v7(), 0.9, 0)], vec![], SearchWeights { semantic: 0.6, fts: 0.4 });
        assert_eq!(fused[0].match_type, MatchType::Fts);
        assert!((fused[0].score - 0.4 * 0.9).abs() < 1e-6);
    }

    #[test]
    fn ties_break_by_newer_created_at() {
        let a = result(MessageId::now_v7(), 0.5, 100);
        let b = result(MessageId::now_v7(), 0.5, 1);
        let fused = fuse(vec![a.clone(), b.clone()], vec![], SearchWeights { semantic: 0.6, fts: 0.4 });
        assert_eq!(fused[0].message_id, b.message_id);
    }

    #[test]
    fn sorted_descending_by_combined_score() {
        let hi = result(MessageId::now_v7(), 1.0, 0);
        let lo = result(MessageId::now_v7(), 0.1, 0);
        let fused = fuse(vec![hi.clone(), lo.clone()], vec![], SearchWeights { semantic: 0.6, fts: 0.4 });
        assert_eq!(fused[0].message_id, hi.message_id);
    }
}
