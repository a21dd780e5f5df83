//! Assembly Strategies (C4): a closed sum type of strategy variants plus a
//! dispatcher (spec §9 "implement as a sum type... plus a dispatcher"),
//! with shared diversity-selection and type-balancing free functions.

use crate::types::AssemblyRequest;
use std::collections::HashSet;
use weave_core::{ItemType, ScoredItem, Timestamp};

const TEMPORAL_KEYWORDS: &[&str] = &[
    "recent", "latest", "current", "now", "today", "yesterday", "this week", "last", "new",
    "updated", "changed", "just",
];

const SECONDS_PER_DAY: i64 = 86_400;

/// A strategy is a closed variant; no trait objects (SPEC_FULL.md §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssemblyStrategyKind {
    Temporal,
    Topical,
    EntityCentric,
    Hybrid,
}

/// Strategy auto-selection (spec §4.4 "Strategy auto-selection").
pub fn auto_select(request: &AssemblyRequest) -> AssemblyStrategyKind {
    let query_lower = request.query.to_lowercase();
    let has_temporal_keyword = TEMPORAL_KEYWORDS
        .iter()
        .any(|kw| query_lower.contains(kw));
    let short_window = request
        .time_window_secs
        .map(|w| w < 7 * SECONDS_PER_DAY)
        .unwrap_or(false);

    if has_temporal_keyword || request.include_recent || short_window {
        return AssemblyStrategyKind::Temporal;
    }
    if !request.focus_topics.is_empty() {
        return AssemblyStrategyKind::Topical;
    }
    if has_capitalized_entity_sequence(&request.query) {
        return AssemblyStrategyKind::EntityCentric;
    }
    AssemblyStrategyKind::Hybrid
}

fn has_capitalized_entity_sequence(query: &str) -> bool {
    query
        .split_whitespace()
        .filter(|w| w.chars().next().map(|c| c.is_uppercase()).unwrap_or(false))
        .count()
        >= 2
}

/// Extracts a simple noun-phrase-ish set of entity mentions: consecutive
/// capitalized tokens, joined. A domain-specific extractor is pluggable by
/// replacing this function (spec §4.4 "Entity-centric").
pub fn extract_entities(text: &str) -> Vec<String> {
    let mut entities = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for word in text.split_whitespace() {
        let clean: String = word.chars().filter(|c| c.is_alphanumeric()).collect();
        if clean.chars().next().map(|c| c.is_uppercase()).unwrap_or(false) {
            current.push(word);
        } else if !current.is_empty() {
            entities.push(current.join(" "));
            current.clear();
        }
    }
    if !current.is_empty() {
        entities.push(current.join(" "));
    }
    entities
}

fn top_n_tokens(content: &str, n: usize) -> HashSet<String> {
    content
        .split_whitespace()
        .map(|w| w.to_lowercase())
        .take(n)
        .collect()
}

/// Jaccard overlap between the top-N tokens of two pieces of content,
/// used by diversity selection to discourage near-duplicates.
pub fn jaccard_overlap(a: &str, b: &str) -> f32 {
    let ta = top_n_tokens(a, 20);
    let tb = top_n_tokens(b, 20);
    if ta.is_empty() && tb.is_empty() {
        return 0.0;
    }
    let intersection = ta.intersection(&tb).count();
    let union = ta.union(&tb).count();
    if union == 0 {
        0.0
    } else {
        intersection as f32 / union as f32
    }
}

/// Diversity selection: iterate items in (already sorted) order, admitting
/// each only if its max Jaccard overlap with already-admitted items stays
/// under `1 - factor`. The top item is always admitted (spec §4.4
/// "Diversity selection").
pub fn diversity_select(items: &[ScoredItem], target_count: usize, factor: f32) -> Vec<ScoredItem> {
    let mut admitted: Vec<ScoredItem> = Vec::new();
    for (i, item) in items.iter().enumerate() {
        if admitted.len() >= target_count {
            break;
        }
        if i == 0 {
            admitted.push(item.clone());
            continue;
        }
        let max_overlap = admitted
            .iter()
            .map(|a| jaccard_overlap(&a.content, &item.content))
            .fold(0.0f32, f32::max);
        if max_overlap <= 1.0 - factor {
            admitted.push(item.clone());
        }
    }
    admitted
}

/// Enforces a summary:message ratio by swapping trailing items of the
/// over-represented type for next-best unused items of the other type,
/// never exceeding the current total (spec §4.4 "Type balancing").
pub fn type_balance(
    selected: Vec<ScoredItem>,
    pool: &[ScoredItem],
    summary_to_message_ratio: f32,
) -> Vec<ScoredItem> {
    if selected.is_empty() {
        return selected;
    }
    let total = selected.len();
    let target_summaries = ((total as f32) * summary_to_message_ratio).round() as usize;

    let mut summaries: Vec<ScoredItem> = selected
        .iter()
        .filter(|i| i.item_type == ItemType::Summary)
        .cloned()
        .collect();
    let mut messages: Vec<ScoredItem> = selected
        .iter()
        .filter(|i| i.item_type == ItemType::Message)
        .cloned()
        .collect();

    let selected_ids: HashSet<String> = selected.iter().map(|i| i.stable_id()).collect();

    if summaries.len() > target_summaries {
        let excess = summaries.len() - target_summaries;
        let replacement_pool: Vec<&ScoredItem> = pool
            .iter()
            .filter(|i| i.item_type == ItemType::Message && !selected_ids.contains(&i.stable_id()))
            .collect();
        for replacement in replacement_pool.into_iter().take(excess) {
            if let Some(worst) = summaries
                .iter()
                .enumerate()
                .min_by(|(_, a), (_, b)| a.relevance_score.partial_cmp(&b.relevance_score).unwrap())
                .map(|(idx, _)| idx)
            {
                summaries.remove(worst);
                messages.push(replacement.clone());
            }
        }
    } else if messages.len() > total - target_summaries {
        let excess = messages.len() - (total - target_summaries);
        let replacement_pool: Vec<&ScoredItem> = pool
            .iter()
            .filter(|i| i.item_type == ItemType::Summary && !selected_ids.contains(&i.stable_id()))
            .collect();
        for replacement in replacement_pool.into_iter().take(excess) {
            if let Some(worst) = messages
                .iter()
                .enumerate()
                .min_by(|(_, a), (_, b)| a.relevance_score.partial_cmp(&b.relevance_score).unwrap())
                .map(|(idx, _)| idx)
            {
                messages.remove(worst);
                summaries.push(replacement.clone());
            }
        }
    }

    let mut result: Vec<ScoredItem> = summaries.into_iter().chain(messages).collect();
    result.sort_by(|a, b| b.relevance_score.partial_cmp(&a.relevance_score).unwrap());
    result
}

fn threshold_filter(items: Vec<ScoredItem>, min_relevance: f32) -> Vec<ScoredItem> {
    items
        .into_iter()
        .filter(|i| i.relevance_score >= min_relevance)
        .collect()
}

fn temporal_score(age_secs: f32, window_secs: f32) -> f32 {
    if age_secs <= window_secs {
        (-0.5 * age_secs / window_secs).exp()
    } else {
        let excess = age_secs - window_secs;
        (-2.0 * excess / window_secs).exp() * 0.1
    }
}

fn select_temporal(items: Vec<ScoredItem>, request: &AssemblyRequest, now: Timestamp) -> Vec<ScoredItem> {
    let min_relevance = request.min_relevance.unwrap_or(0.2);
    let window_secs = request
        .time_window_secs
        .unwrap_or(7 * SECONDS_PER_DAY)
        .max(1) as f32;
    let long_window = window_secs > (7 * SECONDS_PER_DAY) as f32;

    let mut max_items = 15;
    if long_window {
        max_items += 10;
    }
    if request.conversation_id.is_some() {
        max_items += 5;
    }
    if request.include_recent {
        max_items += 3;
    }

    let mut filtered = threshold_filter(items, min_relevance);
    for item in filtered.iter_mut() {
        let age_secs = (now - item.created_at).num_seconds().max(0) as f32;
        let t_score = temporal_score(age_secs, window_secs);
        item.relevance_score = (0.7 * item.relevance_score + 0.3 * t_score).clamp(0.0, 1.0);
    }
    filtered.sort_by(|a, b| b.relevance_score.partial_cmp(&a.relevance_score).unwrap());
    filtered.truncate(max_items);

    let balanced = type_balance(filtered.clone(), &filtered, 0.3);

    // Group by conversation, newest-first within each group, then
    // interleave: top summary, top-3 messages, remaining summaries,
    // remaining messages (spec §4.4 "Final ordering").
    let mut by_conversation: std::collections::BTreeMap<String, Vec<ScoredItem>> =
        std::collections::BTreeMap::new();
    for item in balanced {
        by_conversation
            .entry(item.conversation_id.to_string())
            .or_default()
            .push(item);
    }

    let mut interleaved = Vec::new();
    for (_, mut group) in by_conversation {
        group.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let mut summaries: Vec<ScoredItem> = group
            .iter()
            .filter(|i| i.item_type == ItemType::Summary)
            .cloned()
            .collect();
        let mut messages: Vec<ScoredItem> = group
            .iter()
            .filter(|i| i.item_type == ItemType::Message)
            .cloned()
            .collect();

        if !summaries.is_empty() {
            interleaved.push(summaries.remove(0));
        }
        for _ in 0..3.min(messages.len()) {
            interleaved.push(messages.remove(0));
        }
        interleaved.extend(summaries);
        interleaved.extend(messages);
    }

    interleaved.sort_by(|a, b| b.relevance_score.partial_cmp(&a.relevance_score).unwrap());
    interleaved
}

fn select_topical(items: Vec<ScoredItem>, request: &AssemblyRequest) -> Vec<ScoredItem> {
    let min_relevance = request.min_relevance.unwrap_or(0.0);
    let mut filtered = threshold_filter(items, min_relevance);

    if !request.focus_topics.is_empty() {
        for item in filtered.iter_mut() {
            let lower = item.content.to_lowercase();
            let matched = request
                .focus_topics
                .iter()
                .any(|t| lower.contains(&t.to_lowercase()));
            if matched {
                item.relevance_score = (item.relevance_score + 0.15).min(1.0);
            }
        }
    }
    filtered.sort_by(|a, b| b.relevance_score.partial_cmp(&a.relevance_score).unwrap());

    let diversified = diversity_select(&filtered, 20, 0.4);
    let balanced = type_balance(diversified, &filtered, 0.55);

    let mut result = balanced;
    result.sort_by(|a, b| {
        b.relevance_score
            .partial_cmp(&a.relevance_score)
            .unwrap()
            .then_with(|| b.created_at.cmp(&a.created_at))
    });
    result
}

fn select_entity_centric(items: Vec<ScoredItem>, request: &AssemblyRequest) -> Vec<ScoredItem> {
    let min_relevance = request.min_relevance.unwrap_or(0.0);
    let query_entities = extract_entities(&request.query);
    let mut filtered = threshold_filter(items, min_relevance);

    let entity_counts: Vec<(usize, f32)> = filtered
        .iter()
        .map(|item| {
            let lower = item.content.to_lowercase();
            let matches = query_entities
                .iter()
                .filter(|e| lower.contains(&e.to_lowercase()))
                .count();
            let co_mention_density = if query_entities.is_empty() {
                0.0
            } else {
                matches as f32 / query_entities.len() as f32
            };
            (matches, co_mention_density)
        })
        .collect();

    for (item, (matches, density)) in filtered.iter_mut().zip(entity_counts.iter()) {
        if *matches == 0 && !query_entities.is_empty() {
            item.relevance_score *= 0.1;
        } else {
            item.relevance_score = (item.relevance_score + density * 0.2).min(1.0);
        }
    }

    let mut indexed: Vec<(usize, ScoredItem)> = filtered
        .into_iter()
        .zip(entity_counts.iter())
        .map(|(item, (matches, _))| (*matches, item))
        .collect();
    indexed.sort_by(|(ma, a), (mb, b)| {
        mb.cmp(ma)
            .then_with(|| b.relevance_score.partial_cmp(&a.relevance_score).unwrap())
    });
    indexed.into_iter().map(|(_, item)| item).collect()
}

fn select_hybrid(items: Vec<ScoredItem>, request: &AssemblyRequest, now: Timestamp) -> Vec<ScoredItem> {
    let temporal = select_temporal(items.clone(), request, now);
    let topical = select_topical(items.clone(), request);
    let entity = select_entity_centric(items, request);

    let mut merged: std::collections::HashMap<String, ScoredItem> = std::collections::HashMap::new();
    for item in temporal.iter().chain(topical.iter()).chain(entity.iter()) {
        merged
            .entry(item.stable_id())
            .and_modify(|existing| {
                if item.relevance_score > existing.relevance_score {
                    *existing = item.clone();
                }
            })
            .or_insert_with(|| item.clone());
    }

    let topical_rank: std::collections::HashMap<String, usize> = topical
        .iter()
        .enumerate()
        .map(|(i, item)| (item.stable_id(), i))
        .collect();
    let temporal_rank: std::collections::HashMap<String, usize> = temporal
        .iter()
        .enumerate()
        .map(|(i, item)| (item.stable_id(), i))
        .collect();
    let entity_rank: std::collections::HashMap<String, usize> = entity
        .iter()
        .enumerate()
        .map(|(i, item)| (item.stable_id(), i))
        .collect();

    let rank_score = |rank: Option<&usize>, len: usize| -> f32 {
        match rank {
            Some(r) if len > 0 => 1.0 - (*r as f32 / len as f32),
            _ => 0.0,
        }
    };

    let mut result: Vec<ScoredItem> = merged.into_values().collect();
    result.sort_by(|a, b| {
        let score_a = 0.5 * rank_score(topical_rank.get(&a.stable_id()), topical.len())
            + 0.3 * rank_score(temporal_rank.get(&a.stable_id()), temporal.len())
            + 0.2 * rank_score(entity_rank.get(&a.stable_id()), entity.len());
        let score_b = 0.5 * rank_score(topical_rank.get(&b.stable_id()), topical.len())
            + 0.3 * rank_score(temporal_rank.get(&b.stable_id()), temporal.len())
            + 0.2 * rank_score(entity_rank.get(&b.stable_id()), entity.len());
        score_b.partial_cmp(&score_a).unwrap()
    });
    result
}

/// Dispatches to the variant's selection algorithm: threshold filtering,
/// diversity/selection, and final ordering (spec §4.4).
pub fn dispatch(
    kind: AssemblyStrategyKind,
    items: Vec<ScoredItem>,
    request: &AssemblyRequest,
    now: Timestamp,
) -> Vec<ScoredItem> {
    match kind {
        AssemblyStrategyKind::Temporal => select_temporal(items, request, now),
        AssemblyStrategyKind::Topical => select_topical(items, request),
        AssemblyStrategyKind::EntityCentric => select_entity_centric(items, request),
        AssemblyStrategyKind::Hybrid => select_hybrid(items, request, now),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use weave_core::{ConversationId, MessageId, Role};

    fn item(content: &str, score: f32, age_hours: i64, conv: ConversationId) -> ScoredItem {
        ScoredItem {
            item_type: ItemType::Message,
            message_id: Some(MessageId::now_v7()),
            summary_id: None,
            conversation_id: conv,
            content: content.to_string(),
            relevance_score: score,
            token_count: 10,
            created_at: Utc::now() - Duration::hours(age_hours),
            role: Some(Role::User),
            level: None,
            source_message_count: None,
        }
    }

    #[test]
    fn auto_select_picks_temporal_for_recent_keyword() {
        let req = AssemblyRequest {
            query: "what happened recently".into(),
            ..Default::default()
        };
        assert_eq!(auto_select(&req), AssemblyStrategyKind::Temporal);
    }

    #[test]
    fn auto_select_picks_topical_for_focus_topics() {
        let req = AssemblyRequest {
            query: "generic question".into(),
            focus_topics: vec!["billing".into()],
            ..Default::default()
        };
        assert_eq!(auto_select(&req), AssemblyStrategyKind::Topical);
    }

    #[test]
    fn auto_select_falls_back_to_hybrid() {
        let req = AssemblyRequest {
            query: "a plain question".into(),
            ..Default::default()
        };
        assert_eq!(auto_select(&req), AssemblyStrategyKind::Hybrid);
    }

    #[test]
    fn jaccard_overlap_identical_content_is_one() {
        assert_eq!(jaccard_overlap("the quick fox", "the quick fox"), 1.0);
    }

    #[test]
    fn jaccard_overlap_disjoint_content_is_zero() {
        assert_eq!(jaccard_overlap("alpha beta", "gamma delta"), 0.0);
    }

    #[test]
    fn diversity_select_always_admits_top_item() {
        let conv = ConversationId::now_v7();
        let items = vec![item("same same same", 0.9, 1, conv), item("same same same", 0.8, 1, conv)];
        let selected = diversity_select(&items, 5, 1.0);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].relevance_score, 0.9);
    }

    #[test]
    fn temporal_strategy_respects_max_item_cap() {
        let conv = ConversationId::now_v7();
        let items: Vec<ScoredItem> = (0..30i64).map(|i| item("x", 0.5, i, conv)).collect();
        let req = AssemblyRequest {
            conversation_id: Some(conv),
            ..Default::default()
        };
        let selected = select_temporal(items, &req, Utc::now());
        assert!(selected.len() <= 20);
    }

    #[test]
    fn extract_entities_picks_capitalized_sequences() {
        let entities = extract_entities("ask about San Francisco weather");
        assert!(entities.iter().any(|e| e == "San Francisco"));
    }

    #[test]
    fn type_balance_preserves_total_count() {
        let conv = ConversationId::now_v7();
        let items = vec![item("a", 0.9, 1, conv), item("b", 0.8, 1, conv)];
        let balanced = type_balance(items.clone(), &items, 0.5);
        assert_eq!(balanced.len(), items.len());
    }

    #[test]
    fn hybrid_strategy_returns_union_of_inputs() {
        let conv = ConversationId::now_v7();
        let items: Vec<ScoredItem> = (0..5i64).map(|i| item("hello world", 0.5, i, conv)).collect();
        let req = AssemblyRequest::default();
        let result = select_hybrid(items.clone(), &req, Utc::now());
        assert!(!result.is_empty());
    }
}
