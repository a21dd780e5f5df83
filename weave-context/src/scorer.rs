//! Relevance Scorer (C3): weighted multi-signal scoring over a candidate
//! list of messages and summaries.

use crate::query::extract_terms;
use weave_core::{ConversationId, EmbeddingVector, Message, ScoredItem, Summary, SummaryLevel, Timestamp};

/// Tunable weights for each signal (defaults from spec §4.3; a strategy may
/// override them).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoringWeights {
    pub textual: f32,
    pub semantic: f32,
    pub recency: f32,
    pub type_bias: f32,
    pub scope: f32,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            textual: 0.35,
            semantic: 0.30,
            recency: 0.15,
            type_bias: 0.10,
            scope: 0.10,
        }
    }
}

/// Inputs that stay constant across one `score_batch` call.
pub struct ScoringContext<'a> {
    pub query: &'a str,
    pub query_embedding: Option<&'a EmbeddingVector>,
    pub conversation_id: Option<ConversationId>,
    pub now: Timestamp,
    pub recency_half_life_hours: f32,
    pub weights: ScoringWeights,
}

/// A candidate fed to the scorer, tagged so the same function handles
/// messages and summaries uniformly.
pub enum Candidate<'a> {
    Message(&'a Message),
    Summary(&'a Summary, bool /* is_large_conversation */),
}

fn textual_score(query_terms: &[String], content: &str, exact_phrase: bool) -> f32 {
    if query_terms.is_empty() {
        return 0.0;
    }
    let lower = content.to_lowercase();
    let mut matched = 0usize;
    let mut freq = 0usize;
    for term in query_terms {
        let term_lower = term.to_lowercase();
        let count = lower.matches(&term_lower).count();
        if count > 0 {
            matched += 1;
            freq += count;
        }
    }
    let coverage = matched as f32 / query_terms.len() as f32;
    let tf_bonus = (1.0 + freq as f32).ln() / (1.0 + query_terms.len() as f32).ln().max(1.0);
    let mut score = (coverage * 0.7 + tf_bonus.min(1.0) * 0.3).min(1.0);
    if exact_phrase && lower.contains(&query_terms.join(" ").to_lowercase()) {
        score = (score + 0.2).min(1.0);
    }
    score
}

fn recency_score(created_at: Timestamp, now: Timestamp, half_life_hours: f32) -> f32 {
    let age_hours = (now - created_at).num_seconds() as f32 / 3600.0;
    if age_hours < 0.0 {
        return 1.0;
    }
    let k = std::f32::consts::LN_2 / half_life_hours.max(0.01);
    (-k * age_hours).exp().clamp(0.0, 1.0)
}

fn type_bias_score(candidate: &Candidate) -> f32 {
    match candidate {
        Candidate::Message(_) => 0.0,
        Candidate::Summary(summary, is_large) => {
            let mut score = 0.05;
            if *is_large && summary.level == SummaryLevel::Detailed {
                score += 0.05;
            }
            score
        }
    }
}

fn scope_score(conversation_id: ConversationId, requested: Option<ConversationId>) -> f32 {
    match requested {
        Some(req) if req == conversation_id => 1.0,
        Some(_) => 0.5,
        None => 1.0,
    }
}

/// Scores one candidate against `ctx`, redistributing a signal's weight to
/// the others when it cannot be computed (spec §4.3 "Additional per-signal
/// contract").
pub fn score_one(ctx: &ScoringContext, candidate: &Candidate) -> f32 {
    let query_terms = extract_terms(ctx.query);

    let (content, created_at, conversation_id) = match candidate {
        Candidate::Message(m) => (m.content.as_str(), m.created_at, m.conversation_id),
        Candidate::Summary(s, _) => (s.content.as_str(), s.created_at, s.conversation_id),
    };

    let candidate_embedding: Option<&EmbeddingVector> = match candidate {
        Candidate::Message(m) => m.embedding.as_ref(),
        Candidate::Summary(_, _) => None,
    };

    let mut available = [true; 5];
    let semantic = match (ctx.query_embedding, candidate_embedding) {
        (Some(q), Some(c)) => q.cosine_similarity(c).ok(),
        _ => None,
    };
    if semantic.is_none() {
        available[1] = false;
    }

    let weights_arr = [
        ctx.weights.textual,
        ctx.weights.semantic,
        ctx.weights.recency,
        ctx.weights.type_bias,
        ctx.weights.scope,
    ];
    let available_sum: f32 = weights_arr
        .iter()
        .zip(available.iter())
        .filter(|(_, ok)| **ok)
        .map(|(w, _)| *w)
        .sum();
    let redistribute = if available_sum > 0.0 {
        1.0 / available_sum
    } else {
        0.0
    };

    let raw = [
        textual_score(&query_terms, content, query_terms.len() > 1),
        semantic.unwrap_or(0.0),
        recency_score(created_at, ctx.now, ctx.recency_half_life_hours),
        type_bias_score(candidate),
        scope_score(conversation_id, ctx.conversation_id),
    ];

    raw.iter()
        .zip(weights_arr.iter())
        .zip(available.iter())
        .filter(|((_, _), ok)| **ok)
        .map(|((value, weight), _)| value * weight * redistribute)
        .sum::<f32>()
        .clamp(0.0, 1.0)
}

/// Builds a `ScoredItem` for a message candidate, computing both its
/// relevance score and its token count.
pub fn score_message(ctx: &ScoringContext, message: &Message, token_count: i32) -> ScoredItem {
    let score = score_one(ctx, &Candidate::Message(message));
    ScoredItem::from_message(message, score, token_count)
}

/// Builds a `ScoredItem` for a summary candidate.
pub fn score_summary(
    ctx: &ScoringContext,
    summary: &Summary,
    is_large_conversation: bool,
    token_count: i32,
) -> ScoredItem {
    let score = score_one(ctx, &Candidate::Summary(summary, is_large_conversation));
    ScoredItem::from_summary(summary, score, token_count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use std::collections::HashMap;
    use weave_core::{MessageId, Role};

    fn msg(content: &str, age_hours: i64, conversation_id: ConversationId) -> Message {
        Message {
            id: MessageId::now_v7(),
            conversation_id,
            role: Role::User,
            content: content.to_string(),
            created_at: Utc::now() - Duration::hours(age_hours),
            parent_id: None,
            metadata: HashMap::new(),
            embedding: None,
        }
    }

    fn ctx<'a>(query: &'a str, conversation_id: Option<ConversationId>) -> ScoringContext<'a> {
        ScoringContext {
            query,
            query_embedding: None,
            conversation_id,
            now: Utc::now(),
            recency_half_life_hours: 24.0,
            weights: ScoringWeights::default(),
        }
    }

    #[test]
    fn matching_content_scores_higher_than_unrelated() {
        let conv = ConversationId::now_v7();
        let relevant = msg("rust borrow checker lifetime", 1, conv);
        let unrelated = msg("completely different topic here", 1, conv);
        let c = ctx("rust lifetime", Some(conv));
        let s1 = score_one(&c, &Candidate::Message(&relevant));
        let s2 = score_one(&c, &Candidate::Message(&unrelated));
        assert!(s1 > s2);
    }

    #[test]
    fn future_timestamp_clamps_recency_to_one() {
        let now = Utc::now();
        let future = now + Duration::hours(5);
        assert_eq!(recency_score(future, now, 24.0), 1.0);
    }

    #[test]
    fn out_of_scope_conversation_is_halved() {
        let a = ConversationId::now_v7();
        let b = ConversationId::now_v7();
        assert_eq!(scope_score(a, Some(b)), 0.5);
        assert_eq!(scope_score(a, Some(a)), 1.0);
        assert_eq!(scope_score(a, None), 1.0);
    }

    #[test]
    fn missing_semantic_signal_redistributes_weight() {
        let conv = ConversationId::now_v7();
        let m = msg("some content", 1, conv);
        let c = ctx("content", Some(conv));
        // query_embedding is None, so semantic is never available; score
        // should still land in [0, 1] after redistribution.
        let score = score_one(&c, &Candidate::Message(&m));
        assert!((0.0..=1.0).contains(&score));
    }

    #[test]
    fn detailed_summary_of_large_conversation_gets_extra_type_bias() {
        assert!(
            type_bias_score(&Candidate::Summary(
                &Summary {
                    id: weave_core::SummaryId::now_v7(),
                    conversation_id: ConversationId::now_v7(),
                    level: weave_core::SummaryLevel::Detailed,
                    content: "x".into(),
                    token_count: 1,
                    provider: "p".into(),
                    model: "m".into(),
                    source_message_count: 100,
                    created_at: Utc::now(),
                    valid: true,
                },
                true
            )) > 0.05
        );
    }
}
