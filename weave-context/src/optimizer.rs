//! Token Optimizer (C2): allocates a total budget across five categories
//! and selects/truncates items within each to fit.

use weave_core::{
    ConfigError, EngineError, EngineResult, ScoredItem, TokenConfig, Tokenizer, TruncationStrategy,
};

const IMPORTANCE_MARKERS: &[&str] = &["important", "key", "therefore", "however"];

/// What happened to one item during optimization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modification {
    Included,
    Truncated,
    Excluded,
}

/// One item after optimization, with its disposition and a human-readable
/// reason (spec §4.2 "Record per-item modification").
#[derive(Debug, Clone)]
pub struct OptimizedItem {
    pub item: ScoredItem,
    pub modification: Modification,
    pub reason: String,
    pub final_tokens: i32,
}

/// Per-category budget split, in absolute tokens (spec §4.2 default split).
#[derive(Debug, Clone, Copy)]
pub struct BudgetSplit {
    pub query: i32,
    pub summaries: i32,
    pub messages: i32,
    pub metadata: i32,
    pub buffer: i32,
}

/// Computes the five-category split for `total` tokens, validating the
/// budget and config first (spec §4.2 "Error conditions").
pub fn split_budget(total: i32, cfg: &TokenConfig) -> EngineResult<BudgetSplit> {
    if total < 100 {
        return Err(EngineError::InvalidRequest(format!(
            "token budget {} is below the minimum of 100",
            total
        )));
    }
    if cfg.min_tokens_per_item > cfg.max_tokens_per_item {
        return Err(EngineError::Config(ConfigError::IncompatibleOptions {
            option_a: "tokens.min_tokens_per_item".into(),
            option_b: "tokens.max_tokens_per_item".into(),
        }));
    }
    let total_f = total as f32;
    Ok(BudgetSplit {
        query: (total_f * cfg.default_query_pct).floor() as i32,
        summaries: (total_f * cfg.default_summaries_pct).floor() as i32,
        messages: (total_f * cfg.default_messages_pct).floor() as i32,
        metadata: (total_f * cfg.default_metadata_pct).floor() as i32,
        buffer: (total_f * cfg.default_buffer_pct).floor() as i32,
    })
}

struct Sentence {
    text: String,
    position: usize,
}

fn split_sentences(text: &str) -> Vec<Sentence> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    for c in text.chars() {
        current.push(c);
        if c == '.' || c == '!' || c == '?' {
            let trimmed = current.trim().to_string();
            if !trimmed.is_empty() {
                sentences.push(Sentence {
                    text: trimmed,
                    position: sentences.len(),
                });
            }
            current.clear();
        }
    }
    let trailing = current.trim().to_string();
    if !trailing.is_empty() {
        sentences.push(Sentence {
            text: trailing,
            position: sentences.len(),
        });
    }
    sentences
}

fn score_sentence(sentence: &str, index: usize, total: usize) -> f32 {
    let mut score = 0.3f32;
    if index == 0 {
        score += 0.3;
    }
    if index + 1 == total {
        score += 0.2;
    }
    let len = sentence.len();
    if (20..=100).contains(&len) {
        score += 0.2;
    }
    let lower = sentence.to_lowercase();
    for marker in IMPORTANCE_MARKERS {
        if lower.contains(marker) {
            score += 0.1;
        }
    }
    if sentence.chars().any(|c| c.is_ascii_digit()) {
        score += 0.05;
    }
    if sentence.contains('"') || sentence.contains('\u{2018}') || sentence.contains('\u{201c}') {
        score += 0.05;
    }
    score.clamp(0.0, 1.0)
}

fn last_whitespace_within(text: &str, limit: usize) -> Option<usize> {
    let bound = limit.min(text.len());
    let mut cut = bound;
    while cut > 0 && !text.is_char_boundary(cut) {
        cut -= 1;
    }
    text[..cut].rfind(char::is_whitespace)
}

fn truncate_end(text: &str, target_chars: usize) -> String {
    let mut cut = target_chars.min(text.len());
    while cut > 0 && !text.is_char_boundary(cut) {
        cut -= 1;
    }
    let prefix = &text[..cut];
    let terminators: &[char] = &['.', '!', '?'];
    let ratio_window = (prefix.len() as f32 * 0.7) as usize;
    let has_enough_terminators = prefix[..ratio_window.min(prefix.len())]
        .chars()
        .filter(|c| terminators.contains(c))
        .count()
        > 0;

    let cut_point = if has_enough_terminators {
        prefix.rfind(terminators).map(|p| p + 1)
    } else {
        last_whitespace_within(prefix, (target_chars as f32 * 0.8) as usize)
    };

    let end = cut_point.unwrap_or(cut);
    let truncated = &text[..end.min(text.len())];
    if end < text.len() {
        format!("{}...", truncated.trim_end())
    } else {
        truncated.to_string()
    }
}

fn truncate_middle(text: &str, target_chars: usize) -> String {
    let prefix_len = ((target_chars as f32) * 0.6) as usize;
    let suffix_len = ((target_chars as f32) * 0.4) as usize;
    let mut p = prefix_len.min(text.len());
    while p > 0 && !text.is_char_boundary(p) {
        p -= 1;
    }
    let total = text.len();
    let mut s_start = total.saturating_sub(suffix_len);
    while s_start < total && !text.is_char_boundary(s_start) {
        s_start += 1;
    }
    if s_start < p {
        s_start = p;
    }
    format!("{} [...] {}", &text[..p], &text[s_start..])
}

fn truncate_smart(text: &str, target_chars: usize) -> String {
    let sentences = split_sentences(text);
    if sentences.is_empty() {
        return truncate_end(text, target_chars);
    }
    let total = sentences.len();
    let mut scored: Vec<(f32, &Sentence)> = sentences
        .iter()
        .enumerate()
        .map(|(i, s)| (score_sentence(&s.text, i, total), s))
        .collect();
    scored.sort_by(|a, b| {
        b.0.partial_cmp(&a.0)
            .unwrap()
            .then_with(|| a.1.position.cmp(&b.1.position))
    });

    let mut accepted: Vec<&Sentence> = Vec::new();
    let mut cumulative = 0usize;
    for (_, sentence) in &scored {
        if cumulative >= target_chars && !accepted.is_empty() {
            break;
        }
        accepted.push(sentence);
        cumulative += sentence.text.len();
    }
    accepted.sort_by_key(|s| s.position);

    let omitted = accepted.len() < sentences.len();
    let mut result = accepted
        .iter()
        .map(|s| s.text.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    if omitted {
        result.push_str(" ...");
    }
    result
}

fn truncate_content(content: &str, target_tokens: i32, strategy: TruncationStrategy, chars_per_token: f32) -> String {
    let target_chars = ((target_tokens as f32) * chars_per_token).max(1.0) as usize;
    match strategy {
        TruncationStrategy::End => truncate_end(content, target_chars),
        TruncationStrategy::Middle => truncate_middle(content, target_chars),
        TruncationStrategy::Smart => truncate_smart(content, target_chars),
    }
}

/// Result of optimizing one category's item list.
#[derive(Debug, Clone)]
pub struct CategoryResult {
    pub items: Vec<OptimizedItem>,
    pub used_tokens: i32,
    pub remaining_tokens: i32,
}

/// Optimizes one category of already relevance-sorted items against its
/// slice of the budget (spec §4.2 "Selection and truncation algorithm").
pub fn optimize_category(
    items: Vec<ScoredItem>,
    category_budget: i32,
    cfg: &TokenConfig,
    tokenizer: &dyn Tokenizer,
    category_name: &str,
) -> CategoryResult {
    let effective = (category_budget as f32 * (1.0 - cfg.safety_margin)).floor() as i32;
    let mut remaining = effective.max(0);
    let mut results = Vec::with_capacity(items.len());
    let chars_per_token = tokenizer.get_model_config().avg_chars_per_token;

    let mut included = 0;
    let mut truncated = 0;
    let mut excluded = 0;

    for item in items {
        let original = item.token_count;
        if original < cfg.min_tokens_per_item || remaining < cfg.min_tokens_per_item {
            excluded += 1;
            results.push(OptimizedItem {
                item,
                modification: Modification::Excluded,
                reason: if original < cfg.min_tokens_per_item {
                    "item is smaller than the minimum allowed size".to_string()
                } else {
                    "insufficient remaining category budget".to_string()
                },
                final_tokens: 0,
            });
            continue;
        }
        if original <= remaining {
            remaining -= original;
            included += 1;
            results.push(OptimizedItem {
                item,
                modification: Modification::Included,
                reason: "fit within remaining budget".to_string(),
                final_tokens: original,
            });
            continue;
        }
        let target = remaining.min(cfg.max_tokens_per_item);
        if target >= cfg.min_tokens_per_item {
            let truncated_content = truncate_content(&item.content, target, cfg.truncation_strategy, chars_per_token);
            let (final_tokens, _) = tokenizer.count_text(&truncated_content);
            remaining -= final_tokens.min(remaining);
            let mut item = item;
            item.content = truncated_content;
            item.token_count = final_tokens;
            truncated += 1;
            results.push(OptimizedItem {
                item,
                modification: Modification::Truncated,
                reason: "truncated to fit remaining budget".to_string(),
                final_tokens,
            });
        } else {
            excluded += 1;
            results.push(OptimizedItem {
                item,
                modification: Modification::Excluded,
                reason: "truncation target below minimum item size".to_string(),
                final_tokens: 0,
            });
        }
    }

    tracing::debug!(
        category = category_name,
        included,
        truncated,
        excluded,
        remaining_tokens = remaining,
        "category optimized"
    );

    CategoryResult {
        items: results,
        used_tokens: effective - remaining,
        remaining_tokens: remaining,
    }
}
