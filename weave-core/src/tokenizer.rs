//! Token counting (C1).
//!
//! Deterministic, over-estimating token counts for a named model family.
//! Implementations may delegate to a real tokenizer; the default here is a
//! character-ratio heuristic, which is sufficient for budget planning.

/// Constants exposed by a tokenizer for a given model family.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelConfig {
    /// Average characters consumed per token, at this tokenizer's ratio.
    pub avg_chars_per_token: f32,
    /// Maximum context window in tokens for this model family.
    pub context_window: i32,
}

/// Counts tokens in text for a target model.
///
/// Implementations must be deterministic for the same input and
/// configuration, and must never under-count (over-estimation is
/// preferred, since budgets are enforced conservatively).
pub trait Tokenizer: Send + Sync {
    /// Count tokens in `text`, returning the count and the chars-per-token
    /// ratio used to produce it.
    fn count_text(&self, text: &str) -> (i32, f32);

    /// Sum per-item token counts across `contents`, adding a fixed
    /// per-item overhead that approximates role/separator tokens a real
    /// model tokenizer would emit around each item.
    fn count_messages(&self, contents: &[&str]) -> i32 {
        let per_item = self.get_model_config().avg_chars_per_token;
        let _ = per_item; // overhead is independent of the ratio
        contents
            .iter()
            .map(|c| self.count_text(c).0 + self.per_message_overhead())
            .sum()
    }

    /// Fixed per-message overhead in tokens (role marker, separators).
    fn per_message_overhead(&self) -> i32;

    fn model_family(&self) -> &str;

    fn get_model_config(&self) -> ModelConfig;
}

/// Heuristic tokenizer using a model-specific character-to-token ratio.
#[derive(Debug, Clone)]
pub struct HeuristicTokenizer {
    /// Tokens per character.
    ratio: f32,
    model_family: String,
    context_window: i32,
    per_message_overhead: i32,
}

impl HeuristicTokenizer {
    /// Build a tokenizer tuned for a named model, matching it against known
    /// family prefixes. Unknown models get a conservative default.
    pub fn for_model(model: &str) -> Self {
        let (ratio, family, context_window, overhead) =
            if model.contains("gpt-4") || model.contains("gpt-3.5") {
                (0.25, "gpt", 128_000, 4)
            } else if model.contains("claude") {
                (0.28, "claude", 200_000, 4)
            } else if model.contains("text-embedding") {
                (0.25, "openai-embedding", 8_191, 0)
            } else if model.contains("llama") || model.contains("mistral") {
                (0.27, "open-source", 32_768, 3)
            } else {
                (0.30, "unknown", 8_192, 4)
            };

        Self {
            ratio,
            model_family: family.to_string(),
            context_window,
            per_message_overhead: overhead,
        }
    }

    pub fn with_ratio(ratio: f32, model_family: impl Into<String>) -> Self {
        Self {
            ratio,
            model_family: model_family.into(),
            context_window: 8_192,
            per_message_overhead: 4,
        }
    }

    pub fn ratio(&self) -> f32 {
        self.ratio
    }
}

impl Default for HeuristicTokenizer {
    fn default() -> Self {
        Self::for_model("gpt-4")
    }
}

impl Tokenizer for HeuristicTokenizer {
    fn count_text(&self, text: &str) -> (i32, f32) {
        let count = (text.len() as f32 * self.ratio).ceil() as i32;
        (count.max(0), 1.0 / self.ratio)
    }

    fn per_message_overhead(&self) -> i32 {
        self.per_message_overhead
    }

    fn model_family(&self) -> &str {
        &self.model_family
    }

    fn get_model_config(&self) -> ModelConfig {
        ModelConfig {
            avg_chars_per_token: 1.0 / self.ratio,
            context_window: self.context_window,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gpt4_ratio_and_family() {
        let t = HeuristicTokenizer::for_model("gpt-4-turbo");
        assert_eq!(t.model_family(), "gpt");
        assert_eq!(t.ratio(), 0.25);
        let text = "a".repeat(100);
        assert_eq!(t.count_text(&text).0, 25);
    }

    #[test]
    fn claude_ratio_and_family() {
        let t = HeuristicTokenizer::for_model("claude-3-opus");
        assert_eq!(t.model_family(), "claude");
        let text = "a".repeat(100);
        assert_eq!(t.count_text(&text).0, 28);
    }

    #[test]
    fn unknown_model_is_conservative() {
        let t = HeuristicTokenizer::for_model("some-new-model");
        assert_eq!(t.model_family(), "unknown");
        assert_eq!(t.ratio(), 0.30);
    }

    #[test]
    fn count_is_never_negative() {
        let t = HeuristicTokenizer::default();
        assert_eq!(t.count_text("").0, 0);
    }

    #[test]
    fn count_messages_adds_overhead_per_item() {
        let t = HeuristicTokenizer::for_model("gpt-4");
        let single = t.count_text("hello world").0;
        let total = t.count_messages(&["hello world", "hello world"]);
        assert_eq!(total, 2 * (single + t.per_message_overhead()));
    }

    #[test]
    fn model_config_is_consistent_with_ratio() {
        let t = HeuristicTokenizer::for_model("claude-3-opus");
        let cfg = t.get_model_config();
        assert!((cfg.avg_chars_per_token - 1.0 / 0.28).abs() < 1e-6);
        assert_eq!(cfg.context_window, 200_000);
    }

    #[test]
    fn determinism_same_input_same_output() {
        let t = HeuristicTokenizer::default();
        let text = "The quick brown fox jumps over the lazy dog.";
        assert_eq!(t.count_text(text), t.count_text(text));
    }
}
