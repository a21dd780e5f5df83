//! Shared request/result shapes for the assembler and its strategies
//! (spec §3 "Assembly Request", "Assembly Result").

use serde::Serialize;
use weave_core::ConversationId;

/// Caller's request to `assemble` (spec §4.5 step 1 validates this).
#[derive(Debug, Clone)]
pub struct AssemblyRequest {
    pub query: String,
    pub conversation_id: Option<ConversationId>,
    pub budget: i32,
    pub strategy: String,
    pub min_relevance: Option<f32>,
    /// Window width in seconds; `None` means "no explicit window".
    pub time_window_secs: Option<i64>,
    pub focus_topics: Vec<String>,
    pub include_recent: bool,
}

impl Default for AssemblyRequest {
    fn default() -> Self {
        Self {
            query: String::new(),
            conversation_id: None,
            budget: 4000,
            strategy: "auto".to_string(),
            min_relevance: None,
            time_window_secs: None,
            focus_topics: Vec::new(),
            include_recent: false,
        }
    }
}

/// Result of one `assemble` call.
#[derive(Debug, Clone, Serialize)]
pub struct AssemblyResult {
    pub assembled_text: String,
    pub used_tokens: i32,
    pub item_count: usize,
    pub from_cache: bool,
    pub elapsed_ms: i64,
    pub degraded: bool,
    pub strategy_used: String,
}
