//! Request/result/metrics shapes for the hybrid search engine (spec §4.9).

use serde::Serialize;
use weave_core::{ConversationId, SearchResult};

/// Caller-selected retrieval strategy, or `Auto` to let query analysis
/// pick one (spec §4.9 "Strategy auto-selection").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchStrategy {
    Auto,
    Fts,
    Semantic,
    Hybrid,
}

impl std::fmt::Display for SearchStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SearchStrategy::Auto => "auto",
            SearchStrategy::Fts => "fts",
            SearchStrategy::Semantic => "semantic",
            SearchStrategy::Hybrid => "hybrid",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for SearchStrategy {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "fts" => Ok(Self::Fts),
            "semantic" => Ok(Self::Semantic),
            "hybrid" => Ok(Self::Hybrid),
            _ => Err(format!("invalid search strategy: {}", s)),
        }
    }
}

/// Relative weight of each score source in fusion (spec §4.9 "Result
/// fusion").
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchWeights {
    pub semantic: f32,
    pub fts: f32,
}

/// Caller's request to `search`.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub query: String,
    pub conversation_id: Option<ConversationId>,
    pub limit: i32,
    pub offset: i32,
    pub strategy: SearchStrategy,
    pub weights: Option<SearchWeights>,
    pub semantic_threshold: Option<f32>,
    pub explain: bool,
}

impl Default for SearchRequest {
    fn default() -> Self {
        Self {
            query: String::new(),
            conversation_id: None,
            limit: 20,
            offset: 0,
            strategy: SearchStrategy::Auto,
            weights: None,
            semantic_threshold: None,
            explain: false,
        }
    }
}

pub const MAX_LIMIT: i32 = 1000;

/// How complex `auto_select_strategy` judged the query to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryComplexity {
    Simple,
    Moderate,
    Complex,
}

/// Query-analysis facet of the metrics block (spec §4.9 "Metrics").
#[derive(Debug, Clone)]
pub struct QueryAnalysis {
    pub term_count: usize,
    pub has_operators: bool,
    pub complexity: QueryComplexity,
    pub suggested_strategy: SearchStrategy,
}

/// Per-phase timings, each `None` when that phase did not run.
#[derive(Debug, Clone, Default)]
pub struct SearchTiming {
    pub query_analysis_ms: i64,
    pub semantic_search_ms: Option<i64>,
    pub fts_search_ms: Option<i64>,
    pub result_merging_ms: Option<i64>,
    pub formatting_ms: i64,
}

/// One `search` call's observability record (spec §4.9 "Metrics").
#[derive(Debug, Clone)]
pub struct SearchMetrics {
    pub query_id: String,
    pub query: String,
    pub strategy: SearchStrategy,
    pub result_count: usize,
    pub total_time_ms: i64,
    pub timing: SearchTiming,
    pub query_analysis: QueryAnalysis,
    /// Set when the semantic backend was unavailable and the engine fell
    /// back to `fts` (spec §4.9 "Failure semantics").
    pub degraded: bool,
}

/// The cacheable fraction of a search response: the fused, sorted page.
/// Metrics are recomputed fresh on every call (spec §4.9 "Caching" only
/// names the result set as the cached artifact), so they live outside this
/// type rather than going stale inside a cache hit.
#[derive(Debug, Clone, Serialize)]
pub struct CachedResults {
    pub items: Vec<SearchResult>,
    pub has_more: bool,
}

/// One page of hybrid-search results plus its metrics.
#[derive(Debug, Clone)]
pub struct SearchResultPage {
    pub items: Vec<SearchResult>,
    pub has_more: bool,
    pub metrics: SearchMetrics,
}
