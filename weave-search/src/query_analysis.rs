//! Query complexity analysis and strategy auto-selection (spec §4.9
//! "Strategy auto-selection"). Term extraction is delegated to the query
//! parser (C6) shared with the assembler.

use crate::types::{QueryAnalysis, QueryComplexity, SearchStrategy};
use weave_context::extract_terms;

/// Spec §4.9: `"` or a trailing `*` marks the query as operator-bearing.
fn has_operators(query: &str) -> bool {
    query.contains('"') || query.trim_end().ends_with('*')
}

fn complexity_of(term_count: usize, has_operators: bool) -> QueryComplexity {
    if has_operators || term_count > 3 {
        QueryComplexity::Complex
    } else if term_count <= 2 {
        QueryComplexity::Simple
    } else {
        QueryComplexity::Moderate
    }
}

/// Analyze a raw query string, producing the facet reported in
/// `SearchMetrics.query_analysis` and the strategy `auto` resolves to.
pub fn analyze(query: &str) -> QueryAnalysis {
    let term_count = extract_terms(query).len();
    let operators = has_operators(query);
    let complexity = complexity_of(term_count, operators);

    let suggested_strategy = if operators {
        SearchStrategy::Fts
    } else if matches!(complexity, QueryComplexity::Simple) {
        SearchStrategy::Semantic
    } else {
        SearchStrategy::Hybrid
    };

    QueryAnalysis {
        term_count,
        has_operators: operators,
        complexity,
        suggested_strategy,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_short_query_without_operators_suggests_semantic() {
        let a = analyze("rust lifetimes");
        assert_eq!(a.suggested_strategy, SearchStrategy::Semantic);
        assert_eq!(a.complexity, QueryComplexity::Simple);
    }

    #[test]
    fn quoted_phrase_suggests_fts() {
        let a = analyze("\"exact phrase\" search");
        assert!(a.has_operators);
        assert_eq!(a.suggested_strategy, SearchStrategy::Fts);
    }

    #[test]
    fn trailing_wildcard_suggests_fts() {
        let a = analyze("rustc*");
        assert!(a.has_operators);
        assert_eq!(a.suggested_strategy, SearchStrategy::Fts);
    }

    #[test]
    fn many_terms_without_operators_suggests_hybrid() {
        let a = analyze("how does the borrow checker handle lifetimes here");
        assert_eq!(a.complexity, QueryComplexity::Complex);
        assert_eq!(a.suggested_strategy, SearchStrategy::Hybrid);
    }

    #[test]
    fn moderate_term_count_suggests_hybrid() {
        let a = analyze("rust async runtime");
        assert_eq!(a.complexity, QueryComplexity::Moderate);
        assert_eq!(a.suggested_strategy, SearchStrategy::Hybrid);
    }
}
