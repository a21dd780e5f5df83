//! Relevance scoring, assembly strategies, token optimization, and the
//! context assembler (C2-C7): everything between a caller's request and the
//! assembled text handed back to it.

mod assembler;
mod formatter;
mod optimizer;
mod query;
mod scorer;
mod strategies;
mod types;

pub use assembler::ContextAssembler;
pub use formatter::{format_snippet, FormatOptions, Snippet};
pub use optimizer::{
    optimize_category, split_budget, BudgetSplit, CategoryResult, Modification, OptimizedItem,
};
pub use query::{extract_terms, parse, validate, ParsedQuery, QueryMatchType, ValidationResult};
pub use scorer::{score_message, score_one, score_summary, Candidate, ScoringContext, ScoringWeights};
pub use strategies::{
    auto_select, diversity_select, dispatch, extract_entities, jaccard_overlap, type_balance,
    AssemblyStrategyKind,
};
pub use types::{AssemblyRequest, AssemblyResult};
