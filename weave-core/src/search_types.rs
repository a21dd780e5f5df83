//! Shared search-result shapes used by both the repository contracts (C11)
//! and the hybrid search engine (C9), so the two can agree on a wire type
//! without one depending on the other's crate.

use crate::identity::{ConversationId, MessageId, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which retrieval path(s) produced a search result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatchType {
    Fts,
    Semantic,
    Hybrid,
}

impl fmt::Display for MatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MatchType::Fts => "fts",
            MatchType::Semantic => "semantic",
            MatchType::Hybrid => "hybrid",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for MatchType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fts" => Ok(Self::Fts),
            "semantic" => Ok(Self::Semantic),
            "hybrid" => Ok(Self::Hybrid),
            _ => Err(format!("invalid match type: {}", s)),
        }
    }
}

/// Per-source scores contributing to a search result's combined score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceScores {
    pub semantic: Option<f32>,
    pub fts: Option<f32>,
    pub combined: f32,
}

/// A single hybrid-search hit (spec §3 "Search Result").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub message_id: MessageId,
    pub conversation_id: ConversationId,
    pub content: String,
    pub score: f32,
    pub match_type: MatchType,
    pub scores: SourceScores,
    pub highlights: Vec<String>,
    pub conversation_title: Option<String>,
    pub created_at: Timestamp,
    pub explanation: Option<String>,
}

/// A page of results plus whether more exist beyond this page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub has_more: bool,
}

impl<T> Paginated<T> {
    pub fn new(items: Vec<T>, has_more: bool) -> Self {
        Self { items, has_more }
    }

    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            has_more: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn match_type_roundtrips() {
        for mt in [MatchType::Fts, MatchType::Semantic, MatchType::Hybrid] {
            assert_eq!(mt.to_string().parse::<MatchType>().unwrap(), mt);
        }
    }
}
