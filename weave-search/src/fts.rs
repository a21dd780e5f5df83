//! Full-text sub-query (spec §4.9 "FTS sub-query"): delegates matching to
//! the storage engine's native index and normalizes the returned bm25
//! scores into `[0, 1]`.

use weave_core::{ConversationId, EngineResult, SearchResult};
use weave_storage::{FtsSearchOptions, MessageRepo};

/// Run the FTS sub-query and min-max normalize `score` over the returned
/// page. A single-result page normalizes to `1.0` (nothing to spread
/// across); an empty page normalizes to nothing.
pub async fn fts_search(
    message_repo: &dyn MessageRepo,
    query: &str,
    conversation_id: Option<ConversationId>,
    limit: i32,
) -> EngineResult<(Vec<SearchResult>, bool)> {
    let page = message_repo
        .search(FtsSearchOptions {
            query: query.to_string(),
            conversation_id,
            limit,
            offset: 0,
        })
        .await?;

    let mut items = page.items;
    if items.is_empty() {
        return Ok((items, page.has_more));
    }

    let min = items
        .iter()
        .map(|r| r.score)
        .fold(f32::INFINITY, f32::min);
    let max = items
        .iter()
        .map(|r| r.score)
        .fold(f32::NEG_INFINITY, f32::max);
    let spread = max - min;

    for item in items.iter_mut() {
        let normalized = if spread > 1e-6 {
            (item.score - min) / spread
        } else {
            1.0
        };
        item.score = normalized;
        item.scores.fts = Some(normalized);
        item.scores.combined = normalized;
    }

    Ok((items, page.has_more))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use weave_core::{MatchType, MessageId, Paginated, SourceScores};
    use weave_storage::SortOrder;

    struct StubMessageRepo {
        scores: Vec<f32>,
    }

    #[async_trait]
    impl MessageRepo for StubMessageRepo {
        async fn find_by_conversation(
            &self,
            _c: ConversationId,
            _l: i32,
            _o: i32,
            _ord: SortOrder,
        ) -> EngineResult<Paginated<weave_core::Message>> {
            Ok(Paginated::empty())
        }

        async fn find_with_embeddings(
            &self,
            _c: Option<ConversationId>,
            _l: i32,
            _o: i32,
        ) -> EngineResult<Paginated<weave_core::Message>> {
            Ok(Paginated::empty())
        }

        async fn search(
            &self,
            _options: FtsSearchOptions,
        ) -> EngineResult<Paginated<SearchResult>> {
            let items = self
                .scores
                .iter()
                .map(|s| SearchResult {
                    message_id: MessageId::now_v7(),
                    conversation_id: ConversationId::now_v7(),
                    content: "x".into(),
                    score: *s,
                    match_type: MatchType::Fts,
                    scores: SourceScores::default(),
                    highlights: vec![],
                    conversation_title: None,
                    created_at: Utc::now(),
                    explanation: None,
                })
                .collect();
            Ok(Paginated::new(items, false))
        }

        async fn find_children(&self, _p: MessageId) -> EngineResult<Vec<weave_core::Message>> {
            Ok(vec![])
        }
    }

    #[tokio::test]
    async fn normalizes_scores_into_unit_range() {
        let repo = StubMessageRepo {
            scores: vec![2.0, 8.0, 5.0],
        };
        let (items, _) = fts_search(&repo, "q", None, 10).await.unwrap();
        assert!((items[0].score - 0.0).abs() < 1e-6 || (items[1].score - 0.0).abs() < 1e-6);
        assert!(items.iter().any(|r| (r.score - 1.0).abs() < 1e-6));
        for r in &items {
            assert!((0.0..=1.0).contains(&r.score));
        }
    }

    #[tokio::test]
    async fn single_result_normalizes_to_one() {
        let repo = StubMessageRepo { scores: vec![4.2] };
        let (items, _) = fts_search(&repo, "q", None, 10).await.unwrap();
        assert_eq!(items[0].score, 1.0);
    }
}
