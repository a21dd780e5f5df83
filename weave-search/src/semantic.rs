//! Semantic sub-query (spec §4.9 "Semantic sub-query"): embeds the query,
//! asks the embedding provider for nearest neighbors, and filters by a
//! similarity threshold.
//!
//! `EmbeddingProvider::nearest` returns only `(message_id, similarity)`
//! pairs, not full rows. Like the assembler's candidate merge (spec §4.5
//! step 4), content is resolved from an already-loaded window
//! (`find_with_embeddings`) rather than issuing a second per-id round
//! trip; neighbors outside that window are skipped.

use std::collections::HashMap;
use weave_core::{ConversationId, EngineResult, MatchType, Message, SearchResult, SourceScores};
use weave_storage::{EmbeddingProvider, MessageRepo};

const EMBEDDING_WINDOW_LIMIT: i32 = 2000;

pub async fn semantic_search(
    message_repo: &dyn MessageRepo,
    embedding_provider: &dyn EmbeddingProvider,
    query: &str,
    conversation_id: Option<ConversationId>,
    limit: i32,
    semantic_threshold: f32,
) -> EngineResult<Vec<SearchResult>> {
    let query_embedding = embedding_provider.embed(query).await?;
    let k = (limit as usize) * 2;
    let neighbors = embedding_provider
        .nearest(&query_embedding, k, conversation_id)
        .await?;

    let window = message_repo
        .find_with_embeddings(conversation_id, EMBEDDING_WINDOW_LIMIT, 0)
        .await?;
    let by_id: HashMap<_, &Message> = window.items.iter().map(|m| (m.id, m)).collect();

    let mut results = Vec::new();
    for neighbor in neighbors {
        if neighbor.similarity < semantic_threshold {
            continue;
        }
        let Some(message) = by_id.get(&neighbor.message_id) else {
            continue;
        };
        results.push(SearchResult {
            message_id: message.id,
            conversation_id: message.conversation_id,
            content: message.content.clone(),
            score: neighbor.similarity,
            match_type: MatchType::Semantic,
            scores: SourceScores {
                semantic: Some(neighbor.similarity),
                fts: None,
                combined: neighbor.similarity,
            },
            highlights: Vec::new(),
            conversation_title: None,
            created_at: message.created_at,
            explanation: None,
        });
    }

    Ok(results)
}
