//! In-memory repository implementations, suitable for the seed scenarios
//! in spec §8 and for downstream integration tests. Grounded on the
//! teacher's `MockStorage` (`Arc<RwLock<HashMap<...>>>` per entity) and its
//! deterministic `MockEmbeddingProvider`.

use crate::traits::{
    ConversationHandle, ConversationRepo, EmbeddingProvider, FtsSearchOptions, MessageRepo,
    SimilarMessage, SortOrder, SummaryRepo,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;
use weave_core::{
    ConversationId, EmbeddingVector, EngineResult, MatchType, Message, MessageId, Paginated,
    SearchResult, SourceScores, Summary, SummaryLevel,
};

/// In-memory storage shared across the three mock repos, mirroring the
/// teacher's single `MockStorage` struct backing several `*Repo` traits.
#[derive(Default)]
pub struct InMemoryStorage {
    conversations: RwLock<HashMap<ConversationId, ConversationHandle>>,
    messages: RwLock<HashMap<MessageId, Message>>,
    summaries: RwLock<HashMap<weave_core::SummaryId, Summary>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_conversation(&self, id: ConversationId) {
        self.conversations
            .write()
            .unwrap()
            .insert(id, ConversationHandle { id });
    }

    pub fn insert_message(&self, message: Message) {
        self.messages.write().unwrap().insert(message.id, message);
    }

    pub fn insert_summary(&self, summary: Summary) {
        self.summaries
            .write()
            .unwrap()
            .insert(summary.id, summary);
    }

    pub fn clear(&self) {
        self.conversations.write().unwrap().clear();
        self.messages.write().unwrap().clear();
        self.summaries.write().unwrap().clear();
    }

    pub fn message_count(&self) -> usize {
        self.messages.read().unwrap().len()
    }
}

#[async_trait]
impl ConversationRepo for InMemoryStorage {
    async fn find_by_id(&self, id: ConversationId) -> EngineResult<Option<ConversationHandle>> {
        Ok(self.conversations.read().unwrap().get(&id).cloned())
    }

    async fn exists(&self, id: ConversationId) -> EngineResult<bool> {
        Ok(self.conversations.read().unwrap().contains_key(&id))
    }
}

#[async_trait]
impl MessageRepo for InMemoryStorage {
    async fn find_by_conversation(
        &self,
        conversation_id: ConversationId,
        limit: i32,
        offset: i32,
        order: SortOrder,
    ) -> EngineResult<Paginated<Message>> {
        let store = self.messages.read().unwrap();
        let mut matching: Vec<Message> = store
            .values()
            .filter(|m| m.conversation_id == conversation_id)
            .cloned()
            .collect();

        match order {
            SortOrder::Ascending => matching.sort_by_key(|m| m.created_at),
            SortOrder::Descending => matching.sort_by_key(|m| std::cmp::Reverse(m.created_at)),
        }

        let offset = offset.max(0) as usize;
        let limit = limit.max(0) as usize;
        let has_more = matching.len() > offset + limit;
        let page = matching
            .into_iter()
            .skip(offset)
            .take(limit)
            .collect::<Vec<_>>();

        Ok(Paginated::new(page, has_more))
    }

    async fn find_with_embeddings(
        &self,
        conversation_id: Option<ConversationId>,
        limit: i32,
        offset: i32,
    ) -> EngineResult<Paginated<Message>> {
        let store = self.messages.read().unwrap();
        let mut matching: Vec<Message> = store
            .values()
            .filter(|m| m.embedding.is_some())
            .filter(|m| conversation_id.map_or(true, |cid| m.conversation_id == cid))
            .cloned()
            .collect();
        matching.sort_by_key(|m| std::cmp::Reverse(m.created_at));

        let offset = offset.max(0) as usize;
        let limit = limit.max(0) as usize;
        let has_more = matching.len() > offset + limit;
        let page = matching.into_iter().skip(offset).take(limit).collect();

        Ok(Paginated::new(page, has_more))
    }

    async fn search(&self, options: FtsSearchOptions) -> EngineResult<Paginated<SearchResult>> {
        let store = self.messages.read().unwrap();
        let needle = options.query.to_lowercase();
        let mut matches: Vec<SearchResult> = store
            .values()
            .filter(|m| {
                options
                    .conversation_id
                    .map_or(true, |cid| m.conversation_id == cid)
            })
            .filter(|m| m.content.to_lowercase().contains(&needle))
            .map(|m| SearchResult {
                message_id: m.id,
                conversation_id: m.conversation_id,
                content: m.content.clone(),
                score: 1.0,
                match_type: MatchType::Fts,
                scores: SourceScores {
                    semantic: None,
                    fts: Some(1.0),
                    combined: 1.0,
                },
                highlights: vec![],
                conversation_title: None,
                created_at: m.created_at,
                explanation: None,
            })
            .collect();
        matches.sort_by_key(|r| std::cmp::Reverse(r.created_at));

        let offset = options.offset.max(0) as usize;
        let limit = options.limit.max(0) as usize;
        let has_more = matches.len() > offset + limit;
        let page = matches.into_iter().skip(offset).take(limit).collect();

        Ok(Paginated::new(page, has_more))
    }

    async fn find_children(&self, parent_id: MessageId) -> EngineResult<Vec<Message>> {
        let store = self.messages.read().unwrap();
        Ok(store
            .values()
            .filter(|m| m.parent_id == Some(parent_id))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl SummaryRepo for InMemoryStorage {
    async fn find_valid_by_conversation(
        &self,
        conversation_id: ConversationId,
        level: Option<SummaryLevel>,
    ) -> EngineResult<Vec<Summary>> {
        let store = self.summaries.read().unwrap();
        Ok(store
            .values()
            .filter(|s| s.conversation_id == conversation_id && s.valid)
            .filter(|s| level.map_or(true, |lvl| s.level == lvl))
            .cloned()
            .collect())
    }

    async fn invalidate_for_conversation(
        &self,
        conversation_id: ConversationId,
    ) -> EngineResult<u64> {
        let mut store = self.summaries.write().unwrap();
        let mut count = 0u64;
        for s in store.values_mut() {
            if s.conversation_id == conversation_id && s.valid {
                s.valid = false;
                count += 1;
            }
        }
        Ok(count)
    }
}

/// Deterministic mock embedding provider: hashes input bytes into a
/// unit-normalized vector so semantic-similarity tests are reproducible
/// without a real model. Also stands in for the vector index a real
/// provider would query, via an in-memory `(message_id, embedding)` table
/// that `index_message` populates and `nearest` searches by cosine
/// similarity — mirroring the teacher's `MockStorage::vector_search`.
#[derive(Debug)]
pub struct MockEmbeddingProvider {
    model_id: String,
    dimensions: usize,
    available: bool,
    index: RwLock<HashMap<MessageId, (ConversationId, EmbeddingVector)>>,
}

impl Clone for MockEmbeddingProvider {
    fn clone(&self) -> Self {
        Self {
            model_id: self.model_id.clone(),
            dimensions: self.dimensions,
            available: self.available,
            index: RwLock::new(self.index.read().unwrap().clone()),
        }
    }
}

impl MockEmbeddingProvider {
    pub fn new(model_id: impl Into<String>, dimensions: usize) -> Self {
        Self {
            model_id: model_id.into(),
            dimensions,
            available: true,
            index: RwLock::new(HashMap::new()),
        }
    }

    /// Build a provider that reports itself unavailable, for exercising the
    /// degraded-path behavior in spec §8 Scenario E.
    pub fn unavailable(model_id: impl Into<String>, dimensions: usize) -> Self {
        Self {
            model_id: model_id.into(),
            dimensions,
            available: false,
            index: RwLock::new(HashMap::new()),
        }
    }

    /// Register a message's embedding so `nearest` can find it. Fixtures and
    /// tests call this alongside `InMemoryStorage::insert_message` to keep
    /// the two in sync, since the provider has no visibility into storage.
    pub fn index_message(
        &self,
        message_id: MessageId,
        conversation_id: ConversationId,
        embedding: EmbeddingVector,
    ) {
        self.index
            .write()
            .unwrap()
            .insert(message_id, (conversation_id, embedding));
    }

    fn generate(&self, text: &str) -> Vec<f32> {
        let mut data = vec![0.0f32; self.dimensions];
        for (i, byte) in text.bytes().enumerate() {
            let idx = i % self.dimensions;
            data[idx] += (byte as f32) / 255.0;
        }
        let norm: f32 = data.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut data {
                *x /= norm;
            }
        }
        data
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    async fn embed(&self, text: &str) -> EngineResult<EmbeddingVector> {
        Ok(EmbeddingVector::new(
            self.generate(text),
            self.model_id.clone(),
        ))
    }

    async fn nearest(
        &self,
        vector: &EmbeddingVector,
        k: usize,
        conversation_id: Option<ConversationId>,
    ) -> EngineResult<Vec<SimilarMessage>> {
        let index = self.index.read().unwrap();
        let mut scored: Vec<SimilarMessage> = index
            .iter()
            .filter(|(_, (cid, _))| conversation_id.map_or(true, |want| *cid == want))
            .filter_map(|(message_id, (_, embedding))| {
                vector
                    .cosine_similarity(embedding)
                    .ok()
                    .map(|similarity| SimilarMessage {
                        message_id: *message_id,
                        similarity,
                    })
            })
            .collect();
        scored.sort_by(|a, b| b.similarity.partial_cmp(&a.similarity).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }

    async fn is_available(&self) -> bool {
        self.available
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weave_core::{MessageId, Role};

    fn make_message(conv: ConversationId, content: &str) -> Message {
        Message {
            id: MessageId::now_v7(),
            conversation_id: conv,
            role: Role::User,
            content: content.to_string(),
            created_at: chrono::Utc::now(),
            parent_id: None,
            metadata: HashMap::new(),
            embedding: None,
        }
    }

    #[tokio::test]
    async fn find_by_conversation_filters_and_paginates() {
        let storage = InMemoryStorage::new();
        let conv = ConversationId::now_v7();
        storage.insert_conversation(conv);
        for i in 0..5 {
            storage.insert_message(make_message(conv, &format!("msg {i}")));
        }
        let other = ConversationId::now_v7();
        storage.insert_message(make_message(other, "unrelated"));

        let page = storage
            .find_by_conversation(conv, 3, 0, SortOrder::Ascending)
            .await
            .unwrap();
        assert_eq!(page.items.len(), 3);
        assert!(page.has_more);
        assert_eq!(storage.message_count(), 6);
    }

    #[tokio::test]
    async fn invalidate_is_idempotent() {
        let storage = InMemoryStorage::new();
        let conv = ConversationId::now_v7();
        storage.insert_summary(Summary {
            id: weave_core::SummaryId::now_v7(),
            conversation_id: conv,
            level: SummaryLevel::Brief,
            content: "summary".into(),
            token_count: 10,
            provider: "test".into(),
            model: "test".into(),
            source_message_count: 3,
            created_at: chrono::Utc::now(),
            valid: true,
        });

        let first = storage.invalidate_for_conversation(conv).await.unwrap();
        let second = storage.invalidate_for_conversation(conv).await.unwrap();
        assert_eq!(first, 1);
        assert_eq!(second, 0);
    }

    #[tokio::test]
    async fn mock_embedding_provider_is_deterministic() {
        let provider = MockEmbeddingProvider::new("mock-embed", 16);
        let a = provider.embed("hello world").await.unwrap();
        let b = provider.embed("hello world").await.unwrap();
        assert_eq!(a.data, b.data);
        assert!(provider.is_available().await);
    }

    #[tokio::test]
    async fn unavailable_provider_reports_false() {
        let provider = MockEmbeddingProvider::unavailable("mock-embed", 16);
        assert!(!provider.is_available().await);
    }

    #[tokio::test]
    async fn nearest_ranks_indexed_messages_by_cosine_similarity() {
        let provider = MockEmbeddingProvider::new("mock-embed", 3);
        let conv = ConversationId::now_v7();
        let query = EmbeddingVector::new(vec![1.0, 0.0, 0.0], "mock-embed");

        let close = MessageId::now_v7();
        provider.index_message(close, conv, EmbeddingVector::new(vec![0.9, 0.1, 0.0], "mock-embed"));
        let far = MessageId::now_v7();
        provider.index_message(far, conv, EmbeddingVector::new(vec![0.0, 1.0, 0.0], "mock-embed"));
        let other_conv = MessageId::now_v7();
        provider.index_message(
            other_conv,
            ConversationId::now_v7(),
            EmbeddingVector::new(vec![1.0, 0.0, 0.0], "mock-embed"),
        );

        let results = provider.nearest(&query, 5, Some(conv)).await.unwrap();

        assert_eq!(results.len(), 2, "only the requested conversation's messages are candidates");
        assert_eq!(results[0].message_id, close, "closer vector must rank first");
        assert!(results[0].similarity > results[1].similarity);
    }
}
