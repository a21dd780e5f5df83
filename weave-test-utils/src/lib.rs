//! Test infrastructure shared across the workspace: proptest generators
//! for core entity types, fixtures for the seed end-to-end scenarios
//! (spec §8), and custom assertions for invariants that recur across
//! suites (budget safety, tier exclusivity, capacity).

pub use weave_storage::{InMemoryStorage, MockEmbeddingProvider};

use weave_core::{
    ConversationId, EmbeddingVector, EntityIdType, Message, MessageId, Role, Summary, SummaryId,
    SummaryLevel,
};
use weave_context::AssemblyRequest;
use weave_search::{SearchRequest, SearchStrategy};

/// Proptest `Strategy` generators for the engine's entity types, mirroring
/// the teacher's per-type `arb_*` functions.
pub mod generators {
    use super::*;
    use proptest::prelude::*;

    pub fn arb_uuid_v7() -> impl Strategy<Value = uuid::Uuid> {
        Just(()).prop_map(|_| uuid::Uuid::now_v7())
    }

    pub fn arb_conversation_id() -> impl Strategy<Value = ConversationId> {
        arb_uuid_v7().prop_map(ConversationId::new)
    }

    pub fn arb_message_id() -> impl Strategy<Value = MessageId> {
        arb_uuid_v7().prop_map(MessageId::new)
    }

    pub fn arb_summary_id() -> impl Strategy<Value = SummaryId> {
        arb_uuid_v7().prop_map(SummaryId::new)
    }

    pub fn arb_role() -> impl Strategy<Value = Role> {
        prop_oneof![Just(Role::User), Just(Role::Assistant), Just(Role::System)]
    }

    pub fn arb_summary_level() -> impl Strategy<Value = SummaryLevel> {
        prop_oneof![
            Just(SummaryLevel::Brief),
            Just(SummaryLevel::Standard),
            Just(SummaryLevel::Detailed),
        ]
    }

    /// Timestamps within the last 30 days, to keep recency scoring generators
    /// exercising the decay curve rather than the tails.
    pub fn arb_recent_timestamp() -> impl Strategy<Value = weave_core::Timestamp> {
        (0i64..30 * 24 * 3600).prop_map(|secs_ago| chrono::Utc::now() - chrono::Duration::seconds(secs_ago))
    }

    pub fn arb_embedding_vector(dimensions: usize) -> impl Strategy<Value = EmbeddingVector> {
        proptest::collection::vec(-1.0f32..1.0, dimensions)
            .prop_map(|data| EmbeddingVector::new(data, "test-model"))
    }

    pub fn arb_message(conversation_id: ConversationId) -> impl Strategy<Value = Message> {
        (
            arb_message_id(),
            arb_role(),
            "[a-z ]{5,80}",
            arb_recent_timestamp(),
            proptest::option::of(arb_embedding_vector(8)),
        )
            .prop_map(move |(id, role, content, created_at, embedding)| Message {
                id,
                conversation_id,
                role,
                content,
                created_at,
                parent_id: None,
                metadata: std::collections::HashMap::new(),
                embedding,
            })
    }

    pub fn arb_summary(conversation_id: ConversationId) -> impl Strategy<Value = Summary> {
        (
            arb_summary_id(),
            arb_summary_level(),
            "[a-z ]{10,200}",
            1i32..2000,
            arb_recent_timestamp(),
        )
            .prop_map(move |(id, level, content, token_count, created_at)| Summary {
                id,
                conversation_id,
                level,
                content,
                token_count,
                provider: "test-provider".into(),
                model: "test-model".into(),
                source_message_count: 1,
                created_at,
                valid: true,
            })
    }

    pub fn arb_assembly_budget() -> impl Strategy<Value = i32> {
        100i32..8000
    }

    pub fn arb_search_strategy() -> impl Strategy<Value = SearchStrategy> {
        prop_oneof![
            Just(SearchStrategy::Auto),
            Just(SearchStrategy::Fts),
            Just(SearchStrategy::Semantic),
            Just(SearchStrategy::Hybrid),
        ]
    }
}

/// Pre-built fixtures for the seed end-to-end scenarios in spec §8.
pub mod fixtures {
    use super::*;

    /// Scenario A: a conversation with 12 messages spread over the last 7
    /// days plus one valid standard summary.
    pub fn scenario_a_temporal(storage: &InMemoryStorage) -> ConversationId {
        let conversation_id = ConversationId::now_v7();
        storage.insert_conversation(conversation_id);

        let now = chrono::Utc::now();
        for i in 0..12i64 {
            let age_hours = i * 14; // spread across ~7 days
            storage.insert_message(Message {
                id: MessageId::now_v7(),
                conversation_id,
                role: if i % 2 == 0 { Role::User } else { Role::Assistant },
                content: format!("message number {i} about the decision we made"),
                created_at: now - chrono::Duration::hours(age_hours),
                parent_id: None,
                metadata: std::collections::HashMap::new(),
                embedding: None,
            });
        }
        storage.insert_summary(Summary {
            id: SummaryId::now_v7(),
            conversation_id,
            level: SummaryLevel::Standard,
            content: "We decided to ship the hybrid search engine this quarter.".into(),
            token_count: 40,
            provider: "test-provider".into(),
            model: "test-model".into(),
            source_message_count: 12,
            created_at: now - chrono::Duration::days(1),
            valid: true,
        });

        conversation_id
    }

    pub fn scenario_a_request(conversation_id: ConversationId) -> AssemblyRequest {
        AssemblyRequest {
            query: "What did we decide recently?".into(),
            conversation_id: Some(conversation_id),
            budget: 500,
            strategy: "auto".into(),
            ..Default::default()
        }
    }

    /// Scenario B: a single summary whose counter reports 800 tokens,
    /// forcing truncation against a 300-token budget.
    pub fn scenario_b_oversized_summary(storage: &InMemoryStorage) -> ConversationId {
        let conversation_id = ConversationId::now_v7();
        storage.insert_conversation(conversation_id);
        storage.insert_summary(Summary {
            id: SummaryId::now_v7(),
            conversation_id,
            level: SummaryLevel::Detailed,
            content: "word ".repeat(600),
            token_count: 800,
            provider: "test-provider".into(),
            model: "test-model".into(),
            source_message_count: 40,
            created_at: chrono::Utc::now(),
            valid: true,
        });
        conversation_id
    }

    pub fn scenario_b_request(conversation_id: ConversationId) -> AssemblyRequest {
        AssemblyRequest {
            query: "summarize everything".into(),
            conversation_id: Some(conversation_id),
            budget: 300,
            strategy: "hybrid".into(),
            ..Default::default()
        }
    }

    /// Scenario E: an embedding provider that reports itself unavailable,
    /// for exercising the degraded hybrid path.
    pub fn scenario_e_unavailable_provider() -> MockEmbeddingProvider {
        MockEmbeddingProvider::unavailable("test-model", 8)
    }

    pub fn scenario_e_request(conversation_id: ConversationId) -> AssemblyRequest {
        AssemblyRequest {
            query: "what about the new pricing model".into(),
            conversation_id: Some(conversation_id),
            budget: 1000,
            strategy: "hybrid".into(),
            focus_topics: vec!["pricing".into()],
            ..Default::default()
        }
    }

    pub fn search_request(query: impl Into<String>, strategy: SearchStrategy) -> SearchRequest {
        SearchRequest {
            query: query.into(),
            strategy,
            ..Default::default()
        }
    }

    /// A handful of messages with near-identical embeddings, useful for
    /// semantic-search fixtures that need deterministic nearest neighbors.
    /// Indexes each message's embedding into `provider` as well as
    /// `storage`, so `provider.nearest(...)` can actually find them.
    pub fn conversation_with_embedded_messages(
        storage: &InMemoryStorage,
        provider: &MockEmbeddingProvider,
        count: usize,
    ) -> ConversationId {
        let conversation_id = ConversationId::now_v7();
        storage.insert_conversation(conversation_id);
        for i in 0..count {
            let mut data = vec![0.0f32; 8];
            data[i % 8] = 1.0;
            let message_id = MessageId::now_v7();
            let embedding = EmbeddingVector::new(data, "test-model");
            storage.insert_message(Message {
                id: message_id,
                conversation_id,
                role: Role::User,
                content: format!("embedded message {i}"),
                created_at: chrono::Utc::now() - chrono::Duration::minutes(i as i64),
                parent_id: None,
                metadata: std::collections::HashMap::new(),
                embedding: Some(embedding.clone()),
            });
            provider.index_message(message_id, conversation_id, embedding);
        }
        conversation_id
    }
}

/// Custom assertions for invariants named in spec §8.
pub mod assertions {
    use weave_cache::CacheStats;
    use weave_context::AssemblyResult;

    /// Invariant 1: budget safety.
    pub fn assert_budget_safe(result: &AssemblyResult, budget: i32) {
        assert!(
            result.used_tokens <= budget,
            "used_tokens {} exceeds budget {}",
            result.used_tokens,
            budget
        );
    }

    /// Invariant 3: capacity — every tier's `bytes_used` stays within its
    /// fair share of `max_total_memory_bytes`, and the global total never
    /// exceeds it.
    pub fn assert_within_capacity(stats: &CacheStats, max_total_bytes: u64) {
        let total = stats.l1.bytes_used + stats.l2.bytes_used + stats.l3.bytes_used;
        assert!(
            total <= max_total_bytes,
            "total cache bytes_used {} exceeds max_total_memory_bytes {}",
            total,
            max_total_bytes
        );
    }

    /// Scenario C / the "monotone hit_rate" law: across a session, hits
    /// and misses never decrease.
    pub fn assert_monotone_counters(before: &CacheStats, after: &CacheStats) {
        let before_hits = before.l1.hits + before.l2.hits + before.l3.hits;
        let after_hits = after.l1.hits + after.l2.hits + after.l3.hits;
        let before_misses = before.l1.misses + before.l2.misses + before.l3.misses;
        let after_misses = after.l1.misses + after.l2.misses + after.l3.misses;
        assert!(after_hits >= before_hits, "hit count regressed");
        assert!(after_misses >= before_misses, "miss count regressed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn generated_messages_carry_their_conversation_id(
            conversation_id in generators::arb_conversation_id(),
        ) {
            let strategy = generators::arb_message(conversation_id);
            let mut runner = proptest::test_runner::TestRunner::default();
            let tree = strategy.new_tree(&mut runner).unwrap();
            let message = tree.current();
            prop_assert_eq!(message.conversation_id, conversation_id);
        }
    }

    #[test]
    fn scenario_a_fixture_builds_twelve_messages_and_one_summary() {
        let storage = InMemoryStorage::new();
        let conversation_id = fixtures::scenario_a_temporal(&storage);
        assert_eq!(storage.message_count(), 12);
        let request = fixtures::scenario_a_request(conversation_id);
        assert_eq!(request.conversation_id, Some(conversation_id));
        assert_eq!(request.budget, 500);
    }

    #[test]
    fn scenario_b_fixture_reports_oversized_token_count() {
        let storage = InMemoryStorage::new();
        let conversation_id = fixtures::scenario_b_oversized_summary(&storage);
        let request = fixtures::scenario_b_request(conversation_id);
        assert_eq!(request.budget, 300);
    }

    #[tokio::test]
    async fn scenario_e_provider_reports_unavailable() {
        use weave_storage::EmbeddingProvider;
        let provider = fixtures::scenario_e_unavailable_provider();
        assert!(!provider.is_available().await);
    }

    #[tokio::test]
    async fn embedded_conversation_fixture_is_searchable_by_nearest() {
        use weave_storage::EmbeddingProvider;
        let storage = InMemoryStorage::new();
        let provider = MockEmbeddingProvider::new("test-model", 8);
        let conversation_id = fixtures::conversation_with_embedded_messages(&storage, &provider, 4);

        let query = EmbeddingVector::new(vec![1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0], "test-model");
        let results = provider
            .nearest(&query, 2, Some(conversation_id))
            .await
            .unwrap();

        assert!(!results.is_empty(), "fixture must be searchable once indexed");
        assert!(results.len() <= 2);
        assert!(results.windows(2).all(|w| w[0].similarity >= w[1].similarity));
    }
}
