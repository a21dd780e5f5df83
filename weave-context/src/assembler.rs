//! Context Assembler (C5): the engine's single public entry point,
//! orchestrating scoring, strategy selection, and budget enforcement.

use crate::optimizer::{optimize_category, split_budget, Modification};
use crate::scorer::{score_message, score_summary, ScoringContext, ScoringWeights};
use crate::strategies::{auto_select, dispatch, AssemblyStrategyKind};
use crate::types::{AssemblyRequest, AssemblyResult};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use weave_cache::{MultiTierCache, Priority, SetOptions};
use weave_core::{
    CacheEventBroadcaster, EngineConfig, EngineError, EngineResult, FingerprintBuilder,
    HeuristicTokenizer, ItemType, ScoredItem, SummaryLevel, Tokenizer,
};
use weave_storage::{ConversationRepo, EmbeddingProvider, MessageRepo, SortOrder, SummaryRepo};

const MESSAGE_WINDOW_CAP: i32 = 500;
const SEMANTIC_TOP_K: usize = 50;
const LARGE_CONVERSATION_MESSAGE_THRESHOLD: i32 = 200;
const DEFAULT_RECENCY_HALF_LIFE_HOURS: f32 = 24.0;
const STRATEGY_TAGS: &[&str] = &["auto", "temporal", "topical", "entity-centric", "hybrid"];

/// Everything `assemble` needs beyond the request itself.
pub struct ContextAssembler {
    config: EngineConfig,
    message_repo: Arc<dyn MessageRepo>,
    summary_repo: Arc<dyn SummaryRepo>,
    conversation_repo: Arc<dyn ConversationRepo>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    cache: MultiTierCache<AssemblyResult>,
    tokenizer: HeuristicTokenizer,
}

fn strategy_tag(kind: AssemblyStrategyKind) -> &'static str {
    match kind {
        AssemblyStrategyKind::Temporal => "temporal",
        AssemblyStrategyKind::Topical => "topical",
        AssemblyStrategyKind::EntityCentric => "entity-centric",
        AssemblyStrategyKind::Hybrid => "hybrid",
    }
}

fn parse_strategy_tag(tag: &str) -> Option<AssemblyStrategyKind> {
    match tag {
        "temporal" => Some(AssemblyStrategyKind::Temporal),
        "topical" => Some(AssemblyStrategyKind::Topical),
        "entity-centric" => Some(AssemblyStrategyKind::EntityCentric),
        "hybrid" => Some(AssemblyStrategyKind::Hybrid),
        _ => None,
    }
}

impl ContextAssembler {
    pub fn new(
        config: EngineConfig,
        message_repo: Arc<dyn MessageRepo>,
        summary_repo: Arc<dyn SummaryRepo>,
        conversation_repo: Arc<dyn ConversationRepo>,
        embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
        cache_events: CacheEventBroadcaster,
    ) -> Self {
        let cache = MultiTierCache::new(config.cache.clone(), cache_events);
        Self {
            tokenizer: HeuristicTokenizer::default(),
            config,
            message_repo,
            summary_repo,
            conversation_repo,
            embedding_provider,
            cache,
        }
    }

    fn validate_request(request: &AssemblyRequest) -> EngineResult<()> {
        if request.query.trim().is_empty() {
            return Err(EngineError::InvalidRequest("query must not be empty".into()));
        }
        if request.budget < 100 {
            return Err(EngineError::InvalidRequest(format!(
                "budget {} is below the minimum of 100",
                request.budget
            )));
        }
        if !STRATEGY_TAGS.contains(&request.strategy.as_str()) {
            return Err(EngineError::InvalidRequest(format!(
                "unknown strategy tag: {}",
                request.strategy
            )));
        }
        Ok(())
    }

    fn fingerprint(request: &AssemblyRequest) -> String {
        FingerprintBuilder::new()
            .field_str(request.query.trim())
            .field_opt_str(request.conversation_id.map(|c| c.to_string()).as_deref())
            .field_i64(request.budget as i64)
            .field_str(&request.strategy)
            .field_opt_f32(request.min_relevance)
            .field_opt_i64(request.time_window_secs)
            .field_list(&request.focus_topics)
            .field_bool(request.include_recent)
            .finish()
    }

    async fn fetch_candidates(
        &self,
        request: &AssemblyRequest,
    ) -> EngineResult<(Vec<ScoredItem>, bool)> {
        let mut degraded = false;
        let now = chrono::Utc::now();
        let weights = ScoringWeights::default();

        let mut scored = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        if let Some(conversation_id) = request.conversation_id {
            let messages = self
                .message_repo
                .find_by_conversation(conversation_id, MESSAGE_WINDOW_CAP, 0, SortOrder::Descending)
                .await?;
            let message_count = messages.items.len() as i32;
            let is_large = message_count >= LARGE_CONVERSATION_MESSAGE_THRESHOLD;

            let query_embedding = if let Some(provider) = &self.embedding_provider {
                if provider.is_available().await {
                    match provider.embed(&request.query).await {
                        Ok(embedding) => Some(embedding),
                        Err(_) => {
                            degraded = true;
                            None
                        }
                    }
                } else {
                    degraded = true;
                    None
                }
            } else {
                None
            };

            let ctx = ScoringContext {
                query: &request.query,
                query_embedding: query_embedding.as_ref(),
                conversation_id: request.conversation_id,
                now,
                recency_half_life_hours: DEFAULT_RECENCY_HALF_LIFE_HOURS,
                weights,
            };

            for message in &messages.items {
                let (token_count, _) = self.tokenizer.count_text(&message.content);
                let item = score_message(&ctx, message, token_count);
                if seen.insert(item.stable_id()) {
                    scored.push(item);
                }
            }

            for level in [SummaryLevel::Brief, SummaryLevel::Standard, SummaryLevel::Detailed] {
                let summaries = self
                    .summary_repo
                    .find_valid_by_conversation(conversation_id, Some(level))
                    .await?;
                for summary in &summaries {
                    let (token_count, _) = self.tokenizer.count_text(&summary.content);
                    let item = score_summary(&ctx, summary, is_large, token_count);
                    if seen.insert(item.stable_id()) {
                        scored.push(item);
                    }
                }
            }

            if let (Some(provider), Some(q_embedding)) = (&self.embedding_provider, query_embedding.as_ref()) {
                match provider.nearest(q_embedding, SEMANTIC_TOP_K, Some(conversation_id)).await {
                    Ok(neighbors) => {
                        for neighbor in neighbors {
                            let key = format!("message:{}", neighbor.message_id);
                            if seen.contains(&key) {
                                continue;
                            }
                            // Neighbor content is fetched from the already-loaded
                            // window when present; neighbors outside the window
                            // are skipped rather than issuing another round trip.
                            if let Some(message) = messages.items.iter().find(|m| m.id == neighbor.message_id) {
                                let (token_count, _) = self.tokenizer.count_text(&message.content);
                                let item = score_message(&ctx, message, token_count);
                                if seen.insert(item.stable_id()) {
                                    scored.push(item);
                                }
                            }
                        }
                    }
                    Err(_) => {
                        degraded = true;
                    }
                }
            }
        } else {
            let ctx = ScoringContext {
                query: &request.query,
                query_embedding: None,
                conversation_id: None,
                now,
                recency_half_life_hours: DEFAULT_RECENCY_HALF_LIFE_HOURS,
                weights,
            };
            let messages = self
                .message_repo
                .find_with_embeddings(None, MESSAGE_WINDOW_CAP, 0)
                .await?;
            for message in &messages.items {
                let (token_count, _) = self.tokenizer.count_text(&message.content);
                let item = score_message(&ctx, message, token_count);
                if seen.insert(item.stable_id()) {
                    scored.push(item);
                }
            }
        }

        Ok((scored, degraded))
    }

    fn emit_text(items: &[ScoredItem]) -> String {
        let blocks: Vec<String> = items
            .iter()
            .map(|item| match item.item_type {
                ItemType::Summary => format!(
                    "[Summary ({}, {} messages)]: {}",
                    item.level.map(|l| l.to_string()).unwrap_or_default(),
                    item.source_message_count.unwrap_or(0),
                    item.content
                ),
                ItemType::Message => format!(
                    "[{}, {}]: {}",
                    item.role.map(|r| r.to_string()).unwrap_or_default(),
                    item.created_at.to_rfc3339(),
                    item.content
                ),
            })
            .collect();
        blocks.join("\n\n")
    }

    fn cache_priority(item_count: usize, elapsed_ms: i64) -> Priority {
        if item_count > 5 && elapsed_ms < 200 {
            Priority::High
        } else if item_count > 0 {
            Priority::Medium
        } else {
            Priority::Low
        }
    }

    /// Bytes currently held by this assembler's cache instance and its
    /// configured capacity, consulted by the memory pressure monitor (C10)
    /// as one of several heap sources it aggregates.
    pub fn heap_usage(&self) -> (u64, u64) {
        let stats = self.cache.get_stats();
        let used = stats.l1.bytes_used + stats.l2.bytes_used + stats.l3.bytes_used;
        (used, self.config.cache.max_total_memory_bytes)
    }

    /// Forwarded from the memory pressure monitor (spec §2 "C10 informs C8
    /// (and C9) of pressure levels").
    pub fn handle_memory_pressure(&self, level: weave_cache::PressureLevel) {
        self.cache.handle_pressure(level);
        self.cache.adaptive_resize(level, 0);
    }

    /// The engine's single public operation (spec §4.5).
    pub async fn assemble(&self, request: AssemblyRequest) -> EngineResult<AssemblyResult> {
        Self::validate_request(&request)?;
        let fingerprint = Self::fingerprint(&request);
        let span = tracing::info_span!(
            "assemble",
            fingerprint = %fingerprint,
            degraded = tracing::field::Empty,
            from_cache = tracing::field::Empty,
        );
        let _guard = span.enter();

        let start = Instant::now();

        if let Some(mut cached) = self.cache.get(&fingerprint) {
            cached.from_cache = true;
            cached.elapsed_ms = start.elapsed().as_millis() as i64;
            span.record("degraded", &cached.degraded);
            span.record("from_cache", &true);
            return Ok(cached);
        }

        if let Some(conversation_id) = request.conversation_id {
            if !self.conversation_repo.exists(conversation_id).await? {
                return Err(EngineError::InvalidRequest(format!(
                    "unknown conversation: {}",
                    conversation_id
                )));
            }
        }

        let (scored, degraded) = self.fetch_candidates(&request).await?;

        let kind = if request.strategy == "auto" {
            auto_select(&request)
        } else {
            parse_strategy_tag(&request.strategy).unwrap_or(AssemblyStrategyKind::Hybrid)
        };
        let ordered = dispatch(kind, scored, &request, chrono::Utc::now());

        let split = split_budget(request.budget, &self.config.tokens)?;

        let (summaries, messages): (Vec<ScoredItem>, Vec<ScoredItem>) = ordered
            .into_iter()
            .partition(|item| item.item_type == ItemType::Summary);

        let summary_result = optimize_category(
            summaries,
            split.summaries,
            &self.config.tokens,
            &self.tokenizer,
            "summaries",
        );
        let message_result = optimize_category(
            messages,
            split.messages,
            &self.config.tokens,
            &self.tokenizer,
            "messages",
        );

        let included: Vec<ScoredItem> = summary_result
            .items
            .iter()
            .chain(message_result.items.iter())
            .filter(|oi| oi.modification != Modification::Excluded)
            .map(|oi| oi.item.clone())
            .collect();

        let assembled_text = format!("[Query: {}]\n\n{}", request.query, Self::emit_text(&included));
        let (used_tokens, _) = self.tokenizer.count_text(&assembled_text);

        let elapsed_ms = start.elapsed().as_millis() as i64;
        let result = AssemblyResult {
            assembled_text,
            used_tokens,
            item_count: included.len(),
            from_cache: false,
            elapsed_ms,
            degraded,
            strategy_used: strategy_tag(kind).to_string(),
        };

        span.record("degraded", &degraded);
        span.record("from_cache", &false);

        let priority = Self::cache_priority(result.item_count, elapsed_ms);
        self.cache.set(
            &fingerprint,
            result.clone(),
            SetOptions {
                ttl_ms: Some(self.config.cache.default_ttl_ms),
                priority,
                cost: None,
                size: None,
            },
        );

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::collections::HashMap;
    use weave_core::{ConversationId, Message, MessageId, Paginated, Role, SearchResult, Summary};
    use weave_storage::{ConversationHandle, FtsSearchOptions};

    struct StubConversationRepo;
    #[async_trait]
    impl ConversationRepo for StubConversationRepo {
        async fn find_by_id(&self, id: ConversationId) -> EngineResult<Option<ConversationHandle>> {
            Ok(Some(ConversationHandle { id }))
        }
        async fn exists(&self, _id: ConversationId) -> EngineResult<bool> {
            Ok(true)
        }
    }

    struct StubMessageRepo {
        messages: Vec<Message>,
    }
    #[async_trait]
    impl MessageRepo for StubMessageRepo {
        async fn find_by_conversation(
            &self,
            _conversation_id: ConversationId,
            limit: i32,
            _offset: i32,
            _order: SortOrder,
        ) -> EngineResult<Paginated<Message>> {
            let items: Vec<Message> = self.messages.iter().take(limit as usize).cloned().collect();
            Ok(Paginated::new(items, false))
        }
        async fn find_with_embeddings(
            &self,
            _conversation_id: Option<ConversationId>,
            limit: i32,
            _offset: i32,
        ) -> EngineResult<Paginated<Message>> {
            let items: Vec<Message> = self.messages.iter().take(limit as usize).cloned().collect();
            Ok(Paginated::new(items, false))
        }
        async fn search(&self, _options: FtsSearchOptions) -> EngineResult<Paginated<SearchResult>> {
            unimplemented!()
        }
        async fn find_children(&self, _parent_id: MessageId) -> EngineResult<Vec<Message>> {
            Ok(Vec::new())
        }
    }

    struct StubSummaryRepo;
    #[async_trait]
    impl SummaryRepo for StubSummaryRepo {
        async fn find_valid_by_conversation(
            &self,
            _conversation_id: ConversationId,
            _level: Option<SummaryLevel>,
        ) -> EngineResult<Vec<Summary>> {
            Ok(Vec::new())
        }
        async fn invalidate_for_conversation(&self, _conversation_id: ConversationId) -> EngineResult<u64> {
            Ok(0)
        }
    }

    fn make_assembler(messages: Vec<Message>) -> ContextAssembler {
        ContextAssembler::new(
            EngineConfig::default(),
            Arc::new(StubMessageRepo { messages }),
            Arc::new(StubSummaryRepo),
            Arc::new(StubConversationRepo),
            None,
            CacheEventBroadcaster::new(16),
        )
    }

    fn msg(content: &str, conversation_id: ConversationId) -> Message {
        Message {
            id: MessageId::now_v7(),
            conversation_id,
            role: Role::User,
            content: content.to_string(),
            created_at: Utc::now(),
            parent_id: None,
            metadata: HashMap::new(),
            embedding: None,
        }
    }

    #[tokio::test]
    async fn rejects_empty_query() {
        let assembler = make_assembler(Vec::new());
        let request = AssemblyRequest {
            query: "   ".into(),
            ..Default::default()
        };
        assert!(assembler.assemble(request).await.is_err());
    }

    #[tokio::test]
    async fn rejects_budget_below_minimum() {
        let assembler = make_assembler(Vec::new());
        let request = AssemblyRequest {
            query: "hello".into(),
            budget: 10,
            ..Default::default()
        };
        assert!(assembler.assemble(request).await.is_err());
    }

    #[tokio::test]
    async fn assembles_text_from_conversation_messages() {
        let conv = ConversationId::now_v7();
        let messages = vec![msg("hello there about rust", conv), msg("unrelated content here", conv)];
        let assembler = make_assembler(messages);
        let request = AssemblyRequest {
            query: "rust".into(),
            conversation_id: Some(conv),
            budget: 1000,
            ..Default::default()
        };
        let result = assembler.assemble(request).await.unwrap();
        assert!(result.assembled_text.starts_with("[Query: rust]"));
        assert!(!result.from_cache);
    }

    #[tokio::test]
    async fn second_identical_call_hits_cache() {
        let conv = ConversationId::now_v7();
        let messages = vec![msg("hello there about rust", conv)];
        let assembler = make_assembler(messages);
        let request = AssemblyRequest {
            query: "rust".into(),
            conversation_id: Some(conv),
            budget: 1000,
            ..Default::default()
        };
        let first = assembler.assemble(request.clone()).await.unwrap();
        let second = assembler.assemble(request).await.unwrap();
        assert!(!first.from_cache);
        assert!(second.from_cache);
    }

    #[tokio::test]
    async fn unknown_strategy_tag_is_rejected() {
        let assembler = make_assembler(Vec::new());
        let request = AssemblyRequest {
            query: "hello".into(),
            strategy: "not-a-real-strategy".into(),
            ..Default::default()
        };
        assert!(assembler.assemble(request).await.is_err());
    }
}
