//! Hybrid Search Engine (C9): orchestrates query analysis, the FTS and
//! semantic sub-queries, fusion, caching, and metrics.

use crate::fts::fts_search;
use crate::fusion::{explain, fuse};
use crate::query_analysis::analyze;
use crate::semantic::semantic_search;
use crate::types::{
    CachedResults, SearchMetrics, SearchRequest, SearchResultPage, SearchStrategy, SearchTiming,
    SearchWeights, MAX_LIMIT,
};
use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Instant;
use weave_cache::{MultiTierCache, Priority, SetOptions};
use weave_core::{
    Broadcaster, CacheEventBroadcaster, EngineConfig, EngineError, EngineResult, FingerprintBuilder,
    SearchResult,
};
use weave_storage::{EmbeddingProvider, MessageRepo};

/// Broadcasts completed `SearchMetrics` in-process, matching the
/// broadcaster-based ambient eventing the cache and memory monitor use
/// (spec §9 "Emit-and-subscribe eventing"). Persistence of these events
/// to a durable sink is the surrounding service's concern.
pub type SearchMetricsBroadcaster = Broadcaster<SearchMetrics>;

pub struct SearchEngine {
    config: EngineConfig,
    message_repo: Arc<dyn MessageRepo>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    cache: MultiTierCache<CachedResults>,
    metrics: Option<SearchMetricsBroadcaster>,
}

fn sort_and_paginate(
    mut items: Vec<SearchResult>,
    offset: i32,
    limit: i32,
    upstream_has_more: bool,
) -> (Vec<SearchResult>, bool) {
    items.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.created_at.cmp(&a.created_at))
    });
    let total = items.len();
    let start = (offset as usize).min(total);
    let end = (start + limit as usize).min(total);
    let has_more = upstream_has_more || end < total;
    (items[start..end].to_vec(), has_more)
}

/// Same thresholds as the context assembler's cache-priority policy (spec
/// §4.9 "Caching": "cache priority derived identically to the assembler's
/// policy").
fn cache_priority(item_count: usize, elapsed_ms: i64) -> Priority {
    if item_count > 5 && elapsed_ms < 200 {
        Priority::High
    } else if item_count > 0 {
        Priority::Medium
    } else {
        Priority::Low
    }
}

impl SearchEngine {
    pub fn new(
        config: EngineConfig,
        message_repo: Arc<dyn MessageRepo>,
        embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
        cache_events: CacheEventBroadcaster,
        metrics: Option<SearchMetricsBroadcaster>,
    ) -> Self {
        let cache = MultiTierCache::new(config.cache.clone(), cache_events);
        Self {
            config,
            message_repo,
            embedding_provider,
            cache,
            metrics,
        }
    }

    fn fingerprint(
        &self,
        request: &SearchRequest,
        strategy: SearchStrategy,
        weights: SearchWeights,
        semantic_threshold: f32,
    ) -> String {
        FingerprintBuilder::new()
            .field_str(&request.query)
            .field_opt_str(request.conversation_id.map(|c| c.to_string()).as_deref())
            .field_i64(request.limit as i64)
            .field_i64(request.offset as i64)
            .field_str(&strategy.to_string())
            .field_opt_f32(Some(weights.semantic))
            .field_opt_f32(Some(weights.fts))
            .field_opt_f32(Some(semantic_threshold))
            .finish()
    }

    /// Returns the provider if configured and currently reachable.
    async fn available_provider(&self) -> Option<&Arc<dyn EmbeddingProvider>> {
        match &self.embedding_provider {
            Some(provider) if provider.is_available().await => Some(provider),
            _ => None,
        }
    }

    pub async fn search(&self, request: SearchRequest) -> EngineResult<SearchResultPage> {
        let start = Instant::now();

        let validation = weave_context::validate(&request.query);
        if !validation.is_valid {
            return Err(EngineError::InvalidQuery(
                validation.error.unwrap_or_else(|| "invalid query".into()),
            ));
        }
        if request.limit <= 0 || request.limit > MAX_LIMIT || request.offset < 0 {
            return Err(EngineError::InvalidRequest(format!(
                "limit must be in 1..={} and offset must be >= 0",
                MAX_LIMIT
            )));
        }

        let analysis_start = Instant::now();
        let analysis = analyze(&request.query);
        let query_analysis_ms = analysis_start.elapsed().as_millis() as i64;

        let resolved_strategy = match request.strategy {
            SearchStrategy::Auto => analysis.suggested_strategy,
            other => other,
        };
        let weights = request.weights.unwrap_or(SearchWeights {
            semantic: self.config.search.default_semantic_weight,
            fts: self.config.search.default_fts_weight,
        });
        let semantic_threshold = request
            .semantic_threshold
            .unwrap_or(self.config.search.semantic_threshold);

        let query_id = uuid::Uuid::new_v4().to_string();
        let fingerprint = self.fingerprint(&request, resolved_strategy, weights, semantic_threshold);

        let mut timing = SearchTiming {
            query_analysis_ms,
            ..Default::default()
        };

        if let Some(cached) = self.cache.get(&fingerprint) {
            timing.formatting_ms = 0;
            let metrics = SearchMetrics {
                query_id,
                query: request.query.clone(),
                strategy: resolved_strategy,
                result_count: cached.items.len(),
                total_time_ms: start.elapsed().as_millis() as i64,
                timing,
                query_analysis: analysis,
                degraded: false,
            };
            self.publish_metrics(&metrics);
            return Ok(SearchResultPage {
                items: cached.items,
                has_more: cached.has_more,
                metrics,
            });
        }

        let fetch_limit = request.offset + request.limit;
        let mut degraded = false;

        let fused: Vec<SearchResult> = match resolved_strategy {
            SearchStrategy::Fts => {
                let t = Instant::now();
                let (items, _) = fts_search(
                    self.message_repo.as_ref(),
                    &request.query,
                    request.conversation_id,
                    fetch_limit,
                )
                .await?;
                timing.fts_search_ms = Some(t.elapsed().as_millis() as i64);
                items
            }
            SearchStrategy::Semantic => {
                if let Some(provider) = self.available_provider().await {
                    let t = Instant::now();
                    let result = semantic_search(
                        self.message_repo.as_ref(),
                        provider.as_ref(),
                        &request.query,
                        request.conversation_id,
                        fetch_limit,
                        semantic_threshold,
                    )
                    .await;
                    match result {
                        Ok(items) => {
                            timing.semantic_search_ms = Some(t.elapsed().as_millis() as i64);
                            items
                        }
                        Err(_) => {
                            degraded = true;
                            self.fallback_to_fts(&request, fetch_limit, &mut timing)
                                .await?
                        }
                    }
                } else {
                    degraded = true;
                    self.fallback_to_fts(&request, fetch_limit, &mut timing)
                        .await?
                }
            }
            SearchStrategy::Hybrid => {
                let semantic_items = if let Some(provider) = self.available_provider().await {
                    let t = Instant::now();
                    match semantic_search(
                        self.message_repo.as_ref(),
                        provider.as_ref(),
                        &request.query,
                        request.conversation_id,
                        fetch_limit,
                        semantic_threshold,
                    )
                    .await
                    {
                        Ok(items) => {
                            timing.semantic_search_ms = Some(t.elapsed().as_millis() as i64);
                            Some(items)
                        }
                        Err(_) => {
                            degraded = true;
                            None
                        }
                    }
                } else {
                    degraded = true;
                    None
                };

                let t = Instant::now();
                let fts_items = fts_search(
                    self.message_repo.as_ref(),
                    &request.query,
                    request.conversation_id,
                    fetch_limit,
                )
                .await;
                let fts_items = match (fts_items, &semantic_items) {
                    (Ok((items, _)), _) => items,
                    (Err(e), None) => {
                        return Err(EngineError::SearchUnavailable(e.to_string()));
                    }
                    (Err(_), Some(_)) => Vec::new(),
                };
                timing.fts_search_ms = Some(t.elapsed().as_millis() as i64);

                match semantic_items {
                    Some(sem) => {
                        let merge_start = Instant::now();
                        let fused = fuse(fts_items, sem, weights);
                        timing.result_merging_ms = Some(merge_start.elapsed().as_millis() as i64);
                        fused
                    }
                    None => fts_items,
                }
            }
            SearchStrategy::Auto => unreachable!("resolved before dispatch"),
        };

        let formatting_start = Instant::now();
        let (mut page, has_more) = sort_and_paginate(fused, request.offset, request.limit, false);
        if request.explain {
            for item in page.iter_mut() {
                item.explanation = Some(explain(item, weights));
            }
        }
        timing.formatting_ms = formatting_start.elapsed().as_millis() as i64;

        let elapsed_ms = start.elapsed().as_millis() as i64;
        self.cache.set(
            &fingerprint,
            CachedResults {
                items: page.clone(),
                has_more,
            },
            SetOptions {
                ttl_ms: Some(self.config.cache.default_ttl_ms),
                priority: cache_priority(page.len(), elapsed_ms),
                cost: None,
                size: None,
            },
        );

        let metrics = SearchMetrics {
            query_id,
            query: request.query.clone(),
            strategy: resolved_strategy,
            result_count: page.len(),
            total_time_ms: elapsed_ms,
            timing,
            query_analysis: analysis,
            degraded,
        };
        self.publish_metrics(&metrics);

        Ok(SearchResultPage {
            items: page,
            has_more,
            metrics,
        })
    }

    async fn fallback_to_fts(
        &self,
        request: &SearchRequest,
        fetch_limit: i32,
        timing: &mut SearchTiming,
    ) -> EngineResult<Vec<SearchResult>> {
        let t = Instant::now();
        let result = fts_search(
            self.message_repo.as_ref(),
            &request.query,
            request.conversation_id,
            fetch_limit,
        )
        .await;
        match result {
            Ok((items, _)) => {
                timing.fts_search_ms = Some(t.elapsed().as_millis() as i64);
                Ok(items)
            }
            Err(e) => Err(EngineError::SearchUnavailable(e.to_string())),
        }
    }

    fn publish_metrics(&self, metrics: &SearchMetrics) {
        if !self.config.search.metrics_enabled {
            return;
        }
        if let Some(broadcaster) = &self.metrics {
            broadcaster.publish(metrics.clone());
        }
    }

    /// Bytes currently held by this engine's cache instance and its
    /// configured capacity, consulted by the memory pressure monitor (C10).
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
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use weave_core::{ConversationId, MatchType, Message, MessageId, Paginated, SourceScores};
    use weave_storage::{FtsSearchOptions, SortOrder};

    struct StubMessageRepo {
        fts_items: Vec<SearchResult>,
    }

    #[async_trait]
    impl MessageRepo for StubMessageRepo {
        async fn find_by_conversation(
            &self,
            _c: ConversationId,
            _l: i32,
            _o: i32,
            _ord: SortOrder,
        ) -> EngineResult<Paginated<Message>> {
            Ok(Paginated::empty())
        }
        async fn find_with_embeddings(
            &self,
            _c: Option<ConversationId>,
            _l: i32,
            _o: i32,
        ) -> EngineResult<Paginated<Message>> {
            Ok(Paginated::empty())
        }
        async fn search(&self, _options: FtsSearchOptions) -> EngineResult<Paginated<SearchResult>> {
            Ok(Paginated::new(self.fts_items.clone(), false))
        }
        async fn find_children(&self, _p: MessageId) -> EngineResult<Vec<Message>> {
            Ok(vec![])
        }
    }

    fn fts_result(score: f32) -> SearchResult {
        SearchResult {
            message_id: MessageId::now_v7(),
            conversation_id: ConversationId::now_v7(),
            content: "hello world".into(),
            score,
            match_type: MatchType::Fts,
            scores: SourceScores::default(),
            highlights: vec![],
            conversation_title: None,
            created_at: Utc::now(),
            explanation: None,
        }
    }

    fn make_engine(fts_items: Vec<SearchResult>) -> SearchEngine {
        SearchEngine::new(
            EngineConfig::default(),
            Arc::new(StubMessageRepo { fts_items }),
            None,
            CacheEventBroadcaster::default(),
            None,
        )
    }

    #[tokio::test]
    async fn rejects_empty_query() {
        let engine = make_engine(vec![]);
        let result = engine
            .search(SearchRequest {
                query: "   ".into(),
                ..Default::default()
            })
            .await;
        assert!(matches!(result, Err(EngineError::InvalidQuery(_))));
    }

    #[tokio::test]
    async fn rejects_limit_over_max() {
        let engine = make_engine(vec![]);
        let result = engine
            .search(SearchRequest {
                query: "hello".into(),
                limit: 5000,
                ..Default::default()
            })
            .await;
        assert!(matches!(result, Err(EngineError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn quoted_query_without_provider_resolves_to_fts() {
        let engine = make_engine(vec![fts_result(5.0), fts_result(2.0)]);
        let page = engine
            .search(SearchRequest {
                query: "\"hello world\"".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page.metrics.strategy, SearchStrategy::Fts);
        assert_eq!(page.items.len(), 2);
        assert!(!page.metrics.degraded);
    }

    #[tokio::test]
    async fn simple_query_without_provider_degrades_to_fts() {
        let engine = make_engine(vec![fts_result(5.0)]);
        let page = engine
            .search(SearchRequest {
                query: "rust lifetimes".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(page.metrics.degraded);
        assert_eq!(page.items.len(), 1);
    }

    #[tokio::test]
    async fn second_identical_call_hits_cache() {
        let engine = make_engine(vec![fts_result(5.0)]);
        let request = SearchRequest {
            query: "\"hello world\"".into(),
            ..Default::default()
        };
        let first = engine.search(request.clone()).await.unwrap();
        let second = engine.search(request).await.unwrap();
        assert_eq!(first.items.len(), second.items.len());
    }
}
