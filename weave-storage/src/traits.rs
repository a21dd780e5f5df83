//! Repository contracts (C11): narrow, read-mostly interfaces the core
//! depends on. Implementations persist in a relational store and are
//! explicitly out of scope (spec §1); only the contracts live here.
//!
//! All methods return `EngineResult`. I/O failure surfaces as
//! `EngineError::StorageUnavailable`; absence of a looked-up entity is
//! modeled as `Ok(None)` rather than an error, per spec §4.11 "`NotFound`
//! where semantically appropriate."

use async_trait::async_trait;
use weave_core::{
    ConversationId, EmbeddingVector, EngineResult, Message, MessageId, Paginated, SearchResult,
    Summary, SummaryLevel,
};

/// Sort order for paginated message queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// A minimal marker for conversation existence/identity. The engine never
/// needs more than id + existence; richer conversation metadata (title,
/// owner, etc.) is the surrounding service's concern.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationHandle {
    pub id: ConversationId,
}

#[async_trait]
pub trait ConversationRepo: Send + Sync {
    async fn find_by_id(&self, id: ConversationId) -> EngineResult<Option<ConversationHandle>>;
    async fn exists(&self, id: ConversationId) -> EngineResult<bool>;
}

/// Options for the FTS-delegated `MessageRepo::search` (spec §4.11,
/// "Full-text tokenization details and index maintenance" are delegated to
/// the storage engine's native facility; this contract only shapes the
/// request/response).
#[derive(Debug, Clone)]
pub struct FtsSearchOptions {
    pub query: String,
    pub conversation_id: Option<ConversationId>,
    pub limit: i32,
    pub offset: i32,
}

#[async_trait]
pub trait MessageRepo: Send + Sync {
    async fn find_by_conversation(
        &self,
        conversation_id: ConversationId,
        limit: i32,
        offset: i32,
        order: SortOrder,
    ) -> EngineResult<Paginated<Message>>;

    /// Messages that carry a precomputed embedding, optionally scoped to one
    /// conversation. Used by the assembler to merge semantically similar
    /// messages into the candidate set (spec §4.5 step 4).
    async fn find_with_embeddings(
        &self,
        conversation_id: Option<ConversationId>,
        limit: i32,
        offset: i32,
    ) -> EngineResult<Paginated<Message>>;

    /// FTS delegation: the storage engine's native full-text index performs
    /// the match; this contract only shapes the request/response.
    async fn search(&self, options: FtsSearchOptions) -> EngineResult<Paginated<SearchResult>>;

    async fn find_children(&self, parent_id: MessageId) -> EngineResult<Vec<Message>>;
}

#[async_trait]
pub trait SummaryRepo: Send + Sync {
    /// Valid summaries for a conversation, optionally filtered to one level.
    /// At most one valid summary per (conversation, level) should be
    /// returned by a correct implementation (spec §3).
    async fn find_valid_by_conversation(
        &self,
        conversation_id: ConversationId,
        level: Option<SummaryLevel>,
    ) -> EngineResult<Vec<Summary>>;

    /// Marks all summaries for a conversation invalid (cascading deletion
    /// contract, spec §3 Invariants). Returns the count invalidated.
    /// Idempotent: invalidating an already-invalidated conversation returns
    /// 0 and never errors.
    async fn invalidate_for_conversation(
        &self,
        conversation_id: ConversationId,
    ) -> EngineResult<u64>;
}

/// Reserved for a future persistence tier beneath the in-memory cache
/// (spec §4.11: "not used by the in-memory C8; reserved for future
/// persistence"). No production code path calls this yet.
#[async_trait]
pub trait CacheRepo: Send + Sync {
    async fn get(&self, key: &str) -> EngineResult<Option<Vec<u8>>>;
    async fn put(&self, key: &str, value: Vec<u8>, ttl_ms: i64) -> EngineResult<()>;
}

/// A neighbor found by semantic search, paired with its similarity.
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarMessage {
    pub message_id: MessageId,
    pub similarity: f32,
}

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> EngineResult<EmbeddingVector>;

    async fn nearest(
        &self,
        vector: &EmbeddingVector,
        k: usize,
        conversation_id: Option<ConversationId>,
    ) -> EngineResult<Vec<SimilarMessage>>;

    /// Whether the provider is currently reachable. The assembler consults
    /// this before attempting a semantic sub-query so an outage degrades
    /// gracefully instead of surfacing `EmbeddingUnavailable` (spec §4.5
    /// step 4, §7).
    async fn is_available(&self) -> bool;
}
