//! Repository contracts (C11) and in-memory reference implementations.

mod mock;
mod traits;

pub use mock::{InMemoryStorage, MockEmbeddingProvider};
pub use traits::{
    CacheRepo, ConversationHandle, ConversationRepo, EmbeddingProvider, FtsSearchOptions,
    MessageRepo, SimilarMessage, SortOrder, SummaryRepo,
};
