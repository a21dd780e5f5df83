//! Error types for the context assembly engine.

use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Incompatible options: {option_a} and {option_b}")]
    IncompatibleOptions { option_a: String, option_b: String },
}

/// Cache-internal errors. Never surfaced to an `assemble`/`search` caller;
/// the cache's failure model treats these as a miss or a skipped `set`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("failed to estimate entry size: {reason}")]
    SizeEstimation { reason: String },

    #[error("tier capacity exhausted after eviction for key {key}")]
    CapacityExhausted { key: String },

    #[error("serialization failed for key {key}: {reason}")]
    Serialization { key: String, reason: String },
}

/// Top-level error taxonomy for the engine (spec §7).
///
/// Every entry point (`assemble`, `search`, cache administrative calls)
/// returns `EngineResult<T>`. Cache failures never reach this type directly;
/// they are caught and logged at the cache boundary (see `weave-cache`).
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// Caller misuse: empty query, budget too low, unknown strategy tag.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Parser-detected malformed query (unmatched quote, length overflow).
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// Repository I/O failure. Fatal to the current request; no retry inside
    /// the core.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Semantic backend down. Recovered locally by the caller: the request
    /// continues without semantic signal and `degraded` is set to `true`.
    /// Surfaced here only when the caller explicitly needs to observe it.
    #[error("embedding provider unavailable: {0}")]
    EmbeddingUnavailable(String),

    /// External call exceeded its deadline.
    #[error("operation timed out after {elapsed_ms}ms (deadline {deadline_ms}ms): {context}")]
    Timeout {
        elapsed_ms: u64,
        deadline_ms: u64,
        context: String,
    },

    /// Both FTS and semantic sources failed for a hybrid search.
    #[error("search unavailable: {0}")]
    SearchUnavailable(String),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias used throughout the engine.
pub type EngineResult<T> = Result<T, EngineError>;
