//! Configuration types (spec §6 "Configuration" plus the ambient
//! observability keys added in SPEC_FULL.md §6).
//!
//! ALL sub-configs ship a `Default`; `EngineConfig::from_env()` overlays
//! environment variables on top of those defaults, and `validate()` rejects
//! out-of-range values before the engine starts.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// Truncation strategy selector (§4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TruncationStrategy {
    End,
    Middle,
    Smart,
}

impl std::fmt::Display for TruncationStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TruncationStrategy::End => "end",
            TruncationStrategy::Middle => "middle",
            TruncationStrategy::Smart => "smart",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for TruncationStrategy {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "end" => Ok(Self::End),
            "middle" => Ok(Self::Middle),
            "smart" => Ok(Self::Smart),
            _ => Err(format!("invalid truncation strategy: {}", s)),
        }
    }
}

/// Token budget allocation settings (§4.2).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenConfig {
    pub safety_margin: f32,
    pub min_tokens_per_item: i32,
    pub max_tokens_per_item: i32,
    pub truncation_strategy: TruncationStrategy,
    /// Default category split, percent of total: query/summaries/messages/metadata/buffer.
    pub default_query_pct: f32,
    pub default_summaries_pct: f32,
    pub default_messages_pct: f32,
    pub default_metadata_pct: f32,
    pub default_buffer_pct: f32,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            safety_margin: 0.05,
            min_tokens_per_item: 20,
            max_tokens_per_item: 500,
            truncation_strategy: TruncationStrategy::Smart,
            default_query_pct: 0.05,
            default_summaries_pct: 0.30,
            default_messages_pct: 0.55,
            default_metadata_pct: 0.05,
            default_buffer_pct: 0.05,
        }
    }
}

/// Per-tier cache sizing, expressed as a share of the cache total (§4.8).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    pub max_total_memory_bytes: u64,
    pub l1_share: f32,
    pub l2_share: f32,
    pub l3_share: f32,
    pub default_ttl_ms: i64,
    pub enable_adaptive_sizing: bool,
    pub memory_pressure_threshold: f32,
    pub enable_cache_warming: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_total_memory_bytes: 100 * 1024 * 1024,
            l1_share: 0.10,
            l2_share: 0.30,
            l3_share: 0.60,
            default_ttl_ms: 5 * 60 * 1000,
            enable_adaptive_sizing: true,
            memory_pressure_threshold: 0.8,
            enable_cache_warming: false,
        }
    }
}

impl CacheConfig {
    pub fn l1_bytes(&self) -> u64 {
        (self.max_total_memory_bytes as f64 * self.l1_share as f64) as u64
    }
    pub fn l2_bytes(&self) -> u64 {
        (self.max_total_memory_bytes as f64 * self.l2_share as f64) as u64
    }
    pub fn l3_bytes(&self) -> u64 {
        (self.max_total_memory_bytes as f64 * self.l3_share as f64) as u64
    }
}

/// Memory pressure monitor thresholds (§4.10). Four pressure levels are
/// carved out of three ascending boundaries: below `heap_warning_threshold`
/// is low, up to `heap_high_threshold` is medium, up to
/// `heap_critical_threshold` is high, at or above it is critical.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryConfig {
    pub heap_warning_threshold: f32,
    pub heap_high_threshold: f32,
    pub heap_critical_threshold: f32,
    pub max_rss_bytes: u64,
    pub monitoring_interval_ms: i64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            heap_warning_threshold: 0.7,
            heap_high_threshold: 0.85,
            heap_critical_threshold: 0.95,
            max_rss_bytes: 1024 * 1024 * 1024,
            monitoring_interval_ms: 30_000,
        }
    }
}

/// Hybrid search defaults (§4.9).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
    pub default_semantic_weight: f32,
    pub default_fts_weight: f32,
    pub semantic_threshold: f32,
    pub metrics_enabled: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_semantic_weight: 0.6,
            default_fts_weight: 0.4,
            semantic_threshold: 0.7,
            metrics_enabled: true,
        }
    }
}

/// Assembly-level defaults (§6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssemblyConfig {
    pub default_max_tokens: i32,
    pub default_strategy: String,
}

impl Default for AssemblyConfig {
    fn default() -> Self {
        Self {
            default_max_tokens: 4000,
            default_strategy: "hybrid".to_string(),
        }
    }
}

/// Ambient logging configuration (SPEC_FULL.md §6 supplemental).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Master configuration for the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct EngineConfig {
    pub tokens: TokenConfig,
    pub cache: CacheConfig,
    pub memory: MemoryConfig,
    pub search: SearchConfig,
    pub assembly: AssemblyConfig,
    pub logging: LoggingConfig,
}

impl EngineConfig {
    /// Load configuration, overlaying `CONTEXT_ENGINE_*` environment
    /// variables on top of documented defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            tokens: TokenConfig {
                safety_margin: env_or(
                    "CONTEXT_ENGINE_TOKENS_SAFETY_MARGIN",
                    defaults.tokens.safety_margin,
                ),
                min_tokens_per_item: env_or(
                    "CONTEXT_ENGINE_TOKENS_MIN_PER_ITEM",
                    defaults.tokens.min_tokens_per_item,
                ),
                max_tokens_per_item: env_or(
                    "CONTEXT_ENGINE_TOKENS_MAX_PER_ITEM",
                    defaults.tokens.max_tokens_per_item,
                ),
                truncation_strategy: std::env::var("CONTEXT_ENGINE_TOKENS_TRUNCATION_STRATEGY")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.tokens.truncation_strategy),
                ..defaults.tokens
            },
            cache: CacheConfig {
                max_total_memory_bytes: env_or(
                    "CONTEXT_ENGINE_CACHE_MAX_TOTAL_MEMORY",
                    defaults.cache.max_total_memory_bytes,
                ),
                default_ttl_ms: env_or(
                    "CONTEXT_ENGINE_CACHE_DEFAULT_TTL_MS",
                    defaults.cache.default_ttl_ms,
                ),
                enable_adaptive_sizing: env_or(
                    "CONTEXT_ENGINE_CACHE_ENABLE_ADAPTIVE_SIZING",
                    defaults.cache.enable_adaptive_sizing,
                ),
                memory_pressure_threshold: env_or(
                    "CONTEXT_ENGINE_CACHE_MEMORY_PRESSURE_THRESHOLD",
                    defaults.cache.memory_pressure_threshold,
                ),
                enable_cache_warming: env_or(
                    "CONTEXT_ENGINE_CACHE_ENABLE_WARMING",
                    defaults.cache.enable_cache_warming,
                ),
                ..defaults.cache
            },
            memory: MemoryConfig {
                heap_warning_threshold: env_or(
                    "CONTEXT_ENGINE_MEMORY_HEAP_WARNING_THRESHOLD",
                    defaults.memory.heap_warning_threshold,
                ),
                heap_high_threshold: env_or(
                    "CONTEXT_ENGINE_MEMORY_HEAP_HIGH_THRESHOLD",
                    defaults.memory.heap_high_threshold,
                ),
                heap_critical_threshold: env_or(
                    "CONTEXT_ENGINE_MEMORY_HEAP_CRITICAL_THRESHOLD",
                    defaults.memory.heap_critical_threshold,
                ),
                max_rss_bytes: env_or(
                    "CONTEXT_ENGINE_MEMORY_MAX_RSS_BYTES",
                    defaults.memory.max_rss_bytes,
                ),
                monitoring_interval_ms: env_or(
                    "CONTEXT_ENGINE_MEMORY_MONITORING_INTERVAL_MS",
                    defaults.memory.monitoring_interval_ms,
                ),
            },
            search: SearchConfig {
                default_semantic_weight: env_or(
                    "CONTEXT_ENGINE_SEARCH_SEMANTIC_WEIGHT",
                    defaults.search.default_semantic_weight,
                ),
                default_fts_weight: env_or(
                    "CONTEXT_ENGINE_SEARCH_FTS_WEIGHT",
                    defaults.search.default_fts_weight,
                ),
                semantic_threshold: env_or(
                    "CONTEXT_ENGINE_SEARCH_SEMANTIC_THRESHOLD",
                    defaults.search.semantic_threshold,
                ),
                metrics_enabled: env_or(
                    "CONTEXT_ENGINE_SEARCH_METRICS_ENABLED",
                    defaults.search.metrics_enabled,
                ),
            },
            assembly: AssemblyConfig {
                default_max_tokens: env_or(
                    "CONTEXT_ENGINE_ASSEMBLY_DEFAULT_MAX_TOKENS",
                    defaults.assembly.default_max_tokens,
                ),
                default_strategy: std::env::var("CONTEXT_ENGINE_ASSEMBLY_DEFAULT_STRATEGY")
                    .unwrap_or(defaults.assembly.default_strategy),
            },
            logging: LoggingConfig {
                level: std::env::var("CONTEXT_ENGINE_LOGGING_LEVEL")
                    .unwrap_or(defaults.logging.level),
                json: env_or("CONTEXT_ENGINE_LOGGING_JSON", defaults.logging.json),
            },
        }
    }

    /// Validate that the configuration is internally consistent.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tokens.safety_margin < 0.0 || self.tokens.safety_margin > 1.0 {
            return Err(ConfigError::InvalidValue {
                field: "tokens.safety_margin".into(),
                value: self.tokens.safety_margin.to_string(),
                reason: "must be in [0, 1]".into(),
            });
        }
        if self.tokens.min_tokens_per_item > self.tokens.max_tokens_per_item {
            return Err(ConfigError::IncompatibleOptions {
                option_a: "tokens.min_tokens_per_item".into(),
                option_b: "tokens.max_tokens_per_item".into(),
            });
        }

        let tier_sum = self.cache.l1_share + self.cache.l2_share + self.cache.l3_share;
        if (tier_sum - 1.0).abs() > 1e-3 {
            return Err(ConfigError::InvalidValue {
                field: "cache.{l1,l2,l3}_share".into(),
                value: tier_sum.to_string(),
                reason: "tier shares must sum to 1.0".into(),
            });
        }
        if self.cache.memory_pressure_threshold <= 0.0
            || self.cache.memory_pressure_threshold > 1.0
        {
            return Err(ConfigError::InvalidValue {
                field: "cache.memory_pressure_threshold".into(),
                value: self.cache.memory_pressure_threshold.to_string(),
                reason: "must be in (0, 1]".into(),
            });
        }

        if self.memory.heap_warning_threshold >= self.memory.heap_high_threshold
            || self.memory.heap_high_threshold >= self.memory.heap_critical_threshold
        {
            return Err(ConfigError::IncompatibleOptions {
                option_a: "memory.heap_warning_threshold".into(),
                option_b: "memory.heap_critical_threshold".into(),
            });
        }

        let weight_sum = self.search.default_semantic_weight + self.search.default_fts_weight;
        if (weight_sum - 1.0).abs() > 1e-3 {
            return Err(ConfigError::InvalidValue {
                field: "search.default_{semantic,fts}_weight".into(),
                value: weight_sum.to_string(),
                reason: "weights must sum to 1.0".into(),
            });
        }
        if self.search.semantic_threshold < 0.0 || self.search.semantic_threshold > 1.0 {
            return Err(ConfigError::InvalidValue {
                field: "search.semantic_threshold".into(),
                value: self.search.semantic_threshold.to_string(),
                reason: "must be in [0, 1]".into(),
            });
        }

        if self.assembly.default_max_tokens < 100 {
            return Err(ConfigError::InvalidValue {
                field: "assembly.default_max_tokens".into(),
                value: self.assembly.default_max_tokens.to_string(),
                reason: "must be >= 100".into(),
            });
        }

        Ok(())
    }
}
