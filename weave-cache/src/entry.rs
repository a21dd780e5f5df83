//! Tiers, priorities, and the per-entry bookkeeping the eviction and
//! promotion policies read from (spec §4.8).

use std::time::Instant;

/// Which of the three tiers an entry currently resides in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    L1,
    L2,
    L3,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::L1 => "l1",
            Tier::L2 => "l2",
            Tier::L3 => "l3",
        }
    }

    pub fn lower(&self) -> Option<Tier> {
        match self {
            Tier::L1 => Some(Tier::L2),
            Tier::L2 => Some(Tier::L3),
            Tier::L3 => None,
        }
    }

    pub fn higher(&self) -> Option<Tier> {
        match self {
            Tier::L1 => None,
            Tier::L2 => Some(Tier::L1),
            Tier::L3 => Some(Tier::L2),
        }
    }
}

/// Caller-supplied priority hint, used to choose the initial tier on `set`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Priority {
    Critical,
    High,
    #[default]
    Medium,
    Low,
}

impl Priority {
    pub fn initial_tier(&self) -> Tier {
        match self {
            Priority::Critical | Priority::High => Tier::L1,
            Priority::Medium => Tier::L2,
            Priority::Low => Tier::L3,
        }
    }
}

/// Per-tier eviction policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionPolicy {
    /// Least-Frequently-Used: evict the entry with the lowest `access_count`.
    Lfu,
    /// Time-aware LRU: evict by maximizing `age / max(access_count, 1)`.
    Tlru,
    /// Plain LRU: evict the entry with the oldest `last_access`.
    Lru,
}

impl Tier {
    pub fn default_policy(&self) -> EvictionPolicy {
        match self {
            Tier::L1 => EvictionPolicy::Lfu,
            Tier::L2 => EvictionPolicy::Tlru,
            Tier::L3 => EvictionPolicy::Lru,
        }
    }
}

/// Caller-supplied `set` options (spec §4.8 "Operations").
#[derive(Debug, Clone, Default)]
pub struct SetOptions {
    pub ttl_ms: Option<i64>,
    pub priority: Priority,
    pub cost: Option<f32>,
    pub size: Option<u64>,
}

/// One cached value plus the bookkeeping every eviction/promotion policy
/// reads. `Instant`-based so elapsed-time math never depends on wall clock
/// jumps; nothing here is serialized.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub tier: Tier,
    pub priority: Priority,
    pub created_at: Instant,
    pub last_access: Instant,
    pub access_count: u64,
    pub ttl_ms: i64,
    pub size_bytes: u64,
}

impl<V> CacheEntry<V> {
    pub fn new(value: V, tier: Tier, priority: Priority, ttl_ms: i64, size_bytes: u64) -> Self {
        let now = Instant::now();
        Self {
            value,
            tier,
            priority,
            created_at: now,
            last_access: now,
            access_count: 0,
            ttl_ms,
            size_bytes,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.created_at.elapsed().as_millis() as i64 >= self.ttl_ms
    }

    pub fn touch(&mut self) {
        self.last_access = Instant::now();
        self.access_count += 1;
    }

    pub fn access_rate_per_sec(&self) -> f64 {
        let age_secs = self.created_at.elapsed().as_secs_f64().max(1e-6);
        self.access_count as f64 / age_secs
    }

    /// TLRU score: `age_since_last_access / max(access_count, 1)`. Higher is
    /// more evictable (§4.8 "Eviction selection per tier policy").
    pub fn tlru_score(&self) -> f64 {
        self.last_access.elapsed().as_secs_f64() / (self.access_count.max(1) as f64)
    }
}
