//! Generic multi-tier cache (C8): L1 (hot, LFU) / L2 (warm, TLRU) / L3
//! (cold, LRU), with promotion, demotion, adaptive sizing, memory-pressure
//! response, and single-flight loading. Generic over the cached value so
//! one implementation backs both the context assembler and the hybrid
//! search engine, each with its own instance.
//!
//! Every operation is best-effort: a cache failure never propagates to the
//! caller (spec §4.8 "Failure model"). Internally, all tier mutations
//! share one mutex; `get` takes the same lock only for the duration of its
//! stats update, matching the linearizability requirement in spec §5
//! without a separate reader/writer split.

mod entry;
mod stats;
mod waiter;

pub use entry::{CacheEntry, EvictionPolicy, Priority, SetOptions, Tier};
pub use stats::{CacheStats, EfficiencyStats, TierStats};

use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;
use waiter::WaiterRegistry;
use weave_core::{CacheConfig, CacheError, CacheEvent, CacheEventBroadcaster};

/// Coarse pressure level, mirrored from the memory pressure monitor (C10)
/// so this crate has no direct dependency on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PressureLevel {
    Low,
    Medium,
    High,
    Critical,
}

type BoxFuture<V> = std::pin::Pin<Box<dyn Future<Output = Option<V>> + Send>>;

/// One warming task: a key, the loader that fills it, and the priority to
/// store it at (spec §4.8 `warm_cache`).
pub struct WarmEntry<V> {
    pub key: String,
    pub priority: Priority,
    pub loader: Box<dyn FnOnce() -> BoxFuture<V> + Send>,
}

/// Report returned by `optimize()`.
#[derive(Debug, Clone, Default)]
pub struct OptimizeReport {
    pub expired_removed: u64,
    pub rebalanced: u64,
}

struct TierMap<V> {
    entries: HashMap<String, CacheEntry<V>>,
    max_bytes: u64,
    stats: stats::TierStats,
}

impl<V> TierMap<V> {
    fn new(max_bytes: u64) -> Self {
        Self {
            entries: HashMap::new(),
            max_bytes,
            stats: stats::TierStats::default(),
        }
    }

    fn bytes_used(&self) -> u64 {
        self.entries.values().map(|e| e.size_bytes).sum()
    }
}

struct State<V> {
    l1: TierMap<V>,
    l2: TierMap<V>,
    l3: TierMap<V>,
    /// Access counts per key surviving across tiers/deletes, used by `set`'s
    /// "bias toward L1 if frequency > 10" rule (§4.8 "Operations").
    access_history: HashMap<String, u64>,
}

impl<V> State<V> {
    fn tier_mut(&mut self, tier: Tier) -> &mut TierMap<V> {
        match tier {
            Tier::L1 => &mut self.l1,
            Tier::L2 => &mut self.l2,
            Tier::L3 => &mut self.l3,
        }
    }

    fn tier(&self, tier: Tier) -> &TierMap<V> {
        match tier {
            Tier::L1 => &self.l1,
            Tier::L2 => &self.l2,
            Tier::L3 => &self.l3,
        }
    }
}

/// Generic multi-tier cache. `V` must be cheap to clone (a copy is handed
/// back from `get`) and serializable, so entries without a caller-supplied
/// `size` can still be estimated.
pub struct MultiTierCache<V: Clone + Send + Sync + Serialize + 'static> {
    state: Mutex<State<V>>,
    config: CacheConfig,
    events: CacheEventBroadcaster,
    waiters: WaiterRegistry,
}

impl<V: Clone + Send + Sync + Serialize + 'static> MultiTierCache<V> {
    pub fn new(config: CacheConfig, events: CacheEventBroadcaster) -> Self {
        let state = State {
            l1: TierMap::new(config.l1_bytes()),
            l2: TierMap::new(config.l2_bytes()),
            l3: TierMap::new(config.l3_bytes()),
            access_history: HashMap::new(),
        };
        Self {
            state: Mutex::new(state),
            config,
            events,
            waiters: WaiterRegistry::new(),
        }
    }

    fn estimate_size(value: &V, hint: Option<u64>) -> u64 {
        if let Some(size) = hint {
            return size;
        }
        match serde_json::to_vec(value) {
            Ok(bytes) => (bytes.len() as u64) * 2,
            Err(e) => {
                tracing::debug!(error = %e, "cache size estimation failed, using fallback");
                1024
            }
        }
    }

    /// Scan L1 -> L2 -> L3; on hit, update access stats, consider
    /// promotion, and return a clone of the value (spec §4.8 `get`).
    pub fn get(&self, key: &str) -> Option<V> {
        let mut state = self.state.lock().unwrap();
        for tier in [Tier::L1, Tier::L2, Tier::L3] {
            let expired = state.tier(tier).entries.get(key).map(|e| e.is_expired());
            match expired {
                Some(true) => {
                    state.tier_mut(tier).entries.remove(key);
                    state.tier_mut(tier).stats.misses += 1;
                    continue;
                }
                Some(false) => {
                    let value = {
                        let entry = state.tier_mut(tier).entries.get_mut(key).unwrap();
                        entry.touch();
                        entry.value.clone()
                    };
                    state.tier_mut(tier).stats.hits += 1;
                    *state.access_history.entry(key.to_string()).or_insert(0) += 1;
                    self.consider_promotion(&mut state, key, tier);
                    return Some(value);
                }
                None => {
                    state.tier_mut(tier).stats.misses += 1;
                }
            }
        }
        None
    }

    fn consider_promotion(&self, state: &mut State<V>, key: &str, tier: Tier) {
        if tier == Tier::L1 {
            return;
        }
        let Some(entry) = state.tier(tier).entries.get(key) else {
            return;
        };
        let recent = entry.last_access.elapsed().as_secs_f64() < 60.0;
        let frequent = entry.access_count > 10 && recent;
        let critical_elsewhere = entry.priority == Priority::Critical;
        let rate_threshold = match tier {
            Tier::L3 => entry.access_rate_per_sec() > 0.01,
            Tier::L2 => entry.access_rate_per_sec() > 0.1,
            Tier::L1 => false,
        };
        if !(frequent || critical_elsewhere || rate_threshold) {
            return;
        }
        let Some(target) = tier.higher() else { return };
        self.move_between_tiers(state, key, tier, target, true);
    }

    fn move_between_tiers(
        &self,
        state: &mut State<V>,
        key: &str,
        from: Tier,
        to: Tier,
        is_promotion: bool,
    ) {
        let Some(mut entry) = state.tier_mut(from).entries.remove(key) else {
            return;
        };
        self.ensure_space(state, to, entry.size_bytes, Some(key));
        entry.tier = to;
        if is_promotion {
            state.tier_mut(from).stats.promotions += 1;
        } else {
            state.tier_mut(from).stats.demotions += 1;
        }
        state.tier_mut(to).entries.insert(key.to_string(), entry);
        self.events.publish(if is_promotion {
            CacheEvent::Promoted {
                key: key.to_string(),
                from: from.as_str().into(),
                to: to.as_str().into(),
            }
        } else {
            CacheEvent::Demoted {
                key: key.to_string(),
                from: from.as_str().into(),
                to: to.as_str().into(),
            }
        });
        tracing::debug!(key, from = from.as_str(), to = to.as_str(), is_promotion, "cache tier transition");
    }

    /// Choose the initial tier, remove any stale copy from other tiers
    /// (exclusive residence), evict to make room, and insert.
    pub fn set(&self, key: &str, value: V, opts: SetOptions) {
        let size = Self::estimate_size(&value, opts.size);
        let ttl_ms = opts.ttl_ms.unwrap_or(self.config.default_ttl_ms);
        let mut state = self.state.lock().unwrap();

        for tier in [Tier::L1, Tier::L2, Tier::L3] {
            state.tier_mut(tier).entries.remove(key);
        }

        let frequent = state.access_history.get(key).copied().unwrap_or(0) > 10;
        let mut tier = opts.priority.initial_tier();
        if frequent && tier != Tier::L1 {
            tier = Tier::L1;
        }

        self.ensure_space(&mut state, tier, size, Some(key));
        let entry = CacheEntry::new(value, tier, opts.priority, ttl_ms, size);
        state.tier_mut(tier).entries.insert(key.to_string(), entry);
        self.events.publish(CacheEvent::Set {
            key: key.to_string(),
            tier: tier.as_str().into(),
        });
    }

    /// Evict (attempting demotion first) until `tier` has room for
    /// `needed_bytes`, excluding `protect_key` from eviction consideration.
    fn ensure_space(&self, state: &mut State<V>, tier: Tier, needed_bytes: u64, protect_key: Option<&str>) {
        let max_bytes = state.tier(tier).max_bytes;
        if needed_bytes > max_bytes {
            return;
        }
        loop {
            let used = state.tier(tier).bytes_used();
            if used + needed_bytes <= max_bytes {
                return;
            }
            let Some(victim_key) = self.select_victim(state, tier, protect_key) else {
                return;
            };
            if let Some(lower) = tier.lower() {
                let victim_size = state.tier(tier).entries.get(&victim_key).map(|e| e.size_bytes).unwrap_or(0);
                if state.tier(lower).bytes_used() + victim_size <= state.tier(lower).max_bytes {
                    self.move_between_tiers(state, &victim_key, tier, lower, false);
                    continue;
                }
            }
            state.tier_mut(tier).entries.remove(&victim_key);
            state.tier_mut(tier).stats.evictions += 1;
            self.events.publish(CacheEvent::Evicted {
                key: victim_key,
                tier: tier.as_str().into(),
            });
        }
    }

    fn select_victim(&self, state: &State<V>, tier: Tier, protect_key: Option<&str>) -> Option<String> {
        let policy = tier.default_policy();
        let candidates = state.tier(tier).entries.iter().filter(|(k, _)| Some(k.as_str()) != protect_key);
        match policy {
            EvictionPolicy::Lru => candidates
                .max_by(|(_, a), (_, b)| a.last_access.elapsed().partial_cmp(&b.last_access.elapsed()).unwrap())
                .map(|(k, _)| k.clone()),
            EvictionPolicy::Lfu => candidates
                .min_by(|(_, a), (_, b)| {
                    a.access_count
                        .cmp(&b.access_count)
                        .then_with(|| b.last_access.cmp(&a.last_access))
                })
                .map(|(k, _)| k.clone()),
            EvictionPolicy::Tlru => candidates
                .max_by(|(_, a), (_, b)| {
                    a.tlru_score()
                        .partial_cmp(&b.tlru_score())
                        .unwrap()
                        .then_with(|| b.access_count.cmp(&a.access_count))
                })
                .map(|(k, _)| k.clone()),
        }
    }

    pub fn delete(&self, key: &str) {
        let mut state = self.state.lock().unwrap();
        for tier in [Tier::L1, Tier::L2, Tier::L3] {
            state.tier_mut(tier).entries.remove(key);
        }
        state.access_history.remove(key);
    }

    pub fn clear(&self) {
        let mut state = self.state.lock().unwrap();
        state.l1 = TierMap::new(self.config.l1_bytes());
        state.l2 = TierMap::new(self.config.l2_bytes());
        state.l3 = TierMap::new(self.config.l3_bytes());
        state.access_history.clear();
        self.events.publish(CacheEvent::Cleared);
    }

    pub fn get_stats(&self) -> CacheStats {
        let state = self.state.lock().unwrap();
        let mut stats = CacheStats {
            l1: state.l1.stats,
            l2: state.l2.stats,
            l3: state.l3.stats,
            ..Default::default()
        };
        stats.l1.entry_count = state.l1.entries.len() as u64;
        stats.l2.entry_count = state.l2.entries.len() as u64;
        stats.l3.entry_count = state.l3.entries.len() as u64;
        stats.l1.bytes_used = state.l1.bytes_used();
        stats.l2.bytes_used = state.l2.bytes_used();
        stats.l3.bytes_used = state.l3.bytes_used();
        let total_max = self.config.max_total_memory_bytes;
        stats.compute_recommendations(total_max);
        stats
    }

    /// Drop expired entries and compact stale access-pattern metadata
    /// (spec §4.8 `optimize`). Tier rebalancing beyond expiry removal is
    /// driven by `get`'s own promotion/demotion path.
    pub fn optimize(&self) -> OptimizeReport {
        let mut state = self.state.lock().unwrap();
        let mut expired_removed = 0u64;
        for tier in [Tier::L1, Tier::L2, Tier::L3] {
            let expired_keys: Vec<String> = state
                .tier(tier)
                .entries
                .iter()
                .filter(|(_, e)| e.is_expired())
                .map(|(k, _)| k.clone())
                .collect();
            expired_removed += expired_keys.len() as u64;
            for key in expired_keys {
                state.tier_mut(tier).entries.remove(&key);
            }
        }
        let live: std::collections::HashSet<String> = [Tier::L1, Tier::L2, Tier::L3]
            .into_iter()
            .flat_map(|t| state.tier(t).entries.keys().cloned().collect::<Vec<_>>())
            .collect();
        let before = state.access_history.len();
        state.access_history.retain(|k, _| live.contains(k));
        let rebalanced = (before - state.access_history.len()) as u64;
        OptimizeReport {
            expired_removed,
            rebalanced,
        }
    }

    /// Memory-pressure response (spec §4.8 "Pressure event handler"): clear
    /// L3 on high/critical; additionally halve L2 (keeping the
    /// more-recently-accessed half) on critical.
    pub fn handle_pressure(&self, level: PressureLevel) {
        if !matches!(level, PressureLevel::High | PressureLevel::Critical) {
            return;
        }
        let mut state = self.state.lock().unwrap();
        let freed_l3 = state.l3.bytes_used();
        state.l3 = TierMap::new(self.config.l3_bytes());

        let mut freed = freed_l3;
        if level == PressureLevel::Critical {
            let mut entries: Vec<(String, std::time::Instant)> = state
                .l2
                .entries
                .iter()
                .map(|(k, e)| (k.clone(), e.last_access))
                .collect();
            entries.sort_by_key(|(_, last_access)| std::cmp::Reverse(*last_access));
            let keep = entries.len() / 2;
            for (key, _) in entries.into_iter().skip(keep) {
                if let Some(e) = state.l2.entries.remove(&key) {
                    freed += e.size_bytes;
                }
            }
        }
        drop(state);
        self.events.publish(CacheEvent::PressureCleanup {
            memory_freed: freed,
            pressure_level: format!("{:?}", level).to_lowercase(),
        });
    }

    /// Shrink (high/critical) or grow (low, with poor hit rate) every
    /// tier's max size by a fixed factor (spec §4.8 "Adaptive sizing").
    pub fn adaptive_resize(&self, level: PressureLevel, heap_headroom_bytes: u64) {
        if !self.config.enable_adaptive_sizing {
            return;
        }
        let global_hit_rate = self.get_stats().global_hit_rate();
        let factor = match level {
            PressureLevel::High | PressureLevel::Critical => 0.8,
            PressureLevel::Low if global_hit_rate < 0.8 => 1.2,
            _ => return,
        };
        let mut state = self.state.lock().unwrap();
        let cap = (heap_headroom_bytes as f64 * 0.5) as u64;
        for tier in [Tier::L1, Tier::L2, Tier::L3] {
            let current = state.tier(tier).max_bytes;
            let mut new_max = (current as f64 * factor) as u64;
            if factor > 1.0 {
                let total_if_applied: u64 = [Tier::L1, Tier::L2, Tier::L3]
                    .into_iter()
                    .map(|t| if t == tier { new_max } else { state.tier(t).max_bytes })
                    .sum();
                if total_if_applied > cap {
                    new_max = current;
                }
            }
            state.tier_mut(tier).max_bytes = new_max;
            if factor < 1.0 {
                self.ensure_space(&mut state, tier, 0, None);
            }
        }
        drop(state);
        self.events.publish(CacheEvent::Resized {
            action: if factor > 1.0 { "grow".into() } else { "shrink".into() },
            factor,
        });
    }

    /// Single-flight `get`-or-compute: concurrent callers for the same key
    /// share one in-flight computation rather than issuing duplicate
    /// loads (spec §5 "at most one concurrent compute-and-set for the same
    /// key").
    pub async fn get_or_compute<F, Fut>(&self, key: &str, opts: SetOptions, loader: F) -> Option<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Option<V>>,
    {
        if let Some(hit) = self.get(key) {
            return Some(hit);
        }
        match self.waiters.acquire(key) {
            waiter::Lease::Leader(notify) => {
                let result = loader().await;
                if let Some(ref value) = result {
                    self.set(key, value.clone(), opts);
                }
                self.waiters.release(key, notify);
                result
            }
            waiter::Lease::Follower(notify) => {
                notify.notified().await;
                self.get(key)
            }
        }
    }

    /// For each entry not currently present, invoke its loader and `set`
    /// with the entry's priority and a fixed cost of 5 (spec §4.8
    /// `warm_cache`).
    pub async fn warm_cache(&self, entries: Vec<WarmEntry<V>>) -> usize {
        let mut warmed = 0usize;
        for entry in entries {
            if self.get(&entry.key).is_some() {
                continue;
            }
            if let Some(value) = (entry.loader)().await {
                self.set(
                    &entry.key,
                    value,
                    SetOptions {
                        priority: entry.priority,
                        cost: Some(5.0),
                        ..Default::default()
                    },
                );
                warmed += 1;
            }
        }
        if warmed > 0 {
            self.events.publish(CacheEvent::Warmed { count: warmed });
        }
        warmed
    }

    pub fn l1_len(&self) -> usize {
        self.state.lock().unwrap().l1.entries.len()
    }
    pub fn l2_len(&self) -> usize {
        self.state.lock().unwrap().l2.entries.len()
    }
    pub fn l3_len(&self) -> usize {
        self.state.lock().unwrap().l3.entries.len()
    }
}

/// Catches and logs a `CacheError` instead of propagating it, matching the
/// "best-effort" failure model (spec §4.8 "Failure model").
pub fn swallow(result: Result<(), CacheError>) {
    if let Err(e) = result {
        tracing::warn!(error = %e, "cache operation failed, treating as miss/skip");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weave_core::CacheConfig;

    fn test_cache() -> MultiTierCache<String> {
        let mut config = CacheConfig {
            max_total_memory_bytes: 10_000,
            ..Default::default()
        };
        config.l1_share = 0.1;
        config.l2_share = 0.3;
        config.l3_share = 0.6;
        MultiTierCache::new(config, CacheEventBroadcaster::default())
    }

    #[test]
    fn set_then_get_hits() {
        let cache = test_cache();
        cache.set("k", "v".to_string(), SetOptions::default());
        assert_eq!(cache.get("k"), Some("v".to_string()));
    }

    #[test]
    fn get_miss_records_no_value() {
        let cache = test_cache();
        assert_eq!(cache.get("missing"), None);
    }

    #[test]
    fn delete_removes_from_all_tiers() {
        let cache = test_cache();
        cache.set("k", "v".to_string(), SetOptions::default());
        cache.delete("k");
        assert_eq!(cache.get("k"), None);
    }

    #[test]
    fn set_resets_access_stats_on_existing_key() {
        let cache = test_cache();
        cache.set("k", "v1".to_string(), SetOptions::default());
        cache.get("k");
        cache.get("k");
        cache.set(
            "k",
            "v2".to_string(),
            SetOptions {
                priority: Priority::Low,
                ..Default::default()
            },
        );
        let state = cache.state.lock().unwrap();
        let entry = state.l3.entries.get("k").expect("low priority lands in L3");
        assert_eq!(entry.access_count, 0);
    }

    #[test]
    fn critical_priority_lands_in_l1() {
        let cache = test_cache();
        cache.set(
            "k",
            "v".to_string(),
            SetOptions {
                priority: Priority::Critical,
                ..Default::default()
            },
        );
        assert_eq!(cache.l1_len(), 1);
    }

    #[test]
    fn clear_empties_every_tier_and_stats() {
        let cache = test_cache();
        cache.set("a", "1".to_string(), SetOptions::default());
        cache.set("b", "2".to_string(), SetOptions::default());
        cache.clear();
        assert_eq!(cache.l1_len() + cache.l2_len() + cache.l3_len(), 0);
    }

    #[tokio::test]
    async fn get_or_compute_deduplicates_concurrent_loads() {
        use std::sync::atomic::{AtomicU32, Ordering};
        use std::sync::Arc;

        let cache = Arc::new(test_cache());
        let calls = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..5 {
            let cache = cache.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_compute("shared", SetOptions::default(), || async {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                        Some("computed".to_string())
                    })
                    .await
            }));
        }
        for h in handles {
            assert_eq!(h.await.unwrap(), Some("computed".to_string()));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn pressure_cleanup_clears_l3_on_high() {
        let cache = test_cache();
        cache.set(
            "k",
            "v".to_string(),
            SetOptions {
                priority: Priority::Low,
                ..Default::default()
            },
        );
        assert_eq!(cache.l3_len(), 1);
        cache.handle_pressure(PressureLevel::High);
        assert_eq!(cache.l3_len(), 0);
    }
}
