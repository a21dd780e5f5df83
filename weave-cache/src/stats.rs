//! Cache statistics and efficiency reporting (spec §4.8 `get_stats`).

use serde::{Deserialize, Serialize};

/// Hit/miss/eviction counters for one tier.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TierStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub promotions: u64,
    pub demotions: u64,
    pub entry_count: u64,
    pub bytes_used: u64,
}

impl TierStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Derived efficiency metrics, computed from the raw per-tier counters.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct EfficiencyStats {
    pub memory_utilization: f64,
    pub average_entry_size: f64,
    pub hot_data_ratio: f64,
}

/// Snapshot returned by `get_stats`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    pub l1: TierStats,
    pub l2: TierStats,
    pub l3: TierStats,
    pub efficiency: EfficiencyStats,
    pub recommendations: Vec<String>,
}

impl CacheStats {
    pub fn global_hit_rate(&self) -> f64 {
        let hits = self.l1.hits + self.l2.hits + self.l3.hits;
        let total = hits + self.l1.misses + self.l2.misses + self.l3.misses;
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }

    /// Textual recommendations derived from the raw counters, matching the
    /// advisory style the teacher's statistics modules use elsewhere.
    pub fn compute_recommendations(&mut self, max_total_bytes: u64) {
        let mut out = Vec::new();
        let used = self.l1.bytes_used + self.l2.bytes_used + self.l3.bytes_used;
        self.efficiency.memory_utilization = if max_total_bytes == 0 {
            0.0
        } else {
            used as f64 / max_total_bytes as f64
        };
        let entries = self.l1.entry_count + self.l2.entry_count + self.l3.entry_count;
        self.efficiency.average_entry_size = if entries == 0 {
            0.0
        } else {
            used as f64 / entries as f64
        };
        self.efficiency.hot_data_ratio = if entries == 0 {
            0.0
        } else {
            self.l1.entry_count as f64 / entries as f64
        };

        if self.global_hit_rate() < 0.5 {
            out.push("hit rate is below 50%; consider warming frequently accessed keys".into());
        }
        if self.efficiency.memory_utilization > 0.9 {
            out.push("cache is near capacity; consider raising max_total_memory_bytes".into());
        }
        if self.efficiency.hot_data_ratio < 0.05 && entries > 0 {
            out.push("L1 holds very little of the working set; check promotion thresholds".into());
        }
        self.recommendations = out;
    }
}
