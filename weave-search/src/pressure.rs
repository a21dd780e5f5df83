//! Memory Pressure Monitor (C10): reports process memory stats and a
//! coarse pressure label, and drives the cache's adaptive-sizing and
//! pressure-cleanup paths.
//!
//! "Heap" has no literal counterpart in a Rust binary the way it does in a
//! garbage-collected runtime, so `heap_total`/`heap_used` are reinterpreted
//! here as the aggregate byte budget and usage across every registered
//! `MultiTierCache` instance — the memory this engine actually manages.
//! `rss` comes from `sysinfo` process introspection. `external` and
//! `array_buffers` stay at zero; nothing in this process instruments
//! allocator-level buffer accounting.

use std::sync::Mutex;
use std::time::Duration;
use sysinfo::{MemoryRefreshKind, Pid, RefreshKind, System};
use weave_cache::PressureLevel;
use weave_core::{MemoryConfig, PressureEvent, PressureEventBroadcaster, Timestamp};

/// A snapshot of process and cache memory (spec §4.10 "Stats").
#[derive(Debug, Clone, Copy)]
pub struct MemoryStats {
    pub rss: u64,
    pub heap_total: u64,
    pub heap_used: u64,
    pub external: u64,
    pub array_buffers: u64,
    pub timestamp: Timestamp,
}

/// Returned by `pressure()` (spec §4.10 "Operations").
#[derive(Debug, Clone)]
pub struct PressureReport {
    pub level: PressureLevel,
    pub heap_percent: f32,
    pub rss_percent: f32,
    pub recommendation: String,
}

fn recommendation_for(level: PressureLevel) -> &'static str {
    match level {
        PressureLevel::Low => "memory usage is healthy",
        PressureLevel::Medium => "consider reducing cache TTLs or warming fewer keys",
        PressureLevel::High => "evict cold cache entries; avoid new large warm operations",
        PressureLevel::Critical => "force a cleanup pass immediately; degrade gracefully where possible",
    }
}

/// Classify a snapshot against the configured thresholds (spec §4.10
/// "Pressure levels").
fn classify(heap_used: u64, heap_total: u64, rss: u64, config: &MemoryConfig) -> PressureLevel {
    let heap_ratio = if heap_total == 0 {
        0.0
    } else {
        heap_used as f32 / heap_total as f32
    };
    if heap_ratio >= config.heap_critical_threshold || rss >= config.max_rss_bytes {
        PressureLevel::Critical
    } else if heap_ratio >= config.heap_high_threshold {
        PressureLevel::High
    } else if heap_ratio >= config.heap_warning_threshold {
        PressureLevel::Medium
    } else {
        PressureLevel::Low
    }
}

type HeapSource = Box<dyn Fn() -> (u64, u64) + Send + Sync>;
type CleanupCallback = Box<dyn Fn() + Send + Sync>;
type PressureHandler = Box<dyn Fn(&PressureReport) + Send + Sync>;

struct MonitorState {
    system: System,
    pid: Pid,
    heap_sources: Vec<HeapSource>,
    cleanup_callbacks: Vec<CleanupCallback>,
    handlers: Vec<PressureHandler>,
    last_level: Option<PressureLevel>,
}

/// Observes process memory and signals pressure levels to every registered
/// cache and handler (spec §4.10). Runs as a background task started at
/// service construction and stopped at teardown (§9).
pub struct MemoryPressureMonitor {
    config: MemoryConfig,
    events: PressureEventBroadcaster,
    state: Mutex<MonitorState>,
}

impl MemoryPressureMonitor {
    pub fn new(config: MemoryConfig, events: PressureEventBroadcaster) -> Self {
        let mut system =
            System::new_with_specifics(RefreshKind::new().with_memory(MemoryRefreshKind::new().with_ram()));
        system.refresh_all();
        let pid = sysinfo::get_current_pid().unwrap_or_else(|_| Pid::from_u32(0));
        Self {
            config,
            events,
            state: Mutex::new(MonitorState {
                system,
                pid,
                heap_sources: Vec::new(),
                cleanup_callbacks: Vec::new(),
                handlers: Vec::new(),
                last_level: None,
            }),
        }
    }

    /// Register a cache (or other byte-budgeted subsystem) whose
    /// `(bytes_used, capacity)` contributes to `heap_used`/`heap_total`.
    pub fn register_heap_source(&self, source: HeapSource) {
        self.state.lock().unwrap().heap_sources.push(source);
    }

    /// Register a callback invoked by `force_gc()` (spec §4.10
    /// "configurable set of cleanup callbacks").
    pub fn register_cleanup(&self, callback: CleanupCallback) {
        self.state.lock().unwrap().cleanup_callbacks.push(callback);
    }

    /// Register a handler invoked whenever pressure transitions to
    /// medium-or-higher (spec §4.10 `on_pressure`). Handlers run on the
    /// monitor's own task, never the caller's (spec §5).
    pub fn on_pressure(&self, handler: PressureHandler) {
        self.state.lock().unwrap().handlers.push(handler);
    }

    /// Current process and aggregate cache memory (spec §4.10
    /// `current_stats`).
    pub fn current_stats(&self) -> MemoryStats {
        let mut state = self.state.lock().unwrap();
        state.system.refresh_memory();
        state.system.refresh_processes(sysinfo::ProcessesToUpdate::All);
        let rss = state
            .system
            .process(state.pid)
            .map(|p| p.memory())
            .unwrap_or(0);
        let (heap_used, heap_total) = state
            .heap_sources
            .iter()
            .map(|source| source())
            .fold((0u64, 0u64), |(used, total), (u, t)| (used + u, total + t));
        MemoryStats {
            rss,
            heap_total,
            heap_used,
            external: 0,
            array_buffers: 0,
            timestamp: chrono::Utc::now(),
        }
    }

    /// Classify a snapshot, or a fresh one if none is given (spec §4.10
    /// `pressure`).
    pub fn pressure(&self, stats: Option<MemoryStats>) -> PressureReport {
        let stats = stats.unwrap_or_else(|| self.current_stats());
        let level = classify(stats.heap_used, stats.heap_total, stats.rss, &self.config);
        let heap_percent = if stats.heap_total == 0 {
            0.0
        } else {
            stats.heap_used as f32 / stats.heap_total as f32
        };
        let rss_percent = if self.config.max_rss_bytes == 0 {
            0.0
        } else {
            stats.rss as f32 / self.config.max_rss_bytes as f32
        };
        PressureReport {
            level,
            heap_percent,
            rss_percent,
            recommendation: recommendation_for(level).to_string(),
        }
    }

    /// Invoke every registered cleanup callback (spec §4.10 `force_gc`).
    /// Rust has no runtime GC hook to additionally trigger.
    pub fn force_gc(&self) {
        let callbacks_len = {
            let state = self.state.lock().unwrap();
            state.cleanup_callbacks.len()
        };
        for i in 0..callbacks_len {
            let state = self.state.lock().unwrap();
            let callback = &state.cleanup_callbacks[i];
            callback();
        }
        tracing::debug!(count = callbacks_len, "force_gc invoked cleanup callbacks");
    }

    /// One polling tick: compute the current report, fire handlers on a
    /// transition to medium-or-higher, and publish a `PressureEvent`.
    fn tick(&self) {
        let report = self.pressure(None);
        let mut state = self.state.lock().unwrap();
        let transitioned_up = !matches!(
            (state.last_level, report.level),
            (Some(PressureLevel::Medium | PressureLevel::High | PressureLevel::Critical), _)
        ) && matches!(
            report.level,
            PressureLevel::Medium | PressureLevel::High | PressureLevel::Critical
        );
        state.last_level = Some(report.level);
        let handlers_fire = transitioned_up;
        drop(state);

        if handlers_fire {
            let state = self.state.lock().unwrap();
            for handler in &state.handlers {
                handler(&report);
            }
            drop(state);
            self.events.publish(PressureEvent {
                level: format!("{:?}", report.level).to_lowercase(),
                heap_percent: report.heap_percent,
                rss_percent: report.rss_percent,
            });
        }
    }

    /// Spawn the background polling task at the configured interval (spec
    /// §4.10 "Monitor runs at a configurable interval"). The returned
    /// handle should be aborted at service teardown (spec §9).
    pub fn spawn(self: std::sync::Arc<Self>) -> tokio::task::JoinHandle<()> {
        let interval = Duration::from_millis(self.config.monitoring_interval_ms.max(1) as u64);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                self.tick();
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn config() -> MemoryConfig {
        MemoryConfig::default()
    }

    #[test]
    fn classifies_low_below_warning_threshold() {
        let level = classify(50, 1000, 0, &config());
        assert_eq!(level, PressureLevel::Low);
    }

    #[test]
    fn classifies_medium_between_warning_and_high() {
        let level = classify(750, 1000, 0, &config());
        assert_eq!(level, PressureLevel::Medium);
    }

    #[test]
    fn classifies_high_between_high_and_critical() {
        let level = classify(900, 1000, 0, &config());
        assert_eq!(level, PressureLevel::High);
    }

    #[test]
    fn classifies_critical_at_or_above_threshold() {
        let level = classify(960, 1000, 0, &config());
        assert_eq!(level, PressureLevel::Critical);
    }

    #[test]
    fn rss_at_or_above_max_forces_critical_even_with_low_heap() {
        let cfg = config();
        let level = classify(10, 1000, cfg.max_rss_bytes, &cfg);
        assert_eq!(level, PressureLevel::Critical);
    }

    #[test]
    fn pressure_aggregates_registered_heap_sources() {
        let monitor = MemoryPressureMonitor::new(config(), PressureEventBroadcaster::default());
        monitor.register_heap_source(Box::new(|| (300, 1000)));
        monitor.register_heap_source(Box::new(|| (200, 1000)));
        let stats = monitor.current_stats();
        assert_eq!(stats.heap_used, 500);
        assert_eq!(stats.heap_total, 2000);
    }

    #[test]
    fn force_gc_invokes_every_registered_callback() {
        let monitor = MemoryPressureMonitor::new(config(), PressureEventBroadcaster::default());
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_a = calls.clone();
        let calls_b = calls.clone();
        monitor.register_cleanup(Box::new(move || {
            calls_a.fetch_add(1, Ordering::SeqCst);
        }));
        monitor.register_cleanup(Box::new(move || {
            calls_b.fetch_add(1, Ordering::SeqCst);
        }));
        monitor.force_gc();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn tick_fires_handlers_only_on_transition_into_medium_or_higher() {
        let monitor = MemoryPressureMonitor::new(config(), PressureEventBroadcaster::default());
        let used = Arc::new(std::sync::atomic::AtomicU64::new(50));
        let used_read = used.clone();
        monitor.register_heap_source(Box::new(move || {
            (used_read.load(Ordering::SeqCst), 1000)
        }));
        let fire_count = Arc::new(AtomicUsize::new(0));
        let fire_count_handler = fire_count.clone();
        monitor.on_pressure(Box::new(move |_report| {
            fire_count_handler.fetch_add(1, Ordering::SeqCst);
        }));

        monitor.tick();
        assert_eq!(fire_count.load(Ordering::SeqCst), 0);

        used.store(750, Ordering::SeqCst);
        monitor.tick();
        assert_eq!(fire_count.load(Ordering::SeqCst), 1);

        monitor.tick();
        assert_eq!(fire_count.load(Ordering::SeqCst), 1, "stays medium, no re-fire");

        used.store(50, Ordering::SeqCst);
        monitor.tick();
        used.store(900, Ordering::SeqCst);
        monitor.tick();
        assert_eq!(fire_count.load(Ordering::SeqCst), 2, "re-fires after dropping back to low");
    }
}
