//! Runtime metrics and instrumentation.
//!
//! Lock-free `AtomicU64` counters for graph construction and rendering,
//! a frame-time monitor for visualization sessions, and the span names used
//! with `tracing`. Counters export as Prometheus text.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::Mutex;

// ---------------------------------------------------------------------------
// Counters (lock-free)
// ---------------------------------------------------------------------------

/// Atomic counters incremented on the hot path and read on export.
#[derive(Debug)]
pub struct GraphCounters {
    /// Memories folded into a graph.
    pub memories_processed: AtomicU64,
    /// Concepts created.
    pub concepts_created: AtomicU64,
    /// Memory links created.
    pub links_created: AtomicU64,
    /// Full graph rebuilds.
    pub rebuilds: AtomicU64,
    /// Store reads or writes that failed.
    pub store_failures: AtomicU64,
    /// Force-directed layouts run.
    pub layouts_run: AtomicU64,
    /// Visualization frames generated.
    pub frames_generated: AtomicU64,
}

impl GraphCounters {
    /// Create a new set of zeroed counters.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            memories_processed: AtomicU64::new(0),
            concepts_created: AtomicU64::new(0),
            links_created: AtomicU64::new(0),
            rebuilds: AtomicU64::new(0),
            store_failures: AtomicU64::new(0),
            layouts_run: AtomicU64::new(0),
            frames_generated: AtomicU64::new(0),
        }
    }

    /// Add `n` to a counter.
    pub fn add(counter: &AtomicU64, n: usize) {
        counter.fetch_add(n as u64, Ordering::Relaxed);
    }

    /// Snapshot all counters for export.
    #[must_use]
    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            memories_processed: self.memories_processed.load(Ordering::Relaxed),
            concepts_created: self.concepts_created.load(Ordering::Relaxed),
            links_created: self.links_created.load(Ordering::Relaxed),
            rebuilds: self.rebuilds.load(Ordering::Relaxed),
            store_failures: self.store_failures.load(Ordering::Relaxed),
            layouts_run: self.layouts_run.load(Ordering::Relaxed),
            frames_generated: self.frames_generated.load(Ordering::Relaxed),
        }
    }
}

impl Default for GraphCounters {
    fn default() -> Self {
        Self::new()
    }
}

/// Counter values at a point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    /// Memories folded into a graph.
    pub memories_processed: u64,
    /// Concepts created.
    pub concepts_created: u64,
    /// Memory links created.
    pub links_created: u64,
    /// Full graph rebuilds.
    pub rebuilds: u64,
    /// Failed store operations.
    pub store_failures: u64,
    /// Force-directed layouts run.
    pub layouts_run: u64,
    /// Visualization frames generated.
    pub frames_generated: u64,
}

impl CounterSnapshot {
    /// Format as Prometheus-compatible text.
    #[must_use]
    pub fn to_prometheus(&self) -> String {
        let rows = [
            ("memories_processed", "Memories folded into a graph", self.memories_processed),
            ("concepts_created", "Concepts created", self.concepts_created),
            ("links_created", "Memory links created", self.links_created),
            ("rebuilds", "Full graph rebuilds", self.rebuilds),
            ("store_failures", "Failed store operations", self.store_failures),
            ("layouts_run", "Force-directed layouts run", self.layouts_run),
            ("frames_generated", "Visualization frames generated", self.frames_generated),
        ];
        let mut out = String::new();
        for (name, help, value) in rows {
            out.push_str(&format!(
                "# HELP mindscape_{name}_total {help}\n\
                 # TYPE mindscape_{name}_total counter\n\
                 mindscape_{name}_total {value}\n"
            ));
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Frame-time monitor
// ---------------------------------------------------------------------------

/// Ring buffer of recent frame-generation timings.
#[derive(Debug)]
pub struct FrameTimer {
    budget_ms: f64,
    history: Mutex<FrameHistory>,
}

#[derive(Debug)]
struct FrameHistory {
    timings: Vec<f64>,
    write_idx: usize,
    count: u64,
}

impl FrameTimer {
    /// Create a timer that tracks the last `capacity` frames against `budget_ms`.
    #[must_use]
    pub fn new(budget_ms: f64, capacity: usize) -> Self {
        Self {
            budget_ms,
            history: Mutex::new(FrameHistory {
                timings: vec![0.0; capacity.max(1)],
                write_idx: 0,
                count: 0,
            }),
        }
    }

    /// Begin timing a frame. The returned guard records on drop.
    pub fn begin(&self) -> FrameGuard<'_> {
        FrameGuard {
            timer: self,
            start: Instant::now(),
        }
    }

    /// Record a timing manually (milliseconds).
    pub fn record(&self, ms: f64) {
        let mut h = self.history.lock();
        let idx = h.write_idx;
        let len = h.timings.len();
        h.timings[idx] = ms;
        h.write_idx = (idx + 1) % len;
        h.count += 1;
    }

    /// Number of frames recorded.
    #[must_use]
    pub fn frame_count(&self) -> u64 {
        self.history.lock().count
    }

    /// Most recent timing, 0 if none.
    #[must_use]
    pub fn last_ms(&self) -> f64 {
        let h = self.history.lock();
        if h.count == 0 {
            return 0.0;
        }
        let idx = (h.write_idx + h.timings.len() - 1) % h.timings.len();
        h.timings[idx]
    }

    /// Fraction of buffered frames over budget.
    #[must_use]
    pub fn over_budget_ratio(&self) -> f64 {
        let h = self.history.lock();
        #[allow(clippy::cast_possible_truncation)]
        let n = (h.count as usize).min(h.timings.len());
        if n == 0 {
            return 0.0;
        }
        let over = h.timings[..n].iter().filter(|&&t| t > self.budget_ms).count();
        #[allow(clippy::cast_precision_loss)]
        let ratio = over as f64 / n as f64;
        ratio
    }
}

/// RAII guard that records elapsed time when dropped.
pub struct FrameGuard<'a> {
    timer: &'a FrameTimer,
    start: Instant,
}

impl Drop for FrameGuard<'_> {
    fn drop(&mut self) {
        self.timer.record(self.start.elapsed().as_secs_f64() * 1000.0);
    }
}

// ---------------------------------------------------------------------------
// Tracing span names
// ---------------------------------------------------------------------------

/// Span names used with `tracing::span!`.
pub mod spans {
    /// Processing one new memory.
    pub const PROCESS_MEMORY: &str = "mindscape::graph::process";
    /// Full graph rebuild.
    pub const REBUILD: &str = "mindscape::graph::rebuild";
    /// Knowledge-graph payload assembly.
    pub const KNOWLEDGE_GRAPH: &str = "mindscape::graph::knowledge";
    /// Force-directed layout.
    pub const FORCE_LAYOUT: &str = "mindscape::layout::force";
    /// Visualization frame generation.
    pub const FRAME: &str = "mindscape::viz::frame";
    /// Persistence save.
    pub const PERSIST_SAVE: &str = "mindscape::persist::save";
    /// Persistence load.
    pub const PERSIST_LOAD: &str = "mindscape::persist::load";
}
