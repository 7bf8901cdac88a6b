//! Processing-stage state machine.
//!
//! `Idle → Receiving → Retrieving → Processing → Responding → Idle`.
//!
//! Every transition bumps a monotonic generation token. The two automatic
//! transitions (`Receiving → Retrieving` and `Responding → Idle`) run on
//! fire-and-forget tokio timers that capture the generation they were
//! scheduled under and do nothing if it moved on in the meantime, so a
//! later event always wins over a stale timer.

use std::sync::Arc;
use std::time::Duration;

use mindscape_core::MemoryId;
use mindscape_core::config::StageConfig;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Coarse processing phase gating which thought flows are drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStage {
    /// Nothing in flight.
    #[default]
    Idle,
    /// A message just arrived.
    Receiving,
    /// Relevant memories are being retrieved.
    Retrieving,
    /// Retrieved memories are being processed.
    Processing,
    /// A response is being emitted.
    Responding,
}

impl ProcessingStage {
    /// Stable lowercase name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Receiving => "receiving",
            Self::Retrieving => "retrieving",
            Self::Processing => "processing",
            Self::Responding => "responding",
        }
    }
}

impl std::fmt::Display for ProcessingStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Default)]
struct StageState {
    stage: ProcessingStage,
    generation: u64,
    forced: Vec<MemoryId>,
}

impl StageState {
    fn enter(&mut self, stage: ProcessingStage) -> u64 {
        self.stage = stage;
        self.generation += 1;
        self.generation
    }
}

/// Shared, cheaply cloneable handle to one session's stage state.
#[derive(Debug, Clone)]
pub struct StageMachine {
    state: Arc<Mutex<StageState>>,
    config: StageConfig,
}

impl StageMachine {
    /// Create a machine in `Idle`.
    #[must_use]
    pub fn new(config: StageConfig) -> Self {
        Self {
            state: Arc::new(Mutex::new(StageState::default())),
            config,
        }
    }

    /// Current stage.
    #[must_use]
    pub fn stage(&self) -> ProcessingStage {
        self.state.lock().stage
    }

    /// Current generation token.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.state.lock().generation
    }

    /// Ids pushed by the last completed retrieval, in rank order.
    #[must_use]
    pub fn forced(&self) -> Vec<MemoryId> {
        self.state.lock().forced.clone()
    }

    /// Move to `stage` unconditionally. Pending timers become stale.
    /// Returns the new generation.
    pub fn set_stage(&self, stage: ProcessingStage) -> u64 {
        let generation = self.state.lock().enter(stage);
        debug!(stage = %stage, generation, "stage set");
        generation
    }

    /// A message arrived: enter `Receiving` and auto-advance to
    /// `Retrieving` after the receive delay.
    pub fn message_received(&self) -> u64 {
        let generation = self.set_stage(ProcessingStage::Receiving);
        let state = Arc::clone(&self.state);
        let delay = Duration::from_millis(self.config.receive_delay_ms);
        self.spawn_timer(async move {
            tokio::time::sleep(delay).await;
            let mut s = state.lock();
            if s.generation == generation {
                let next = s.enter(ProcessingStage::Retrieving);
                debug!(generation = next, "receive delay elapsed, retrieving");
            }
        });
        generation
    }

    /// Retrieval finished: enter `Processing` with `ids` as the forced
    /// activation list.
    pub fn retrieval_complete(&self, ids: Vec<MemoryId>) -> u64 {
        let mut s = self.state.lock();
        s.forced = ids;
        let generation = s.enter(ProcessingStage::Processing);
        debug!(generation, forced = s.forced.len(), "retrieval complete");
        generation
    }

    /// Response finished: enter `Responding`, return to `Idle` after the
    /// respond delay and clear the forced ids after the grace period.
    pub fn response_complete(&self) -> u64 {
        let generation = self.set_stage(ProcessingStage::Responding);
        let state = Arc::clone(&self.state);
        let respond = Duration::from_millis(self.config.respond_delay_ms);
        let grace = Duration::from_millis(self.config.grace_period_ms);
        self.spawn_timer(async move {
            tokio::time::sleep(respond).await;
            let idle = {
                let mut s = state.lock();
                if s.generation != generation {
                    return;
                }
                s.enter(ProcessingStage::Idle)
            };
            tokio::time::sleep(grace).await;
            let mut s = state.lock();
            if s.generation == idle {
                s.forced.clear();
                debug!(generation = idle, "grace period elapsed, activation cleared");
            }
        });
        generation
    }

    /// Return to `Idle` and drop the forced ids immediately.
    pub fn reset(&self) -> u64 {
        let mut s = self.state.lock();
        s.forced.clear();
        s.enter(ProcessingStage::Idle)
    }

    fn spawn_timer<F>(&self, task: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(task);
            }
            Err(_) => warn!("no tokio runtime, stage will not auto-advance"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_transitions_bump_generation() {
        let machine = StageMachine::new(StageConfig::default());
        assert_eq!(machine.stage(), ProcessingStage::Idle);
        let g1 = machine.set_stage(ProcessingStage::Processing);
        let g2 = machine.set_stage(ProcessingStage::Responding);
        assert!(g2 > g1);
        assert_eq!(machine.stage(), ProcessingStage::Responding);
    }

    #[test]
    fn without_runtime_timers_are_skipped() {
        let machine = StageMachine::new(StageConfig::default());
        machine.message_received();
        assert_eq!(machine.stage(), ProcessingStage::Receiving);
    }

    #[test]
    fn retrieval_stores_forced_ids_and_reset_clears_them() {
        let machine = StageMachine::new(StageConfig::default());
        let ids = vec![MemoryId::new(), MemoryId::new()];
        machine.retrieval_complete(ids.clone());
        assert_eq!(machine.stage(), ProcessingStage::Processing);
        assert_eq!(machine.forced(), ids);
        machine.reset();
        assert!(machine.forced().is_empty());
        assert_eq!(machine.stage(), ProcessingStage::Idle);
    }

    #[test]
    fn stage_names() {
        assert_eq!(ProcessingStage::Retrieving.to_string(), "retrieving");
        assert_eq!(ProcessingStage::default(), ProcessingStage::Idle);
    }
}
