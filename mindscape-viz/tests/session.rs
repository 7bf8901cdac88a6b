//! Session Tests — stage timers on a paused clock, frames and engine
//! hand-off.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use mindscape_core::config::StageConfig;
use mindscape_core::store::{InMemoryStore, MemoryStore};
use mindscape_core::{AgentId, GraphEngine, MemoryId, MemoryRecord, MemoryType, MindConfig};
use mindscape_viz::flow::FlowEndpoint;
use mindscape_viz::{ProcessingStage, SessionRegistry, StageMachine, VisualizationSession};

fn machine() -> StageMachine {
    StageMachine::new(StageConfig::default())
}

async fn sleep_ms(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

// ---------------------------------------------------------------------------
// Stage timers
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn receiving_auto_advances_after_delay() {
    let m = machine();
    m.message_received();
    sleep_ms(799).await;
    assert_eq!(m.stage(), ProcessingStage::Receiving);
    sleep_ms(2).await;
    assert_eq!(m.stage(), ProcessingStage::Retrieving);
}

#[tokio::test(start_paused = true)]
async fn manual_transition_preempts_stale_timer() {
    let m = machine();
    m.message_received();
    sleep_ms(400).await;
    m.retrieval_complete(vec![MemoryId::new()]);
    sleep_ms(1_000).await;
    assert_eq!(m.stage(), ProcessingStage::Processing);
}

#[tokio::test(start_paused = true)]
async fn response_returns_to_idle_then_clears_activation() {
    let m = machine();
    let ids = vec![MemoryId::new(), MemoryId::new()];
    m.retrieval_complete(ids.clone());
    m.response_complete();
    assert_eq!(m.stage(), ProcessingStage::Responding);

    sleep_ms(1_501).await;
    assert_eq!(m.stage(), ProcessingStage::Idle);
    assert_eq!(m.forced(), ids);

    sleep_ms(3_000).await;
    assert!(m.forced().is_empty());
}

#[tokio::test(start_paused = true)]
async fn new_message_during_grace_keeps_activation() {
    let m = machine();
    let ids = vec![MemoryId::new()];
    m.retrieval_complete(ids.clone());
    m.response_complete();
    sleep_ms(2_000).await;
    assert_eq!(m.stage(), ProcessingStage::Idle);

    m.message_received();
    sleep_ms(5_000).await;
    assert_eq!(m.stage(), ProcessingStage::Retrieving);
    assert_eq!(m.forced(), ids);
}

// ---------------------------------------------------------------------------
// Frames through a session
// ---------------------------------------------------------------------------

fn snapshot(agent: AgentId) -> Vec<MemoryRecord> {
    let now = Utc::now();
    vec![
        MemoryRecord::new(agent, MemoryType::Experience, "I went to the beach last year", 6, now)
            .with_keywords(["beach", "vacation"])
            .with_thread("t1"),
        MemoryRecord::new(
            agent,
            MemoryType::Conversation,
            "We talked about the beach trip",
            5,
            now - chrono::Duration::minutes(2),
        )
        .with_keywords(["beach", "trip"])
        .with_thread("t1"),
        MemoryRecord::new(agent, MemoryType::Fact, "Water boils at 100 degrees", 3, now - chrono::Duration::days(4))
            .with_keywords(["water"]),
    ]
}

#[tokio::test(start_paused = true)]
async fn frames_follow_the_stage_machine() {
    let agent = AgentId::new();
    let memories = snapshot(agent);
    let session = VisualizationSession::initialize(agent, memories.clone(), MindConfig::default());

    session.stages().message_received();
    let frame = session.generate_frame(None, Some("beach"), Utc::now()).expect("frame");
    assert_eq!(frame.stage, ProcessingStage::Receiving);
    assert_eq!(frame.thought_flows.len(), 1);
    assert_eq!(frame.thought_flows[0].from, FlowEndpoint::Input);

    session.stages().retrieval_complete(vec![memories[2].id]);
    let frame = session.generate_frame(None, Some("beach"), Utc::now()).expect("frame");
    assert_eq!(frame.stage, ProcessingStage::Processing);
    assert!((frame.activation.get(memories[2].id).expect("forced") - 1.0).abs() < 1e-6);
    assert!(frame.activation.contains(memories[0].id));
    assert_eq!(frame.positions.len(), 3);
    assert!(frame
        .thought_flows
        .iter()
        .all(|f| matches!(f.from, FlowEndpoint::Memory(_))));

    let frame = session
        .generate_frame(Some(ProcessingStage::Idle), None, Utc::now())
        .expect("frame");
    assert!(frame.thought_flows.is_empty());
    assert_eq!(session.frame_timer().frame_count(), 3);
}

#[test]
fn session_from_engine_sees_graph() {
    let store = Arc::new(InMemoryStore::new());
    let engine = GraphEngine::with_store(store.clone(), MindConfig::default());
    let agent = AgentId::new();
    for record in snapshot(agent) {
        store.append(record.clone()).expect("append");
        engine.try_process_new_memory(&record).expect("process");
    }

    let session = VisualizationSession::from_engine(&engine, agent).expect("session");
    assert_eq!(session.memory_count(), 3);
    let data = session
        .knowledge_graph(&mindscape_core::graph::KnowledgeGraphOptions::default())
        .expect("graph");
    assert!(!data.nodes.is_empty());

    session.generate_frame(None, None, Utc::now()).expect("frame");
    assert_eq!(engine.counters().snapshot().frames_generated, 1);
}

#[test]
fn registry_sessions_work_across_threads() {
    let registry = Arc::new(SessionRegistry::new(MindConfig::default()));
    let agents: Vec<AgentId> = (0..4).map(|_| AgentId::new()).collect();
    for agent in &agents {
        registry.open(*agent, snapshot(*agent));
    }

    let handles: Vec<_> = agents
        .iter()
        .map(|agent| {
            let registry = Arc::clone(&registry);
            let agent = *agent;
            std::thread::spawn(move || {
                let session = registry.get(agent).expect("session");
                for _ in 0..10 {
                    session.generate_frame(None, Some("beach"), Utc::now()).expect("frame");
                }
                session.frame_timer().frame_count()
            })
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.join().expect("thread"), 10);
    }
    assert_eq!(registry.len(), 4);
}
