//! Feedback-driven tuning of routing scores and agent prompts.

mod common;

use async_trait::async_trait;
use common::mocks::{Harness, Script, ScriptedAgent};
use energia::agents::{AgentRegistry, Router};
use energia::feedback::{
    ImprovementPlan, ImprovementPlanSource, PerformanceTuner, ReviewNotifier, ReviewRequest,
    TuningReport,
};
use energia::services::NullVectorSearch;
use energia::types::{AppError, Result};
use energia::utils::toml_config::{AgentConfig, RouterConfig};
use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

struct ChannelNotifier {
    tx: mpsc::UnboundedSender<ReviewRequest>,
}

#[async_trait]
impl ReviewNotifier for ChannelNotifier {
    async fn notify(&self, request: ReviewRequest) -> Result<()> {
        self.tx
            .send(request)
            .map_err(|_| AppError::Internal("receiver gone".into()))
    }
}

/// Hands out queued plan batches, one per call.
struct QueuedPlans {
    batches: Mutex<Vec<Vec<ImprovementPlan>>>,
}

impl QueuedPlans {
    fn new(mut batches: Vec<Vec<ImprovementPlan>>) -> Self {
        batches.reverse();
        Self {
            batches: Mutex::new(batches),
        }
    }
}

#[async_trait]
impl ImprovementPlanSource for QueuedPlans {
    async fn next_plans(&self) -> Result<Vec<ImprovementPlan>> {
        Ok(self.batches.lock().pop().unwrap_or_default())
    }
}

struct BrokenSource;

#[async_trait]
impl ImprovementPlanSource for BrokenSource {
    async fn next_plans(&self) -> Result<Vec<ImprovementPlan>> {
        Err(AppError::Internal("analytics unavailable".into()))
    }
}

fn plan(agent_id: &str, actions: serde_json::Value) -> ImprovementPlan {
    serde_json::from_value(json!({ "agentId": agent_id, "actions": actions })).unwrap()
}

struct Setup {
    _harness: Harness,
    router: Arc<Router>,
    registry: Arc<AgentRegistry>,
    reviews: mpsc::UnboundedReceiver<ReviewRequest>,
    tuner: Arc<PerformanceTuner>,
}

async fn setup() -> Setup {
    let harness = Harness::new();
    let registry = Arc::new(AgentRegistry::new());
    for id in ["contracts", "assistant"] {
        let agent = harness
            .start(ScriptedAgent::new(
                AgentConfig::new(id, id, "energy"),
                Script::Succeed { confidence: 1.0 },
            ))
            .await;
        registry.register_agent(agent).unwrap();
    }
    let router = Arc::new(Router::new(
        registry.list_agents(),
        harness.domains.clone(),
        Arc::new(NullVectorSearch),
        RouterConfig::default(),
    ));

    let (tx, reviews) = mpsc::unbounded_channel();
    let tuner = Arc::new(
        PerformanceTuner::new(router.clone(), registry.clone())
            .with_notifier(Arc::new(ChannelNotifier { tx })),
    );

    Setup {
        _harness: harness,
        router,
        registry,
        reviews,
        tuner,
    }
}

#[tokio::test]
async fn test_adjust_routing_score() {
    let s = setup().await;
    let report = s.tuner.apply_plan(&plan(
        "contracts",
        json!([
            {"type": "ADJUST_ROUTING_SCORE", "payload": {"delta": 0.25}},
            {"type": "ADJUST_ROUTING_SCORE", "payload": {"delta": -0.05}}
        ]),
    ));

    assert_eq!(report, TuningReport { applied: 2, skipped: 0, failed: 0 });
    let state = s.router.agent_performance("contracts").unwrap();
    assert!((state.score - 1.2).abs() < 1e-9);
    assert_eq!(state.feedback_count, 2);
}

#[tokio::test]
async fn test_modify_system_prompt_updates_agent_config() {
    let s = setup().await;
    let report = s.tuner.apply_plan(&plan(
        "assistant",
        json!([{
            "type": "MODIFY_SYSTEM_PROMPT",
            "payload": {"prompt": "Cite the relevant act for every answer."},
            "description": "users asked for sources"
        }]),
    ));

    assert_eq!(report.applied, 1);
    let config = s.registry.require_agent("assistant").unwrap().get_config();
    assert_eq!(
        config.system_prompt(),
        Some("Cite the relevant act for every answer.")
    );
}

#[tokio::test]
async fn test_flag_for_manual_review_notifies() {
    let mut s = setup().await;
    let report = s.tuner.apply_plan(&plan(
        "contracts",
        json!([
            {"type": "FLAG_FOR_MANUAL_REVIEW", "payload": {"reason": "wrong risk level"}, "description": "three complaints"},
            {"type": "FLAG_FOR_MANUAL_REVIEW"}
        ]),
    ));
    assert_eq!(report.applied, 2);

    let mut requests = vec![
        s.reviews.recv().await.unwrap(),
        s.reviews.recv().await.unwrap(),
    ];
    requests.sort_by(|a, b| a.reason.cmp(&b.reason));

    assert_eq!(requests[0].agent_id, "contracts");
    assert_eq!(requests[0].reason, "flagged by feedback analysis");
    assert_eq!(requests[1].reason, "wrong risk level");
    assert_eq!(requests[1].description, "three complaints");
}

#[tokio::test]
async fn test_bad_actions_do_not_stop_the_plan() {
    let s = setup().await;
    let report = s.tuner.apply_plan(&plan(
        "contracts",
        json!([
            {"type": "RETRAIN_MODEL", "payload": {}},
            {"type": "ADJUST_ROUTING_SCORE", "payload": {"delta": "lots"}},
            {"type": "MODIFY_SYSTEM_PROMPT", "payload": {}},
            {"type": "ADJUST_ROUTING_SCORE", "payload": {"delta": 0.1}}
        ]),
    ));

    assert_eq!(report, TuningReport { applied: 1, skipped: 1, failed: 2 });
    let state = s.router.agent_performance("contracts").unwrap();
    assert!((state.score - 1.1).abs() < 1e-9);
}

#[tokio::test]
async fn test_unknown_agent_fails_its_actions() {
    let s = setup().await;
    let report = s.tuner.apply_plan(&plan(
        "ghost",
        json!([
            {"type": "ADJUST_ROUTING_SCORE", "payload": {"delta": 0.1}},
            {"type": "MODIFY_SYSTEM_PROMPT", "payload": {"prompt": "x"}}
        ]),
    ));
    assert_eq!(report, TuningReport { applied: 0, skipped: 0, failed: 2 });
}

#[tokio::test]
async fn test_run_once_applies_every_plan() {
    let s = setup().await;
    let source = QueuedPlans::new(vec![vec![
        plan(
            "contracts",
            json!([{"type": "ADJUST_ROUTING_SCORE", "payload": {"delta": 0.3}}]),
        ),
        plan(
            "assistant",
            json!([{"type": "ADJUST_ROUTING_SCORE", "payload": {"delta": -0.3}}]),
        ),
    ]]);

    let report = s.tuner.run_once(&source).await.unwrap();
    assert_eq!(report.applied, 2);
    assert!((s.router.agent_performance("contracts").unwrap().score - 1.3).abs() < 1e-9);
    assert!((s.router.agent_performance("assistant").unwrap().score - 0.7).abs() < 1e-9);

    // Source is drained
    let report = s.tuner.run_once(&source).await.unwrap();
    assert_eq!(report, TuningReport::default());
}

#[tokio::test]
async fn test_run_once_propagates_source_errors() {
    let s = setup().await;
    let err = s.tuner.run_once(&BrokenSource).await.unwrap_err();
    assert!(matches!(err, AppError::Internal(_)));
}

#[tokio::test(start_paused = true)]
async fn test_background_tuner_polls_source() {
    let s = setup().await;
    let source = Arc::new(QueuedPlans::new(vec![
        vec![],
        vec![plan(
            "contracts",
            json!([{"type": "ADJUST_ROUTING_SCORE", "payload": {"delta": 0.5}}]),
        )],
    ]));

    let handle = s.tuner.clone().spawn(source, Duration::from_secs(60));
    tokio::time::sleep(Duration::from_secs(61)).await;
    handle.abort();

    let state = s.router.agent_performance("contracts").unwrap();
    assert!((state.score - 1.5).abs() < 1e-9);
}
