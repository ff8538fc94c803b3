use super::{
    ActionKind, ImprovementAction, ImprovementPlan, ImprovementPlanSource, LogNotifier,
    ReviewNotifier, ReviewRequest,
};
use crate::agents::{AgentRegistry, Router};
use crate::types::{AppError, Result};
use crate::utils::toml_config::{AgentConfigPatch, SYSTEM_PROMPT_KEY};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Outcome counts of applying one or more plans.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TuningReport {
    pub applied: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl TuningReport {
    fn absorb(&mut self, other: TuningReport) {
        self.applied += other.applied;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }
}

enum Outcome {
    Applied,
    Skipped,
}

/// Applies improvement plans to the router and agent configuration.
///
/// Each plan is a stateless pass: every action is applied on its own, and
/// one bad action never stops the rest of the plan.
pub struct PerformanceTuner {
    router: Arc<Router>,
    registry: Arc<AgentRegistry>,
    notifier: Arc<dyn ReviewNotifier>,
}

impl PerformanceTuner {
    pub fn new(router: Arc<Router>, registry: Arc<AgentRegistry>) -> Self {
        Self {
            router,
            registry,
            notifier: Arc::new(LogNotifier),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn ReviewNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Apply every action of `plan` in order. Must run inside a tokio runtime.
    pub fn apply_plan(&self, plan: &ImprovementPlan) -> TuningReport {
        let mut report = TuningReport::default();
        for action in &plan.actions {
            match self.apply_action(&plan.agent_id, action) {
                Ok(Outcome::Applied) => report.applied += 1,
                Ok(Outcome::Skipped) => report.skipped += 1,
                Err(e) => {
                    warn!(
                        agent_id = %plan.agent_id,
                        action = %String::from(action.kind.clone()),
                        error = %e,
                        "Improvement action failed"
                    );
                    report.failed += 1;
                }
            }
        }
        info!(
            agent_id = %plan.agent_id,
            applied = report.applied,
            skipped = report.skipped,
            failed = report.failed,
            "Applied improvement plan"
        );
        report
    }

    fn apply_action(&self, agent_id: &str, action: &ImprovementAction) -> Result<Outcome> {
        match &action.kind {
            ActionKind::AdjustRoutingScore => {
                let delta = action
                    .payload
                    .get("delta")
                    .and_then(|v| v.as_f64())
                    .filter(|delta| delta.is_finite())
                    .ok_or_else(|| AppError::InvalidInput("payload.delta must be a finite number".into()))?;
                let state = self
                    .router
                    .adjust_agent_score(agent_id, delta)
                    .ok_or_else(|| AppError::NotFound(format!("agent '{}' is not routable", agent_id)))?;
                debug!(agent_id, score = state.score, "Routing score adjusted");
                Ok(Outcome::Applied)
            }
            ActionKind::ModifySystemPrompt => {
                let prompt = action
                    .payload
                    .get("prompt")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| AppError::InvalidInput("payload.prompt must be a string".into()))?;
                let agent = self.registry.require_agent(agent_id)?;
                let mut patch = AgentConfigPatch::default();
                patch
                    .metadata
                    .insert(SYSTEM_PROMPT_KEY.to_string(), serde_json::json!(prompt));
                agent.update_config(patch)?;
                Ok(Outcome::Applied)
            }
            ActionKind::FlagForManualReview => {
                let reason = action
                    .payload
                    .get("reason")
                    .and_then(|v| v.as_str())
                    .unwrap_or("flagged by feedback analysis")
                    .to_string();
                let request = ReviewRequest {
                    agent_id: agent_id.to_string(),
                    reason,
                    description: action.description.clone(),
                };
                let notifier = self.notifier.clone();
                tokio::spawn(async move {
                    if let Err(e) = notifier.notify(request).await {
                        warn!(error = %e, "Review notification failed");
                    }
                });
                Ok(Outcome::Applied)
            }
            ActionKind::Unknown(kind) => {
                warn!(agent_id, action = %kind, "Skipping unsupported improvement action");
                Ok(Outcome::Skipped)
            }
        }
    }

    /// Fetch and apply all pending plans once.
    pub async fn run_once(&self, source: &dyn ImprovementPlanSource) -> Result<TuningReport> {
        let plans = source.next_plans().await?;
        let mut report = TuningReport::default();
        for plan in &plans {
            report.absorb(self.apply_plan(plan));
        }
        Ok(report)
    }

    /// Poll `source` every `interval` until the returned handle is aborted.
    pub fn spawn(
        self: Arc<Self>,
        source: Arc<dyn ImprovementPlanSource>,
        interval: Duration,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                match self.run_once(source.as_ref()).await {
                    Ok(report) if report == TuningReport::default() => {}
                    Ok(report) => debug!(?report, "Tuning pass complete"),
                    Err(e) => warn!(error = %e, "Fetching improvement plans failed"),
                }
            }
        })
    }
}
