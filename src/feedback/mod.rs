//! Feedback-driven tuning.
//!
//! An external analytics service turns user feedback into improvement plans.
//! The [`tuner::PerformanceTuner`] applies them to the router and to agent
//! configuration while the process runs.

pub mod tuner;

use crate::types::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

pub use tuner::{PerformanceTuner, TuningReport};

/// Typed improvement action. Unrecognized kinds are kept so they can be
/// reported and skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ActionKind {
    AdjustRoutingScore,
    ModifySystemPrompt,
    FlagForManualReview,
    Unknown(String),
}

impl From<String> for ActionKind {
    fn from(value: String) -> Self {
        match value.as_str() {
            "ADJUST_ROUTING_SCORE" => ActionKind::AdjustRoutingScore,
            "MODIFY_SYSTEM_PROMPT" => ActionKind::ModifySystemPrompt,
            "FLAG_FOR_MANUAL_REVIEW" => ActionKind::FlagForManualReview,
            _ => ActionKind::Unknown(value),
        }
    }
}

impl From<ActionKind> for String {
    fn from(kind: ActionKind) -> Self {
        match kind {
            ActionKind::AdjustRoutingScore => "ADJUST_ROUTING_SCORE".to_string(),
            ActionKind::ModifySystemPrompt => "MODIFY_SYSTEM_PROMPT".to_string(),
            ActionKind::FlagForManualReview => "FLAG_FOR_MANUAL_REVIEW".to_string(),
            ActionKind::Unknown(other) => other,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImprovementAction {
    #[serde(rename = "type")]
    pub kind: ActionKind,
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(default)]
    pub description: String,
}

/// Ordered actions for one agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImprovementPlan {
    pub agent_id: String,
    pub actions: Vec<ImprovementAction>,
}

/// Produces improvement plans, typically by analysing stored feedback.
#[async_trait]
pub trait ImprovementPlanSource: Send + Sync {
    /// Plans ready to apply since the previous call.
    async fn next_plans(&self) -> Result<Vec<ImprovementPlan>>;
}

/// A request for a human to look at an agent.
#[derive(Debug, Clone, Serialize)]
pub struct ReviewRequest {
    pub agent_id: String,
    pub reason: String,
    pub description: String,
}

/// Delivers manual review requests.
#[async_trait]
pub trait ReviewNotifier: Send + Sync {
    async fn notify(&self, request: ReviewRequest) -> Result<()>;
}

/// Logs review requests as warnings.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl ReviewNotifier for LogNotifier {
    async fn notify(&self, request: ReviewRequest) -> Result<()> {
        warn!(
            agent_id = %request.agent_id,
            reason = %request.reason,
            description = %request.description,
            "Agent flagged for manual review"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_deserialization() {
        let plan: ImprovementPlan = serde_json::from_value(serde_json::json!({
            "agentId": "contracts",
            "actions": [
                {"type": "ADJUST_ROUTING_SCORE", "payload": {"delta": 0.1}, "description": "praised"},
                {"type": "RETRAIN_MODEL", "payload": {}}
            ]
        }))
        .unwrap();

        assert_eq!(plan.agent_id, "contracts");
        assert_eq!(plan.actions[0].kind, ActionKind::AdjustRoutingScore);
        assert_eq!(plan.actions[1].kind, ActionKind::Unknown("RETRAIN_MODEL".into()));
        assert_eq!(plan.actions[1].description, "");
    }

    #[test]
    fn test_action_kind_round_trips_unknown() {
        let value = serde_json::to_value(ActionKind::Unknown("X".into())).unwrap();
        assert_eq!(value, serde_json::json!("X"));
    }
}
