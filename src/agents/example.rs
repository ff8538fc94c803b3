use crate::agents::{Agent, Interaction};
use crate::types::{AgentResult, AgentTask, Result};
use crate::utils::toml_config::AgentConfig;
use async_trait::async_trait;

/// Echoes the task back. Handy for wiring checks and demos.
pub struct ExampleAgent {
    config: AgentConfig,
}

impl ExampleAgent {
    pub fn new(config: AgentConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Agent for ExampleAgent {
    fn config(&self) -> AgentConfig {
        self.config.clone()
    }

    fn kind(&self) -> &'static str {
        "example"
    }

    async fn perform_task(&self, task: &AgentTask, interaction: &Interaction) -> Result<AgentResult> {
        interaction.step("echo");
        Ok(AgentResult::ok(
            serde_json::json!({
                "agent": interaction.config().id,
                "task_id": task.id,
                "query": task.query,
                "document_id": task.document.as_ref().map(|d| d.id.clone()),
            }),
            Some(1.0),
        ))
    }
}
