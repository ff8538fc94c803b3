use crate::agents::{Agent, Interaction};
use crate::llm::client::{completion_error, history_messages};
use crate::llm::LLMClient;
use crate::types::{AgentResult, AgentTask, AppError, Result};
use crate::utils::toml_config::AgentConfig;
use async_trait::async_trait;
use std::sync::Arc;

const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant for Hungarian energy law. \
Answer precisely and name the legal source of every statement you make.";

/// Characters of an attached document passed to the model.
const MAX_DOCUMENT_CONTEXT: usize = 8_000;

/// Answers free-text questions through the LLM collaborator.
pub struct GeneralPurposeAgent {
    config: AgentConfig,
    llm: Option<Arc<dyn LLMClient>>,
}

impl GeneralPurposeAgent {
    pub fn new(config: AgentConfig, llm: Option<Arc<dyn LLMClient>>) -> Self {
        Self { config, llm }
    }

    fn build_prompt(task: &AgentTask) -> Result<String> {
        let question = match (&task.query, &task.document) {
            (Some(query), _) if !query.trim().is_empty() => query.clone(),
            (_, Some(document)) => format!("Summarize the document \"{}\".", document.title),
            _ => return Err(AppError::InvalidInput("task has neither a query nor a document".into())),
        };

        match &task.document {
            Some(document) => {
                let excerpt: String = document.content.chars().take(MAX_DOCUMENT_CONTEXT).collect();
                Ok(format!("Document \"{}\":\n{}\n\n{}", document.title, excerpt, question))
            }
            None => Ok(question),
        }
    }
}

#[async_trait]
impl Agent for GeneralPurposeAgent {
    fn config(&self) -> AgentConfig {
        self.config.clone()
    }

    fn kind(&self) -> &'static str {
        "general-purpose"
    }

    async fn perform_task(&self, task: &AgentTask, interaction: &Interaction) -> Result<AgentResult> {
        let prompt = Self::build_prompt(task)?;

        let llm = match &self.llm {
            Some(llm) => llm,
            None => {
                interaction.step("no llm configured");
                return Ok(AgentResult::failure(format!(
                    "{}: query accepted but no language model is configured to answer it",
                    task.subject_id()
                )));
            }
        };

        let system = interaction
            .config()
            .system_prompt()
            .unwrap_or(DEFAULT_SYSTEM_PROMPT);
        let messages = history_messages(Some(system), &task.history, &prompt);
        interaction.step(format!("asking {} with {} prior exchanges", llm.model_name(), task.history.len()));

        let answer = llm
            .generate_with_history(&messages)
            .await
            .map_err(|e| completion_error(&**llm, e))?;

        Ok(AgentResult::ok(
            serde_json::json!({
                "answer": answer,
                "model": llm.model_name(),
            }),
            Some(0.75),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Document;

    #[test]
    fn test_prompt_prefers_query() {
        let task = AgentTask::query("What is a network license?", "s")
            .with_document(Document::new("d", "Decree", "text"));
        let prompt = GeneralPurposeAgent::build_prompt(&task).unwrap();
        assert!(prompt.starts_with("Document \"Decree\""));
        assert!(prompt.ends_with("What is a network license?"));
    }

    #[test]
    fn test_prompt_requires_input() {
        let mut task = AgentTask::query("", "s");
        task.query = None;
        assert!(GeneralPurposeAgent::build_prompt(&task).is_err());
    }
}
