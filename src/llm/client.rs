use crate::types::{AppError, ConversationMessage, Result};
use async_trait::async_trait;

/// Generic LLM client trait for provider abstraction
///
/// Agents only depend on this trait, so a provider can be swapped without
/// touching agent code.
#[async_trait]
pub trait LLMClient: Send + Sync {
    /// Generate a completion from a prompt
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Generate with system prompt
    async fn generate_with_system(&self, system: &str, prompt: &str) -> Result<String>;

    /// Generate with conversation history
    async fn generate_with_history(
        &self,
        messages: &[(String, String)], // (role, content) pairs
    ) -> Result<String>;

    /// Get the model name/identifier
    fn model_name(&self) -> &str;
}

/// Flatten prior exchanges into `(role, content)` pairs, oldest first,
/// followed by an optional system prompt and the new user prompt.
pub fn history_messages(
    system: Option<&str>,
    history: &[ConversationMessage],
    prompt: &str,
) -> Vec<(String, String)> {
    let mut messages = Vec::with_capacity(history.len() * 2 + 2);
    if let Some(system) = system {
        messages.push(("system".to_string(), system.to_string()));
    }
    for message in history {
        messages.push(("user".to_string(), message.question.clone()));
        messages.push(("assistant".to_string(), message.answer.clone()));
    }
    messages.push(("user".to_string(), prompt.to_string()));
    messages
}

/// Map a completion failure onto the execution error kind, keeping the model name.
pub fn completion_error(client: &dyn LLMClient, err: AppError) -> AppError {
    AppError::Execution(format!("{} completion failed: {}", client.model_name(), err.message()))
}
