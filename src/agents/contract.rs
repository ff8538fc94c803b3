//! Contract analysis: flags risky clauses in a contract document.

use crate::agents::{Agent, Interaction};
use crate::llm::client::completion_error;
use crate::llm::LLMClient;
use crate::types::{AgentResult, AgentTask, AppError, Result};
use crate::utils::toml_config::AgentConfig;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

const DEFAULT_SYSTEM_PROMPT: &str = "You are an energy-law contract analyst. Summarize the contract \
in a few sentences, then list its main obligations and the legal risks of the flagged clauses.";

/// Clause category and the lowercase markers that reveal it.
const RISK_MARKERS: &[(&str, &[&str])] = &[
    ("termination", &["termination", "terminate", "felmondás", "megszüntet"]),
    ("penalty", &["penalty", "liquidated damages", "kötbér"]),
    ("liability", &["liability", "liable", "felelősség"]),
    ("indemnity", &["indemnif", "hold harmless", "kártalanít"]),
    ("exclusivity", &["exclusive", "exclusivity", "kizárólagos"]),
    ("price_revision", &["price revision", "price adjustment", "árfelülvizsgálat", "árváltozás"]),
    ("force_majeure", &["force majeure", "vis maior"]),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    fn from_clause_count(count: usize) -> Self {
        match count {
            0 => RiskLevel::Low,
            1 | 2 => RiskLevel::Medium,
            _ => RiskLevel::High,
        }
    }
}

/// Categories whose markers occur in `content`.
pub fn find_risk_clauses(content: &str) -> Vec<&'static str> {
    let content = content.to_lowercase();
    RISK_MARKERS
        .iter()
        .filter(|(_, markers)| markers.iter().any(|m| content.contains(m)))
        .map(|(category, _)| *category)
        .collect()
}

pub struct ContractAnalysisAgent {
    config: AgentConfig,
    llm: Option<Arc<dyn LLMClient>>,
}

impl ContractAnalysisAgent {
    pub fn new(config: AgentConfig, llm: Option<Arc<dyn LLMClient>>) -> Self {
        Self { config, llm }
    }
}

#[async_trait]
impl Agent for ContractAnalysisAgent {
    fn config(&self) -> AgentConfig {
        self.config.clone()
    }

    fn kind(&self) -> &'static str {
        "contract-analysis"
    }

    async fn perform_task(&self, task: &AgentTask, interaction: &Interaction) -> Result<AgentResult> {
        let document = task
            .document
            .as_ref()
            .ok_or_else(|| AppError::InvalidInput("contract analysis requires a document".into()))?;
        if document.content.trim().is_empty() {
            return Err(AppError::InvalidInput("document has no content".into()));
        }

        let clauses = find_risk_clauses(&document.content);
        let risk_level = RiskLevel::from_clause_count(clauses.len());
        interaction.step(format!("found {} risk clause categories", clauses.len()));

        let summary = match &self.llm {
            Some(llm) => {
                let system = interaction
                    .config()
                    .system_prompt()
                    .unwrap_or(DEFAULT_SYSTEM_PROMPT);
                let prompt = format!(
                    "Title: {}\nFlagged clauses: {}\n\n{}",
                    document.title,
                    clauses.join(", "),
                    document.content
                );
                let summary = llm
                    .generate_with_system(system, &prompt)
                    .await
                    .map_err(|e| completion_error(&**llm, e))?;
                interaction.step("summarized with llm");
                Some(summary)
            }
            None => None,
        };

        let confidence = if summary.is_some() { 0.85 } else { 0.7 };

        Ok(AgentResult::ok(
            serde_json::json!({
                "document_id": document.id,
                "risk_level": risk_level,
                "risk_clauses": clauses,
                "summary": summary,
            }),
            Some(confidence),
        ))
    }
}
