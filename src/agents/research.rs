//! Legal research: pulls statute, decree, paragraph and EU law citations
//! out of a question or document and optionally drafts a research note.

use crate::agents::{Agent, Interaction};
use crate::llm::client::completion_error;
use crate::llm::LLMClient;
use crate::types::{AgentResult, AgentTask, AppError, Result};
use crate::utils::toml_config::AgentConfig;
use async_trait::async_trait;
use regex::Regex;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::{Arc, OnceLock};

const DEFAULT_SYSTEM_PROMPT: &str = "You are a legal researcher specialised in Hungarian and EU \
energy law. For each cited source, state what it regulates and whether it is still in force.";

/// What kind of source a citation points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CitationKind {
    /// e.g. `2007. évi LXXXVI. törvény`
    Act,
    /// e.g. `273/2007. (X. 19.) Korm. rendelet`
    GovernmentDecree,
    /// e.g. `3. § (2)`
    Paragraph,
    /// e.g. `(EU) 2019/944` or `2009/72/EK`
    EuLaw,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Citation {
    pub kind: CitationKind,
    pub text: String,
}

struct CitationPatterns {
    patterns: Vec<(CitationKind, Regex)>,
}

impl CitationPatterns {
    fn compile() -> Result<Self> {
        let sources = [
            (CitationKind::Act, r"\d{4}\.\s*évi\s+[IVXLCDM]+\.\s*törvény"),
            (
                CitationKind::GovernmentDecree,
                r"\d+/\d{4}\.\s*\([IVXLC]+\.\s*\d{1,2}\.\)\s*Korm\.\s*rendelet",
            ),
            (CitationKind::Paragraph, r"\d+(?:/[A-Z])?\.\s*§(?:\s*\(\d+\))?"),
            (CitationKind::EuLaw, r"\((?:EU|EK|EC|EGK|EEC)\)\s*(?:No\s+)?\d{2,4}/\d+"),
            (CitationKind::EuLaw, r"\b\d{2,4}/\d+/(?:EU|EK|EC|EGK|EEC)\b"),
        ];

        let patterns = sources
            .iter()
            .map(|(kind, source)| {
                Regex::new(source)
                    .map(|re| (*kind, re))
                    .map_err(|e| AppError::Configuration(format!("invalid citation pattern: {}", e)))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    /// Citations in order of first appearance, without duplicates.
    fn extract(&self, text: &str) -> Vec<Citation> {
        let mut found: Vec<(usize, Citation)> = Vec::new();
        let mut seen = HashSet::new();
        for (kind, re) in &self.patterns {
            for m in re.find_iter(text) {
                let normalized = m.as_str().split_whitespace().collect::<Vec<_>>().join(" ");
                if seen.insert((*kind, normalized.clone())) {
                    found.push((
                        m.start(),
                        Citation {
                            kind: *kind,
                            text: normalized,
                        },
                    ));
                }
            }
        }
        found.sort_by_key(|(start, _)| *start);
        found.into_iter().map(|(_, citation)| citation).collect()
    }
}

pub struct LegalResearchAgent {
    config: AgentConfig,
    llm: Option<Arc<dyn LLMClient>>,
    patterns: OnceLock<CitationPatterns>,
}

impl LegalResearchAgent {
    pub fn new(config: AgentConfig, llm: Option<Arc<dyn LLMClient>>) -> Self {
        Self {
            config,
            llm,
            patterns: OnceLock::new(),
        }
    }

    fn patterns(&self) -> Result<&CitationPatterns> {
        self.patterns
            .get()
            .ok_or_else(|| AppError::Internal("citation patterns not compiled".into()))
    }
}

#[async_trait]
impl Agent for LegalResearchAgent {
    fn config(&self) -> AgentConfig {
        self.config.clone()
    }

    fn kind(&self) -> &'static str {
        "legal-research"
    }

    async fn initialize(&self) -> Result<()> {
        if self.patterns.get().is_none() {
            let _ = self.patterns.set(CitationPatterns::compile()?);
        }
        Ok(())
    }

    async fn perform_task(&self, task: &AgentTask, interaction: &Interaction) -> Result<AgentResult> {
        let text = task.text();
        if text.trim().is_empty() {
            return Err(AppError::InvalidInput("nothing to research".into()));
        }

        let citations = self.patterns()?.extract(&text);
        interaction.step(format!("extracted {} citations", citations.len()));

        let note = match &self.llm {
            Some(llm) => {
                let system = interaction
                    .config()
                    .system_prompt()
                    .unwrap_or(DEFAULT_SYSTEM_PROMPT);
                let listed: Vec<&str> = citations.iter().map(|c| c.text.as_str()).collect();
                let prompt = format!("Sources: {}\n\n{}", listed.join("; "), text);
                let note = llm
                    .generate_with_system(system, &prompt)
                    .await
                    .map_err(|e| completion_error(&**llm, e))?;
                interaction.step("drafted research note");
                Some(note)
            }
            None => None,
        };

        let confidence = if citations.is_empty() { 0.4 } else { 0.8 };
        Ok(AgentResult::ok(
            serde_json::json!({
                "citations": citations,
                "note": note,
            }),
            Some(confidence),
        ))
    }
}
