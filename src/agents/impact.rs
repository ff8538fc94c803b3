use crate::agents::{Agent, Interaction};
use crate::services::DomainProvider;
use crate::types::{AgentResult, AgentTask, AppError, Domain, Result};
use crate::utils::toml_config::AgentConfig;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

/// How strongly a text touches one domain.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DomainImpact {
    pub domain_code: String,
    pub matched_keywords: Vec<String>,
    /// Matched share of the domain's keywords, in [0, 1]
    pub impact: f64,
}

/// Measure keyword overlap between `text` and each active domain.
/// Domains without any match are left out; the rest are sorted by impact.
pub fn measure_impact(text: &str, domains: &[Domain]) -> Vec<DomainImpact> {
    let text = text.to_lowercase();
    let mut impacts: Vec<DomainImpact> = domains
        .iter()
        .filter(|d| d.active)
        .filter_map(|domain| {
            let keywords: BTreeSet<String> = domain
                .keyword_sets
                .values()
                .flatten()
                .map(|k| k.to_lowercase())
                .collect();
            if keywords.is_empty() {
                return None;
            }
            let matched: Vec<String> = keywords
                .iter()
                .filter(|k| text.contains(k.as_str()))
                .cloned()
                .collect();
            if matched.is_empty() {
                return None;
            }
            Some(DomainImpact {
                domain_code: domain.code.clone(),
                impact: matched.len() as f64 / keywords.len() as f64,
                matched_keywords: matched,
            })
        })
        .collect();

    impacts.sort_by(|a, b| {
        b.impact
            .total_cmp(&a.impact)
            .then_with(|| a.domain_code.cmp(&b.domain_code))
    });
    impacts
}

/// Reports which domains a document or question reaches into.
pub struct CrossDomainImpactAgent {
    config: AgentConfig,
    domain_provider: Arc<dyn DomainProvider>,
    domains: RwLock<Vec<Domain>>,
}

impl CrossDomainImpactAgent {
    pub fn new(config: AgentConfig, domain_provider: Arc<dyn DomainProvider>) -> Self {
        Self {
            config,
            domain_provider,
            domains: RwLock::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Agent for CrossDomainImpactAgent {
    fn config(&self) -> AgentConfig {
        self.config.clone()
    }

    fn kind(&self) -> &'static str {
        "cross-domain-impact"
    }

    async fn initialize(&self) -> Result<()> {
        let domains = self.domain_provider.list_domains().await?;
        debug!(agent_id = %self.config.id, count = domains.len(), "Loaded domains");
        *self.domains.write() = domains;
        Ok(())
    }

    async fn perform_task(&self, task: &AgentTask, interaction: &Interaction) -> Result<AgentResult> {
        let text = task.text();
        if text.trim().is_empty() {
            return Err(AppError::InvalidInput("nothing to analyse".into()));
        }

        let domains = self.domains.read().clone();
        if domains.is_empty() {
            return Err(AppError::Execution("no domains loaded".into()));
        }

        let impacts = measure_impact(&text, &domains);
        interaction.step(format!("{} of {} domains affected", impacts.len(), domains.len()));

        let primary = impacts.first().map(|i| i.domain_code.clone());
        let confidence = impacts.first().map(|i| i.impact).unwrap_or(0.0);
        Ok(AgentResult::ok(
            serde_json::json!({
                "primary_domain": primary,
                "impacts": impacts,
            }),
            Some(confidence),
        ))
    }
}
