//! Agent Registry
//!
//! Process-wide catalogue of running agents keyed by id. The registry is an
//! ordinary value: build one at startup and pass it (or an `Arc` of it) to
//! whatever needs to look agents up.
//!
//! Registration order is preserved for listing, and ids are unique: a second
//! registration under an existing id is rejected and leaves the registry as
//! it was.

use crate::agents::runtime::{AgentRuntime, AgentServices};
use crate::agents::{
    ContractAnalysisAgent, CrossDomainImpactAgent, ExampleAgent, GeneralPurposeAgent,
    LegalResearchAgent, ManagedAgent,
};
use crate::llm::LLMClient;
use crate::types::{AppError, Result};
use crate::utils::toml_config::{AgentKind, OrchestratorConfig};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

#[derive(Default)]
struct Entries {
    by_id: HashMap<String, Arc<dyn ManagedAgent>>,
    order: Vec<String>,
}

/// Registry of running agents
#[derive(Default)]
pub struct AgentRegistry {
    entries: RwLock<Entries>,
}

impl AgentRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Build and register every agent declared in configuration.
    ///
    /// Agents are registered in id order. The LLM client, when given, is
    /// shared by every agent kind that can use one.
    pub fn from_config(
        config: &OrchestratorConfig,
        services: AgentServices,
        llm: Option<Arc<dyn LLMClient>>,
    ) -> Result<Self> {
        let registry = Self::new();
        for entry in config.agents.values() {
            let agent_config = entry.config.clone();
            let agent: Arc<dyn ManagedAgent> = match entry.kind {
                AgentKind::ContractAnalysis => AgentRuntime::new(
                    ContractAnalysisAgent::new(agent_config, llm.clone()),
                    services.clone(),
                )?
                .into_managed(),
                AgentKind::GeneralPurpose => AgentRuntime::new(
                    GeneralPurposeAgent::new(agent_config, llm.clone()),
                    services.clone(),
                )?
                .into_managed(),
                AgentKind::LegalResearch => AgentRuntime::new(
                    LegalResearchAgent::new(agent_config, llm.clone()),
                    services.clone(),
                )?
                .into_managed(),
                AgentKind::CrossDomainImpact => AgentRuntime::new(
                    CrossDomainImpactAgent::new(agent_config, services.domains.clone()),
                    services.clone(),
                )?
                .into_managed(),
                AgentKind::Example => {
                    AgentRuntime::new(ExampleAgent::new(agent_config), services.clone())?
                        .into_managed()
                }
            };
            registry.register_agent(agent)?;
        }
        Ok(registry)
    }

    /// Register an agent. Fails with a configuration error on a duplicate id.
    pub fn register_agent(&self, agent: Arc<dyn ManagedAgent>) -> Result<()> {
        let id = agent.id();
        let mut entries = self.entries.write();
        if entries.by_id.contains_key(&id) {
            return Err(AppError::Configuration(format!(
                "agent '{}' is already registered",
                id
            )));
        }
        entries.order.push(id.clone());
        entries.by_id.insert(id.clone(), agent);
        info!(agent_id = %id, "Agent registered");
        Ok(())
    }

    /// Get an agent by id
    pub fn get_agent(&self, id: &str) -> Option<Arc<dyn ManagedAgent>> {
        self.entries.read().by_id.get(id).cloned()
    }

    /// Get an agent by id, or a not-found error
    pub fn require_agent(&self, id: &str) -> Result<Arc<dyn ManagedAgent>> {
        self.get_agent(id)
            .ok_or_else(|| AppError::NotFound(format!("agent '{}'", id)))
    }

    /// All agents in registration order
    pub fn list_agents(&self) -> Vec<Arc<dyn ManagedAgent>> {
        let entries = self.entries.read();
        entries
            .order
            .iter()
            .filter_map(|id| entries.by_id.get(id).cloned())
            .collect()
    }

    pub fn has_agent(&self, id: &str) -> bool {
        self.entries.read().by_id.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.read().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().order.is_empty()
    }

    /// Initialize every registered agent, stopping at the first failure.
    pub async fn initialize_all(&self) -> Result<()> {
        for agent in self.list_agents() {
            agent.initialize().await?;
        }
        Ok(())
    }

    /// Run `cleanup` on every agent, flushing their queues.
    pub async fn cleanup_all(&self) -> Result<()> {
        for agent in self.list_agents() {
            agent.cleanup().await?;
        }
        Ok(())
    }
}
