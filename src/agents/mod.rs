pub mod batch;
pub mod cache;
pub mod contract;
pub mod example;
pub mod general;
pub mod impact;
pub mod registry;
pub mod research;
pub mod router;
pub mod runtime;
pub mod security;

use crate::types::{AgentResult, AgentTask, AuthUser, BatchSummary, Document, Domain, ReasoningStep, Result};
use crate::utils::toml_config::{AgentConfig, AgentConfigPatch};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

// Re-export commonly used types
pub use batch::{BatchFlush, FlushTrigger, QueueReceipt};
pub use contract::ContractAnalysisAgent;
pub use example::ExampleAgent;
pub use general::GeneralPurposeAgent;
pub use impact::CrossDomainImpactAgent;
pub use registry::AgentRegistry;
pub use research::LegalResearchAgent;
pub use router::{AgentScore, Router, ScoreBreakdown};
pub use runtime::{AgentRuntime, AgentServices};

/// Agent-specific behavior.
///
/// Implementers only supply setup and the task logic. Lifecycle, security,
/// telemetry, caching and batching are layered on by [`AgentRuntime`].
#[async_trait]
pub trait Agent: Send + Sync + 'static {
    /// Initial configuration; the runtime owns the live copy afterwards.
    fn config(&self) -> AgentConfig;

    /// Short implementation tag, e.g. `contract-analysis`.
    fn kind(&self) -> &'static str;

    /// One-time setup run by [`AgentRuntime::initialize`].
    async fn initialize(&self) -> Result<()> {
        Ok(())
    }

    /// Turn a task into a result. Errors are normalized by the runtime.
    async fn perform_task(&self, task: &AgentTask, interaction: &Interaction) -> Result<AgentResult>;
}

/// Per-invocation handle passed to [`Agent::perform_task`].
#[derive(Debug)]
pub struct Interaction {
    id: String,
    config: Arc<AgentConfig>,
    trace: Mutex<Vec<ReasoningStep>>,
}

impl Interaction {
    pub fn new(config: Arc<AgentConfig>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            config,
            trace: Mutex::new(Vec::new()),
        }
    }

    /// Interaction id, distinct from the task id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Config snapshot taken when the invocation started.
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Append a step to the reasoning trace.
    pub fn step(&self, step: impl Into<String>) {
        self.trace.lock().push(ReasoningStep {
            step: step.into(),
            timestamp: Utc::now(),
        });
    }

    pub fn trace(&self) -> Vec<ReasoningStep> {
        self.trace.lock().clone()
    }
}

/// Object-safe view of a running agent, shared by the registry, router and tuner.
#[async_trait]
pub trait ManagedAgent: Send + Sync {
    fn id(&self) -> String;

    fn kind(&self) -> &'static str;

    /// Copy of the current configuration.
    fn get_config(&self) -> AgentConfig;

    /// Merge `patch` into the configuration after validating the result.
    fn update_config(&self, patch: AgentConfigPatch) -> Result<AgentConfig>;

    async fn initialize(&self) -> Result<()>;

    /// Run one task. Only security errors are returned as `Err`.
    async fn process(&self, task: AgentTask) -> Result<AgentResult>;

    /// Alias of [`ManagedAgent::process`].
    async fn execute(&self, task: AgentTask) -> Result<AgentResult> {
        self.process(task).await
    }

    async fn process_batch(
        &self,
        documents: Vec<Option<Document>>,
        user: Option<AuthUser>,
    ) -> Result<BatchSummary>;

    async fn queue_for_batch_processing(
        &self,
        document: Document,
        user: Option<AuthUser>,
    ) -> Result<QueueReceipt>;

    /// Receive every batch flush of this agent's queue.
    fn subscribe_flushes(&self) -> broadcast::Receiver<BatchFlush>;

    /// Flush the queue and stop accepting queued documents.
    async fn cleanup(&self) -> Result<()>;

    /// Resolve this agent's domain code.
    async fn get_domain(&self) -> Result<Option<Domain>>;
}
