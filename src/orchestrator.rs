//! Wiring of the whole core from configuration.

use crate::agents::{AgentRegistry, AgentServices, Router};
use crate::feedback::PerformanceTuner;
use crate::llm::LLMClient;
use crate::services::{
    InMemoryConversationStore, InMemoryDomainRegistry, NullVectorSearch, SessionAuth, VectorSearch,
};
use crate::telemetry::{JsonlSink, TelemetryRecorder, TelemetrySink, TracingSink};
use crate::types::Result;
use crate::utils::toml_config::OrchestratorConfig;
use std::sync::Arc;
use tracing::info;

/// Registry, router, tuner and collaborators built from one configuration.
pub struct Orchestrator {
    pub config: Arc<OrchestratorConfig>,
    pub registry: Arc<AgentRegistry>,
    pub router: Arc<Router>,
    pub tuner: Arc<PerformanceTuner>,
    pub telemetry: TelemetryRecorder,
    pub auth: Arc<SessionAuth>,
    pub domains: Arc<InMemoryDomainRegistry>,
    pub conversations: Arc<InMemoryConversationStore>,
}

impl Orchestrator {
    pub fn builder(config: OrchestratorConfig) -> OrchestratorBuilder {
        OrchestratorBuilder {
            config,
            llm: None,
            vectors: None,
            sink: None,
        }
    }

    /// Initialize every registered agent.
    pub async fn initialize(&self) -> Result<()> {
        self.registry.initialize_all().await
    }

    /// Flush agent queues, then wait for pending telemetry.
    pub async fn shutdown(&self) -> Result<()> {
        self.registry.cleanup_all().await?;
        self.telemetry.flush().await?;
        info!(stats = ?self.telemetry.stats(), "Orchestrator stopped");
        Ok(())
    }
}

/// Builder for [`Orchestrator`] with optional collaborator overrides.
pub struct OrchestratorBuilder {
    config: OrchestratorConfig,
    llm: Option<Arc<dyn LLMClient>>,
    vectors: Option<Arc<dyn VectorSearch>>,
    sink: Option<Arc<dyn TelemetrySink>>,
}

impl OrchestratorBuilder {
    pub fn llm(mut self, llm: Arc<dyn LLMClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn vector_search(mut self, vectors: Arc<dyn VectorSearch>) -> Self {
        self.vectors = Some(vectors);
        self
    }

    pub fn telemetry_sink(mut self, sink: Arc<dyn TelemetrySink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Build everything. Must be called inside a tokio runtime.
    pub fn build(self) -> Result<Orchestrator> {
        let config = Arc::new(self.config);

        let sink: Arc<dyn TelemetrySink> = match (self.sink, &config.telemetry.jsonl_path) {
            (Some(sink), _) => sink,
            (None, Some(path)) => Arc::new(JsonlSink::new(path)),
            (None, None) => Arc::new(TracingSink),
        };
        let telemetry = TelemetryRecorder::new(sink, config.telemetry.channel_capacity);

        let auth = Arc::new(SessionAuth::new());
        let domains = Arc::new(InMemoryDomainRegistry::from_config(&config));
        let conversations = Arc::new(InMemoryConversationStore::new());
        let services = AgentServices::new(auth.clone(), domains.clone(), telemetry.clone());

        let registry = Arc::new(AgentRegistry::from_config(&config, services, self.llm)?);

        let vectors = self
            .vectors
            .unwrap_or_else(|| Arc::new(NullVectorSearch));
        let router = Arc::new(
            Router::new(
                registry.list_agents(),
                domains.clone(),
                vectors,
                config.router.clone(),
            )
            .with_history(conversations.clone()),
        );
        let tuner = Arc::new(PerformanceTuner::new(router.clone(), registry.clone()));

        info!(agents = registry.len(), "Orchestrator ready");
        Ok(Orchestrator {
            config,
            registry,
            router,
            tuner,
            telemetry,
            auth,
            domains,
            conversations,
        })
    }
}
