//! Agent runtime: lifecycle, security, telemetry, caching and batching
//! wrapped uniformly around any [`Agent`].

use super::batch::{BatchFlush, BatchProcessor, BatchQueue, QueueReceipt, QueuedDocument};
use super::cache::ResultCache;
use super::security::authorize;
use super::{Agent, Interaction, ManagedAgent};
use crate::services::{AuthService, DomainProvider};
use crate::telemetry::TelemetryRecorder;
use crate::types::{
    AgentResult, AgentTask, AppError, AuthUser, BatchSummary, Document, Domain, InteractionMetrics,
    Result,
};
use crate::utils::toml_config::{AgentConfig, AgentConfigPatch, BatchConfig};
use arc_swap::ArcSwap;
use async_trait::async_trait;
use chrono::Utc;
use futures::future::join_all;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{broadcast, OnceCell};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Collaborators every runtime needs.
#[derive(Clone)]
pub struct AgentServices {
    pub auth: Arc<dyn AuthService>,
    pub domains: Arc<dyn DomainProvider>,
    pub telemetry: TelemetryRecorder,
}

impl AgentServices {
    pub fn new(
        auth: Arc<dyn AuthService>,
        domains: Arc<dyn DomainProvider>,
        telemetry: TelemetryRecorder,
    ) -> Self {
        Self {
            auth,
            domains,
            telemetry,
        }
    }
}

struct RuntimeCore<A: Agent> {
    agent: A,
    config: ArcSwap<AgentConfig>,
    services: AgentServices,
    cache: Mutex<Option<ResultCache>>,
    initialized: OnceCell<()>,
}

/// Runs an [`Agent`] behind the shared lifecycle contract.
///
/// The queue actor holds the core, the core never holds the queue, so
/// dropping the runtime stops the actor after a final flush.
pub struct AgentRuntime<A: Agent> {
    core: Arc<RuntimeCore<A>>,
    queue: BatchQueue,
}

impl<A: Agent> AgentRuntime<A> {
    /// Validate the agent's config and start its queue actor.
    pub fn new(agent: A, services: AgentServices) -> Result<Self> {
        let config = agent.config();
        config.validate()?;

        let cache = config.cache.map(ResultCache::new);
        let core = Arc::new(RuntimeCore {
            agent,
            config: ArcSwap::from_pointee(config),
            services,
            cache: Mutex::new(cache),
            initialized: OnceCell::new(),
        });
        let queue = BatchQueue::spawn(core.clone());

        Ok(Self { core, queue })
    }

    /// Wrap into the shared handle used by the registry and router.
    pub fn into_managed(self) -> Arc<dyn ManagedAgent> {
        Arc::new(self)
    }

    /// The wrapped agent.
    pub fn agent(&self) -> &A {
        &self.core.agent
    }

    pub fn is_initialized(&self) -> bool {
        self.core.initialized.initialized()
    }

    /// Current cache statistics, `None` without a cache policy.
    pub fn cache_stats(&self) -> Option<super::cache::CacheStats> {
        self.core.cache.lock().as_ref().map(|c| c.stats())
    }
}

impl<A: Agent> RuntimeCore<A> {
    fn id(&self) -> String {
        self.config.load().id.clone()
    }

    async fn check_security(&self, user: Option<&AuthUser>) -> Result<()> {
        let config = self.config.load_full();
        authorize(&config, user, self.services.auth.as_ref())
            .await
            .inspect_err(|e| {
                warn!(agent_id = %config.id, error = %e, "Security check rejected caller");
            })
    }

    /// Run one task past the security gate. Never fails; errors become
    /// failed results and every call produces one telemetry record.
    async fn invoke(&self, task: AgentTask) -> AgentResult {
        let config = self.config.load_full();
        let interaction = Interaction::new(config.clone());
        let started = Instant::now();

        let result = match self.run(&task, &interaction).await {
            Ok(result) => result,
            Err(e) => self.handle_error(&e, &task),
        };

        self.record_metrics(&task, &interaction, &result, started);
        result
    }

    async fn run(&self, task: &AgentTask, interaction: &Interaction) -> Result<AgentResult> {
        let config = interaction.config();
        if !self.initialized.initialized() {
            return Err(AppError::Execution(format!(
                "agent '{}' has not been initialized",
                config.id
            )));
        }

        let cache_key = config
            .cache
            .map(|_| ResultCache::compute_key(&config.id, task));

        if let Some(key) = &cache_key {
            let hit = self.cache.lock().as_mut().and_then(|c| c.get(key));
            if let Some(result) = hit {
                interaction.step("cache_hit");
                debug!(agent_id = %config.id, interaction_id = %interaction.id(), "Result cache hit");
                return Ok(result);
            }
        }

        let result = self.agent.perform_task(task, interaction).await?;

        if let (Some(key), true) = (cache_key, result.success) {
            if let Some(cache) = self.cache.lock().as_mut() {
                cache.insert(key, result.clone());
            }
        }
        Ok(result)
    }

    /// Normalize an agent-level failure into a failed result.
    fn handle_error(&self, error: &AppError, task: &AgentTask) -> AgentResult {
        let subject = task.subject_id();
        warn!(
            agent_id = %self.id(),
            subject = %subject,
            session_id = %task.session_id,
            error = %error,
            "Agent task failed"
        );
        AgentResult::failure(format!("{}: {}", subject, error.message()))
    }

    fn record_metrics(
        &self,
        task: &AgentTask,
        interaction: &Interaction,
        result: &AgentResult,
        started: Instant,
    ) {
        let trace = interaction.trace();
        let confidence = if result.success {
            result.confidence
        } else {
            Some(0.0)
        };
        let metrics = InteractionMetrics {
            interaction_id: interaction.id().to_string(),
            agent_id: interaction.config().id.clone(),
            session_id: task.session_id.clone(),
            user_id: task.user.as_ref().map(|u| u.id.clone()),
            response_time_ms: started.elapsed().as_millis() as u64,
            confidence_score: confidence,
            reasoning_trace: if trace.is_empty() { None } else { Some(trace) },
            created_at: Utc::now(),
        };
        self.services.telemetry.record(metrics);
    }

    /// Run documents concurrently, in chunks of the batch size.
    async fn run_documents(&self, documents: Vec<QueuedDocument>, session_id: &str) -> BatchSummary {
        let chunk_size = self.config.load().batch_policy().max_batch_size.max(1);
        let mut results = Vec::with_capacity(documents.len());

        for chunk in documents.chunks(chunk_size) {
            let runs = chunk.iter().map(|item| {
                let task = AgentTask::for_document(item.document.clone(), session_id)
                    .with_user(item.user.clone());
                self.invoke(task)
            });
            results.extend(join_all(runs).await);
        }

        BatchSummary::from_results(results)
    }
}

#[async_trait]
impl<A: Agent> BatchProcessor for RuntimeCore<A> {
    fn agent_id(&self) -> String {
        self.id()
    }

    fn batch_policy(&self) -> BatchConfig {
        self.config.load().batch_policy()
    }

    async fn flush(&self, items: Vec<QueuedDocument>) -> BatchSummary {
        let session_id = format!("queue-{}", Uuid::new_v4());
        self.run_documents(items, &session_id).await
    }
}

#[async_trait]
impl<A: Agent> ManagedAgent for AgentRuntime<A> {
    fn id(&self) -> String {
        self.core.id()
    }

    fn kind(&self) -> &'static str {
        self.core.agent.kind()
    }

    fn get_config(&self) -> AgentConfig {
        self.core.config.load().as_ref().clone()
    }

    fn update_config(&self, patch: AgentConfigPatch) -> Result<AgentConfig> {
        let current = self.core.config.load_full();
        let next = current.merged(patch)?;

        // Cached results were produced under the old config
        if next != *current {
            *self.core.cache.lock() = next.cache.map(ResultCache::new);
        }
        self.core.config.store(Arc::new(next.clone()));
        info!(agent_id = %next.id, "Agent configuration updated");
        Ok(next)
    }

    async fn initialize(&self) -> Result<()> {
        self.core
            .initialized
            .get_or_try_init(|| async {
                self.core.agent.initialize().await?;
                info!(agent_id = %self.core.id(), kind = self.core.agent.kind(), "Agent initialized");
                Ok::<(), AppError>(())
            })
            .await?;
        Ok(())
    }

    async fn process(&self, task: AgentTask) -> Result<AgentResult> {
        self.core.check_security(task.user.as_ref()).await?;
        Ok(self.core.invoke(task).await)
    }

    async fn process_batch(
        &self,
        documents: Vec<Option<Document>>,
        user: Option<AuthUser>,
    ) -> Result<BatchSummary> {
        self.core.check_security(user.as_ref()).await?;

        let items: Vec<QueuedDocument> = documents
            .into_iter()
            .flatten()
            .map(|document| QueuedDocument {
                document,
                user: user.clone(),
            })
            .collect();
        let session_id = format!("batch-{}", Uuid::new_v4());
        debug!(agent_id = %self.core.id(), total = items.len(), "Processing batch");

        Ok(self.core.run_documents(items, &session_id).await)
    }

    async fn queue_for_batch_processing(
        &self,
        document: Document,
        user: Option<AuthUser>,
    ) -> Result<QueueReceipt> {
        self.core.check_security(user.as_ref()).await?;
        self.queue.enqueue(QueuedDocument { document, user }).await
    }

    fn subscribe_flushes(&self) -> broadcast::Receiver<BatchFlush> {
        self.queue.subscribe()
    }

    async fn cleanup(&self) -> Result<()> {
        self.queue.shutdown().await;
        info!(agent_id = %self.core.id(), "Agent cleaned up");
        Ok(())
    }

    async fn get_domain(&self) -> Result<Option<Domain>> {
        let code = self.core.config.load().domain_code.clone();
        self.core.services.domains.get_domain(&code).await
    }
}
