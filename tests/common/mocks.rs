//! Mock implementations for testing.
//!
//! Collaborator mocks generated with mockall, plus hand-written fakes for
//! the LLM client and for agents whose behavior a test needs to script.
#![allow(dead_code)]

use async_trait::async_trait;
use energia::agents::{Agent, AgentRuntime, AgentServices, Interaction, ManagedAgent};
use energia::llm::LLMClient;
use energia::services::{
    AuthService, ConversationHistory, DomainProvider, InMemoryDomainRegistry, SessionAuth,
    VectorSearch,
};
use energia::telemetry::{MemorySink, TelemetryRecorder};
use energia::types::{
    AgentResult, AgentTask, AppError, ConversationMessage, Domain, Result, SimilarDocument,
};
use energia::utils::toml_config::AgentConfig;
use mockall::mock;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

mock! {
    pub Vectors {}

    #[async_trait]
    impl VectorSearch for Vectors {
        async fn embed(&self, text: &str) -> Result<Vec<f32>>;
        async fn similarity_search(
            &self,
            embedding: &[f32],
            threshold: f32,
            limit: usize,
        ) -> Result<Vec<SimilarDocument>>;
    }
}

mock! {
    pub Auth {}

    #[async_trait]
    impl AuthService for Auth {
        async fn verify(&self, user_id: &str) -> Result<bool>;
    }
}

mock! {
    pub History {}

    #[async_trait]
    impl ConversationHistory for History {
        async fn get_recent_messages(
            &self,
            session_id: &str,
            limit: usize,
        ) -> Result<Vec<ConversationMessage>>;
    }
}

mock! {
    pub Domains {}

    #[async_trait]
    impl DomainProvider for Domains {
        async fn get_domain(&self, code: &str) -> Result<Option<Domain>>;
        async fn list_domains(&self) -> Result<Vec<Domain>>;
    }
}

/// Mock LLM client with a fixed response, or failing on every call.
#[derive(Clone)]
pub struct MockLLMClient {
    response: String,
    should_fail: bool,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl MockLLMClient {
    pub fn new(response: &str) -> Self {
        Self {
            response: response.to_string(),
            should_fail: false,
            prompts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn failing() -> Self {
        Self {
            should_fail: true,
            ..Self::new("")
        }
    }

    /// System prompts and prompts seen so far, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }

    fn answer(&self, seen: String) -> Result<String> {
        self.prompts.lock().push(seen);
        if self.should_fail {
            return Err(AppError::LLM("Mock LLM failure".to_string()));
        }
        Ok(self.response.clone())
    }
}

#[async_trait]
impl LLMClient for MockLLMClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.answer(prompt.to_string())
    }

    async fn generate_with_system(&self, system: &str, prompt: &str) -> Result<String> {
        self.answer(format!("{}\n{}", system, prompt))
    }

    async fn generate_with_history(&self, messages: &[(String, String)]) -> Result<String> {
        let joined = messages
            .iter()
            .map(|(role, content)| format!("{}: {}", role, content))
            .collect::<Vec<_>>()
            .join("\n");
        self.answer(joined)
    }

    fn model_name(&self) -> &str {
        "mock-model"
    }
}

/// What a [`ScriptedAgent`] does with each task.
#[derive(Clone)]
pub enum Script {
    Succeed { confidence: f64 },
    Fail(String),
    /// Fail for documents whose id is listed, succeed otherwise
    FailFor(Vec<String>),
}

/// Agent with scripted results that counts calls and tracks concurrency.
pub struct ScriptedAgent {
    config: AgentConfig,
    script: Script,
    delay: Duration,
    pub calls: Arc<AtomicUsize>,
    in_flight: Arc<AtomicUsize>,
    pub max_in_flight: Arc<AtomicUsize>,
    pub init_calls: Arc<AtomicUsize>,
}

impl ScriptedAgent {
    pub fn new(config: AgentConfig, script: Script) -> Self {
        Self {
            config,
            script,
            delay: Duration::ZERO,
            calls: Arc::new(AtomicUsize::new(0)),
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: Arc::new(AtomicUsize::new(0)),
            init_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Sleep this long inside each task.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl Agent for ScriptedAgent {
    fn config(&self) -> AgentConfig {
        self.config.clone()
    }

    fn kind(&self) -> &'static str {
        "scripted"
    }

    async fn initialize(&self) -> Result<()> {
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn perform_task(&self, task: &AgentTask, interaction: &Interaction) -> Result<AgentResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        interaction.step("scripted");

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let document_id = task.document.as_ref().map(|d| d.id.clone());
        match &self.script {
            Script::Succeed { confidence } => Ok(AgentResult::ok(
                serde_json::json!({ "document_id": document_id }),
                Some(*confidence),
            )),
            Script::Fail(message) => Err(AppError::Execution(message.clone())),
            Script::FailFor(ids) => match document_id {
                Some(id) if ids.contains(&id) => Err(AppError::Execution("boom".into())),
                _ => Ok(AgentResult::ok(serde_json::json!({}), Some(0.9))),
            },
        }
    }
}

/// Build a domain with one keyword set per `(agent_id, keywords)` pair.
pub fn domain(code: &str, keyword_sets: &[(&str, &[&str])]) -> Domain {
    let keyword_sets: HashMap<String, Vec<String>> = keyword_sets
        .iter()
        .map(|(agent, words)| {
            (
                agent.to_string(),
                words.iter().map(|w| w.to_string()).collect(),
            )
        })
        .collect();
    Domain {
        code: code.to_string(),
        name: code.to_string(),
        document_types: Vec::new(),
        keyword_sets,
        roles: Vec::new(),
        active: true,
    }
}

/// Runtime collaborators backed by in-memory fakes.
pub struct Harness {
    pub auth: Arc<SessionAuth>,
    pub domains: Arc<InMemoryDomainRegistry>,
    pub sink: Arc<MemorySink>,
    pub telemetry: TelemetryRecorder,
}

impl Harness {
    pub fn new() -> Self {
        let sink = Arc::new(MemorySink::new());
        Self {
            auth: Arc::new(SessionAuth::new()),
            domains: Arc::new(InMemoryDomainRegistry::default()),
            telemetry: TelemetryRecorder::new(sink.clone(), 256),
            sink,
        }
    }

    pub fn services(&self) -> AgentServices {
        AgentServices::new(self.auth.clone(), self.domains.clone(), self.telemetry.clone())
    }

    /// Wrap `agent` in a runtime and initialize it.
    pub async fn start<A: Agent>(&self, agent: A) -> Arc<dyn ManagedAgent> {
        let runtime = AgentRuntime::new(agent, self.services())
            .unwrap()
            .into_managed();
        runtime.initialize().await.unwrap();
        runtime
    }
}
