use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

// ============= Task Input Types =============

/// A document submitted to an agent for processing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    /// Domain code the document was classified under, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Document {
    /// Create a document with the given id, title and content.
    pub fn new(id: impl Into<String>, title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            content: content.into(),
            domain: None,
            metadata: HashMap::new(),
        }
    }

    /// Set the document's domain code.
    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    /// Attach a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Document type, read from the `document_type` (or shorter `type`) metadata key.
    pub fn document_type(&self) -> Option<&str> {
        self.metadata
            .get("document_type")
            .or_else(|| self.metadata.get("type"))
            .and_then(|v| v.as_str())
    }
}

/// The authenticated caller on whose behalf a task runs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthUser {
    pub id: String,
    pub role: String,
}

impl AuthUser {
    pub fn new(id: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: role.into(),
        }
    }
}

/// One prior question/answer exchange in a session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversationMessage {
    pub question: String,
    pub answer: String,
    /// The agent that produced the answer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub sources: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

/// Input to a single agent invocation.
///
/// Read-only to the agent for the duration of the invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentTask {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<Document>,
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<AuthUser>,
    /// Prior conversation, oldest first
    #[serde(default)]
    pub history: Vec<ConversationMessage>,
}

impl AgentTask {
    /// Create a free-text query task.
    pub fn query(query: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            query: Some(query.into()),
            document: None,
            session_id: session_id.into(),
            user: None,
            history: Vec::new(),
        }
    }

    /// Create a document-processing task.
    pub fn for_document(document: Document, session_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            query: None,
            document: Some(document),
            session_id: session_id.into(),
            user: None,
            history: Vec::new(),
        }
    }

    pub fn with_user(mut self, user: Option<AuthUser>) -> Self {
        self.user = user;
        self
    }

    pub fn with_document(mut self, document: Document) -> Self {
        self.document = Some(document);
        self
    }

    pub fn with_history(mut self, history: Vec<ConversationMessage>) -> Self {
        self.history = history;
        self
    }

    /// Identifier used when reporting on this task: the document id when a
    /// document is attached, the task id otherwise.
    pub fn subject_id(&self) -> &str {
        self.document
            .as_ref()
            .map(|d| d.id.as_str())
            .unwrap_or(self.id.as_str())
    }

    /// Text used for lexical matching: the query, falling back to the
    /// document title and content.
    pub fn text(&self) -> String {
        match (&self.query, &self.document) {
            (Some(q), _) => q.clone(),
            (None, Some(doc)) => format!("{}\n{}", doc.title, doc.content),
            (None, None) => String::new(),
        }
    }
}

// ============= Agent Output Types =============

/// Output of one agent invocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentResult {
    pub success: bool,
    /// Agent-defined payload
    pub data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Confidence in [0, 1]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl AgentResult {
    /// A successful result with a payload and optional confidence (clamped to [0, 1]).
    pub fn ok(data: serde_json::Value, confidence: Option<f64>) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            confidence: confidence.map(|c| c.clamp(0.0, 1.0)),
        }
    }

    /// A failed result carrying a human-readable error.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            confidence: None,
        }
    }
}

/// Aggregate outcome of a batch run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub results: Vec<AgentResult>,
}

impl BatchSummary {
    /// Build a summary from per-document results.
    pub fn from_results(results: Vec<AgentResult>) -> Self {
        let successful = results.iter().filter(|r| r.success).count();
        Self {
            total: results.len(),
            successful,
            failed: results.len() - successful,
            results,
        }
    }
}

// ============= Telemetry Types =============

/// One step of an agent's reasoning trace.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReasoningStep {
    pub step: String,
    pub timestamp: DateTime<Utc>,
}

/// Telemetry record emitted once per invocation. Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionMetrics {
    pub interaction_id: String,
    pub agent_id: String,
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub response_time_ms: u64,
    pub confidence_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_trace: Option<Vec<ReasoningStep>>,
    pub created_at: DateTime<Utc>,
}

// ============= Domain Types =============

/// A subject-area classification as resolved by a domain provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Domain {
    pub code: String,
    #[serde(default)]
    pub name: String,
    /// Document types this domain accepts
    #[serde(default)]
    pub document_types: Vec<String>,
    /// Keyword sets keyed by agent id (or `default` for the domain-wide set)
    #[serde(default)]
    pub keyword_sets: HashMap<String, Vec<String>>,
    /// User roles with an affinity for this domain
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl Domain {
    /// Keywords relevant to `agent_id`: its own set when one is configured,
    /// otherwise the domain-wide `default` set. Other agents' sets never leak in.
    pub fn keywords_for(&self, agent_id: &str) -> Vec<String> {
        self.keyword_sets
            .get(agent_id)
            .or_else(|| self.keyword_sets.get("default"))
            .cloned()
            .unwrap_or_default()
    }
}

/// A document returned by a vector similarity search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarDocument {
    pub document_id: String,
    pub domain_code: String,
    pub similarity: f32,
}

// ============= Error Types =============

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Agent security error: {0}")]
    Security(String),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Telemetry error: {0}")]
    Telemetry(String),

    #[error("LLM error: {0}")]
    LLM(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Whether this is the agent-security error kind.
    pub fn is_security(&self) -> bool {
        matches!(self, AppError::Security(_))
    }

    /// The bare message without the kind prefix.
    pub fn message(&self) -> &str {
        match self {
            AppError::Configuration(msg)
            | AppError::Security(msg)
            | AppError::Execution(msg)
            | AppError::NotFound(msg)
            | AppError::InvalidInput(msg)
            | AppError::Telemetry(msg)
            | AppError::LLM(msg)
            | AppError::Internal(msg) => msg,
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::InvalidInput(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
