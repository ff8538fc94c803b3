//! TOML-based configuration for the orchestration core
//!
//! This module provides declarative configuration for logging, routing,
//! telemetry, domains and agents via a TOML file (`energia.toml`).
//!
//! Agent entries double as the runtime [`AgentConfig`]: the table key is the
//! agent id, and the same invariants (non-empty id, name and domain code) are
//! enforced whether a config arrives from disk or through `update_config`.

use crate::types::{AppError, Domain};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

/// Root configuration structure loaded from energia.toml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub router: RouterConfig,

    #[serde(default)]
    pub telemetry: TelemetryConfig,

    /// Domain definitions keyed by domain code
    #[serde(default)]
    pub domains: BTreeMap<String, DomainConfig>,

    /// Agent definitions keyed by agent id
    #[serde(default)]
    pub agents: BTreeMap<String, AgentEntry>,
}

// ============= Logging Configuration =============

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` takes precedence
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON log lines instead of the human-readable format
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// ============= Router Configuration =============

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Minimum composite score a candidate must exceed
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,

    /// Maximum number of candidates returned per routing call
    #[serde(default = "default_max_candidates")]
    pub max_candidates: usize,

    /// Number of recent conversation messages considered for the history score
    #[serde(default = "default_history_window")]
    pub history_window: usize,

    /// Similarity threshold passed to the vector search service
    #[serde(default = "default_vector_threshold")]
    pub vector_threshold: f32,

    /// Maximum number of similar documents requested from the vector search service
    #[serde(default = "default_vector_limit")]
    pub vector_limit: usize,

    #[serde(default)]
    pub weights: ScoringWeights,
}

fn default_confidence_threshold() -> f64 {
    0.7
}

fn default_max_candidates() -> usize {
    3
}

fn default_history_window() -> usize {
    5
}

fn default_vector_threshold() -> f32 {
    0.7
}

fn default_vector_limit() -> usize {
    5
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: default_confidence_threshold(),
            max_candidates: default_max_candidates(),
            history_window: default_history_window(),
            vector_threshold: default_vector_threshold(),
            vector_limit: default_vector_limit(),
            weights: ScoringWeights::default(),
        }
    }
}

/// Weights of the five routing sub-scores.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    #[serde(default = "default_keyword_weight")]
    pub keyword: f64,
    #[serde(default = "default_minor_weight")]
    pub context: f64,
    #[serde(default = "default_minor_weight")]
    pub history: f64,
    #[serde(default = "default_minor_weight")]
    pub vector: f64,
    #[serde(default = "default_feedback_weight")]
    pub feedback: f64,
}

fn default_keyword_weight() -> f64 {
    0.35
}

fn default_minor_weight() -> f64 {
    0.15
}

fn default_feedback_weight() -> f64 {
    0.20
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            keyword: default_keyword_weight(),
            context: default_minor_weight(),
            history: default_minor_weight(),
            vector: default_minor_weight(),
            feedback: default_feedback_weight(),
        }
    }
}

impl ScoringWeights {
    pub fn total(&self) -> f64 {
        self.keyword + self.context + self.history + self.vector + self.feedback
    }

    fn all_non_negative(&self) -> bool {
        [
            self.keyword,
            self.context,
            self.history,
            self.vector,
            self.feedback,
        ]
        .iter()
        .all(|w| *w >= 0.0)
    }
}

// ============= Telemetry Configuration =============

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Capacity of the bounded channel between the request path and the sink
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Append interaction records to this JSONL file in addition to the log
    #[serde(default)]
    pub jsonl_path: Option<PathBuf>,
}

fn default_channel_capacity() -> usize {
    1024
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
            jsonl_path: None,
        }
    }
}

// ============= Domain Configuration =============

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DomainConfig {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub document_types: Vec<String>,

    /// Keyword sets keyed by agent id, or `default` for the domain-wide set
    #[serde(default)]
    pub keywords: HashMap<String, Vec<String>>,

    /// User roles with an affinity for this domain
    #[serde(default)]
    pub roles: Vec<String>,

    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_true() -> bool {
    true
}

impl DomainConfig {
    /// Convert into the [`Domain`] served by a domain provider.
    pub fn to_domain(&self, code: &str) -> Domain {
        Domain {
            code: code.to_string(),
            name: if self.name.is_empty() {
                code.to_string()
            } else {
                self.name.clone()
            },
            document_types: self.document_types.clone(),
            keyword_sets: self.keywords.clone(),
            roles: self.roles.clone(),
            active: self.active,
        }
    }
}

// ============= Agent Configuration =============

/// Which built-in agent implementation backs a configured agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AgentKind {
    ContractAnalysis,
    GeneralPurpose,
    LegalResearch,
    CrossDomainImpact,
    Example,
}

impl AgentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentKind::ContractAnalysis => "contract-analysis",
            AgentKind::GeneralPurpose => "general-purpose",
            AgentKind::LegalResearch => "legal-research",
            AgentKind::CrossDomainImpact => "cross-domain-impact",
            AgentKind::Example => "example",
        }
    }
}

/// An `[agents.<id>]` table: the implementation kind plus the agent's config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentEntry {
    pub kind: AgentKind,

    #[serde(flatten)]
    pub config: AgentConfig,
}

/// Identity and policy for one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Unique agent id; filled from the table key when loaded from TOML
    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Domain classification tag
    #[serde(default)]
    pub domain_code: String,

    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub security: Option<SecurityConfig>,

    #[serde(default)]
    pub batch: Option<BatchConfig>,

    #[serde(default)]
    pub cache: Option<CachePolicy>,

    /// Free-form agent metadata (e.g. `system_prompt`)
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// Who may invoke an agent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SecurityConfig {
    #[serde(default)]
    pub require_auth: bool,

    /// When set, the caller's role must be a member
    #[serde(default)]
    pub allowed_roles: Option<HashSet<String>>,

    /// When set, the agent's own domain code must be a member
    #[serde(default)]
    pub allowed_domains: Option<HashSet<String>>,
}

/// Size and time limits of the batch queue.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BatchConfig {
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,

    #[serde(default = "default_batch_timeout_ms")]
    pub batch_timeout_ms: u64,
}

fn default_max_batch_size() -> usize {
    10
}

fn default_batch_timeout_ms() -> u64 {
    5000
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_batch_size: default_max_batch_size(),
            batch_timeout_ms: default_batch_timeout_ms(),
        }
    }
}

/// Result cache policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachePolicy {
    pub ttl_ms: u64,
    pub max_size: usize,
}

/// Partial update applied by `update_config`. `None` fields are left unchanged;
/// metadata entries are merged key by key.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentConfigPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub domain_code: Option<String>,
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub security: Option<SecurityConfig>,
    #[serde(default)]
    pub batch: Option<BatchConfig>,
    #[serde(default)]
    pub cache: Option<CachePolicy>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// Metadata key holding an agent's system prompt.
pub const SYSTEM_PROMPT_KEY: &str = "system_prompt";

impl AgentConfig {
    /// Create an enabled config with no policies.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        domain_code: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            domain_code: domain_code.into(),
            enabled: true,
            security: None,
            batch: None,
            cache: None,
            metadata: HashMap::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_security(mut self, security: SecurityConfig) -> Self {
        self.security = Some(security);
        self
    }

    pub fn with_batch(mut self, batch: BatchConfig) -> Self {
        self.batch = Some(batch);
        self
    }

    pub fn with_cache(mut self, cache: CachePolicy) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Check the mandatory fields and policy bounds.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.id.trim().is_empty() {
            return Err(AppError::Configuration("agent id must not be empty".into()));
        }
        if self.name.trim().is_empty() {
            return Err(AppError::Configuration(format!(
                "agent '{}': name must not be empty",
                self.id
            )));
        }
        if self.domain_code.trim().is_empty() {
            return Err(AppError::Configuration(format!(
                "agent '{}': domain code must not be empty",
                self.id
            )));
        }
        if let Some(batch) = &self.batch {
            if batch.max_batch_size == 0 {
                return Err(AppError::Configuration(format!(
                    "agent '{}': max_batch_size must be at least 1",
                    self.id
                )));
            }
        }
        if let Some(cache) = &self.cache {
            if cache.max_size == 0 {
                return Err(AppError::Configuration(format!(
                    "agent '{}': cache max_size must be at least 1",
                    self.id
                )));
            }
        }
        Ok(())
    }

    /// Merge `patch` into a copy of this config and validate the result.
    /// `self` is untouched when validation fails.
    pub fn merged(&self, patch: AgentConfigPatch) -> Result<AgentConfig, AppError> {
        let mut next = self.clone();
        if let Some(name) = patch.name {
            next.name = name;
        }
        if let Some(description) = patch.description {
            next.description = description;
        }
        if let Some(domain_code) = patch.domain_code {
            next.domain_code = domain_code;
        }
        if let Some(enabled) = patch.enabled {
            next.enabled = enabled;
        }
        if patch.security.is_some() {
            next.security = patch.security;
        }
        if patch.batch.is_some() {
            next.batch = patch.batch;
        }
        if patch.cache.is_some() {
            next.cache = patch.cache;
        }
        next.metadata.extend(patch.metadata);
        next.validate()?;
        Ok(next)
    }

    /// Effective batch policy (defaults when none is configured).
    pub fn batch_policy(&self) -> BatchConfig {
        self.batch.unwrap_or_default()
    }

    /// System prompt stored in metadata, if any.
    pub fn system_prompt(&self) -> Option<&str> {
        self.metadata.get(SYSTEM_PROMPT_KEY).and_then(|v| v.as_str())
    }
}

// ============= Configuration Loading & Validation =============

/// Configuration warnings that don't prevent operation but may indicate issues
#[derive(Debug, Clone)]
pub struct ConfigWarning {
    pub kind: ConfigWarningKind,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigWarningKind {
    WeightsNotNormalized,
    UnusedDomain,
    DisabledAgent,
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Errors that can occur during configuration loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Domain '{0}' referenced by agent '{1}' does not exist")]
    MissingDomain(String, String),
}

impl From<ConfigError> for AppError {
    fn from(err: ConfigError) -> Self {
        AppError::Configuration(err.to_string())
    }
}

impl OrchestratorConfig {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let mut config: OrchestratorConfig = toml::from_str(content)?;

        // Table keys are the agent ids
        for (id, entry) in config.agents.iter_mut() {
            if entry.config.id.is_empty() {
                entry.config.id = id.clone();
            } else if entry.config.id != *id {
                return Err(ConfigError::ValidationError(format!(
                    "agent table '{}' declares a different id '{}'",
                    id, entry.config.id
                )));
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration for internal consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        let threshold = self.router.confidence_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(ConfigError::ValidationError(format!(
                "router.confidence_threshold must be within [0, 1], got {}",
                threshold
            )));
        }

        if self.router.max_candidates == 0 {
            return Err(ConfigError::ValidationError(
                "router.max_candidates must be at least 1".into(),
            ));
        }

        if !self.router.weights.all_non_negative() {
            return Err(ConfigError::ValidationError(
                "router.weights must all be non-negative".into(),
            ));
        }

        if self.telemetry.channel_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "telemetry.channel_capacity must be at least 1".into(),
            ));
        }

        for (id, entry) in &self.agents {
            entry
                .config
                .validate()
                .map_err(|e| ConfigError::ValidationError(e.message().to_string()))?;

            if !self.domains.contains_key(&entry.config.domain_code) {
                return Err(ConfigError::MissingDomain(
                    entry.config.domain_code.clone(),
                    id.clone(),
                ));
            }
        }

        Ok(())
    }

    /// Validate and collect non-fatal warnings
    pub fn validate_with_warnings(&self) -> Result<Vec<ConfigWarning>, ConfigError> {
        self.validate()?;

        let mut warnings = Vec::new();

        let total = self.router.weights.total();
        if (total - 1.0).abs() > 1e-6 {
            warnings.push(ConfigWarning {
                kind: ConfigWarningKind::WeightsNotNormalized,
                message: format!("router weights sum to {:.3}, not 1.0", total),
            });
        }

        for code in self.domains.keys() {
            let used = self
                .agents
                .values()
                .any(|entry| entry.config.domain_code == *code);
            if !used {
                warnings.push(ConfigWarning {
                    kind: ConfigWarningKind::UnusedDomain,
                    message: format!("domain '{}' is not used by any agent", code),
                });
            }
        }

        for (id, entry) in &self.agents {
            if !entry.config.enabled {
                warnings.push(ConfigWarning {
                    kind: ConfigWarningKind::DisabledAgent,
                    message: format!("agent '{}' is disabled and will never be routed to", id),
                });
            }
        }

        Ok(warnings)
    }

    /// Get an agent entry by id
    pub fn get_agent(&self, id: &str) -> Option<&AgentEntry> {
        self.agents.get(id)
    }

    /// Resolve a domain by code
    pub fn get_domain(&self, code: &str) -> Option<Domain> {
        self.domains.get(code).map(|d| d.to_domain(code))
    }

    /// All configured domains
    pub fn all_domains(&self) -> Vec<Domain> {
        self.domains
            .iter()
            .map(|(code, d)| d.to_domain(code))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_config() -> String {
        r#"
[logging]
level = "debug"

[router]
confidence_threshold = 0.5
max_candidates = 2

[router.weights]
keyword = 0.35
context = 0.15
history = 0.15
vector = 0.15
feedback = 0.20

[telemetry]
channel_capacity = 64

[domains.energy]
name = "Energy law"
document_types = ["contract", "decree"]
roles = ["lawyer"]

[domains.energy.keywords]
contract-analyzer = ["contract", "risk"]
default = ["energy", "network"]

[domains.general]
name = "General"

[agents.contract-analyzer]
kind = "contract-analysis"
name = "Contract analyzer"
domain_code = "energy"

[agents.contract-analyzer.security]
require_auth = true
allowed_roles = ["lawyer", "admin"]

[agents.contract-analyzer.batch]
max_batch_size = 2
batch_timeout_ms = 1000

[agents.helper]
kind = "general-purpose"
name = "Helper"
domain_code = "general"
enabled = false

[agents.helper.metadata]
system_prompt = "Be brief."
"#
        .to_string()
    }

    #[test]
    fn test_parse_config() {
        let config = OrchestratorConfig::from_toml_str(&create_test_config()).unwrap();

        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.router.confidence_threshold, 0.5);
        assert_eq!(config.router.max_candidates, 2);
        assert_eq!(config.router.history_window, 5);
        assert_eq!(config.telemetry.channel_capacity, 64);

        let agent = config.get_agent("contract-analyzer").unwrap();
        assert_eq!(agent.kind, AgentKind::ContractAnalysis);
        assert_eq!(agent.config.id, "contract-analyzer");
        assert!(agent.config.enabled);
        let security = agent.config.security.as_ref().unwrap();
        assert!(security.require_auth);
        assert!(security.allowed_roles.as_ref().unwrap().contains("lawyer"));
        assert_eq!(agent.config.batch_policy().max_batch_size, 2);

        let helper = config.get_agent("helper").unwrap();
        assert!(!helper.config.enabled);
        assert_eq!(helper.config.system_prompt(), Some("Be brief."));
    }

    #[test]
    fn test_domain_conversion() {
        let config = OrchestratorConfig::from_toml_str(&create_test_config()).unwrap();
        let energy = config.get_domain("energy").unwrap();
        assert_eq!(energy.name, "Energy law");
        assert_eq!(energy.keywords_for("contract-analyzer"), vec!["contract", "risk"]);
        assert!(energy.active);

        let general = config.get_domain("general").unwrap();
        assert_eq!(general.name, "General");
        assert!(general.keyword_sets.is_empty());
    }

    #[test]
    fn test_validation_missing_domain() {
        let content = r#"
[agents.orphan]
kind = "example"
name = "Orphan"
domain_code = "missing"
"#;
        let result = OrchestratorConfig::from_toml_str(content);
        assert!(matches!(result, Err(ConfigError::MissingDomain(d, a)) if d == "missing" && a == "orphan"));
    }

    #[test]
    fn test_validation_empty_name() {
        let content = r#"
[domains.general]

[agents.nameless]
kind = "example"
domain_code = "general"
"#;
        let result = OrchestratorConfig::from_toml_str(content);
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_validation_threshold_out_of_range() {
        let content = r#"
[router]
confidence_threshold = 1.5
"#;
        assert!(OrchestratorConfig::from_toml_str(content).is_err());
    }

    #[test]
    fn test_defaults() {
        let config = OrchestratorConfig::from_toml_str("").unwrap();
        assert_eq!(config.router.confidence_threshold, 0.7);
        assert_eq!(config.router.max_candidates, 3);
        assert_eq!(config.router.weights, ScoringWeights::default());
        assert_eq!(config.telemetry.channel_capacity, 1024);
        assert!(config.agents.is_empty());

        let batch = BatchConfig::default();
        assert_eq!(batch.max_batch_size, 10);
        assert_eq!(batch.batch_timeout_ms, 5000);
    }

    #[test]
    fn test_warnings() {
        let content = r#"
[router.weights]
keyword = 0.5

[domains.general]
[domains.unused]

[agents.idle]
kind = "example"
name = "Idle"
domain_code = "general"
enabled = false
"#;
        let config = OrchestratorConfig::from_toml_str(content).unwrap();
        let warnings = config.validate_with_warnings().unwrap();
        let kinds: Vec<_> = warnings.iter().map(|w| w.kind.clone()).collect();
        assert!(kinds.contains(&ConfigWarningKind::WeightsNotNormalized));
        assert!(kinds.contains(&ConfigWarningKind::UnusedDomain));
        assert!(kinds.contains(&ConfigWarningKind::DisabledAgent));
    }

    #[test]
    fn test_merge_revalidates() {
        let config = AgentConfig::new("a", "Agent A", "energy");

        let updated = config
            .merged(AgentConfigPatch {
                description: Some("updated".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(updated.description, "updated");
        assert_eq!(updated.name, "Agent A");

        let invalid = config.merged(AgentConfigPatch {
            name: Some("  ".into()),
            ..Default::default()
        });
        assert!(matches!(invalid, Err(AppError::Configuration(_))));
    }

    #[test]
    fn test_merge_metadata() {
        let mut patch = AgentConfigPatch::default();
        patch.metadata.insert(
            SYSTEM_PROMPT_KEY.to_string(),
            serde_json::json!("Cite every source."),
        );
        let updated = AgentConfig::new("a", "A", "energy").merged(patch).unwrap();
        assert_eq!(updated.system_prompt(), Some("Cite every source."));
    }
}
