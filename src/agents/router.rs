//! Mixture-of-experts agent selection.
//!
//! Every enabled agent whose domain resolves is scored on five signals:
//! keyword overlap with the query, document/role fit with the domain, how
//! often the agent handled recent messages of the conversation, how many
//! semantically similar documents share its domain, and its feedback score.
//! The weighted sum must clear the confidence threshold; the best
//! `max_candidates` come back ranked.

use crate::agents::ManagedAgent;
use crate::services::{ConversationHistory, DomainProvider, VectorSearch};
use crate::types::{AgentTask, AppError, ConversationMessage, Domain, Result, SimilarDocument};
use crate::utils::toml_config::{RouterConfig, ScoringWeights};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Feedback score bounds.
pub const MIN_PERFORMANCE_SCORE: f64 = 0.1;
pub const MAX_PERFORMANCE_SCORE: f64 = 2.0;

/// Context sub-score contribution when the user's role is one of the domain's roles.
const ROLE_AFFINITY_BONUS: f64 = 0.2;

/// History sub-score cap.
const HISTORY_SCORE_CAP: f64 = 0.5;

/// Per-agent feedback state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AgentPerformance {
    pub score: f64,
    pub feedback_count: u64,
}

impl Default for AgentPerformance {
    fn default() -> Self {
        Self {
            score: 1.0,
            feedback_count: 0,
        }
    }
}

/// The five sub-scores behind a composite score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    pub keyword: f64,
    pub context: f64,
    pub history: f64,
    pub vector: f64,
    pub feedback: f64,
}

impl ScoreBreakdown {
    pub fn composite(&self, weights: &ScoringWeights) -> f64 {
        weights.keyword * self.keyword
            + weights.context * self.context
            + weights.history * self.history
            + weights.vector * self.vector
            + weights.feedback * self.feedback
    }
}

/// A routing candidate.
#[derive(Clone)]
pub struct AgentScore {
    pub agent: Arc<dyn ManagedAgent>,
    pub score: f64,
    pub breakdown: ScoreBreakdown,
}

impl AgentScore {
    pub fn agent_id(&self) -> String {
        self.agent.id()
    }
}

impl std::fmt::Debug for AgentScore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentScore")
            .field("agent", &self.agent.id())
            .field("score", &self.score)
            .field("breakdown", &self.breakdown)
            .finish()
    }
}

/// Scores the agent pool for each incoming query.
pub struct Router {
    pool: RwLock<Vec<Arc<dyn ManagedAgent>>>,
    performance: RwLock<HashMap<String, AgentPerformance>>,
    threshold: RwLock<f64>,
    config: RouterConfig,
    domains: Arc<dyn DomainProvider>,
    vectors: Arc<dyn VectorSearch>,
    history: Option<Arc<dyn ConversationHistory>>,
}

impl Router {
    /// Create a router over `agents`; every agent starts at score 1.0.
    pub fn new(
        agents: Vec<Arc<dyn ManagedAgent>>,
        domains: Arc<dyn DomainProvider>,
        vectors: Arc<dyn VectorSearch>,
        config: RouterConfig,
    ) -> Self {
        let performance = agents
            .iter()
            .map(|a| (a.id(), AgentPerformance::default()))
            .collect();
        Self {
            pool: RwLock::new(agents),
            performance: RwLock::new(performance),
            threshold: RwLock::new(config.confidence_threshold),
            config,
            domains,
            vectors,
            history: None,
        }
    }

    /// Fall back to this provider when a task carries no history.
    pub fn with_history(mut self, history: Arc<dyn ConversationHistory>) -> Self {
        self.history = Some(history);
        self
    }

    /// Add an agent to the pool. Re-adding a known id keeps its performance state.
    pub fn add_agent(&self, agent: Arc<dyn ManagedAgent>) {
        let id = agent.id();
        let mut pool = self.pool.write();
        if pool.iter().any(|a| a.id() == id) {
            return;
        }
        pool.push(agent);
        self.performance.write().entry(id).or_default();
    }

    pub fn agent_ids(&self) -> Vec<String> {
        self.pool.read().iter().map(|a| a.id()).collect()
    }

    pub fn confidence_threshold(&self) -> f64 {
        *self.threshold.read()
    }

    /// Change the threshold for subsequent routing calls.
    pub fn set_confidence_threshold(&self, value: f64) -> Result<()> {
        if !(0.0..=1.0).contains(&value) {
            return Err(AppError::InvalidInput(format!(
                "confidence threshold must be within [0, 1], got {}",
                value
            )));
        }
        *self.threshold.write() = value;
        Ok(())
    }

    pub fn agent_performance(&self, agent_id: &str) -> Option<AgentPerformance> {
        self.performance.read().get(agent_id).copied()
    }

    /// Shift an agent's feedback score by `delta`, clamped to the allowed
    /// range. Unknown ids and non-finite deltas are ignored.
    pub fn adjust_agent_score(&self, agent_id: &str, delta: f64) -> Option<AgentPerformance> {
        if !delta.is_finite() {
            warn!(agent_id, delta, "Ignoring non-finite score adjustment");
            return None;
        }
        let mut performance = self.performance.write();
        let state = performance.get_mut(agent_id)?;
        state.score = (state.score + delta).clamp(MIN_PERFORMANCE_SCORE, MAX_PERFORMANCE_SCORE);
        state.feedback_count += 1;
        debug!(agent_id, delta, score = state.score, "Adjusted agent score");
        Some(*state)
    }

    /// Rank the agents best suited to `query` in the context of `task`.
    pub async fn select_agents(&self, query: &str, task: &AgentTask) -> Vec<AgentScore> {
        let similar = self.similar_documents(query).await;
        let history = self.recent_history(task).await;
        let threshold = self.confidence_threshold();
        let agents = self.pool.read().clone();

        let mut candidates = Vec::new();
        for agent in agents {
            let config = agent.get_config();
            if !config.enabled {
                continue;
            }

            let domain = match self.domains.get_domain(&config.domain_code).await {
                Ok(Some(domain)) if domain.active => domain,
                Ok(_) => continue,
                Err(e) => {
                    warn!(agent_id = %config.id, error = %e, "Domain lookup failed, skipping agent");
                    continue;
                }
            };

            let breakdown = ScoreBreakdown {
                keyword: keyword_score(query, &domain.keywords_for(&config.id)),
                context: context_score(task, &domain),
                history: history_score(&history, &config.id),
                vector: vector_score(&similar, &config.domain_code),
                feedback: self
                    .agent_performance(&config.id)
                    .unwrap_or_default()
                    .score,
            };
            let score = breakdown.composite(&self.config.weights);
            debug!(agent_id = %config.id, score, ?breakdown, "Scored agent");

            if score > threshold {
                candidates.push(AgentScore {
                    agent,
                    score,
                    breakdown,
                });
            }
        }

        candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
        candidates.truncate(self.config.max_candidates);
        candidates
    }

    async fn similar_documents(&self, query: &str) -> Vec<SimilarDocument> {
        let embedding = match self.vectors.embed(query).await {
            Ok(embedding) => embedding,
            Err(e) => {
                warn!(error = %e, "Embedding failed, routing without vector signal");
                return Vec::new();
            }
        };
        self.vectors
            .similarity_search(&embedding, self.config.vector_threshold, self.config.vector_limit)
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, "Similarity search failed, routing without vector signal");
                Vec::new()
            })
    }

    async fn recent_history(&self, task: &AgentTask) -> Vec<ConversationMessage> {
        let window = self.config.history_window;
        if !task.history.is_empty() {
            let start = task.history.len().saturating_sub(window);
            return task.history[start..].to_vec();
        }
        match &self.history {
            Some(provider) => provider
                .get_recent_messages(&task.session_id, window)
                .await
                .unwrap_or_else(|e| {
                    warn!(session_id = %task.session_id, error = %e, "History lookup failed");
                    Vec::new()
                }),
            None => Vec::new(),
        }
    }
}

/// Fraction of `keywords` found in `query`, case-insensitively.
pub fn keyword_score(query: &str, keywords: &[String]) -> f64 {
    if keywords.is_empty() {
        return 0.0;
    }
    let query = query.to_lowercase();
    let matched = keywords
        .iter()
        .filter(|k| query.contains(&k.to_lowercase()))
        .count();
    matched as f64 / keywords.len() as f64
}

/// Average of the document-type fit and the role affinity signals present on the task.
pub fn context_score(task: &AgentTask, domain: &Domain) -> f64 {
    let mut signals = Vec::with_capacity(2);

    if let Some(doc_type) = task.document.as_ref().and_then(|d| d.document_type()) {
        let accepted = domain
            .document_types
            .iter()
            .any(|t| t.eq_ignore_ascii_case(doc_type));
        signals.push(if accepted { 1.0 } else { 0.0 });
    }

    if let Some(user) = &task.user {
        let aligned = domain.roles.iter().any(|r| r == &user.role);
        signals.push(if aligned { ROLE_AFFINITY_BONUS } else { 0.0 });
    }

    if signals.is_empty() {
        0.0
    } else {
        signals.iter().sum::<f64>() / signals.len() as f64
    }
}

/// Share of `history` answered by `agent_id`, capped at 0.5.
pub fn history_score(history: &[ConversationMessage], agent_id: &str) -> f64 {
    if history.is_empty() {
        return 0.0;
    }
    let handled = history
        .iter()
        .filter(|m| m.agent_id.as_deref() == Some(agent_id))
        .count();
    (handled as f64 / history.len() as f64).min(HISTORY_SCORE_CAP)
}

/// Share of `similar` documents classified under `domain_code`.
pub fn vector_score(similar: &[SimilarDocument], domain_code: &str) -> f64 {
    if similar.is_empty() {
        return 0.0;
    }
    let matching = similar.iter().filter(|d| d.domain_code == domain_code).count();
    matching as f64 / similar.len() as f64
}
