//! In-process collaborator implementations used by the binary and tests.

use super::{AuthService, ConversationHistory, DomainProvider, VectorSearch};
use crate::types::{ConversationMessage, Domain, Result, SimilarDocument};
use crate::utils::toml_config::OrchestratorConfig;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

/// Domain definitions held in memory, usually built from `[domains]`.
#[derive(Debug, Default)]
pub struct InMemoryDomainRegistry {
    domains: RwLock<HashMap<String, Domain>>,
}

impl InMemoryDomainRegistry {
    pub fn new(domains: impl IntoIterator<Item = Domain>) -> Self {
        Self {
            domains: RwLock::new(domains.into_iter().map(|d| (d.code.clone(), d)).collect()),
        }
    }

    pub fn from_config(config: &OrchestratorConfig) -> Self {
        Self::new(config.all_domains())
    }

    /// Add or replace a domain.
    pub fn upsert(&self, domain: Domain) {
        self.domains.write().insert(domain.code.clone(), domain);
    }
}

#[async_trait]
impl DomainProvider for InMemoryDomainRegistry {
    async fn get_domain(&self, code: &str) -> Result<Option<Domain>> {
        Ok(self.domains.read().get(code).cloned())
    }

    async fn list_domains(&self) -> Result<Vec<Domain>> {
        let mut domains: Vec<Domain> = self.domains.read().values().cloned().collect();
        domains.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(domains)
    }
}

/// Conversation messages per session, oldest first.
#[derive(Debug, Default)]
pub struct InMemoryConversationStore {
    sessions: RwLock<HashMap<String, Vec<ConversationMessage>>>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, session_id: &str, message: ConversationMessage) {
        self.sessions
            .write()
            .entry(session_id.to_string())
            .or_default()
            .push(message);
    }
}

#[async_trait]
impl ConversationHistory for InMemoryConversationStore {
    async fn get_recent_messages(
        &self,
        session_id: &str,
        limit: usize,
    ) -> Result<Vec<ConversationMessage>> {
        let sessions = self.sessions.read();
        let messages = match sessions.get(session_id) {
            Some(messages) => messages,
            None => return Ok(Vec::new()),
        };
        let start = messages.len().saturating_sub(limit);
        Ok(messages[start..].to_vec())
    }
}

/// Tracks the single principal authenticated in this process.
#[derive(Debug, Default)]
pub struct SessionAuth {
    current: RwLock<Option<String>>,
}

impl SessionAuth {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn authenticated(user_id: impl Into<String>) -> Self {
        Self {
            current: RwLock::new(Some(user_id.into())),
        }
    }

    pub fn sign_in(&self, user_id: impl Into<String>) {
        *self.current.write() = Some(user_id.into());
    }

    pub fn sign_out(&self) {
        *self.current.write() = None;
    }
}

#[async_trait]
impl AuthService for SessionAuth {
    async fn verify(&self, user_id: &str) -> Result<bool> {
        Ok(self.current.read().as_deref() == Some(user_id))
    }
}

/// Vector search that never finds anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullVectorSearch;

#[async_trait]
impl VectorSearch for NullVectorSearch {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Ok(Vec::new())
    }

    async fn similarity_search(
        &self,
        _embedding: &[f32],
        _threshold: f32,
        _limit: usize,
    ) -> Result<Vec<SimilarDocument>> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn message(question: &str) -> ConversationMessage {
        ConversationMessage {
            question: question.to_string(),
            answer: String::new(),
            agent_id: None,
            sources: vec![],
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_recent_messages_keeps_tail() {
        let store = InMemoryConversationStore::new();
        for i in 0..7 {
            store.append("s1", message(&format!("q{}", i)));
        }
        let recent = store.get_recent_messages("s1", 5).await.unwrap();
        assert_eq!(recent.len(), 5);
        assert_eq!(recent[0].question, "q2");
        assert_eq!(recent[4].question, "q6");

        assert!(store.get_recent_messages("other", 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_session_auth() {
        let auth = SessionAuth::authenticated("alice");
        assert!(auth.verify("alice").await.unwrap());
        assert!(!auth.verify("bob").await.unwrap());

        auth.sign_out();
        assert!(!auth.verify("alice").await.unwrap());
    }

    #[tokio::test]
    async fn test_domain_registry_lookup() {
        let registry = InMemoryDomainRegistry::default();
        assert!(registry.get_domain("energy").await.unwrap().is_none());

        registry.upsert(Domain {
            code: "energy".into(),
            name: "Energy".into(),
            document_types: vec![],
            keyword_sets: HashMap::new(),
            roles: vec![],
            active: true,
        });
        let domain = registry.get_domain("energy").await.unwrap().unwrap();
        assert_eq!(domain.name, "Energy");
        assert_eq!(registry.list_domains().await.unwrap().len(), 1);
    }
}
