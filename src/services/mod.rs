//! Collaborator interfaces consumed by the orchestration core.
//!
//! Storage, embeddings, authentication and conversation persistence are
//! owned elsewhere. The core only talks to them through these traits, and
//! every implementation is injected through constructors.

pub mod memory;

use crate::types::{ConversationMessage, Domain, Result, SimilarDocument};
use async_trait::async_trait;

pub use memory::{InMemoryConversationStore, InMemoryDomainRegistry, NullVectorSearch, SessionAuth};

/// Resolves domain codes to their definitions.
#[async_trait]
pub trait DomainProvider: Send + Sync {
    /// Look up a domain by code. `Ok(None)` when the code is unknown.
    async fn get_domain(&self, code: &str) -> Result<Option<Domain>>;

    /// All known domains.
    async fn list_domains(&self) -> Result<Vec<Domain>>;
}

/// Embedding and similarity lookup over stored documents.
#[async_trait]
pub trait VectorSearch: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    async fn similarity_search(
        &self,
        embedding: &[f32],
        threshold: f32,
        limit: usize,
    ) -> Result<Vec<SimilarDocument>>;
}

/// Authentication check for the caller of an agent.
#[async_trait]
pub trait AuthService: Send + Sync {
    /// Whether `user_id` is the currently authenticated principal.
    async fn verify(&self, user_id: &str) -> Result<bool>;
}

/// Source of prior conversation messages for a session.
#[async_trait]
pub trait ConversationHistory: Send + Sync {
    /// The last `limit` messages of `session_id`, oldest first.
    async fn get_recent_messages(
        &self,
        session_id: &str,
        limit: usize,
    ) -> Result<Vec<ConversationMessage>>;
}
