//! LLM completion abstraction
//!
//! Agents treat raw text completion as an optional collaborator. Concrete
//! provider clients live outside this crate; anything implementing
//! [`LLMClient`] can be handed to an agent at construction time.

/// Core LLM client trait.
pub mod client;

pub use client::LLMClient;
