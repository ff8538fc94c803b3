//! # Energia agent orchestration core
//!
//! Routes documents and questions to a pool of specialised agents and runs
//! them under a shared lifecycle:
//!
//! - [`agents::AgentRuntime`] wraps any [`agents::Agent`] with security
//!   checks, telemetry, result caching and a size-or-time debounced batch queue.
//! - [`agents::Router`] picks candidates with a weighted five-signal score.
//! - [`feedback::PerformanceTuner`] applies feedback-derived improvement plans
//!   to routing scores and agent configuration.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use energia::{Orchestrator, OrchestratorConfig};
//! use energia::types::AgentTask;
//!
//! let config = OrchestratorConfig::load("energia.toml")?;
//! let orchestrator = Orchestrator::builder(config).build()?;
//! orchestrator.initialize().await?;
//!
//! let task = AgentTask::query("contract risk review", "session-1");
//! for candidate in orchestrator.router.select_agents("contract risk review", &task).await {
//!     println!("{} {:.2}", candidate.agent_id(), candidate.score);
//! }
//! ```

/// Agent trait, runtime, registry and router.
pub mod agents;
/// Command-line interface.
pub mod cli;
/// Improvement plans and the performance tuner.
pub mod feedback;
/// LLM completion abstraction.
pub mod llm;
/// Wiring from configuration.
pub mod orchestrator;
/// Collaborator interfaces and in-memory implementations.
pub mod services;
/// Interaction telemetry.
pub mod telemetry;
/// Core types (tasks, results, errors).
pub mod types;
/// Configuration and logging utilities.
pub mod utils;

// Re-export commonly used types
pub use agents::{Agent, AgentRegistry, AgentRuntime, ManagedAgent, Router};
pub use feedback::{ImprovementPlan, PerformanceTuner};
pub use llm::LLMClient;
pub use orchestrator::{Orchestrator, OrchestratorBuilder};
pub use telemetry::TelemetryRecorder;
pub use types::{AppError, Result};
pub use utils::toml_config::{AgentConfig, OrchestratorConfig};
