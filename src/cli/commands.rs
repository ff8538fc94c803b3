//! Subcommand handlers.

use crate::cli::output::Output;
use crate::feedback::ImprovementPlan;
use crate::orchestrator::Orchestrator;
use crate::types::{AgentTask, AuthUser, BatchSummary, Document};
use crate::utils::toml_config::OrchestratorConfig;
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use std::path::Path;
use tokio::sync::broadcast::error::TryRecvError;

const CLI_SESSION: &str = "cli";

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("invalid JSON in {}", path.display()))
}

/// Plans may be given as a single object or an array.
fn read_plans(path: &Path) -> Result<Vec<ImprovementPlan>> {
    let value: serde_json::Value = read_json(path)?;
    let plans = if value.is_array() {
        serde_json::from_value(value)?
    } else {
        vec![serde_json::from_value(value)?]
    };
    Ok(plans)
}

fn print_summary(out: &Output, summary: &BatchSummary) {
    out.kv("total", &summary.total.to_string());
    out.kv("successful", &summary.successful.to_string());
    out.kv("failed", &summary.failed.to_string());
    for error in summary.results.iter().filter_map(|r| r.error.as_deref()) {
        out.list_item(error);
    }
}

pub fn agents(out: &Output, orchestrator: &Orchestrator) {
    out.header("Agents");
    if orchestrator.registry.is_empty() {
        out.warning("No agents configured");
        return;
    }
    out.table_header(&["Id", "Kind", "Domain", "Enabled"]);
    for agent in orchestrator.registry.list_agents() {
        let config = agent.get_config();
        let enabled = if config.enabled { "yes" } else { "no" };
        out.table_row(&[
            config.id.as_str(),
            agent.kind(),
            config.domain_code.as_str(),
            enabled,
        ]);
    }
}

pub async fn route(
    out: &Output,
    orchestrator: &Orchestrator,
    query: &str,
    document_type: Option<String>,
    role: Option<String>,
    threshold: Option<f64>,
) -> Result<()> {
    if let Some(threshold) = threshold {
        orchestrator.router.set_confidence_threshold(threshold)?;
    }

    let mut task = AgentTask::query(query, CLI_SESSION);
    if let Some(document_type) = document_type {
        task = task.with_document(
            Document::new("cli-document", "", "")
                .with_metadata("document_type", serde_json::json!(document_type)),
        );
    }
    if let Some(role) = role {
        task = task.with_user(Some(AuthUser::new(CLI_SESSION, role)));
    }

    let candidates = orchestrator.router.select_agents(query, &task).await;
    out.header("Routing");
    out.kv(
        "threshold",
        &format!("{:.2}", orchestrator.router.confidence_threshold()),
    );

    if candidates.is_empty() {
        out.warning("No agent cleared the confidence threshold");
        out.hint("Lower it with --threshold to see weaker candidates");
        return Ok(());
    }

    out.table_header(&["Agent", "Score", "Keyword", "Context", "History", "Vector", "Feedback"]);
    for candidate in &candidates {
        let b = candidate.breakdown;
        let cells = [
            candidate.agent_id(),
            format!("{:.3}", candidate.score),
            format!("{:.2}", b.keyword),
            format!("{:.2}", b.context),
            format!("{:.2}", b.history),
            format!("{:.2}", b.vector),
            format!("{:.2}", b.feedback),
        ];
        let cells: Vec<&str> = cells.iter().map(String::as_str).collect();
        out.table_row(&cells);
    }
    Ok(())
}

pub async fn process(
    out: &Output,
    orchestrator: &Orchestrator,
    agent_id: &str,
    input: &Path,
    user: Option<AuthUser>,
) -> Result<()> {
    let agent = orchestrator.registry.require_agent(agent_id)?;
    let documents: Vec<Option<Document>> = read_json(input)?;

    if let Some(user) = &user {
        orchestrator.auth.sign_in(user.id.clone());
    }

    let summary = agent.process_batch(documents, user).await?;
    out.header(&format!("Batch results for {}", agent_id));
    print_summary(out, &summary);

    if summary.failed == 0 {
        out.success("All documents processed");
    } else {
        out.warning(&format!("{} document(s) failed", summary.failed));
    }
    Ok(())
}

pub async fn queue(
    out: &Output,
    orchestrator: &Orchestrator,
    agent_id: &str,
    input: &Path,
    user: Option<AuthUser>,
) -> Result<()> {
    let agent = orchestrator.registry.require_agent(agent_id)?;
    let documents: Vec<Document> = read_json(input)?;
    let mut flushes = agent.subscribe_flushes();

    if let Some(user) = &user {
        orchestrator.auth.sign_in(user.id.clone());
    }

    out.header(&format!("Queueing {} document(s) for {}", documents.len(), agent_id));
    for document in documents {
        let id = document.id.clone();
        let receipt = agent
            .queue_for_batch_processing(document, user.clone())
            .await?;
        let note = if receipt.flushed { " (size flush)" } else { "" };
        out.list_item(&format!("{} queued at position {}{}", id, receipt.queued, note));
    }

    agent.cleanup().await?;
    out.newline();

    loop {
        match flushes.try_recv() {
            Ok(flush) => {
                out.subheader(&format!("{} flush of {}", flush.trigger, flush.size));
                print_summary(out, &flush.summary);
            }
            Err(TryRecvError::Lagged(missed)) => {
                out.warning(&format!("{} flush event(s) not shown", missed));
            }
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
        }
    }
    Ok(())
}

pub fn tune(out: &Output, orchestrator: &Orchestrator, plan: &Path) -> Result<()> {
    let plans = read_plans(plan)?;
    out.header("Tuning");

    for plan in &plans {
        let report = orchestrator.tuner.apply_plan(plan);
        out.subheader(&plan.agent_id);
        out.kv("applied", &report.applied.to_string());
        out.kv("skipped", &report.skipped.to_string());
        out.kv("failed", &report.failed.to_string());
        match orchestrator.router.agent_performance(&plan.agent_id) {
            Some(state) => out.kv(
                "performance",
                &format!("{:.2} after {} feedback(s)", state.score, state.feedback_count),
            ),
            None => out.warning("agent is not in the routing pool"),
        }
    }
    Ok(())
}

pub fn config(out: &Output, config: &OrchestratorConfig, validate_only: bool) -> Result<()> {
    let warnings = config.validate_with_warnings()?;

    if !validate_only {
        out.header("Configuration");
        out.kv("log level", &config.logging.level);
        out.kv(
            "confidence threshold",
            &format!("{:.2}", config.router.confidence_threshold),
        );
        out.kv("max candidates", &config.router.max_candidates.to_string());
        let w = config.router.weights;
        out.kv(
            "weights",
            &format!(
                "keyword {:.2}, context {:.2}, history {:.2}, vector {:.2}, feedback {:.2}",
                w.keyword, w.context, w.history, w.vector, w.feedback
            ),
        );

        out.subheader("Domains");
        for (code, domain) in &config.domains {
            let state = if domain.active { "" } else { " (inactive)" };
            out.list_item(&format!("{}{}", code, state));
        }

        out.subheader("Agents");
        for (id, entry) in &config.agents {
            out.list_item(&format!("{} [{}] in {}", id, entry.kind.as_str(), entry.config.domain_code));
        }
    }

    if warnings.is_empty() {
        out.success("Configuration is valid");
    } else {
        for warning in &warnings {
            out.warning(&warning.to_string());
        }
    }
    Ok(())
}
