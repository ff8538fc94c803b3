//! CLI module for the orchestration core
//!
//! Provides command-line interface parsing for the energia-orchestrator binary.
//! Uses clap for argument parsing and owo-colors for colored terminal output.

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Energia agent orchestrator
///
/// Routes documents and questions to specialised agents, runs them in
/// batches and applies feedback-driven tuning.
#[derive(Parser, Debug)]
#[command(
    name = "energia-orchestrator",
    author = "Energia AI <dev@energia-ai.hu>",
    version,
    about = "Energia agent orchestration core",
    after_help = "EXAMPLES:\n    \
                  energia-orchestrator agents\n    \
                  energia-orchestrator route \"contract risk review\" --document-type contract\n    \
                  energia-orchestrator process --agent contract-analyzer --input docs.json\n    \
                  energia-orchestrator tune --plan plan.json"
)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "energia.toml", global = true)]
    pub config: PathBuf,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List registered agents
    Agents,

    /// Rank the agents best suited to a query
    Route {
        /// Query text
        query: String,

        /// Document type of the attached document, if any
        #[arg(long)]
        document_type: Option<String>,

        /// Role of the calling user
        #[arg(long)]
        role: Option<String>,

        /// Override the confidence threshold for this run
        #[arg(long)]
        threshold: Option<f64>,
    },

    /// Process a JSON array of documents with one agent
    Process {
        /// Agent id
        #[arg(short, long)]
        agent: String,

        /// JSON file with an array of documents (null entries are skipped)
        #[arg(short, long)]
        input: PathBuf,

        /// Act as this authenticated user
        #[arg(long, requires = "role")]
        user: Option<String>,

        /// Role of the user
        #[arg(long)]
        role: Option<String>,
    },

    /// Queue documents one by one and report each flush
    Queue {
        /// Agent id
        #[arg(short, long)]
        agent: String,

        /// JSON file with an array of documents
        #[arg(short, long)]
        input: PathBuf,

        /// Act as this authenticated user
        #[arg(long, requires = "role")]
        user: Option<String>,

        /// Role of the user
        #[arg(long)]
        role: Option<String>,
    },

    /// Apply an improvement plan
    Tune {
        /// JSON file with one plan or an array of plans
        #[arg(short, long)]
        plan: PathBuf,
    },

    /// Show configuration information
    Config {
        /// Only validate and print warnings
        #[arg(long)]
        validate: bool,
    },
}

impl Cli {
    /// Parse CLI arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
