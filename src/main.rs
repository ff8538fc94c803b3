use anyhow::{Context, Result};
use energia::cli::output::Output;
use energia::cli::{commands, Cli, Commands};
use energia::types::AuthUser;
use energia::utils::logging::init_tracing;
use energia::{Orchestrator, OrchestratorConfig};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse_args();
    let out = if cli.no_color {
        Output::no_color()
    } else {
        Output::new()
    };

    let config = OrchestratorConfig::load(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    init_tracing(&config.logging, cli.verbose)?;

    if let Commands::Config { validate } = &cli.command {
        return commands::config(&out, &config, *validate);
    }

    out.banner();
    let orchestrator = Orchestrator::builder(config).build()?;
    orchestrator.initialize().await?;

    let outcome = match cli.command {
        Commands::Agents => {
            commands::agents(&out, &orchestrator);
            Ok(())
        }
        Commands::Route {
            query,
            document_type,
            role,
            threshold,
        } => commands::route(&out, &orchestrator, &query, document_type, role, threshold).await,
        Commands::Process {
            agent,
            input,
            user,
            role,
        } => {
            let user = user.zip(role).map(|(id, role)| AuthUser::new(id, role));
            commands::process(&out, &orchestrator, &agent, &input, user).await
        }
        Commands::Queue {
            agent,
            input,
            user,
            role,
        } => {
            let user = user.zip(role).map(|(id, role)| AuthUser::new(id, role));
            commands::queue(&out, &orchestrator, &agent, &input, user).await
        }
        Commands::Tune { plan } => commands::tune(&out, &orchestrator, &plan),
        Commands::Config { .. } => Ok(()),
    };

    if let Err(e) = &outcome {
        out.error(&format!("{:#}", e));
    }
    orchestrator.shutdown().await?;
    outcome
}
