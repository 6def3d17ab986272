use anyhow::Result;
use clap::Parser;
use std::process::ExitCode;

use project_orchestrator::cli::commands::{
    Command, ConfigCommand, CreateCommand, GetCommand, EXIT_FAILURE,
};
use project_orchestrator::cli::{Cli, Commands};
use project_orchestrator::bootstrap::has_durable_registry;
use project_orchestrator::{init_telemetry, initialize_project_management, OrchestratorConfig};

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(EXIT_FAILURE)
        }
    }
}

fn run(cli: Cli) -> Result<u8> {
    let _ = OrchestratorConfig::load_env_file();
    let config = OrchestratorConfig::load_from(cli.config.as_deref())?;
    init_telemetry(&config.observability)?;

    tokio::runtime::Runtime::new()?.block_on(async {
        match cli.command {
            Commands::Create {
                name,
                description,
                settings,
                set,
                project_type,
                seo,
            } => {
                let router = initialize_project_management(&config).await?;
                CreateCommand::new(router, name)
                    .with_description(description)
                    .with_settings_file(settings)
                    .with_overrides(set)
                    .with_project_type(project_type)
                    .with_seo(seo)
                    .execute()
                    .await
            }
            Commands::Get { id } => {
                let router = initialize_project_management(&config).await?;
                GetCommand::new(router, id)
                    .with_durable_registry(has_durable_registry(&config))
                    .execute()
                    .await
            }
            Commands::Config => ConfigCommand::new(config.clone()).execute().await,
        }
    })
}
