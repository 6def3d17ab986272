use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub mod commands;

#[derive(Parser)]
#[command(name = "project-orchestrator")]
#[command(about = "Create projects across relational, vector and template stores")]
#[command(long_about = "Creates a project by provisioning its database schema, vector collection and \
                       adapted templates in order, runs registered extensions, validates the result, \
                       and rolls everything back if a step fails.")]
pub struct Cli {
    /// Configuration file (defaults to ./project-orchestrator.toml when present)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a project and print its final state as JSON
    Create {
        /// Project name, unique across the registry
        #[arg(long)]
        name: String,
        /// Project description as a JSON object
        #[arg(long, value_name = "JSON")]
        description: Option<String>,
        /// Settings file (JSON or TOML)
        #[arg(long, value_name = "FILE")]
        settings: Option<PathBuf>,
        /// Individual setting; the value is parsed as JSON when possible
        #[arg(long = "set", value_name = "KEY=VALUE")]
        set: Vec<String>,
        /// Project type used for routing
        #[arg(long = "type", value_name = "TYPE")]
        project_type: Option<String>,
        /// Enable SEO bootstrap for this project
        #[arg(long)]
        seo: bool,
    },
    /// Print the registry record of a project.
    ///
    /// Projects from earlier runs are only visible with the `database`
    /// feature and a configured [database] section.
    Get {
        /// Project id (UUID)
        id: String,
    },
    /// Print the effective configuration as TOML
    Config,
}
