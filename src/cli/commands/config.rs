use anyhow::Result;

use super::{Command, EXIT_SUCCESS};
use crate::config::OrchestratorConfig;

pub struct ConfigCommand {
    config: OrchestratorConfig,
}

impl ConfigCommand {
    pub fn new(config: OrchestratorConfig) -> Self {
        Self { config }
    }
}

impl Command for ConfigCommand {
    async fn execute(&self) -> Result<u8> {
        print!("{}", self.config.to_toml()?);
        Ok(EXIT_SUCCESS)
    }
}
