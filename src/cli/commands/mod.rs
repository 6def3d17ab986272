use anyhow::Result;

use crate::project::OverallStatus;

pub mod config;
pub mod create;
pub mod get;

pub use config::ConfigCommand;
pub use create::CreateCommand;
pub use get::GetCommand;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_CONFIG_ERROR: u8 = 2;
pub const EXIT_PARTIAL_FAILURE: u8 = 3;

#[allow(async_fn_in_trait)]
pub trait Command {
    /// Run the command and return the process exit code
    async fn execute(&self) -> Result<u8>;
}

/// `partial_failure` gets its own code since resources may be orphaned
pub fn exit_code_for(status: OverallStatus) -> u8 {
    match status {
        OverallStatus::Success | OverallStatus::PartialSuccess => EXIT_SUCCESS,
        OverallStatus::Failure => EXIT_FAILURE,
        OverallStatus::PartialFailure => EXIT_PARTIAL_FAILURE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(exit_code_for(OverallStatus::Success), 0);
        assert_eq!(exit_code_for(OverallStatus::PartialSuccess), 0);
        assert_eq!(exit_code_for(OverallStatus::Failure), 1);
        assert_eq!(exit_code_for(OverallStatus::PartialFailure), 3);
    }
}
