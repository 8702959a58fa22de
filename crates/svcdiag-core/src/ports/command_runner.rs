//! CommandRunner port - executes operational CLI commands.

use async_trait::async_trait;

use crate::domain::{CommandOutput, CommandTarget};
use crate::error::DiagError;

/// CommandRunner runs one command line against a target.
///
/// A non-zero exit code is *not* an `Err`: callers inspect
/// `CommandOutput::is_success` and decide. `Err` is reserved for the command
/// not running at all (spawn failure, timeout).
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(
        &self,
        target: &CommandTarget,
        command_line: &str,
    ) -> Result<CommandOutput, DiagError>;
}

/// Run a command and turn a failed exit (or stderr noise) into an error.
pub async fn run_checked(
    runner: &dyn CommandRunner,
    target: &CommandTarget,
    command_line: &str,
) -> Result<CommandOutput, DiagError> {
    let output = runner.run(target, command_line).await?;
    if output.is_success() {
        Ok(output)
    } else {
        Err(DiagError::CommandFailed {
            command: format!("{target}: {command_line}"),
            exit_code: output.exit_code,
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}
