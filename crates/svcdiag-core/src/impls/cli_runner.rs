//! CliCommandRunner - runs commands through the cluster CLI binary.

use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::trace;

use crate::domain::{CommandOutput, CommandTarget};
use crate::error::DiagError;
use crate::ports::CommandRunner;

/// Spawns `<program> <args>` per command.
///
/// # Argument layout
/// - `Cluster`: `<program> <command>`
/// - `Service`: `<program> <package> --name=<service> <command>`
/// - `Task`: `<program> task exec <task_id> <command>`
///
/// The command line is split with shell quoting rules. A command that exceeds
/// the timeout is killed.
#[derive(Debug, Clone)]
pub struct CliCommandRunner {
    program: String,
    timeout: Duration,
}

impl CliCommandRunner {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }
}

pub(crate) fn build_args(
    target: &CommandTarget,
    command_line: &str,
) -> Result<Vec<String>, DiagError> {
    let words = shell_words::split(command_line)
        .map_err(|e| DiagError::InvalidCommandLine(format!("{command_line}: {e}")))?;
    if words.is_empty() {
        return Err(DiagError::InvalidCommandLine("empty command".into()));
    }

    let mut args = match target {
        CommandTarget::Cluster => Vec::new(),
        CommandTarget::Service { package, service } => {
            vec![package.clone(), format!("--name={service}")]
        }
        CommandTarget::Task { task_id } => {
            vec!["task".to_string(), "exec".to_string(), task_id.to_string()]
        }
    };
    args.extend(words);
    Ok(args)
}

#[async_trait]
impl CommandRunner for CliCommandRunner {
    async fn run(
        &self,
        target: &CommandTarget,
        command_line: &str,
    ) -> Result<CommandOutput, DiagError> {
        let args = build_args(target, command_line)?;
        let started = Instant::now();

        let child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| DiagError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|source| DiagError::Spawn {
                program: self.program.clone(),
                source,
            })?,
            Err(_) => {
                return Err(DiagError::Timeout {
                    command: format!("{target}: {command_line}"),
                    after: self.timeout,
                });
            }
        };

        let output = CommandOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        trace!(
            target: "svcdiag.exec",
            program = %self.program,
            ?args,
            exit_code = output.exit_code,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "command finished"
        );
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TaskId;
    use rstest::rstest;

    #[rstest]
    #[case::cluster(CommandTarget::Cluster, "task --all --json", &["task", "--all", "--json"])]
    #[case::service(
        CommandTarget::service("kafka", "kafka-prod"),
        "plan status deploy --json",
        &["kafka", "--name=kafka-prod", "plan", "status", "deploy", "--json"]
    )]
    #[case::task(
        CommandTarget::Task { task_id: TaskId::parse("node-0__x").unwrap() },
        "bash -c 'echo $HOME && ls'",
        &["task", "exec", "node-0__x", "bash", "-c", "echo $HOME && ls"]
    )]
    fn arguments_follow_the_target(
        #[case] target: CommandTarget,
        #[case] command_line: &str,
        #[case] expected: &[&str],
    ) {
        assert_eq!(build_args(&target, command_line).unwrap(), expected);
    }

    #[rstest]
    #[case("")]
    #[case("plan status 'unterminated")]
    fn bad_command_lines_are_rejected(#[case] command_line: &str) {
        assert!(matches!(
            build_args(&CommandTarget::Cluster, command_line),
            Err(DiagError::InvalidCommandLine(_))
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn captures_exit_code_and_streams() {
        let runner = CliCommandRunner::new("sh", Duration::from_secs(10));
        let output = runner
            .run(&CommandTarget::Cluster, "-c 'echo out; echo err >&2; exit 3'")
            .await
            .unwrap();
        assert_eq!(output.exit_code, 3);
        assert_eq!(output.stdout, "out\n");
        assert_eq!(output.stderr, "err\n");
        assert!(!output.is_success());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn slow_commands_time_out() {
        let runner = CliCommandRunner::new("sleep", Duration::from_millis(50));
        let err = runner.run(&CommandTarget::Cluster, "5").await.unwrap_err();
        assert!(matches!(err, DiagError::Timeout { .. }));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn missing_program_is_a_spawn_error() {
        let runner = CliCommandRunner::new("svcdiag-no-such-cli", Duration::from_secs(1));
        let err = runner.run(&CommandTarget::Cluster, "describe").await.unwrap_err();
        assert!(matches!(err, DiagError::Spawn { .. }));
    }
}
