//! Cassandra extras: `nodetool` output from every running node task.

use async_trait::async_trait;
use tracing::{error, info};

use super::bundle::{BundleContext, TechBundle};
use crate::domain::{BundleReport, CommandTarget, Task};
use crate::error::DiagError;
use crate::ports::run_checked;

/// Sandbox environment needed before `nodetool` can run inside a task.
const SANDBOX_EXPORTS: &str = "export JAVA_HOME=$(ls -d ${MESOS_SANDBOX}/jdk*/jre/) && \
export TASK_IP=$(${MESOS_SANDBOX}/bootstrap --get-task-ip) && \
CASSANDRA_DIRECTORY=$(ls -d ${MESOS_SANDBOX}/apache-cassandra-*/)";

const NODE_TASK_PREFIX: &str = "node";

/// `(subcommand, file prefix)` pairs collected per node.
const NODETOOL_COMMANDS: &[(&str, &str)] = &[
    ("status", "cassandra_nodetool_status"),
    ("tpstats", "cassandra_nodetool_tpstats"),
];

pub(crate) fn nodetool_command_line(subcommand: &str) -> String {
    let script = format!("{SANDBOX_EXPORTS} && ${{CASSANDRA_DIRECTORY}}/bin/nodetool {subcommand}");
    shell_words::join(["bash", "-c", script.as_str()])
}

#[derive(Debug, Default, Clone, Copy)]
pub struct CassandraBundle;

impl CassandraBundle {
    async fn task_exec(
        &self,
        ctx: &BundleContext<'_>,
        task: &Task,
        subcommand: &str,
    ) -> Result<String, DiagError> {
        let target = CommandTarget::Task {
            task_id: task.id.clone(),
        };
        let command = nodetool_command_line(subcommand);
        let (runner, target, command) = (ctx.runner, &target, command.as_str());
        let output = ctx
            .retrying
            .call_if(
                move || async move { run_checked(runner, target, command).await },
                DiagError::is_transient,
            )
            .await?;
        Ok(output.stdout)
    }
}

#[async_trait]
impl TechBundle for CassandraBundle {
    fn name(&self) -> &'static str {
        "cassandra"
    }

    async fn create(&self, ctx: &BundleContext<'_>, report: &mut BundleReport) {
        let Some(service) = ctx.service else {
            report.skipped("cassandra nodetool", "service record unavailable");
            return;
        };
        let nodes: Vec<&Task> = service
            .running_tasks()
            .filter(|t| t.name.starts_with(NODE_TASK_PREFIX))
            .collect();
        info!(nodes = nodes.len(), "collecting nodetool output");

        for task in nodes {
            for (subcommand, prefix) in NODETOOL_COMMANDS {
                let file_name = format!("{prefix}_{}.txt", task.id);
                let stdout = match self.task_exec(ctx, task, subcommand).await {
                    Ok(stdout) => stdout,
                    Err(e) => {
                        error!(task_id = %task.id, subcommand, error = %e, "nodetool failed");
                        report.failed(file_name, e.to_string());
                        continue;
                    }
                };
                match ctx.store.write(&file_name, stdout.as_bytes()).await {
                    Ok(()) => report.written(file_name),
                    Err(e) => {
                        error!(file = %file_name, error = %e, "could not write nodetool output");
                        report.failed(file_name, e.to_string());
                    }
                }
            }
        }
    }
}
