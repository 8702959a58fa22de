//! Kafka service checks: broker count, pod restart/replace and topics.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use super::tasks::TaskChecks;
use crate::config::KafkaConfig;
use crate::domain::CommandTarget;
use crate::error::DiagError;
use crate::ports::{Clock, CommandRunner, TaskDirectory};
use crate::retry::Retrying;

/// Topics created by Kafka itself (`__consumer_offsets`, ...) start with `_`.
const AUTOMATIC_TOPIC_PREFIX: char = '_';

/// Compare topic lists after dropping Kafka's automatic topics from `actual`.
pub fn assert_topic_lists_equal_without_automatic_topics(
    expected: &[String],
    actual: &[String],
) -> Result<(), DiagError> {
    let filtered: Vec<String> = actual
        .iter()
        .filter(|t| !t.starts_with(AUTOMATIC_TOPIC_PREFIX))
        .cloned()
        .collect();
    if filtered != expected {
        return Err(DiagError::TopicMismatch {
            expected: expected.to_vec(),
            actual: filtered,
        });
    }
    Ok(())
}

pub struct KafkaChecks {
    config: KafkaConfig,
    runner: Arc<dyn CommandRunner>,
    target: CommandTarget,
    clock: Arc<dyn Clock>,
    tasks: TaskChecks,
}

impl KafkaChecks {
    pub fn new(
        config: KafkaConfig,
        runner: Arc<dyn CommandRunner>,
        directory: Arc<dyn TaskDirectory>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, DiagError> {
        config.validate()?;
        let target = CommandTarget::service(&config.package_name, &config.service_name);
        let tasks = TaskChecks::new(
            directory,
            Retrying::new(config.task_convergence.clone(), clock.clone()),
            &config.service_name,
        );
        Ok(Self {
            config,
            runner,
            target,
            clock,
            tasks,
        })
    }

    pub fn config(&self) -> &KafkaConfig {
        &self.config
    }

    fn pod_name(&self, index: usize) -> String {
        format!("{}-{index}", self.config.pod_type)
    }

    /// Poll `broker list` until it reports exactly `count` brokers.
    pub async fn broker_count_check(&self, count: usize) -> Result<(), DiagError> {
        let retrying = Retrying::new(self.config.broker_poll.clone(), self.clock.clone());
        let (runner, target) = (self.runner.as_ref(), &self.target);
        info!(count, "waiting for broker count");

        retrying
            .call_until(
                move || async move {
                    let output = runner.run(target, "broker list").await?;
                    if output.exit_code != 0 {
                        debug!(
                            exit_code = output.exit_code,
                            stderr = %output.stderr,
                            "broker list failed"
                        );
                        return Ok::<_, DiagError>(false);
                    }
                    match serde_json::from_str::<Vec<Value>>(&output.stdout) {
                        Ok(brokers) => Ok(brokers.len() == count),
                        Err(e) => {
                            debug!(
                                error = %e,
                                stdout = %output.stdout,
                                "broker list is not a JSON array"
                            );
                            Ok(false)
                        }
                    }
                },
                |matched| !*matched,
            )
            .await?;
        Ok(())
    }

    /// Restart every broker pod in turn and wait for each to come back.
    pub async fn restart_broker_pods(&self) -> Result<(), DiagError> {
        for index in 0..self.config.broker_count {
            let pod = self.pod_name(index);
            let task_name = format!("{pod}-broker");
            let old_ids = self.tasks.task_ids(&task_name).await?;

            info!(pod = %pod, old = old_ids.len(), "restarting pod");
            let command = format!("pod restart {pod}");
            let output = self.runner.run(&self.target, &command).await?;
            if output.exit_code != 0 {
                return Err(DiagError::CommandFailed {
                    command: format!("{}: {command}", self.target),
                    exit_code: output.exit_code,
                    stdout: output.stdout,
                    stderr: output.stderr,
                });
            }
            check_restart_response(&command, &output.stdout, &task_name)?;

            self.tasks.check_tasks_updated(&task_name, &old_ids).await?;
            self.tasks.check_running(self.config.broker_count).await?;
        }
        Ok(())
    }

    /// Replace the first broker pod and wait for the cluster to recover.
    pub async fn replace_broker_pod(&self) -> Result<(), DiagError> {
        let pod = self.pod_name(0);
        let task_name = format!("{pod}-broker");
        let old_ids = self.tasks.task_ids(&task_name).await?;

        info!(pod = %pod, old = old_ids.len(), "replacing pod");
        let command = format!("pod replace {pod}");
        let output = self.runner.run(&self.target, &command).await?;
        if output.exit_code != 0 {
            warn!(
                command = %command,
                exit_code = output.exit_code,
                stdout = %output.stdout,
                stderr = %output.stderr,
                "pod replace returned an error"
            );
        }

        self.tasks.check_tasks_updated(&task_name, &old_ids).await?;
        self.tasks.check_running(self.config.broker_count).await?;
        self.broker_count_check(self.config.broker_count).await
    }

    /// Wait until `topic describe <topic>` succeeds.
    pub async fn wait_for_topic(&self, topic: &str) -> Result<(), DiagError> {
        let retrying = Retrying::new(self.config.topic_wait.clone(), self.clock.clone());
        let command = format!("topic describe {topic}");
        let (runner, target, command) = (self.runner.as_ref(), &self.target, command.as_str());
        info!(topic, "waiting for topic");

        retrying
            .call_until(
                move || async move {
                    Ok::<_, DiagError>(runner.run(target, command).await?.exit_code)
                },
                |exit_code| *exit_code != 0,
            )
            .await?;
        Ok(())
    }
}

/// `pod restart` answers `{"pod": "<pod>", "tasks": ["<pod>-broker", ...]}`.
fn check_restart_response(command: &str, stdout: &str, task_name: &str) -> Result<(), DiagError> {
    let response: serde_json::Map<String, Value> =
        serde_json::from_str(stdout).map_err(|e| DiagError::malformed(command, e))?;
    if response.len() != 2 {
        return Err(DiagError::unexpected(
            command,
            format!("expected 2 keys, got {}", response.len()),
        ));
    }
    let first = response
        .get("tasks")
        .and_then(Value::as_array)
        .and_then(|tasks| tasks.first())
        .and_then(Value::as_str);
    if first != Some(task_name) {
        return Err(DiagError::unexpected(
            command,
            format!("expected first task {task_name}, got {first:?}"),
        ));
    }
    Ok(())
}
