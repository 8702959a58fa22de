//! Task convergence checks used after pod restarts and replacements.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info};

use crate::domain::TaskId;
use crate::error::DiagError;
use crate::ports::TaskDirectory;
use crate::retry::Retrying;

pub struct TaskChecks {
    directory: Arc<dyn TaskDirectory>,
    retrying: Retrying,
    service_name: String,
}

impl TaskChecks {
    pub fn new(
        directory: Arc<dyn TaskDirectory>,
        retrying: Retrying,
        service_name: impl Into<String>,
    ) -> Self {
        Self {
            directory,
            retrying,
            service_name: service_name.into(),
        }
    }

    /// Ids of the service's current tasks whose name starts with `prefix`.
    pub async fn task_ids(&self, prefix: &str) -> Result<Vec<TaskId>, DiagError> {
        let service = self.directory.service(&self.service_name).await?;
        Ok(service
            .tasks
            .iter()
            .filter(|t| t.name.starts_with(prefix))
            .map(|t| t.id.clone())
            .collect())
    }

    async fn running_ids(&self, prefix: &str) -> Result<Vec<TaskId>, DiagError> {
        let service = self.directory.service(&self.service_name).await?;
        Ok(service
            .running_tasks()
            .filter(|t| t.name.starts_with(prefix))
            .map(|t| t.id.clone())
            .collect())
    }

    /// Wait until every running `prefix` task is new and none are missing.
    pub async fn check_tasks_updated(
        &self,
        prefix: &str,
        old_ids: &[TaskId],
    ) -> Result<(), DiagError> {
        let old: HashSet<&TaskId> = old_ids.iter().collect();
        let old = &old;
        let expected = old_ids.len();
        info!(prefix, old = expected, "waiting for tasks to be replaced");

        self.retrying
            .call_until(
                move || async move {
                    let current = self.running_ids(prefix).await?;
                    let replaced = current.iter().all(|id| !old.contains(id));
                    debug!(prefix, current = current.len(), replaced, "task ids");
                    Ok::<_, DiagError>(replaced && current.len() >= expected)
                },
                |updated| !*updated,
            )
            .await?;
        Ok(())
    }

    /// Wait until at least `count` tasks are running.
    pub async fn check_running(&self, count: usize) -> Result<(), DiagError> {
        info!(service = %self.service_name, count, "waiting for running tasks");
        self.retrying
            .call_until(
                move || async move {
                    let service = self.directory.service(&self.service_name).await?;
                    Ok::<_, DiagError>(service.running_tasks().count())
                },
                |running| *running < count,
            )
            .await?;
        Ok(())
    }
}
