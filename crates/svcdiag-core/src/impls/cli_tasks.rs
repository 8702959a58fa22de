//! CliTaskDirectory - task and service listings through the cluster CLI.

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::{CommandTarget, ServiceRecord, Task};
use crate::error::DiagError;
use crate::ports::{CommandRunner, TaskDirectory, run_checked};

const SERVICE_LISTING: &str = "service --completed --inactive --json";
const TASK_LISTING: &str = "task --all --json";

pub struct CliTaskDirectory {
    runner: Arc<dyn CommandRunner>,
}

impl CliTaskDirectory {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }
}

/// Tasks named exactly `service_name`: the scheduler itself, launched by the
/// cluster's init system rather than by the service.
fn scheduler_tasks_in(listing: &str, service_name: &str) -> Result<Vec<Task>, DiagError> {
    let tasks: Vec<Task> =
        serde_json::from_str(listing).map_err(|e| DiagError::malformed(TASK_LISTING, e))?;
    Ok(tasks
        .into_iter()
        .filter(|t| t.name == service_name)
        .collect())
}

#[async_trait]
impl TaskDirectory for CliTaskDirectory {
    async fn service(&self, service_name: &str) -> Result<ServiceRecord, DiagError> {
        let output =
            run_checked(self.runner.as_ref(), &CommandTarget::Cluster, SERVICE_LISTING).await?;
        ServiceRecord::find_in_listing(&output.stdout, service_name)
    }

    async fn scheduler_tasks(&self, service_name: &str) -> Result<Vec<Task>, DiagError> {
        let output =
            run_checked(self.runner.as_ref(), &CommandTarget::Cluster, TASK_LISTING).await?;
        scheduler_tasks_in(&output.stdout, service_name)
    }
}
