//! Status snapshots: configuration, pod status and plan status files.

use tracing::{error, info};

use crate::domain::{BundleReport, CommandOutput, CommandTarget};
use crate::error::DiagError;
use crate::ports::{BundleStore, CommandRunner, run_checked};
use crate::retry::Retrying;

pub const CONFIGURATION_FILE: &str = "service_configuration.json";
pub const POD_STATUS_FILE: &str = "service_pod_status.json";

/// `service_plan_status_<plan>.json`
pub fn plan_status_file(plan: &str) -> String {
    format!("service_plan_status_{plan}.json")
}

/// Plan names end up in file names; refuse anything that is not a single
/// path component.
fn check_plan_name(plan: &str) -> Result<(), DiagError> {
    let bad = plan.trim().is_empty()
        || plan.contains('/')
        || plan.contains('\\')
        || plan.contains("..");
    if bad {
        return Err(DiagError::InvalidPlanName(plan.to_string()));
    }
    Ok(())
}

/// Fetches status snapshots through the service's CLI and stores them.
///
/// Every fetch is retried on its own; a failed fetch is logged and recorded,
/// and the next one is still attempted.
pub struct SnapshotCollector<'a> {
    runner: &'a dyn CommandRunner,
    store: &'a dyn BundleStore,
    retrying: &'a Retrying,
    target: CommandTarget,
}

impl<'a> SnapshotCollector<'a> {
    pub fn new(
        runner: &'a dyn CommandRunner,
        store: &'a dyn BundleStore,
        retrying: &'a Retrying,
        target: CommandTarget,
    ) -> Self {
        Self {
            runner,
            store,
            retrying,
            target,
        }
    }

    /// `package install <package> --cli --yes`
    pub async fn install_cli(&self, package_name: &str) -> Result<(), DiagError> {
        let command = format!("package install {package_name} --cli --yes");
        let runner = self.runner;
        let command = command.as_str();
        self.retrying
            .call_if(
                move || async move { run_checked(runner, &CommandTarget::Cluster, command).await },
                DiagError::is_transient,
            )
            .await?;
        Ok(())
    }

    /// Configuration, pod status, then every plan's status, in that order.
    pub async fn collect_all(&self, report: &mut BundleReport) {
        self.collect_file("describe", CONFIGURATION_FILE, report)
            .await;
        self.collect_file("pod status --json", POD_STATUS_FILE, report)
            .await;
        self.collect_plans(report).await;
    }

    pub async fn collect_file(&self, command: &str, file_name: &str, report: &mut BundleReport) {
        let output = match self.fetch_json(command).await {
            Ok(output) => output,
            Err(e) => {
                error!(
                    artifact = file_name,
                    service = %self.target,
                    command,
                    error = %e,
                    "could not collect snapshot"
                );
                report.failed(file_name, e.to_string());
                return;
            }
        };
        self.store_output(file_name, &output, report).await;
    }

    pub async fn collect_plans(&self, report: &mut BundleReport) {
        let plans = match self.plan_names().await {
            Ok(plans) => plans,
            Err(e) => {
                error!(
                    service = %self.target,
                    error = %e,
                    "could not get plan list; skipping plan status files"
                );
                report.failed("plan list", e.to_string());
                return;
            }
        };
        info!(service = %self.target, ?plans, "collecting plan status");

        for plan in &plans {
            let file_name = plan_status_file(plan);
            if let Err(e) = check_plan_name(plan) {
                error!(plan = %plan, error = %e, "skipping plan");
                report.skipped(file_name, e.to_string());
                continue;
            }
            let command = format!("plan status {} --json", shell_words::quote(plan));
            self.collect_file(&command, &file_name, report).await;
        }
    }

    async fn plan_names(&self) -> Result<Vec<String>, DiagError> {
        let output = self.fetch_json("plan list").await?;
        serde_json::from_str(&output.stdout).map_err(|e| DiagError::malformed("plan list", e))
    }

    /// Run `command` until it exits cleanly with JSON on stdout.
    async fn fetch_json(&self, command: &str) -> Result<CommandOutput, DiagError> {
        let runner = self.runner;
        let target = &self.target;
        let output = self
            .retrying
            .call_if(
                move || async move {
                    let output = run_checked(runner, target, command).await?;
                    serde_json::from_str::<serde_json::Value>(&output.stdout)
                        .map_err(|e| DiagError::malformed(command, e))?;
                    Ok(output)
                },
                DiagError::is_transient,
            )
            .await?;
        Ok(output)
    }

    async fn store_output(
        &self,
        file_name: &str,
        output: &CommandOutput,
        report: &mut BundleReport,
    ) {
        match self.store.write(file_name, output.stdout.as_bytes()).await {
            Ok(()) => report.written(file_name),
            Err(e) => {
                error!(artifact = file_name, error = %e, "could not write snapshot");
                report.failed(file_name, e.to_string());
            }
        }
    }
}
