//! Service diagnostics bundle: snapshots, task logs, technology extras and
//! the closing report.

use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use tracing::{error, info, warn};

use super::grouping::union_tasks;
use super::logs::LogDownloader;
use super::snapshots::SnapshotCollector;
use crate::config::BundleConfig;
use crate::domain::{BundleReport, CommandTarget, ServiceRecord, Task};
use crate::error::DiagError;
use crate::ports::{AgentFiles, BundleStore, Clock, CommandRunner, TaskDirectory};
use crate::retry::Retrying;

pub const REPORT_FILE: &str = "bundle_report.json";

/// What a technology bundle gets to work with.
pub struct BundleContext<'a> {
    pub runner: &'a dyn CommandRunner,
    pub store: &'a dyn BundleStore,
    pub retrying: &'a Retrying,
    /// `None` when the service could not be looked up.
    pub service: Option<&'a ServiceRecord>,
}

/// Extra artifacts contributed by a specific service type.
#[async_trait]
pub trait TechBundle: Send + Sync {
    fn name(&self) -> &'static str;

    /// Add artifacts to the bundle. Failures are recorded, never raised.
    async fn create(&self, ctx: &BundleContext<'_>, report: &mut BundleReport);
}

/// One collection run against one service. Built by [`super::BundleBuilder`].
pub struct ServiceBundle {
    pub(crate) config: BundleConfig,
    pub(crate) patterns: Vec<Regex>,
    pub(crate) runner: Arc<dyn CommandRunner>,
    pub(crate) tasks: Arc<dyn TaskDirectory>,
    pub(crate) agents: Arc<dyn AgentFiles>,
    pub(crate) store: Arc<dyn BundleStore>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) tech: Vec<Box<dyn TechBundle>>,
}

impl ServiceBundle {
    /// Collect everything into the store. Individual failures end up in the
    /// returned report; the run itself never aborts halfway.
    pub async fn create(&self) -> BundleReport {
        let mut report = BundleReport::new(
            &self.config.package_name,
            &self.config.service_name,
            self.clock.wall_time(),
        );
        info!(
            run_id = %report.run_id,
            package = %self.config.package_name,
            service = %self.config.service_name,
            "creating service bundle"
        );

        let retrying = Retrying::new(self.config.snapshot_retry.clone(), self.clock.clone());
        let target = CommandTarget::service(&self.config.package_name, &self.config.service_name);
        let snapshots =
            SnapshotCollector::new(self.runner.as_ref(), self.store.as_ref(), &retrying, target);

        if self.config.install_cli {
            if let Err(e) = snapshots.install_cli(&self.config.package_name).await {
                warn!(
                    package = %self.config.package_name,
                    error = %e,
                    "could not install package CLI"
                );
                report.failed("package cli", e.to_string());
            }
        }
        snapshots.collect_all(&mut report).await;

        let (service, tasks) = self.gather_tasks(&retrying, &mut report).await;
        LogDownloader::new(
            self.agents.as_ref(),
            self.store.as_ref(),
            &retrying,
            &self.patterns,
        )
        .download_all(tasks, &mut report)
        .await;

        let ctx = BundleContext {
            runner: self.runner.as_ref(),
            store: self.store.as_ref(),
            retrying: &retrying,
            service: service.as_ref(),
        };
        for tech in &self.tech {
            info!(tech = tech.name(), "creating technology bundle");
            tech.create(&ctx, &mut report).await;
        }

        report.finished_at = Some(self.clock.wall_time());
        self.write_report(&report).await;
        info!(
            run_id = %report.run_id,
            written = report.written_count(),
            problems = report.problem_count(),
            "service bundle complete"
        );
        report
    }

    /// Scheduler tasks plus the service's own tasks, deduplicated.
    async fn gather_tasks(
        &self,
        retrying: &Retrying,
        report: &mut BundleReport,
    ) -> (Option<ServiceRecord>, Vec<Task>) {
        let name = self.config.service_name.as_str();
        let directory = self.tasks.as_ref();

        let scheduler = match retrying
            .call_if(
                move || async move { directory.scheduler_tasks(name).await },
                DiagError::is_transient,
            )
            .await
        {
            Ok(tasks) => tasks,
            Err(e) => {
                error!(service = name, error = %e, "could not list scheduler tasks");
                report.failed("scheduler tasks", e.to_string());
                Vec::new()
            }
        };

        let service = match retrying
            .call_if(
                move || async move { directory.service(name).await },
                DiagError::is_transient,
            )
            .await
        {
            Ok(service) => Some(service),
            Err(e) => {
                error!(service = name, error = %e, "could not look up service tasks");
                report.failed("service tasks", e.to_string());
                None
            }
        };

        let service_tasks: Vec<Task> = service
            .as_ref()
            .map(|s| s.all_tasks().cloned().collect())
            .unwrap_or_default();
        let tasks = union_tasks([scheduler, service_tasks]);
        info!(service = name, tasks = tasks.len(), "gathered tasks");
        (service, tasks)
    }

    async fn write_report(&self, report: &BundleReport) {
        let json = match serde_json::to_vec_pretty(report) {
            Ok(json) => json,
            Err(e) => {
                error!(error = %e, "could not serialize bundle report");
                return;
            }
        };
        if let Err(e) = self.store.write(REPORT_FILE, &json).await {
            error!(file = REPORT_FILE, error = %e, "could not write bundle report");
        }
    }
}
