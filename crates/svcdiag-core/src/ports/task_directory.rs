//! TaskDirectory port - where task records come from.

use async_trait::async_trait;

use crate::domain::{ServiceRecord, Task};
use crate::error::DiagError;

/// TaskDirectory returns fresh task snapshots for a service.
///
/// Nothing here is cached; every call reflects the cluster at that moment.
#[async_trait]
pub trait TaskDirectory: Send + Sync {
    /// The service's registration with its running and completed tasks.
    async fn service(&self, service_name: &str) -> Result<ServiceRecord, DiagError>;

    /// Tasks of the scheduler process itself (launched by the platform, not by
    /// the service).
    async fn scheduler_tasks(&self, service_name: &str) -> Result<Vec<Task>, DiagError>;
}
