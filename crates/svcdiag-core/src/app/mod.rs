//! App - combines the ports into the bundle pipeline and the service checks.
//!
//! # Components
//! - **BundleBuilder**: wiring and start-up validation
//! - **ServiceBundle**: snapshots → task logs → technology bundles → report
//! - **CassandraBundle**: `nodetool` extras for Cassandra services
//! - **KafkaChecks** / **TaskChecks**: broker, pod and topic checks

pub mod builder;
pub mod bundle;
pub mod cassandra;
pub mod grouping;
pub mod kafka;
pub mod locator;
pub mod logs;
pub mod snapshots;
pub mod tasks;

pub use self::builder::{BuildError, BundleBuilder};
pub use self::bundle::{BundleContext, REPORT_FILE, ServiceBundle, TechBundle};
pub use self::cassandra::CassandraBundle;
pub use self::kafka::{KafkaChecks, assert_topic_lists_equal_without_automatic_topics};
pub use self::locator::ExecutorPaths;
pub use self::tasks::TaskChecks;
