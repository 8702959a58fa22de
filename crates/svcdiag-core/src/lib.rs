//! svcdiag-core
//!
//! Building blocks for collecting diagnostics bundles from services deployed on
//! the cluster, plus the CLI-driven checks used by integration tests.
//!
//! # Module layout
//! - **domain**: typed records (ids, tasks, service listings, command output, bundle report)
//! - **ports**: seams to the outside world (CommandRunner, TaskDirectory, AgentFiles,
//!   BundleStore, Clock)
//! - **retry**: retry policy and the retrying wrapper
//! - **app**: bundle collection pipeline, builder, technology bundles, task and Kafka checks
//! - **impls**: adapters (CLI process runner, agent HTTP client, local store, in-memory fakes)

pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod impls;
pub mod ports;
pub mod retry;

pub use error::{DiagError, ErrorKind};
