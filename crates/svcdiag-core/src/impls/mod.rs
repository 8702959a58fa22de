//! Impls - port adapters.
//!
//! # Production
//! - **CliCommandRunner**: spawns the cluster CLI
//! - **CliTaskDirectory**: task and service listings from the CLI
//! - **HttpAgentFiles**: agent file endpoints over HTTP
//! - **LocalBundleStore**: bundle directory on disk
//!
//! # Testing
//! In-memory fakes for every port live in [`inmem`].

pub mod agent_http;
pub mod cli_runner;
pub mod cli_tasks;
pub mod inmem;
pub mod local_store;

pub use self::agent_http::HttpAgentFiles;
pub use self::cli_runner::CliCommandRunner;
pub use self::cli_tasks::CliTaskDirectory;
pub use self::inmem::{
    InMemoryAgentFiles, MemoryBundleStore, ScriptedCommandRunner, StaticTaskDirectory,
};
pub use self::local_store::LocalBundleStore;
