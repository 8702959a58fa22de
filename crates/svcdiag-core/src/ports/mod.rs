//! Ports - traits at every seam to the outside world.
//!
//! The collector only talks to the cluster through these traits. Production
//! adapters live in `impls`, next to in-memory versions for tests.

pub mod agent_files;
pub mod bundle_store;
pub mod clock;
pub mod command_runner;
pub mod task_directory;

pub use self::agent_files::AgentFiles;
pub use self::bundle_store::{ArtifactWriter, BundleStore};
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::command_runner::{CommandRunner, run_checked};
pub use self::task_directory::TaskDirectory;
