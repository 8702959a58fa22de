//! Retry module: backoff policy and the retrying wrapper.

mod policy;
mod runner;

pub use policy::{Backoff, RetryPolicy};
pub use runner::{RetryError, Retrying};
