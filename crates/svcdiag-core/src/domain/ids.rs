//! Domain identifiers (strongly-typed IDs).
//!
//! Task, agent and framework ids are all opaque strings handed out by the
//! cluster. They share one generic `Id<T>`; the marker type `T` exists only at
//! compile time, so an `AgentId` can never be passed where a `TaskId` is
//! expected.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::marker::PhantomData;

use crate::error::DiagError;

/// IdMarker names the kind of identifier in error messages.
pub trait IdMarker: Send + Sync + 'static {
    fn kind() -> &'static str;
}

/// Generic string-backed ID.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Id<T: IdMarker> {
    value: String,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    /// Build an id, rejecting empty or blank values.
    pub fn parse(value: impl Into<String>) -> Result<Self, DiagError> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(DiagError::InvalidId {
                kind: T::kind(),
                value,
            });
        }
        Ok(Self {
            value,
            _marker: PhantomData,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.value.fmt(f)
    }
}

impl<'de, T: IdMarker> Deserialize<'de> for Id<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Self::parse(value).map_err(serde::de::Error::custom)
    }
}

// ========================================
// Marker types
// ========================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Task {}

impl IdMarker for Task {
    fn kind() -> &'static str {
        "task"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Agent {}

impl IdMarker for Agent {
    fn kind() -> &'static str {
        "agent"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Framework {}

impl IdMarker for Framework {
    fn kind() -> &'static str {
        "framework"
    }
}

/// Identifier of a task launched on the cluster.
pub type TaskId = Id<Task>;

/// Identifier of the agent (host) a task runs on.
pub type AgentId = Id<Agent>;

/// Identifier of the framework (scheduler) that launched a task.
pub type FrameworkId = Id<Framework>;
