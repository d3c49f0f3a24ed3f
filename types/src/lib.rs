//! Core domain types for Strand.
//!
//! This crate contains pure domain types with no IO, no coroutines, and minimal
//! dependencies. Everything here can be used from any layer of the workspace.

// Pedantic lint configuration - these are intentional design choices
#![allow(clippy::missing_errors_doc)] // Result-returning functions are self-explanatory
#![allow(clippy::missing_panics_doc)] // Panics are documented in assertions

mod ids;
mod time;

pub use ids::{ExecutionIdentity, HostThreadId, ModuleId, Selector, VirtualKey};
pub use time::Timestamp;

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Scheduler groups and task lifecycle
// ============================================================================

/// Which of the two task groups a task belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupKind {
    /// Driven while the host runs its primary script identity.
    Primary,
    /// Driven while the host is idle under some other identity.
    Additional,
}

impl GroupKind {
    pub const ALL: [GroupKind; 2] = [GroupKind::Primary, GroupKind::Additional];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            GroupKind::Primary => "primary",
            GroupKind::Additional => "additional",
        }
    }

    #[must_use]
    pub const fn other(self) -> Self {
        match self {
            GroupKind::Primary => GroupKind::Additional,
            GroupKind::Additional => GroupKind::Primary,
        }
    }
}

impl fmt::Display for GroupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observable state of a task. Derived from the task's fields, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// No execution context yet.
    NotStarted,
    /// Suspended, waiting for its wake time.
    Sleeping,
    /// Currently the active execution context.
    Running,
    /// Entry returned under [`CompletionPolicy::OneShot`].
    Terminated,
}

/// What happens when a task's entry returns normally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionPolicy {
    /// Discard the context; the next ready tick starts the entry again from the top.
    #[default]
    Restart,
    /// Mark the task terminated; it stays registered but is never resumed.
    OneShot,
}

impl CompletionPolicy {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Restart => "restart",
            Self::OneShot => "one_shot",
        }
    }
}

// ============================================================================
// Host loop state
// ============================================================================

/// Lifecycle of the host interception. Only moves forward.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum HookState {
    #[default]
    Active,
    ExitRequested,
    Exited,
}

impl HookState {
    /// Move to `next` unless that would go backwards. Returns whether the state changed.
    pub fn advance(&mut self, next: HookState) -> bool {
        if next > *self {
            *self = next;
            true
        } else {
            false
        }
    }
}

/// Run state of a host script thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostRunState {
    Idle,
    Running,
    Killed,
}

/// One observation of the host's active script thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostThreadSnapshot {
    pub id: HostThreadId,
    pub identity: ExecutionIdentity,
    pub state: HostRunState,
}

/// Cross-cutting commands applied by the host loop once per frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostCommand {
    /// Remove every task from both groups.
    RemoveAll,
    /// Remove every task and reinitialize the module loader.
    Reset,
    /// Ask the embedder to unload the scheduler.
    RequestUnload,
}

impl HostCommand {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RemoveAll => "remove_all",
            Self::Reset => "reset",
            Self::RequestUnload => "request_unload",
        }
    }
}

// ============================================================================
// Native call geometry
// ============================================================================

/// Three-component vector as the host returns it: each component padded to 8 bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Vector3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vector3 {
    #[must_use]
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// Parse error for identity names given in configuration.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("script identity must not be empty")]
pub struct EmptyIdentityError;

/// Resolve a configured identity: a `0x`-prefixed hex hash, a decimal hash, or a script name.
pub fn parse_identity(raw: &str) -> Result<ExecutionIdentity, EmptyIdentityError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(EmptyIdentityError);
    }
    if let Some(hex) = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        && let Ok(hash) = u32::from_str_radix(hex, 16)
    {
        return Ok(ExecutionIdentity::new(hash));
    }
    if let Ok(hash) = trimmed.parse::<u32>() {
        return Ok(ExecutionIdentity::new(hash));
    }
    Ok(ExecutionIdentity::from_name(trimmed))
}
