//! Shared infrastructure utilities for Strand.
//!
//! This crate provides cross-cutting utilities that the engine and the host
//! binary need but that don't belong in the domain-pure `strand-types` crate:
//!
//! - **`fault_log`**: Append-only stack-trace log written when a task faults
//! - **`module_name`**: Display names for extension modules derived from their paths

pub mod fault_log;
pub mod module_name;

pub use fault_log::{DEFAULT_FAULT_LOG_FILE, FaultLog};
pub use module_name::display_name;
