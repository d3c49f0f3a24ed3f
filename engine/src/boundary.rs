//! Collaborators the scheduler talks to but does not own.
//!
//! The embedding host supplies these: module loading, the host's script-thread
//! view, input state, time, interception teardown and fault persistence.

use std::io;
use std::path::Path;
use std::sync::Arc;

use strand_types::{HostThreadId, HostThreadSnapshot, ModuleId, VirtualKey};
use strand_utils::FaultLog;

use crate::task::RawEntry;

/// Extension module bookkeeping.
pub trait ModuleLoader {
    /// Human-readable module name for logs and notifications.
    fn display_name(&self, module: ModuleId) -> String;

    /// Called once per group removal of the module's task.
    fn release(&self, module: ModuleId);

    /// Re-scan and load extensions after a reset.
    fn reinitialize(&self);

    /// Load the extension at `path`. `None` if it could not be loaded.
    fn load(&self, _path: &Path) -> Option<ModuleId> {
        None
    }

    /// Entry point a loaded module exports, if any.
    fn resolve_entry(&self, _module: ModuleId) -> Option<RawEntry> {
        None
    }
}

/// The host's view of its own script threads.
pub trait HostStateFeed {
    /// The host thread currently marked active, if the host has one.
    fn active_thread(&self) -> Option<HostThreadSnapshot>;

    /// Swap the host's active-thread pointer.
    fn set_active_thread(&self, thread: HostThreadId);
}

/// Point-in-time key state, polled once per frame.
pub trait KeyState {
    fn is_down(&self, key: VirtualKey) -> bool;
}

impl<K: KeyState + ?Sized> KeyState for Arc<K> {
    fn is_down(&self, key: VirtualKey) -> bool {
        (**self).is_down(key)
    }
}

/// Function detours installed into the host process.
///
/// Detours are keyed by the (target, handler) address pair.
pub trait Interception: Send + Sync {
    /// Route calls to `target` through `handler`. Returns the address that
    /// reaches the original function, or `None` if nothing was installed.
    fn create_detour(&self, _target: usize, _handler: usize) -> Option<usize> {
        None
    }

    /// Returns whether a matching detour was removed.
    fn remove_detour(&self, _target: usize, _handler: usize) -> bool {
        false
    }

    /// Reverse everything installed. Runs on the unload worker thread.
    fn remove_all(&self);
}

/// Destination for contained task faults.
pub trait FaultSink {
    fn record(&self, label: &str, report: &str) -> io::Result<()>;
}

impl FaultSink for FaultLog {
    fn record(&self, label: &str, report: &str) -> io::Result<()> {
        self.append(label, report)
    }
}

/// Loader that only knows module handles.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullLoader;

impl ModuleLoader for NullLoader {
    fn display_name(&self, module: ModuleId) -> String {
        format!("module@{module}")
    }

    fn release(&self, _module: ModuleId) {}

    fn reinitialize(&self) {}
}

/// Key source with nothing ever pressed.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoKeys;

impl KeyState for NoKeys {
    fn is_down(&self, _key: VirtualKey) -> bool {
        false
    }
}

/// Interception layer with nothing installed.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoInterception;

impl Interception for NoInterception {
    fn remove_all(&self) {}
}
