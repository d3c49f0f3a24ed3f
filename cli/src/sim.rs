//! Stand-ins for the host process the scheduler normally lives in.

use std::cell::Cell;
use std::collections::BTreeMap;

use strand_engine::{HostStateFeed, Interception, ModuleLoader};
use strand_types::{ExecutionIdentity, HostRunState, HostThreadId, HostThreadSnapshot, ModuleId};
use strand_utils::display_name;

const PRIMARY_THREAD: HostThreadId = HostThreadId::new(1);
const AMBIENT_THREAD: HostThreadId = HostThreadId::new(2);
const AMBIENT_SCRIPT: &str = "ambient_wait";

/// Host with two script threads: the primary script, running on even frames,
/// and an ambient script sitting idle in its own wait on odd frames.
pub struct SimulatedHost {
    primary: ExecutionIdentity,
    frame: Cell<u64>,
    active: Cell<Option<HostThreadId>>,
    swaps: Cell<u64>,
}

impl SimulatedHost {
    pub fn new(primary: ExecutionIdentity) -> Self {
        Self {
            primary,
            frame: Cell::new(0),
            active: Cell::new(None),
            swaps: Cell::new(0),
        }
    }

    /// Move to the next host frame.
    pub fn advance(&self) {
        let frame = self.frame.get() + 1;
        self.frame.set(frame);
        self.active.set(None);
    }

    pub fn swaps(&self) -> u64 {
        self.swaps.get()
    }

    fn scheduled(&self) -> HostThreadSnapshot {
        if self.frame.get() % 2 == 0 {
            HostThreadSnapshot {
                id: PRIMARY_THREAD,
                identity: self.primary,
                state: HostRunState::Running,
            }
        } else {
            HostThreadSnapshot {
                id: AMBIENT_THREAD,
                identity: ExecutionIdentity::from_name(AMBIENT_SCRIPT),
                state: HostRunState::Idle,
            }
        }
    }
}

impl HostStateFeed for SimulatedHost {
    fn active_thread(&self) -> Option<HostThreadSnapshot> {
        let scheduled = self.scheduled();
        match self.active.get() {
            Some(id) if id != scheduled.id => Some(HostThreadSnapshot {
                id,
                identity: self.primary,
                state: HostRunState::Running,
            }),
            _ => Some(scheduled),
        }
    }

    fn set_active_thread(&self, thread: HostThreadId) {
        self.swaps.set(self.swaps.get() + 1);
        self.active.set(Some(thread));
    }
}

/// Module table for the built-in demo extensions, keyed to their file paths.
pub struct SimulatedLoader {
    paths: BTreeMap<ModuleId, &'static str>,
    reload_requested: Cell<bool>,
}

impl SimulatedLoader {
    pub fn new(modules: &[(ModuleId, &'static str)]) -> Self {
        Self {
            paths: modules.iter().copied().collect(),
            reload_requested: Cell::new(false),
        }
    }

    /// Whether a reset asked for extensions to be loaded again since the last call.
    pub fn take_reload(&self) -> bool {
        self.reload_requested.replace(false)
    }
}

impl ModuleLoader for SimulatedLoader {
    fn display_name(&self, module: ModuleId) -> String {
        self.paths
            .get(&module)
            .map_or_else(|| format!("module@{module}"), |path| display_name(path))
    }

    fn release(&self, module: ModuleId) {
        tracing::debug!(module = %self.display_name(module), "Module released");
    }

    fn reinitialize(&self) {
        self.reload_requested.set(true);
    }
}

/// Interception layer that only logs its teardown.
pub struct LoggedInterception;

impl Interception for LoggedInterception {
    fn remove_all(&self) {
        tracing::info!("Host interception removed");
    }
}
