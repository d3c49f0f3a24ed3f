//! Shared test utilities and fixtures
//!
//! Fake host collaborators and a harness that wires them into a runtime.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use strand_config::{HotkeyBindings, SchedulerSettings};
use strand_engine::{
    FaultSink, HostStateFeed, Interception, KeyState, ManualClock, ModuleLoader, RawEntry,
    RuntimeParts, SchedulerRuntime, TaskEntry,
};
use strand_native::NativeRegistry;
use strand_types::{
    CompletionPolicy, ExecutionIdentity, HostRunState, HostThreadId, HostThreadSnapshot, ModuleId,
    Timestamp, VirtualKey,
};

pub const PRIMARY_THREAD: HostThreadId = HostThreadId::new(10);
pub const OTHER_THREAD: HostThreadId = HostThreadId::new(20);

pub fn primary_identity() -> ExecutionIdentity {
    ExecutionIdentity::from_name("main_persistent")
}

pub fn other_identity() -> ExecutionIdentity {
    ExecutionIdentity::from_name("ambient_wait")
}

/// Host feed whose active thread is set by the test.
#[derive(Default)]
pub struct FakeHost {
    current: Cell<Option<HostThreadSnapshot>>,
    pub swaps: RefCell<Vec<HostThreadId>>,
}

impl FakeHost {
    pub fn set(&self, snapshot: Option<HostThreadSnapshot>) {
        self.current.set(snapshot);
    }
}

impl HostStateFeed for FakeHost {
    fn active_thread(&self) -> Option<HostThreadSnapshot> {
        self.current.get()
    }

    fn set_active_thread(&self, thread: HostThreadId) {
        self.swaps.borrow_mut().push(thread);
    }
}

/// Loader that records releases and reinitializations.
#[derive(Default)]
pub struct RecordingLoader {
    pub released: RefCell<Vec<ModuleId>>,
    pub reinitialized: Cell<usize>,
    files: RefCell<Vec<(PathBuf, ModuleId, Option<RawEntry>)>>,
}

impl RecordingLoader {
    /// Make `path` loadable as `module`, exporting `entry`.
    pub fn provide(&self, path: &str, module: ModuleId, entry: Option<RawEntry>) {
        self.files
            .borrow_mut()
            .push((PathBuf::from(path), module, entry));
    }
}

impl ModuleLoader for RecordingLoader {
    fn display_name(&self, module: ModuleId) -> String {
        format!("ext{}", module.value())
    }

    fn release(&self, module: ModuleId) {
        self.released.borrow_mut().push(module);
    }

    fn reinitialize(&self) {
        self.reinitialized.set(self.reinitialized.get() + 1);
    }

    fn load(&self, path: &Path) -> Option<ModuleId> {
        self.files
            .borrow()
            .iter()
            .find(|(file, _, _)| file == path)
            .map(|(_, module, _)| *module)
    }

    fn resolve_entry(&self, module: ModuleId) -> Option<RawEntry> {
        self.files
            .borrow()
            .iter()
            .find(|(_, loaded, _)| *loaded == module)
            .and_then(|(_, _, entry)| *entry)
    }
}

#[derive(Default)]
pub struct FakeKeys(RefCell<HashSet<VirtualKey>>);

impl FakeKeys {
    pub fn press(&self, key: VirtualKey) {
        self.0.borrow_mut().insert(key);
    }

    pub fn release(&self, key: VirtualKey) {
        self.0.borrow_mut().remove(&key);
    }
}

impl KeyState for FakeKeys {
    fn is_down(&self, key: VirtualKey) -> bool {
        self.0.borrow().contains(&key)
    }
}

/// Offset from a detour target to the trampoline handed back.
pub const TRAMPOLINE_OFFSET: usize = 0x10;

#[derive(Default)]
pub struct CountingInterception {
    pub removals: AtomicUsize,
    pub detours: Mutex<Vec<(usize, usize)>>,
}

impl Interception for CountingInterception {
    fn create_detour(&self, target: usize, handler: usize) -> Option<usize> {
        let mut detours = self.detours.lock().unwrap();
        if detours.contains(&(target, handler)) {
            return None;
        }
        detours.push((target, handler));
        Some(target + TRAMPOLINE_OFFSET)
    }

    fn remove_detour(&self, target: usize, handler: usize) -> bool {
        let mut detours = self.detours.lock().unwrap();
        let before = detours.len();
        detours.retain(|pair| *pair != (target, handler));
        detours.len() != before
    }

    fn remove_all(&self) {
        self.removals.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct RecordingFaults {
    pub records: RefCell<Vec<(String, String)>>,
}

impl FaultSink for RecordingFaults {
    fn record(&self, label: &str, report: &str) -> io::Result<()> {
        self.records
            .borrow_mut()
            .push((label.to_string(), report.to_string()));
        Ok(())
    }
}

/// A runtime wired to fakes the test can inspect.
pub struct Harness {
    pub runtime: Rc<SchedulerRuntime>,
    pub host: Rc<FakeHost>,
    pub loader: Rc<RecordingLoader>,
    pub keys: Rc<FakeKeys>,
    pub clock: ManualClock,
    pub interception: Arc<CountingInterception>,
    pub faults: Rc<RecordingFaults>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with(CompletionPolicy::Restart, NativeRegistry::new())
    }

    pub fn with_policy(completion: CompletionPolicy) -> Self {
        Self::with(completion, NativeRegistry::new())
    }

    pub fn with_natives(natives: NativeRegistry) -> Self {
        Self::with(CompletionPolicy::Restart, natives)
    }

    pub fn with(completion: CompletionPolicy, natives: NativeRegistry) -> Self {
        let settings = SchedulerSettings {
            primary_identity: primary_identity(),
            task_stack_bytes: 256 * 1024,
            completion,
        };
        let host = Rc::new(FakeHost::default());
        let loader = Rc::new(RecordingLoader::default());
        let keys = Rc::new(FakeKeys::default());
        let clock = ManualClock::new();
        let interception = Arc::new(CountingInterception::default());
        let faults = Rc::new(RecordingFaults::default());

        let parts = RuntimeParts::new(host.clone())
            .loader(loader.clone())
            .keys(keys.clone())
            .clock(Rc::new(clock.clone()))
            .interception(interception.clone())
            .fault_sink(faults.clone())
            .natives(Box::new(natives));
        let runtime = SchedulerRuntime::new(&settings, &HotkeyBindings::default(), parts);

        Self {
            runtime,
            host,
            loader,
            keys,
            clock,
            interception,
            faults,
        }
    }

    /// Host is running the primary script: the primary group is driven.
    pub fn primary_running(&self) {
        self.host.set(Some(HostThreadSnapshot {
            id: PRIMARY_THREAD,
            identity: primary_identity(),
            state: HostRunState::Running,
        }));
    }

    /// Host is idle in some other script: the additional group is driven once a target is known.
    pub fn other_idle(&self) {
        self.host.set(Some(HostThreadSnapshot {
            id: OTHER_THREAD,
            identity: other_identity(),
            state: HostRunState::Idle,
        }));
    }

    pub fn at(&self, ms: u64) {
        self.clock.set(Timestamp::from_millis(ms));
    }
}

/// Entry that counts each run slice and waits `every` between slices.
pub fn counting_task(counter: &Rc<Cell<u32>>, every: Duration) -> TaskEntry {
    let counter = Rc::clone(counter);
    TaskEntry::closure(move || {
        loop {
            counter.set(counter.get() + 1);
            strand_engine::wait(every).unwrap();
        }
    })
}

pub fn module(id: usize) -> ModuleId {
    ModuleId::new(id)
}
