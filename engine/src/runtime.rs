use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::path::Path;
use std::rc::Rc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use strand_config::{HotkeyBindings, SchedulerSettings};
use strand_native::{
    CallContext, NativeAdapter, NativeError, NativeInvoker, NativeRegistry, ReturnBuffer,
};
use strand_types::{
    ExecutionIdentity, GroupKind, HookState, HostCommand, HostRunState, HostThreadId, ModuleId,
    Selector, TaskState,
};
use tracing::{debug, error, info, warn};

use crate::SchedulerError;
use crate::boundary::{
    FaultSink, HostStateFeed, Interception, KeyState, ModuleLoader, NoInterception, NoKeys,
    NullLoader,
};
use crate::clock::{Clock, SystemClock};
use crate::deferred::{DeferredQueue, DeferredSender};
use crate::fault;
use crate::fiber::{self, DrivingGuard};
use crate::group::{DriveReport, GroupShared, TaskFault, TaskGroup};
use crate::hotkeys::Hotkeys;
use crate::notifications::{NotificationQueue, SchedulerNotification};
use crate::task::{TaskEntry, TaskSettings};

/// Host-side collaborators a runtime is built from.
pub struct RuntimeParts {
    host: Rc<dyn HostStateFeed>,
    loader: Rc<dyn ModuleLoader>,
    keys: Rc<dyn KeyState>,
    clock: Rc<dyn Clock>,
    interception: Arc<dyn Interception>,
    faults: Option<Rc<dyn FaultSink>>,
    natives: Box<dyn NativeAdapter>,
}

impl RuntimeParts {
    /// Parts with inert defaults for everything but the host feed.
    pub fn new(host: Rc<dyn HostStateFeed>) -> Self {
        Self {
            host,
            loader: Rc::new(NullLoader),
            keys: Rc::new(NoKeys),
            clock: Rc::new(SystemClock::new()),
            interception: Arc::new(NoInterception),
            faults: None,
            natives: Box::new(NativeRegistry::new()),
        }
    }

    #[must_use]
    pub fn loader(mut self, loader: Rc<dyn ModuleLoader>) -> Self {
        self.loader = loader;
        self
    }

    #[must_use]
    pub fn keys(mut self, keys: Rc<dyn KeyState>) -> Self {
        self.keys = keys;
        self
    }

    #[must_use]
    pub fn clock(mut self, clock: Rc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn interception(mut self, interception: Arc<dyn Interception>) -> Self {
        self.interception = interception;
        self
    }

    #[must_use]
    pub fn fault_sink(mut self, faults: Rc<dyn FaultSink>) -> Self {
        self.faults = Some(faults);
        self
    }

    #[must_use]
    pub fn natives(mut self, natives: Box<dyn NativeAdapter>) -> Self {
        self.natives = natives;
        self
    }
}

/// What one [`SchedulerRuntime::on_frame`] call did.
#[derive(Debug, Default)]
pub struct FrameReport {
    /// Group driven this frame, if any.
    pub driven: Option<GroupKind>,
    pub ticked: usize,
    pub ran: usize,
    pub faulted: Vec<TaskFault>,
    pub commands: Vec<HostCommand>,
    pub deferred: usize,
}

/// The scheduler host loop: both task groups plus everything driven per frame.
///
/// One runtime per host thread. It is `!Send`; tasks hold `Rc` handles to it.
pub struct SchedulerRuntime {
    primary: Rc<TaskGroup>,
    additional: Rc<TaskGroup>,
    shared: Rc<GroupShared>,
    host: Rc<dyn HostStateFeed>,
    keys: Rc<dyn KeyState>,
    interception: Arc<dyn Interception>,
    faults: Option<Rc<dyn FaultSink>>,
    invoker: NativeInvoker<Box<dyn NativeAdapter>>,
    call: RefCell<CallContext>,
    primary_identity: Cell<ExecutionIdentity>,
    target_thread: Cell<Option<HostThreadId>>,
    driver_registered: Cell<bool>,
    hotkeys: RefCell<Hotkeys>,
    commands: RefCell<VecDeque<HostCommand>>,
    deferred: RefCell<DeferredQueue>,
    hook_state: Cell<HookState>,
    unload_worker: RefCell<Option<JoinHandle<()>>>,
}

impl SchedulerRuntime {
    pub fn new(
        settings: &SchedulerSettings,
        hotkeys: &HotkeyBindings,
        parts: RuntimeParts,
    ) -> Rc<Self> {
        fault::install_panic_hook();

        let shared = Rc::new(GroupShared {
            loader: parts.loader,
            clock: parts.clock,
            notifications: RefCell::new(NotificationQueue::new()),
            settings: TaskSettings {
                stack_bytes: settings.task_stack_bytes,
                completion: settings.completion,
            },
        });
        info!(
            primary_identity = %settings.primary_identity,
            stack_bytes = settings.task_stack_bytes,
            completion = settings.completion.as_str(),
            "Scheduler runtime created"
        );

        Rc::new(Self {
            primary: Rc::new(TaskGroup::new(GroupKind::Primary, Rc::clone(&shared))),
            additional: Rc::new(TaskGroup::new(GroupKind::Additional, Rc::clone(&shared))),
            shared,
            host: parts.host,
            keys: parts.keys,
            interception: parts.interception,
            faults: parts.faults,
            invoker: NativeInvoker::new(parts.natives),
            call: RefCell::new(CallContext::new()),
            primary_identity: Cell::new(settings.primary_identity),
            target_thread: Cell::new(None),
            driver_registered: Cell::new(false),
            hotkeys: RefCell::new(Hotkeys::new(hotkeys)),
            commands: RefCell::new(VecDeque::new()),
            deferred: RefCell::new(DeferredQueue::new()),
            hook_state: Cell::new(HookState::Active),
            unload_worker: RefCell::new(None),
        })
    }

    // ------------------------------------------------------------------
    // Frame loop
    // ------------------------------------------------------------------

    /// Drive one host frame.
    pub fn on_frame(&self) -> Result<FrameReport, SchedulerError> {
        if fiber::in_task() {
            warn!("on_frame called from inside a task; ignored");
            return Err(SchedulerError::Reentrant);
        }
        if self.hook_state.get() == HookState::Exited {
            return Err(SchedulerError::Unloaded);
        }
        let Some(_driving) = DrivingGuard::acquire() else {
            warn!("on_frame called while a frame is already being driven; ignored");
            return Err(SchedulerError::Reentrant);
        };
        if !self.driver_registered.replace(true) {
            debug!("Driver context registered");
        }

        let mut report = FrameReport::default();

        if let Some(current) = self.host.active_thread() {
            let primary = self.primary_identity.get();
            match self.target_thread.get() {
                Some(target)
                    if current.state == HostRunState::Idle && current.identity != primary =>
                {
                    self.host.set_active_thread(target);
                    let drive = self.additional.drive();
                    self.host.set_active_thread(current.id);
                    self.absorb(GroupKind::Additional, drive, &mut report);
                }
                _ if current.state == HostRunState::Running && current.identity == primary => {
                    if self.target_thread.get().is_none() {
                        info!(
                            thread = %current.id,
                            identity = %primary,
                            "Captured target host thread"
                        );
                        self.target_thread.set(Some(current.id));
                    }
                    let drive = self.primary.drive();
                    self.absorb(GroupKind::Primary, drive, &mut report);
                }
                _ => {}
            }
        }

        let fired = self.hotkeys.borrow_mut().poll(self.keys.as_ref());
        self.commands.borrow_mut().extend(fired);
        loop {
            let Some(command) = self.commands.borrow_mut().pop_front() else {
                break;
            };
            self.apply(command);
            report.commands.push(command);
        }

        loop {
            let Some(job) = self.deferred.borrow_mut().next_job() else {
                break;
            };
            job();
            report.deferred += 1;
        }

        Ok(report)
    }

    fn absorb(&self, kind: GroupKind, drive: DriveReport, report: &mut FrameReport) {
        report.driven = Some(kind);
        report.ticked += drive.ticked;
        report.ran += drive.ran;
        for fault in drive.faulted {
            self.contain(kind, &fault);
            report.faulted.push(fault);
        }
    }

    fn contain(&self, kind: GroupKind, fault: &TaskFault) {
        // The driven group already dropped the task.
        self.group(kind.other()).remove(fault.module);

        let name = self.shared.loader.display_name(fault.module);
        error!(module = %name, group = %kind, "Task faulted: {}", fault.report);
        if let Some(sink) = &self.faults
            && let Err(e) = sink.record(&name, &fault.report.to_string())
        {
            warn!(module = %name, "Failed to record fault: {e}");
        }
        self.shared
            .notifications
            .borrow_mut()
            .push(SchedulerNotification::TaskFaulted {
                module: name,
                message: fault.report.message.clone(),
            });
    }

    fn apply(&self, command: HostCommand) {
        info!(command = command.as_str(), "Applying host command");
        match command {
            HostCommand::RemoveAll => self.remove_all_now(),
            HostCommand::Reset => self.reset_now(),
            HostCommand::RequestUnload => {
                let mut state = self.hook_state.get();
                if state.advance(HookState::ExitRequested) {
                    self.hook_state.set(state);
                }
            }
        }
    }

    /// Queue a command for the next frame, alongside hotkey commands.
    pub fn queue_command(&self, command: HostCommand) {
        self.commands.borrow_mut().push_back(command);
    }

    #[must_use]
    pub fn deferred_sender(&self) -> DeferredSender {
        self.deferred.borrow().sender()
    }

    pub fn take_notifications(&self) -> Vec<SchedulerNotification> {
        self.shared.notifications.borrow_mut().take()
    }

    // ------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------

    #[must_use]
    pub fn group(&self, kind: GroupKind) -> &Rc<TaskGroup> {
        match kind {
            GroupKind::Primary => &self.primary,
            GroupKind::Additional => &self.additional,
        }
    }

    pub fn register(
        &self,
        kind: GroupKind,
        module: ModuleId,
        entry: TaskEntry,
    ) -> Result<(), SchedulerError> {
        self.group(kind).add(module, entry)
    }

    /// Load an extension and register its exported entry point in `kind`.
    ///
    /// Modules that registered themselves while loading, or that export no
    /// entry point, are left as they are.
    pub fn load_module(&self, kind: GroupKind, path: &Path) -> Result<ModuleId, SchedulerError> {
        let Some(module) = self.shared.loader.load(path) else {
            warn!(path = %path.display(), "Failed to load extension");
            return Err(SchedulerError::LoadFailed {
                path: path.display().to_string(),
            });
        };
        if !self.group(kind).contains(module)
            && let Some(entry) = self.shared.loader.resolve_entry(module)
        {
            self.register(kind, module, TaskEntry::Raw(entry))?;
        }
        Ok(module)
    }

    /// Remove the module's task from both groups.
    pub fn unregister(&self, module: ModuleId) -> bool {
        let additional = self.additional.remove(module);
        let primary = self.primary.remove(module);
        additional || primary
    }

    /// Remove every task running `entry`, in both groups.
    pub fn unregister_entry(&self, entry: &TaskEntry) -> usize {
        self.additional.remove_by_entry(entry) + self.primary.remove_by_entry(entry)
    }

    /// Remove every task in both groups. From a task, runs on the driver.
    pub fn remove_all(self: &Rc<Self>) {
        let runtime = Rc::clone(self);
        fiber::run_on_driver(move || runtime.remove_all_now());
    }

    /// Remove everything and reinitialize the module loader.
    pub fn reset(self: &Rc<Self>) {
        let runtime = Rc::clone(self);
        fiber::run_on_driver(move || runtime.reset_now());
    }

    fn remove_all_now(&self) {
        self.additional.remove_all_now();
        self.primary.remove_all_now();
    }

    fn reset_now(&self) {
        self.remove_all_now();
        info!("Reinitializing extension modules");
        self.shared.loader.reinitialize();
    }

    #[must_use]
    pub fn task_state(&self, kind: GroupKind, module: ModuleId) -> Option<TaskState> {
        self.group(kind).state(module)
    }

    // ------------------------------------------------------------------
    // Extension-facing calls
    // ------------------------------------------------------------------

    pub fn wait(&self, duration: Duration) -> Result<(), SchedulerError> {
        fiber::wait(duration)
    }

    pub fn native_init(&self, selector: Selector) {
        self.call.borrow_mut().reset(selector);
    }

    pub fn native_push(&self, word: u64) -> Result<(), NativeError> {
        self.call.borrow_mut().push(word)
    }

    /// Invoke the prepared native and copy out its result.
    pub fn native_call(&self) -> Result<ReturnBuffer, NativeError> {
        let mut call = self.call.borrow_mut();
        self.invoker.invoke(&mut call).copied()
    }

    /// Address of the return words of the last native call.
    ///
    /// Valid until the next `native_call` or until the runtime is dropped.
    pub(crate) fn return_words_ptr(&self) -> *const u64 {
        self.call.borrow().returns().as_ptr()
    }

    /// Install a detour from `target` to `handler`. Returns the trampoline address.
    pub fn create_detour(&self, target: usize, handler: usize) -> Option<usize> {
        let trampoline = self.interception.create_detour(target, handler);
        match trampoline {
            Some(_) => debug!(target_addr = target, handler, "Detour installed"),
            None => warn!(target_addr = target, handler, "Detour not installed"),
        }
        trampoline
    }

    pub fn remove_detour(&self, target: usize, handler: usize) -> bool {
        let removed = self.interception.remove_detour(target, handler);
        if !removed {
            warn!(target_addr = target, handler, "No detour to remove");
        }
        removed
    }

    #[must_use]
    pub fn running_identity(&self) -> ExecutionIdentity {
        self.primary_identity.get()
    }

    pub fn set_primary_identity(&self, identity: ExecutionIdentity) {
        let previous = self.primary_identity.replace(identity);
        if previous != identity {
            info!(%previous, current = %identity, "Primary identity changed");
        }
    }

    #[must_use]
    pub fn target_thread(&self) -> Option<HostThreadId> {
        self.target_thread.get()
    }

    #[must_use]
    pub fn hook_state(&self) -> HookState {
        self.hook_state.get()
    }

    // ------------------------------------------------------------------
    // Unload
    // ------------------------------------------------------------------

    /// Tear down: drop every task, release the driver, reverse interception
    /// on a worker thread. Idempotent; never blocks on the worker.
    pub fn unload(self: &Rc<Self>) {
        let runtime = Rc::clone(self);
        fiber::run_on_driver(move || runtime.unload_now());
    }

    fn unload_now(&self) {
        if self.hook_state.get() == HookState::Exited {
            debug!("Unload requested again; already unloaded");
            return;
        }
        info!("Unloading scheduler");
        self.remove_all_now();
        self.driver_registered.set(false);
        self.hook_state.set(HookState::Exited);

        let interception = Arc::clone(&self.interception);
        match thread::Builder::new()
            .name("strand-unload".to_string())
            .spawn(move || {
                interception.remove_all();
                debug!("Interception removed");
            }) {
            Ok(handle) => *self.unload_worker.borrow_mut() = Some(handle),
            Err(e) => error!("Failed to start unload worker: {e}"),
        }
    }

    /// Wait for the unload worker, if one was started. Returns whether it finished cleanly.
    pub fn join_unload_worker(&self) -> bool {
        let Some(handle) = self.unload_worker.borrow_mut().take() else {
            return false;
        };
        handle.join().is_ok()
    }
}
