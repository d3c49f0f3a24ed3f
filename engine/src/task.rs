use std::cell::Cell;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use corosensei::stack::DefaultStack;
use corosensei::{Coroutine, CoroutineResult};
use strand_types::{CompletionPolicy, TaskState, Timestamp};

use crate::clock::Clock;
use crate::fault::{self, FaultReport};
use crate::fiber::{CurrentTask, DriverJob, Suspend, TaskYielder};

/// Entry callback an extension registers.
pub type RawEntry = extern "C-unwind" fn();

/// What a task runs.
#[derive(Clone)]
pub enum TaskEntry {
    /// Exported function of an extension module. Compared by address.
    Raw(RawEntry),
    /// In-process callback. Compared by allocation.
    Closure(Rc<dyn Fn()>),
}

impl TaskEntry {
    pub fn closure(f: impl Fn() + 'static) -> Self {
        Self::Closure(Rc::new(f))
    }

    fn call(&self) {
        match self {
            Self::Raw(f) => f(),
            Self::Closure(f) => f(),
        }
    }
}

impl PartialEq for TaskEntry {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Raw(a), Self::Raw(b)) => std::ptr::fn_addr_eq(*a, *b),
            (Self::Closure(a), Self::Closure(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for TaskEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Raw(entry) => write!(f, "Raw({:p})", *entry as *const ()),
            Self::Closure(entry) => write!(f, "Closure({:p})", Rc::as_ptr(entry).cast::<()>()),
        }
    }
}

/// Per-task execution settings.
#[derive(Debug, Clone, Copy)]
pub struct TaskSettings {
    pub stack_bytes: usize,
    pub completion: CompletionPolicy,
}

enum EntryExit {
    Returned,
    Panicked(FaultReport),
}

type TaskCoroutine = Coroutine<(), Suspend, EntryExit, DefaultStack>;

/// Result of one [`Task::tick`].
pub(crate) enum TickOutcome {
    /// Wake time not reached; nothing ran.
    NotReady,
    /// Ran until a `wait`.
    Suspended,
    /// Ran until it handed a job to the driver.
    Handoff(DriverJob),
    /// Entry returned.
    Completed,
    /// Entry panicked. The context is gone.
    Faulted(FaultReport),
    /// Terminated earlier; nothing ran.
    Finished,
}

pub(crate) struct Task {
    entry: TaskEntry,
    coroutine: Option<TaskCoroutine>,
    wake_at: Timestamp,
    terminated: bool,
    cancelling: Rc<Cell<bool>>,
    settings: TaskSettings,
}

impl Task {
    pub(crate) fn new(entry: TaskEntry, settings: TaskSettings) -> Self {
        Self {
            entry,
            coroutine: None,
            wake_at: Timestamp::ZERO,
            terminated: false,
            cancelling: Rc::new(Cell::new(false)),
            settings,
        }
    }

    pub(crate) fn state(&self) -> TaskState {
        if self.terminated {
            TaskState::Terminated
        } else if self.coroutine.is_some() {
            TaskState::Sleeping
        } else {
            TaskState::NotStarted
        }
    }

    pub(crate) fn has_context(&self) -> bool {
        self.coroutine.is_some()
    }

    pub(crate) fn wake_at(&self) -> Timestamp {
        self.wake_at
    }

    /// Run the task until it suspends or returns, if its wake time has come.
    ///
    /// A sleep is measured from the clock reading taken as the task yields,
    /// which is the moment it called `wait`.
    pub(crate) fn tick(&mut self, clock: &dyn Clock) -> TickOutcome {
        if self.terminated {
            return TickOutcome::Finished;
        }
        if clock.now() < self.wake_at {
            return TickOutcome::NotReady;
        }

        let mut coroutine = match self.coroutine.take() {
            Some(coroutine) => coroutine,
            None => match self.spawn() {
                Ok(coroutine) => coroutine,
                Err(report) => return TickOutcome::Faulted(report),
            },
        };

        fault::clear_captured();
        match coroutine.resume(()) {
            CoroutineResult::Yield(Suspend::Sleep(duration)) => {
                self.wake_at = clock.now().saturating_add(duration);
                self.coroutine = Some(coroutine);
                TickOutcome::Suspended
            }
            CoroutineResult::Yield(Suspend::Handoff(job)) => {
                self.coroutine = Some(coroutine);
                TickOutcome::Handoff(job)
            }
            CoroutineResult::Return(EntryExit::Returned) => {
                if self.settings.completion == CompletionPolicy::OneShot {
                    self.terminated = true;
                }
                TickOutcome::Completed
            }
            CoroutineResult::Return(EntryExit::Panicked(report)) => TickOutcome::Faulted(report),
        }
    }

    fn spawn(&self) -> Result<TaskCoroutine, FaultReport> {
        let stack = DefaultStack::new(self.settings.stack_bytes).map_err(|e| {
            FaultReport::from_message(format!(
                "failed to allocate a {} byte task stack: {e}",
                self.settings.stack_bytes
            ))
        })?;
        let entry = self.entry.clone();
        let cancelling = Rc::clone(&self.cancelling);

        Ok(Coroutine::with_stack(stack, move |yielder: &TaskYielder, ()| {
            let _current = CurrentTask::enter(yielder);
            match panic::catch_unwind(AssertUnwindSafe(|| entry.call())) {
                Ok(()) => EntryExit::Returned,
                // Task is being destroyed while suspended; let the unwind finish.
                Err(payload) if cancelling.get() => panic::resume_unwind(payload),
                Err(payload) => EntryExit::Panicked(fault::take_report(payload.as_ref())),
            }
        }))
    }
}

impl Drop for Task {
    fn drop(&mut self) {
        self.cancelling.set(true);
    }
}
