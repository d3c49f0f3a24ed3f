//! Task execution contexts.
//!
//! Each task runs on its own `corosensei` coroutine. While a task runs, its
//! yielder is published in a thread-local so [`wait`] can suspend it from any
//! call depth without threading a handle through extension code.

use std::cell::Cell;
use std::ptr::NonNull;
use std::time::Duration;

use corosensei::Yielder;

use crate::SchedulerError;

/// Work a task hands to the driving context.
pub(crate) type DriverJob = Box<dyn FnOnce() + 'static>;

/// Why a task gave control back to its driver.
pub(crate) enum Suspend {
    Sleep(Duration),
    Handoff(DriverJob),
}

pub(crate) type TaskYielder = Yielder<(), Suspend>;

thread_local! {
    static CURRENT: Cell<Option<NonNull<TaskYielder>>> = const { Cell::new(None) };
}

/// Marks a coroutine as the thread's running task for the life of the guard.
pub(crate) struct CurrentTask {
    yielder: NonNull<TaskYielder>,
}

impl CurrentTask {
    pub(crate) fn enter(yielder: &TaskYielder) -> Self {
        let yielder = NonNull::from(yielder);
        CURRENT.with(|c| c.set(Some(yielder)));
        Self { yielder }
    }
}

impl Drop for CurrentTask {
    fn drop(&mut self) {
        // A forced unwind of a suspended task can run while another task is current.
        CURRENT.with(|c| {
            if c.get() == Some(self.yielder) {
                c.set(None);
            }
        });
    }
}

/// Whether the calling code is running inside a task.
#[must_use]
pub fn in_task() -> bool {
    CURRENT.with(Cell::get).is_some()
}

fn suspend(request: Suspend) -> Result<(), SchedulerError> {
    let yielder = CURRENT.with(Cell::take).ok_or(SchedulerError::NotInTask)?;
    // SAFETY: the pointer was published by `CurrentTask::enter` from inside the
    // coroutine that owns the yielder, and we are still on that coroutine's stack.
    unsafe { yielder.as_ref() }.suspend(request);
    CURRENT.with(|c| c.set(Some(yielder)));
    Ok(())
}

/// Suspend the current task for at least `duration`.
///
/// The wake time is measured from the clock reading at the call.
pub fn wait(duration: Duration) -> Result<(), SchedulerError> {
    suspend(Suspend::Sleep(duration))
}

/// Run `job` on the driving context's stack.
///
/// Inside a task, the task suspends, the driver runs the job right after the
/// tick returns, and the task resumes on a later tick (if it still exists).
/// Outside a task the job runs immediately.
pub(crate) fn run_on_driver(job: impl FnOnce() + 'static) {
    if !in_task() {
        job();
        return;
    }
    if let Err(e) = suspend(Suspend::Handoff(Box::new(job))) {
        tracing::warn!("Hand-off to driver failed: {e}");
    }
}

thread_local! {
    static DRIVING: Cell<bool> = const { Cell::new(false) };
}

/// Held while a frame is being driven on this thread.
pub(crate) struct DrivingGuard(());

impl DrivingGuard {
    /// `None` if a frame is already being driven on this thread.
    pub(crate) fn acquire() -> Option<Self> {
        DRIVING.with(|d| (!d.replace(true)).then_some(Self(())))
    }
}

impl Drop for DrivingGuard {
    fn drop(&mut self) {
        DRIVING.with(|d| d.set(false));
    }
}
