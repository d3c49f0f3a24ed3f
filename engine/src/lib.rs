//! Cooperative fiber scheduler for extensions hosted inside another process.
//!
//! Extension modules register a task entry; each task runs on its own stack and
//! gives control back with [`wait`]. The host calls
//! [`SchedulerRuntime::on_frame`] once per frame and the runtime drives one of
//! two task groups depending on which host script thread is active.
//!
//! ```text
//! host frame ──► on_frame ──► drive(primary | additional) ──► Task::tick ──► coroutine
//!                   │                                              ▲
//!                   ├─► hotkeys / queued commands                  └── wait() suspends here
//!                   └─► deferred jobs (any thread)
//! ```

mod boundary;
mod clock;
mod deferred;
pub mod exports;
mod fault;
mod fiber;
mod group;
mod hotkeys;
mod input;
mod notifications;
mod runtime;
mod task;

pub use boundary::{
    FaultSink, HostStateFeed, Interception, KeyState, ModuleLoader, NoInterception, NoKeys,
    NullLoader,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use deferred::{DeferredJob, DeferredSender};
pub use fault::FaultReport;
pub use fiber::{in_task, wait};
pub use group::{DriveReport, TaskFault, TaskGroup};
pub use hotkeys::Hotkeys;
pub use input::{
    KeyEvent, KeyboardDispatcher, KeyboardHandler, MessageHandler, WM_KEYDOWN, WM_KEYUP,
    WM_SYSKEYDOWN, WM_SYSKEYUP,
};
pub use notifications::{NotificationQueue, SchedulerNotification};
pub use runtime::{FrameReport, RuntimeParts, SchedulerRuntime};
pub use task::{RawEntry, TaskEntry, TaskSettings};

pub use strand_native::{NativeError, ReturnBuffer};
pub use strand_types::{GroupKind, ModuleId, TaskState};

/// Scheduler error types.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchedulerError {
    #[error("'{module}' is already registered in the {group} group")]
    DuplicateModule { module: String, group: GroupKind },
    #[error("wait called outside of a task")]
    NotInTask,
    #[error("frame driven from inside a task or while another frame is in progress")]
    Reentrant,
    #[error("scheduler has been unloaded")]
    Unloaded,
    #[error("failed to load extension '{path}'")]
    LoadFailed { path: String },
}
