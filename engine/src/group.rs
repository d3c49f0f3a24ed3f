use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use strand_types::{GroupKind, ModuleId, TaskState};
use tracing::{debug, error, info, warn};

use crate::SchedulerError;
use crate::boundary::ModuleLoader;
use crate::clock::Clock;
use crate::fault::FaultReport;
use crate::fiber;
use crate::notifications::{NotificationQueue, SchedulerNotification};
use crate::task::{Task, TaskEntry, TaskSettings, TickOutcome};

/// State shared by both groups of a runtime.
pub(crate) struct GroupShared {
    pub(crate) loader: Rc<dyn ModuleLoader>,
    pub(crate) clock: Rc<dyn Clock>,
    pub(crate) notifications: RefCell<NotificationQueue>,
    pub(crate) settings: TaskSettings,
}

impl GroupShared {
    fn notify(&self, notification: SchedulerNotification) {
        self.notifications.borrow_mut().push(notification);
    }
}

struct TaskSlot {
    entry: TaskEntry,
    task: Rc<RefCell<Task>>,
}

/// A task that faulted during a drive cycle.
#[derive(Debug, Clone)]
pub struct TaskFault {
    pub module: ModuleId,
    pub report: FaultReport,
}

/// What one drive cycle did.
#[derive(Debug, Default)]
pub struct DriveReport {
    /// Tasks whose wake time had come and that actually ran.
    pub ran: usize,
    /// Tasks visited, ready or not.
    pub ticked: usize,
    pub faulted: Vec<TaskFault>,
}

/// Tasks driven together once per cycle, keyed by owning module.
pub struct TaskGroup {
    kind: GroupKind,
    tasks: RefCell<BTreeMap<ModuleId, TaskSlot>>,
    shared: Rc<GroupShared>,
}

impl TaskGroup {
    pub(crate) fn new(kind: GroupKind, shared: Rc<GroupShared>) -> Self {
        Self {
            kind,
            tasks: RefCell::new(BTreeMap::new()),
            shared,
        }
    }

    #[must_use]
    pub fn kind(&self) -> GroupKind {
        self.kind
    }

    pub fn add(&self, module: ModuleId, entry: TaskEntry) -> Result<(), SchedulerError> {
        let name = self.shared.loader.display_name(module);
        {
            let mut tasks = self.tasks.borrow_mut();
            if tasks.contains_key(&module) {
                error!(module = %name, group = %self.kind, "Task is already registered");
                return Err(SchedulerError::DuplicateModule {
                    module: name,
                    group: self.kind,
                });
            }
            info!(module = %name, group = %self.kind, ?entry, "Registering task");
            let task = Task::new(entry.clone(), self.shared.settings);
            tasks.insert(
                module,
                TaskSlot {
                    entry,
                    task: Rc::new(RefCell::new(task)),
                },
            );
        }
        self.shared.notify(SchedulerNotification::Loaded {
            module: name,
            group: self.kind,
        });
        Ok(())
    }

    /// Remove the module's task. Returns whether anything was removed.
    ///
    /// A task removed while it is running keeps running until it next suspends,
    /// and its context is destroyed once control is back on the driver.
    pub fn remove(&self, module: ModuleId) -> bool {
        let Some(slot) = self.tasks.borrow_mut().remove(&module) else {
            return false;
        };
        // Dropping a suspended task unwinds its stack, which can run arbitrary
        // destructors; no borrow of the map may be held here.
        drop(slot);

        let name = self.shared.loader.display_name(module);
        self.shared.loader.release(module);
        info!(module = %name, group = %self.kind, "Unregistered task");
        self.shared.notify(SchedulerNotification::Removed {
            module: name,
            group: self.kind,
        });
        true
    }

    /// Remove every task whose entry is `entry`. Returns how many were removed.
    pub fn remove_by_entry(&self, entry: &TaskEntry) -> usize {
        let matching: Vec<ModuleId> = self
            .tasks
            .borrow()
            .iter()
            .filter(|(_, slot)| slot.entry == *entry)
            .map(|(module, _)| *module)
            .collect();
        matching
            .into_iter()
            .filter(|module| self.remove(*module))
            .count()
    }

    /// Remove every task.
    ///
    /// From inside a task, control goes back to the driver first and the
    /// removal runs there; the calling task does not resume if it was removed.
    pub fn remove_all(self: &Rc<Self>) {
        if fiber::in_task() {
            let group = Rc::clone(self);
            fiber::run_on_driver(move || {
                group.remove_all_now();
            });
            return;
        }
        self.remove_all_now();
    }

    pub(crate) fn remove_all_now(&self) -> usize {
        let modules: Vec<ModuleId> = self.tasks.borrow().keys().copied().collect();
        let removed = modules
            .into_iter()
            .filter(|module| self.remove(*module))
            .count();
        if removed > 0 {
            info!(group = %self.kind, removed, "Removed all tasks");
            self.shared.notify(SchedulerNotification::GroupEmptied {
                group: self.kind,
                removed,
            });
        }
        removed
    }

    /// Tick every task registered at the start of the call once.
    ///
    /// Tasks added during the cycle wait for the next one. Tasks removed
    /// before their turn are skipped. Faulted tasks are removed from this group.
    /// Called from inside a task, nothing is ticked.
    pub(crate) fn drive(&self) -> DriveReport {
        if fiber::in_task() {
            warn!(group = %self.kind, "Group driven from inside a task; ignored");
            return DriveReport::default();
        }
        let snapshot: Vec<(ModuleId, Rc<RefCell<Task>>)> = self
            .tasks
            .borrow()
            .iter()
            .map(|(module, slot)| (*module, Rc::clone(&slot.task)))
            .collect();

        let mut report = DriveReport::default();
        for (module, task) in snapshot {
            if !self.holds(module, &task) {
                continue;
            }

            let outcome = task.borrow_mut().tick(self.shared.clock.as_ref());

            report.ticked += 1;
            match outcome {
                TickOutcome::NotReady | TickOutcome::Finished => {}
                TickOutcome::Suspended => report.ran += 1,
                TickOutcome::Handoff(job) => {
                    report.ran += 1;
                    job();
                }
                TickOutcome::Completed => {
                    report.ran += 1;
                    debug!(module = %module, group = %self.kind, "Task entry returned");
                }
                TickOutcome::Faulted(fault) => {
                    report.ran += 1;
                    self.remove(module);
                    report.faulted.push(TaskFault {
                        module,
                        report: fault,
                    });
                }
            }
        }
        report
    }

    fn holds(&self, module: ModuleId, task: &Rc<RefCell<Task>>) -> bool {
        self.tasks
            .borrow()
            .get(&module)
            .is_some_and(|slot| Rc::ptr_eq(&slot.task, task))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.borrow().is_empty()
    }

    #[must_use]
    pub fn contains(&self, module: ModuleId) -> bool {
        self.tasks.borrow().contains_key(&module)
    }

    /// Registered modules in drive order.
    #[must_use]
    pub fn modules(&self) -> Vec<ModuleId> {
        self.tasks.borrow().keys().copied().collect()
    }

    #[must_use]
    pub fn state(&self, module: ModuleId) -> Option<TaskState> {
        let tasks = self.tasks.borrow();
        let slot = tasks.get(&module)?;
        Some(match slot.task.try_borrow() {
            Ok(task) => task.state(),
            Err(_) => TaskState::Running,
        })
    }
}
