//! Host loop tests: group selection, commands, deferred work, unload

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use strand_config::HotkeyBindings;
use strand_engine::{SchedulerError, TaskEntry};
use strand_types::{
    ExecutionIdentity, GroupKind, HookState, HostCommand, HostRunState, HostThreadSnapshot,
};

use crate::common::{Harness, OTHER_THREAD, PRIMARY_THREAD, counting_task, module};

fn register_both(h: &Harness) -> (Rc<Cell<u32>>, Rc<Cell<u32>>) {
    let primary = Rc::new(Cell::new(0));
    let additional = Rc::new(Cell::new(0));
    h.runtime
        .register(
            GroupKind::Primary,
            module(1),
            counting_task(&primary, Duration::ZERO),
        )
        .unwrap();
    h.runtime
        .register(
            GroupKind::Additional,
            module(2),
            counting_task(&additional, Duration::ZERO),
        )
        .unwrap();
    (primary, additional)
}

#[test]
fn additional_group_waits_for_a_captured_target() {
    let h = Harness::new();
    let (primary, additional) = register_both(&h);

    h.other_idle();
    let report = h.runtime.on_frame().unwrap();
    assert_eq!(report.driven, None);
    assert_eq!(additional.get(), 0);
    assert!(h.host.swaps.borrow().is_empty());
    assert_eq!(h.runtime.target_thread(), None);

    h.primary_running();
    let report = h.runtime.on_frame().unwrap();
    assert_eq!(report.driven, Some(GroupKind::Primary));
    assert_eq!(primary.get(), 1);
    assert_eq!(h.runtime.target_thread(), Some(PRIMARY_THREAD));

    h.other_idle();
    let report = h.runtime.on_frame().unwrap();
    assert_eq!(report.driven, Some(GroupKind::Additional));
    assert_eq!(additional.get(), 1);
    assert_eq!(primary.get(), 1);
    assert_eq!(*h.host.swaps.borrow(), vec![PRIMARY_THREAD, OTHER_THREAD]);
}

#[test]
fn target_is_captured_once() {
    let h = Harness::new();
    h.primary_running();
    h.runtime.on_frame().unwrap();

    h.host.set(Some(HostThreadSnapshot {
        id: OTHER_THREAD,
        identity: crate::common::primary_identity(),
        state: HostRunState::Running,
    }));
    h.runtime.on_frame().unwrap();
    assert_eq!(h.runtime.target_thread(), Some(PRIMARY_THREAD));
}

#[test]
fn nothing_is_driven_without_a_matching_host_thread() {
    let h = Harness::new();
    let (primary, additional) = register_both(&h);

    h.runtime.on_frame().unwrap();
    h.host.set(Some(HostThreadSnapshot {
        id: OTHER_THREAD,
        identity: ExecutionIdentity::from_name("shop_controller"),
        state: HostRunState::Running,
    }));
    let report = h.runtime.on_frame().unwrap();
    assert_eq!(report.driven, None);
    assert_eq!(primary.get() + additional.get(), 0);
}

#[test]
fn changing_primary_identity_moves_primary_driving() {
    let h = Harness::new();
    let (primary, _) = register_both(&h);
    let replacement = ExecutionIdentity::from_name("replacement_script");

    h.runtime.set_primary_identity(replacement);
    assert_eq!(h.runtime.running_identity(), replacement);
    h.primary_running();
    assert_eq!(h.runtime.on_frame().unwrap().driven, None);

    h.host.set(Some(HostThreadSnapshot {
        id: PRIMARY_THREAD,
        identity: replacement,
        state: HostRunState::Running,
    }));
    assert_eq!(
        h.runtime.on_frame().unwrap().driven,
        Some(GroupKind::Primary)
    );
    assert_eq!(primary.get(), 1);
}

#[test]
fn held_hotkey_fires_once() {
    let h = Harness::new();
    let bindings = HotkeyBindings::default();
    register_both(&h);

    h.keys.press(bindings.remove_all);
    let first = h.runtime.on_frame().unwrap();
    assert_eq!(first.commands, vec![HostCommand::RemoveAll]);
    assert!(h.runtime.group(GroupKind::Primary).is_empty());

    register_both(&h);
    for _ in 0..3 {
        assert!(h.runtime.on_frame().unwrap().commands.is_empty());
    }
    assert!(h.runtime.group(GroupKind::Primary).contains(module(1)));

    h.keys.release(bindings.remove_all);
    h.runtime.on_frame().unwrap();
    h.keys.press(bindings.remove_all);
    assert_eq!(
        h.runtime.on_frame().unwrap().commands,
        vec![HostCommand::RemoveAll]
    );
}

#[test]
fn reload_hotkey_resets_and_unload_hotkey_requests_exit() {
    let h = Harness::new();
    let bindings = HotkeyBindings::default();
    register_both(&h);

    h.keys.press(bindings.reload);
    h.runtime.on_frame().unwrap();
    assert_eq!(h.loader.reinitialized.get(), 1);
    assert!(h.runtime.group(GroupKind::Additional).is_empty());

    h.keys.press(bindings.unload);
    let report = h.runtime.on_frame().unwrap();
    assert_eq!(report.commands, vec![HostCommand::RequestUnload]);
    assert_eq!(h.runtime.hook_state(), HookState::ExitRequested);
    // Requesting does not unload; the embedder does.
    assert!(h.runtime.on_frame().is_ok());
}

#[test]
fn queued_commands_run_on_next_frame() {
    let h = Harness::new();
    register_both(&h);
    h.runtime.queue_command(HostCommand::Reset);
    assert_eq!(h.loader.reinitialized.get(), 0);

    let report = h.runtime.on_frame().unwrap();
    assert_eq!(report.commands, vec![HostCommand::Reset]);
    assert_eq!(h.loader.reinitialized.get(), 1);
}

#[test]
fn deferred_jobs_from_other_threads_run_once_in_order() {
    let h = Harness::new();
    let sender = h.runtime.deferred_sender();
    let seen = Arc::new(Mutex::new(Vec::new()));

    let worker = {
        let seen = Arc::clone(&seen);
        thread::spawn(move || {
            for i in 0..5 {
                let seen = Arc::clone(&seen);
                assert!(sender.defer(move || seen.lock().unwrap().push(i)));
            }
        })
    };
    worker.join().unwrap();
    assert!(seen.lock().unwrap().is_empty());

    let report = h.runtime.on_frame().unwrap();
    assert_eq!(report.deferred, 5);
    assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2, 3, 4]);

    assert_eq!(h.runtime.on_frame().unwrap().deferred, 0);
    assert_eq!(seen.lock().unwrap().len(), 5);
}

#[test]
fn on_frame_from_inside_a_task_is_rejected() {
    let h = Harness::new();
    h.primary_running();
    let result = Rc::new(RefCell::new(None));
    let slot = Rc::clone(&result);
    let rt = Rc::downgrade(&h.runtime);
    h.runtime
        .register(
            GroupKind::Primary,
            module(1),
            TaskEntry::closure(move || {
                if let Some(rt) = rt.upgrade() {
                    *slot.borrow_mut() = rt.on_frame().err();
                }
                strand_engine::wait(Duration::from_secs(60)).unwrap();
            }),
        )
        .unwrap();

    h.runtime.on_frame().unwrap();
    assert_eq!(*result.borrow(), Some(SchedulerError::Reentrant));
}

#[test]
fn unload_is_idempotent_and_stops_the_loop() {
    let h = Harness::new();
    register_both(&h);

    h.runtime.unload();
    h.runtime.unload();
    assert_eq!(h.runtime.hook_state(), HookState::Exited);
    assert!(h.runtime.group(GroupKind::Primary).is_empty());
    assert!(h.runtime.group(GroupKind::Additional).is_empty());

    assert!(h.runtime.join_unload_worker());
    assert!(!h.runtime.join_unload_worker());
    assert_eq!(h.interception.removals.load(Ordering::SeqCst), 1);
    assert_eq!(h.runtime.on_frame().unwrap_err(), SchedulerError::Unloaded);
}

#[test]
fn unload_from_inside_a_task_runs_on_the_driver() {
    let h = Harness::new();
    h.primary_running();
    let rt = Rc::downgrade(&h.runtime);
    let after = Rc::new(Cell::new(false));
    let flag = Rc::clone(&after);
    h.runtime
        .register(
            GroupKind::Primary,
            module(1),
            TaskEntry::closure(move || {
                if let Some(rt) = rt.upgrade() {
                    rt.unload();
                }
                flag.set(true);
            }),
        )
        .unwrap();

    h.runtime.on_frame().unwrap();
    assert!(!after.get());
    assert_eq!(h.runtime.hook_state(), HookState::Exited);
    assert!(h.runtime.join_unload_worker());
    assert_eq!(h.interception.removals.load(Ordering::SeqCst), 1);
}
