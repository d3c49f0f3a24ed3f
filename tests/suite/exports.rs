//! C ABI exports routed to an installed runtime

use std::ffi::c_void;
use std::ptr;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use strand_engine::{KeyState, KeyboardDispatcher};
use strand_engine::exports::{
    self, strand_create_detour, strand_keyboard_handler_register,
    strand_keyboard_handler_unregister, strand_native_call, strand_native_init,
    strand_native_push64, strand_register, strand_register_additional, strand_remove_detour,
    strand_running_identity, strand_set_primary_identity, strand_unregister,
    strand_unregister_entry, strand_wait,
};
use strand_native::NativeRegistry;
use strand_types::{ExecutionIdentity, GroupKind, Selector, TaskState, VirtualKey};

use crate::common::{Harness, TRAMPOLINE_OFFSET, module, primary_identity};

const DOUBLE: Selector = Selector::new(0x2);

static WAITING_RUNS: AtomicU32 = AtomicU32::new(0);

extern "C-unwind" fn waiting_entry() {
    loop {
        WAITING_RUNS.fetch_add(1, Ordering::SeqCst);
        strand_wait(50);
    }
}

extern "C-unwind" fn idle_entry() {}

/// Uninstalls on drop.
struct Installed;

impl Installed {
    fn new(h: &Harness, keyboard: Option<Arc<KeyboardDispatcher>>) -> Self {
        exports::install(Rc::clone(&h.runtime), keyboard);
        Self
    }
}

impl Drop for Installed {
    fn drop(&mut self) {
        exports::uninstall();
    }
}

#[test]
fn calls_without_a_runtime_are_inert() {
    exports::uninstall();
    strand_register(1, idle_entry);
    strand_native_init(DOUBLE.value());
    strand_native_push64(3);
    assert!(strand_native_call().is_null());
    assert_eq!(strand_running_identity(), 0);
    assert!(strand_create_detour(address(0x1000), address(0x2000)).is_null());
}

fn address(addr: usize) -> *mut c_void {
    ptr::with_exposed_provenance_mut(addr)
}

#[test]
fn detours_install_and_remove_through_exports() {
    let h = Harness::new();
    let _installed = Installed::new(&h, None);
    let (target, handler) = (address(0x1000), address(0x2000));

    let trampoline = strand_create_detour(target, handler);
    assert_eq!(trampoline.addr(), 0x1000 + TRAMPOLINE_OFFSET);
    // The same pair cannot be installed twice.
    assert!(strand_create_detour(target, handler).is_null());
    assert_eq!(
        *h.interception.detours.lock().unwrap(),
        vec![(0x1000, 0x2000)]
    );

    strand_remove_detour(target, address(0x3000));
    assert_eq!(h.interception.detours.lock().unwrap().len(), 1);
    strand_remove_detour(target, handler);
    assert!(h.interception.detours.lock().unwrap().is_empty());
}

#[test]
fn register_and_wait_through_exports() {
    let h = Harness::new();
    h.primary_running();
    let _installed = Installed::new(&h, None);

    strand_register(1, waiting_entry);
    strand_register_additional(2, idle_entry);
    assert_eq!(
        h.runtime.task_state(GroupKind::Primary, module(1)),
        Some(TaskState::NotStarted)
    );
    assert!(h.runtime.group(GroupKind::Additional).contains(module(2)));

    let before = WAITING_RUNS.load(Ordering::SeqCst);
    h.runtime.on_frame().unwrap();
    h.at(20);
    h.runtime.on_frame().unwrap();
    assert_eq!(WAITING_RUNS.load(Ordering::SeqCst) - before, 1);
    h.at(50);
    h.runtime.on_frame().unwrap();
    assert_eq!(WAITING_RUNS.load(Ordering::SeqCst) - before, 2);

    strand_unregister(1);
    assert!(h.runtime.group(GroupKind::Primary).is_empty());
    strand_unregister_entry(idle_entry);
    assert!(h.runtime.group(GroupKind::Additional).is_empty());
}

#[test]
fn native_call_returns_pointer_to_result_words() {
    let mut natives = NativeRegistry::new();
    natives
        .register_fn(DOUBLE, "DOUBLE", |call| {
            let value = call.arg::<u64>(0)?;
            call.set_return(value * 2);
            Ok(())
        })
        .unwrap();
    let h = Harness::with_natives(natives);
    let _installed = Installed::new(&h, None);

    strand_native_init(DOUBLE.value());
    strand_native_push64(21);
    let words = strand_native_call();
    assert!(!words.is_null());
    // SAFETY: the pointer stays valid until the next native call on this thread.
    assert_eq!(unsafe { *words }, 42);

    strand_native_init(0xDEAD);
    let words = strand_native_call();
    // Failed calls leave zeroed return words.
    assert_eq!(unsafe { *words }, 0);
}

#[test]
fn identity_exports_round_trip() {
    let h = Harness::new();
    let _installed = Installed::new(&h, None);

    assert_eq!(strand_running_identity(), primary_identity().value());
    let replacement = ExecutionIdentity::from_name("freemode");
    strand_set_primary_identity(replacement.value());
    assert_eq!(strand_running_identity(), replacement.value());
    assert_eq!(h.runtime.running_identity(), replacement);
}

static KEYS_SEEN: AtomicU32 = AtomicU32::new(0);

extern "C" fn on_key(key: u32, _: u16, _: u8, _: bool, _: bool, _: bool, is_up: bool) {
    if !is_up {
        KEYS_SEEN.store(key, Ordering::SeqCst);
    }
}

#[test]
fn keyboard_handlers_register_through_exports() {
    let h = Harness::new();
    let keyboard = Arc::new(KeyboardDispatcher::new());
    let _installed = Installed::new(&h, Some(Arc::clone(&keyboard)));

    strand_keyboard_handler_register(on_key);
    keyboard.dispatch(strand_engine::WM_KEYDOWN, 0x41, 1);
    assert_eq!(KEYS_SEEN.load(Ordering::SeqCst), 0x41);

    strand_keyboard_handler_unregister(on_key);
    keyboard.dispatch(strand_engine::WM_KEYDOWN, 0x42, 1);
    assert_eq!(KEYS_SEEN.load(Ordering::SeqCst), 0x41);
    assert!(keyboard.is_down(VirtualKey::new(0x42)));
}

#[test]
fn uninstall_returns_the_runtime() {
    let h = Harness::new();
    exports::install(Rc::clone(&h.runtime), None);
    let runtime = exports::uninstall().unwrap();
    assert!(Rc::ptr_eq(&runtime, &h.runtime));
    assert!(exports::uninstall().is_none());
}
