//! C ABI for extension modules.
//!
//! Extensions are foreign binaries that link against these symbols. The
//! embedder installs one runtime per thread with [`install`]; every export
//! routes to it. Calls made with nothing installed log a warning and do nothing.
//!
//! `strand_wait` and `strand_native_call` use the `C-unwind` ABI: a task being
//! destroyed while suspended unwinds through `strand_wait`, and a faulting
//! native unwinds through `strand_native_call` to the task's fault boundary.

use std::cell::RefCell;
use std::ffi::c_void;
use std::ptr;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use strand_types::{ExecutionIdentity, GroupKind, ModuleId, Selector};
use tracing::warn;

use crate::input::{KeyboardDispatcher, KeyboardHandler, MessageHandler};
use crate::runtime::SchedulerRuntime;
use crate::task::{RawEntry, TaskEntry};

struct Installed {
    runtime: Rc<SchedulerRuntime>,
    keyboard: Option<Arc<KeyboardDispatcher>>,
}

thread_local! {
    static INSTALLED: RefCell<Option<Installed>> = const { RefCell::new(None) };
}

/// Route this thread's exports to `runtime` (and `keyboard`, if given).
pub fn install(runtime: Rc<SchedulerRuntime>, keyboard: Option<Arc<KeyboardDispatcher>>) {
    INSTALLED.with(|slot| *slot.borrow_mut() = Some(Installed { runtime, keyboard }));
}

/// Detach this thread's runtime. Returns it if one was installed.
pub fn uninstall() -> Option<Rc<SchedulerRuntime>> {
    INSTALLED.with(|slot| slot.borrow_mut().take().map(|installed| installed.runtime))
}

// The handle is cloned out so no borrow is held while the call runs;
// `strand_wait` suspends in the middle of it.
fn with_runtime<R>(op: &'static str, f: impl FnOnce(&Rc<SchedulerRuntime>) -> R) -> Option<R> {
    let runtime = INSTALLED.with(|slot| {
        slot.borrow()
            .as_ref()
            .map(|installed| Rc::clone(&installed.runtime))
    });
    if let Some(runtime) = runtime {
        Some(f(&runtime))
    } else {
        warn!(op, "No scheduler runtime installed");
        None
    }
}

fn with_keyboard(op: &'static str, f: impl FnOnce(&KeyboardDispatcher)) {
    let keyboard = INSTALLED.with(|slot| {
        slot.borrow()
            .as_ref()
            .and_then(|installed| installed.keyboard.clone())
    });
    match keyboard {
        Some(keyboard) => f(&keyboard),
        None => warn!(op, "No keyboard dispatcher installed"),
    }
}

fn register(op: &'static str, kind: GroupKind, module: usize, entry: RawEntry) {
    with_runtime(op, |rt| {
        // Conflicts are logged by the group.
        let _ = rt.register(kind, ModuleId::new(module), TaskEntry::Raw(entry));
    });
}

#[unsafe(no_mangle)]
pub extern "C" fn strand_register(module: usize, entry: RawEntry) {
    register("strand_register", GroupKind::Primary, module, entry);
}

#[unsafe(no_mangle)]
pub extern "C" fn strand_register_additional(module: usize, entry: RawEntry) {
    register(
        "strand_register_additional",
        GroupKind::Additional,
        module,
        entry,
    );
}

#[unsafe(no_mangle)]
pub extern "C" fn strand_unregister(module: usize) {
    with_runtime("strand_unregister", |rt| rt.unregister(ModuleId::new(module)));
}

/// Legacy removal by entry function.
#[unsafe(no_mangle)]
pub extern "C" fn strand_unregister_entry(entry: RawEntry) {
    with_runtime("strand_unregister_entry", |rt| {
        rt.unregister_entry(&TaskEntry::Raw(entry))
    });
}

#[unsafe(no_mangle)]
pub extern "C-unwind" fn strand_wait(ms: u32) {
    with_runtime("strand_wait", |rt| {
        if let Err(e) = rt.wait(Duration::from_millis(u64::from(ms))) {
            warn!("strand_wait: {e}");
        }
    });
}

#[unsafe(no_mangle)]
pub extern "C" fn strand_native_init(selector: u64) {
    with_runtime("strand_native_init", |rt| {
        rt.native_init(Selector::new(selector));
    });
}

#[unsafe(no_mangle)]
pub extern "C" fn strand_native_push64(value: u64) {
    with_runtime("strand_native_push64", |rt| {
        if let Err(e) = rt.native_push(value) {
            warn!("strand_native_push64: {e}");
        }
    });
}

/// Invoke the prepared native. Returns the return words, or null with no runtime.
///
/// The pointer stays valid until the next call on this thread.
#[unsafe(no_mangle)]
pub extern "C-unwind" fn strand_native_call() -> *const u64 {
    with_runtime("strand_native_call", |rt| {
        if let Err(e) = rt.native_call() {
            warn!("strand_native_call: {e}");
        }
        rt.return_words_ptr()
    })
    .unwrap_or(ptr::null())
}

#[unsafe(no_mangle)]
pub extern "C" fn strand_set_primary_identity(identity: u32) {
    with_runtime("strand_set_primary_identity", |rt| {
        rt.set_primary_identity(ExecutionIdentity::new(identity));
    });
}

#[unsafe(no_mangle)]
pub extern "C" fn strand_running_identity() -> u32 {
    with_runtime("strand_running_identity", |rt| rt.running_identity().value()).unwrap_or(0)
}

/// Detour `target` to `handler`. Returns the trampoline to the original, or null.
#[unsafe(no_mangle)]
pub extern "C" fn strand_create_detour(target: *mut c_void, handler: *mut c_void) -> *mut c_void {
    with_runtime("strand_create_detour", |rt| {
        rt.create_detour(target.expose_provenance(), handler.expose_provenance())
    })
    .flatten()
    .map_or(ptr::null_mut(), ptr::with_exposed_provenance_mut)
}

#[unsafe(no_mangle)]
pub extern "C" fn strand_remove_detour(target: *mut c_void, handler: *mut c_void) {
    with_runtime("strand_remove_detour", |rt| {
        rt.remove_detour(target.expose_provenance(), handler.expose_provenance())
    });
}

#[unsafe(no_mangle)]
pub extern "C" fn strand_keyboard_handler_register(handler: KeyboardHandler) {
    with_keyboard("strand_keyboard_handler_register", |kb| {
        kb.register_keyboard_handler(handler);
    });
}

#[unsafe(no_mangle)]
pub extern "C" fn strand_keyboard_handler_unregister(handler: KeyboardHandler) {
    with_keyboard("strand_keyboard_handler_unregister", |kb| {
        kb.unregister_keyboard_handler(handler);
    });
}

#[unsafe(no_mangle)]
pub extern "C" fn strand_message_handler_register(handler: MessageHandler) {
    with_keyboard("strand_message_handler_register", |kb| {
        kb.register_message_handler(handler);
    });
}

#[unsafe(no_mangle)]
pub extern "C" fn strand_message_handler_unregister(handler: MessageHandler) {
    with_keyboard("strand_message_handler_unregister", |kb| {
        kb.unregister_message_handler(handler);
    });
}
