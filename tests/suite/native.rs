//! Native calls made through the runtime

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use strand_engine::{SchedulerRuntime, TaskEntry};
use strand_native::{MAX_ARGS, NativeError, NativeRegistry};
use strand_types::{GroupKind, Selector, Vector3};

use crate::common::{Harness, module};

const ADD: Selector = Selector::new(0x10);
const COORDS: Selector = Selector::new(0x20);
const TICK_COUNT: Selector = Selector::new(0x30);

fn natives() -> NativeRegistry {
    let mut natives = NativeRegistry::new();
    natives
        .register_fn(ADD, "ADD", |call| {
            let sum = call.arg::<i32>(0)? + call.arg::<i32>(1)?;
            call.set_return(sum);
            Ok(())
        })
        .unwrap();
    natives
        .register_fn(COORDS, "COORDS", |call| {
            call.set_return(Vector3::new(1.0, -2.5, 30.0));
            Ok(())
        })
        .unwrap();
    let ticks = Cell::new(0u32);
    natives
        .register_fn(TICK_COUNT, "TICK_COUNT", move |call| {
            ticks.set(ticks.get() + 1);
            call.set_return(ticks.get());
            Ok(())
        })
        .unwrap();
    natives
}

fn call(rt: &SchedulerRuntime, selector: Selector, args: &[u64]) -> Result<[u64; 3], NativeError> {
    rt.native_init(selector);
    for word in args {
        rt.native_push(*word)?;
    }
    Ok(*rt.native_call()?.words())
}

#[test]
fn integer_arguments_and_result() {
    let h = Harness::with_natives(natives());
    h.runtime.native_init(ADD);
    h.runtime.native_push(u64::from(40u32)).unwrap();
    h.runtime.native_push(2).unwrap();
    let ret = h.runtime.native_call().unwrap();
    assert_eq!(ret.read::<i32>(), 42);
}

#[test]
fn vector_result_fills_three_words() {
    let h = Harness::with_natives(natives());
    h.runtime.native_init(COORDS);
    let ret = h.runtime.native_call().unwrap();
    assert_eq!(ret.read::<Vector3>(), Vector3::new(1.0, -2.5, 30.0));
}

#[test]
fn init_discards_previous_arguments() {
    let h = Harness::with_natives(natives());
    h.runtime.native_init(ADD);
    h.runtime.native_push(1000).unwrap();
    h.runtime.native_init(ADD);
    h.runtime.native_push(1).unwrap();
    h.runtime.native_push(2).unwrap();
    assert_eq!(h.runtime.native_call().unwrap().read::<i32>(), 3);
}

#[test]
fn missing_argument_is_reported() {
    let h = Harness::with_natives(natives());
    let err = call(&h.runtime, ADD, &[7]).unwrap_err();
    assert_eq!(
        err,
        NativeError::MissingArgument {
            selector: ADD,
            index: 1,
            provided: 1,
        }
    );
}

#[test]
fn unknown_selector_is_reported() {
    let h = Harness::with_natives(natives());
    let unknown = Selector::new(0xFFFF);
    assert_eq!(
        call(&h.runtime, unknown, &[]).unwrap_err(),
        NativeError::UnknownNative { selector: unknown }
    );
}

#[test]
fn argument_capacity_is_enforced() {
    let h = Harness::with_natives(natives());
    h.runtime.native_init(ADD);
    for i in 0..MAX_ARGS {
        h.runtime.native_push(i as u64).unwrap();
    }
    assert!(matches!(
        h.runtime.native_push(0),
        Err(NativeError::ArgumentOverflow { .. })
    ));
}

#[test]
fn call_without_init_is_rejected() {
    let h = Harness::with_natives(natives());
    assert_eq!(h.runtime.native_call().unwrap_err(), NativeError::SelectorUnset);
}

#[test]
fn tasks_call_natives_across_waits() {
    let h = Harness::with_natives(natives());
    h.primary_running();
    let seen = Rc::new(RefCell::new(Vec::new()));
    let log = Rc::clone(&seen);
    let rt = Rc::downgrade(&h.runtime);
    h.runtime
        .register(
            GroupKind::Primary,
            module(1),
            TaskEntry::closure(move || {
                loop {
                    let Some(runtime) = rt.upgrade() else { return };
                    let words = call(&runtime, TICK_COUNT, &[]).unwrap();
                    log.borrow_mut().push(words[0]);
                    drop(runtime);
                    strand_engine::wait(Duration::from_millis(10)).unwrap();
                }
            }),
        )
        .unwrap();

    for ms in [0, 5, 10, 20] {
        h.at(ms);
        h.runtime.on_frame().unwrap();
    }
    assert_eq!(*seen.borrow(), vec![1, 2, 3]);
}
