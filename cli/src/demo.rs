//! Built-in demo extensions and the natives they call.

use std::rc::{Rc, Weak};
use std::time::Duration;

use strand_engine::{Clock, SchedulerRuntime, SystemClock, TaskEntry};
use strand_native::{NativeError, NativeRegistry};
use strand_types::{GroupKind, ModuleId, Selector, Vector3};

pub const GET_GAME_TIMER: Selector = Selector::new(0x9CD2_7B00_4562_8463);
pub const ADD_INTS: Selector = Selector::new(0x0000_0000_0000_0ADD);
pub const GET_ENTITY_COORDS: Selector = Selector::new(0x3FEF_770D_4096_0D5A);
pub const READ_FREED_MEMORY: Selector = Selector::new(0xDEAD_0000_0000_0001);

pub const HUD: ModuleId = ModuleId::new(0x7FF6_1000);
pub const TRAINER: ModuleId = ModuleId::new(0x7FF6_2000);
pub const CRASHER: ModuleId = ModuleId::new(0x7FF6_3000);

/// Module handles and the paths they were "loaded" from.
pub const MODULES: [(ModuleId, &str); 3] = [
    (HUD, r"C:\Games\mods\hud.asi"),
    (TRAINER, r"C:\Games\mods\NativeTrainer.asi"),
    (CRASHER, r"C:\Games\mods\crasher.asi"),
];

pub fn natives(clock: SystemClock) -> Result<NativeRegistry, NativeError> {
    let mut natives = NativeRegistry::new();
    natives.register_fn(GET_GAME_TIMER, "GET_GAME_TIMER", move |call| {
        let ms = clock.now().as_millis();
        call.set_return(u32::try_from(ms & u64::from(u32::MAX)).unwrap_or_default());
        Ok(())
    })?;
    natives.register_fn(ADD_INTS, "ADD_INTS", |call| {
        let a = call.arg::<i32>(0)?;
        let b = call.arg::<i32>(1)?;
        let sum = a
            .checked_add(b)
            .ok_or_else(|| call.fail("integer overflow"))?;
        call.set_return(sum);
        Ok(())
    })?;
    natives.register_fn(GET_ENTITY_COORDS, "GET_ENTITY_COORDS", |call| {
        let entity = call.arg::<i32>(0)?;
        let offset = entity as f32;
        call.set_return(Vector3::new(offset, offset * 0.5, 30.0));
        Ok(())
    })?;
    natives.register_fn(READ_FREED_MEMORY, "READ_FREED_MEMORY", |call| {
        // A host access violation, as the adapter would surface it.
        panic!("access violation in native {}", call.selector());
    })?;
    Ok(natives)
}

/// Register every demo extension with `runtime`.
pub fn register_all(runtime: &Rc<SchedulerRuntime>) {
    let extensions = [
        (GroupKind::Primary, HUD, hud(Rc::downgrade(runtime))),
        (GroupKind::Additional, TRAINER, trainer(Rc::downgrade(runtime))),
        (GroupKind::Primary, CRASHER, crasher(Rc::downgrade(runtime))),
    ];
    for (group, module, entry) in extensions {
        if let Err(e) = runtime.register(group, module, entry) {
            tracing::warn!("Demo extension not registered: {e}");
        }
    }
}

fn call_native<T: strand_native::NativeValue>(
    runtime: &SchedulerRuntime,
    selector: Selector,
    args: &[u64],
) -> Result<T, NativeError> {
    runtime.native_init(selector);
    for word in args {
        runtime.native_push(*word)?;
    }
    Ok(runtime.native_call()?.read::<T>())
}

fn hud(runtime: Weak<SchedulerRuntime>) -> TaskEntry {
    TaskEntry::closure(move || {
        while let Some(rt) = runtime.upgrade() {
            match call_native::<u32>(&rt, GET_GAME_TIMER, &[]) {
                Ok(timer) => tracing::info!(timer, "hud: game timer"),
                Err(e) => tracing::warn!("hud: {e}"),
            }
            if rt.wait(Duration::from_secs(1)).is_err() {
                return;
            }
        }
    })
}

fn trainer(runtime: Weak<SchedulerRuntime>) -> TaskEntry {
    TaskEntry::closure(move || {
        let mut entity: i32 = 1;
        while let Some(rt) = runtime.upgrade() {
            let sum = call_native::<i32>(&rt, ADD_INTS, &[u64::from(entity as u32), 3]);
            let coords =
                call_native::<Vector3>(&rt, GET_ENTITY_COORDS, &[u64::from(entity as u32)]);
            match (sum, coords) {
                (Ok(sum), Ok(coords)) => {
                    tracing::debug!(entity, sum, ?coords, "trainer: read entity");
                }
                (Err(e), _) | (_, Err(e)) => tracing::warn!("trainer: {e}"),
            }
            entity = entity.wrapping_add(1);
            if rt.wait(Duration::from_millis(250)).is_err() {
                return;
            }
        }
    })
}

fn crasher(runtime: Weak<SchedulerRuntime>) -> TaskEntry {
    TaskEntry::closure(move || {
        let Some(rt) = runtime.upgrade() else {
            return;
        };
        if rt.wait(Duration::from_secs(2)).is_err() {
            return;
        }
        tracing::info!("crasher: calling a native on a stale handle");
        let _ = call_native::<u64>(&rt, READ_FREED_MEMORY, &[0]);
    })
}
