//! Task fault capture.
//!
//! A process-wide panic hook records the message, location and backtrace of
//! panics raised inside a task into a thread-local slot. The task's
//! `catch_unwind` boundary then turns the slot into a [`FaultReport`]. Panics
//! outside tasks go to whatever hook was installed before.

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::RefCell;
use std::fmt;
use std::panic::{self, PanicHookInfo};
use std::sync::Once;

use crate::fiber;

/// A contained task fault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaultReport {
    pub message: String,
    pub location: Option<String>,
    pub backtrace: String,
}

impl FaultReport {
    pub(crate) fn from_message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            location: None,
            backtrace: String::new(),
        }
    }
}

impl fmt::Display for FaultReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)?;
        if let Some(location) = &self.location {
            write!(f, " at {location}")?;
        }
        if !self.backtrace.is_empty() {
            write!(f, "\n{}", self.backtrace)?;
        }
        Ok(())
    }
}

thread_local! {
    static CAPTURED: RefCell<Option<FaultReport>> = const { RefCell::new(None) };
}

static HOOK: Once = Once::new();

pub(crate) fn install_panic_hook() {
    HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if fiber::in_task() {
                capture(info);
            } else {
                previous(info);
            }
        }));
    });
}

fn capture(info: &PanicHookInfo<'_>) {
    let report = FaultReport {
        message: info
            .payload_as_str()
            .unwrap_or("non-string panic payload")
            .to_string(),
        location: info.location().map(ToString::to_string),
        backtrace: Backtrace::force_capture().to_string(),
    };
    let _ = CAPTURED.try_with(|slot| *slot.borrow_mut() = Some(report));
}

/// Drop any capture left by a panic the task caught itself.
pub(crate) fn clear_captured() {
    let _ = CAPTURED.try_with(|slot| slot.borrow_mut().take());
}

/// Build the report for a caught panic payload.
///
/// The slot is always emptied. A capture is used only if it describes this payload.
pub(crate) fn take_report(payload: &(dyn Any + Send)) -> FaultReport {
    let message = payload_message(payload);
    let captured = CAPTURED
        .try_with(|slot| slot.borrow_mut().take())
        .ok()
        .flatten();
    match captured {
        Some(report) if report.message == message => report,
        _ => FaultReport::from_message(message),
    }
}

fn payload_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
