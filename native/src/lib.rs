//! Native call marshalling - call context, typed views over raw words, and the invoker.
//!
//! An extension calls a host function it knows only by [`Selector`]:
//!
//! ```text
//! ctx.reset(selector) -> ctx.push(word)* -> invoker.invoke(&mut ctx) -> ReturnBuffer::read::<T>()
//! ```
//!
//! The selector-to-signature mapping belongs to the host; this crate only moves
//! untyped 64-bit words in and raw result words out, through a [`NativeAdapter`].

mod context;
mod invoker;
mod registry;
mod value;

pub use context::{CallContext, MAX_ARGS, RETURN_WORDS, ReturnBuffer};
pub use invoker::{NativeAdapter, NativeInvoker};
pub use registry::{NativeCall, NativeHandler, NativeRegistry};
pub use value::NativeValue;

use strand_types::Selector;

/// Error types for native invocation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NativeError {
    #[error("Native call without a selector (reset was never called)")]
    SelectorUnset,
    #[error("Too many arguments for native {selector}: capacity is {capacity} words")]
    ArgumentOverflow { selector: Selector, capacity: usize },
    #[error("Native {selector} expects argument {index}, got {provided}")]
    MissingArgument {
        selector: Selector,
        index: usize,
        provided: usize,
    },
    #[error("Unknown native: {selector}")]
    UnknownNative { selector: Selector },
    #[error("Duplicate native registered: {selector} ({name})")]
    DuplicateNative { selector: Selector, name: String },
    #[error("Native {selector} failed: {message}")]
    CallFailed { selector: Selector, message: String },
}
