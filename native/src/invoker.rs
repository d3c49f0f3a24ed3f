use strand_types::Selector;

use crate::NativeError;
use crate::context::{CallContext, ReturnBuffer};

/// Host-side dispatch by selector.
///
/// The adapter owns whatever calling convention the host uses; it reads the
/// argument words and writes raw result words.
pub trait NativeAdapter {
    fn call(&self, selector: Selector, args: &[u64], ret: &mut ReturnBuffer)
    -> Result<(), NativeError>;
}

impl<A: NativeAdapter + ?Sized> NativeAdapter for Box<A> {
    fn call(
        &self,
        selector: Selector,
        args: &[u64],
        ret: &mut ReturnBuffer,
    ) -> Result<(), NativeError> {
        (**self).call(selector, args, ret)
    }
}

/// Dispatches a prepared [`CallContext`] through an adapter.
pub struct NativeInvoker<A> {
    adapter: A,
}

impl<A: NativeAdapter> NativeInvoker<A> {
    pub fn new(adapter: A) -> Self {
        Self { adapter }
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    /// Invoke the native selected by the last `reset`.
    ///
    /// The return buffer is zeroed first, so a native that writes nothing
    /// reads back as zero rather than the previous call's result.
    pub fn invoke<'c>(&self, ctx: &'c mut CallContext) -> Result<&'c ReturnBuffer, NativeError> {
        let selector = ctx.selector().ok_or(NativeError::SelectorUnset)?;
        let (args, ret) = ctx.split_for_call();
        ret.clear();
        tracing::trace!(%selector, argc = args.len(), "Invoking native");
        self.adapter.call(selector, args, ret).inspect_err(|e| {
            tracing::debug!(%selector, "Native call failed: {e}");
        })?;
        Ok(ctx.returns())
    }
}
