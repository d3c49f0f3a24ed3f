use std::collections::HashMap;

use strand_types::Selector;

use crate::NativeError;
use crate::context::ReturnBuffer;
use crate::invoker::NativeAdapter;
use crate::value::NativeValue;

/// Typed view of one call, handed to a [`NativeHandler`].
pub struct NativeCall<'a> {
    selector: Selector,
    args: &'a [u64],
    ret: &'a mut ReturnBuffer,
}

impl NativeCall<'_> {
    #[must_use]
    pub fn selector(&self) -> Selector {
        self.selector
    }

    #[must_use]
    pub fn raw_args(&self) -> &[u64] {
        self.args
    }

    /// Read argument `T` starting at word `index`.
    pub fn arg<T: NativeValue>(&self, index: usize) -> Result<T, NativeError> {
        let words = index
            .checked_add(T::WORDS)
            .and_then(|end| self.args.get(index..end))
            .ok_or(NativeError::MissingArgument {
                selector: self.selector,
                index,
                provided: self.args.len(),
            })?;
        Ok(T::from_words(words))
    }

    pub fn set_return<T: NativeValue>(&mut self, value: T) {
        self.ret.write(value);
    }

    /// Shorthand for a handler-side failure.
    #[must_use]
    pub fn fail(&self, message: impl Into<String>) -> NativeError {
        NativeError::CallFailed {
            selector: self.selector,
            message: message.into(),
        }
    }
}

/// A host function reachable by selector.
pub trait NativeHandler {
    fn name(&self) -> &str;

    fn invoke(&self, call: &mut NativeCall<'_>) -> Result<(), NativeError>;
}

struct FnHandler<F> {
    name: String,
    f: F,
}

impl<F> NativeHandler for FnHandler<F>
where
    F: Fn(&mut NativeCall<'_>) -> Result<(), NativeError>,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn invoke(&self, call: &mut NativeCall<'_>) -> Result<(), NativeError> {
        (self.f)(call)
    }
}

/// Selector table backed by in-process handlers.
#[derive(Default)]
pub struct NativeRegistry {
    handlers: HashMap<Selector, Box<dyn NativeHandler>>,
}

impl NativeRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        selector: Selector,
        handler: Box<dyn NativeHandler>,
    ) -> Result<(), NativeError> {
        if self.handlers.contains_key(&selector) {
            return Err(NativeError::DuplicateNative {
                selector,
                name: handler.name().to_string(),
            });
        }
        tracing::debug!(%selector, name = handler.name(), "Registered native");
        self.handlers.insert(selector, handler);
        Ok(())
    }

    pub fn register_fn<F>(
        &mut self,
        selector: Selector,
        name: impl Into<String>,
        f: F,
    ) -> Result<(), NativeError>
    where
        F: Fn(&mut NativeCall<'_>) -> Result<(), NativeError> + 'static,
    {
        self.register(
            selector,
            Box::new(FnHandler {
                name: name.into(),
                f,
            }),
        )
    }

    pub fn lookup(&self, selector: Selector) -> Result<&dyn NativeHandler, NativeError> {
        self.handlers
            .get(&selector)
            .map(AsRef::as_ref)
            .ok_or(NativeError::UnknownNative { selector })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl NativeAdapter for NativeRegistry {
    fn call(
        &self,
        selector: Selector,
        args: &[u64],
        ret: &mut ReturnBuffer,
    ) -> Result<(), NativeError> {
        let handler = self.lookup(selector)?;
        let mut call = NativeCall {
            selector,
            args,
            ret,
        };
        handler.invoke(&mut call)
    }
}
