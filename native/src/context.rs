use strand_types::Selector;

use crate::NativeError;
use crate::value::NativeValue;

/// Maximum argument words per native call.
pub const MAX_ARGS: usize = 32;

/// Words in the return buffer; wide enough for the largest return value (a padded vector).
pub const RETURN_WORDS: usize = 3;

/// Raw result of the last native call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReturnBuffer {
    words: [u64; RETURN_WORDS],
}

impl ReturnBuffer {
    pub fn clear(&mut self) {
        self.words = [0; RETURN_WORDS];
    }

    #[must_use]
    pub fn words(&self) -> &[u64; RETURN_WORDS] {
        &self.words
    }

    pub fn words_mut(&mut self) -> &mut [u64; RETURN_WORDS] {
        &mut self.words
    }

    /// Reinterpret the raw words as `T`.
    #[must_use]
    pub fn read<T: NativeValue>(&self) -> T {
        const { assert!(T::WORDS <= RETURN_WORDS) };
        T::from_words(&self.words[..T::WORDS])
    }

    /// Store `value` as the call's result. Words past the value are zeroed.
    pub fn write<T: NativeValue>(&mut self, value: T) {
        const { assert!(T::WORDS <= RETURN_WORDS) };
        self.clear();
        value.to_words(&mut self.words[..T::WORDS]);
    }

    /// Pointer to the first word, for callers on the far side of the C ABI.
    #[must_use]
    pub fn as_ptr(&self) -> *const u64 {
        self.words.as_ptr()
    }
}

/// Argument words for one logical native invocation.
///
/// Lifecycle: [`reset`](Self::reset) with the target selector, push arguments in
/// order, hand to [`NativeInvoker::invoke`](crate::NativeInvoker::invoke). The
/// result stays readable until the next invocation overwrites it.
#[derive(Debug, Default)]
pub struct CallContext {
    selector: Option<Selector>,
    args: Vec<u64>,
    returns: ReturnBuffer,
}

impl CallContext {
    #[must_use]
    pub fn new() -> Self {
        Self {
            selector: None,
            args: Vec::with_capacity(MAX_ARGS),
            returns: ReturnBuffer::default(),
        }
    }

    /// Start a new invocation: set the target and drop previous arguments.
    pub fn reset(&mut self, selector: Selector) {
        self.selector = Some(selector);
        self.args.clear();
    }

    #[must_use]
    pub fn selector(&self) -> Option<Selector> {
        self.selector
    }

    #[must_use]
    pub fn args(&self) -> &[u64] {
        &self.args
    }

    #[must_use]
    pub fn returns(&self) -> &ReturnBuffer {
        &self.returns
    }

    pub(crate) fn split_for_call(&mut self) -> (&[u64], &mut ReturnBuffer) {
        (&self.args, &mut self.returns)
    }

    /// Append one raw argument word.
    pub fn push(&mut self, word: u64) -> Result<(), NativeError> {
        self.ensure_room(1)?;
        self.args.push(word);
        Ok(())
    }

    /// Append a typed argument, which may span several words.
    pub fn push_value<T: NativeValue>(&mut self, value: T) -> Result<(), NativeError> {
        self.ensure_room(T::WORDS)?;
        let start = self.args.len();
        self.args.resize(start + T::WORDS, 0);
        value.to_words(&mut self.args[start..]);
        Ok(())
    }

    fn ensure_room(&self, words: usize) -> Result<(), NativeError> {
        let selector = self.selector.ok_or(NativeError::SelectorUnset)?;
        if self.args.len() + words > MAX_ARGS {
            return Err(NativeError::ArgumentOverflow {
                selector,
                capacity: MAX_ARGS,
            });
        }
        Ok(())
    }
}
