//! Typed views over raw 64-bit argument and return words.
//!
//! Values occupy the low bytes of their word and the rest is zero, which is how
//! the host reads a `T` out of an 8-byte slot. Booleans travel as 32-bit ints.

use strand_types::Vector3;

/// A value that can be written to and read from consecutive 64-bit words.
pub trait NativeValue: Copy {
    /// Number of 64-bit words the value occupies.
    const WORDS: usize;

    /// Write into `out[..Self::WORDS]`.
    fn to_words(self, out: &mut [u64]);

    /// Read from `words[..Self::WORDS]`.
    fn from_words(words: &[u64]) -> Self;
}

fn low32(word: u64) -> u32 {
    (word & 0xFFFF_FFFF) as u32
}

impl NativeValue for u64 {
    const WORDS: usize = 1;

    fn to_words(self, out: &mut [u64]) {
        out[0] = self;
    }

    fn from_words(words: &[u64]) -> Self {
        words[0]
    }
}

impl NativeValue for i64 {
    const WORDS: usize = 1;

    fn to_words(self, out: &mut [u64]) {
        out[0] = self as u64;
    }

    fn from_words(words: &[u64]) -> Self {
        words[0] as i64
    }
}

impl NativeValue for u32 {
    const WORDS: usize = 1;

    fn to_words(self, out: &mut [u64]) {
        out[0] = u64::from(self);
    }

    fn from_words(words: &[u64]) -> Self {
        low32(words[0])
    }
}

impl NativeValue for i32 {
    const WORDS: usize = 1;

    fn to_words(self, out: &mut [u64]) {
        out[0] = u64::from(self as u32);
    }

    fn from_words(words: &[u64]) -> Self {
        low32(words[0]) as i32
    }
}

impl NativeValue for f32 {
    const WORDS: usize = 1;

    fn to_words(self, out: &mut [u64]) {
        out[0] = u64::from(self.to_bits());
    }

    fn from_words(words: &[u64]) -> Self {
        f32::from_bits(low32(words[0]))
    }
}

impl NativeValue for bool {
    const WORDS: usize = 1;

    fn to_words(self, out: &mut [u64]) {
        out[0] = u64::from(self);
    }

    fn from_words(words: &[u64]) -> Self {
        low32(words[0]) != 0
    }
}

impl NativeValue for usize {
    const WORDS: usize = 1;

    fn to_words(self, out: &mut [u64]) {
        out[0] = self as u64;
    }

    fn from_words(words: &[u64]) -> Self {
        words[0] as usize
    }
}

impl NativeValue for Vector3 {
    const WORDS: usize = 3;

    fn to_words(self, out: &mut [u64]) {
        self.x.to_words(&mut out[0..1]);
        self.y.to_words(&mut out[1..2]);
        self.z.to_words(&mut out[2..3]);
    }

    fn from_words(words: &[u64]) -> Self {
        Vector3::new(
            f32::from_words(&words[0..1]),
            f32::from_words(&words[1..2]),
            f32::from_words(&words[2..3]),
        )
    }
}
