use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use strand_types::Timestamp;

/// Monotonic millisecond time source.
pub trait Clock {
    fn now(&self) -> Timestamp;
}

/// Wall clock measured from construction.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        let elapsed = u64::try_from(self.origin.elapsed().as_millis()).unwrap_or(u64::MAX);
        Timestamp::from_millis(elapsed)
    }
}

/// Hand-driven clock. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    ms: Rc<Cell<u64>>,
}

impl ManualClock {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, at: Timestamp) {
        self.ms.set(at.as_millis());
    }

    pub fn advance(&self, by: Duration) {
        let next = Timestamp::from_millis(self.ms.get()).saturating_add(by);
        self.ms.set(next.as_millis());
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_millis(self.ms.get())
    }
}
