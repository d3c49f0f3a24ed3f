use strand_config::HotkeyBindings;
use strand_types::{HostCommand, VirtualKey};

use crate::boundary::KeyState;

/// Edge-triggered key latch: fires once on the not-pressed to pressed transition.
#[derive(Debug, Clone, Copy)]
struct Latch {
    key: VirtualKey,
    command: HostCommand,
    held: bool,
}

impl Latch {
    fn poll(&mut self, keys: &dyn KeyState) -> Option<HostCommand> {
        let down = keys.is_down(self.key);
        let fired = down && !self.held;
        self.held = down;
        fired.then_some(self.command)
    }
}

/// The scheduler's control hotkeys.
#[derive(Debug, Clone)]
pub struct Hotkeys {
    latches: [Latch; 3],
}

impl Hotkeys {
    #[must_use]
    pub fn new(bindings: &HotkeyBindings) -> Self {
        let latch = |key, command| Latch {
            key,
            command,
            held: false,
        };
        Self {
            latches: [
                latch(bindings.remove_all, HostCommand::RemoveAll),
                latch(bindings.reload, HostCommand::Reset),
                latch(bindings.unload, HostCommand::RequestUnload),
            ],
        }
    }

    /// Commands whose key went down since the previous poll.
    pub fn poll(&mut self, keys: &dyn KeyState) -> Vec<HostCommand> {
        self.latches
            .iter_mut()
            .filter_map(|latch| latch.poll(keys))
            .collect()
    }
}
