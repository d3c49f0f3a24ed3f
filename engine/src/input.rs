//! Window-message fan-out to extension input handlers.
//!
//! The host's window procedure forwards every message here. Raw messages go
//! to message handlers; keyboard messages are also decoded into a [`KeyEvent`]
//! for keyboard handlers. Messages may arrive on a thread other than the frame
//! thread, so state lives behind a mutex.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

use strand_types::VirtualKey;

use crate::boundary::KeyState;

pub const WM_KEYDOWN: u32 = 0x0100;
pub const WM_KEYUP: u32 = 0x0101;
pub const WM_SYSKEYDOWN: u32 = 0x0104;
pub const WM_SYSKEYUP: u32 = 0x0105;

/// Extension keyboard callback: key, repeats, scan code, extended, with alt,
/// was down before, is up now.
pub type KeyboardHandler = extern "C" fn(u32, u16, u8, bool, bool, bool, bool);

/// Extension raw window-message callback: message, wparam, lparam.
pub type MessageHandler = extern "C" fn(u32, usize, isize);

/// One decoded keyboard message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub key: VirtualKey,
    pub repeats: u16,
    pub scan_code: u8,
    pub extended: bool,
    pub with_alt: bool,
    pub was_down_before: bool,
    pub is_up_now: bool,
}

impl KeyEvent {
    /// Decode a key message. `None` for anything that is not a key message.
    #[must_use]
    pub fn decode(message: u32, wparam: usize, lparam: isize) -> Option<Self> {
        let is_sys = matches!(message, WM_SYSKEYDOWN | WM_SYSKEYUP);
        let is_up = matches!(message, WM_KEYUP | WM_SYSKEYUP);
        if !matches!(message, WM_KEYDOWN | WM_KEYUP | WM_SYSKEYDOWN | WM_SYSKEYUP) {
            return None;
        }
        let bits = lparam as u64;
        Some(Self {
            key: VirtualKey::new((wparam & 0xFFFF_FFFF) as u32),
            repeats: (bits & 0xFFFF) as u16,
            scan_code: ((bits >> 16) & 0xFF) as u8,
            extended: (bits >> 24) & 1 == 1,
            with_alt: is_sys,
            was_down_before: (bits >> 30) & 1 == 1,
            is_up_now: is_up,
        })
    }
}

#[derive(Default)]
struct DispatchState {
    keyboard: Vec<KeyboardHandler>,
    messages: Vec<MessageHandler>,
    down: HashSet<VirtualKey>,
}

/// Registered input handlers plus the key-down set derived from messages.
#[derive(Default)]
pub struct KeyboardDispatcher {
    state: Mutex<DispatchState>,
}

impl KeyboardDispatcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, DispatchState> {
        // Handlers run outside the lock, so a poisoned state is still consistent.
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    pub fn register_keyboard_handler(&self, handler: KeyboardHandler) {
        let mut state = self.lock();
        if !state.keyboard.iter().any(|h| std::ptr::fn_addr_eq(*h, handler)) {
            state.keyboard.push(handler);
        }
    }

    pub fn unregister_keyboard_handler(&self, handler: KeyboardHandler) {
        self.lock()
            .keyboard
            .retain(|h| !std::ptr::fn_addr_eq(*h, handler));
    }

    pub fn register_message_handler(&self, handler: MessageHandler) {
        let mut state = self.lock();
        if !state.messages.iter().any(|h| std::ptr::fn_addr_eq(*h, handler)) {
            state.messages.push(handler);
        }
    }

    pub fn unregister_message_handler(&self, handler: MessageHandler) {
        self.lock()
            .messages
            .retain(|h| !std::ptr::fn_addr_eq(*h, handler));
    }

    /// Forward one window message to every registered handler.
    pub fn dispatch(&self, message: u32, wparam: usize, lparam: isize) {
        let event = KeyEvent::decode(message, wparam, lparam);
        let (messages, keyboard) = {
            let mut state = self.lock();
            if let Some(event) = event {
                if event.is_up_now {
                    state.down.remove(&event.key);
                } else {
                    state.down.insert(event.key);
                }
            }
            (state.messages.clone(), state.keyboard.clone())
        };

        for handler in messages {
            handler(message, wparam, lparam);
        }
        if let Some(e) = event {
            for handler in keyboard {
                handler(
                    e.key.code(),
                    e.repeats,
                    e.scan_code,
                    e.extended,
                    e.with_alt,
                    e.was_down_before,
                    e.is_up_now,
                );
            }
        }
    }
}

impl KeyState for KeyboardDispatcher {
    fn is_down(&self, key: VirtualKey) -> bool {
        self.lock().down.contains(&key)
    }
}
