/// Press/release/repeat state of a key event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyState {
    Pressed,
    Released,
    Repeat,
}

/// Mouse button state accompanying a motion event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MouseButtons {
    pub left: bool,
    pub middle: bool,
    pub right: bool,
}

/// A canonical input event, normalized from whatever a concrete
/// [`InputBackend`](vmswitch input backend trait) decodes raw device data into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Key {
        timestamp: u64,
        scancode: i32,
        state: KeyState,
    },
    RelMotion {
        timestamp: u64,
        dx: i32,
        dy: i32,
        dz: i32,
        buttons: MouseButtons,
    },
    AbsMotion {
        timestamp: u64,
        x: i32,
        y: i32,
        z: i32,
        buttons: MouseButtons,
    },
    LedHint {
        timestamp: u64,
    },
}

impl Event {
    pub fn timestamp(&self) -> u64 {
        match self {
            Event::Key { timestamp, .. }
            | Event::RelMotion { timestamp, .. }
            | Event::AbsMotion { timestamp, .. }
            | Event::LedHint { timestamp } => *timestamp,
        }
    }
}
