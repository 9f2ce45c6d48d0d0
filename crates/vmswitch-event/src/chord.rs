use crate::event::KeyState;

const LEFT_CTRL: usize = 0x1D;
const LEFT_ALT: usize = 0x38;
const RIGHT_ARROW: usize = 0xCD;
const LEFT_ARROW: usize = 0xCB;

/// Which way a fired chord advances focus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusDirection {
    Next,
    Previous,
}

/// A chord's state between "not all keys held" and "held, already fired."
/// Collapsed from the textbook `{Idle, Partial, Armed, Fired}` shape to two
/// states: arming and firing happen on the same event (all three keys
/// becoming held is itself the trigger), so there is no tick where a chord
/// sits "armed" without having already fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChordState {
    Idle,
    Fired,
}

/// Tracks a 256-scancode key-down map and detects the two focus-cycling
/// chords (left-ctrl + left-alt + left/right-arrow).
pub struct ChordDetector {
    key_down: [bool; 256],
    next_chord: ChordState,
    previous_chord: ChordState,
}

impl Default for ChordDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl ChordDetector {
    pub fn new() -> Self {
        Self {
            key_down: [false; 256],
            next_chord: ChordState::Idle,
            previous_chord: ChordState::Idle,
        }
    }

    /// Returns true if `scancode` is currently tracked as held.
    pub fn is_held(&self, scancode: i32) -> bool {
        usize::try_from(scancode)
            .ok()
            .filter(|&i| i < self.key_down.len())
            .is_some_and(|i| self.key_down[i])
    }

    /// Feed one key event. Returns `Some(direction)` exactly when this event
    /// completes a chord that had not already fired while held — the caller
    /// must not forward the triggering key event to the focused guest in
    /// that case. Out-of-range scancodes are rejected with `None` (dropped
    /// per the "invalid hotkey state" disposition); the caller logs this.
    pub fn on_key(&mut self, scancode: i32, state: KeyState) -> Option<FocusDirection> {
        let idx = usize::try_from(scancode).ok().filter(|&i| i < self.key_down.len())?;
        let pressed = matches!(state, KeyState::Pressed | KeyState::Repeat);

        // The map reflects this event before chord evaluation on both press
        // and release: a release must disarm a fired chord (Fired -> Idle)
        // at the moment it happens, or the chord can never retrigger.
        self.key_down[idx] = pressed;

        let ctrl = self.key_down[LEFT_CTRL];
        let alt = self.key_down[LEFT_ALT];
        let next_held = ctrl && alt && self.key_down[RIGHT_ARROW];
        let previous_held = ctrl && alt && self.key_down[LEFT_ARROW];

        let next_fired = Self::advance(&mut self.next_chord, next_held);
        let previous_fired = Self::advance(&mut self.previous_chord, previous_held);

        match (next_fired, previous_fired) {
            (true, _) => Some(FocusDirection::Next),
            (_, true) => Some(FocusDirection::Previous),
            _ => None,
        }
    }

    /// Advance one direction's chord state given whether its three keys are
    /// currently all held. Returns `true` exactly on the Idle->Fired edge.
    fn advance(chord: &mut ChordState, all_held: bool) -> bool {
        match (*chord, all_held) {
            (ChordState::Idle, true) => {
                *chord = ChordState::Fired;
                true
            }
            (ChordState::Fired, false) => {
                *chord = ChordState::Idle;
                false
            }
            _ => false,
        }
    }
}
