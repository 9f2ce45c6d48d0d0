//! Input pipeline (§4.2, §4.6): fans canonical events from an
//! [`InputBackend`](crate::adapters::InputBackend) into the focused
//! endpoint's outbound queue, intercepting hotkey chords along the way.

use tokio::sync::Mutex;

use vmswitch_event::{ChordDetector, Event, KeyState, MouseButtons as CoreMouseButtons};
use vmswitch_protocol::{Command, MouseButtons as WireMouseButtons};

use crate::registry::Registry;

fn convert_buttons(buttons: CoreMouseButtons) -> WireMouseButtons {
    WireMouseButtons { left: buttons.left, middle: buttons.middle, right: buttons.right }
}

/// The entry points a concrete [`InputBackend`](crate::adapters::InputBackend)
/// calls into as it decodes raw device data (§4.6).
pub struct InputPipeline {
    chord: Mutex<ChordDetector>,
    registry: Registry,
}

impl InputPipeline {
    pub fn new(registry: Registry) -> Self {
        Self { chord: Mutex::new(ChordDetector::new()), registry }
    }

    /// Feed one normalized event into the pipeline. A chord-triggering key
    /// event is consumed here and never forwarded (§4.2).
    pub async fn dispatch(&self, event: Event) {
        match event {
            Event::Key { scancode, state, .. } => self.on_key(scancode, state).await,
            Event::RelMotion { dx, dy, dz, buttons, .. } => {
                self.forward(Command::SendMouseRel { dx, dy, dz, buttons: convert_buttons(buttons) })
                    .await;
            }
            Event::AbsMotion { x, y, z, buttons, .. } => {
                self.forward(Command::SendMouseAbs { x, y, z, buttons: convert_buttons(buttons) })
                    .await;
            }
            Event::LedHint { .. } => {}
        }
    }

    async fn on_key(&self, scancode: i32, state: KeyState) {
        if !(0..256).contains(&scancode) {
            tracing::warn!(scancode, "invalid hotkey state: scancode out of range, dropping");
            return;
        }

        let direction = self.chord.lock().await.on_key(scancode, state);
        if let Some(direction) = direction {
            // The triggering key event is swallowed; the chord itself is
            // the action.
            self.registry.focus_advance(direction).await;
            return;
        }

        let released = matches!(state, KeyState::Released);
        self.forward(Command::SendKeycode { keycode: scancode, released }).await;
    }

    async fn forward(&self, command: Command) {
        let handle = self.registry.focused_handle().await;
        if let Err(e) = handle.enqueue(command) {
            tracing::debug!(error = %e, "dropped input event: focused endpoint unavailable");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{NullConsoleBackend, NullConsoleFrontend};
    use std::sync::Arc;

    fn new_pipeline() -> InputPipeline {
        let registry = Registry::new(Arc::new(NullConsoleBackend), Arc::new(NullConsoleFrontend));
        InputPipeline::new(registry)
    }

    #[tokio::test]
    async fn out_of_range_scancode_is_dropped_without_panicking() {
        let pipeline = new_pipeline();
        pipeline.dispatch(Event::Key { timestamp: 0, scancode: 9000, state: KeyState::Pressed }).await;
    }

    #[tokio::test]
    async fn ordinary_key_forwards_to_the_host_as_a_noop() {
        // With no guest attached, focus stays on the host; forwarding to the
        // host is a documented no-op (`enqueue` short-circuits).
        let pipeline = new_pipeline();
        pipeline.dispatch(Event::Key { timestamp: 0, scancode: 0x1E, state: KeyState::Pressed }).await;
    }

    #[tokio::test]
    async fn full_chord_does_not_forward_the_triggering_key() {
        let pipeline = new_pipeline();
        pipeline.dispatch(Event::Key { timestamp: 0, scancode: 0x1D, state: KeyState::Pressed }).await;
        pipeline.dispatch(Event::Key { timestamp: 0, scancode: 0x38, state: KeyState::Pressed }).await;
        // Single-member registry: firing the chord is a no-op focus advance,
        // but must not panic or forward the arrow key as a keystroke.
        pipeline.dispatch(Event::Key { timestamp: 0, scancode: 0xCD, state: KeyState::Pressed }).await;
    }
}
