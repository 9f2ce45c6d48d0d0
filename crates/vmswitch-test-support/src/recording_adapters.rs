//! Recording [`ConsoleBackend`]/[`ConsoleFrontend`] doubles: every call is
//! appended to a shared, ordered log so a test can assert on the exact
//! sequence of console operations a focus transition produced (§8 S1/S2/S4).

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use vmswitch_core::{ConsoleBackend, ConsoleFrontend, LedSet};

/// One observed call into a recording adapter, in call order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Lock,
    Release,
    SetLeds(LedSet),
    PrepSwitch { leaving_host: bool },
    DomainSwitch { domain_id: i64, process_id: i64, slot_id: i64 },
}

#[derive(Debug, Default)]
pub struct RecordingConsoleBackend {
    pub calls: Arc<Mutex<Vec<Call>>>,
}

#[async_trait]
impl ConsoleBackend for RecordingConsoleBackend {
    async fn init(&self) {}

    async fn lock(&self) {
        self.calls.lock().unwrap().push(Call::Lock);
    }

    async fn release(&self) {
        self.calls.lock().unwrap().push(Call::Release);
    }

    async fn get_leds(&self) -> LedSet {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find_map(|c| match c {
                Call::SetLeds(leds) => Some(*leds),
                _ => None,
            })
            .unwrap_or_default()
    }

    async fn set_leds(&self, leds: LedSet) {
        self.calls.lock().unwrap().push(Call::SetLeds(leds));
    }

    async fn cleanup(&self) {}
}

#[derive(Debug, Default)]
pub struct RecordingConsoleFrontend {
    pub calls: Arc<Mutex<Vec<Call>>>,
}

#[async_trait]
impl ConsoleFrontend for RecordingConsoleFrontend {
    async fn init(&self) {}

    async fn prep_switch(&self, leaving_host: bool) {
        self.calls.lock().unwrap().push(Call::PrepSwitch { leaving_host });
    }

    async fn domain_switch(&self, domain_id: i64, process_id: i64, slot_id: i64) {
        self.calls.lock().unwrap().push(Call::DomainSwitch { domain_id, process_id, slot_id });
    }

    async fn cleanup(&self) {}
}
