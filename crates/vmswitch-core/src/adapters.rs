//! Capability interfaces the core depends on (§4.6). Concrete hardware
//! adapters — a real Linux VT seizure, an X11/Xen display switcher, an
//! evdev input reader — live outside this crate; each trait here is the
//! whole surface a downstream integrator needs to implement.

use async_trait::async_trait;

use crate::endpoint::LedSet;

/// Owns the physical console: keyboard grab/release and LED state.
///
/// `lock` must suppress host input processing; `release` restores it. Both
/// are invoked only from inside a focus transition, which already holds the
/// registry lock for its duration (§5), so implementations do not need their
/// own internal synchronization against concurrent transitions.
#[async_trait]
pub trait ConsoleBackend: Send + Sync {
    async fn init(&self);
    async fn lock(&self);
    async fn release(&self);
    async fn get_leds(&self) -> LedSet;
    async fn set_leds(&self, leds: LedSet);
    async fn cleanup(&self);
}

/// Brings a guest's display forward. `domain_switch` must be idempotent for
/// repeated identical targets (§8 property 10).
#[async_trait]
pub trait ConsoleFrontend: Send + Sync {
    async fn init(&self);
    async fn prep_switch(&self, leaving_host: bool);
    async fn domain_switch(&self, domain_id: i64, process_id: i64, slot_id: i64);
    async fn cleanup(&self);
}

/// Enumerates and decodes physical input devices into the canonical event
/// model. The core does not call into this trait's event-producing side —
/// a concrete backend pushes events by calling `on_key`/`on_rel_mouse`/
/// `on_abs_mouse` on the input pipeline (`crate::input::InputPipeline`)
/// directly, typically from its own device-bound task.
#[async_trait]
pub trait InputBackend: Send + Sync {
    async fn init(&self);
    async fn cleanup(&self);
}

/// Logs and otherwise no-ops. Ships so the binary and test suite have a
/// deterministic console backend without a real terminal or framebuffer.
#[derive(Debug, Default)]
pub struct NullConsoleBackend;

#[async_trait]
impl ConsoleBackend for NullConsoleBackend {
    async fn init(&self) {
        tracing::info!("null console backend initialized");
    }

    async fn lock(&self) {
        tracing::debug!("null console backend: lock");
    }

    async fn release(&self) {
        tracing::debug!("null console backend: release");
    }

    async fn get_leds(&self) -> LedSet {
        LedSet::default()
    }

    async fn set_leds(&self, leds: LedSet) {
        tracing::debug!(?leds, "null console backend: set_leds");
    }

    async fn cleanup(&self) {
        tracing::info!("null console backend cleanup");
    }
}

#[derive(Debug, Default)]
pub struct NullConsoleFrontend;

#[async_trait]
impl ConsoleFrontend for NullConsoleFrontend {
    async fn init(&self) {
        tracing::info!("null console frontend initialized");
    }

    async fn prep_switch(&self, leaving_host: bool) {
        tracing::debug!(leaving_host, "null console frontend: prep_switch");
    }

    async fn domain_switch(&self, domain_id: i64, process_id: i64, slot_id: i64) {
        tracing::debug!(domain_id, process_id, slot_id, "null console frontend: domain_switch");
    }

    async fn cleanup(&self) {
        tracing::info!("null console frontend cleanup");
    }
}

/// Never produces events on its own; tests and `cargo run` drive the input
/// pipeline by calling its entry points directly.
#[derive(Debug, Default)]
pub struct NullInputBackend;

#[async_trait]
impl InputBackend for NullInputBackend {
    async fn init(&self) {
        tracing::info!("null input backend initialized (no device bound)");
    }

    async fn cleanup(&self) {
        tracing::info!("null input backend cleanup");
    }
}
