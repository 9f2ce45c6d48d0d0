//! Library surface for the `vmswitch` binary: config resolution and adapter
//! construction, kept out of `main.rs` so it can be exercised by tests
//! without spawning a process (matches the teacher's `server::build_router`
//! split between binary and library crate).

pub mod config;

use std::sync::Arc;

use vmswitch_core::{Adapters, NullConsoleBackend, NullConsoleFrontend, NullInputBackend};

use config::AdapterChoice;

/// Build the adapter trio a resolved config selects. `null` is the only
/// choice this repo ships (§4.6); a downstream integrator extends
/// `AdapterChoice` and this match arm together.
pub fn build_adapters(
    console_backend: AdapterChoice,
    console_frontend: AdapterChoice,
    input_backend: AdapterChoice,
) -> Adapters {
    let console_backend = match console_backend {
        AdapterChoice::Null => Arc::new(NullConsoleBackend) as Arc<dyn vmswitch_core::ConsoleBackend>,
    };
    let console_frontend = match console_frontend {
        AdapterChoice::Null => Arc::new(NullConsoleFrontend) as Arc<dyn vmswitch_core::ConsoleFrontend>,
    };
    let input_backend = match input_backend {
        AdapterChoice::Null => Arc::new(NullInputBackend) as Arc<dyn vmswitch_core::InputBackend>,
    };
    Adapters { console_backend, console_frontend, input_backend }
}
