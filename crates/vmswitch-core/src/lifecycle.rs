//! Startup ordering and teardown (§4.7/§5/§7 "Termination signal"): wires
//! adapters, registry, discovery, and the input pipeline together, and
//! tears them down in the mirror order on shutdown.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::adapters::{ConsoleBackend, ConsoleFrontend, InputBackend};
use crate::endpoint::EndpointContext;
use crate::error::DiscoveryError;
use crate::input::InputPipeline;
use crate::registry::Registry;

/// The three capability adapters a concrete deployment supplies (§4.6).
/// Absence of any of the three is a fatal startup error at the CLI layer,
/// not something this crate can default away (§6).
pub struct Adapters {
    pub console_backend: Arc<dyn ConsoleBackend>,
    pub console_frontend: Arc<dyn ConsoleFrontend>,
    pub input_backend: Arc<dyn InputBackend>,
}

/// The handful of values a deployment chooses at startup (§6, §9 open
/// question 3).
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub qmp_dir: PathBuf,
    pub response_timeout: Option<Duration>,
}

/// The fully wired-up core: registry, input pipeline, and a handle back to
/// the adapters for teardown. Constructing one performs the full startup
/// sequence (§4.7); call [`Runtime::shutdown`] once, on receipt of a
/// termination signal.
pub struct Runtime {
    pub registry: Registry,
    pub input: Arc<InputPipeline>,
    adapters: Adapters,
}

impl Runtime {
    /// Startup ordering (§4.7): initialize adapters, seed the immortal host
    /// client, then start discovery (initial scan + filesystem watch).
    /// Returns once discovery's initial scan and watch install both
    /// complete; attaches continue as background tasks.
    pub async fn start(config: RuntimeConfig, adapters: Adapters) -> Result<Self, DiscoveryError> {
        adapters.console_backend.init().await;
        adapters.console_frontend.init().await;
        adapters.input_backend.init().await;

        let registry = Registry::new(adapters.console_backend.clone(), adapters.console_frontend.clone());
        let context = Arc::new(EndpointContext::new(
            registry.focus_cell(),
            adapters.console_backend.clone(),
            config.response_timeout,
        ));

        crate::discovery::start(config.qmp_dir.clone(), registry.clone(), context).await?;

        let input = Arc::new(InputPipeline::new(registry.clone()));

        tracing::info!(qmp_dir = ?config.qmp_dir, "vmswitch runtime started");
        Ok(Self { registry, input, adapters })
    }

    /// Orderly teardown (§5): release the console, close every guest
    /// socket, then let each adapter clean up.
    pub async fn shutdown(&self) {
        tracing::info!("vmswitch runtime shutting down");
        self.adapters.console_backend.release().await;
        self.registry.close_all().await;
        self.adapters.console_backend.cleanup().await;
        self.adapters.console_frontend.cleanup().await;
        self.adapters.input_backend.cleanup().await;
    }
}
