//! The core of `vmswitch`: client endpoints, the focus ring, discovery, the
//! input pipeline, and the startup/teardown lifecycle that wires them to a
//! set of external adapters (§4 of the design).

pub mod adapters;
pub mod discovery;
pub mod endpoint;
pub mod error;
pub mod input;
pub mod lifecycle;
pub mod registry;

pub use adapters::{ConsoleBackend, ConsoleFrontend, InputBackend, NullConsoleBackend, NullConsoleFrontend, NullInputBackend};
pub use endpoint::{EndpointCache, EndpointContext, LedSet};
pub use input::InputPipeline;
pub use lifecycle::{Adapters, Runtime, RuntimeConfig};
pub use registry::{FocusCell, Registry};
