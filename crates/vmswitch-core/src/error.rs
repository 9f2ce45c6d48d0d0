use std::path::PathBuf;

/// Failure modes of the attach sequence (§4.3). All are recovered locally —
/// a failed attach just means the candidate endpoint never joins the registry.
#[derive(Debug, thiserror::Error)]
pub enum AttachError {
    #[error("slot id in {0:?} is non-positive or unparsable")]
    InvalidSlot(PathBuf),
    #[error("connect to {path:?} failed after {attempts} attempts: {source}")]
    ConnectExhausted {
        path: PathBuf,
        attempts: u32,
        #[source]
        source: std::io::Error,
    },
    #[error("endpoint was detached before its request completed")]
    Closed,
    #[error("endpoint did not respond within the configured timeout")]
    Timeout,
}

/// Failures from the discovery pipeline (§4.5). A failed scan or watch
/// install is escalated to the caller; per-candidate attach failures are not.
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("reading socket directory {0:?}: {1}")]
    ScanDir(PathBuf, #[source] std::io::Error),
    #[error("installing filesystem watch on {0:?}: {1}")]
    Watch(PathBuf, #[source] notify::Error),
}

/// Registry-level protocol/structural violations (§7, §8).
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("focus transition target is null")]
    NoTransitionTarget,
    #[error("slot {0} is immortal and cannot be removed")]
    ImmortalSlot(i64),
}
