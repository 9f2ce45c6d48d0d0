//! Discovery (§4.5): the initial directory scan plus the filesystem-watch
//! stream that attaches/detaches clients as their sockets come and go.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::endpoint::{self, EndpointContext};
use crate::error::DiscoveryError;
use crate::registry::Registry;

/// `true` for anything that looks like `slot-<N>` and isn't a directory.
/// Candidates with an unparsable or non-positive `N` are still handed to
/// `attach`, which rejects them there (§4.3 step 1) so the rejection is
/// logged uniformly regardless of discovery source.
fn is_slot_candidate(path: &Path) -> bool {
    let is_dir = path.is_dir();
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with("slot-"))
        && !is_dir
}

/// Run the initial scan of `qmp_dir` and install a filesystem watch that
/// spawns an attach task for every subsequent `slot-<N>` creation for the
/// process lifetime (§4.5). Returns once the scan and watch are both
/// installed; attaches and the watch loop continue as background tasks.
pub async fn start(
    qmp_dir: PathBuf,
    registry: Registry,
    context: Arc<EndpointContext>,
) -> Result<(), DiscoveryError> {
    scan(&qmp_dir, &registry, &context).await?;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut watcher: RecommendedWatcher =
        notify::recommended_watcher(move |event: notify::Result<notify::Event>| {
            let _ = tx.send(event);
        })
        .map_err(|e| DiscoveryError::Watch(qmp_dir.clone(), e))?;
    watcher
        .watch(&qmp_dir, RecursiveMode::NonRecursive)
        .map_err(|e| DiscoveryError::Watch(qmp_dir.clone(), e))?;

    tokio::spawn(async move {
        // Keep the watcher alive for the lifetime of this task; dropping it
        // would stop delivery.
        let _watcher = watcher;
        while let Some(event) = rx.recv().await {
            match event {
                Ok(event) => handle_watch_event(event, &registry, &context),
                Err(e) => tracing::warn!(error = %e, "filesystem watch error"),
            }
        }
        tracing::debug!("discovery watch loop exiting");
    });

    Ok(())
}

async fn scan(
    qmp_dir: &Path,
    registry: &Registry,
    context: &Arc<EndpointContext>,
) -> Result<(), DiscoveryError> {
    let mut entries = tokio::fs::read_dir(qmp_dir)
        .await
        .map_err(|e| DiscoveryError::ScanDir(qmp_dir.to_path_buf(), e))?;

    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| DiscoveryError::ScanDir(qmp_dir.to_path_buf(), e))?
    {
        let path = entry.path();
        if is_slot_candidate(&path) {
            spawn_attach(path, registry.clone(), context.clone());
        }
    }
    Ok(())
}

/// Create events spawn an attach; delete events require no action — the
/// affected endpoint's own reader observes EOF/error and self-detaches
/// (§4.5). A create batch may name several paths at once; each is checked
/// independently.
fn handle_watch_event(event: notify::Event, registry: &Registry, context: &Arc<EndpointContext>) {
    if !matches!(event.kind, notify::EventKind::Create(_)) {
        return;
    }
    for path in event.paths {
        if is_slot_candidate(&path) {
            spawn_attach(path, registry.clone(), context.clone());
        }
    }
}

/// Each attach runs as its own task so that one candidate's connect-retry
/// delay never blocks another's (§4.5: "each attach runs concurrently").
fn spawn_attach(path: PathBuf, registry: Registry, context: Arc<EndpointContext>) {
    tokio::spawn(async move {
        if let Err(e) = endpoint::attach(path.clone(), registry, context).await {
            tracing::warn!(?path, error = %e, "attach failed, discarding candidate");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_prefixed_file_is_a_candidate() {
        assert!(is_slot_candidate(Path::new("/var/run/qips/slot-3")));
    }

    #[test]
    fn non_slot_names_are_not_candidates() {
        assert!(!is_slot_candidate(Path::new("/var/run/qips/other")));
    }
}
