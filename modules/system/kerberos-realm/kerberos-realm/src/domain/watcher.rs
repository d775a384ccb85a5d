//! File-change driven role mapping refresh.
//!
//! The watch is registered on the mapping file's parent directory, so
//! editors that replace the file atomically are still seen. Events for
//! other files in that directory are ignored.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use kerberos_realm_sdk::RefreshTrigger;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::error::DomainError;
use super::role_mapping::RoleMappingCache;

type WatchEvents = UnboundedReceiver<notify::Result<Event>>;

/// Rebuilds the role mapping whenever its file changes.
pub struct MappingFileWatcher {
    cache: Arc<RoleMappingCache>,
    path: PathBuf,
}

impl MappingFileWatcher {
    #[must_use]
    pub fn new(cache: Arc<RoleMappingCache>) -> Self {
        let path = cache.path().to_path_buf();
        Self { cache, path }
    }

    /// Watch until cancelled.
    ///
    /// A registration failure is logged and ends this loop only; scheduled
    /// refreshes keep running.
    pub async fn run(self, cancel: CancellationToken) {
        let (tx, rx) = unbounded_channel();
        let watcher = match self.register(tx) {
            Ok(watcher) => watcher,
            Err(e) => {
                warn!(error = %e, "mapping file watch unavailable, relying on scheduled refresh");
                return;
            }
        };
        info!(path = %self.path.display(), "watching role mapping file");
        self.run_with_events(rx, cancel).await;
        drop(watcher);
        info!("role mapping file watcher stopped");
    }

    fn register(
        &self,
        tx: UnboundedSender<notify::Result<Event>>,
    ) -> Result<RecommendedWatcher, DomainError> {
        let registration_failed = |e: notify::Error| DomainError::WatchRegistration {
            path: self.path.display().to_string(),
            reason: e.to_string(),
        };

        let mut watcher = notify::recommended_watcher(move |event: notify::Result<Event>| {
            if tx.send(event).is_err() {
                debug!("watch event dropped, watcher loop has ended");
            }
        })
        .map_err(registration_failed)?;
        watcher
            .watch(watch_dir(&self.path), RecursiveMode::NonRecursive)
            .map_err(registration_failed)?;
        Ok(watcher)
    }

    /// Consume watch events until cancelled or the event source closes.
    ///
    /// Cancellation also interrupts a rebuild in progress.
    pub async fn run_with_events(&self, mut events: WatchEvents, cancel: CancellationToken) {
        loop {
            let event = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                event = events.recv() => event,
            };
            match event {
                None => break,
                Some(Ok(event)) if self.is_mapping_change(&event) => {
                    debug!(kind = ?event.kind, "role mapping file changed");
                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => break,
                        () = self.cache.refresh(RefreshTrigger::FileChange) => {}
                    }
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => warn!(error = %e, "file watch error"),
            }
        }
    }

    fn is_mapping_change(&self, event: &Event) -> bool {
        let Some(target) = self.path.file_name() else {
            return false;
        };
        matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_))
            && event.paths.iter().any(|p| p.file_name() == Some(target))
    }
}

fn watch_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}
