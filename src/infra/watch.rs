//! Change notifications for the watched Markdown input.

use std::path::Path;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::infra::error::InfraError;

/// Filesystem watcher for a single input file.
///
/// The parent directory is watched so editors that save by renaming a
/// temporary file over the input are still noticed.
pub struct InputWatcher {
    _watcher: RecommendedWatcher,
    changes: mpsc::UnboundedReceiver<()>,
}

impl InputWatcher {
    pub fn new(input: &Path) -> Result<Self, InfraError> {
        let target = input.canonicalize()?;
        let directory = target.parent().unwrap_or(&target).to_path_buf();
        let (sender, changes) = mpsc::unbounded_channel();

        let filter_target = target.clone();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            match res {
                Ok(event) if is_input_change(&event, &filter_target) => {
                    // The receiver is gone once the watch loop has stopped.
                    let _ = sender.send(());
                }
                Ok(_) => {}
                Err(err) => warn!(target = "infra::watch", error = %err, "File watcher error"),
            }
        })?;
        watcher.watch(&directory, RecursiveMode::NonRecursive)?;

        debug!(
            target = "infra::watch",
            input = %target.display(),
            "Watching input"
        );

        Ok(Self {
            _watcher: watcher,
            changes,
        })
    }

    /// Wait for the next change to the input. Returns `None` once the
    /// underlying watcher has shut down.
    pub async fn changed(&mut self) -> Option<()> {
        self.changes.recv().await
    }
}

fn is_input_change(event: &Event, target: &Path) -> bool {
    matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_))
        && event.paths.iter().any(|path| path == target)
}
