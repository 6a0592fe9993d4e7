//! Config file change detection.

use std::ffi::OsString;
use std::path::Path;

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::error::{AgentError, AgentResult};

/// Watch the config file for changes.
///
/// The parent directory is watched rather than the file itself, because
/// editors and config management tools typically replace the file instead
/// of writing it in place. The returned watcher must be kept alive.
pub fn watch_config(path: &Path) -> AgentResult<(RecommendedWatcher, mpsc::Receiver<()>)> {
    let (tx, rx) = mpsc::channel(1);
    let file_name = path.file_name().map(OsString::from);

    let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        let Ok(event) = res else { return };
        if !(event.kind.is_modify() || event.kind.is_create() || event.kind.is_remove()) {
            return;
        }
        let relevant = file_name.as_ref().map_or(true, |name| {
            event.paths.iter().any(|p| p.file_name() == Some(name))
        });
        if relevant {
            // A full channel already carries a pending reload.
            let _ = tx.try_send(());
        }
    })
    .map_err(|e| AgentError::Watch {
        reason: e.to_string(),
    })?;

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    watcher
        .watch(dir, RecursiveMode::NonRecursive)
        .map_err(|e| AgentError::Watch {
            reason: e.to_string(),
        })?;

    Ok((watcher, rx))
}
