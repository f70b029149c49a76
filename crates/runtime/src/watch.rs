use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{EventKind, RecursiveMode, Watcher};
use remote_core::is_remote_id;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;

use crate::discover::SKIPPED_DIRS;
use crate::session::DevSession;

const DEBOUNCE: Duration = Duration::from_millis(50);

/// Keeps a session's registry in step with the filesystem. Watching stops
/// when the handle is dropped.
pub struct WatchHandle {
    _watcher: notify::RecommendedWatcher,
    task: JoinHandle<()>,
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Watch the session root and rediscover whenever a remote module is
/// created, edited or removed.
pub fn watch(session: Arc<DevSession>) -> Result<WatchHandle, notify::Error> {
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel::<notify::Result<notify::Event>>();
    let mut watcher = notify::recommended_watcher(move |res| {
        let _ = tx.send(res);
    })?;
    watcher.watch(session.root(), RecursiveMode::Recursive)?;

    let task = tokio::spawn(rediscover_on_change(session, rx));
    Ok(WatchHandle {
        _watcher: watcher,
        task,
    })
}

async fn rediscover_on_change(
    session: Arc<DevSession>,
    mut rx: UnboundedReceiver<notify::Result<notify::Event>>,
) {
    while let Some(event) = rx.recv().await {
        let mut changed = Vec::new();
        collect(&session, event, &mut changed);
        if changed.is_empty() {
            continue;
        }

        // Editors save in bursts; fold everything queued into one pass.
        tokio::time::sleep(DEBOUNCE).await;
        while let Ok(event) = rx.try_recv() {
            collect(&session, event, &mut changed);
        }
        changed.sort();
        changed.dedup();

        let names: Vec<_> = changed
            .iter()
            .map(|path| display_relative(session.root(), path))
            .collect();
        stdio::log("watch", &format!("changed {}", names.join(", ")));
        match session.rediscover().await {
            Ok(registry) => tracing::debug!("registry now holds {} module(s)", registry.len()),
            Err(err) => tracing::warn!("rediscovery failed: {}", err),
        }
    }
}

fn collect(session: &DevSession, event: notify::Result<notify::Event>, changed: &mut Vec<PathBuf>) {
    match event {
        Ok(event) => {
            let (root, skip) = (session.root(), session.skipped_dirs());
            changed.extend(
                event
                    .paths
                    .into_iter()
                    .filter(|path| is_relevant(&event.kind, path, root, skip)),
            )
        }
        Err(err) => tracing::warn!("watch error: {}", err),
    }
}

/// Whether an event on `path` can change the set of remote modules.
/// Removing or renaming a directory may take modules with it, so those
/// count even when the path itself is not a remote module.
fn is_relevant(kind: &EventKind, path: &Path, root: &Path, skip: &[PathBuf]) -> bool {
    if matches!(kind, EventKind::Access(_)) {
        return false;
    }
    if skip.iter().any(|dir| path.starts_with(dir)) {
        return false;
    }
    let relative = path.strip_prefix(root).unwrap_or(path);
    let in_skipped_dir = relative.components().any(|component| {
        component
            .as_os_str()
            .to_str()
            .is_some_and(|name| SKIPPED_DIRS.contains(&name))
    });
    if in_skipped_dir {
        return false;
    }
    is_remote_id(&path.to_string_lossy())
        || matches!(
            kind,
            EventKind::Remove(_) | EventKind::Modify(notify::event::ModifyKind::Name(_))
        )
}

fn display_relative(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}
