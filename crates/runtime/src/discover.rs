use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use remote_core::{Registry, RemoteError, is_remote_id};

use crate::error::{DiscoverError, PluginError};
use crate::plugin::RemotePlugin;

/// Directory names never searched for remote modules.
pub const SKIPPED_DIRS: &[&str] = &["node_modules", ".git"];

/// Run one discovery pass over the plugin's root. `skip` lists extra
/// directories to leave out, such as the build output.
///
/// A pass that fails publishes nothing; the previous registry stays live.
pub fn discover(plugin: &RemotePlugin, skip: &[PathBuf]) -> Result<Arc<Registry>, DiscoverError> {
    let files = find_remote_modules(plugin.root(), skip)?;
    plugin.begin_pass();
    for path in files {
        if let Err(err) = observe_file(plugin, &path) {
            plugin.abort_pass();
            return Err(err.into());
        }
    }
    Ok(plugin.end_pass())
}

fn observe_file(plugin: &RemotePlugin, path: &Path) -> Result<(), PluginError> {
    let content = std::fs::read_to_string(path).map_err(|source| RemoteError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    plugin.observe(&path.to_string_lossy(), &content)?;
    Ok(())
}

/// Sorted paths of every remote module under `root`.
pub fn find_remote_modules(root: &Path, skip: &[PathBuf]) -> Result<Vec<PathBuf>, DiscoverError> {
    let scan_err = |source| DiscoverError::Scan {
        path: root.to_path_buf(),
        source,
    };

    let mut found = Vec::new();
    for entry in std::fs::read_dir(root).map_err(scan_err)? {
        let entry = entry.map_err(scan_err)?;
        let path = entry.path();
        if is_skipped(&path, root, skip) {
            continue;
        }
        if entry.file_type().map_err(scan_err)?.is_dir() {
            let pattern = format!(
                "{}/**/*.remote.*",
                glob::Pattern::escape(&path.to_string_lossy())
            );
            let hits = glob::glob(&pattern).map_err(|source| DiscoverError::Pattern {
                pattern: pattern.clone(),
                source,
            })?;
            for hit in hits {
                match hit {
                    Ok(hit)
                        if is_remote_id(&hit.to_string_lossy())
                            && !is_skipped(&hit, root, skip) =>
                    {
                        found.push(hit)
                    }
                    Ok(_) => {}
                    Err(err) => tracing::debug!("skipping unreadable path: {}", err),
                }
            }
        } else if is_remote_id(&path.to_string_lossy()) {
            found.push(path);
        }
    }
    found.sort();
    found.dedup();
    Ok(found)
}

fn is_skipped(path: &Path, root: &Path, skip: &[PathBuf]) -> bool {
    if skip.iter().any(|dir| path.starts_with(dir)) {
        return true;
    }
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .any(|component| match component {
            Component::Normal(name) => name
                .to_str()
                .is_some_and(|name| SKIPPED_DIRS.contains(&name)),
            _ => false,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(root: &Path, relative: &str, content: &str) {
        let path = root.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn finds_remote_modules_outside_skipped_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(root, "top.remote.ts", "");
        write(root, "src/api/echo.remote.ts", "");
        write(root, "src/api/echo.ts", "");
        write(root, "src/ws.remote.mjs", "");
        write(root, "node_modules/pkg/x.remote.js", "");
        write(root, "packages/a/node_modules/y.remote.ts", "");
        write(root, "functions/old.remote.js", "");

        let found = find_remote_modules(root, &[root.join("functions")]).unwrap();
        let relative: Vec<_> = found
            .iter()
            .map(|p| p.strip_prefix(root).unwrap().to_string_lossy().replace('\\', "/"))
            .collect();
        assert_eq!(
            relative,
            vec!["src/api/echo.remote.ts", "src/ws.remote.mjs", "top.remote.ts"]
        );
    }

    #[test]
    fn discover_publishes_a_registry() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "src/a.remote.ts", "export default fnWebSocket((ws) => {});");
        write(dir.path(), "src/b.remote.ts", "export default fn();");

        let plugin = RemotePlugin::dev(dir.path());
        let registry = discover(&plugin, &[]).unwrap();
        assert_eq!(registry.len(), 2);
        assert!(registry.get("src/a.remote.ts").unwrap().mode.is_websocket());
        assert_eq!(plugin.registry().snapshot().len(), 2);
    }

    #[test]
    fn removed_modules_disappear_on_the_next_pass() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.remote.ts", "");
        write(dir.path(), "b.remote.ts", "");
        let plugin = RemotePlugin::dev(dir.path());
        discover(&plugin, &[]).unwrap();

        std::fs::remove_file(dir.path().join("b.remote.ts")).unwrap();
        let registry = discover(&plugin, &[]).unwrap();
        assert_eq!(registry.len(), 1);
        assert!(registry.get("b.remote.ts").is_none());
    }
}
