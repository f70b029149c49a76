use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use bundler::{BundleRequest, Bundler, Entry, VirtualModule};
use codegen::{SERVER_ENTRY_ID, server_wrapper};
use remote_core::{Registry, RemoteModule};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::error::BuildError;

/// A module whose handler could not be produced.
#[derive(Debug)]
pub struct ModuleFailure {
    pub source_id: PathBuf,
    pub stable_name: String,
    pub error: BuildError,
}

#[derive(Debug, Default)]
pub struct BuildReport {
    /// Written handler files, sorted.
    pub written: Vec<PathBuf>,
    pub failed: Vec<ModuleFailure>,
}

impl BuildReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Output file for a module.
pub fn artifact_path(out_dir: &Path, module: &RemoteModule) -> PathBuf {
    out_dir.join(format!("{}.js", module.stable_name))
}

/// Compile one standalone handler per registered module into `out_dir`.
///
/// The directory is emptied first, and refused outright when it is the
/// project root, one of its ancestors, or holds a discovered source. Modules
/// build concurrently and
/// independently: a failed module is recorded in the report and gets no
/// file while the others still complete.
pub async fn build(
    registry: &Registry,
    bundler: Arc<dyn Bundler>,
    out_dir: &Path,
    virtual_modules: &[VirtualModule],
) -> Result<BuildReport, BuildError> {
    let start = Instant::now();
    check_out_dir(registry, out_dir)?;
    reset_out_dir(out_dir).await?;

    let permits = Arc::new(Semaphore::new(num_cpus::get().max(1)));
    let virtual_modules: Arc<[VirtualModule]> = virtual_modules.into();
    let mut tasks = JoinSet::new();
    for module in registry.modules().cloned() {
        let bundler = Arc::clone(&bundler);
        let permits = Arc::clone(&permits);
        let virtual_modules = Arc::clone(&virtual_modules);
        let path = artifact_path(out_dir, &module);
        tasks.spawn(async move {
            let _permit = permits.acquire_owned().await.ok();
            let result = build_module(&module, bundler.as_ref(), &virtual_modules, &path).await;
            (module, path, result)
        });
    }

    let mut report = BuildReport::default();
    while let Some(joined) = tasks.join_next().await {
        let (module, path, result) = joined?;
        match result {
            Ok(()) => {
                tracing::debug!("built {} -> {}", module.source_id.display(), path.display());
                report.written.push(path);
            }
            Err(error) => {
                tracing::error!("failed to build {}: {}", module.source_id.display(), error);
                report.failed.push(ModuleFailure {
                    source_id: module.source_id,
                    stable_name: module.stable_name,
                    error,
                });
            }
        }
    }
    report.written.sort();
    report.failed.sort_by(|a, b| a.source_id.cmp(&b.source_id));

    tracing::info!(
        "built {} of {} function(s) in {}ms",
        report.written.len(),
        registry.len(),
        start.elapsed().as_millis()
    );
    Ok(report)
}

fn check_out_dir(registry: &Registry, out_dir: &Path) -> Result<(), BuildError> {
    let unsafe_out_dir = |reason| BuildError::UnsafeOutDir {
        path: out_dir.to_path_buf(),
        reason,
    };
    let target = resolve(out_dir);
    if target.as_os_str().is_empty() || resolve(registry.root()).starts_with(&target) {
        return Err(unsafe_out_dir("it contains the project root"));
    }
    if registry
        .modules()
        .any(|module| resolve(&module.source_id).starts_with(&target))
    {
        return Err(unsafe_out_dir("it contains remote module sources"));
    }
    Ok(())
}

/// Canonical form when the path exists, lexically normalized otherwise.
fn resolve(path: &Path) -> PathBuf {
    if let Ok(canonical) = std::fs::canonicalize(path) {
        return canonical;
    }
    let mut normal = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if matches!(normal.components().next_back(), Some(Component::Normal(_))) {
                    normal.pop();
                } else {
                    normal.push(component);
                }
            }
            other => normal.push(other),
        }
    }
    normal
}

/// Empty `out_dir`, creating it when missing. Only its entries are removed.
async fn reset_out_dir(out_dir: &Path) -> Result<(), BuildError> {
    let reset_err = |source| BuildError::OutDir {
        path: out_dir.to_path_buf(),
        source,
    };
    tokio::fs::create_dir_all(out_dir).await.map_err(reset_err)?;
    let mut entries = tokio::fs::read_dir(out_dir).await.map_err(reset_err)?;
    while let Some(entry) = entries.next_entry().await.map_err(reset_err)? {
        let path = entry.path();
        let removed = match entry.file_type().await {
            Ok(kind) if kind.is_dir() => tokio::fs::remove_dir_all(&path).await,
            Ok(_) => tokio::fs::remove_file(&path).await,
            Err(err) => Err(err),
        };
        match removed {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(reset_err(err)),
        }
    }
    Ok(())
}

async fn build_module(
    module: &RemoteModule,
    bundler: &dyn Bundler,
    virtual_modules: &[VirtualModule],
    path: &Path,
) -> Result<(), BuildError> {
    let wrapper = server_wrapper(&module.mode, &module.source_id);
    let entry = Entry::Virtual(VirtualModule::new(SERVER_ENTRY_ID, wrapper));
    let request =
        BundleRequest::new(entry).with_virtual_modules(virtual_modules.iter().cloned());
    let code = bundler.bundle(request).await?;

    // Write beside the target, then rename, so a handler file is either
    // complete or absent.
    let staging = path.with_extension("js.tmp");
    let write_err = |source| BuildError::Write {
        path: path.to_path_buf(),
        source,
    };
    tokio::fs::write(&staging, code).await.map_err(write_err)?;
    tokio::fs::rename(&staging, path).await.map_err(write_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bundler::BundleError;
    use remote_core::BuildMode;

    struct WrapperBundler;

    #[async_trait]
    impl Bundler for WrapperBundler {
        async fn bundle(&self, request: BundleRequest) -> Result<String, BundleError> {
            let Entry::Virtual(entry) = request.entry else {
                panic!("builds use a virtual entry");
            };
            if entry.source.contains("broken") {
                return Err(BundleError::Failed {
                    program: "esbuild".into(),
                    status: "exit status: 1".into(),
                    stderr: "syntax error".into(),
                });
            }
            Ok(format!("// bundled\n{}", entry.source))
        }
    }

    fn registry(names: &[&str]) -> Registry {
        let mut builder = Registry::builder("/app", BuildMode::Build);
        for name in names {
            let source = PathBuf::from(format!("/app/{}.remote.ts", name));
            builder.observe(&source, "export default fn();").unwrap();
        }
        builder.finish()
    }

    fn listing(dir: &Path) -> Vec<String> {
        let mut names: Vec<_> = std::fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn writes_one_file_per_module() {
        let out = tempfile::tempdir().unwrap();
        let registry = registry(&["a", "b"]);
        let report = build(&registry, Arc::new(WrapperBundler), out.path(), &[])
            .await
            .unwrap();

        assert!(report.is_success());
        assert_eq!(report.written.len(), 2);
        let mut expected: Vec<_> = registry
            .modules()
            .map(|m| format!("{}.js", m.stable_name))
            .collect();
        expected.sort();
        assert_eq!(listing(out.path()), expected);

        let a = registry.modules().find(|m| m.stable_name.starts_with("a-")).unwrap();
        let code = std::fs::read_to_string(artifact_path(out.path(), a)).unwrap();
        assert!(code.starts_with("// bundled\nimport remote from \"/app/a.remote.ts\";"));
    }

    #[tokio::test]
    async fn removed_modules_leave_no_stale_files() {
        let out = tempfile::tempdir().unwrap();
        let bundler: Arc<dyn Bundler> = Arc::new(WrapperBundler);

        build(&registry(&["a", "b"]), Arc::clone(&bundler), out.path(), &[])
            .await
            .unwrap();
        std::fs::write(out.path().join("unrelated.txt"), "x").unwrap();

        let only_a = registry(&["a"]);
        build(&only_a, bundler, out.path(), &[]).await.unwrap();

        let a = only_a.modules().next().unwrap();
        assert_eq!(listing(out.path()), vec![format!("{}.js", a.stable_name)]);
    }

    #[tokio::test]
    async fn one_failure_does_not_stop_the_others() {
        let out = tempfile::tempdir().unwrap();
        let registry = registry(&["good", "broken"]);
        let report = build(&registry, Arc::new(WrapperBundler), out.path(), &[])
            .await
            .unwrap();

        assert!(!report.is_success());
        assert_eq!(report.failed.len(), 1);
        assert!(report.failed[0].stable_name.starts_with("broken-"));
        assert!(matches!(report.failed[0].error, BuildError::Bundle(_)));
        let files = listing(out.path());
        assert_eq!(files.len(), 1);
        assert!(files[0].starts_with("good-"));
    }

    fn project() -> (tempfile::TempDir, Registry) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("package.json"), "{}").unwrap();
        std::fs::create_dir(dir.path().join("src")).unwrap();
        let source = dir.path().join("src/a.remote.ts");
        std::fs::write(&source, "export default fn();").unwrap();

        let mut builder = Registry::builder(dir.path(), BuildMode::Build);
        builder.observe(&source, "export default fn();").unwrap();
        (dir, builder.finish())
    }

    #[tokio::test]
    async fn project_root_is_never_an_output_dir() {
        let (dir, registry) = project();
        let root = dir.path();
        let parent = root.parent().unwrap().to_path_buf();

        for out in [root.join("."), root.join(""), root.join("src/.."), parent] {
            let err = build(&registry, Arc::new(WrapperBundler), &out, &[])
                .await
                .unwrap_err();
            assert!(matches!(err, BuildError::UnsafeOutDir { .. }), "{}", out.display());
        }
        assert!(root.join("package.json").exists());
        assert!(root.join("src/a.remote.ts").exists());
        assert_eq!(listing(root), vec!["package.json", "src"]);
    }

    #[tokio::test]
    async fn source_dirs_are_never_an_output_dir() {
        let (dir, registry) = project();
        let err = build(&registry, Arc::new(WrapperBundler), &dir.path().join("src"), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, BuildError::UnsafeOutDir { .. }));
        assert!(dir.path().join("src/a.remote.ts").exists());
    }

    #[tokio::test]
    async fn output_dir_inside_the_project_is_emptied_in_place() {
        let (dir, registry) = project();
        let out = dir.path().join("functions");
        std::fs::create_dir_all(out.join("old")).unwrap();
        std::fs::write(out.join("old/stale.js"), "").unwrap();
        std::fs::write(out.join("stale.js"), "").unwrap();

        let report = build(&registry, Arc::new(WrapperBundler), &out, &[])
            .await
            .unwrap();
        assert_eq!(report.written.len(), 1);
        assert_eq!(listing(&out).len(), 1);
        assert!(listing(&out)[0].starts_with("a-"));
        assert!(dir.path().join("package.json").exists());
    }

    #[test]
    fn missing_paths_are_normalized_lexically() {
        assert_eq!(
            resolve(Path::new("/nowhere/app/./out/../functions")),
            PathBuf::from("/nowhere/app/functions")
        );
        assert_eq!(resolve(Path::new("../out")), PathBuf::from("../out"));
        assert_eq!(resolve(Path::new("nowhere/..")), PathBuf::new());
    }

    #[tokio::test]
    async fn output_dir_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("nested/functions");
        let report = build(&registry(&[]), Arc::new(WrapperBundler), &out, &[])
            .await
            .unwrap();
        assert!(report.written.is_empty());
        assert!(out.is_dir());
    }
}
