use std::path::{Path, PathBuf};
use std::sync::Arc;

use bundler::{ArtifactCache, Bundler};
use http::{DevBridge, ModuleLoader};
use remote_core::{Options, Registry};

use crate::discover::discover;
use crate::error::{DiscoverError, SessionError};
use crate::modules::server_virtual_modules;
use crate::plugin::RemotePlugin;

/// State owned by one `dev` run: the plugin and its registry, the artifact
/// cache and the bridge serving the reserved prefix.
///
/// Compiled artifacts are removed on [`DevSession::shutdown`], or when the
/// last reference to the cache is dropped.
pub struct DevSession {
    plugin: Arc<RemotePlugin>,
    cache: Arc<ArtifactCache>,
    bridge: Arc<DevBridge>,
    skip: Vec<PathBuf>,
}

impl DevSession {
    /// Set up the session and run the first discovery pass.
    pub async fn start(
        root: impl Into<PathBuf>,
        options: &Options,
        bundler: Arc<dyn Bundler>,
        loader: Arc<dyn ModuleLoader>,
    ) -> Result<Self, SessionError> {
        let root = root.into();
        let cache = match &options.temp_dir {
            Some(dir) => ArtifactCache::in_dir(Options::resolve(&root, dir))?,
            None => ArtifactCache::temporary()?,
        };
        let cache = Arc::new(cache);

        let plugin = Arc::new(RemotePlugin::dev(root.clone()));
        let bridge = DevBridge::new(plugin.registry(), bundler, loader, Arc::clone(&cache))
            .with_virtual_modules(server_virtual_modules(options));

        let mut skip = vec![Options::resolve(&root, &options.out_dir)];
        if cache.dir().starts_with(&root) {
            skip.push(cache.dir().to_path_buf());
        }

        let session = Self {
            plugin,
            cache,
            bridge: Arc::new(bridge),
            skip,
        };
        let registry = session.rediscover().await?;
        tracing::info!(
            "dev session for {} with {} remote module(s)",
            root.display(),
            registry.len()
        );
        Ok(session)
    }

    pub fn root(&self) -> &Path {
        self.plugin.root()
    }

    pub fn plugin(&self) -> &RemotePlugin {
        &self.plugin
    }

    pub fn bridge(&self) -> Arc<DevBridge> {
        Arc::clone(&self.bridge)
    }

    pub fn cache(&self) -> &ArtifactCache {
        &self.cache
    }

    /// Directories discovery and the watcher ignore.
    pub fn skipped_dirs(&self) -> &[PathBuf] {
        &self.skip
    }

    /// Run a fresh discovery pass and swap in its registry.
    pub async fn rediscover(&self) -> Result<Arc<Registry>, DiscoverError> {
        let plugin = Arc::clone(&self.plugin);
        let skip = self.skip.clone();
        tokio::task::spawn_blocking(move || discover(&plugin, &skip)).await?
    }

    /// End the session, removing every compiled artifact. Safe to call
    /// more than once.
    pub fn shutdown(&self) {
        self.cache.purge();
        tracing::info!("dev session closed");
    }
}
