use std::path::{Path, PathBuf};
use std::sync::Arc;

use codegen::client_stub;
use parking_lot::Mutex;
use remote_core::{
    BuildMode, Options, Registry, RegistryBuilder, RemoteModule, SharedRegistry, is_remote_id,
};

use crate::error::PluginError;

/// The host bundler's module-load hook.
///
/// A host drives one discovery pass as `begin_pass`, a `transform` per loaded
/// module, then `end_pass`. Each `transform` of a remote module returns the
/// client stub that replaces it. `end_pass` publishes the pass as the new
/// registry in one swap.
pub struct RemotePlugin {
    root: PathBuf,
    build_mode: BuildMode,
    base_url: Option<String>,
    registry: Arc<SharedRegistry>,
    pass: Mutex<Option<RegistryBuilder>>,
}

impl RemotePlugin {
    pub fn dev(root: impl Into<PathBuf>) -> Self {
        Self::with_mode(root.into(), BuildMode::Dev, None)
    }

    /// Production plugin; fails when no usable base URL is configured.
    pub fn build(root: impl Into<PathBuf>, options: &Options) -> Result<Self, PluginError> {
        let base_url = options.require_base_url()?.to_string();
        Ok(Self::with_mode(root.into(), BuildMode::Build, Some(base_url)))
    }

    fn with_mode(root: PathBuf, build_mode: BuildMode, base_url: Option<String>) -> Self {
        Self {
            registry: Arc::new(SharedRegistry::new(Registry::empty(root.clone(), build_mode))),
            root,
            build_mode,
            base_url,
            pass: Mutex::new(None),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn build_mode(&self) -> BuildMode {
        self.build_mode
    }

    pub fn registry(&self) -> Arc<SharedRegistry> {
        Arc::clone(&self.registry)
    }

    /// Start a discovery pass, discarding any unfinished one.
    pub fn begin_pass(&self) {
        *self.pass.lock() = Some(Registry::builder(self.root.clone(), self.build_mode));
    }

    /// Drop the current pass without publishing it.
    pub fn abort_pass(&self) {
        self.pass.lock().take();
    }

    /// Publish the current pass and return it.
    pub fn end_pass(&self) -> Arc<Registry> {
        let registry = match self.pass.lock().take() {
            Some(builder) => builder.finish(),
            None => Registry::empty(self.root.clone(), self.build_mode),
        };
        tracing::debug!("discovery pass found {} remote module(s)", registry.len());
        self.registry.replace(registry);
        self.registry.snapshot()
    }

    /// Record a loaded module. Ids that are not remote modules are ignored.
    pub fn observe(&self, id: &str, content: &str) -> Result<Option<RemoteModule>, PluginError> {
        if !is_remote_id(id) {
            return Ok(None);
        }
        let path = PathBuf::from(strip_query(id));
        let mut pass = self.pass.lock();
        let builder =
            pass.get_or_insert_with(|| Registry::builder(self.root.clone(), self.build_mode));
        Ok(Some(builder.observe(&path, content)?.clone()))
    }

    /// Module-load hook: the client stub to use in place of `id`, or `None`
    /// to leave the module alone.
    pub fn transform(&self, id: &str, content: &str) -> Result<Option<String>, PluginError> {
        let Some(module) = self.observe(id, content)? else {
            return Ok(None);
        };
        let url = self.url_for(&module);
        Ok(Some(client_stub(&url, &module.mode)))
    }

    /// URL a client stub calls for `module`.
    pub fn url_for(&self, module: &RemoteModule) -> String {
        match (&self.build_mode, &self.base_url) {
            (BuildMode::Build, Some(base)) => format!("{}/{}", base, module.stable_name),
            _ => http::dev_url(&module.route_key),
        }
    }
}

fn strip_query(id: &str) -> &str {
    id.split(['?', '#']).next().unwrap_or(id)
}
