use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Body;
use axum::http::Response;
use axum::response::IntoResponse;
use bundler::{ArtifactCache, BundleRequest, Bundler, CompiledArtifact, Entry, VirtualModule};
use codegen::{SERVER_ENTRY_ID, server_wrapper};
use parking_lot::RwLock;
use remote_core::{RESERVED_PREFIX, RemoteModule, SharedRegistry};

use crate::adapter::{self, LegacyRequest, LegacyResponse};
use crate::error::BridgeError;
use crate::loader::{ModuleLoader, RemoteHandler};

/// Whether the bridge answered a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Handled,
    PassThrough,
}

/// Dev URL for a route key: the reserved prefix plus the key, each path
/// segment percent-encoded.
pub fn dev_url(route_key: &str) -> String {
    let encoded: Vec<_> = route_key
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect();
    format!("{}{}", RESERVED_PREFIX, encoded.join("/"))
}

/// Route key addressed by a request path, or `None` outside the prefix.
pub fn route_key_from_path(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let rest = path.strip_prefix(RESERVED_PREFIX)?;
    Some(
        urlencoding::decode(rest)
            .map(|key| key.into_owned())
            .unwrap_or_else(|_| rest.to_string()),
    )
}

/// Compiles and invokes remote modules on demand during development.
///
/// Every request re-bundles its module. A module's dev stable name hashes
/// only its own source, so it cannot tell when something it imports was
/// edited. Bundles are stored and loaded by the hash of their output:
/// an unchanged bundle costs one bundler run but no disk write and no
/// reload.
pub struct DevBridge {
    registry: Arc<SharedRegistry>,
    bundler: Arc<dyn Bundler>,
    loader: Arc<dyn ModuleLoader>,
    cache: Arc<ArtifactCache>,
    virtual_modules: Vec<VirtualModule>,
    handlers: RwLock<HashMap<String, Arc<dyn RemoteHandler>>>,
}

impl DevBridge {
    pub fn new(
        registry: Arc<SharedRegistry>,
        bundler: Arc<dyn Bundler>,
        loader: Arc<dyn ModuleLoader>,
        cache: Arc<ArtifactCache>,
    ) -> Self {
        Self {
            registry,
            bundler,
            loader,
            cache,
            virtual_modules: Vec::new(),
            handlers: RwLock::new(HashMap::new()),
        }
    }

    /// Modules resolvable from every server compile (`monoserve`, env, ...).
    pub fn with_virtual_modules(
        mut self,
        modules: impl IntoIterator<Item = VirtualModule>,
    ) -> Self {
        self.virtual_modules.extend(modules);
        self
    }

    pub fn cache(&self) -> &ArtifactCache {
        &self.cache
    }

    /// Answer `request` if it targets the reserved prefix.
    pub async fn handle(&self, request: LegacyRequest, out: &mut dyn LegacyResponse) -> Outcome {
        let Some(route_key) = route_key_from_path(&request.url) else {
            return Outcome::PassThrough;
        };

        let method = request.method.clone();
        let response = match self.dispatch(&route_key, request).await {
            Ok(response) => response,
            Err(err) => {
                match &err {
                    BridgeError::RouteNotFound(_) => {
                        tracing::debug!("{} {}: {}", method, route_key, err)
                    }
                    _ => tracing::error!("{} {}: {}", method, route_key, err),
                }
                err.into_response()
            }
        };

        tracing::info!(
            "{} {}{} {}",
            method,
            RESERVED_PREFIX,
            route_key,
            response.status().as_u16()
        );
        if let Err(err) = adapter::send_response(out, response).await {
            tracing::warn!("response to {} aborted: {}", route_key, err);
        }
        Outcome::Handled
    }

    async fn dispatch(
        &self,
        route_key: &str,
        request: LegacyRequest,
    ) -> Result<Response<Body>, BridgeError> {
        let module = self
            .registry
            .snapshot()
            .get(route_key)
            .cloned()
            .ok_or_else(|| BridgeError::RouteNotFound(route_key.to_string()))?;

        let handler = self.load(&module).await?;
        let request = adapter::to_request(request)?;
        Ok(handler.call(request).await?)
    }

    /// Compile `module`'s server wrapper into the artifact cache.
    pub async fn compile(&self, module: &RemoteModule) -> Result<CompiledArtifact, BridgeError> {
        let wrapper = server_wrapper(&module.mode, &module.source_id);
        let entry = Entry::Virtual(VirtualModule::new(SERVER_ENTRY_ID, wrapper));
        let request = BundleRequest::new(entry)
            .with_virtual_modules(self.virtual_modules.iter().cloned());
        let code = self
            .bundler
            .bundle(request)
            .await
            .map_err(|source| BridgeError::Compile {
                route_key: module.route_key.clone(),
                source,
            })?;
        Ok(self.cache.store(&code).await?)
    }

    async fn load(&self, module: &RemoteModule) -> Result<Arc<dyn RemoteHandler>, BridgeError> {
        let artifact = self.compile(module).await?;
        let cached = self.handlers.read().get(&artifact.content_hash).cloned();
        if let Some(handler) = cached {
            return Ok(handler);
        }

        let handler = self.loader.load(&artifact.disk_path).await?;
        self.cache.mark_loaded(&artifact.content_hash);
        let handler = Arc::clone(
            self.handlers
                .write()
                .entry(artifact.content_hash)
                .or_insert(handler),
        );
        Ok(handler)
    }
}
