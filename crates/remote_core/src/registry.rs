use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;

use crate::classify::{Classifier, LexicalClassifier};
use crate::error::RemoteError;
use crate::identity;
use crate::mode::{BuildMode, Mode};

/// One tagged source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteModule {
    pub source_id: PathBuf,
    pub route_key: String,
    pub stable_name: String,
    pub mode: Mode,
}

/// Route key to module mapping produced by one discovery pass.
#[derive(Debug, Clone)]
pub struct Registry {
    root: PathBuf,
    build_mode: BuildMode,
    modules: BTreeMap<String, RemoteModule>,
}

impl Registry {
    pub fn empty(root: impl Into<PathBuf>, build_mode: BuildMode) -> Self {
        Self {
            root: root.into(),
            build_mode,
            modules: BTreeMap::new(),
        }
    }

    pub fn builder(root: impl Into<PathBuf>, build_mode: BuildMode) -> RegistryBuilder {
        RegistryBuilder::new(root.into(), build_mode)
    }

    /// Project root the modules were discovered under.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn build_mode(&self) -> BuildMode {
        self.build_mode
    }

    pub fn get(&self, route_key: &str) -> Option<&RemoteModule> {
        self.modules.get(route_key)
    }

    pub fn find_source(&self, source_id: &Path) -> Option<&RemoteModule> {
        self.modules
            .values()
            .find(|module| module.source_id == source_id)
    }

    /// Modules ordered by route key.
    pub fn modules(&self) -> impl Iterator<Item = &RemoteModule> {
        self.modules.values()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

/// Accumulates modules for one discovery pass.
pub struct RegistryBuilder {
    root: PathBuf,
    build_mode: BuildMode,
    classifier: Box<dyn Classifier>,
    modules: BTreeMap<String, RemoteModule>,
    by_source: HashMap<PathBuf, String>,
    names: HashMap<String, PathBuf>,
}

impl RegistryBuilder {
    fn new(root: PathBuf, build_mode: BuildMode) -> Self {
        Self {
            root,
            build_mode,
            classifier: Box::new(LexicalClassifier),
            modules: BTreeMap::new(),
            by_source: HashMap::new(),
            names: HashMap::new(),
        }
    }

    pub fn with_classifier(mut self, classifier: impl Classifier + 'static) -> Self {
        self.classifier = Box::new(classifier);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn build_mode(&self) -> BuildMode {
        self.build_mode
    }

    /// Classify and register a module. Observing the same source again
    /// replaces its earlier entry; a different source landing on an identity
    /// already taken is an [`RemoteError::IdentityCollision`]. A failed
    /// observation leaves the builder as it was.
    pub fn observe(
        &mut self,
        source_id: &Path,
        content: &str,
    ) -> Result<&RemoteModule, RemoteError> {
        let identity = identity::assign(&self.root, source_id, content, self.build_mode);
        let mode = self.classifier.classify(content);

        let taken = self.modules.get(&identity.route_key);
        if let Some(existing) = taken.filter(|existing| existing.source_id != source_id) {
            return Err(RemoteError::IdentityCollision {
                name: identity.route_key,
                first: existing.source_id.clone(),
                second: source_id.to_path_buf(),
            });
        }
        let taken = self.names.get(&identity.stable_name);
        if let Some(existing) = taken.filter(|existing| existing.as_path() != source_id) {
            return Err(RemoteError::IdentityCollision {
                name: identity.stable_name,
                first: existing.clone(),
                second: source_id.to_path_buf(),
            });
        }

        tracing::debug!(
            "remote module {} -> {} ({})",
            source_id.display(),
            identity.route_key,
            mode
        );

        if let Some(previous) = self.by_source.remove(source_id) {
            if let Some(module) = self.modules.remove(&previous) {
                self.names.remove(&module.stable_name);
            }
        }
        self.names
            .insert(identity.stable_name.clone(), source_id.to_path_buf());
        self.by_source
            .insert(source_id.to_path_buf(), identity.route_key.clone());
        let route_key = identity.route_key.clone();
        let module = RemoteModule {
            source_id: source_id.to_path_buf(),
            route_key: identity.route_key,
            stable_name: identity.stable_name,
            mode,
        };
        Ok(self.modules.entry(route_key).or_insert(module))
    }

    pub fn finish(self) -> Registry {
        Registry {
            root: self.root,
            build_mode: self.build_mode,
            modules: self.modules,
        }
    }
}

/// Process-visible registry slot. Readers take a snapshot; a discovery pass
/// swaps in a whole new registry.
#[derive(Debug)]
pub struct SharedRegistry {
    current: RwLock<Arc<Registry>>,
}

impl SharedRegistry {
    pub fn new(registry: Registry) -> Self {
        Self {
            current: RwLock::new(Arc::new(registry)),
        }
    }

    pub fn snapshot(&self) -> Arc<Registry> {
        Arc::clone(&self.current.read())
    }

    /// Install `registry`, returning the one it replaced.
    pub fn replace(&self, registry: Registry) -> Arc<Registry> {
        std::mem::replace(&mut *self.current.write(), Arc::new(registry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mode::Codec;

    struct AlwaysWebsocket;

    impl Classifier for AlwaysWebsocket {
        fn classify(&self, _source: &str) -> Mode {
            Mode::Websocket
        }
    }

    #[test]
    fn observe_registers_by_route_key() {
        let mut builder = Registry::builder("/app", BuildMode::Dev);
        let module = builder
            .observe(Path::new("/app/src/echo.remote.ts"), "export default fn();")
            .unwrap();
        assert_eq!(module.route_key, "src/echo.remote.ts");
        assert_eq!(module.mode, Mode::function(Codec::Manual, Codec::Json));

        let registry = builder.finish();
        assert_eq!(registry.len(), 1);
        assert!(registry.get("src/echo.remote.ts").is_some());
        assert!(registry.get("src/other.remote.ts").is_none());
        assert!(registry.find_source(Path::new("/app/src/echo.remote.ts")).is_some());
    }

    #[test]
    fn reobserving_a_source_replaces_it() {
        let mut builder = Registry::builder("/app", BuildMode::Dev);
        let path = Path::new("/app/a.remote.ts");
        let first = builder.observe(path, "one").unwrap().stable_name.clone();
        let second = builder.observe(path, "two").unwrap().stable_name.clone();
        assert_ne!(first, second);
        let registry = builder.finish();
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("a.remote.ts").unwrap().stable_name, second);
    }

    #[test]
    fn distinct_sources_with_same_build_identity_collide() {
        // `a b.remote.ts` and `a-b.remote.ts` share a stem but not a path.
        let mut builder = Registry::builder("/app", BuildMode::Build);
        builder.observe(Path::new("/app/a b.remote.ts"), "").unwrap();
        builder.observe(Path::new("/app/a-b.remote.ts"), "").unwrap();
        assert_eq!(builder.finish().len(), 2);

        let mut builder = Registry::builder("/app", BuildMode::Build);
        builder.observe(Path::new("/app/x.remote.ts"), "").unwrap();
        // Outside the root, `/x.remote.ts` maps to the same relative id.
        let err = builder.observe(Path::new("/x.remote.ts"), "").unwrap_err();
        match err {
            RemoteError::IdentityCollision { first, second, .. } => {
                assert_eq!(first, PathBuf::from("/app/x.remote.ts"));
                assert_eq!(second, PathBuf::from("/x.remote.ts"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn failed_observe_keeps_the_existing_module() {
        let mut builder = Registry::builder("/app", BuildMode::Build);
        let original = builder
            .observe(Path::new("/app/x.remote.ts"), "export default fn();")
            .unwrap()
            .clone();

        assert!(builder.observe(Path::new("/x.remote.ts"), "").is_err());
        assert!(builder.observe(Path::new("/x.remote.ts"), "").is_err());

        let again = builder
            .observe(Path::new("/app/x.remote.ts"), "export default fnRaw();")
            .unwrap();
        assert_eq!(again.route_key, original.route_key);
        assert_eq!(again.stable_name, original.stable_name);

        let registry = builder.finish();
        assert_eq!(registry.len(), 1);
        assert_eq!(
            registry.get("x.remote.ts").unwrap().source_id,
            PathBuf::from("/app/x.remote.ts")
        );
        assert!(registry.find_source(Path::new("/x.remote.ts")).is_none());
        assert_eq!(registry.root(), Path::new("/app"));
    }

    #[test]
    fn custom_classifier_is_used() {
        let mut builder =
            Registry::builder("/app", BuildMode::Build).with_classifier(AlwaysWebsocket);
        let module = builder.observe(Path::new("/app/ws.remote.ts"), "").unwrap();
        assert!(module.mode.is_websocket());
    }

    #[test]
    fn shared_registry_swaps_whole_snapshots() {
        let shared = SharedRegistry::new(Registry::empty("/app", BuildMode::Dev));
        let before = shared.snapshot();

        let mut builder = Registry::builder("/app", BuildMode::Dev);
        builder.observe(Path::new("/app/a.remote.ts"), "").unwrap();
        let replaced = shared.replace(builder.finish());

        assert!(before.is_empty());
        assert!(replaced.is_empty());
        assert_eq!(shared.snapshot().len(), 1);
    }
}
