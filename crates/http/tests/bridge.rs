use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response};
use bundler::{ArtifactCache, BundleError, BundleRequest, Bundler, Entry, VirtualModule};
use bytes::Bytes;
use http::{
    AdapterError, DevBridge, HandlerError, LegacyBody, LegacyRequest, LegacyResponse, LoadError,
    ModuleLoader, Outcome, RemoteHandler,
};
use parking_lot::Mutex;
use remote_core::{BuildMode, Registry, SharedRegistry};

/// Bundler that returns the entry source, optionally refusing one module.
/// `imported` stands in for code pulled in from the module's imports.
#[derive(Default)]
struct EchoBundler {
    calls: AtomicUsize,
    fail_for: Option<&'static str>,
    entries: Mutex<Vec<String>>,
    imported: Mutex<String>,
}

#[async_trait]
impl Bundler for EchoBundler {
    async fn bundle(&self, request: BundleRequest) -> Result<String, BundleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let Entry::Virtual(entry) = &request.entry else {
            panic!("dev compiles use a virtual entry");
        };
        assert!(request.resolve_virtual("monoserve").is_some());
        self.entries.lock().push(entry.source.clone());
        if let Some(needle) = self.fail_for {
            if entry.source.contains(needle) {
                return Err(BundleError::Failed {
                    program: "esbuild".into(),
                    status: "exit status: 1".into(),
                    stderr: "Could not resolve \"./missing\"".into(),
                });
            }
        }
        Ok(format!("{}{}", entry.source, self.imported.lock()))
    }
}

/// Handler that echoes the request body, or fails when asked to.
struct EchoHandler;

#[async_trait]
impl RemoteHandler for EchoHandler {
    async fn call(&self, request: Request<Body>) -> Result<Response<Body>, HandlerError> {
        let url = request.uri().to_string();
        let body = axum::body::to_bytes(request.into_body(), usize::MAX)
            .await
            .map_err(|err| HandlerError::Body(err.to_string()))?;
        if &body[..] == b"boom" {
            return Err(HandlerError::Failed {
                status: "exit status: 1".into(),
                stderr: "TypeError: boom".into(),
            });
        }
        let chunks = vec![
            Ok::<_, std::io::Error>(Bytes::from(format!("{} ", url))),
            Ok(body),
        ];
        Ok(Response::builder()
            .status(200)
            .header("content-type", "text/plain")
            .body(Body::from_stream(futures_util::stream::iter(chunks)))
            .unwrap())
    }
}

#[derive(Default)]
struct CountingLoader {
    loads: AtomicUsize,
}

#[async_trait]
impl ModuleLoader for CountingLoader {
    async fn load(&self, path: &Path) -> Result<Arc<dyn RemoteHandler>, LoadError> {
        assert!(path.exists(), "artifact must be on disk before loading");
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(EchoHandler))
    }
}

#[derive(Default)]
struct Recorded {
    status: Option<u16>,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
    ends: usize,
    order: Vec<&'static str>,
}

#[async_trait]
impl LegacyResponse for Recorded {
    async fn write_head(
        &mut self,
        status: u16,
        headers: &[(String, String)],
    ) -> Result<(), AdapterError> {
        self.status = Some(status);
        self.headers = headers.to_vec();
        self.order.push("head");
        Ok(())
    }

    async fn write(&mut self, chunk: Bytes) -> Result<(), AdapterError> {
        self.body.extend_from_slice(&chunk);
        self.order.push("body");
        Ok(())
    }

    async fn end(&mut self) -> Result<(), AdapterError> {
        self.ends += 1;
        self.order.push("end");
        Ok(())
    }
}

impl Recorded {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

struct Harness {
    bridge: DevBridge,
    bundler: Arc<EchoBundler>,
    loader: Arc<CountingLoader>,
    cache: Arc<ArtifactCache>,
}

fn harness(bundler: EchoBundler) -> Harness {
    let mut builder = Registry::builder("/app", BuildMode::Dev);
    builder
        .observe(
            Path::new("/app/src/echo.remote.ts"),
            "import { fn } from \"monoserve\";\nexport default fn(schema, async (x) => x);",
        )
        .unwrap();
    builder
        .observe(
            Path::new("/app/src/broken.remote.ts"),
            "import \"./missing\";\nexport default fn(schema, async (x) => x);",
        )
        .unwrap();
    let registry = Arc::new(SharedRegistry::new(builder.finish()));

    let bundler = Arc::new(bundler);
    let loader = Arc::new(CountingLoader::default());
    let cache = Arc::new(ArtifactCache::temporary().unwrap());
    let bridge = DevBridge::new(
        registry,
        Arc::clone(&bundler) as Arc<dyn Bundler>,
        Arc::clone(&loader) as Arc<dyn ModuleLoader>,
        Arc::clone(&cache),
    )
    .with_virtual_modules([VirtualModule::new("monoserve", codegen::helpers_module())]);

    Harness {
        bridge,
        bundler,
        loader,
        cache,
    }
}

fn post(path: &str, body: &'static str) -> LegacyRequest {
    let stream = futures_util::stream::iter(vec![Ok(Bytes::from_static(body.as_bytes()))]);
    LegacyRequest::new("POST", path)
        .header("host", "localhost:5173")
        .header("content-type", "application/json")
        .body(LegacyBody::Stream(Box::pin(stream)))
}

#[tokio::test]
async fn unknown_route_is_404_without_side_effects() {
    let h = harness(EchoBundler::default());
    let mut out = Recorded::default();

    let outcome = h
        .bridge
        .handle(post("/__monoserve/src/nope.remote.ts", "{}"), &mut out)
        .await;

    assert_eq!(outcome, Outcome::Handled);
    assert_eq!(out.status, Some(404));
    assert_eq!(out.text(), "Not found");
    assert_eq!(out.ends, 1);
    assert_eq!(h.bundler.calls.load(Ordering::SeqCst), 0);
    assert!(h.cache.is_empty());
    assert_eq!(h.cache.write_count(), 0);
}

#[tokio::test]
async fn other_paths_pass_through_untouched() {
    let h = harness(EchoBundler::default());
    let mut out = Recorded::default();

    let outcome = h.bridge.handle(LegacyRequest::new("GET", "/index.html"), &mut out).await;

    assert_eq!(outcome, Outcome::PassThrough);
    assert!(out.order.is_empty());
}

#[tokio::test]
async fn registered_route_compiles_loads_and_streams() {
    let h = harness(EchoBundler::default());
    let mut out = Recorded::default();

    let outcome = h
        .bridge
        .handle(post("/__monoserve/src/echo.remote.ts", "{\"a\":1}"), &mut out)
        .await;

    assert_eq!(outcome, Outcome::Handled);
    assert_eq!(out.status, Some(200));
    assert_eq!(
        out.text(),
        "http://localhost:5173/__monoserve/src/echo.remote.ts {\"a\":1}"
    );
    assert_eq!(out.order, vec!["head", "body", "body", "end"]);
    assert!(out
        .headers
        .contains(&("content-type".to_string(), "text/plain".to_string())));

    let entries = h.bundler.entries.lock();
    assert_eq!(entries.len(), 1);
    assert!(entries[0].starts_with("import remote from \"/app/src/echo.remote.ts\";"));
    assert_eq!(h.cache.len(), 1);
}

#[tokio::test]
async fn repeated_requests_hit_the_cache() {
    let h = harness(EchoBundler::default());

    for _ in 0..3 {
        let mut out = Recorded::default();
        h.bridge
            .handle(post("/__monoserve/src/echo.remote.ts", "{}"), &mut out)
            .await;
        assert_eq!(out.status, Some(200));
    }

    assert_eq!(h.bundler.calls.load(Ordering::SeqCst), 3);
    assert_eq!(h.cache.write_count(), 1);
    assert_eq!(h.loader.loads.load(Ordering::SeqCst), 1);
    let artifact = h
        .cache
        .get(&bundler::content_hash(&h.bundler.entries.lock()[0]))
        .unwrap();
    assert!(artifact.loaded);
}

#[tokio::test]
async fn edited_imports_are_picked_up_without_rediscovery() {
    let h = harness(EchoBundler::default());

    let mut out = Recorded::default();
    h.bridge
        .handle(post("/__monoserve/src/echo.remote.ts", "{}"), &mut out)
        .await;
    assert_eq!(out.status, Some(200));

    // The module itself is unchanged; only a file it imports was edited.
    *h.bundler.imported.lock() = "\n// helper v2".to_string();
    let mut out = Recorded::default();
    h.bridge
        .handle(post("/__monoserve/src/echo.remote.ts", "{}"), &mut out)
        .await;
    assert_eq!(out.status, Some(200));

    assert_eq!(h.bundler.calls.load(Ordering::SeqCst), 2);
    assert_eq!(h.cache.write_count(), 2);
    assert_eq!(h.loader.loads.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn compile_failure_is_500_and_leaves_other_modules_alone() {
    let h = harness(EchoBundler {
        fail_for: Some("broken.remote.ts"),
        ..EchoBundler::default()
    });

    let mut out = Recorded::default();
    h.bridge
        .handle(post("/__monoserve/src/broken.remote.ts", "{}"), &mut out)
        .await;
    assert_eq!(out.status, Some(500));
    assert!(out.text().contains("Could not resolve"));
    assert_eq!(out.ends, 1);
    assert!(h.cache.is_empty());

    let mut out = Recorded::default();
    h.bridge
        .handle(post("/__monoserve/src/echo.remote.ts", "{}"), &mut out)
        .await;
    assert_eq!(out.status, Some(200));
    assert_eq!(h.cache.len(), 1);
}

#[tokio::test]
async fn handler_errors_are_masked() {
    let h = harness(EchoBundler::default());
    let mut out = Recorded::default();

    h.bridge
        .handle(post("/__monoserve/src/echo.remote.ts", "boom"), &mut out)
        .await;

    assert_eq!(out.status, Some(500));
    assert_eq!(out.text(), "Internal server error");
    assert_eq!(out.ends, 1);
}

#[tokio::test]
async fn cache_is_purged_with_the_session() {
    let h = harness(EchoBundler::default());
    let mut out = Recorded::default();
    h.bridge
        .handle(post("/__monoserve/src/echo.remote.ts", "{}"), &mut out)
        .await;

    let dir = h.cache.dir().to_path_buf();
    assert_eq!(std::fs::read_dir(&dir).unwrap().count(), 1);
    h.cache.purge();
    assert!(!dir.exists());
}
