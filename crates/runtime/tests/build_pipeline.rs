use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use bundler::{BundleError, BundleRequest, Bundler, Entry};
use remote_core::Options;
use runtime::{RemotePlugin, build, discover, server_virtual_modules};

/// Inlines the entry and records which virtual modules were resolvable.
struct InlineBundler;

#[async_trait]
impl Bundler for InlineBundler {
    async fn bundle(&self, request: BundleRequest) -> Result<String, BundleError> {
        let helpers = request.resolve_virtual("monoserve").is_some();
        let Entry::Virtual(entry) = request.entry else {
            return Err(BundleError::InvalidOutput);
        };
        Ok(format!("// helpers: {}\n{}", helpers, entry.source))
    }
}

fn write(root: &Path, relative: &str, content: &str) {
    let path = root.join(relative);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

#[tokio::test]
async fn discovered_modules_build_to_the_urls_their_stubs_call() {
    let project = tempfile::tempdir().unwrap();
    let root = project.path();
    write(
        root,
        "src/echo.remote.ts",
        "import { fn } from \"monoserve\";\nexport default fn(schema, async (x) => x);",
    );
    write(
        root,
        "src/chat.remote.ts",
        "import { fnWebSocket } from \"monoserve\";\nexport default fnWebSocket((ws) => {});",
    );
    write(root, "functions/stale.remote.js", "");

    let options = Options::from_json(r#"{ "baseUrl": "https://fns.example.dev" }"#).unwrap();
    let plugin = RemotePlugin::build(root, &options).unwrap();
    let out_dir = Options::resolve(root, &options.out_dir);
    let registry = discover(&plugin, std::slice::from_ref(&out_dir)).unwrap();
    assert_eq!(registry.len(), 2);

    let report = build(
        &registry,
        Arc::new(InlineBundler),
        &out_dir,
        &server_virtual_modules(&options),
    )
    .await
    .unwrap();
    assert!(report.is_success());

    for module in registry.modules() {
        let url = plugin.url_for(module);
        let name = url.strip_prefix("https://fns.example.dev/").unwrap();
        let code = std::fs::read_to_string(out_dir.join(format!("{}.js", name))).unwrap();
        assert!(code.starts_with("// helpers: true\n"));
    }
    assert!(!out_dir.join("stale.remote.js").exists());
}
