use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use bundler::{Bundler, CommandBundler};
use clap::Args;
use http::{ModuleLoader, ProcessLoader};
use remote_core::Options;
use runtime::DevSession;

#[derive(Args, Debug)]
pub struct DevArgs {
    /// Port to listen on (defaults to `port` in monoserve.json)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Do not rediscover modules when files change
    #[arg(long)]
    pub no_watch: bool,
}

pub async fn cmd(root: &Path, args: DevArgs) -> anyhow::Result<()> {
    stdio::banner(super::VERSION);
    let options = Options::load(root)?;
    super::sync_env_declarations(root, &options)?;

    let bundler: Arc<dyn Bundler> = Arc::new(CommandBundler::new(root, &options.bundler));
    let loader: Arc<dyn ModuleLoader> = Arc::new(ProcessLoader::new(root, &options.runtime));
    let session = Arc::new(DevSession::start(root, &options, bundler, loader).await?);
    stdio::info("root", &root.display().to_string());
    stdio::info("modules", &session.plugin().registry().snapshot().len().to_string());

    let watcher = if args.no_watch {
        None
    } else {
        match runtime::watch(Arc::clone(&session)) {
            Ok(handle) => Some(handle),
            Err(err) => {
                stdio::warn("watch", &format!("disabled: {}", err));
                None
            }
        }
    };

    let static_dir = Options::resolve(root, &options.static_dir);
    let app = http::dev_router(session.bridge(), &static_dir);
    let port = args.port.unwrap_or(options.port);
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    stdio::log("listen", &format!("http://localhost:{}", port));

    let result = tokio::select! {
        served = http::serve(addr, app) => {
            served.with_context(|| format!("failed to serve on {}", addr))
        }
        signal = tokio::signal::ctrl_c() => {
            stdio::log("dev", "shutting down");
            signal.context("failed to listen for ctrl-c")
        }
    };

    drop(watcher);
    session.shutdown();
    result
}
