use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::Args;
use http::ProcessLoader;
use remote_core::Options;

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Directory of built functions (defaults to `outDir`)
    pub dir: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, default_value = "8787")]
    pub port: u16,
}

pub async fn cmd(root: &Path, args: ServeArgs) -> anyhow::Result<()> {
    let options = Options::load(root)?;
    let dir = Options::resolve(root, args.dir.as_deref().unwrap_or(&options.out_dir));
    if !dir.is_dir() {
        anyhow::bail!("{} does not exist; run `monoserve build` first", dir.display());
    }

    let loader = Arc::new(ProcessLoader::new(root, &options.runtime));
    let app = http::functions_router(&dir, loader);
    let addr = SocketAddr::from(([127, 0, 0, 1], args.port));
    stdio::info("functions", &dir.display().to_string());
    stdio::log("listen", &format!("http://localhost:{}", args.port));

    tokio::select! {
        served = http::serve(addr, app) => {
            served.with_context(|| format!("failed to serve on {}", addr))
        }
        signal = tokio::signal::ctrl_c() => signal.context("failed to listen for ctrl-c"),
    }
}
