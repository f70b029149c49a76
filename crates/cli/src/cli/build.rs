use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use bundler::CommandBundler;
use clap::Args;
use remote_core::Options;
use runtime::{RemotePlugin, server_virtual_modules};

#[derive(Args, Debug)]
pub struct BuildArgs {
    /// Output directory (defaults to `outDir` in monoserve.json)
    #[arg(short, long)]
    pub out_dir: Option<PathBuf>,

    /// Public base URL of deployed functions (overrides MONOSERVE_URL)
    #[arg(long)]
    pub base_url: Option<String>,
}

pub async fn cmd(root: &Path, args: BuildArgs) -> anyhow::Result<ExitCode> {
    let mut options = Options::load(root)?;
    if let Some(url) = args.base_url {
        options.base_url = Some(url);
    }
    if let Some(dir) = args.out_dir {
        options.out_dir = dir;
    }
    super::sync_env_declarations(root, &options)?;

    let plugin = RemotePlugin::build(root, &options)?;
    let out_dir = Options::resolve(root, &options.out_dir);
    let registry = runtime::discover(&plugin, std::slice::from_ref(&out_dir))?;
    stdio::log("build", &format!("{} remote module(s)", registry.len()));

    let bundler = Arc::new(CommandBundler::new(root, &options.bundler));
    let virtual_modules = server_virtual_modules(&options);
    let report = runtime::build(&registry, bundler, &out_dir, &virtual_modules).await?;

    for module in registry.modules() {
        if report.failed.iter().any(|failure| failure.stable_name == module.stable_name) {
            continue;
        }
        stdio::info(&module.stable_name, &plugin.url_for(module));
    }
    for failure in &report.failed {
        stdio::error("build", &format!("{}: {}", failure.source_id.display(), failure.error));
    }

    if report.is_success() {
        stdio::success(&format!(
            "wrote {} function(s) to {}",
            report.written.len(),
            out_dir.display()
        ));
        Ok(ExitCode::SUCCESS)
    } else {
        stdio::fail(&format!("{} module(s) failed to build", report.failed.len()));
        Ok(ExitCode::FAILURE)
    }
}
