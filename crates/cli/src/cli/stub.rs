use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Args;
use remote_core::Options;
use runtime::RemotePlugin;

#[derive(Args, Debug)]
pub struct StubArgs {
    /// Remote module to render
    pub file: PathBuf,

    /// Render the production stub instead of the dev one
    #[arg(long)]
    pub build: bool,
}

pub fn cmd(root: &Path, args: StubArgs) -> anyhow::Result<()> {
    let options = Options::load(root)?;
    let stub = render(root, &options, &args.file, args.build)?;
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(stub.as_bytes())?;
    stdout.flush()?;
    Ok(())
}

fn render(root: &Path, options: &Options, file: &Path, build: bool) -> anyhow::Result<String> {
    let path = Options::resolve(root, file);
    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let plugin = if build {
        RemotePlugin::build(root, options)?
    } else {
        RemotePlugin::dev(root)
    };
    plugin.begin_pass();
    let stub = plugin.transform(&path.to_string_lossy(), &content)?;
    plugin.abort_pass();
    stub.with_context(|| format!("{} is not a remote module", path.display()))
}
