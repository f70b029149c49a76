use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use remote_core::Options;
use remote_core::env;

pub mod build;
pub mod dev;
pub mod env_cmd;
pub mod serve;
pub mod stub;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser, Debug)]
#[command(name = "monoserve")]
#[command(about = "Compile remote modules into functions and serve them in development")]
#[command(version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("MONOSERVE_GIT_SHA"), ")"))]
pub struct Cli {
    /// Project root (defaults to the current directory)
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve remote modules on demand next to static assets
    Dev(dev::DevArgs),
    /// Compile every remote module into a deployable function
    Build(build::BuildArgs),
    /// Serve built functions from a directory
    Serve(serve::ServeArgs),
    /// Print the client stub generated for a remote module
    Stub(stub::StubArgs),
    /// Write type declarations for `$env/static/private`
    Env,
}

pub async fn execute(cli: Cli) -> anyhow::Result<ExitCode> {
    let root = project_root(cli.root)?;
    match cli.command {
        Command::Dev(args) => dev::cmd(&root, args).await.map(|()| ExitCode::SUCCESS),
        Command::Build(args) => build::cmd(&root, args).await,
        Command::Serve(args) => serve::cmd(&root, args).await.map(|()| ExitCode::SUCCESS),
        Command::Stub(args) => stub::cmd(&root, args).map(|()| ExitCode::SUCCESS),
        Command::Env => env_cmd::cmd(&root).map(|()| ExitCode::SUCCESS),
    }
}

fn project_root(root: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    let root = match root {
        Some(root) => root,
        None => std::env::current_dir().context("failed to read the current directory")?,
    };
    std::fs::canonicalize(&root)
        .with_context(|| format!("project root {} not found", root.display()))
}

/// Refresh `$env/static/private` declarations when the project asks for them.
pub(crate) fn sync_env_declarations(root: &Path, options: &Options) -> anyhow::Result<()> {
    if !(options.env.enabled && options.env.declarations) {
        return Ok(());
    }
    let vars = env::static_vars(std::env::vars());
    let path = env::write_declarations(root, &vars)
        .with_context(|| format!("failed to write {}", env::declarations_path(root).display()))?;
    tracing::debug!("wrote {} env declaration(s) to {}", vars.len(), path.display());
    Ok(())
}
