use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use remote_core::config::BundlerOptions;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::bundler::{BundleRequest, Bundler, Entry};
use crate::error::BundleError;

/// Bundles by running an esbuild-compatible executable.
///
/// A virtual entry is piped on stdin with the project root as its resolve
/// dir. Other virtual modules are staged to a temp dir and wired in with
/// `--alias`.
#[derive(Debug, Clone)]
pub struct CommandBundler {
    program: String,
    root: PathBuf,
    args: Vec<String>,
}

impl CommandBundler {
    pub fn new(root: impl Into<PathBuf>, options: &BundlerOptions) -> Self {
        let mut args = vec![
            "--bundle".to_string(),
            format!("--format={}", options.format),
            format!("--platform={}", options.platform),
            "--tree-shaking=true".to_string(),
            "--log-level=warning".to_string(),
        ];
        if let Some(target) = &options.target {
            args.push(format!("--target={}", target));
        }
        if options.minify {
            args.push("--minify".to_string());
        }
        for external in &options.external {
            args.push(format!("--external:{}", external));
        }
        args.extend(options.extra_args.iter().cloned());

        Self {
            program: options.program.clone(),
            root: root.into(),
            args,
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Arguments for `request` with virtual modules staged under `stage`.
    fn command_args(
        &self,
        request: &BundleRequest,
        stage: &Path,
    ) -> Result<Vec<String>, BundleError> {
        let mut args = self.args.clone();
        for module in &request.virtual_modules {
            let file = stage.join(format!("{}.js", staged_name(&module.id)));
            std::fs::write(&file, &module.source).map_err(|source| BundleError::Stage {
                id: module.id.clone(),
                source,
            })?;
            args.push(format!("--alias:{}={}", module.id, file.display()));
        }

        match &request.entry {
            Entry::Virtual(entry) => {
                args.push("--loader=js".to_string());
                args.push(format!("--sourcefile={}", entry.id));
            }
            Entry::Path(path) => args.push(path.display().to_string()),
        }
        Ok(args)
    }
}

#[async_trait]
impl Bundler for CommandBundler {
    async fn bundle(&self, request: BundleRequest) -> Result<String, BundleError> {
        let stage = tempfile::Builder::new().prefix("monoserve-stage-").tempdir()?;
        let args = self.command_args(&request, stage.path())?;

        tracing::debug!("{} {}", self.program, args.join(" "));
        let mut child = Command::new(&self.program)
            .args(&args)
            .current_dir(&self.root)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| BundleError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            if let Entry::Virtual(entry) = &request.entry {
                stdin.write_all(entry.source.as_bytes()).await?;
            }
            stdin.shutdown().await?;
        }

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            return Err(BundleError::Failed {
                program: self.program.clone(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        if !output.stderr.is_empty() {
            tracing::warn!("{}", String::from_utf8_lossy(&output.stderr).trim());
        }

        String::from_utf8(output.stdout).map_err(|_| BundleError::InvalidOutput)
    }
}

/// File stem for a staged virtual module id such as `$env/static/private`.
fn staged_name(id: &str) -> String {
    id.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}
