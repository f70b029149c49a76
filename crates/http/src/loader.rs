use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::header::UPGRADE;
use axum::http::{Request, Response};
use codegen::{ARTIFACT_ENV, invoke_shim};
use remote_core::config::RuntimeOptions;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::envelope::{RequestEnvelope, ResponseEnvelope};
use crate::error::{HandlerError, LoadError};

/// A loaded remote handler: `Request` in, `Response` out.
#[async_trait]
pub trait RemoteHandler: Send + Sync {
    async fn call(&self, request: Request<Body>) -> Result<Response<Body>, HandlerError>;
}

/// Loads a compiled artifact's default export.
#[async_trait]
pub trait ModuleLoader: Send + Sync {
    async fn load(&self, path: &Path) -> Result<Arc<dyn RemoteHandler>, LoadError>;
}

/// Runs each invocation in a fresh JavaScript runtime process.
///
/// Bodies are buffered into JSON envelopes on the way in and out, so this
/// loader cannot stream or upgrade connections.
#[derive(Debug, Clone)]
pub struct ProcessLoader {
    program: String,
    args: Vec<String>,
    cwd: PathBuf,
}

impl ProcessLoader {
    pub fn new(cwd: impl Into<PathBuf>, options: &RuntimeOptions) -> Self {
        Self {
            program: options.program.clone(),
            args: options.args.clone(),
            cwd: cwd.into(),
        }
    }
}

#[async_trait]
impl ModuleLoader for ProcessLoader {
    async fn load(&self, path: &Path) -> Result<Arc<dyn RemoteHandler>, LoadError> {
        tokio::fs::metadata(path)
            .await
            .map_err(|source| LoadError::Missing {
                path: path.to_path_buf(),
                source,
            })?;
        tracing::debug!("loaded {}", path.display());
        Ok(Arc::new(ProcessHandler {
            loader: self.clone(),
            artifact: path.to_path_buf(),
        }))
    }
}

struct ProcessHandler {
    loader: ProcessLoader,
    artifact: PathBuf,
}

#[async_trait]
impl RemoteHandler for ProcessHandler {
    async fn call(&self, request: Request<Body>) -> Result<Response<Body>, HandlerError> {
        if request.headers().contains_key(UPGRADE) {
            return Err(HandlerError::UpgradeUnsupported);
        }
        let envelope = RequestEnvelope::from_request(request).await?;
        let input = serde_json::to_vec(&envelope)?;

        let program = &self.loader.program;
        let mut child = Command::new(program)
            .args(&self.loader.args)
            .arg(invoke_shim())
            .env(ARTIFACT_ENV, &self.artifact)
            .current_dir(&self.loader.cwd)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| HandlerError::Spawn {
                program: program.clone(),
                source,
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(&input).await?;
            stdin.shutdown().await?;
        }
        let output = child.wait_with_output().await?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        for line in stderr.lines().filter(|line| !line.trim().is_empty()) {
            tracing::info!(target: "monoserve::handler", "{}", line);
        }

        if !output.status.success() {
            return Err(HandlerError::Failed {
                status: output.status.to_string(),
                stderr: stderr.trim().to_string(),
            });
        }

        let envelope: ResponseEnvelope = serde_json::from_slice(&output.stdout)?;
        envelope.into_response()
    }
}
