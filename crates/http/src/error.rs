use std::path::PathBuf;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use bundler::{BundleError, CacheError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("invalid method: {0}")]
    InvalidMethod(String),
    #[error("invalid request target: {0}")]
    InvalidUri(String),
    #[error("response head already written")]
    HeadAlreadySent,
    #[error("response body written before head")]
    HeadNotSent,
    #[error("client disconnected")]
    Disconnected,
    #[error("response body failed: {0}")]
    Body(#[from] axum::Error),
    #[error("failed to build response: {0}")]
    Http(#[from] axum::http::Error),
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("artifact not found: {path}")]
    Missing {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("handler exited with {status}")]
    Failed { status: String, stderr: String },
    #[error("malformed handler envelope: {0}")]
    Envelope(#[from] serde_json::Error),
    #[error("invalid response body: {0}")]
    Body(String),
    #[error("websocket upgrades need a resident runtime")]
    UpgradeUnsupported,
    #[error("handler I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Adapter(#[from] AdapterError),
}

/// Failure anywhere between route lookup and invocation.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("no remote module at `{0}`")]
    RouteNotFound(String),
    #[error("failed to compile {route_key}: {source}")]
    Compile {
        route_key: String,
        #[source]
        source: BundleError,
    },
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error(transparent)]
    Adapter(#[from] AdapterError),
    #[error(transparent)]
    Handler(#[from] HandlerError),
}

impl BridgeError {
    pub fn status(&self) -> StatusCode {
        match self {
            BridgeError::RouteNotFound(_) => StatusCode::NOT_FOUND,
            BridgeError::Handler(HandlerError::UpgradeUnsupported) => StatusCode::NOT_IMPLEMENTED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for BridgeError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            BridgeError::RouteNotFound(_) => "Not found".to_string(),
            BridgeError::Compile { .. } => self.to_string(),
            BridgeError::Handler(HandlerError::UpgradeUnsupported) => self.to_string(),
            _ => "Internal server error".to_string(),
        };
        (status, body).into_response()
    }
}
