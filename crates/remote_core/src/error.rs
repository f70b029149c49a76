use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("identity collision: {first} and {second} both resolve to `{name}`")]
    IdentityCollision {
        name: String,
        first: PathBuf,
        second: PathBuf,
    },
    #[error("failed to read remote module {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("no base URL configured; set `baseUrl` in monoserve.json or MONOSERVE_URL")]
    MissingBaseUrl,
    #[error("base URL must be absolute http(s): {0}")]
    InvalidBaseUrl(String),
}
