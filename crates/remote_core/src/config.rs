use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::ConfigError;

pub const CONFIG_FILE: &str = "monoserve.json";
pub const BASE_URL_ENV: &str = "MONOSERVE_URL";

/// Project options, read from `monoserve.json` in the project root.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Options {
    /// Public origin the deployed functions are served from.
    #[serde(default, alias = "monoserverURL")]
    pub base_url: Option<String>,
    #[serde(default = "default_out_dir")]
    pub out_dir: PathBuf,
    /// Directory for dev-session artifacts. A private temp dir when unset.
    #[serde(default)]
    pub temp_dir: Option<PathBuf>,
    #[serde(default = "default_static_dir")]
    pub static_dir: PathBuf,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub bundler: BundlerOptions,
    #[serde(default)]
    pub runtime: RuntimeOptions,
    #[serde(default)]
    pub env: EnvOptions,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BundlerOptions {
    pub program: String,
    pub platform: String,
    pub format: String,
    pub target: Option<String>,
    pub minify: bool,
    pub external: Vec<String>,
    pub extra_args: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RuntimeOptions {
    pub program: String,
    pub args: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EnvOptions {
    /// Expose `$env/static/private` to server compiles.
    pub enabled: bool,
    /// Write the matching type declarations under `node_modules/@types`.
    pub declarations: bool,
}

fn default_out_dir() -> PathBuf {
    PathBuf::from("functions")
}

fn default_static_dir() -> PathBuf {
    PathBuf::from("public")
}

fn default_port() -> u16 {
    5173
}

impl Default for Options {
    fn default() -> Self {
        Self {
            base_url: None,
            out_dir: default_out_dir(),
            temp_dir: None,
            static_dir: default_static_dir(),
            port: default_port(),
            bundler: BundlerOptions::default(),
            runtime: RuntimeOptions::default(),
            env: EnvOptions::default(),
        }
    }
}

impl Default for BundlerOptions {
    fn default() -> Self {
        Self {
            program: "esbuild".to_string(),
            platform: "neutral".to_string(),
            format: "esm".to_string(),
            target: None,
            minify: false,
            external: Vec::new(),
            extra_args: Vec::new(),
        }
    }
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            program: "deno".to_string(),
            args: vec!["eval".to_string()],
        }
    }
}

impl Default for EnvOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            declarations: true,
        }
    }
}

impl Options {
    /// Load `monoserve.json` from `root`, falling back to defaults when the
    /// file does not exist. `MONOSERVE_URL` overrides `baseUrl`.
    pub fn load(root: &Path) -> Result<Self, ConfigError> {
        let path = root.join(CONFIG_FILE);
        let mut options = if path.exists() {
            let contents = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
                path: path.clone(),
                source,
            })?;
            let options = Self::from_json(&contents)
                .map_err(|source| ConfigError::Parse { path: path.clone(), source })?;
            tracing::info!("Loaded config from {}", path.display());
            options
        } else {
            tracing::debug!("No {} in {}; using defaults", CONFIG_FILE, root.display());
            Self::default()
        };

        if let Ok(url) = std::env::var(BASE_URL_ENV) {
            if !url.is_empty() {
                options.base_url = Some(url);
            }
        }
        Ok(options)
    }

    pub fn from_json(contents: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(contents)
    }

    /// The configured base URL without a trailing slash.
    pub fn require_base_url(&self) -> Result<&str, ConfigError> {
        let url = self
            .base_url
            .as_deref()
            .map(|url| url.trim_end_matches('/'))
            .ok_or(ConfigError::MissingBaseUrl)?;
        let absolute = url.starts_with("https://") || url.starts_with("http://");
        if !absolute || url.len() <= "https://".len() {
            return Err(ConfigError::InvalidBaseUrl(url.to_string()));
        }
        Ok(url)
    }

    /// Public URL of a deployed function.
    pub fn function_url(&self, stable_name: &str) -> Result<String, ConfigError> {
        Ok(format!("{}/{}", self.require_base_url()?, stable_name))
    }

    /// Resolve a configured path against the project root.
    pub fn resolve(root: &Path, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            root.join(path)
        }
    }
}
