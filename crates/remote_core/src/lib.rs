//! Core model for remote modules.
//!
//! A remote module is a source file tagged by the `.remote.{ts,js}` naming
//! convention. Each one is classified into a calling [`Mode`], given a stable
//! identity, and recorded in a [`Registry`] that the code generator, the build
//! orchestrator and the dev bridge all read from.

pub mod classify;
pub mod config;
pub mod env;
pub mod error;
pub mod identity;
pub mod mode;
pub mod registry;

pub use classify::{Classifier, LexicalClassifier, classify};
pub use config::Options;
pub use error::{ConfigError, RemoteError};
pub use identity::{Identity, is_remote_id};
pub use mode::{BuildMode, Codec, Mode};
pub use registry::{Registry, RegistryBuilder, RemoteModule, SharedRegistry};

/// Path prefix the dev bridge intercepts.
pub const RESERVED_PREFIX: &str = "/__monoserve/";

/// Render `value` as a JavaScript string literal.
pub fn js_string(value: &str) -> String {
    serde_json::Value::from(value).to_string()
}

#[cfg(test)]
mod tests {
    use super::js_string;

    #[test]
    fn js_string_escapes_quotes_and_newlines() {
        assert_eq!(js_string("a\"b\nc"), "\"a\\\"b\\nc\"");
        assert_eq!(js_string("/__monoserve/x"), "\"/__monoserve/x\"");
    }
}
