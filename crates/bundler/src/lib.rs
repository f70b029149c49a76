pub mod bundler;
pub mod cache;
pub mod command;
pub mod error;

pub use bundler::*;
pub use cache::{ArtifactCache, CompiledArtifact, content_hash};
pub use command::CommandBundler;
pub use error::{BundleError, CacheError};
