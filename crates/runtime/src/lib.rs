//! Host-side orchestration: the module-load hook, project discovery, the
//! production build and the dev session that ties the bridge together.

pub mod build;
pub mod discover;
pub mod error;
pub mod modules;
pub mod plugin;
pub mod session;
pub mod watch;

pub use build::{BuildReport, ModuleFailure, build};
pub use discover::discover;
pub use error::{BuildError, DiscoverError, PluginError, SessionError};
pub use modules::server_virtual_modules;
pub use plugin::RemotePlugin;
pub use session::DevSession;
pub use watch::{WatchHandle, watch};
