//! Request handling for remote modules.
//!
//! The [`adapter`] converts between the legacy streaming transport and
//! `Request`/`Response` values, the [`bridge`] compiles and invokes modules on
//! demand during development, and [`server`] wires both into axum.

pub mod adapter;
pub mod bridge;
pub mod envelope;
pub mod error;
pub mod loader;
pub mod server;

pub use adapter::{
    ChannelResponse, LegacyBody, LegacyRequest, LegacyResponse, PendingResponse, channel_response,
    send_response, to_request,
};
pub use bridge::{DevBridge, Outcome, dev_url, route_key_from_path};
pub use error::{AdapterError, BridgeError, HandlerError, LoadError};
pub use loader::{ModuleLoader, ProcessLoader, RemoteHandler};
pub use server::{dev_router, functions_router, serve};
