//! Source templates for remote modules.
//!
//! Every function here is pure: mode (and a URL or path) in, JavaScript out.
//! The client stub replaces a remote module in the calling bundle; the server
//! wrapper is the entry point compiled around the user's handler.

mod client;
mod helpers;
mod server;
mod shim;

pub use client::client_stub;
pub use helpers::{HELPERS_MODULE_ID, helpers_module};
pub use server::{SERVER_ENTRY_ID, server_wrapper};
pub use shim::{ARTIFACT_ENV, invoke_shim};
