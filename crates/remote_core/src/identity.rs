//! Stable identities for remote modules.
//!
//! Identity hashes are SHA-256 truncated to [`ID_HASH_LEN`] hex characters
//! (48 bits). That keeps public URLs short; a collision between two distinct
//! sources is detected by the registry and treated as fatal.

use std::path::{Component, Path};

use sha2::{Digest, Sha256};

use crate::mode::BuildMode;

pub const ID_HASH_LEN: usize = 12;

/// File suffixes that tag a module as remote.
pub const REMOTE_SUFFIXES: &[&str] = &[".remote.ts", ".remote.js", ".remote.mts", ".remote.mjs"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub route_key: String,
    pub stable_name: String,
}

/// Derive the route key and stable name for a module.
///
/// In dev the route key is the project-relative path, so one file keeps one
/// route for the whole session, and the stable name hashes path and content.
/// In a build both are the same name, hashed from the relative path only, so
/// the public URL survives rebuilds of unrelated code.
pub fn assign(root: &Path, source_id: &Path, content: &str, build_mode: BuildMode) -> Identity {
    let relative = relative_id(root, source_id);
    let stem = display_stem(source_id);
    match build_mode {
        BuildMode::Dev => {
            let mut hasher = Sha256::new();
            hasher.update(relative.as_bytes());
            hasher.update([0u8]);
            hasher.update(content.as_bytes());
            let stable_name = format!("{}-{}", stem, truncate(hasher.finalize().as_slice()));
            Identity {
                route_key: relative,
                stable_name,
            }
        }
        BuildMode::Build => {
            let stable_name = format!("{}-{}", stem, short_hash(relative.as_bytes()));
            Identity {
                route_key: stable_name.clone(),
                stable_name,
            }
        }
    }
}

pub fn short_hash(input: &[u8]) -> String {
    truncate(Sha256::digest(input).as_slice())
}

fn truncate(digest: &[u8]) -> String {
    let mut hex = hex::encode(digest);
    hex.truncate(ID_HASH_LEN);
    hex
}

/// Project-relative path with `/` separators. Sources outside the root keep
/// their full path minus the leading separator.
pub fn relative_id(root: &Path, source_id: &Path) -> String {
    let relative = source_id.strip_prefix(root).unwrap_or(source_id);
    let parts: Vec<String> = relative
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            Component::ParentDir => Some("..".to_string()),
            _ => None,
        })
        .collect();
    parts.join("/")
}

/// File name with the remote suffix removed, reduced to `[A-Za-z0-9_-]`.
pub fn display_stem(source_id: &Path) -> String {
    let file_name = source_id
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let base = REMOTE_SUFFIXES
        .iter()
        .find_map(|suffix| file_name.strip_suffix(suffix))
        .unwrap_or(&file_name);

    let stem: String = base
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '_' || ch == '-' {
                ch
            } else {
                '-'
            }
        })
        .collect();
    match stem.trim_matches('-') {
        "" => "remote".to_string(),
        trimmed => trimmed.to_string(),
    }
}

/// Whether a module id (optionally carrying a `?query`) names a remote module.
pub fn is_remote_id(id: &str) -> bool {
    let path = id.split(['?', '#']).next().unwrap_or(id);
    REMOTE_SUFFIXES.iter().any(|suffix| path.ends_with(suffix))
}
