//! The `$env/static/private` module offered to server compiles.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::js_string;

pub const ENV_MODULE_ID: &str = "$env/static/private";

/// Keep variables whose names are valid `[A-Z0-9_]+` export identifiers.
pub fn static_vars<I>(vars: I) -> BTreeMap<String, String>
where
    I: IntoIterator<Item = (String, String)>,
{
    vars.into_iter()
        .filter(|(key, _)| is_static_name(key))
        .collect()
}

fn is_static_name(key: &str) -> bool {
    !key.is_empty()
        && key
            .bytes()
            .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit() || b == b'_')
        && !key.as_bytes()[0].is_ascii_digit()
}

pub fn module_source(vars: &BTreeMap<String, String>) -> String {
    let mut js = String::new();
    for (key, value) in vars {
        js.push_str(&format!("export const {} = {};\n", key, js_string(value)));
    }
    js
}

pub fn declarations(vars: &BTreeMap<String, String>) -> String {
    let mut dts = format!("declare module {} {{\n", js_string(ENV_MODULE_ID));
    for key in vars.keys() {
        dts.push_str(&format!("  export const {}: string;\n", key));
    }
    dts.push_str("}\n");
    dts
}

pub fn declarations_path(root: &Path) -> PathBuf {
    root.join("node_modules")
        .join("@types")
        .join("monoserve-env")
        .join("index.d.ts")
}

/// Write the declarations file for `vars` under `root`.
pub fn write_declarations(
    root: &Path,
    vars: &BTreeMap<String, String>,
) -> std::io::Result<PathBuf> {
    let path = declarations_path(root);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, declarations(vars))?;
    Ok(path)
}
