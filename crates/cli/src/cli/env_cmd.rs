use std::path::Path;

use anyhow::Context;
use remote_core::env;

pub fn cmd(root: &Path) -> anyhow::Result<()> {
    let vars = env::static_vars(std::env::vars());
    let path = env::write_declarations(root, &vars)
        .with_context(|| format!("failed to write {}", env::declarations_path(root).display()))?;
    stdio::success(&format!("declared {} variable(s) in {}", vars.len(), path.display()));
    Ok(())
}
