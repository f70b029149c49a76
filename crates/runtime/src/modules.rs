use std::collections::BTreeMap;

use bundler::VirtualModule;
use codegen::{HELPERS_MODULE_ID, helpers_module};
use remote_core::Options;
use remote_core::env::{self, ENV_MODULE_ID};

/// Virtual modules every server compile can import: the registration
/// helpers, and `$env/static/private` when enabled.
pub fn server_virtual_modules(options: &Options) -> Vec<VirtualModule> {
    let vars = if options.env.enabled {
        Some(env::static_vars(std::env::vars()))
    } else {
        None
    };
    virtual_modules_with(vars.as_ref())
}

fn virtual_modules_with(vars: Option<&BTreeMap<String, String>>) -> Vec<VirtualModule> {
    let mut modules = vec![VirtualModule::new(HELPERS_MODULE_ID, helpers_module())];
    if let Some(vars) = vars {
        modules.push(VirtualModule::new(ENV_MODULE_ID, env::module_source(vars)));
    }
    modules
}
