use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::BundleError;

/// A module served from memory instead of the filesystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualModule {
    pub id: String,
    pub source: String,
}

impl VirtualModule {
    pub fn new(id: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
        }
    }

    pub fn matches(&self, id: &str) -> bool {
        self.id == id
    }

    pub fn load(&self) -> &str {
        &self.source
    }
}

/// Where bundling starts.
#[derive(Debug, Clone)]
pub enum Entry {
    /// Generated source, resolved relative to the bundle root.
    Virtual(VirtualModule),
    Path(PathBuf),
}

#[derive(Debug, Clone)]
pub struct BundleRequest {
    pub entry: Entry,
    pub virtual_modules: Vec<VirtualModule>,
}

impl BundleRequest {
    pub fn new(entry: Entry) -> Self {
        Self {
            entry,
            virtual_modules: Vec::new(),
        }
    }

    pub fn with_virtual_modules(
        mut self,
        modules: impl IntoIterator<Item = VirtualModule>,
    ) -> Self {
        self.virtual_modules.extend(modules);
        self
    }

    /// Resolve `id` against the virtual modules, entry included.
    pub fn resolve_virtual(&self, id: &str) -> Option<&VirtualModule> {
        if let Entry::Virtual(entry) = &self.entry {
            if entry.matches(id) {
                return Some(entry);
            }
        }
        self.virtual_modules.iter().find(|module| module.matches(id))
    }
}

/// Compiles an entry and everything it imports into one ES module.
///
/// Implementations must tree-shake and inline dynamic imports so the result
/// is a single standalone file.
#[async_trait]
pub trait Bundler: Send + Sync {
    async fn bundle(&self, request: BundleRequest) -> Result<String, BundleError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_entry_before_extra_modules() {
        let request = BundleRequest::new(Entry::Virtual(VirtualModule::new("entry", "a")))
            .with_virtual_modules([VirtualModule::new("monoserve", "b")]);

        assert_eq!(request.resolve_virtual("entry").map(|m| m.load()), Some("a"));
        assert_eq!(request.resolve_virtual("monoserve").map(|m| m.load()), Some("b"));
        assert!(request.resolve_virtual("devalue").is_none());
    }
}
