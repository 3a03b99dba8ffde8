//! Per-grain-type directory selection.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::GrainDirectory;
use crate::config::DirectoryConfig;
use crate::types::GrainType;

/// Name of the directory used by grain types the manifest does not list.
pub const DEFAULT_DIRECTORY_NAME: &str = "default";

/// A registered external directory and the name it was registered under.
#[derive(Debug, Clone)]
pub struct NamedDirectory {
    /// Registration name.
    pub name: String,
    /// The directory store.
    pub directory: Arc<dyn GrainDirectory>,
}

/// Custom directory selection, consulted before the manifest.
pub trait GrainDirectoryResolverHook: Send + Sync + fmt::Debug {
    /// Directory governing `grain_type`, or `None` to defer to the next
    /// hook and finally to the manifest.
    fn resolve(&self, grain_type: GrainType) -> Option<NamedDirectory>;
}

/// Chooses which external directory governs each grain type.
///
/// Resolution order:
/// 1. Custom hooks, in registration order.
/// 2. The manifest's directory name for the type, or
///    [`DEFAULT_DIRECTORY_NAME`] when the type is not listed.
/// 3. No match: the type uses the DHT directory.
///
/// # Example
///
/// ```rust
/// # use std::sync::Arc;
/// # use moonpool_directory::{GrainDirectoryResolver, GrainType, InMemoryGrainDirectory};
/// let accounts = GrainType(0xBA4E_4B00);
/// let resolver = GrainDirectoryResolver::new(
///     [(accounts, "tables".to_string())],
///     vec![("tables".to_string(), Arc::new(InMemoryGrainDirectory::new()) as _)],
/// );
/// assert!(!resolver.is_using_dht(accounts));
/// assert!(resolver.is_using_dht(GrainType(1)));
/// ```
#[derive(Debug)]
pub struct GrainDirectoryResolver {
    manifest: HashMap<GrainType, String>,
    directories: Vec<NamedDirectory>,
    hooks: Vec<Arc<dyn GrainDirectoryResolverHook>>,
}

impl GrainDirectoryResolver {
    /// Create a resolver from a type → directory-name manifest and the
    /// named directories, in registration order.
    ///
    /// A name registered twice keeps its first directory.
    pub fn new(
        manifest: impl IntoIterator<Item = (GrainType, String)>,
        directories: Vec<(String, Arc<dyn GrainDirectory>)>,
    ) -> Self {
        let mut named: Vec<NamedDirectory> = Vec::with_capacity(directories.len());
        for (name, directory) in directories {
            if named.iter().any(|d| d.name == name) {
                tracing::warn!(name = %name, "duplicate grain directory name ignored");
                continue;
            }
            named.push(NamedDirectory { name, directory });
        }
        Self {
            manifest: manifest.into_iter().collect(),
            directories: named,
            hooks: Vec::new(),
        }
    }

    /// Create a resolver from the manifest in `config`.
    pub fn from_config(
        config: &DirectoryConfig,
        directories: Vec<(String, Arc<dyn GrainDirectory>)>,
    ) -> Self {
        Self::new(config.manifest(), directories)
    }

    /// Resolver with no external directories: every type uses the DHT.
    pub fn dht_only() -> Self {
        Self::new([], Vec::new())
    }

    /// Add a custom hook, consulted after the hooks added before it.
    pub fn with_hook(mut self, hook: Arc<dyn GrainDirectoryResolverHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    /// Named directory governing `grain_type`, or `None` for the DHT.
    pub fn resolve_named(&self, grain_type: GrainType) -> Option<NamedDirectory> {
        if let Some(found) = self.hooks.iter().find_map(|hook| hook.resolve(grain_type)) {
            return Some(found);
        }
        let name = self
            .manifest
            .get(&grain_type)
            .map(String::as_str)
            .unwrap_or(DEFAULT_DIRECTORY_NAME);
        self.directories.iter().find(|d| d.name == name).cloned()
    }

    /// Directory governing `grain_type`, or `None` for the DHT.
    pub fn resolve(&self, grain_type: GrainType) -> Option<Arc<dyn GrainDirectory>> {
        self.resolve_named(grain_type).map(|d| d.directory)
    }

    /// Registered directories, in registration order.
    pub fn directories(&self) -> &[NamedDirectory] {
        &self.directories
    }

    /// Whether `grain_type` falls back to the DHT directory.
    pub fn is_using_dht(&self, grain_type: GrainType) -> bool {
        self.resolve_named(grain_type).is_none()
    }
}
