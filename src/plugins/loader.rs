//! Tab discovery and instantiation
//!
//! Two directory layouts are supported, never mixed within one pass:
//!
//! ```text
//! tabs/                         tabs/
//! ├── timer_reminder/           ├── timer_reminder.toml
//! │   └── tab.toml              └── notes.toml
//! └── notes/
//!     └── tab.toml
//! ```
//!
//! If the root holds any subdirectory, only subdirectories containing
//! `tab.toml` are candidates. Otherwise every `*.toml` file in the root is a
//! candidate (the older flat layout). A manifest names the registry entry
//! that builds the tab; failures are recorded per module and never abort the
//! scan.

use super::core::{HostHandle, Tab, TabContext, TabError, TabResult};
use super::registry::TabRegistry;

use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Entry file of a tab module directory
pub const ENTRY_FILE: &str = "tab.toml";

/// Parsed tab manifest
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TabManifest {
    /// Registry identifier of the tab factory
    #[serde(default)]
    pub factory: Option<String>,
}

impl TabManifest {
    pub fn parse(content: &str) -> TabResult<Self> {
        toml::from_str(content).map_err(|e| TabError::Manifest(e.to_string()))
    }
}

/// One discovered module
#[derive(Debug, Clone)]
struct Candidate {
    /// Name used in error messages
    label: String,
    /// Synthetic module name used as the cache key
    module_name: String,
    /// Name the factory defaults to when the manifest names none
    base_name: String,
    manifest_path: PathBuf,
}

/// Loads tabs from a directory through a [`TabRegistry`]
pub struct TabLoader<'r> {
    root: PathBuf,
    registry: &'r TabRegistry,
    parent: Option<HostHandle>,
    module_cache: HashMap<String, TabManifest>,
    loaded_count: usize,
    load_errors: Vec<String>,
}

impl<'r> TabLoader<'r> {
    pub fn new<P: AsRef<Path>>(root: P, registry: &'r TabRegistry) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            registry,
            parent: None,
            module_cache: HashMap::new(),
            loaded_count: 0,
            load_errors: Vec::new(),
        }
    }

    /// Parent handed to every constructed tab
    pub fn with_parent(mut self, parent: HostHandle) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Discover and instantiate every tab under the root
    pub fn load_all(&mut self) -> Vec<Box<dyn Tab>> {
        self.loaded_count = 0;
        self.load_errors.clear();

        let candidates = match self.discover() {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!("Failed to scan tabs directory {}: {}", self.root.display(), e);
                self.load_errors.push(format!("{}: {}", self.root.display(), e));
                return Vec::new();
            }
        };

        let mut tabs = Vec::new();
        for candidate in candidates {
            match self.load_candidate(&candidate) {
                Ok(Some(tab)) => {
                    debug!("Loaded tab '{}' from {}", tab.display_name(), candidate.module_name);
                    tabs.push(tab);
                }
                Ok(None) => debug!("Module {} exports no tab", candidate.module_name),
                Err(e) => self.load_errors.push(format!("{}: {}", candidate.label, e)),
            }
        }

        self.loaded_count = tabs.len();
        info!(
            "Loaded {} tab(s) from {} with {} error(s)",
            self.loaded_count,
            self.root.display(),
            self.load_errors.len()
        );
        tabs
    }

    /// Instantiate every registered factory, in registration order
    pub fn load_registered(&mut self) -> Vec<Box<dyn Tab>> {
        self.loaded_count = 0;
        self.load_errors.clear();

        let registry = self.registry;
        let mut tabs = Vec::new();
        for registration in registry.iter() {
            match self.instantiate(registration.id()) {
                Ok(tab) => tabs.push(tab),
                Err(e) => self.load_errors.push(format!("{}: {}", registration.id(), e)),
            }
        }

        self.loaded_count = tabs.len();
        tabs
    }

    /// Errors collected by the last pass, as `"<module>: <message>"`
    pub fn load_errors(&self) -> Vec<String> {
        self.load_errors.clone()
    }

    /// Number of tabs constructed by the last pass
    pub fn tab_count(&self) -> usize {
        self.loaded_count
    }

    fn discover(&self) -> std::io::Result<Vec<Candidate>> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }

        let mut dirs = Vec::new();
        let mut files = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let path = entry?.path();
            if path.is_dir() {
                dirs.push(path);
            } else if path.extension().and_then(|ext| ext.to_str()) == Some("toml") {
                files.push(path);
            }
        }

        if !dirs.is_empty() {
            dirs.sort();
            return Ok(dirs
                .into_iter()
                .filter_map(|dir| {
                    let manifest_path = dir.join(ENTRY_FILE);
                    if !manifest_path.is_file() {
                        return None;
                    }
                    let name = file_name(&dir);
                    Some(Candidate {
                        label: name.clone(),
                        module_name: format!("tabs.{}", name),
                        base_name: name,
                        manifest_path,
                    })
                })
                .collect());
        }

        files.sort();
        Ok(files
            .into_iter()
            .map(|file| {
                let stem = file
                    .file_stem()
                    .map(|stem| stem.to_string_lossy().into_owned())
                    .unwrap_or_default();
                Candidate {
                    label: file_name(&file),
                    module_name: stem.clone(),
                    base_name: stem,
                    manifest_path: file,
                }
            })
            .collect())
    }

    fn load_candidate(&mut self, candidate: &Candidate) -> TabResult<Option<Box<dyn Tab>>> {
        let manifest = self.import(candidate)?;

        let factory_id = match manifest.factory {
            Some(id) => id,
            None if self.registry.contains(&candidate.base_name) => candidate.base_name.clone(),
            None => return Ok(None),
        };

        self.instantiate(&factory_id).map(Some)
    }

    /// Parse a module's manifest once; later passes reuse the cached copy
    fn import(&mut self, candidate: &Candidate) -> TabResult<TabManifest> {
        if let Some(manifest) = self.module_cache.get(&candidate.module_name) {
            return Ok(manifest.clone());
        }

        let content = std::fs::read_to_string(&candidate.manifest_path)?;
        let manifest = TabManifest::parse(&content)?;
        self.module_cache
            .insert(candidate.module_name.clone(), manifest.clone());
        Ok(manifest)
    }

    fn instantiate(&self, factory_id: &str) -> TabResult<Box<dyn Tab>> {
        let registration = self
            .registry
            .get(factory_id)
            .ok_or_else(|| TabError::UnknownFactory(factory_id.to_string()))?;

        let mut tab = registration.construct(TabContext::new(self.parent.clone()))?;
        tab.setup_ui()?;
        Ok(tab)
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manifest_parse() {
        let manifest = TabManifest::parse("factory = \"timer_reminder\"\n").unwrap();
        assert_eq!(manifest.factory.as_deref(), Some("timer_reminder"));

        let empty = TabManifest::parse("").unwrap();
        assert_eq!(empty, TabManifest::default());

        assert!(TabManifest::parse("factory = [").is_err());
    }
}
