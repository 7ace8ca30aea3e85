use crate::error::{KernelError, Result};
use crate::lookup::ItemPath;
use crate::persistency::cluster::ClusterType;
use crate::persistency::storage::ClusterStorage;
use dashmap::DashMap;
use log::debug;
use std::sync::Arc;

/// Schema name of the viewpoints and outcomes that hold script documents
pub const SCRIPT_SCHEMA: &str = "Script";

/// Source of `<cristalscript>` documents by name and version
pub trait ScriptResolver: Send + Sync {
    fn resolve(&self, name: &str, version: i32) -> Result<String>;

    /// Resource item the named script is stored on, if any
    fn item_path(&self, _name: &str) -> Option<ItemPath> {
        None
    }
}

/// Script documents held in memory
#[derive(Default)]
pub struct InMemoryScriptResolver {
    scripts: DashMap<(String, i32), String>,
}

impl InMemoryScriptResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, name: &str, version: i32, xml: impl Into<String>) {
        self.scripts.insert((name.to_string(), version), xml.into());
    }
}

impl ScriptResolver for InMemoryScriptResolver {
    fn resolve(&self, name: &str, version: i32) -> Result<String> {
        self.scripts
            .get(&(name.to_string(), version))
            .map(|xml| xml.value().clone())
            .ok_or_else(|| KernelError::ObjectNotFound(format!("Script {} v{}", name, version)))
    }
}

/// Scripts stored on resource items
///
/// Version `v` of a script is the outcome the viewpoint `ViewPoint/Script/v` of its resource
/// item points to.
pub struct StorageScriptResolver {
    storage: Arc<dyn ClusterStorage>,
    items: DashMap<String, ItemPath>,
}

impl StorageScriptResolver {
    pub fn new(storage: Arc<dyn ClusterStorage>) -> Self {
        Self {
            storage,
            items: DashMap::new(),
        }
    }

    /// Register the resource item holding the named script
    pub fn register(&self, name: &str, item: ItemPath) {
        self.items.insert(name.to_string(), item);
    }
}

impl ScriptResolver for StorageScriptResolver {
    fn resolve(&self, name: &str, version: i32) -> Result<String> {
        let item = self
            .item_path(name)
            .ok_or_else(|| KernelError::ObjectNotFound(format!("Script {}", name)))?;

        let viewpoint_path = format!(
            "{}/{}/{}",
            ClusterType::Viewpoint.name(),
            SCRIPT_SCHEMA,
            version
        );
        let viewpoint = self
            .storage
            .get(&item, &viewpoint_path, None)?
            .ok_or_else(|| {
                KernelError::ObjectNotFound(format!("Script {} v{} on {}", name, version, item))
            })?;
        let viewpoint = viewpoint.as_viewpoint().ok_or_else(|| {
            KernelError::InvalidData(format!("{} is not a viewpoint", viewpoint_path))
        })?;

        let outcome_path = viewpoint.outcome_path();
        debug!("Resolving script {} v{} from {}/{}", name, version, item, outcome_path);
        let outcome = self
            .storage
            .get(&item, &outcome_path, None)?
            .ok_or_else(|| KernelError::ObjectNotFound(format!("{}/{}", item, outcome_path)))?;

        outcome
            .as_outcome()
            .map(|o| o.data.clone())
            .ok_or_else(|| KernelError::InvalidData(format!("{} is not an outcome", outcome_path)))
    }

    fn item_path(&self, name: &str) -> Option<ItemPath> {
        self.items.get(name).map(|item| *item.value())
    }
}
