//! # Kernel configuration
//!
//! The storage stack and scripting settings are described in JSON:
//!
//! ```json
//! {
//!     "storages": [
//!         { "type": "memory" },
//!         { "type": "xml", "root": "/var/lib/cristal", "use_directories": true }
//!     ],
//!     "cache": true,
//!     "lock_retry": { "max_retries": 3, "retry_delay_ms": 50 },
//!     "scripting": { "timeout_ms": 5000 }
//! }
//! ```
//!
//! Storages are listed in read priority order.

use crate::error::{KernelError, Result};
use crate::persistency::manager::ClusterStorageManager;
use crate::persistency::memory::MemoryOnlyClusterStorage;
use crate::persistency::storage::ClusterStorage;
use crate::persistency::transaction::TransactionalStorage;
use crate::persistency::xml::{XmlClusterStorage, XmlStorageConfig};
use crate::retry::RetryConfig;
use crate::scripting::engine::ScriptEngineRegistry;
use crate::scripting::loader::ScriptLoader;
use crate::scripting::resolver::ScriptResolver;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    Memory {
        #[serde(default)]
        id: Option<String>,
    },
    Xml(XmlStorageConfig),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptingConfig {
    /// Execution time limit in milliseconds, none when absent
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl ScriptingConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KernelConfig {
    pub storages: Vec<StorageConfig>,
    #[serde(default = "default_cache")]
    pub cache: bool,
    #[serde(default)]
    pub lock_retry: RetryConfig,
    #[serde(default)]
    pub scripting: ScriptingConfig,
}

fn default_cache() -> bool {
    true
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            storages: vec![StorageConfig::Memory { id: None }],
            cache: default_cache(),
            lock_retry: RetryConfig::default(),
            scripting: ScriptingConfig::default(),
        }
    }
}

impl KernelConfig {
    // Load configuration from JSON string
    pub fn from_json(json_str: &str) -> Result<Self> {
        serde_json::from_str(json_str).map_err(|e| {
            KernelError::Configuration(format!("Invalid kernel configuration: {}", e))
        })
    }

    // Load configuration from JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json_str = fs::read_to_string(path).map_err(KernelError::from_io)?;
        Self::from_json(&json_str)
    }

    /// Open every configured storage behind a storage manager
    pub fn build_storage(&self) -> Result<ClusterStorageManager> {
        let storages = self
            .storages
            .iter()
            .map(|config| -> Result<Arc<dyn ClusterStorage>> {
                Ok(match config {
                    StorageConfig::Memory { id } => Arc::new(match id {
                        Some(id) => MemoryOnlyClusterStorage::with_id(id.clone()),
                        None => MemoryOnlyClusterStorage::new(),
                    }),
                    StorageConfig::Xml(xml) => Arc::new(XmlClusterStorage::open(xml.clone())?),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        ClusterStorageManager::new(storages, self.cache)
    }

    /// Storage manager wrapped with item locks and transaction logs
    pub fn build_transactional(&self) -> Result<TransactionalStorage> {
        let manager = self.build_storage()?;
        Ok(TransactionalStorage::with_retry(
            Arc::new(manager),
            self.lock_retry.clone(),
        ))
    }

    /// Script loader over `resolver` with the built-in engines
    pub fn build_script_loader(&self, resolver: Arc<dyn ScriptResolver>) -> ScriptLoader {
        ScriptLoader::new(resolver, Arc::new(ScriptEngineRegistry::new()))
            .with_timeout(self.scripting.timeout())
    }
}
