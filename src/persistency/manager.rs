//! # Storage Manager
//!
//! Routes every request to the storages able to serve it. Reads go to the first capable
//! reader that holds the object, writes go to every capable writer, and an optional memory
//! cache sits in front of the readers.

use crate::error::{KernelError, Result};
use crate::lookup::ItemPath;
use crate::persistency::cluster::{ClusterType, cluster_type_of, normalize_path};
use crate::persistency::memory::MemoryOnlyClusterStorage;
use crate::persistency::object::LocalObject;
use crate::persistency::storage::{Capability, ClusterStorage, TransactionKey};
use log::{debug, error, info, warn};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

pub struct ClusterStorageManager {
    storages: Vec<Arc<dyn ClusterStorage>>,
    readers: HashMap<ClusterType, Vec<Arc<dyn ClusterStorage>>>,
    writers: HashMap<ClusterType, Vec<Arc<dyn ClusterStorage>>>,
    cache: Option<MemoryOnlyClusterStorage>,
}

impl ClusterStorageManager {
    /// Create a manager over an ordered list of storages
    ///
    /// Storage order is the read priority.
    pub fn new(storages: Vec<Arc<dyn ClusterStorage>>, use_cache: bool) -> Result<Self> {
        if storages.is_empty() {
            return Err(KernelError::Configuration(
                "At least one cluster storage is required".to_string(),
            ));
        }

        let mut readers: HashMap<ClusterType, Vec<Arc<dyn ClusterStorage>>> = HashMap::new();
        let mut writers: HashMap<ClusterType, Vec<Arc<dyn ClusterStorage>>> = HashMap::new();

        for storage in &storages {
            info!("Using cluster storage {} ({})", storage.name(), storage.id());
            for cluster in ClusterType::ALL {
                let capability = storage.query_cluster_support(cluster);
                if capability.can_read() {
                    readers.entry(cluster).or_default().push(Arc::clone(storage));
                }
                if capability.can_write() {
                    writers.entry(cluster).or_default().push(Arc::clone(storage));
                }
            }
        }

        for cluster in ClusterType::ALL {
            if !writers.contains_key(&cluster) {
                warn!("No storage can write the {} cluster", cluster);
            }
            if !readers.contains_key(&cluster) {
                warn!("No storage can read the {} cluster", cluster);
            }
        }

        Ok(Self {
            storages,
            readers,
            writers,
            cache: use_cache.then(|| MemoryOnlyClusterStorage::with_id("cache")),
        })
    }

    pub fn storages(&self) -> &[Arc<dyn ClusterStorage>] {
        &self.storages
    }

    fn readers_for(&self, path: &str) -> &[Arc<dyn ClusterStorage>] {
        cluster_type_of(path)
            .and_then(|cluster| self.readers.get(&cluster))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    fn writers_for(&self, cluster: ClusterType) -> Result<&[Arc<dyn ClusterStorage>]> {
        self.writers
            .get(&cluster)
            .map(Vec::as_slice)
            .ok_or_else(|| {
                KernelError::Persistency(format!("No storage can write the {} cluster", cluster))
            })
    }

    /// Evict one item from the cache, or everything when `item` is `None`
    pub fn clear_cache(&self, item: Option<&ItemPath>) {
        let Some(cache) = &self.cache else {
            return;
        };
        match item {
            Some(item) => cache.remove_item(item),
            None => cache.clear(),
        }
    }

    /// Number of items currently cached
    pub fn cached_item_count(&self) -> usize {
        self.cache.as_ref().map(|c| c.item_count()).unwrap_or(0)
    }

    fn for_each_storage(
        &self,
        operation: &str,
        f: impl Fn(&dyn ClusterStorage) -> Result<()>,
    ) -> Result<()> {
        let mut first_error = None;
        for storage in &self.storages {
            if let Err(e) = f(storage.as_ref()) {
                error!("{} failed on storage {}: {}", operation, storage.id(), e);
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

impl ClusterStorage for ClusterStorageManager {
    fn name(&self) -> &str {
        "Cluster Storage Manager"
    }

    fn id(&self) -> &str {
        "manager"
    }

    fn query_cluster_support(&self, cluster: ClusterType) -> Capability {
        let read = self.readers.contains_key(&cluster);
        let write = self.writers.contains_key(&cluster);
        match (read, write) {
            (true, true) => Capability::ReadWrite,
            (true, false) => Capability::Read,
            (false, true) => Capability::Write,
            (false, false) => Capability::None,
        }
    }

    fn begin(&self, key: &TransactionKey) -> Result<()> {
        self.for_each_storage("begin", |s| s.begin(key))
    }

    fn commit(&self, key: &TransactionKey) -> Result<()> {
        self.for_each_storage("commit", |s| s.commit(key))
    }

    fn abort(&self, key: &TransactionKey) -> Result<()> {
        self.for_each_storage("abort", |s| s.abort(key))
    }

    fn get_cluster_contents(&self, item: &ItemPath, path: &str) -> Result<Vec<String>> {
        let path = normalize_path(path);
        let sources: &[Arc<dyn ClusterStorage>] = if path.is_empty() {
            &self.storages
        } else {
            self.readers_for(path)
        };

        let mut names = BTreeSet::new();
        for storage in sources {
            names.extend(storage.get_cluster_contents(item, path)?);
        }
        Ok(names.into_iter().collect())
    }

    fn get(
        &self,
        item: &ItemPath,
        path: &str,
        key: Option<&TransactionKey>,
    ) -> Result<Option<LocalObject>> {
        let path = normalize_path(path);

        if let Some(cache) = &self.cache {
            if let Some(object) = cache.get(item, path, key)? {
                debug!("Cache hit for {}/{}", item, path);
                return Ok(Some(object));
            }
        }

        for storage in self.readers_for(path) {
            if let Some(object) = storage.get(item, path, key)? {
                debug!("Read {}/{} from storage {}", item, path, storage.id());
                if let Some(cache) = &self.cache {
                    cache.put(item, &object, key)?;
                }
                return Ok(Some(object));
            }
        }

        Ok(None)
    }

    fn put(
        &self,
        item: &ItemPath,
        object: &LocalObject,
        key: Option<&TransactionKey>,
    ) -> Result<()> {
        for storage in self.writers_for(object.cluster_type())? {
            storage.put(item, object, key)?;
        }
        if let Some(cache) = &self.cache {
            cache.put(item, object, key)?;
        }
        Ok(())
    }

    fn delete(&self, item: &ItemPath, path: &str, key: Option<&TransactionKey>) -> Result<()> {
        let path = normalize_path(path);
        let cluster = cluster_type_of(path)
            .ok_or_else(|| KernelError::InvalidPath(format!("no cluster type in '{}'", path)))?;

        if let Some(cache) = &self.cache {
            cache.delete(item, path, key)?;
        }
        for storage in self.writers_for(cluster)? {
            storage.delete(item, path, key)?;
        }
        Ok(())
    }

    fn close(&self) -> Result<()> {
        self.clear_cache(None);
        self.for_each_storage("close", |s| s.close())
    }
}
