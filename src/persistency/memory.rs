//! # In-memory cluster storage
//!
//! Concurrent, non-durable storage of local objects. It backs tests and standalone kernels,
//! and serves as the object cache of the storage manager.

use crate::error::Result;
use crate::lookup::ItemPath;
use crate::persistency::cluster::{ClusterType, child_name, normalize_path};
use crate::persistency::object::LocalObject;
use crate::persistency::storage::{Capability, ClusterStorage, TransactionKey};
use dashmap::DashMap;
use log::debug;
use std::collections::{BTreeMap, BTreeSet};

pub struct MemoryOnlyClusterStorage {
    id: String,
    items: DashMap<ItemPath, BTreeMap<String, LocalObject>>,
}

impl Default for MemoryOnlyClusterStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryOnlyClusterStorage {
    pub fn new() -> Self {
        Self::with_id("memory")
    }

    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            items: DashMap::new(),
        }
    }

    /// Number of items holding at least one object
    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    pub fn clear(&self) {
        self.items.clear();
    }

    /// Drop every object of one item
    pub fn remove_item(&self, item: &ItemPath) {
        self.items.remove(item);
    }

    /// Log the stored paths of every item
    pub fn dump(&self) {
        debug!("Storage {} holds {} item(s)", self.id, self.items.len());
        for entry in self.items.iter() {
            debug!("  item {}", entry.key());
            for path in entry.value().keys() {
                debug!("    {}", path);
            }
        }
    }
}

impl ClusterStorage for MemoryOnlyClusterStorage {
    fn name(&self) -> &str {
        "Memory Cache"
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn query_cluster_support(&self, _cluster: ClusterType) -> Capability {
        Capability::ReadWrite
    }

    fn get_cluster_contents(&self, item: &ItemPath, path: &str) -> Result<Vec<String>> {
        let Some(objects) = self.items.get(item) else {
            return Ok(Vec::new());
        };

        let names: BTreeSet<&str> = objects
            .keys()
            .filter_map(|stored| child_name(path, stored))
            .collect();

        Ok(names.into_iter().map(str::to_string).collect())
    }

    fn get(
        &self,
        item: &ItemPath,
        path: &str,
        _key: Option<&TransactionKey>,
    ) -> Result<Option<LocalObject>> {
        let path = normalize_path(path);
        Ok(self
            .items
            .get(item)
            .and_then(|objects| objects.get(path).cloned()))
    }

    fn put(
        &self,
        item: &ItemPath,
        object: &LocalObject,
        _key: Option<&TransactionKey>,
    ) -> Result<()> {
        let path = object.cluster_path();
        debug!("Memory storage {}: put {}/{}", self.id, item, path);
        self.items
            .entry(*item)
            .or_default()
            .insert(path, object.clone());
        Ok(())
    }

    fn delete(&self, item: &ItemPath, path: &str, _key: Option<&TransactionKey>) -> Result<()> {
        let path = normalize_path(path);
        debug!("Memory storage {}: delete {}/{}", self.id, item, path);
        if let Some(mut objects) = self.items.get_mut(item) {
            objects.remove(path);
        }
        self.items.remove_if(item, |_, objects| objects.is_empty());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistency::object::{Outcome, Property};

    #[test]
    fn test_put_get_delete() {
        let storage = MemoryOnlyClusterStorage::new();
        let item = ItemPath::new();
        let object = LocalObject::from(Property::new("Name", "Widget"));

        storage.put(&item, &object, None).unwrap();
        assert_eq!(
            storage.get(&item, "Property/Name", None).unwrap(),
            Some(object)
        );
        assert_eq!(storage.item_count(), 1);

        storage.delete(&item, "/Property/Name/", None).unwrap();
        assert_eq!(storage.get(&item, "Property/Name", None).unwrap(), None);
        assert_eq!(storage.item_count(), 0);

        // deleting again is harmless
        storage.delete(&item, "Property/Name", None).unwrap();
    }

    #[test]
    fn test_cluster_contents() {
        let storage = MemoryOnlyClusterStorage::new();
        let item = ItemPath::new();
        for (schema, version, event) in [("Invoice", 0, 1), ("Invoice", 1, 4), ("Order", 0, 2)] {
            let outcome = Outcome::new(schema, version, event, "<x/>");
            storage.put(&item, &outcome.into(), None).unwrap();
        }
        storage
            .put(&item, &Property::new("Type", "Doc").into(), None)
            .unwrap();

        assert_eq!(
            storage.get_cluster_contents(&item, "").unwrap(),
            vec!["Outcome", "Property"]
        );
        assert_eq!(
            storage.get_cluster_contents(&item, "Outcome").unwrap(),
            vec!["Invoice", "Order"]
        );
        assert_eq!(
            storage.get_cluster_contents(&item, "Outcome/Invoice").unwrap(),
            vec!["0", "1"]
        );
        assert!(
            storage
                .get_cluster_contents(&ItemPath::new(), "Outcome")
                .unwrap()
                .is_empty()
        );
        assert_eq!(
            storage.get_last_integer_id(&item, "Outcome/Invoice/1").unwrap(),
            4
        );
        assert_eq!(storage.get_last_integer_id(&item, "AuditTrail").unwrap(), -1);
    }

    #[test]
    fn test_concurrent_writers() {
        use std::sync::Arc;
        use std::thread;

        let storage = Arc::new(MemoryOnlyClusterStorage::new());
        let item = ItemPath::new();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let storage = Arc::clone(&storage);
                thread::spawn(move || {
                    let property = Property::new(format!("P{}", i), i.to_string());
                    storage.put(&item, &property.into(), None).unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(
            storage.get_cluster_contents(&item, "Property").unwrap().len(),
            8
        );
    }
}
