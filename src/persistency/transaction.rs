//! # Transactional storage
//!
//! Wraps a cluster storage with per-item exclusive write locks and a log of pending writes
//! for each open transaction. Nothing reaches the backend before `commit`; a failed commit
//! puts back what it had already overwritten.

use crate::error::{KernelError, Result};
use crate::lookup::ItemPath;
use crate::persistency::cluster::{child_name, cluster_type_of, normalize_path};
use crate::persistency::object::LocalObject;
use crate::persistency::storage::{ClusterStorage, TransactionKey, last_integer_id};
use crate::retry::RetryConfig;
use log::{debug, error, info, warn};
use parking_lot::{Mutex, MutexGuard};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// A pending write: `Some` stores the object, `None` deletes the path
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionEntry {
    pub item: ItemPath,
    pub path: String,
    pub object: Option<LocalObject>,
}

impl TransactionEntry {
    fn matches(&self, item: &ItemPath, path: &str) -> bool {
        self.item == *item && self.path == path
    }
}

#[derive(Default)]
struct TransactionState {
    locks: HashMap<ItemPath, TransactionKey>,
    pending: HashMap<TransactionKey, Vec<TransactionEntry>>,
}

impl TransactionState {
    fn release_locks(&mut self, key: &TransactionKey) -> usize {
        let before = self.locks.len();
        self.locks.retain(|_, holder| holder != key);
        before - self.locks.len()
    }
}

/// Previous value of a path overwritten during commit
struct Undo {
    item: ItemPath,
    path: String,
    previous: Option<LocalObject>,
}

pub struct TransactionalStorage {
    storage: Arc<dyn ClusterStorage>,
    state: Mutex<TransactionState>,
    retry: RetryConfig,
}

impl TransactionalStorage {
    pub fn new(storage: Arc<dyn ClusterStorage>) -> Self {
        Self::with_retry(storage, RetryConfig::default())
    }

    /// Wrap a storage, waiting for conflicting locks as configured
    pub fn with_retry(storage: Arc<dyn ClusterStorage>, retry: RetryConfig) -> Self {
        Self {
            storage,
            state: Mutex::new(TransactionState::default()),
            retry,
        }
    }

    pub fn storage(&self) -> &Arc<dyn ClusterStorage> {
        &self.storage
    }

    /// Open a transaction
    pub fn begin(&self) -> Result<TransactionKey> {
        let key = TransactionKey::new();
        self.state.lock().pending.insert(key, Vec::new());

        if let Err(e) = self.storage.begin(&key) {
            self.state.lock().pending.remove(&key);
            return Err(e);
        }

        debug!("Began transaction {}", key);
        Ok(key)
    }

    /// Read an object, seeing the pending writes of `key` first
    pub fn get(
        &self,
        item: &ItemPath,
        path: &str,
        key: Option<&TransactionKey>,
    ) -> Result<LocalObject> {
        let path = normalize_path(path);

        if let Some(key) = key {
            let state = self.state.lock();
            let pending = state
                .pending
                .get(key)
                .and_then(|entries| entries.iter().find(|e| e.matches(item, path)));
            if let Some(entry) = pending {
                return entry.object.clone().ok_or_else(|| not_found(item, path));
            }
        }

        self.storage
            .get(item, path, key)?
            .ok_or_else(|| not_found(item, path))
    }

    /// Children of `path`, including the pending writes of `key`
    ///
    /// A child whose objects are all deleted by `key` is left out.
    pub fn get_cluster_contents(
        &self,
        item: &ItemPath,
        path: &str,
        key: Option<&TransactionKey>,
    ) -> Result<Vec<String>> {
        let path = normalize_path(path);
        let mut names: BTreeSet<String> = self
            .storage
            .get_cluster_contents(item, path)?
            .into_iter()
            .collect();

        let Some(key) = key else {
            return Ok(names.into_iter().collect());
        };

        let entries: Vec<TransactionEntry> = self
            .state
            .lock()
            .pending
            .get(key)
            .into_iter()
            .flatten()
            .filter(|e| e.item == *item)
            .cloned()
            .collect();

        let mut deleted = BTreeSet::new();
        for entry in &entries {
            let Some(name) = child_name(path, &entry.path) else {
                continue;
            };
            match entry.object {
                Some(_) => {
                    names.insert(name.to_string());
                }
                None => {
                    deleted.insert(name);
                }
            }
        }

        for name in deleted {
            if !names.contains(name) {
                continue;
            }
            let child = join_path(path, name);
            if !self.has_objects(item, &child, &entries)? {
                names.remove(name);
            }
        }

        Ok(names.into_iter().collect())
    }

    /// Largest integer child name of `path`, or -1, including pending writes of `key`
    pub fn get_last_integer_id(
        &self,
        item: &ItemPath,
        path: &str,
        key: Option<&TransactionKey>,
    ) -> Result<i32> {
        let contents = self.get_cluster_contents(item, path, key)?;
        Ok(last_integer_id(contents.iter().map(String::as_str)))
    }

    /// Store an object
    ///
    /// With a key the write is logged until commit; without one it goes straight to the
    /// backend unless another transaction holds the item.
    pub fn put(
        &self,
        item: &ItemPath,
        object: &LocalObject,
        key: Option<&TransactionKey>,
    ) -> Result<()> {
        let path = object.cluster_path();
        match key {
            Some(key) => self.log_write(item, path, Some(object.clone()), key),
            None => {
                let _guard = self.wait_unlocked(item)?;
                self.storage.put(item, object, None)
            }
        }
    }

    /// Remove an object, logged or direct as for [`TransactionalStorage::put`]
    pub fn delete(&self, item: &ItemPath, path: &str, key: Option<&TransactionKey>) -> Result<()> {
        let path = normalize_path(path);
        if cluster_type_of(path).is_none() {
            return Err(KernelError::InvalidPath(format!(
                "no cluster type in '{}'",
                path
            )));
        }

        match key {
            Some(key) => self.log_write(item, path.to_string(), None, key),
            None => {
                let _guard = self.wait_unlocked(item)?;
                self.storage.delete(item, path, None)
            }
        }
    }

    /// Flush the pending writes of `key` to the backend
    ///
    /// Locks held by the transaction are released whatever the outcome.
    pub fn commit(&self, key: &TransactionKey) -> Result<()> {
        let entries = self.take_pending(key)?;
        info!(
            "Committing transaction {} with {} entries",
            key,
            entries.len()
        );

        let mut undo = Vec::with_capacity(entries.len());
        let result = self
            .flush(key, &entries, &mut undo)
            .and_then(|()| self.storage.commit(key));

        if let Err(e) = &result {
            error!("Commit of transaction {} failed: {}", key, e);
            self.rollback(key, undo);
            if let Err(abort_error) = self.storage.abort(key) {
                error!(
                    "Backend abort of transaction {} failed: {}",
                    key, abort_error
                );
            }
        }

        self.release_locks(key);
        result
    }

    /// Discard the pending writes of `key` and release its locks
    pub fn abort(&self, key: &TransactionKey) -> Result<()> {
        let entries = self.take_pending(key)?;
        info!(
            "Aborting transaction {}, discarding {} entries",
            key,
            entries.len()
        );
        let result = self.storage.abort(key);
        self.release_locks(key);
        result
    }

    /// Transaction currently holding the write lock of an item
    pub fn lock_holder(&self, item: &ItemPath) -> Option<TransactionKey> {
        self.state.lock().locks.get(item).copied()
    }

    /// Number of pending entries of a transaction, 0 when unknown
    pub fn pending_count(&self, key: &TransactionKey) -> usize {
        self.state.lock().pending.get(key).map_or(0, Vec::len)
    }

    /// Log every open transaction with its pending entries and locks
    pub fn dump_pending(&self) {
        let state = self.state.lock();
        debug!("{} open transaction(s)", state.pending.len());
        for (key, entries) in &state.pending {
            debug!("  transaction {}", key);
            for entry in entries {
                let action = if entry.object.is_some() { "put" } else { "delete" };
                debug!("    {} {}/{}", action, entry.item, entry.path);
            }
        }
        for (item, holder) in &state.locks {
            debug!("  item {} locked by {}", item, holder);
        }
    }

    fn log_write(
        &self,
        item: &ItemPath,
        path: String,
        object: Option<LocalObject>,
        key: &TransactionKey,
    ) -> Result<()> {
        let mut state = self.acquire_lock(item, key)?;
        let entries = state
            .pending
            .get_mut(key)
            .ok_or_else(|| unknown_transaction(key))?;

        let entry = TransactionEntry {
            item: *item,
            path,
            object,
        };
        match entries.iter_mut().find(|e| e.matches(item, &entry.path)) {
            Some(existing) => *existing = entry,
            None => entries.push(entry),
        }
        Ok(())
    }

    /// Lock `item` for `key`, returning the state guard on success
    fn acquire_lock(
        &self,
        item: &ItemPath,
        key: &TransactionKey,
    ) -> Result<MutexGuard<'_, TransactionState>> {
        let mut attempt = 0;
        loop {
            let mut state = self.state.lock();
            if !state.pending.contains_key(key) {
                return Err(unknown_transaction(key));
            }
            let holder = *state.locks.entry(*item).or_insert(*key);
            if holder == *key {
                return Ok(state);
            }
            drop(state);
            self.wait_for(item, &holder, &mut attempt)?;
        }
    }

    /// Wait until no transaction holds `item`, returning the state guard
    fn wait_unlocked(&self, item: &ItemPath) -> Result<MutexGuard<'_, TransactionState>> {
        let mut attempt = 0;
        loop {
            let state = self.state.lock();
            let Some(holder) = state.locks.get(item).copied() else {
                return Ok(state);
            };
            drop(state);
            self.wait_for(item, &holder, &mut attempt)?;
        }
    }

    fn wait_for(&self, item: &ItemPath, holder: &TransactionKey, attempt: &mut u32) -> Result<()> {
        if *attempt >= self.retry.max_retries {
            warn!("Item {} is locked by transaction {}", item, holder);
            return Err(KernelError::locked(item, holder));
        }
        debug!(
            "Item {} is locked by transaction {}, retry {}/{}",
            item,
            holder,
            *attempt + 1,
            self.retry.max_retries
        );
        self.retry.sleep(*attempt);
        *attempt += 1;
        Ok(())
    }

    /// Whether anything stays below `node` once `entries` are applied
    fn has_objects(
        &self,
        item: &ItemPath,
        node: &str,
        entries: &[TransactionEntry],
    ) -> Result<bool> {
        if entries
            .iter()
            .any(|e| e.object.is_some() && is_within(node, &e.path))
        {
            return Ok(true);
        }

        let mut stored = Vec::new();
        self.collect_objects(item, node.to_string(), &mut stored)?;
        Ok(stored.iter().any(|path| {
            !entries
                .iter()
                .any(|e| e.object.is_none() && e.path == *path)
        }))
    }

    /// Paths of the backend objects at or below `node`
    fn collect_objects(
        &self,
        item: &ItemPath,
        node: String,
        out: &mut Vec<String>,
    ) -> Result<()> {
        let children = self.storage.get_cluster_contents(item, &node)?;
        if children.is_empty() {
            out.push(node);
            return Ok(());
        }
        for child in children {
            self.collect_objects(item, join_path(&node, &child), out)?;
        }
        Ok(())
    }

    fn take_pending(&self, key: &TransactionKey) -> Result<Vec<TransactionEntry>> {
        self.state
            .lock()
            .pending
            .remove(key)
            .ok_or_else(|| unknown_transaction(key))
    }

    fn release_locks(&self, key: &TransactionKey) {
        let released = self.state.lock().release_locks(key);
        debug!("Transaction {} released {} lock(s)", key, released);
    }

    fn flush(
        &self,
        key: &TransactionKey,
        entries: &[TransactionEntry],
        undo: &mut Vec<Undo>,
    ) -> Result<()> {
        for entry in entries {
            let previous = self.storage.get(&entry.item, &entry.path, Some(key))?;
            match &entry.object {
                Some(object) => self.storage.put(&entry.item, object, Some(key))?,
                None => self.storage.delete(&entry.item, &entry.path, Some(key))?,
            }
            undo.push(Undo {
                item: entry.item,
                path: entry.path.clone(),
                previous,
            });
        }
        Ok(())
    }

    fn rollback(&self, key: &TransactionKey, undo: Vec<Undo>) {
        for step in undo.into_iter().rev() {
            let restored = match &step.previous {
                Some(object) => self.storage.put(&step.item, object, Some(key)),
                None => self.storage.delete(&step.item, &step.path, Some(key)),
            };
            if let Err(e) = restored {
                error!(
                    "Could not restore {}/{} after failed commit of {}: {}",
                    step.item, step.path, key, e
                );
            }
        }
    }
}

fn not_found(item: &ItemPath, path: &str) -> KernelError {
    KernelError::ObjectNotFound(format!("{}/{}", item, path))
}

fn unknown_transaction(key: &TransactionKey) -> KernelError {
    KernelError::InvalidData(format!("Unknown transaction {}", key))
}

fn join_path(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", parent, name)
    }
}

/// Whether `path` is `node` itself or lies below it
fn is_within(node: &str, path: &str) -> bool {
    path == node || child_name(node, path).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistency::cluster::ClusterType;
    use crate::persistency::memory::MemoryOnlyClusterStorage;
    use crate::persistency::object::{Outcome, Property};
    use crate::persistency::storage::Capability;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Memory storage refusing to store the property named "Broken", and optionally
    /// refusing every commit
    struct BrokenStorage {
        inner: MemoryOnlyClusterStorage,
        aborts: AtomicUsize,
        fail_commit: bool,
    }

    impl BrokenStorage {
        fn new(fail_commit: bool) -> Self {
            Self {
                inner: MemoryOnlyClusterStorage::new(),
                aborts: AtomicUsize::new(0),
                fail_commit,
            }
        }
    }

    impl ClusterStorage for BrokenStorage {
        fn name(&self) -> &str {
            "Broken"
        }

        fn id(&self) -> &str {
            "broken"
        }

        fn query_cluster_support(&self, _cluster: ClusterType) -> Capability {
            Capability::ReadWrite
        }

        fn commit(&self, _key: &TransactionKey) -> Result<()> {
            if self.fail_commit {
                return Err(KernelError::Persistency("commit refused".to_string()));
            }
            Ok(())
        }

        fn abort(&self, _key: &TransactionKey) -> Result<()> {
            self.aborts.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn get_cluster_contents(&self, item: &ItemPath, path: &str) -> Result<Vec<String>> {
            self.inner.get_cluster_contents(item, path)
        }

        fn get(
            &self,
            item: &ItemPath,
            path: &str,
            key: Option<&TransactionKey>,
        ) -> Result<Option<LocalObject>> {
            self.inner.get(item, path, key)
        }

        fn put(
            &self,
            item: &ItemPath,
            object: &LocalObject,
            key: Option<&TransactionKey>,
        ) -> Result<()> {
            if object.name() == "Broken" {
                return Err(KernelError::Io("disk full".to_string()));
            }
            self.inner.put(item, object, key)
        }

        fn delete(&self, item: &ItemPath, path: &str, key: Option<&TransactionKey>) -> Result<()> {
            self.inner.delete(item, path, key)
        }
    }

    fn property_value(object: LocalObject) -> Option<String> {
        object.as_property().map(|p| p.value.clone())
    }

    #[test]
    fn test_writes_are_invisible_until_commit() {
        let backend = Arc::new(MemoryOnlyClusterStorage::new());
        let storage = TransactionalStorage::new(backend.clone());
        let item = ItemPath::new();

        let key = storage.begin().unwrap();
        storage
            .put(&item, &Property::new("Name", "Widget").into(), Some(&key))
            .unwrap();

        assert_eq!(
            property_value(storage.get(&item, "Property/Name", Some(&key)).unwrap()),
            Some("Widget".to_string())
        );
        assert!(matches!(
            storage.get(&item, "Property/Name", None),
            Err(KernelError::ObjectNotFound(_))
        ));
        assert_eq!(storage.lock_holder(&item), Some(key));
        assert_eq!(storage.pending_count(&key), 1);

        storage.commit(&key).unwrap();
        assert!(backend.get(&item, "Property/Name", None).unwrap().is_some());
        assert_eq!(storage.lock_holder(&item), None);
        assert_eq!(storage.pending_count(&key), 0);
    }

    #[test]
    fn test_later_write_replaces_pending_entry() {
        let storage = TransactionalStorage::new(Arc::new(MemoryOnlyClusterStorage::new()));
        let item = ItemPath::new();

        let key = storage.begin().unwrap();
        storage
            .put(&item, &Property::new("Name", "First").into(), Some(&key))
            .unwrap();
        storage
            .put(&item, &Property::new("Name", "Second").into(), Some(&key))
            .unwrap();
        assert_eq!(storage.pending_count(&key), 1);

        storage.delete(&item, "Property/Name", Some(&key)).unwrap();
        assert_eq!(storage.pending_count(&key), 1);
        assert!(matches!(
            storage.get(&item, "Property/Name", Some(&key)),
            Err(KernelError::ObjectNotFound(_))
        ));
    }

    #[test]
    fn test_lock_conflicts() {
        let storage = TransactionalStorage::new(Arc::new(MemoryOnlyClusterStorage::new()));
        let item = ItemPath::new();
        let other_item = ItemPath::new();

        let first = storage.begin().unwrap();
        let second = storage.begin().unwrap();
        storage
            .put(&item, &Property::new("Name", "A").into(), Some(&first))
            .unwrap();

        let conflict = storage.put(&item, &Property::new("Type", "B").into(), Some(&second));
        match conflict {
            Err(KernelError::Locked { holder, .. }) => assert_eq!(holder, first.to_string()),
            other => panic!("expected a lock conflict, got {:?}", other),
        }

        // unkeyed writes respect the lock too
        let direct = storage.put(&item, &Property::new("Type", "C").into(), None);
        assert!(direct.unwrap_err().retryable());

        storage
            .put(&other_item, &Property::new("Name", "B").into(), Some(&second))
            .unwrap();

        storage.abort(&first).unwrap();
        storage
            .put(&item, &Property::new("Type", "B").into(), Some(&second))
            .unwrap();
        storage.commit(&second).unwrap();
        assert_eq!(storage.pending_count(&first), 0);
    }

    #[test]
    fn test_unknown_transaction() {
        let storage = TransactionalStorage::new(Arc::new(MemoryOnlyClusterStorage::new()));
        let key = TransactionKey::new();

        assert!(matches!(
            storage.commit(&key),
            Err(KernelError::InvalidData(_))
        ));
        assert!(matches!(storage.abort(&key), Err(KernelError::InvalidData(_))));
        assert!(matches!(
            storage.put(&ItemPath::new(), &Property::new("A", "B").into(), Some(&key)),
            Err(KernelError::InvalidData(_))
        ));
    }

    #[test]
    fn test_contents_merge_pending_entries() {
        let backend = Arc::new(MemoryOnlyClusterStorage::new());
        let storage = TransactionalStorage::new(backend.clone());
        let item = ItemPath::new();
        for event in [1, 2] {
            backend
                .put(&item, &Outcome::new("Invoice", 0, event, "<a/>").into(), None)
                .unwrap();
        }

        let key = storage.begin().unwrap();
        storage
            .put(&item, &Outcome::new("Invoice", 0, 7, "<a/>").into(), Some(&key))
            .unwrap();
        storage
            .delete(&item, "Outcome/Invoice/0/1", Some(&key))
            .unwrap();

        assert_eq!(
            storage
                .get_cluster_contents(&item, "Outcome/Invoice/0", Some(&key))
                .unwrap(),
            vec!["2", "7"]
        );
        assert_eq!(
            storage
                .get_last_integer_id(&item, "Outcome/Invoice/0", Some(&key))
                .unwrap(),
            7
        );
        assert_eq!(
            storage
                .get_last_integer_id(&item, "Outcome/Invoice/0", None)
                .unwrap(),
            2
        );
        assert_eq!(
            storage.get_cluster_contents(&item, "", Some(&key)).unwrap(),
            vec!["Outcome"]
        );
    }

    #[test]
    fn test_failed_commit_restores_previous_values() {
        let backend = Arc::new(BrokenStorage::new(false));
        let storage = TransactionalStorage::new(backend.clone());
        let item = ItemPath::new();
        backend
            .put(&item, &Property::new("Name", "Old").into(), None)
            .unwrap();

        let key = storage.begin().unwrap();
        storage
            .put(&item, &Property::new("Name", "New").into(), Some(&key))
            .unwrap();
        storage
            .put(&item, &Property::new("Added", "x").into(), Some(&key))
            .unwrap();
        storage
            .put(&item, &Property::new("Broken", "x").into(), Some(&key))
            .unwrap();

        let result = storage.commit(&key);
        assert!(matches!(result, Err(KernelError::Io(_))));

        assert_eq!(
            property_value(storage.get(&item, "Property/Name", None).unwrap()),
            Some("Old".to_string())
        );
        assert!(storage.get(&item, "Property/Added", None).is_err());
        assert_eq!(backend.aborts.load(Ordering::SeqCst), 1);
        assert_eq!(storage.lock_holder(&item), None);
    }

    #[test]
    fn test_backend_commit_failure_restores_previous_values() {
        let backend = Arc::new(BrokenStorage::new(true));
        let storage = TransactionalStorage::new(backend.clone());
        let item = ItemPath::new();
        backend
            .put(&item, &Property::new("Name", "Old").into(), None)
            .unwrap();
        backend
            .put(&item, &Property::new("Type", "Part").into(), None)
            .unwrap();

        let key = storage.begin().unwrap();
        storage
            .put(&item, &Property::new("Name", "New").into(), Some(&key))
            .unwrap();
        storage
            .put(&item, &Property::new("Added", "x").into(), Some(&key))
            .unwrap();
        storage.delete(&item, "Property/Type", Some(&key)).unwrap();

        assert!(matches!(
            storage.commit(&key),
            Err(KernelError::Persistency(_))
        ));

        assert_eq!(
            property_value(storage.get(&item, "Property/Name", None).unwrap()),
            Some("Old".to_string())
        );
        assert_eq!(
            property_value(storage.get(&item, "Property/Type", None).unwrap()),
            Some("Part".to_string())
        );
        assert!(storage.get(&item, "Property/Added", None).is_err());
        assert_eq!(backend.aborts.load(Ordering::SeqCst), 1);
        assert_eq!(storage.lock_holder(&item), None);
        assert_eq!(storage.pending_count(&key), 0);

        // the item can be written again
        let next = storage.begin().unwrap();
        storage
            .put(&item, &Property::new("Name", "Next").into(), Some(&next))
            .unwrap();
        assert_eq!(storage.lock_holder(&item), Some(next));
    }

    #[test]
    fn test_contents_drop_parents_emptied_by_pending_deletes() {
        let backend = Arc::new(MemoryOnlyClusterStorage::new());
        let storage = TransactionalStorage::new(backend.clone());
        let item = ItemPath::new();
        backend
            .put(&item, &Property::new("Name", "Widget").into(), None)
            .unwrap();
        backend
            .put(&item, &Outcome::new("Invoice", 0, 1, "<a/>").into(), None)
            .unwrap();

        let key = storage.begin().unwrap();
        storage.delete(&item, "Property/Name", Some(&key)).unwrap();
        storage
            .delete(&item, "Outcome/Invoice/0/1", Some(&key))
            .unwrap();

        assert!(
            storage
                .get_cluster_contents(&item, "", Some(&key))
                .unwrap()
                .is_empty()
        );
        assert!(
            storage
                .get_cluster_contents(&item, "Property", Some(&key))
                .unwrap()
                .is_empty()
        );
        assert!(
            storage
                .get_cluster_contents(&item, "Outcome", Some(&key))
                .unwrap()
                .is_empty()
        );

        // putting something back under the parent lists it again
        storage
            .put(&item, &Outcome::new("Invoice", 0, 2, "<b/>").into(), Some(&key))
            .unwrap();
        assert_eq!(
            storage.get_cluster_contents(&item, "", Some(&key)).unwrap(),
            vec!["Outcome"]
        );

        storage.commit(&key).unwrap();
        assert_eq!(
            storage.get_cluster_contents(&item, "", None).unwrap(),
            vec!["Outcome"]
        );
    }

    #[test]
    fn test_contents_keep_parents_with_remaining_objects() {
        let backend = Arc::new(MemoryOnlyClusterStorage::new());
        let storage = TransactionalStorage::new(backend.clone());
        let item = ItemPath::new();
        for property in [Property::new("Name", "Widget"), Property::new("Type", "Part")] {
            backend.put(&item, &property.into(), None).unwrap();
        }

        let key = storage.begin().unwrap();
        storage.delete(&item, "Property/Name", Some(&key)).unwrap();

        assert_eq!(
            storage.get_cluster_contents(&item, "", Some(&key)).unwrap(),
            vec!["Property"]
        );
        assert_eq!(
            storage
                .get_cluster_contents(&item, "Property", Some(&key))
                .unwrap(),
            vec!["Type"]
        );
    }

    #[test]
    fn test_retry_waits_for_lock_release() {
        use std::thread;
        use std::time::Duration;

        let storage = Arc::new(TransactionalStorage::with_retry(
            Arc::new(MemoryOnlyClusterStorage::new()),
            RetryConfig {
                max_retries: 100,
                retry_delay_ms: 5,
                use_backoff: false,
            },
        ));
        let item = ItemPath::new();

        let first = storage.begin().unwrap();
        storage
            .put(&item, &Property::new("Name", "A").into(), Some(&first))
            .unwrap();

        let holder = Arc::clone(&storage);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            holder.commit(&first).unwrap();
        });

        let second = storage.begin().unwrap();
        storage
            .put(&item, &Property::new("Name", "B").into(), Some(&second))
            .unwrap();
        storage.commit(&second).unwrap();
        handle.join().unwrap();

        assert_eq!(
            property_value(storage.get(&item, "Property/Name", None).unwrap()),
            Some("B".to_string())
        );
    }

    #[test]
    fn test_invalid_delete_path() {
        let storage = TransactionalStorage::new(Arc::new(MemoryOnlyClusterStorage::new()));
        assert!(matches!(
            storage.delete(&ItemPath::new(), "Nowhere/x", None),
            Err(KernelError::InvalidPath(_))
        ));
    }
}
