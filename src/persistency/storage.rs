use crate::error::Result;
use crate::lookup::ItemPath;
use crate::persistency::cluster::ClusterType;
use crate::persistency::object::LocalObject;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// What a storage can do with a given cluster type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Capability {
    None,
    Read,
    Write,
    ReadWrite,
}

impl Capability {
    pub fn can_read(&self) -> bool {
        matches!(self, Capability::Read | Capability::ReadWrite)
    }

    pub fn can_write(&self) -> bool {
        matches!(self, Capability::Write | Capability::ReadWrite)
    }
}

/// Identifier of a transaction
///
/// Keys are time-ordered so that logs and lock dumps sort by creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionKey(Uuid);

impl TransactionKey {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for TransactionKey {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransactionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Pluggable backend storing the local objects of items
///
/// Paths are cluster paths relative to the item (see [`crate::persistency::cluster`]).
/// Backends without transactions of their own inherit the no-op `begin`/`commit`/`abort`.
pub trait ClusterStorage: Send + Sync {
    /// Human readable name
    fn name(&self) -> &str;

    /// Stable identifier, used in configuration and logs
    fn id(&self) -> &str;

    fn query_cluster_support(&self, cluster: ClusterType) -> Capability;

    fn begin(&self, _key: &TransactionKey) -> Result<()> {
        Ok(())
    }

    fn commit(&self, _key: &TransactionKey) -> Result<()> {
        Ok(())
    }

    fn abort(&self, _key: &TransactionKey) -> Result<()> {
        Ok(())
    }

    /// Sorted names of the direct children of `path`
    ///
    /// The empty path lists the clusters present on the item.
    fn get_cluster_contents(&self, item: &ItemPath, path: &str) -> Result<Vec<String>>;

    /// Object stored at `path`, `None` when there is none
    fn get(
        &self,
        item: &ItemPath,
        path: &str,
        key: Option<&TransactionKey>,
    ) -> Result<Option<LocalObject>>;

    /// Store the object at its own cluster path, replacing what was there
    fn put(&self, item: &ItemPath, object: &LocalObject, key: Option<&TransactionKey>)
    -> Result<()>;

    /// Remove the object at `path`; removing nothing is not an error
    fn delete(&self, item: &ItemPath, path: &str, key: Option<&TransactionKey>) -> Result<()>;

    /// Largest integer child name below `path`, or -1
    fn get_last_integer_id(&self, item: &ItemPath, path: &str) -> Result<i32> {
        let contents = self.get_cluster_contents(item, path)?;
        Ok(last_integer_id(contents.iter().map(String::as_str)))
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Largest name that parses as an integer, or -1
pub fn last_integer_id<'a>(names: impl IntoIterator<Item = &'a str>) -> i32 {
    names
        .into_iter()
        .filter_map(|name| name.parse::<i32>().ok())
        .max()
        .unwrap_or(-1)
}
