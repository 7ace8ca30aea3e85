//! # Cluster types and cluster paths
//!
//! Local objects of an item live in a slash-separated namespace. The first segment of every
//! path names the cluster the object belongs to:
//!
//! - `Property/Name`
//! - `LifeCycle/workflow`
//! - `AuditTrail/12`
//! - `ViewPoint/Schema/last`
//! - `Outcome/Schema/0/12`
//! - `Collection/Contents/last`
//! - `Job/3`

use serde::{Deserialize, Serialize};
use std::fmt;

/// Partition of an item's storage namespace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ClusterType {
    Property,
    Lifecycle,
    History,
    Viewpoint,
    Outcome,
    Collection,
    Job,
}

impl ClusterType {
    pub const ALL: [ClusterType; 7] = [
        ClusterType::Property,
        ClusterType::Lifecycle,
        ClusterType::History,
        ClusterType::Viewpoint,
        ClusterType::Outcome,
        ClusterType::Collection,
        ClusterType::Job,
    ];

    /// Path segment used for this cluster
    pub fn name(&self) -> &'static str {
        match self {
            ClusterType::Property => "Property",
            ClusterType::Lifecycle => "LifeCycle",
            ClusterType::History => "AuditTrail",
            ClusterType::Viewpoint => "ViewPoint",
            ClusterType::Outcome => "Outcome",
            ClusterType::Collection => "Collection",
            ClusterType::Job => "Job",
        }
    }

    pub fn from_name(name: &str) -> Option<ClusterType> {
        ClusterType::ALL.into_iter().find(|c| c.name() == name)
    }
}

impl fmt::Display for ClusterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Strip leading and trailing slashes
pub fn normalize_path(path: &str) -> &str {
    path.trim_matches('/')
}

/// Cluster type named by the first segment of a path
pub fn cluster_type_of(path: &str) -> Option<ClusterType> {
    let path = normalize_path(path);
    let first = path.split('/').next().unwrap_or_default();
    ClusterType::from_name(first)
}

/// Split a path into its parent and its last segment
///
/// A single-segment path has an empty parent.
pub fn split_path_and_name(path: &str) -> (&str, &str) {
    let path = normalize_path(path);
    match path.rfind('/') {
        Some(idx) => (&path[..idx], &path[idx + 1..]),
        None => ("", path),
    }
}

/// First segment of `full` below `parent`, if `full` lies below `parent`
///
/// An empty parent is the item root, so the result is the cluster name.
pub fn child_name<'a>(parent: &str, full: &'a str) -> Option<&'a str> {
    let parent = normalize_path(parent);
    let full = normalize_path(full);

    let rest = if parent.is_empty() {
        full
    } else {
        full.strip_prefix(parent)?.strip_prefix('/')?
    };

    rest.split('/').next().filter(|name| !name.is_empty())
}
