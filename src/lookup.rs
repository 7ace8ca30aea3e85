//! # Item identity
//!
//! Every business entity (and every agent) is addressed by the UUID of its item.

use crate::error::{KernelError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// UUID-based address of an item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemPath(Uuid);

impl ItemPath {
    /// Generate a fresh random item path
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ItemPath {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ItemPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for ItemPath {
    type Err = KernelError;

    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|e| KernelError::InvalidData(format!("'{}' is not an item UUID: {}", s, e)))
    }
}

impl From<Uuid> for ItemPath {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}
