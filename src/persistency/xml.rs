//! # XML file cluster storage
//!
//! Stores each local object as one XML file below a root directory, in one directory per
//! item. In directory mode the cluster path maps onto nested directories
//! (`<root>/<uuid>/Outcome/Invoice/0/12.xml`); in flat mode it maps onto a dotted file name
//! (`<root>/<uuid>/Outcome.Invoice.0.12.xml`), which requires path segments free of dots.

use crate::error::{KernelError, Result};
use crate::lookup::ItemPath;
use crate::persistency::cluster::{ClusterType, child_name, normalize_path, split_path_and_name};
use crate::persistency::object::LocalObject;
use crate::persistency::storage::{Capability, ClusterStorage, TransactionKey};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use uuid::Uuid;

fn default_true() -> bool {
    true
}

fn default_extension() -> String {
    ".xml".to_string()
}

/// Configuration of an XML file storage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct XmlStorageConfig {
    /// Directory holding one sub-directory per item
    pub root: PathBuf,
    /// Map path segments onto directories (true) or onto a dotted file name (false)
    #[serde(default = "default_true")]
    pub use_directories: bool,
    #[serde(default = "default_extension")]
    pub file_extension: String,
    #[serde(default)]
    pub id: Option<String>,
}

impl XmlStorageConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            use_directories: true,
            file_extension: default_extension(),
            id: None,
        }
    }
}

pub struct XmlClusterStorage {
    id: String,
    root: PathBuf,
    use_directories: bool,
    extension: String,
}

impl XmlClusterStorage {
    /// Open the storage, creating the root directory when needed
    pub fn open(config: XmlStorageConfig) -> Result<Self> {
        fs::create_dir_all(&config.root).map_err(|e| {
            KernelError::Io(format!(
                "Cannot create XML storage root {}: {}",
                config.root.display(),
                e
            ))
        })?;

        info!(
            "XML storage opened at {} (directories: {})",
            config.root.display(),
            config.use_directories
        );

        Ok(Self {
            id: config.id.unwrap_or_else(|| "xml".to_string()),
            root: config.root,
            use_directories: config.use_directories,
            extension: config.file_extension,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn item_dir(&self, item: &ItemPath) -> PathBuf {
        self.root.join(item.to_string())
    }

    fn segments(path: &str) -> Result<Vec<&str>> {
        let path = normalize_path(path);
        if path.is_empty() {
            return Ok(Vec::new());
        }

        // leading dots are reserved for temporary files
        let segments: Vec<&str> = path.split('/').collect();
        if segments
            .iter()
            .any(|s| s.is_empty() || s.starts_with('.') || s.contains('\\'))
        {
            return Err(KernelError::InvalidPath(format!(
                "'{}' cannot be mapped to a file",
                path
            )));
        }
        Ok(segments)
    }

    fn dir_path(&self, item: &ItemPath, path: &str) -> Result<PathBuf> {
        let mut dir = self.item_dir(item);
        for segment in Self::segments(path)? {
            dir.push(segment);
        }
        Ok(dir)
    }

    fn file_path(&self, item: &ItemPath, path: &str) -> Result<PathBuf> {
        let segments = Self::segments(path)?;
        let Some((name, parents)) = segments.split_last() else {
            return Err(KernelError::InvalidPath(
                "an object path cannot be empty".to_string(),
            ));
        };

        if self.use_directories {
            let mut file = self.item_dir(item);
            for segment in parents {
                file.push(segment);
            }
            file.push(format!("{}{}", name, self.extension));
            Ok(file)
        } else {
            if segments.iter().any(|s| s.contains('.')) {
                return Err(KernelError::InvalidPath(format!(
                    "'{}' cannot be stored in a flat layout",
                    segments.join("/")
                )));
            }
            Ok(self
                .item_dir(item)
                .join(format!("{}{}", segments.join("."), self.extension)))
        }
    }

    fn read_dir_names(dir: &Path) -> Result<Vec<(String, bool)>> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(KernelError::from_io(e)),
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(KernelError::from_io)?;
            let is_dir = entry.file_type().map_err(KernelError::from_io)?.is_dir();
            if let Some(name) = entry.file_name().to_str() {
                // temporary files; object names never start with a dot
                if name.starts_with('.') {
                    continue;
                }
                names.push((name.to_string(), is_dir));
            }
        }
        Ok(names)
    }

    /// Remove empty directories from `dir` up to and including the item directory
    fn prune_empty_dirs(&self, item: &ItemPath, mut dir: PathBuf) {
        let item_dir = self.item_dir(item);
        while dir.starts_with(&item_dir) {
            if fs::remove_dir(&dir).is_err() {
                break;
            }
            debug!("Pruned empty directory {}", dir.display());
            if !dir.pop() {
                break;
            }
        }
    }
}

impl ClusterStorage for XmlClusterStorage {
    fn name(&self) -> &str {
        "XML File Cluster Storage"
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn query_cluster_support(&self, _cluster: ClusterType) -> Capability {
        Capability::ReadWrite
    }

    fn get_cluster_contents(&self, item: &ItemPath, path: &str) -> Result<Vec<String>> {
        let mut names = BTreeSet::new();

        if self.use_directories {
            for (name, is_dir) in Self::read_dir_names(&self.dir_path(item, path)?)? {
                if is_dir {
                    names.insert(name);
                } else if let Some(stem) = name.strip_suffix(&self.extension) {
                    names.insert(stem.to_string());
                }
            }
        } else {
            Self::segments(path)?;
            for (name, is_dir) in Self::read_dir_names(&self.item_dir(item))? {
                if is_dir {
                    continue;
                }
                let Some(stem) = name.strip_suffix(&self.extension) else {
                    continue;
                };
                let logical = stem.replace('.', "/");
                if let Some(child) = child_name(path, &logical) {
                    names.insert(child.to_string());
                }
            }
        }

        Ok(names.into_iter().collect())
    }

    fn get(
        &self,
        item: &ItemPath,
        path: &str,
        _key: Option<&TransactionKey>,
    ) -> Result<Option<LocalObject>> {
        let file = self.file_path(item, path)?;
        let xml = match fs::read_to_string(&file) {
            Ok(xml) => xml,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(KernelError::Io(format!(
                    "Cannot read {}: {}",
                    file.display(),
                    e
                )));
            }
        };

        LocalObject::from_xml(path, &xml).map(Some)
    }

    fn put(
        &self,
        item: &ItemPath,
        object: &LocalObject,
        _key: Option<&TransactionKey>,
    ) -> Result<()> {
        let path = object.cluster_path();
        let file = self.file_path(item, &path)?;
        let xml = object.to_xml()?;

        let dir = file
            .parent()
            .ok_or_else(|| KernelError::InvalidPath(format!("no directory for '{}'", path)))?;
        fs::create_dir_all(dir).map_err(KernelError::from_io)?;

        // write next to the target, then move into place
        let (_, name) = split_path_and_name(&path);
        let temp = dir.join(format!(".{}.{}.tmp", name, Uuid::new_v4().simple()));
        fs::write(&temp, xml.as_bytes()).map_err(KernelError::from_io)?;
        if let Err(e) = fs::rename(&temp, &file) {
            let _ = fs::remove_file(&temp);
            return Err(KernelError::from_io(e));
        }

        debug!("XML storage {}: wrote {}", self.id, file.display());
        Ok(())
    }

    fn delete(&self, item: &ItemPath, path: &str, _key: Option<&TransactionKey>) -> Result<()> {
        let file = self.file_path(item, path)?;
        match fs::remove_file(&file) {
            Ok(()) => debug!("XML storage {}: deleted {}", self.id, file.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!(
                    "XML storage {}: nothing to delete at {}",
                    self.id,
                    file.display()
                );
                return Ok(());
            }
            Err(e) => return Err(KernelError::from_io(e)),
        }

        if let Some(dir) = file.parent() {
            self.prune_empty_dirs(item, dir.to_path_buf());
        }
        Ok(())
    }
}
