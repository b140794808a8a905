//! Content store: where the editable copy of every item lives.
//!
//! The coordinator only needs get / put / delete / list by [`ItemId`]; the
//! filesystem implementation lays items out exactly as they appear in the
//! repository (`etl.yaml`, `skills/sql/joins.md`, ...).

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use dagsync_core::ItemId;

use crate::error::{io_err, SyncError};

/// Per-item content access used by the coordinator.
pub trait ContentStore: Send + Sync {
    /// Raw content, `None` when the item does not exist.
    fn get(&self, id: &ItemId) -> Result<Option<Vec<u8>>, SyncError>;

    fn put(&self, id: &ItemId, content: &[u8]) -> Result<(), SyncError>;

    /// Remove the item. Returns whether anything was removed.
    fn delete(&self, id: &ItemId) -> Result<bool, SyncError>;

    /// Every item currently present, sorted.
    fn list(&self) -> Result<Vec<ItemId>, SyncError>;
}

/// Items as plain files under one root directory.
#[derive(Debug, Clone)]
pub struct FsContentStore {
    root: PathBuf,
}

impl FsContentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, id: &ItemId) -> PathBuf {
        self.root.join(id.file_name())
    }
}

impl ContentStore for FsContentStore {
    fn get(&self, id: &ItemId) -> Result<Option<Vec<u8>>, SyncError> {
        let path = self.path_for(id);
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(io_err(path, err)),
        }
    }

    fn put(&self, id: &ItemId, content: &[u8]) -> Result<(), SyncError> {
        let path = self.path_for(id);
        let mut tmp = path.clone().into_os_string();
        tmp.push(".dagsync.tmp");
        atomic_write(&path, &PathBuf::from(tmp), content)
    }

    fn delete(&self, id: &ItemId) -> Result<bool, SyncError> {
        let path = self.path_for(id);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(io_err(path, err)),
        }
    }

    fn list(&self) -> Result<Vec<ItemId>, SyncError> {
        let mut ids = Vec::new();
        let mut dirs = vec![self.root.clone()];
        let mut cursor = 0;
        while cursor < dirs.len() {
            let current = dirs[cursor].clone();
            cursor += 1;
            let entries = match fs::read_dir(&current) {
                Ok(entries) => entries,
                Err(err) if err.kind() == ErrorKind::NotFound => continue,
                Err(err) => return Err(io_err(&current, err)),
            };
            for entry in entries {
                let entry = entry.map_err(|e| io_err(&current, e))?;
                let ty = entry.file_type().map_err(|e| io_err(entry.path(), e))?;
                let path = entry.path();
                if ty.is_dir() {
                    dirs.push(path);
                } else if ty.is_file() {
                    if let Some(id) = relative_id(&self.root, &path) {
                        ids.push(id);
                    }
                }
            }
        }
        ids.sort();
        Ok(ids)
    }
}

fn relative_id(root: &Path, path: &Path) -> Option<ItemId> {
    let relative = path.strip_prefix(root).ok()?;
    let segments = relative
        .components()
        .map(|c| c.as_os_str().to_str())
        .collect::<Option<Vec<_>>>()?;
    ItemId::from_file_name(&segments.join("/"))
}

/// Write `content` to `tmp`, then rename it over `path`.
fn atomic_write(path: &Path, tmp: &Path, content: &[u8]) -> Result<(), SyncError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }
    let written = fs::File::create(tmp).and_then(|mut file| {
        file.write_all(content)?;
        file.sync_all()
    });
    if let Err(e) = written {
        let _ = fs::remove_file(tmp);
        return Err(io_err(tmp, e));
    }
    if let Err(e) = fs::rename(tmp, path) {
        let _ = fs::remove_file(tmp);
        return Err(io_err(path, e));
    }
    Ok(())
}
