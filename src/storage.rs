use std::{
    collections::HashMap,
    fs::{self, File},
    io::{self, Write},
    path::{Path, PathBuf},
};

use chrono::Local;
use directories::ProjectDirs;
use log::{debug, warn};
use serde::{Serialize, de::DeserializeOwned};

use crate::{
    constants::{DOCUMENT_KEYS, PROJECT_DIRS, TIME_SETTINGS},
    entity::{CategoriesDocument, TrackManagerEntity},
    error::StorageError,
};

/// Whole-document byte storage addressed by key.
pub trait Store {
    /// Returns `None` when no document is stored under `key`.
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;
    fn write(&mut self, key: &str, bytes: &[u8]) -> Result<(), StorageError>;
    fn exists(&self, key: &str) -> Result<bool, StorageError>;
}

/// One file per key inside a directory. Writes replace the file atomically
/// and keep rotating copies of previous versions under `backups/`.
#[derive(Clone, Debug)]
pub struct FileStore {
    root: PathBuf,
    backups_kept: usize,
}

impl FileStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|source| io_error(&root, source))?;
        Ok(Self {
            root,
            backups_kept: TIME_SETTINGS.backups_kept,
        })
    }

    pub fn with_backups_kept(mut self, backups_kept: usize) -> Self {
        self.backups_kept = backups_kept;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        if key.is_empty() || key.contains(['/', '\\']) || key == "." || key == ".." {
            return Err(StorageError::Io {
                key: key.to_string(),
                source: io::Error::new(io::ErrorKind::InvalidInput, "invalid document key"),
            });
        }
        Ok(self.root.join(key))
    }
}

impl Store for FileStore {
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let path = self.path_for(key)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StorageError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }

    fn write(&mut self, key: &str, bytes: &[u8]) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        atomic_write(&path, bytes, self.backups_kept).map_err(|source| StorageError::Io {
            key: key.to_string(),
            source,
        })
    }

    fn exists(&self, key: &str) -> Result<bool, StorageError> {
        let path = self.path_for(key)?;
        path.try_exists().map_err(|source| StorageError::Io {
            key: key.to_string(),
            source,
        })
    }
}

#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    documents: HashMap<String, Vec<u8>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemoryStore {
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.documents.get(key).cloned())
    }

    fn write(&mut self, key: &str, bytes: &[u8]) -> Result<(), StorageError> {
        self.documents.insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    fn exists(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.documents.contains_key(key))
    }
}

/// Every kind of document this crate persists.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Snapshot {
    Categories(CategoriesDocument),
    TrackManager(TrackManagerEntity),
}

impl Snapshot {
    pub fn key(&self) -> &'static str {
        match self {
            Snapshot::Categories(_) => DOCUMENT_KEYS.categories,
            Snapshot::TrackManager(_) => DOCUMENT_KEYS.tracks,
        }
    }
}

pub fn persist(store: &mut dyn Store, snapshot: &Snapshot) -> Result<(), StorageError> {
    let key = snapshot.key();
    match snapshot {
        Snapshot::Categories(document) => write_json(store, key, document),
        Snapshot::TrackManager(entity) => write_json(store, key, entity),
    }
}

pub fn load_categories(store: &dyn Store) -> Result<Option<CategoriesDocument>, StorageError> {
    read_json(store, DOCUMENT_KEYS.categories)
}

pub fn load_track_manager(store: &dyn Store) -> Result<Option<TrackManagerEntity>, StorageError> {
    read_json(store, DOCUMENT_KEYS.tracks)
}

pub fn read_json<T: DeserializeOwned>(
    store: &dyn Store,
    key: &str,
) -> Result<Option<T>, StorageError> {
    let Some(bytes) = store.read(key)? else {
        debug!("event=document_read module=storage status=absent key={}", key);
        return Ok(None);
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|source| StorageError::Json {
            key: key.to_string(),
            source,
        })
}

pub fn write_json<T: Serialize>(
    store: &mut dyn Store,
    key: &str,
    value: &T,
) -> Result<(), StorageError> {
    let json = serde_json::to_vec_pretty(value).map_err(|source| StorageError::Json {
        key: key.to_string(),
        source,
    })?;
    store.write(key, &json)?;
    debug!(
        "event=document_write module=storage status=ok key={} bytes={}",
        key,
        json.len()
    );
    Ok(())
}

pub fn get_data_dir() -> PathBuf {
    let local_categories = Path::new(".").join(DOCUMENT_KEYS.categories);
    if local_categories.exists() {
        return PathBuf::from(".");
    }

    match project_dirs() {
        Some(proj_dirs) => proj_dirs.data_dir().to_path_buf(),
        None => PathBuf::from("."),
    }
}

pub fn get_config_dir() -> PathBuf {
    match project_dirs() {
        Some(proj_dirs) => proj_dirs.config_dir().to_path_buf(),
        None => PathBuf::from("."),
    }
}

pub fn get_log_dir() -> PathBuf {
    match project_dirs() {
        Some(proj_dirs) => match proj_dirs.state_dir() {
            Some(state_dir) => state_dir.join("logs"),
            None => proj_dirs.data_local_dir().join("logs"),
        },
        None => PathBuf::from("./logs"),
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from(
        PROJECT_DIRS.qualifier,
        PROJECT_DIRS.organization,
        PROJECT_DIRS.application,
    )
}

pub fn create_backup(path: &Path, backups_kept: usize) -> io::Result<()> {
    if !path.exists() {
        return Ok(());
    }

    let backup_dir = path.parent().unwrap_or(Path::new(".")).join("backups");
    fs::create_dir_all(&backup_dir)?;

    let timestamp = Local::now().format("%Y%m%d_%H%M%S");
    let filename = format!(
        "{}.{}",
        path.file_name().unwrap_or_default().to_string_lossy(),
        timestamp
    );
    fs::copy(path, backup_dir.join(&filename))?;

    let stem = path.file_name().unwrap_or_default().to_string_lossy();
    let mut backups: Vec<_> = fs::read_dir(&backup_dir)?
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().starts_with(&*stem))
        .collect();
    backups.sort_by_key(|e| {
        (
            e.metadata().ok().and_then(|m| m.modified().ok()),
            e.file_name(),
        )
    });

    while backups.len() > backups_kept {
        let oldest = backups.remove(0);
        if let Err(err) = fs::remove_file(oldest.path()) {
            warn!(
                "event=backup_prune module=storage status=error path={} error={}",
                oldest.path().display(),
                err
            );
        }
    }

    Ok(())
}

pub fn atomic_write(path: &Path, content: &[u8], backups_kept: usize) -> io::Result<()> {
    if backups_kept > 0 && path.exists() {
        create_backup(path, backups_kept)?;
    }

    let tmp_path = path.with_extension("tmp");
    let mut tmp_file = File::create(&tmp_path)?;
    tmp_file.write_all(content)?;
    tmp_file.sync_all()?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}

fn io_error(path: &Path, source: io::Error) -> StorageError {
    StorageError::Io {
        key: path.display().to_string(),
        source,
    }
}
