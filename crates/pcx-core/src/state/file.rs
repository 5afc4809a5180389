// # File State Store
//
// File-based implementation of StateStore with crash recovery.
//
// ## Purpose
//
// Persists the ID and attributes of every managed peering connection
// between runs. Losing a record makes the next `apply` create a duplicate
// connection, so every change is written through immediately.
//
// ## Crash Recovery
//
// - Atomic writes: write to `<path>.tmp`, then rename
// - Backup: the previous file is copied to `<path>.backup` before a write
// - Recovery: a file that fails to parse is replaced by the backup
//
// ## File Format
//
// ```json
// {
//   "version": "1.0",
//   "resources": {
//     "main": {
//       "state": {
//         "id": "pcx-0123456789abcdef0",
//         "accept_status": "active",
//         "vpc_id": "vpc-11111111",
//         "peer_vpc_id": "vpc-22222222",
//         ...
//       },
//       "last_updated": "2025-01-09T12:00:00Z"
//     }
//   }
// }
// ```

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

use crate::Error;
use crate::resource::PeeringConnectionState;
use crate::traits::state_store::{StateRecord, StateStore};

/// State file format version
const STATE_FILE_VERSION: &str = "1.0";

type Records = BTreeMap<String, StateRecord>;

/// File-based state store with crash recovery
///
/// # Example
///
/// ```rust,no_run
/// use pcx_core::state::FileStateStore;
/// use pcx_core::resource::PeeringConnectionState;
/// use pcx_core::traits::StateStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = FileStateStore::new("/var/lib/pcx/state.json").await?;
///
///     let state = PeeringConnectionState {
///         id: "pcx-1234".to_string(),
///         ..Default::default()
///     };
///     store.set_state("main", &state).await?;
///
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct FileStateStore {
    path: PathBuf,
    state: Arc<RwLock<FileState>>,
}

#[derive(Debug)]
struct FileState {
    records: Records,
    dirty: bool,
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct StateFileFormat {
    version: String,
    resources: Records,
}

/// Why a state file could not be loaded
enum LoadError {
    /// Unreadable file; not recoverable from backup
    Read(Error),
    /// Readable but not a valid state file
    Corrupt(Error),
}

impl FileStateStore {
    /// Create or load a file state store
    ///
    /// Creates the parent directory when missing. A corrupted state file is
    /// restored from its backup; when the backup is unusable too, the store
    /// starts empty.
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).await.map_err(|e| {
                    Error::config(format!(
                        "Failed to create state directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let records = Self::load_with_recovery(&path).await?;

        Ok(Self {
            path,
            state: Arc::new(RwLock::new(FileState {
                records,
                dirty: false,
            })),
        })
    }

    async fn load_with_recovery(path: &Path) -> Result<Records, Error> {
        let err = match Self::load(path).await {
            Ok(records) => {
                tracing::debug!("Loaded state from file: {} resources", records.len());
                return Ok(records);
            }
            Err(LoadError::Read(e)) => return Err(e),
            Err(LoadError::Corrupt(e)) => e,
        };

        tracing::warn!(
            "State file appears corrupted: {}. Attempting recovery from backup.",
            err
        );

        let backup_path = Self::backup_path(path);
        if !backup_path.exists() {
            tracing::warn!("No backup file found. Starting with empty state.");
            return Ok(Records::new());
        }

        match Self::load(&backup_path).await {
            Ok(records) => {
                tracing::info!("Recovered state from backup: {} resources", records.len());
                if let Err(e) = Self::restore_from_backup(path, &backup_path).await {
                    tracing::error!("Failed to restore state file from backup: {}", e);
                }
                Ok(records)
            }
            Err(LoadError::Read(e)) | Err(LoadError::Corrupt(e)) => {
                tracing::error!("Backup also unusable: {}. Starting with empty state.", e);
                Ok(Records::new())
            }
        }
    }

    async fn load(path: &Path) -> Result<Records, LoadError> {
        if !path.exists() {
            tracing::debug!("State file does not exist: {}", path.display());
            return Ok(Records::new());
        }

        let content = fs::read_to_string(path).await.map_err(|e| {
            LoadError::Read(Error::state_store(format!(
                "Failed to read state file {}: {}",
                path.display(),
                e
            )))
        })?;

        let state_file: StateFileFormat = serde_json::from_str(&content).map_err(|e| {
            LoadError::Corrupt(Error::state_store(format!(
                "Failed to parse state file {}: {}",
                path.display(),
                e
            )))
        })?;

        if state_file.version != STATE_FILE_VERSION {
            tracing::warn!(
                "State file version mismatch: expected {}, got {}. Attempting to load anyway.",
                STATE_FILE_VERSION,
                state_file.version
            );
        }

        Ok(state_file.resources)
    }

    /// Write all records to disk atomically
    async fn write_state(&self) -> Result<(), Error> {
        let mut guard = self.state.write().await;

        let state_file = StateFileFormat {
            version: STATE_FILE_VERSION.to_string(),
            resources: guard.records.clone(),
        };
        let json = serde_json::to_string_pretty(&state_file)
            .map_err(|e| Error::state_store(format!("Failed to serialize state: {}", e)))?;

        let temp_path = self.temp_path();
        let write_err = |action: &str, e: std::io::Error| {
            Error::state_store(format!(
                "Failed to {} temp file {}: {}",
                action,
                temp_path.display(),
                e
            ))
        };
        {
            let mut file = fs::File::create(&temp_path)
                .await
                .map_err(|e| write_err("create", e))?;
            file.write_all(json.as_bytes())
                .await
                .map_err(|e| write_err("write", e))?;
            file.flush().await.map_err(|e| write_err("flush", e))?;
        }

        if self.path.exists() {
            let backup_path = Self::backup_path(&self.path);
            if let Err(e) = fs::copy(&self.path, &backup_path).await {
                tracing::warn!("Failed to create backup: {}", e);
            }
        }

        fs::rename(&temp_path, &self.path).await.map_err(|e| {
            Error::state_store(format!(
                "Failed to rename {} to {}: {}",
                temp_path.display(),
                self.path.display(),
                e
            ))
        })?;

        guard.dirty = false;
        tracing::trace!("State written to file: {}", self.path.display());
        Ok(())
    }

    async fn restore_from_backup(path: &Path, backup_path: &Path) -> Result<(), Error> {
        fs::copy(backup_path, path).await.map_err(|e| {
            Error::state_store(format!(
                "Failed to restore from backup {} to {}: {}",
                backup_path.display(),
                path.display(),
                e
            ))
        })?;

        tracing::info!("Restored state file from backup");
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut temp = self.path.clone();
        temp.set_extension("tmp");
        temp
    }

    fn backup_path(path: &Path) -> PathBuf {
        let mut backup = path.to_path_buf();
        backup.set_extension("backup");
        backup
    }

    /// Path of the state file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn get_record(&self, name: &str) -> Result<Option<StateRecord>, Error> {
        let guard = self.state.read().await;
        Ok(guard.records.get(name).cloned())
    }

    async fn set_state(&self, name: &str, state: &PeeringConnectionState) -> Result<(), Error> {
        {
            let mut guard = self.state.write().await;
            guard
                .records
                .insert(name.to_string(), StateRecord::new(state.clone()));
            guard.dirty = true;
        }

        self.write_state().await
    }

    async fn delete_record(&self, name: &str) -> Result<(), Error> {
        {
            let mut guard = self.state.write().await;
            if guard.records.remove(name).is_none() {
                return Ok(());
            }
            guard.dirty = true;
        }

        self.write_state().await
    }

    async fn list_records(&self) -> Result<Vec<String>, Error> {
        let guard = self.state.read().await;
        Ok(guard.records.keys().cloned().collect())
    }

    async fn flush(&self) -> Result<(), Error> {
        let dirty = self.state.read().await.dirty;
        if dirty {
            self.write_state().await
        } else {
            Ok(())
        }
    }
}
