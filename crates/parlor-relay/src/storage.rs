//! Ban list persistence.
//!
//! The ban list is a single JSON object whose keys are banned origin
//! addresses (`{"10.0.0.5": true}`). It is loaded once at startup and
//! rewritten in full, synchronously, on every change.

use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("ban file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ban file encoding error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Persistent set of banned origin addresses.
pub struct BanStore {
    path: PathBuf,
    banned: Mutex<BTreeSet<String>>,
}

impl BanStore {
    /// Load the ban file at `path`.
    ///
    /// A missing file starts an empty list. An unreadable or malformed file
    /// is logged and also starts empty; the next change overwrites it.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let banned = match load(&path) {
            Ok(Some(set)) => {
                info!("Loaded {} banned address(es) from {}", set.len(), path.display());
                set
            }
            Ok(None) => {
                info!("No ban file at {}, starting with an empty ban list", path.display());
                BTreeSet::new()
            }
            Err(e) => {
                warn!("Ignoring unreadable ban file {}: {e}", path.display());
                BTreeSet::new()
            }
        };
        Self {
            path,
            banned: Mutex::new(banned),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_banned(&self, address: &str) -> bool {
        self.banned.lock().unwrap().contains(address)
    }

    /// Ban an address. `Ok(false)` if it was already banned (nothing written).
    ///
    /// On `Err` the ban is in effect in memory but the file was not
    /// rewritten, so it will be lost on restart.
    pub fn ban(&self, address: &str) -> Result<bool, StorageError> {
        let mut banned = self.banned.lock().unwrap();
        if !banned.insert(address.to_string()) {
            return Ok(false);
        }
        persist(&self.path, &banned)?;
        Ok(true)
    }

    /// Lift a ban. `Ok(false)` if the address was not banned.
    ///
    /// On `Err` the ban is lifted in memory only.
    pub fn unban(&self, address: &str) -> Result<bool, StorageError> {
        let mut banned = self.banned.lock().unwrap();
        if !banned.remove(address) {
            return Ok(false);
        }
        persist(&self.path, &banned)?;
        Ok(true)
    }

    /// Banned addresses, sorted.
    pub fn list(&self) -> Vec<String> {
        self.banned.lock().unwrap().iter().cloned().collect()
    }
}

fn load(path: &Path) -> Result<Option<BTreeSet<String>>, StorageError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    // Values are not interpreted; every key is a banned address.
    let map: HashMap<String, serde_json::Value> = serde_json::from_slice(&bytes)?;
    Ok(Some(map.into_keys().collect()))
}

/// Rewrite the whole file via a temp file + rename so a crash mid-write
/// leaves the previous list intact.
fn persist(path: &Path, banned: &BTreeSet<String>) -> Result<(), StorageError> {
    let map: serde_json::Map<String, serde_json::Value> = banned
        .iter()
        .map(|addr| (addr.clone(), serde_json::Value::Bool(true)))
        .collect();
    let json = serde_json::to_vec_pretty(&map)?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json)?;
    fs::rename(&tmp, path)?;
    Ok(())
}
