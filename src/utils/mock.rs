use std::{
    fs,
    path::PathBuf,
    sync::atomic::{AtomicUsize, Ordering},
    time::{SystemTime, UNIX_EPOCH},
};

use tempfile::env::temp_dir;

use crate::{storage::kv_store::KvStore, types::error::Result};

static NEXT_TEMP_ID: AtomicUsize = AtomicUsize::new(0);

pub fn get_unix_timestamp_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis())
        .unwrap_or(0)
}

pub fn create_temp_db_path() -> PathBuf {
    create_temp_db_path_with_prefix("pagekv_test")
}

// pid and counter keep paths unique across parallel tests
pub fn create_temp_db_path_with_prefix(prefix: &str) -> PathBuf {
    let mut temp_path = temp_dir();
    temp_path.push(format!(
        "{}_{}_{}_{}.db",
        prefix,
        std::process::id(),
        NEXT_TEMP_ID.fetch_add(1, Ordering::Relaxed),
        get_unix_timestamp_millis()
    ));
    temp_path
}

/// Database file in the temp directory, removed on drop.
pub struct TempDatabase {
    pub path: PathBuf,
    pub kv_store: Option<KvStore>,
}

impl TempDatabase {
    pub fn new() -> Self {
        Self {
            path: create_temp_db_path(),
            kv_store: None,
        }
    }

    pub fn with_prefix(prefix: &str) -> Self {
        Self {
            path: create_temp_db_path_with_prefix(prefix),
            kv_store: None,
        }
    }

    /// Opens (or reopens) the store, dropping any previously opened handle first.
    pub fn open_kv_store(&mut self) -> Result<&mut KvStore> {
        self.kv_store = None;
        let store = KvStore::open(&self.path)?;
        Ok(self.kv_store.insert(store))
    }
}

impl Default for TempDatabase {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TempDatabase {
    fn drop(&mut self) {
        self.kv_store = None;
        if self.path.exists() {
            let _ = fs::remove_file(&self.path);
        }
    }
}
