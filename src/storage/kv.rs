use std::collections::HashMap as StdHashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use tracing::{error, warn};

/// Durable client-side string store, the process-wide equivalent of browser
/// `localStorage`. Session fields, the OTP session and cache entries all live here.
pub trait KvStorage: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> anyhow::Result<()>;
    fn remove(&self, key: &str);
    fn keys(&self) -> Vec<String>;
}

pub type SharedStorage = Arc<dyn KvStorage>;

/// Volatile store; contents vanish with the process.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    map: Arc<parking_lot::RwLock<StdHashMap<String, String>>>,
}

impl MemoryStorage {
    pub fn new() -> Self { Self::default() }
    pub fn shared() -> SharedStorage { Arc::new(Self::new()) }
}

impl KvStorage for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> { self.map.read().get(key).cloned() }
    fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.map.write().insert(key.to_string(), value.to_string());
        Ok(())
    }
    fn remove(&self, key: &str) { self.map.write().remove(key); }
    fn keys(&self) -> Vec<String> { self.map.read().keys().cloned().collect() }
}

/// Store backed by a single JSON object file. Every mutation rewrites the file
/// through a temp file + rename so a crash never leaves a torn snapshot.
pub struct FileStorage {
    path: PathBuf,
    map: parking_lot::RwLock<StdHashMap<String, String>>,
}

impl FileStorage {
    /// Open (or create) the store at `path`. An unreadable or corrupt file is
    /// logged and replaced by an empty store on the next write.
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir)
                    .with_context(|| format!("creating storage directory {}", dir.display()))?;
            }
        }
        let map = match std::fs::read(&path) {
            Ok(bytes) => serde_json::from_slice::<StdHashMap<String, String>>(&bytes).unwrap_or_else(|e| {
                warn!(target: "panel_client::storage", "discarding corrupt store {}: {}", path.display(), e);
                StdHashMap::new()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => StdHashMap::new(),
            Err(e) => return Err(e).with_context(|| format!("reading {}", path.display())),
        };
        Ok(Self { path, map: parking_lot::RwLock::new(map) })
    }

    pub fn shared(path: impl AsRef<Path>) -> anyhow::Result<SharedStorage> {
        Ok(Arc::new(Self::open(path)?))
    }

    pub fn path(&self) -> &Path { &self.path }

    fn persist(&self, map: &StdHashMap<String, String>) -> anyhow::Result<()> {
        let bytes = serde_json::to_vec_pretty(map)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, bytes).with_context(|| format!("writing {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path).with_context(|| format!("replacing {}", self.path.display()))?;
        Ok(())
    }
}

impl KvStorage for FileStorage {
    fn get(&self, key: &str) -> Option<String> { self.map.read().get(key).cloned() }

    fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        let mut map = self.map.write();
        map.insert(key.to_string(), value.to_string());
        self.persist(&map)
    }

    fn remove(&self, key: &str) {
        let mut map = self.map.write();
        if map.remove(key).is_some() {
            if let Err(e) = self.persist(&map) {
                error!(target: "panel_client::storage", "failed to persist removal of {}: {:#}", key, e);
            }
        }
    }

    fn keys(&self) -> Vec<String> { self.map.read().keys().cloned().collect() }
}
