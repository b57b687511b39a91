//! Local persisted key-value store.
//!
//! Holds cookie consent, anonymous display preferences, the last view, the
//! refresh token and per-identity notification watermarks. Backed by one
//! JSON file written atomically (temp file + rename). A missing key means
//! "unset, use the default".

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use idyll_core::types::EntityId;

const STATE_FILE: &str = "state.json";

/// Well-known keys.
pub mod keys {
    use super::EntityId;

    pub const COOKIE_CONSENT: &str = "idyll_cookie_consent";
    pub const THEME: &str = "idyll_theme";
    pub const SOUND_ENABLED: &str = "idyll_sound_enabled";
    pub const LAST_VIEW: &str = "idyll_last_view";
    pub const REFRESH_TOKEN: &str = "idyll_refresh_token";

    /// Per-identity notification watermark.
    pub fn notification_watermark(user_id: EntityId) -> String {
        format!("lastNotificationCheck:{user_id}")
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LocalStoreError {
    #[error("Local state I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Local state could not be encoded: {0}")]
    Encode(#[from] serde_json::Error),
}

pub struct LocalStore {
    path: Option<PathBuf>,
    entries: Mutex<BTreeMap<String, String>>,
}

impl LocalStore {
    /// Open (or create) the store under `dir`. A corrupt file is discarded.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, LocalStoreError> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        let path = dir.join(STATE_FILE);
        let entries = match std::fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str(&text).unwrap_or_else(|e| {
                tracing::warn!(path = %path.display(), error = %e, "Discarding corrupt local state");
                BTreeMap::new()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path: Some(path),
            entries: Mutex::new(entries),
        })
    }

    /// A store that is never written to disk.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            entries: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.lock().get(key).cloned()
    }

    pub fn set(&self, key: &str, value: impl Into<String>) {
        let mut entries = self.lock();
        entries.insert(key.to_string(), value.into());
        self.persist(&entries);
    }

    pub fn remove(&self, key: &str) {
        let mut entries = self.lock();
        if entries.remove(key).is_some() {
            self.persist(&entries);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, String>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Write failures are logged; the in-memory value still applies.
    fn persist(&self, entries: &BTreeMap<String, String>) {
        let Some(path) = &self.path else {
            return;
        };
        if let Err(e) = write_atomic(path, entries) {
            tracing::warn!(path = %path.display(), error = %e, "Failed to persist local state");
        }
    }
}

fn write_atomic(path: &Path, entries: &BTreeMap<String, String>) -> Result<(), LocalStoreError> {
    let json = serde_json::to_vec_pretty(entries)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}
