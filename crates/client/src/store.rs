// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Credential storage: a durable key/value backend plus the token-kind layer
//! that fans access-token writes out to every legacy key.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, warn};

/// Durable string key/value storage.
///
/// Implementations log their own persistence failures; callers treat every
/// operation as infallible.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str);
    fn remove(&self, key: &str);
}

/// In-memory store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw view of every stored key (for assertions).
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.entries.lock().clone()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        self.entries.lock().insert(key.to_owned(), value.to_owned());
    }

    fn remove(&self, key: &str) {
        self.entries.lock().remove(key);
    }
}

/// JSON-file-backed store. Reads are served from memory; every write
/// rewrites the file atomically.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileStore {
    /// Open (or lazily create) the store at `path`.
    ///
    /// A missing file is an empty store. An unreadable or unparsable file is
    /// logged and also treated as empty; it is replaced on the next write.
    pub fn open(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        let entries = match std::fs::read_to_string(&path) {
            Ok(data) => match serde_json::from_str::<BTreeMap<String, String>>(&data) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(path = %path.display(), "failed to parse credential store: {e}");
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no credential store yet");
                BTreeMap::new()
            }
            Err(e) => return Err(e.into()),
        };
        Ok(Self { path, entries: Mutex::new(entries) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, entries: &BTreeMap<String, String>) {
        if let Err(e) = save(&self.path, entries) {
            warn!(path = %self.path.display(), "failed to persist credential store: {e:#}");
        }
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        let mut entries = self.entries.lock();
        entries.insert(key.to_owned(), value.to_owned());
        self.persist(&entries);
    }

    fn remove(&self, key: &str) {
        let mut entries = self.entries.lock();
        if entries.remove(key).is_some() {
            self.persist(&entries);
        }
    }
}

/// Write the map atomically (unique tmp file + rename).
///
/// The temp name carries PID and a counter so racing saves never share a
/// `.tmp` file.
fn save(path: &Path, entries: &BTreeMap<String, String>) -> anyhow::Result<()> {
    use std::sync::atomic::{AtomicU32, Ordering};
    static COUNTER: AtomicU32 = AtomicU32::new(0);

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let json = serde_json::to_string_pretty(entries)?;
    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    let tmp_name = format!(
        "{}.{}.{}.tmp",
        path.file_name().unwrap_or_default().to_string_lossy(),
        std::process::id(),
        seq,
    );
    let tmp_path = path.with_file_name(tmp_name);
    std::fs::write(&tmp_path, json)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

/// The kinds of value the session keeps in storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Access,
    Refresh,
    Profile,
    Role,
}

impl TokenKind {
    /// Storage keys in read-priority order. Writes go to all of them.
    pub fn keys(&self) -> &'static [&'static str] {
        match self {
            Self::Access => &["authToken1", "authToken"],
            Self::Refresh => &["refreshToken"],
            Self::Profile => &["userData"],
            Self::Role => &["userRole"],
        }
    }
}

/// Typed view over a [`KeyValueStore`].
#[derive(Clone)]
pub struct CredentialStore {
    backend: Arc<dyn KeyValueStore>,
}

impl CredentialStore {
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self { backend }
    }

    /// Fresh store over an in-memory backend.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    /// First non-empty value among the kind's keys.
    pub fn get(&self, kind: TokenKind) -> Option<String> {
        kind.keys().iter().find_map(|key| self.backend.get(key).filter(|v| !v.is_empty()))
    }

    pub fn set(&self, kind: TokenKind, value: &str) {
        for key in kind.keys() {
            self.backend.set(key, value);
        }
    }

    pub fn remove(&self, kind: TokenKind) {
        for key in kind.keys() {
            self.backend.remove(key);
        }
    }

    /// Cached user profile, if present and valid JSON.
    pub fn profile(&self) -> Option<Value> {
        let raw = self.get(TokenKind::Profile)?;
        match serde_json::from_str(&raw) {
            Ok(v) => Some(v),
            Err(e) => {
                debug!("ignoring unparsable cached profile: {e}");
                None
            }
        }
    }

    pub fn set_profile(&self, profile: &Value) {
        self.set(TokenKind::Profile, &profile.to_string());
    }

    /// Both tokens present. Anything less counts as "no session".
    pub fn has_session(&self) -> bool {
        self.get(TokenKind::Access).is_some() && self.get(TokenKind::Refresh).is_some()
    }
}

impl std::fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialStore").field("has_session", &self.has_session()).finish()
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
