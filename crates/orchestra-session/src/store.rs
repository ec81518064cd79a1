//! Session persistence
//!
//! Stores serialize writers per session ID with an optimistic version check:
//! a save succeeds only when the stored version equals the version the
//! session was loaded at. The losing writer gets
//! [`OrchestraError::SessionConflict`] and must reload.
use async_trait::async_trait;
use orchestra_core::{OrchestraError, Result, SessionContext};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, warn};

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load(&self, session_id: &str) -> Result<Option<SessionContext>>;

    /// Persist `session` and return the new stored version
    async fn save(&self, session: &SessionContext) -> Result<u64>;

    /// Returns whether a session was removed
    async fn remove(&self, session_id: &str) -> Result<bool>;
}

fn check_version(session: &SessionContext, stored: u64) -> Result<u64> {
    if stored != session.version {
        warn!(session = %session.session_id, expected = session.version, found = stored, "session write conflict");
        return Err(OrchestraError::SessionConflict {
            session_id: session.session_id.clone(),
            expected: session.version,
            found: stored,
        });
    }
    Ok(stored + 1)
}

// === In-memory ===

#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: Mutex<HashMap<String, SessionContext>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn load(&self, session_id: &str) -> Result<Option<SessionContext>> {
        Ok(self.sessions.lock().await.get(session_id).cloned())
    }

    async fn save(&self, session: &SessionContext) -> Result<u64> {
        let mut sessions = self.sessions.lock().await;
        let stored = sessions.get(&session.session_id).map(|s| s.version).unwrap_or(0);
        let version = check_version(session, stored)?;

        let mut saved = session.clone();
        saved.version = version;
        sessions.insert(saved.session_id.clone(), saved);
        debug!(session = %session.session_id, version, "session saved");
        Ok(version)
    }

    async fn remove(&self, session_id: &str) -> Result<bool> {
        Ok(self.sessions.lock().await.remove(session_id).is_some())
    }
}

// === JSON files ===

/// One `{session_id}.json` file per session under a directory
#[derive(Debug)]
pub struct FileSessionStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl FileSessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, session_id: &str) -> Result<PathBuf> {
        let valid = !session_id.is_empty()
            && session_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
            && !session_id.starts_with('.');
        if !valid {
            return Err(OrchestraError::Store(format!("invalid session id '{}'", session_id)));
        }
        Ok(self.dir.join(format!("{}.json", session_id)))
    }

    async fn read(&self, path: &Path) -> Result<Option<SessionContext>> {
        match tokio::fs::read(path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| OrchestraError::Store(format!("corrupt session file {}: {}", path.display(), e))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(OrchestraError::Store(format!("read {}: {}", path.display(), e))),
        }
    }

    /// IDs of all stored sessions
    pub async fn list(&self) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(ids),
            Err(e) => return Err(OrchestraError::Store(format!("list {}: {}", self.dir.display(), e))),
        };
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| OrchestraError::Store(e.to_string()))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    ids.push(stem.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn load(&self, session_id: &str) -> Result<Option<SessionContext>> {
        let path = self.path_for(session_id)?;
        self.read(&path).await
    }

    async fn save(&self, session: &SessionContext) -> Result<u64> {
        let path = self.path_for(&session.session_id)?;
        let _guard = self.write_lock.lock().await;

        let stored = self.read(&path).await?.map(|s| s.version).unwrap_or(0);
        let version = check_version(session, stored)?;

        let mut saved = session.clone();
        saved.version = version;
        let json = serde_json::to_vec_pretty(&saved).map_err(|e| OrchestraError::Store(e.to_string()))?;

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| OrchestraError::Store(format!("create {}: {}", self.dir.display(), e)))?;
        // write then rename so readers never see a partial file
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| OrchestraError::Store(format!("write {}: {}", tmp.display(), e)))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| OrchestraError::Store(format!("rename {}: {}", path.display(), e)))?;

        debug!(session = %session.session_id, version, path = %path.display(), "session saved");
        Ok(version)
    }

    async fn remove(&self, session_id: &str) -> Result<bool> {
        let path = self.path_for(session_id)?;
        let _guard = self.write_lock.lock().await;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(OrchestraError::Store(format!("remove {}: {}", path.display(), e))),
        }
    }
}
