//! Version-stamped cache
//!
//! Each cached value carries the source version it was derived from.
//! Readers pass the current source version; a mismatch is a miss. Reads that
//! started before a version bump may still return the old value.
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Debug, Clone)]
struct Stamped<T> {
    version: u64,
    value: T,
}

#[derive(Debug)]
pub struct VersionedCache<T> {
    slot: RwLock<Option<Stamped<T>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<T> Default for VersionedCache<T> {
    fn default() -> Self {
        Self {
            slot: RwLock::new(None),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }
}

impl<T: Clone> VersionedCache<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached value if it was stored at `version`
    pub async fn get(&self, version: u64) -> Option<T> {
        let slot = self.slot.read().await;
        match slot.as_ref() {
            Some(stamped) if stamped.version == version => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(stamped.value.clone())
            }
            Some(stamped) => {
                debug!(cached = stamped.version, current = version, "cache version stale");
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub async fn store(&self, version: u64, value: T) {
        let mut slot = self.slot.write().await;
        // never replace a newer value with an older one
        if slot.as_ref().map(|s| s.version > version).unwrap_or(false) {
            return;
        }
        *slot = Some(Stamped { version, value });
    }

    pub async fn version(&self) -> Option<u64> {
        self.slot.read().await.as_ref().map(|s| s.version)
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}
