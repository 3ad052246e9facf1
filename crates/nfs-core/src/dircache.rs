//! Directory listing snapshots
//!
//! A listing started with cookie 0 captures the directory once and files the
//! capture under a fresh random verifier. Continuations presenting that
//! verifier page through the same capture, so entries created or removed in
//! between never shift the client's cookies.

use std::sync::Arc;
use std::time::Duration;

use moka::sync::Cache;
use rand::Rng;

use crate::vfs::DirEntry;

/// 8-byte cookie verifier (`cookieverf3` / `verifier4`)
pub type CookieVerifier = [u8; 8];

/// Immutable captured listing
pub type Snapshot = Arc<Vec<DirEntry>>;

/// Size- and idle-bounded store of listing snapshots
#[derive(Clone)]
pub struct DirectoryListCache {
    snapshots: Cache<CookieVerifier, Snapshot>,
}

impl DirectoryListCache {
    /// Create a cache holding at most `capacity` entries across all
    /// snapshots, dropping snapshots untouched for `idle`.
    pub fn new(capacity: u64, idle: Duration) -> Self {
        let snapshots = Cache::builder()
            .max_capacity(capacity)
            .weigher(|_verifier: &CookieVerifier, snapshot: &Snapshot| -> u32 {
                snapshot.len().clamp(1, u32::MAX as usize) as u32
            })
            .time_to_idle(idle)
            .build();
        Self { snapshots }
    }

    /// Generate a random, non-zero verifier
    pub fn new_verifier(&self) -> CookieVerifier {
        let mut rng = rand::thread_rng();
        loop {
            let verifier: CookieVerifier = rng.gen();
            if verifier != [0u8; 8] {
                return verifier;
            }
        }
    }

    /// Register a snapshot; an existing one under the same verifier is replaced
    pub fn put(&self, verifier: CookieVerifier, snapshot: Snapshot) {
        self.snapshots.insert(verifier, snapshot);
    }

    /// Look up the snapshot captured under `verifier`
    pub fn get(&self, verifier: &CookieVerifier) -> Option<Snapshot> {
        self.snapshots.get(verifier)
    }

    /// Drop the snapshot captured under `verifier`
    pub fn invalidate(&self, verifier: &CookieVerifier) {
        self.snapshots.invalidate(verifier);
    }

    /// Check whether `verifier` still resolves
    pub fn contains(&self, verifier: &CookieVerifier) -> bool {
        self.snapshots.contains_key(verifier)
    }

    /// Approximate number of live snapshots
    pub fn len(&self) -> u64 {
        self.snapshots.run_pending_tasks();
        self.snapshots.entry_count()
    }

    /// Check if no snapshot is held
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for DirectoryListCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryListCache")
            .field("snapshots", &self.snapshots.entry_count())
            .field("weight", &self.snapshots.weighted_size())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::{FileAttr, FileType, Timestamp};

    fn entry(name: &str, ino: u64) -> DirEntry {
        DirEntry {
            name: name.to_string(),
            ino,
            attr: FileAttr {
                ino,
                file_type: FileType::Regular,
                mode: 0o644,
                nlink: 1,
                uid: 0,
                gid: 0,
                size: 0,
                used: 0,
                rdev: (0, 0),
                fsid: 1,
                change: 1,
                atime: Timestamp::default(),
                mtime: Timestamp::default(),
                ctime: Timestamp::default(),
            },
        }
    }

    #[test]
    fn test_snapshot_identity() {
        let cache = DirectoryListCache::new(100, Duration::from_secs(60));
        let verifier = cache.new_verifier();
        let snapshot: Snapshot = Arc::new(vec![entry("a", 2), entry("b", 3)]);

        cache.put(verifier, snapshot.clone());
        let found = cache.get(&verifier).unwrap();
        assert!(Arc::ptr_eq(&found, &snapshot));

        cache.invalidate(&verifier);
        assert!(cache.get(&verifier).is_none());
    }

    #[test]
    fn test_verifiers_are_non_zero_and_distinct() {
        let cache = DirectoryListCache::new(10, Duration::from_secs(60));
        let a = cache.new_verifier();
        let b = cache.new_verifier();
        assert_ne!(a, [0u8; 8]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_weight_is_entry_count() {
        let cache = DirectoryListCache::new(1000, Duration::from_secs(60));
        cache.put([1; 8], Arc::new(vec![entry("a", 2); 10]));
        cache.put([2; 8], Arc::new(Vec::new()));
        cache.snapshots.run_pending_tasks();
        // empty snapshots still weigh one
        assert_eq!(cache.snapshots.weighted_size(), 11);
        assert_eq!(cache.len(), 2);
    }
}
