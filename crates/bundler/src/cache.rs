use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::{Mutex, RwLock};
use sha2::{Digest, Sha256};
use tempfile::TempDir;

use crate::error::CacheError;

/// A compiled server artifact on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledArtifact {
    pub content_hash: String,
    pub disk_path: PathBuf,
    pub loaded: bool,
}

/// Content-addressed store for compiled dev artifacts.
///
/// Identical code always lands on the same path and is written at most once.
/// Every path handed out is removed by [`ArtifactCache::purge`], which also
/// runs on drop.
pub struct ArtifactCache {
    dir: PathBuf,
    owned: Mutex<Option<TempDir>>,
    artifacts: RwLock<HashMap<String, CompiledArtifact>>,
    recorded: Mutex<HashSet<PathBuf>>,
    writes: AtomicUsize,
}

impl ArtifactCache {
    /// Cache backed by a private temp dir, deleted on purge.
    pub fn temporary() -> Result<Self, CacheError> {
        let temp = tempfile::Builder::new()
            .prefix("monoserve-")
            .tempdir()
            .map_err(|source| CacheError::Create {
                path: std::env::temp_dir(),
                source,
            })?;
        let dir = temp.path().to_path_buf();
        tracing::debug!("artifact cache at {}", dir.display());
        Ok(Self::with_dir(dir, Some(temp)))
    }

    /// Cache writing into `dir`, which is created if needed and left in
    /// place on purge.
    pub fn in_dir(dir: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|source| CacheError::Create {
            path: dir.clone(),
            source,
        })?;
        Ok(Self::with_dir(dir, None))
    }

    fn with_dir(dir: PathBuf, owned: Option<TempDir>) -> Self {
        Self {
            dir,
            owned: Mutex::new(owned),
            artifacts: RwLock::new(HashMap::new()),
            recorded: Mutex::new(HashSet::new()),
            writes: AtomicUsize::new(0),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path an artifact with `hash` is stored at.
    pub fn path_for(&self, hash: &str) -> PathBuf {
        self.dir.join(format!("{}.js", hash))
    }

    /// Store compiled code, skipping the write when its path already exists.
    pub async fn store(&self, code: &str) -> Result<CompiledArtifact, CacheError> {
        let hash = content_hash(code);
        if let Some(existing) = self.get(&hash) {
            return Ok(existing);
        }

        let disk_path = self.path_for(&hash);
        if tokio::fs::try_exists(&disk_path).await.unwrap_or(false) {
            tracing::debug!("artifact {} already on disk", &hash[..12]);
        } else {
            // Racing writers converge: each renames identical bytes onto the
            // same path.
            let staging = self.dir.join(format!(".{}.{}.tmp", hash, nanoid::nanoid!(8)));
            let write = async {
                tokio::fs::write(&staging, code).await?;
                tokio::fs::rename(&staging, &disk_path).await
            };
            if let Err(source) = write.await {
                let _ = tokio::fs::remove_file(&staging).await;
                return Err(CacheError::Write {
                    path: disk_path,
                    source,
                });
            }
            self.writes.fetch_add(1, Ordering::Relaxed);
            tracing::debug!("wrote artifact {}", disk_path.display());
        }

        self.recorded.lock().insert(disk_path.clone());
        let mut artifacts = self.artifacts.write();
        let artifact = artifacts
            .entry(hash.clone())
            .or_insert_with(|| CompiledArtifact {
                content_hash: hash,
                disk_path,
                loaded: false,
            });
        Ok(artifact.clone())
    }

    pub fn get(&self, hash: &str) -> Option<CompiledArtifact> {
        self.artifacts.read().get(hash).cloned()
    }

    pub fn mark_loaded(&self, hash: &str) {
        if let Some(artifact) = self.artifacts.write().get_mut(hash) {
            artifact.loaded = true;
        }
    }

    /// Number of artifact files this cache has written.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.artifacts.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.read().is_empty()
    }

    /// Remove every artifact recorded this session. Failures are logged.
    pub fn purge(&self) {
        let recorded: Vec<PathBuf> = self.recorded.lock().drain().collect();
        self.artifacts.write().clear();
        let mut removed = 0;
        for path in recorded {
            match std::fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => tracing::warn!("failed to remove artifact {}: {}", path.display(), err),
            }
        }

        if let Some(temp) = self.owned.lock().take() {
            let path = temp.path().to_path_buf();
            if let Err(err) = temp.close() {
                tracing::warn!("failed to remove artifact dir {}: {}", path.display(), err);
            }
        }

        if removed > 0 {
            tracing::debug!("purged {} artifact(s) from {}", removed, self.dir.display());
        }
    }
}

impl Drop for ArtifactCache {
    fn drop(&mut self) {
        self.purge();
    }
}

/// Hex SHA-256 of compiled code.
pub fn content_hash(code: &str) -> String {
    hex::encode(Sha256::digest(code.as_bytes()))
}
