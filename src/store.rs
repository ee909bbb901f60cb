//! Artifact Store - durable saved add-ons
//!
//! The whole collection lives under one key of a [`KeyValueBackend`] as a JSON
//! list. Every operation is a read-modify-write under the store lock and is
//! written through to the backend before it returns.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration, Utc};
use fs4::fs_std::FileExt;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use thiserror::Error;
use uuid::Uuid;

use crate::addon::GenerationResult;
use crate::bundle::Bundle;
use crate::hashing::content_hash;
use crate::raster::{rasterize, RasterError, RasterImage};
use crate::request::Request;

pub const COLLECTION_KEY: &str = "saved_addons";

/// Advisory lock file shared by every process using a [`FileBackend`] directory.
pub const LOCK_FILE: &str = "store.lock";

/// Side length of a replaced icon.
pub const ICON_SIZE: u32 = 64;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Artifact not found: {0}")]
    NotFound(String),

    #[error("Artifact name must not be empty")]
    InvalidName,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Raster(#[from] RasterError),
}

/// Persistence surface: a durable string store addressed by key.
pub trait KeyValueBackend: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Must be durable by the time it returns.
    fn put(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Exclusive lock held across one read-modify-write. Backends whose
    /// storage can be shared by other processes must exclude them too.
    fn lock(&self) -> Result<BackendLock, StoreError> {
        Ok(BackendLock::default())
    }
}

/// Held for the duration of a store operation; released on drop.
#[derive(Debug, Default)]
pub struct BackendLock {
    _file: Option<File>,
}

/// One JSON file per key inside a directory.
pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

impl KeyValueBackend for FileBackend {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn put(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(value.as_bytes())?;
        tmp.as_file().sync_all()?;

        // Readers see either the old or the new collection, never a torn one.
        tmp.persist(self.path_for(key)).map_err(|e| e.error)?;
        Ok(())
    }

    fn lock(&self) -> Result<BackendLock, StoreError> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(self.dir.join(LOCK_FILE))?;
        file.lock_exclusive()?;
        Ok(BackendLock { _file: Some(file) })
    }
}

#[derive(Default)]
pub struct MemoryBackend {
    inner: Mutex<HashMap<String, String>>,
}

impl KeyValueBackend for MemoryBackend {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(inner.get(key).cloned())
    }

    fn put(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// A saved generation result with its originating request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    pub id: String,
    pub name: String,
    pub prompt: String,
    pub version: semver::Version,
    pub created_at: DateTime<Utc>,
    pub content_hash: String,
    pub result: GenerationResult,
    #[serde(default)]
    pub icon: Option<RasterImage>,
}

impl Artifact {
    /// Export bundle, using the (possibly replaced) icon.
    pub fn bundle(&self) -> Bundle {
        Bundle::from_files(&self.result.files, self.icon.as_ref())
    }
}

pub struct ArtifactStore<B> {
    backend: B,
    lock: Mutex<()>,
}

impl<B: KeyValueBackend> ArtifactStore<B> {
    pub fn new(backend: B) -> Self {
        Self { backend, lock: Mutex::new(()) }
    }

    /// All artifacts, newest first.
    pub fn list(&self) -> Result<Vec<Artifact>, StoreError> {
        let _guard = self.guard()?;
        let mut artifacts = self.load()?;
        artifacts.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        Ok(artifacts)
    }

    pub fn get(&self, id: &str) -> Result<Artifact, StoreError> {
        let _guard = self.guard()?;
        self.load()?
            .into_iter()
            .find(|a| a.id == id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    pub fn save(
        &self,
        name: &str,
        result: &GenerationResult,
        request: &Request,
    ) -> Result<Artifact, StoreError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(StoreError::InvalidName);
        }

        let _guard = self.guard()?;
        let mut artifacts = self.load()?;

        // Timestamps are strictly increasing so ordering by them is total.
        let mut created_at = Utc::now();
        if let Some(newest) = artifacts.iter().map(|a| a.created_at).max() {
            if created_at <= newest {
                created_at = newest + Duration::milliseconds(1);
            }
        }

        let artifact = Artifact {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            prompt: request.text.clone(),
            version: request.version.clone(),
            created_at,
            content_hash: content_hash(&result.files)?,
            result: result.clone(),
            icon: result.image.clone(),
        };

        artifacts.push(artifact.clone());
        self.persist(&artifacts)?;
        tracing::info!(id = %artifact.id, name = %artifact.name, "artifact saved");
        Ok(artifact)
    }

    /// Replace the icon with `image` resampled to 64x64. Nothing else changes.
    pub fn replace_icon(&self, id: &str, image: &[u8]) -> Result<Artifact, StoreError> {
        let _guard = self.guard()?;
        let mut artifacts = self.load()?;
        let artifact = artifacts
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        artifact.icon = Some(rasterize(image, ICON_SIZE)?);
        let updated = artifact.clone();

        self.persist(&artifacts)?;
        tracing::info!(id = %id, "artifact icon replaced");
        Ok(updated)
    }

    /// Remove an artifact. Returns whether anything was removed.
    pub fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let _guard = self.guard()?;
        let mut artifacts = self.load()?;
        let before = artifacts.len();
        artifacts.retain(|a| a.id != id);

        if artifacts.len() == before {
            tracing::debug!(id = %id, "delete of unknown artifact ignored");
            return Ok(false);
        }

        self.persist(&artifacts)?;
        tracing::info!(id = %id, "artifact deleted");
        Ok(true)
    }

    /// In-process mutex first, then the backend's shared lock.
    fn guard(&self) -> Result<(MutexGuard<'_, ()>, BackendLock), StoreError> {
        let local = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let shared = self.backend.lock()?;
        Ok((local, shared))
    }

    fn load(&self) -> Result<Vec<Artifact>, StoreError> {
        match self.backend.get(COLLECTION_KEY)? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(vec![]),
        }
    }

    fn persist(&self, artifacts: &[Artifact]) -> Result<(), StoreError> {
        let raw = serde_json::to_string(artifacts)?;
        self.backend.put(COLLECTION_KEY, &raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addon::FileMap;
    use crate::raster::tests::checkerboard_png;

    fn sample_result() -> GenerationResult {
        let mut files = FileMap::new();
        files.insert("behavior_pack/items/sword.json".into(), "{}".into());
        let mut result = GenerationResult::from_files(files);
        result.image = Some(rasterize(&checkerboard_png(4, 4, 1), 16).unwrap());
        result
    }

    fn request() -> Request {
        Request::with_default_version("An emerald sword that deals eight damage")
    }

    #[test]
    fn test_save_assigns_distinct_ids_newest_first() {
        let store = ArtifactStore::new(MemoryBackend::default());
        let first = store.save("Sword", &sample_result(), &request()).unwrap();
        let second = store.save("Sword", &sample_result(), &request()).unwrap();

        assert_ne!(first.id, second.id);
        assert!(second.created_at > first.created_at);

        let ids: Vec<_> = store.list().unwrap().into_iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![second.id, first.id]);
    }

    #[test]
    fn test_save_rejects_blank_name() {
        let store = ArtifactStore::new(MemoryBackend::default());
        let err = store.save("  ", &sample_result(), &request()).unwrap_err();
        assert!(matches!(err, StoreError::InvalidName));
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn test_delete_is_idempotent() {
        let store = ArtifactStore::new(MemoryBackend::default());
        let saved = store.save("Sword", &sample_result(), &request()).unwrap();

        assert!(store.delete(&saved.id).unwrap());
        assert!(!store.delete(&saved.id).unwrap());
        assert!(store.list().unwrap().iter().all(|a| a.id != saved.id));
    }

    #[test]
    fn test_replace_icon_resizes_to_64() {
        let store = ArtifactStore::new(MemoryBackend::default());
        let saved = store.save("Sword", &sample_result(), &request()).unwrap();

        let updated = store.replace_icon(&saved.id, &checkerboard_png(300, 200, 10)).unwrap();
        let icon = updated.icon.as_ref().unwrap();
        assert_eq!(icon.size(), ICON_SIZE);
        assert_eq!(updated.result, saved.result);
        assert_eq!(updated.name, saved.name);
        assert_eq!(store.get(&saved.id).unwrap().icon, updated.icon);
    }

    #[test]
    fn test_replace_icon_unknown_id_leaves_store_untouched() {
        let store = ArtifactStore::new(MemoryBackend::default());
        store.save("Sword", &sample_result(), &request()).unwrap();
        let before = store.list().unwrap();

        let err = store.replace_icon("missing", &checkerboard_png(4, 4, 1)).unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
        assert_eq!(store.list().unwrap(), before);
    }

    #[test]
    fn test_replace_icon_with_garbage_fails_without_mutation() {
        let store = ArtifactStore::new(MemoryBackend::default());
        let saved = store.save("Sword", &sample_result(), &request()).unwrap();

        assert!(matches!(
            store.replace_icon(&saved.id, b"nope"),
            Err(StoreError::Raster(_))
        ));
        assert_eq!(store.get(&saved.id).unwrap().icon, saved.icon);
    }

    #[test]
    fn test_file_backend_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let saved = {
            let store = ArtifactStore::new(FileBackend::open(dir.path()).unwrap());
            store.save("Sword", &sample_result(), &request()).unwrap()
        };

        let reopened = ArtifactStore::new(FileBackend::open(dir.path()).unwrap());
        let listed = reopened.list().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0], saved);

        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name != "saved_addons.json" && name != LOCK_FILE)
            .collect();
        assert!(leftovers.is_empty(), "unexpected files {:?}", leftovers);
    }

    #[test]
    fn test_stores_sharing_a_directory_keep_every_save() {
        let dir = tempfile::tempdir().unwrap();
        let per_writer = 20;

        let saved: Vec<String> = std::thread::scope(|scope| {
            let writers: Vec<_> = (0..2)
                .map(|_| {
                    let path = dir.path().to_path_buf();
                    scope.spawn(move || {
                        // Each writer owns its own store, as separate CLI processes do.
                        let store = ArtifactStore::new(FileBackend::open(path).unwrap());
                        (0..per_writer)
                            .map(|i| store.save(&format!("Sword {i}"), &sample_result(), &request()).unwrap().id)
                            .collect::<Vec<_>>()
                    })
                })
                .collect();
            writers.into_iter().flat_map(|w| w.join().unwrap()).collect()
        });

        let store = ArtifactStore::new(FileBackend::open(dir.path()).unwrap());
        let listed = store.list().unwrap();
        assert_eq!(listed.len(), 2 * per_writer);
        for id in &saved {
            assert!(listed.iter().any(|a| &a.id == id), "lost save {}", id);
        }
        assert!(listed.windows(2).all(|w| w[0].created_at > w[1].created_at));
    }

    #[test]
    fn test_order_reconstructed_from_timestamps() {
        let backend = MemoryBackend::default();
        let store = ArtifactStore::new(backend);
        let a = store.save("A", &sample_result(), &request()).unwrap();
        let b = store.save("B", &sample_result(), &request()).unwrap();
        let c = store.save("C", &sample_result(), &request()).unwrap();

        // Scramble the persisted order; listing must not depend on it.
        let mut raw: Vec<Artifact> = store.load().unwrap();
        raw.reverse();
        raw.swap(0, 1);
        store.persist(&raw).unwrap();

        let names: Vec<_> = store.list().unwrap().into_iter().map(|a| a.name).collect();
        assert_eq!(names, vec![c.name, b.name, a.name]);
    }

    #[test]
    fn test_bundle_uses_icon() {
        let store = ArtifactStore::new(MemoryBackend::default());
        let saved = store.save("Sword", &sample_result(), &request()).unwrap();
        assert_eq!(saved.bundle().len(), 4);
    }
}
