//! Record store: identity key -> registered student, mirrored to one JSON file.
//!
//! Writes are serialized behind a single write lock. Every mutation rewrites
//! the whole document to a temporary file, fsyncs it and renames it over the
//! target, so a crash leaves either the old or the new document on disk.

use async_trait::async_trait;
use rollcall_core::StudentRecord;
use serde_json::{Map, Value};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store I/O on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("store serialization: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Key-value access to registered students.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get(&self, key: &str) -> Option<StudentRecord>;

    /// Insert or replace the record under its identity key and persist the
    /// store. Returns `true` when an existing record was replaced.
    async fn upsert(&self, record: StudentRecord) -> Result<bool, StoreError>;

    /// All records in registration order.
    async fn list(&self) -> Vec<StudentRecord>;

    async fn len(&self) -> usize;
}

/// [`RecordStore`] backed by a JSON document on disk.
pub struct JsonFileStore {
    path: PathBuf,
    records: RwLock<Vec<StudentRecord>>,
}

impl JsonFileStore {
    /// Load the store from `path`.
    ///
    /// A missing file yields an empty store. A malformed document also yields
    /// an empty store; the damaged file is moved aside to `<path>.corrupt`.
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();

        let records = match tokio::fs::read(&path).await {
            Ok(bytes) => match parse_document(&bytes) {
                Ok(records) => records,
                Err(e) => {
                    let aside = sibling(&path, "corrupt");
                    tracing::warn!(
                        path = %path.display(),
                        moved_to = %aside.display(),
                        error = %e,
                        "record store is malformed; starting empty"
                    );
                    if let Err(e) = tokio::fs::rename(&path, &aside).await {
                        tracing::warn!(error = %e, "could not move malformed store aside");
                    }
                    Vec::new()
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => Vec::new(),
            Err(source) => return Err(StoreError::Io { path, source }),
        };

        tracing::info!(path = %path.display(), records = records.len(), "record store loaded");

        Ok(Self {
            path,
            records: RwLock::new(records),
        })
    }

    async fn persist(&self, records: &[StudentRecord]) -> Result<(), StoreError> {
        let bytes = render_document(records)?;
        write_atomic(&self.path, &bytes)
            .await
            .map_err(|source| StoreError::Io {
                path: self.path.clone(),
                source,
            })
    }
}

#[async_trait]
impl RecordStore for JsonFileStore {
    async fn get(&self, key: &str) -> Option<StudentRecord> {
        self.records
            .read()
            .await
            .iter()
            .find(|r| r.identity_key == key)
            .cloned()
    }

    async fn upsert(&self, record: StudentRecord) -> Result<bool, StoreError> {
        let mut records = self.records.write().await;

        let mut next = records.clone();
        let replaced = match next.iter_mut().find(|r| r.identity_key == record.identity_key) {
            Some(slot) => {
                *slot = record;
                true
            }
            None => {
                next.push(record);
                false
            }
        };

        // Memory only changes once the new document is durable.
        self.persist(&next).await?;
        *records = next;
        Ok(replaced)
    }

    async fn list(&self) -> Vec<StudentRecord> {
        self.records.read().await.clone()
    }

    async fn len(&self) -> usize {
        self.records.read().await.len()
    }
}

/// Parse the on-disk object. The map key is authoritative for `identity_key`.
fn parse_document(bytes: &[u8]) -> Result<Vec<StudentRecord>, serde_json::Error> {
    let map: Map<String, Value> = serde_json::from_slice(bytes)?;
    map.into_iter()
        .map(|(key, value)| {
            let mut record: StudentRecord = serde_json::from_value(value)?;
            record.identity_key = key;
            Ok(record)
        })
        .collect()
}

fn render_document(records: &[StudentRecord]) -> Result<Vec<u8>, serde_json::Error> {
    let mut map = Map::with_capacity(records.len());
    for record in records {
        map.insert(record.identity_key.clone(), serde_json::to_value(record)?);
    }
    serde_json::to_vec_pretty(&Value::Object(map))
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".");
    name.push(suffix);
    path.with_file_name(name)
}

/// Write-temp, fsync, rename, fsync the directory. The temp file is removed
/// if any step fails.
async fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let parent = path.parent().filter(|p| !p.as_os_str().is_empty());
    if let Some(parent) = parent {
        tokio::fs::create_dir_all(parent).await?;
    }

    let tmp = sibling(path, "tmp");
    if let Err(e) = write_and_rename(&tmp, path, bytes).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e);
    }
    sync_parent_directory(parent.unwrap_or_else(|| Path::new("."))).await
}

async fn write_and_rename(tmp: &Path, path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = tokio::fs::File::create(tmp).await?;
    file.write_all(bytes).await?;
    file.sync_all().await?;
    drop(file);
    tokio::fs::rename(tmp, path).await
}

async fn sync_parent_directory(dir: &Path) -> io::Result<()> {
    #[cfg(unix)]
    {
        tokio::fs::File::open(dir).await?.sync_all().await?;
    }
    #[cfg(not(unix))]
    {
        let _ = dir;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollcall_core::Embedding;
    use std::sync::Arc;

    fn record(key: &str, value: f32) -> StudentRecord {
        StudentRecord {
            identity_key: key.into(),
            student_name: Some(format!("Student {key}")),
            student_id: None,
            filename: format!("{key}.jpg"),
            stored_file: None,
            face_encoding: vec![Embedding::new(vec![value, 0.0])],
            model_version: None,
            registered_at: None,
        }
    }

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::load(dir.path().join("registered_data.json"))
            .await
            .unwrap();
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn test_malformed_file_is_empty_and_moved_aside() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registered_data.json");
        std::fs::write(&path, b"{ not json").unwrap();

        let store = JsonFileStore::load(&path).await.unwrap();
        assert_eq!(store.len().await, 0);
        assert!(!path.exists());
        assert_eq!(
            std::fs::read(dir.path().join("registered_data.json.corrupt")).unwrap(),
            b"{ not json"
        );
    }

    #[tokio::test]
    async fn test_upsert_persists_and_reloads_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registered_data.json");

        let store = JsonFileStore::load(&path).await.unwrap();
        assert!(!store.upsert(record("b", 1.0)).await.unwrap());
        assert!(!store.upsert(record("a", 2.0)).await.unwrap());

        let reloaded = JsonFileStore::load(&path).await.unwrap();
        let keys: Vec<_> = reloaded.list().await.into_iter().map(|r| r.identity_key).collect();
        assert_eq!(keys, vec!["b", "a"]);
        assert!(!dir.path().join("registered_data.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_upsert_replaces_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::load(dir.path().join("s.json")).await.unwrap();
        store.upsert(record("a", 1.0)).await.unwrap();
        store.upsert(record("b", 1.0)).await.unwrap();

        assert!(store.upsert(record("a", 5.0)).await.unwrap());

        let all = store.list().await;
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].identity_key, "a");
        assert_eq!(all[0].face_encoding[0].values[0], 5.0);
        assert_eq!(store.get("a").await.unwrap().face_encoding[0].values[0], 5.0);
    }

    #[tokio::test]
    async fn test_map_key_wins_over_embedded_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s.json");
        std::fs::write(
            &path,
            br#"{"photo.jpg": {"filename": "photo.jpg", "face_encoding": [[0.1, 0.2]]}}"#,
        )
        .unwrap();

        let store = JsonFileStore::load(&path).await.unwrap();
        let r = store.get("photo.jpg").await.unwrap();
        assert_eq!(r.identity_key, "photo.jpg");
        assert_eq!(r.face_encoding.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_save_leaves_memory_untouched() {
        let dir = tempfile::tempdir().unwrap();
        // A directory in place of the store file makes the rename fail.
        let path = dir.path().join("store.json");
        std::fs::create_dir(&path).unwrap();
        std::fs::write(path.join("keep"), b"x").unwrap();

        let store = JsonFileStore {
            path: path.clone(),
            records: RwLock::new(Vec::new()),
        };
        assert!(store.upsert(record("a", 1.0)).await.is_err());
        assert_eq!(store.len().await, 0);
        assert!(!dir.path().join("store.json.tmp").exists());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_upserts_are_all_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registered_data.json");
        let store = Arc::new(JsonFileStore::load(&path).await.unwrap());

        let tasks: Vec<_> = (0..32)
            .map(|i| {
                let store = Arc::clone(&store);
                tokio::spawn(async move { store.upsert(record(&format!("s{i}"), i as f32)).await })
            })
            .collect();
        for task in tasks {
            assert!(!task.await.unwrap().unwrap());
        }

        assert_eq!(store.len().await, 32);
        let reloaded = JsonFileStore::load(&path).await.unwrap();
        assert_eq!(reloaded.len().await, 32);
        for i in 0..32 {
            assert!(reloaded.get(&format!("s{i}")).await.is_some(), "lost s{i}");
        }
    }
}
