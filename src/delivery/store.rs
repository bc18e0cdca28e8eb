//! Local image store.
//!
//! A keyed object store with auto-incrementing ids, kept in memory and
//! optionally mirrored to a JSON file. Nothing here leaves the machine.

use crate::photo::{CapturedImage, EncodedImage};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("store file is corrupt: {0}")]
    Corrupt(String),
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

/// A stored, encoded image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredImage {
    pub id: u64,
    pub mime_type: String,
    pub width: u32,
    pub height: u32,
    pub created_at: DateTime<Utc>,
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
}

#[derive(Serialize, Deserialize)]
struct StoreFile {
    next_id: u64,
    records: Vec<StoredImage>,
}

/// Images keyed by auto-incrementing id.
#[derive(Debug)]
pub struct ImageStore {
    records: BTreeMap<u64, StoredImage>,
    next_id: u64,
    path: Option<PathBuf>,
}

impl ImageStore {
    /// A store that lives only as long as the process.
    pub fn in_memory() -> Self {
        Self {
            records: BTreeMap::new(),
            next_id: 1,
            path: None,
        }
    }

    /// Opens a file-backed store, creating it on first write.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let mut store = Self {
            path: Some(path.clone()),
            ..Self::in_memory()
        };

        if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            let file: StoreFile =
                serde_json::from_str(&content).map_err(|e| StoreError::Corrupt(e.to_string()))?;
            let max_id = file.records.iter().map(|r| r.id).max().unwrap_or(0);
            store.next_id = file.next_id.max(max_id + 1);
            store.records = file.records.into_iter().map(|r| (r.id, r)).collect();
            tracing::debug!(
                records = store.records.len(),
                path = %path.display(),
                "Image store loaded"
            );
        }
        Ok(store)
    }

    /// Encodes and stores a capture, returning its id.
    pub fn put(
        &mut self,
        image: &CapturedImage,
        encoded: &EncodedImage,
    ) -> Result<u64, StoreError> {
        let id = self.next_id;
        self.records.insert(
            id,
            StoredImage {
                id,
                mime_type: encoded.format().mime_type().to_string(),
                width: image.width(),
                height: image.height(),
                created_at: image.captured_at(),
                data: encoded.bytes().to_vec(),
            },
        );
        self.next_id += 1;

        if let Err(e) = self.persist() {
            self.records.remove(&id);
            self.next_id -= 1;
            return Err(e);
        }
        tracing::info!(id, bytes = encoded.len(), "Image stored");
        Ok(id)
    }

    pub fn get(&self, id: u64) -> Option<&StoredImage> {
        self.records.get(&id)
    }

    /// Stored images in id order.
    pub fn list(&self) -> impl Iterator<Item = &StoredImage> {
        self.records.values()
    }

    /// Removes an image. Ids are never reused. The record stays in place
    /// when the change cannot be written.
    pub fn delete(&mut self, id: u64) -> Result<bool, StoreError> {
        let Some(record) = self.records.remove(&id) else {
            return Ok(false);
        };
        if let Err(e) = self.persist() {
            self.records.insert(id, record);
            return Err(e);
        }
        Ok(true)
    }

    pub fn clear(&mut self) -> Result<(), StoreError> {
        let previous = std::mem::take(&mut self.records);
        if let Err(e) = self.persist() {
            self.records = previous;
            return Err(e);
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn persist(&self) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = StoreFile {
            next_id: self.next_id,
            records: self.records.values().cloned().collect(),
        };
        let json =
            serde_json::to_string(&file).map_err(|e| StoreError::Corrupt(e.to_string()))?;
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}

impl Default for ImageStore {
    fn default() -> Self {
        Self::in_memory()
    }
}
