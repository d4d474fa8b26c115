// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 dagflow contributors

//! Filesystem-based manifest store
//!
//! Stores manifests as JSON files in a store directory, sharded by the first
//! two characters of the digest.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::debug;

use super::{CacheStats, ManifestStore, StoredEntry, StoredManifest};
use crate::compiler::Manifest;
use crate::errors::DagflowError;

/// Filesystem-based manifest store
pub struct FilesystemManifestStore {
    store_dir: PathBuf,
}

impl FilesystemManifestStore {
    /// Create a new store, creating its directory if needed
    pub fn new(store_dir: PathBuf) -> Result<Self, DagflowError> {
        if !store_dir.exists() {
            std::fs::create_dir_all(&store_dir).map_err(|e| DagflowError::CacheError {
                message: format!("Failed to create manifest store: {}", e),
            })?;
        }

        Ok(Self { store_dir })
    }

    /// Store inside a state directory
    pub fn in_state_dir(state_dir: &Path) -> Result<Self, DagflowError> {
        Self::new(state_dir.join("manifests"))
    }

    /// Get path for an entry. Only called with digests that passed [`is_digest`].
    fn entry_path(&self, digest: &str) -> PathBuf {
        // Use first 2 chars as directory for better filesystem performance
        let (prefix, rest) = digest.split_at(2.min(digest.len()));
        self.store_dir.join(prefix).join(format!("{}.json", rest))
    }

    /// Read all entries
    fn list_entries(&self) -> Result<Vec<StoredEntry>, DagflowError> {
        let mut entries = Vec::new();

        if !self.store_dir.exists() {
            return Ok(entries);
        }

        for prefix_dir in std::fs::read_dir(&self.store_dir).map_err(|e| DagflowError::CacheError {
            message: format!("Failed to read manifest store: {}", e),
        })? {
            let prefix_dir = prefix_dir
                .map_err(|e| DagflowError::CacheError {
                    message: format!("Failed to read store entry: {}", e),
                })?
                .path();

            if !prefix_dir.is_dir() {
                continue;
            }

            for entry_file in std::fs::read_dir(&prefix_dir).map_err(|e| DagflowError::CacheError {
                message: format!("Failed to read store subdirectory: {}", e),
            })? {
                let entry_file = entry_file
                    .map_err(|e| DagflowError::CacheError {
                        message: format!("Failed to read store file: {}", e),
                    })?
                    .path();

                if entry_file.extension().and_then(|e| e.to_str()) != Some("json") {
                    continue;
                }

                if let Ok(content) = std::fs::read_to_string(&entry_file) {
                    if let Ok(entry) = serde_json::from_str::<StoredEntry>(&content) {
                        entries.push(entry);
                    }
                }
            }
        }

        Ok(entries)
    }

    /// Calculate directory size recursively
    fn dir_size(path: &Path) -> Result<u64, DagflowError> {
        let mut size = 0;

        for entry in std::fs::read_dir(path).map_err(|e| DagflowError::CacheError {
            message: format!("Failed to read directory: {}", e),
        })? {
            let entry = entry.map_err(|e| DagflowError::CacheError {
                message: format!("Failed to read entry: {}", e),
            })?;

            let path = entry.path();
            if path.is_dir() {
                size += Self::dir_size(&path)?;
            } else {
                size += entry.metadata().map(|m| m.len()).unwrap_or(0);
            }
        }

        Ok(size)
    }
}

#[async_trait]
impl ManifestStore for FilesystemManifestStore {
    async fn get(&self, digest: &str) -> Result<Option<Manifest>, DagflowError> {
        if !is_digest(digest) {
            return Ok(None);
        }
        let path = self.entry_path(digest);

        if !path.exists() {
            return Ok(None);
        }

        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| DagflowError::CacheError {
                message: format!("Failed to read stored manifest: {}", e),
            })?;

        let entry: StoredEntry = serde_json::from_str(&content).map_err(|e| DagflowError::CacheError {
            message: format!("Failed to parse stored manifest: {}", e),
        })?;

        // A corrupted entry is treated as absent
        if entry.manifest.digest()? != digest {
            let _ = tokio::fs::remove_file(&path).await;
            return Ok(None);
        }

        Ok(Some(entry.manifest))
    }

    async fn store(&self, manifest: &Manifest) -> Result<String, DagflowError> {
        let digest = manifest.digest()?;
        let path = self.entry_path(&digest);
        if path.exists() {
            return Ok(digest);
        }

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| DagflowError::CacheError {
                    message: format!("Failed to create store directory: {}", e),
                })?;
        }

        let entry = StoredEntry {
            timestamp: SystemTime::now(),
            digest: digest.clone(),
            manifest: manifest.clone(),
        };

        let json = serde_json::to_string_pretty(&entry).map_err(|e| DagflowError::CacheError {
            message: format!("Failed to serialize manifest: {}", e),
        })?;

        // Readers only ever see a complete entry
        let tmp = path.with_extension(format!("{}.tmp", uuid::Uuid::new_v4()));
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| DagflowError::CacheError {
                message: format!("Failed to write manifest: {}", e),
            })?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(DagflowError::CacheError {
                message: format!("Failed to write manifest: {}", e),
            });
        }

        debug!(digest = %digest, pipeline = %manifest.name(), "Stored manifest");
        Ok(digest)
    }

    async fn remove(&self, digest: &str) -> Result<(), DagflowError> {
        if !is_digest(digest) {
            return Ok(());
        }
        let path = self.entry_path(digest);

        if path.exists() {
            tokio::fs::remove_file(&path)
                .await
                .map_err(|e| DagflowError::CacheError {
                    message: format!("Failed to remove manifest: {}", e),
                })?;
        }

        Ok(())
    }

    async fn clear(&self) -> Result<(), DagflowError> {
        if self.store_dir.exists() {
            tokio::fs::remove_dir_all(&self.store_dir)
                .await
                .map_err(|e| DagflowError::CacheError {
                    message: format!("Failed to clear manifest store: {}", e),
                })?;

            tokio::fs::create_dir_all(&self.store_dir)
                .await
                .map_err(|e| DagflowError::CacheError {
                    message: format!("Failed to recreate manifest store: {}", e),
                })?;
        }

        Ok(())
    }

    async fn list(&self) -> Result<Vec<StoredManifest>, DagflowError> {
        let mut listed: Vec<StoredManifest> = self.list_entries()?.iter().map(StoredEntry::summary).collect();
        listed.sort_by(|a, b| b.stored_at.cmp(&a.stored_at));
        Ok(listed)
    }

    async fn stats(&self) -> Result<CacheStats, DagflowError> {
        let listed = self.list().await?;
        let size = if self.store_dir.exists() {
            Self::dir_size(&self.store_dir)?
        } else {
            0
        };
        Ok(CacheStats::from_entries(&listed, size))
    }
}

/// A blake3 hex digest: 64 lowercase hex characters
fn is_digest(reference: &str) -> bool {
    reference.len() == 64 && reference.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}
