// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 dagflow contributors

//! In-memory manifest store

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::SystemTime;
use tokio::sync::RwLock;

use super::{CacheStats, ManifestStore, StoredEntry, StoredManifest};
use crate::compiler::Manifest;
use crate::errors::DagflowError;

/// Manifest store kept in process memory
#[derive(Debug, Default)]
pub struct MemoryManifestStore {
    entries: RwLock<HashMap<String, StoredEntry>>,
}

impl MemoryManifestStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ManifestStore for MemoryManifestStore {
    async fn get(&self, digest: &str) -> Result<Option<Manifest>, DagflowError> {
        Ok(self.entries.read().await.get(digest).map(|e| e.manifest.clone()))
    }

    async fn store(&self, manifest: &Manifest) -> Result<String, DagflowError> {
        let digest = manifest.digest()?;
        self.entries
            .write()
            .await
            .entry(digest.clone())
            .or_insert_with(|| StoredEntry {
                timestamp: SystemTime::now(),
                digest: digest.clone(),
                manifest: manifest.clone(),
            });
        Ok(digest)
    }

    async fn remove(&self, digest: &str) -> Result<(), DagflowError> {
        self.entries.write().await.remove(digest);
        Ok(())
    }

    async fn clear(&self) -> Result<(), DagflowError> {
        self.entries.write().await.clear();
        Ok(())
    }

    async fn list(&self) -> Result<Vec<StoredManifest>, DagflowError> {
        let mut listed: Vec<StoredManifest> = self.entries.read().await.values().map(StoredEntry::summary).collect();
        listed.sort_by(|a, b| b.stored_at.cmp(&a.stored_at));
        Ok(listed)
    }

    async fn stats(&self) -> Result<CacheStats, DagflowError> {
        let entries = self.entries.read().await;
        let mut size = 0u64;
        for entry in entries.values() {
            size += serde_json::to_vec(&entry.manifest)?.len() as u64;
        }
        let listed: Vec<StoredManifest> = entries.values().map(StoredEntry::summary).collect();
        Ok(CacheStats::from_entries(&listed, size))
    }
}
