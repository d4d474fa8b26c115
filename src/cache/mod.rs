// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 dagflow contributors

//! Content-addressed manifest store
//!
//! Compiled manifests are stored under their digest so that runs can refer to
//! them by reference instead of carrying them inline.

mod filesystem;
mod hash;
mod memory;

pub use filesystem::FilesystemManifestStore;
pub use hash::{hash_string, ContentHasher};
pub use memory::MemoryManifestStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;

use crate::compiler::Manifest;
use crate::errors::DagflowError;

/// Trait for manifest store implementations
#[async_trait]
pub trait ManifestStore: Send + Sync {
    /// Get a manifest by digest
    async fn get(&self, digest: &str) -> Result<Option<Manifest>, DagflowError>;

    /// Store a manifest, returning its digest. Storing twice is a no-op.
    async fn store(&self, manifest: &Manifest) -> Result<String, DagflowError>;

    /// Remove a manifest
    async fn remove(&self, digest: &str) -> Result<(), DagflowError>;

    /// Remove every manifest
    async fn clear(&self) -> Result<(), DagflowError>;

    /// Describe the stored manifests, newest first
    async fn list(&self) -> Result<Vec<StoredManifest>, DagflowError>;

    /// Get store statistics
    async fn stats(&self) -> Result<CacheStats, DagflowError>;

    /// Get a manifest that must exist
    async fn fetch(&self, digest: &str) -> Result<Manifest, DagflowError> {
        self.get(digest).await?.ok_or_else(|| DagflowError::ManifestNotFound {
            reference: digest.to_string(),
        })
    }
}

/// Summary of a stored manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredManifest {
    pub digest: String,
    pub pipeline: String,
    pub nodes: usize,
    pub stored_at: SystemTime,
}

/// Store statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    /// Number of stored manifests
    pub entries: usize,
    /// Total size in bytes
    pub size_bytes: u64,
    /// Oldest entry timestamp
    pub oldest_entry: Option<SystemTime>,
    /// Newest entry timestamp
    pub newest_entry: Option<SystemTime>,
}

impl CacheStats {
    /// Build statistics from entry listings
    pub fn from_entries(entries: &[StoredManifest], size_bytes: u64) -> Self {
        Self {
            entries: entries.len(),
            size_bytes,
            oldest_entry: entries.iter().map(|e| e.stored_at).min(),
            newest_entry: entries.iter().map(|e| e.stored_at).max(),
        }
    }

    /// Format size for display
    pub fn formatted_size(&self) -> String {
        const KB: u64 = 1024;
        const MB: u64 = KB * 1024;
        const GB: u64 = MB * 1024;

        if self.size_bytes >= GB {
            format!("{:.2} GB", self.size_bytes as f64 / GB as f64)
        } else if self.size_bytes >= MB {
            format!("{:.2} MB", self.size_bytes as f64 / MB as f64)
        } else if self.size_bytes >= KB {
            format!("{:.2} KB", self.size_bytes as f64 / KB as f64)
        } else {
            format!("{} bytes", self.size_bytes)
        }
    }
}

/// Stored manifest document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct StoredEntry {
    pub timestamp: SystemTime,
    pub digest: String,
    pub manifest: Manifest,
}

impl StoredEntry {
    pub fn summary(&self) -> StoredManifest {
        StoredManifest {
            digest: self.digest.clone(),
            pipeline: self.manifest.name().to_string(),
            nodes: self.manifest.nodes.len(),
            stored_at: self.timestamp,
        }
    }
}
