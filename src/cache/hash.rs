// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 dagflow contributors

//! Content hashing for manifest digests and idempotency keys
//!
//! Uses BLAKE3 for fast, secure content hashing.

use blake3::Hasher;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::artifact::ParamValue;
use crate::compiler::Manifest;
use crate::errors::DagflowError;

/// Content hasher for generating digests
pub struct ContentHasher {
    hasher: Hasher,
}

impl ContentHasher {
    /// Create a new content hasher
    pub fn new() -> Self {
        Self {
            hasher: Hasher::new(),
        }
    }

    /// Hash a field; fields are length-prefixed so that concatenations cannot collide
    pub fn update_str(&mut self, value: &str) -> &mut Self {
        self.hasher.update(&(value.len() as u64).to_le_bytes());
        self.hasher.update(value.as_bytes());
        self
    }

    /// Hash the canonical JSON encoding of a value
    pub fn update_json<T: Serialize>(&mut self, what: &str, value: &T) -> Result<&mut Self, DagflowError> {
        let json = serde_json::to_string(value).map_err(|e| DagflowError::CacheError {
            message: format!("Failed to serialize {}: {}", what, e),
        })?;
        Ok(self.update_str(&json))
    }

    /// Finish and return the hex digest
    pub fn finalize(&self) -> String {
        self.hasher.finalize().to_hex().to_string()
    }

    /// Digest of a manifest: BLAKE3 of its canonical JSON encoding
    pub fn hash_manifest(manifest: &Manifest) -> Result<String, DagflowError> {
        let json = serde_json::to_vec(manifest).map_err(|e| DagflowError::CacheError {
            message: format!("Failed to serialize manifest: {}", e),
        })?;
        Ok(blake3::hash(&json).to_hex().to_string())
    }

    /// Key under which a submission is deduplicated
    pub fn idempotency_key(
        experiment_id: &str,
        run_name: &str,
        manifest_digest: &str,
        params: &BTreeMap<String, ParamValue>,
    ) -> Result<String, DagflowError> {
        let mut hasher = Self::new();
        hasher
            .update_str(experiment_id)
            .update_str(run_name)
            .update_str(manifest_digest)
            .update_json("parameters", params)?;
        Ok(hasher.finalize())
    }
}

impl Default for ContentHasher {
    fn default() -> Self {
        Self::new()
    }
}

/// Hash a string (for quick lookups and file names)
pub fn hash_string(s: &str) -> String {
    blake3::hash(s.as_bytes()).to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_string() {
        let hash1 = hash_string("hello");
        let hash2 = hash_string("hello");
        let hash3 = hash_string("world");

        assert_eq!(hash1, hash2);
        assert_ne!(hash1, hash3);
        assert_eq!(hash1.len(), 64); // BLAKE3 produces 256-bit (32 byte) hash = 64 hex chars
    }

    #[test]
    fn test_idempotency_key_depends_on_every_field() {
        let mut params = BTreeMap::new();
        params.insert("accuracy_threshold".to_string(), ParamValue::Float(0.8));

        let key = ContentHasher::idempotency_key("exp", "run", "abc", &params).unwrap();
        assert_eq!(key, ContentHasher::idempotency_key("exp", "run", "abc", &params).unwrap());
        assert_ne!(key, ContentHasher::idempotency_key("exp", "run2", "abc", &params).unwrap());

        params.insert("accuracy_threshold".to_string(), ParamValue::Float(0.9));
        assert_ne!(key, ContentHasher::idempotency_key("exp", "run", "abc", &params).unwrap());
    }

    #[test]
    fn test_fields_do_not_run_together() {
        let empty = BTreeMap::new();
        let a = ContentHasher::idempotency_key("ab", "c", "d", &empty).unwrap();
        let b = ContentHasher::idempotency_key("a", "bc", "d", &empty).unwrap();
        assert_ne!(a, b);
    }
}
