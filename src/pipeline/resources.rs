// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 dagflow contributors

//! Resource profiles and Kubernetes-style quantities
//!
//! Profiles are advisory: they never affect graph validity and are handed to
//! the execution substrate unchanged.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use crate::errors::DagflowError;

fn cpu_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^(\d+(?:\.\d+)?)(m?)$").expect("valid regex"))
}

fn memory_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(\d+(?:\.\d+)?)(Ki|Mi|Gi|Ti|Pi|Ei|k|K|M|G|T|P|E)?$").expect("valid regex")
    })
}

const BINARY_UNITS: [(&str, u64); 6] = [
    ("Ei", 1 << 60),
    ("Pi", 1 << 50),
    ("Ti", 1 << 40),
    ("Gi", 1 << 30),
    ("Mi", 1 << 20),
    ("Ki", 1 << 10),
];

const DECIMAL_UNITS: [(&str, u64); 6] = [
    ("E", 1_000_000_000_000_000_000),
    ("P", 1_000_000_000_000_000),
    ("T", 1_000_000_000_000),
    ("G", 1_000_000_000),
    ("M", 1_000_000),
    ("k", 1_000),
];

fn invalid(value: &str, reason: &str) -> DagflowError {
    DagflowError::InvalidQuantity {
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

/// CPU quantity in millicores
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CpuQuantity {
    millis: u64,
}

impl CpuQuantity {
    pub fn from_millis(millis: u64) -> Self {
        Self { millis }
    }

    pub fn millis(&self) -> u64 {
        self.millis
    }

    /// Parse `"500m"`, `"2"` or `"1.5"`
    pub fn parse(text: &str) -> Result<Self, DagflowError> {
        let caps = cpu_pattern()
            .captures(text.trim())
            .ok_or_else(|| invalid(text, "expected cores (\"2\", \"0.5\") or millicores (\"500m\")"))?;
        let number = &caps[1];
        let millis = if &caps[2] == "m" {
            number
                .parse::<u64>()
                .map_err(|_| invalid(text, "millicores must be a whole number"))?
        } else {
            let cores: f64 = number.parse().map_err(|_| invalid(text, "not a number"))?;
            let millis = cores * 1000.0;
            if (millis - millis.round()).abs() > 1e-6 {
                return Err(invalid(text, "precision finer than 1m"));
            }
            millis.round() as u64
        };
        Ok(Self { millis })
    }
}

impl fmt::Display for CpuQuantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.millis % 1000 == 0 {
            write!(f, "{}", self.millis / 1000)
        } else {
            write!(f, "{}m", self.millis)
        }
    }
}

impl FromStr for CpuQuantity {
    type Err = DagflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for CpuQuantity {
    type Error = DagflowError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<CpuQuantity> for String {
    fn from(value: CpuQuantity) -> Self {
        value.to_string()
    }
}

/// Memory quantity in bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MemoryQuantity {
    bytes: u64,
}

impl MemoryQuantity {
    pub fn from_bytes(bytes: u64) -> Self {
        Self { bytes }
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    /// Parse `"512Mi"`, `"1Gi"`, `"2G"` or plain bytes
    pub fn parse(text: &str) -> Result<Self, DagflowError> {
        let caps = memory_pattern()
            .captures(text.trim())
            .ok_or_else(|| invalid(text, "expected bytes with an optional unit (Ki, Mi, Gi, k, M, G...)"))?;
        let multiplier = match caps.get(2).map(|m| m.as_str()) {
            None => 1,
            Some("K") => 1_000,
            Some(unit) => BINARY_UNITS
                .iter()
                .chain(DECIMAL_UNITS.iter())
                .find(|(name, _)| *name == unit)
                .map(|(_, factor)| *factor)
                .ok_or_else(|| invalid(text, "unknown unit"))?,
        };
        let number: f64 = caps[1].parse().map_err(|_| invalid(text, "not a number"))?;
        let bytes = number * multiplier as f64;
        if bytes.fract() != 0.0 || bytes > u64::MAX as f64 {
            return Err(invalid(text, "not a whole number of bytes"));
        }
        Ok(Self { bytes: bytes as u64 })
    }

    fn best_unit(&self, units: &[(&'static str, u64)]) -> Option<(u64, &'static str)> {
        units
            .iter()
            .find(|(_, factor)| self.bytes >= *factor && self.bytes % factor == 0)
            .map(|(name, factor)| (self.bytes / factor, *name))
    }
}

impl fmt::Display for MemoryQuantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let candidates = [self.best_unit(&BINARY_UNITS), self.best_unit(&DECIMAL_UNITS)];
        match candidates.into_iter().flatten().min_by_key(|(n, _)| *n) {
            Some((n, unit)) => write!(f, "{}{}", n, unit),
            None => write!(f, "{}", self.bytes),
        }
    }
}

impl FromStr for MemoryQuantity {
    type Err = DagflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for MemoryQuantity {
    type Error = DagflowError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<MemoryQuantity> for String {
    fn from(value: MemoryQuantity) -> Self {
        value.to_string()
    }
}

/// Compute requirements and placement constraints for a task.
///
/// Immutable: every `with_*` call returns a new profile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    cpu_request: Option<CpuQuantity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    cpu_limit: Option<CpuQuantity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    memory_request: Option<MemoryQuantity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    memory_limit: Option<MemoryQuantity>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    node_selector: BTreeMap<String, String>,
}

impl ResourceProfile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cpu_request(&self, cpu: CpuQuantity) -> Self {
        Self {
            cpu_request: Some(cpu),
            ..self.clone()
        }
    }

    pub fn with_cpu_limit(&self, cpu: CpuQuantity) -> Self {
        Self {
            cpu_limit: Some(cpu),
            ..self.clone()
        }
    }

    pub fn with_memory_request(&self, memory: MemoryQuantity) -> Self {
        Self {
            memory_request: Some(memory),
            ..self.clone()
        }
    }

    pub fn with_memory_limit(&self, memory: MemoryQuantity) -> Self {
        Self {
            memory_limit: Some(memory),
            ..self.clone()
        }
    }

    pub fn with_node_selector(&self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.node_selector.insert(key.into(), value.into());
        next
    }

    /// Parse request and limit quantities in one go, e.g. `("500m", "1000m", "1Gi", "2Gi")`
    pub fn parse(
        cpu_request: &str,
        cpu_limit: &str,
        memory_request: &str,
        memory_limit: &str,
    ) -> Result<Self, DagflowError> {
        Ok(Self::new()
            .with_cpu_request(cpu_request.parse()?)
            .with_cpu_limit(cpu_limit.parse()?)
            .with_memory_request(memory_request.parse()?)
            .with_memory_limit(memory_limit.parse()?))
    }

    pub fn cpu_request(&self) -> Option<CpuQuantity> {
        self.cpu_request
    }

    pub fn cpu_limit(&self) -> Option<CpuQuantity> {
        self.cpu_limit
    }

    pub fn memory_request(&self) -> Option<MemoryQuantity> {
        self.memory_request
    }

    pub fn memory_limit(&self) -> Option<MemoryQuantity> {
        self.memory_limit
    }

    pub fn node_selector(&self) -> &BTreeMap<String, String> {
        &self.node_selector
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Overlay `overrides` on this profile; set fields in `overrides` win
    pub fn merged_with(&self, overrides: &ResourceProfile) -> Self {
        let mut node_selector = self.node_selector.clone();
        node_selector.extend(overrides.node_selector.clone());
        Self {
            cpu_request: overrides.cpu_request.or(self.cpu_request),
            cpu_limit: overrides.cpu_limit.or(self.cpu_limit),
            memory_request: overrides.memory_request.or(self.memory_request),
            memory_limit: overrides.memory_limit.or(self.memory_limit),
            node_selector,
        }
    }

    /// Advisory problems, such as a request above its limit
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if let (Some(req), Some(lim)) = (self.cpu_request, self.cpu_limit) {
            if req > lim {
                warnings.push(format!("cpu request {} exceeds limit {}", req, lim));
            }
        }
        if let (Some(req), Some(lim)) = (self.memory_request, self.memory_limit) {
            if req > lim {
                warnings.push(format!("memory request {} exceeds limit {}", req, lim));
            }
        }
        warnings
    }
}

impl fmt::Display for ResourceProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fmt_pair = |req: Option<String>, lim: Option<String>| match (req, lim) {
            (Some(r), Some(l)) => Some(format!("{}/{}", r, l)),
            (Some(r), None) => Some(r),
            (None, Some(l)) => Some(format!("-/{}", l)),
            (None, None) => None,
        };

        let mut parts = Vec::new();
        if let Some(cpu) = fmt_pair(
            self.cpu_request.map(|q| q.to_string()),
            self.cpu_limit.map(|q| q.to_string()),
        ) {
            parts.push(format!("cpu={}", cpu));
        }
        if let Some(mem) = fmt_pair(
            self.memory_request.map(|q| q.to_string()),
            self.memory_limit.map(|q| q.to_string()),
        ) {
            parts.push(format!("memory={}", mem));
        }
        for (k, v) in &self.node_selector {
            parts.push(format!("{}={}", k, v));
        }

        if parts.is_empty() {
            f.write_str("default")
        } else {
            f.write_str(&parts.join(" "))
        }
    }
}
