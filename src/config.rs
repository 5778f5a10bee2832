use std::path::Path;
use std::time::Duration;

use log::error;
use serde::{Deserialize, Serialize};

use crate::{
    governor::ThrottleCodes,
    models::{ResourceLifecycle, TagSet},
    Error, Result,
};

/// Rate budget of one governed API class
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GovernorConfig {
    /// Maximum burst, i.e. how many calls may fire back to back.
    /// Required: true
    /// Minimum: exclusive 0
    pub capacity: f64,

    /// Tokens replenished per second, i.e. the sustained call rate.
    /// Zero freezes the bucket once drained.
    /// Required: true
    /// Minimum: 0
    pub refill_rate: f64,

    /// acquire_timeout_ms bounds how long a call waits for its token.
    /// Waits indefinitely if not set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acquire_timeout_ms: Option<u64>,

    /// throttle_codes lists the provider error codes that signal throttling.
    /// Defaults to the common AWS throttling codes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub throttle_codes: Option<Vec<String>>,
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            capacity: 10.0,
            refill_rate: 5.0,
            acquire_timeout_ms: None,
            throttle_codes: None,
        }
    }
}

impl GovernorConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.capacity.is_finite() || self.capacity <= 0.0 {
            let msg = format!("Capacity must be positive, got {}", self.capacity);
            error!("{msg}");
            return Err(Error::Config(msg));
        }
        if !self.refill_rate.is_finite() || self.refill_rate < 0.0 {
            let msg = format!("Refill rate must not be negative, got {}", self.refill_rate);
            error!("{msg}");
            return Err(Error::Config(msg));
        }
        if let Some(0) = self.acquire_timeout_ms {
            let msg = "Acquire timeout must be at least 1 millisecond".to_string();
            error!("{msg}");
            return Err(Error::Config(msg));
        }
        if let Some(codes) = &self.throttle_codes {
            if codes.iter().any(|c| c.trim().is_empty()) {
                let msg = "Throttle codes must not be empty".to_string();
                error!("{msg}");
                return Err(Error::Config(msg));
            }
        }
        Ok(())
    }

    pub fn acquire_timeout(&self) -> Option<Duration> {
        self.acquire_timeout_ms.map(Duration::from_millis)
    }

    pub fn throttle_codes(&self) -> ThrottleCodes {
        match &self.throttle_codes {
            Some(codes) => ThrottleCodes::new(codes.iter().cloned()),
            None => ThrottleCodes::default(),
        }
    }
}

/// Identity of the cluster whose resources are reconciled, and the tags
/// every one of them should carry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterScope {
    /// Name of the cluster object, used in ownership tags.
    pub name: String,

    /// Name of the cluster as known to Kubernetes, used as the `Name` tag.
    pub kubernetes_cluster_name: String,

    pub lifecycle: ResourceLifecycle,

    pub additional_tags: TagSet,
}

impl ClusterScope {
    pub fn new<S: Into<String>>(name: S) -> Self {
        let name = name.into();
        Self {
            kubernetes_cluster_name: name.clone(),
            name,
            lifecycle: ResourceLifecycle::Owned,
            additional_tags: TagSet::new(),
        }
    }

    pub fn with_additional_tags(mut self, tags: TagSet) -> Self {
        self.additional_tags = tags;
        self
    }
}

/// Reconciler configuration, usually read from a JSON file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReconcilerConfig {
    /// cluster_name names the owning cluster.
    /// Required: true
    pub cluster_name: String,

    /// kubernetes_cluster_name is the cluster name as seen by Kubernetes.
    /// Defaults to cluster_name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kubernetes_cluster_name: Option<String>,

    /// additional_tags are merged into the desired tags of every resource.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_tags: Option<TagSet>,

    /// governor is the rate budget shared by all reconciliation passes.
    #[serde(default)]
    pub governor: GovernorConfig,
}

impl ReconcilerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.cluster_name.trim().is_empty() {
            let msg = "Cluster name must be specified in configuration".to_string();
            error!("{msg}");
            return Err(Error::Config(msg));
        }
        if let Some(name) = &self.kubernetes_cluster_name {
            if name.trim().is_empty() {
                let msg = "Kubernetes cluster name must not be empty".to_string();
                error!("{msg}");
                return Err(Error::Config(msg));
            }
        }
        if let Some(tags) = &self.additional_tags {
            tags.validate()?;
        }
        self.governor.validate()
    }

    pub fn from_json(s: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(s).map_err(|e| {
            let msg = format!("Fail to parse reconciler config: {e}");
            error!("{msg}");
            Error::Decode(msg)
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            error!("Fail to read config {}: {e}", path.as_ref().display());
            e
        })?;
        Self::from_json(&content)
    }

    pub fn scope(&self) -> ClusterScope {
        ClusterScope {
            name: self.cluster_name.clone(),
            kubernetes_cluster_name: self
                .kubernetes_cluster_name
                .clone()
                .unwrap_or_else(|| self.cluster_name.clone()),
            lifecycle: ResourceLifecycle::Owned,
            additional_tags: self.additional_tags.clone().unwrap_or_default(),
        }
    }
}
