//! Resolution of connection settings into a store deployment topology.
//!
//! Precedence is fixed: cluster settings win over sentinel settings, which win
//! over the standalone URL. A configuration that names cluster nodes therefore
//! always maps to the cluster, whatever else it also contains.

use crate::error::{FrontierError, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_URL: &str = "redis://127.0.0.1:6379";

/// Raw connection settings as a host would configure them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    /// Standalone server URL.
    pub url: Option<String>,
    /// Cluster node URLs.
    pub cluster_nodes: Vec<String>,
    pub cluster_password: Option<String>,
    /// Sentinel service (master group) name.
    pub sentinel_service: Option<String>,
    /// Sentinel node URLs.
    pub sentinel_nodes: Vec<String>,
}

/// The deployment a set of settings resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreTopology {
    Standalone {
        url: String,
    },
    /// No cross-slot transactions; multi-step atomics must be scripts.
    Cluster {
        nodes: Vec<String>,
        password: Option<String>,
    },
    /// Resolves to the one writable master of `service`.
    Sentinel {
        service: String,
        nodes: Vec<String>,
    },
}

impl StoreTopology {
    pub fn is_cluster(&self) -> bool {
        matches!(self, StoreTopology::Cluster { .. })
    }

    pub fn name(&self) -> &'static str {
        match self {
            StoreTopology::Standalone { .. } => "standalone",
            StoreTopology::Cluster { .. } => "cluster",
            StoreTopology::Sentinel { .. } => "sentinel",
        }
    }
}

impl StoreSettings {
    pub fn standalone(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::default()
        }
    }

    pub fn cluster<I, S>(nodes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            cluster_nodes: nodes.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn sentinel<I, S>(service: impl Into<String>, nodes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            sentinel_service: Some(service.into()),
            sentinel_nodes: nodes.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Picks the topology: cluster > sentinel > standalone.
    pub fn resolve(&self) -> Result<StoreTopology> {
        if !self.cluster_nodes.is_empty() {
            return Ok(StoreTopology::Cluster {
                nodes: self.cluster_nodes.clone(),
                password: self.cluster_password.clone(),
            });
        }

        match (&self.sentinel_service, self.sentinel_nodes.is_empty()) {
            (Some(service), false) => {
                return Ok(StoreTopology::Sentinel {
                    service: service.clone(),
                    nodes: self.sentinel_nodes.clone(),
                });
            }
            (Some(_), true) => {
                return Err(FrontierError::config(
                    "sentinel_service is set but no sentinel_nodes were given.",
                ));
            }
            (None, false) => {
                return Err(FrontierError::config(
                    "sentinel_nodes are set but no sentinel_service was given.",
                ));
            }
            (None, true) => {}
        }

        let url = self.url.clone().unwrap_or_else(|| DEFAULT_URL.to_string());
        if url.trim().is_empty() {
            return Err(FrontierError::config("store url must not be empty."));
        }
        Ok(StoreTopology::Standalone { url })
    }
}
