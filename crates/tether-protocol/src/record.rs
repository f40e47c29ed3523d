//! The service record published in the coordination store.
//!
//! Records are persisted as JSON with capitalized field names; the serde
//! renames below are part of the store contract and must not change.

use serde::{Deserialize, Serialize};

/// A service registration as stored by the coordination store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRecord {
    #[serde(rename = "Config")]
    pub config: ServiceConfig,
    /// `false` once the service has begun deregistering itself.
    #[serde(rename = "Registered")]
    pub registered: bool,
}

/// Static configuration of one service instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// `host:port` address; uniquely keys the instance in the registry.
    #[serde(rename = "ServiceAddr")]
    pub service_addr: String,
    /// Service name, used as the dotted method prefix (`<Name>.Forward`).
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Version", default)]
    pub version: String,
    #[serde(rename = "Region", default)]
    pub region: String,
}
