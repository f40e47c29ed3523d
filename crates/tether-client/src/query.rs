//! Service queries.
//!
//! A query names the slice of the registry a client is interested in.
//! Records live under `/services/<name>[/<version>[/<region>]]/...`; the
//! version constraint must be set for the region constraint to apply, since
//! the region occupies the path segment after the version.

/// Selects the service instances a client dispatches to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    pub service: String,
    pub version: Option<String>,
    pub region: Option<String>,
}

impl Query {
    /// Query all instances of a service, any version, any region.
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            version: None,
            region: None,
        }
    }

    /// Constrain the query to one service version
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Constrain the query to one region
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    /// The store path this query enumerates and watches.
    pub fn base_path(&self) -> String {
        let mut path = format!("/services/{}", self.service);
        if let Some(version) = &self.version {
            path.push('/');
            path.push_str(version);
            if let Some(region) = &self.region {
                path.push('/');
                path.push_str(region);
            }
        }
        path
    }

    /// Whether a store path falls inside this query.
    pub fn path_matches(&self, path: &str) -> bool {
        let mut parts = path.trim_start_matches('/').split('/');

        if parts.next() != Some("services") {
            return false;
        }
        if parts.next() != Some(self.service.as_str()) {
            return false;
        }
        if let Some(version) = &self.version {
            if parts.next() != Some(version.as_str()) {
                return false;
            }
            if let Some(region) = &self.region {
                if parts.next() != Some(region.as_str()) {
                    return false;
                }
            }
        }
        true
    }
}
