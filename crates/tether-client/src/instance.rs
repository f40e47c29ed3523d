//! Runtime registry entries.

use tether_protocol::ServiceRecord;

/// One addressable replica of a service, as tracked by the registry.
///
/// Instances are immutable once published; registry updates replace the
/// whole entry rather than mutating it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceInstance {
    /// `host:port`; uniquely keys the instance.
    pub addr: String,
    /// Service name, used to form the `<name>.Forward` method path.
    pub name: String,
    /// Registration state carried by the originating record.
    pub registered: bool,
}

impl ServiceInstance {
    pub fn from_record(record: &ServiceRecord) -> Self {
        Self {
            addr: record.config.service_addr.clone(),
            name: record.config.name.clone(),
            registered: record.registered,
        }
    }
}
