// ── Device catalog ──
//
// Turns raw enumerated ports into an ordered list of DMX USB Pro
// descriptors. Nothing is cached: every call re-enumerates.

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::error::DiscoveryError;
use crate::port::{self, PortEnumerator, PortInfo};

/// One DMX USB Pro as seen by a single scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub path: String,
    pub name: String,
    pub serial_number: String,
}

impl From<PortInfo> for DeviceDescriptor {
    fn from(port: PortInfo) -> Self {
        Self {
            path: port.path,
            name: port.product,
            serial_number: port.serial_number,
        }
    }
}

impl fmt::Display for DeviceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.path, self.serial_number)
    }
}

/// Ordered result of one scan. Order is enumeration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceCatalog {
    devices: Vec<DeviceDescriptor>,
}

impl DeviceCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a catalog from raw ports, keeping only DMX USB Pro matches.
    pub fn from_ports(ports: impl IntoIterator<Item = PortInfo>) -> Self {
        Self {
            devices: ports
                .into_iter()
                .filter(port::matches)
                .map(DeviceDescriptor::from)
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn first(&self) -> Option<&DeviceDescriptor> {
        self.devices.first()
    }

    pub fn find(&self, path: &str) -> Option<&DeviceDescriptor> {
        self.devices.iter().find(|d| d.path == path)
    }

    pub fn iter(&self) -> impl Iterator<Item = &DeviceDescriptor> {
        self.devices.iter()
    }
}

impl fmt::Display for DeviceCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, device) in self.devices.iter().enumerate() {
            writeln!(f, "[{i}] {device}")?;
        }
        Ok(())
    }
}

/// Discovery front-end over a [`PortEnumerator`].
#[derive(Clone)]
pub struct Discovery {
    enumerator: Arc<dyn PortEnumerator>,
}

impl Discovery {
    pub fn new(enumerator: Arc<dyn PortEnumerator>) -> Self {
        Self { enumerator }
    }

    /// Enumerate and filter. An empty match is an error, never an empty `Ok`.
    pub fn list_devices(&self) -> Result<DeviceCatalog, DiscoveryError> {
        let ports = self.enumerator.list_ports()?;
        let catalog = DeviceCatalog::from_ports(ports);
        if catalog.is_empty() {
            return Err(DiscoveryError::NoDeviceFound);
        }
        Ok(catalog)
    }

    /// Look a device up by its port path.
    pub fn find_device(&self, path: &str) -> Result<DeviceDescriptor, DiscoveryError> {
        let not_found = || DiscoveryError::NotFound {
            identifier: path.to_owned(),
        };
        let catalog = self.list_devices().map_err(|e| {
            debug!(error = %e, path, "lookup failed");
            not_found()
        })?;
        catalog.find(path).cloned().ok_or_else(not_found)
    }

    /// The first device in enumeration order.
    pub fn first_device(&self) -> Result<DeviceDescriptor, DiscoveryError> {
        let not_found = || DiscoveryError::NotFound {
            identifier: "first available device".into(),
        };
        let catalog = self.list_devices().map_err(|e| {
            debug!(error = %e, "no first device");
            not_found()
        })?;
        catalog.first().cloned().ok_or_else(not_found)
    }
}
