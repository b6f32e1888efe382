//! Device attribute lookup
//!
//! The manager owns one resolver for its lifetime; callers borrow shared
//! handles and never own it.

use crate::core::errors::{ColexError, Result};
use crate::types::DeviceAttributes;
use std::collections::HashMap;

/// Maps abstract device names to concrete attributes
pub trait DeviceResolver: Send + Sync {
    /// Look up attributes for a device name
    fn device_attributes(&self, name: &str) -> Result<DeviceAttributes>;

    /// All device names known to this resolver
    fn all_device_names(&self) -> Vec<String>;
}

/// Resolver over a fixed device set known at construction time
pub struct StaticDeviceResolver {
    devices: HashMap<String, DeviceAttributes>,
}

impl StaticDeviceResolver {
    pub fn new(devices: Vec<DeviceAttributes>) -> Self {
        let devices = devices.into_iter().map(|d| (d.name.clone(), d)).collect();
        Self { devices }
    }
}

impl DeviceResolver for StaticDeviceResolver {
    fn device_attributes(&self, name: &str) -> Result<DeviceAttributes> {
        self.devices
            .get(name)
            .cloned()
            .ok_or_else(|| ColexError::internal(format!("unknown device: {}", name)))
    }

    fn all_device_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.devices.keys().cloned().collect();
        names.sort();
        names
    }
}
