use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;

use super::{Device, DeviceFactory};
use crate::error::GraphError;

#[derive(Default)]
struct DeviceTable {
    devices: HashMap<String, Arc<Device>>,
    factories: HashMap<String, Box<dyn DeviceFactory>>,
    frozen: bool,
}

impl DeviceTable {
    /// First free name of the form `<base>:<n>`, scanning `n` upward from 0.
    fn unique_name(&self, base: &str) -> String {
        let mut index = 0usize;
        loop {
            let name = format!("{}:{}", base, index);
            if !self.devices.contains_key(&name) {
                return name;
            }
            index += 1;
        }
    }

    fn check_registrable(&self, device_type: &str) -> Result<(), GraphError> {
        if self.frozen {
            return Err(GraphError::frozen("device", device_type));
        }
        if self.factories.contains_key(device_type) {
            return Err(GraphError::DuplicateDeviceType {
                device_type: device_type.to_string(),
            });
        }
        Ok(())
    }
}

/// Registry of device factories (one per type) and the devices they found.
///
/// Registration is meant to happen during start-up. After [`freeze`] the
/// registry rejects further registrations and is only read.
///
/// [`freeze`]: DeviceRegistry::freeze
#[derive(Default)]
pub struct DeviceRegistry {
    table: RwLock<DeviceTable>,
}

static DEVICE_REGISTRY: OnceLock<DeviceRegistry> = OnceLock::new();

impl DeviceRegistry {
    /// A standalone registry, independent of the process-wide one.
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry.
    pub fn instance() -> &'static DeviceRegistry {
        DEVICE_REGISTRY.get_or_init(DeviceRegistry::new)
    }

    /// Register `factory` under `device_type` and run its discovery.
    ///
    /// Returns the names assigned to the discovered devices. On any failure
    /// the registry is left untouched.
    pub fn register_device(
        &self,
        device_type: &str,
        factory: Box<dyn DeviceFactory>,
    ) -> Result<Vec<String>, GraphError> {
        self.table.read().check_registrable(device_type)?;

        // Discovery runs unlocked so factories may query the registry.
        let backends = factory.discover_devices().map_err(|err| {
            GraphError::DiscoveryFailed {
                device_type: device_type.to_string(),
                reason: err.to_string(),
            }
        })?;

        let mut table = self.table.write();
        table.check_registrable(device_type)?;

        let mut names = Vec::with_capacity(backends.len());
        for backend in backends {
            let name = table.unique_name(device_type);
            let device = Device::new(name.clone(), device_type.to_string(), backend);
            table.devices.insert(name.clone(), Arc::new(device));
            names.push(name);
        }
        table.factories.insert(device_type.to_string(), factory);

        log::info!(
            "registered device type `{}` with {} device(s): {}",
            device_type,
            names.len(),
            names.join(", ")
        );
        Ok(names)
    }

    pub fn has_device(&self, name: &str) -> bool {
        self.table.read().devices.contains_key(name)
    }

    pub fn get_device(&self, name: &str) -> Result<Arc<Device>, GraphError> {
        self.table
            .read()
            .devices
            .get(name)
            .cloned()
            .ok_or_else(|| GraphError::DeviceNotFound {
                name: name.to_string(),
            })
    }

    /// Names of all device instances, sorted.
    pub fn device_list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.table.read().devices.keys().cloned().collect();
        names.sort_unstable();
        names
    }

    pub fn has_device_type(&self, device_type: &str) -> bool {
        self.table.read().factories.contains_key(device_type)
    }

    pub fn num_devices(&self) -> usize {
        self.table.read().devices.len()
    }

    pub fn num_factories(&self) -> usize {
        self.table.read().factories.len()
    }

    /// End the registration phase.
    pub fn freeze(&self) {
        self.table.write().frozen = true;
        log::debug!("device registry frozen");
    }

    pub fn is_frozen(&self) -> bool {
        self.table.read().frozen
    }

    /// Drop every device and factory and reopen the registry for registration.
    ///
    /// Devices still referenced elsewhere (for example by live tensor buffers)
    /// are destroyed when their last reference goes away.
    pub fn teardown(&self) {
        let (devices, factories) = {
            let mut table = self.table.write();
            table.frozen = false;
            (
                std::mem::take(&mut table.devices),
                std::mem::take(&mut table.factories),
            )
        };
        log::info!(
            "device registry teardown: {} device(s), {} factory(ies)",
            devices.len(),
            factories.len()
        );
        drop(devices);
        drop(factories);
    }
}
