use std::alloc::{self, Layout};
use std::ptr::NonNull;

use super::{DeviceBackend, DeviceFactory};
use crate::config::ContextProperties;
use crate::error::GraphError;

pub const CPU_DEVICE_TYPE: &str = "CPU";

/// Host memory device backed by the global allocator.
#[derive(Debug)]
pub struct CpuDevice {
    max_allocation: usize,
}

impl CpuDevice {
    pub fn new(max_allocation: usize) -> Self {
        Self { max_allocation }
    }
}

impl DeviceBackend for CpuDevice {
    fn status(&self) -> Result<(), GraphError> {
        Ok(())
    }

    fn max_allocation(&self) -> usize {
        self.max_allocation
    }

    fn malloc(&self, layout: Layout) -> Option<NonNull<u8>> {
        // SAFETY: Device::malloc never requests a zero-sized layout.
        NonNull::new(unsafe { alloc::alloc(layout) })
    }

    unsafe fn free(&self, ptr: NonNull<u8>, layout: Layout) {
        // SAFETY: guaranteed by the caller contract of DeviceBackend::free.
        unsafe { alloc::dealloc(ptr.as_ptr(), layout) }
    }
}

/// Reports `device_count` host devices.
#[derive(Debug, Clone)]
pub struct CpuFactory {
    device_count: usize,
    max_allocation: usize,
}

impl CpuFactory {
    pub fn new(properties: &ContextProperties) -> Self {
        Self {
            device_count: properties.cpu_device_count,
            max_allocation: properties.tensor_byte_length_limit,
        }
    }
}

impl Default for CpuFactory {
    fn default() -> Self {
        Self::new(&ContextProperties::default())
    }
}

impl DeviceFactory for CpuFactory {
    fn discover_devices(&self) -> Result<Vec<Box<dyn DeviceBackend>>, GraphError> {
        Ok((0..self.device_count)
            .map(|_| Box::new(CpuDevice::new(self.max_allocation)) as Box<dyn DeviceBackend>)
            .collect())
    }
}
