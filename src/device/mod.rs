//! Compute devices.
//!
//! A [`DeviceBackend`] is the raw backend implementation (allocator, status
//! check, kernel launch). The registry wraps every discovered backend in a
//! [`Device`], which carries the registry-assigned name and serializes all
//! allocation traffic behind its own lock.

mod cpu;
mod registry;

pub use cpu::{CPU_DEVICE_TYPE, CpuDevice, CpuFactory};
pub use registry::DeviceRegistry;

use std::alloc::Layout;
use std::collections::HashMap;
use std::fmt;
use std::ptr::NonNull;

use parking_lot::Mutex;

use crate::context::ComputeContext;
use crate::data_type::DataType;
use crate::error::GraphError;
use crate::op::OpKernel;

/// Backend implementation of one physical or logical compute unit.
pub trait DeviceBackend: Send + Sync {
    /// Health check.
    fn status(&self) -> Result<(), GraphError>;

    /// Largest single allocation this backend accepts, in bytes.
    fn max_allocation(&self) -> usize {
        usize::MAX
    }

    /// Allocate a block for `layout`. `None` reports allocator exhaustion.
    ///
    /// `layout.size()` is never zero.
    fn malloc(&self, layout: Layout) -> Option<NonNull<u8>>;

    /// Release a block.
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by `malloc` on this backend with the same
    /// `layout` and must not have been released already.
    unsafe fn free(&self, ptr: NonNull<u8>, layout: Layout);

    /// Run a kernel on this device.
    fn compute(
        &self,
        kernel: &mut dyn OpKernel,
        context: &mut ComputeContext,
    ) -> Result<(), GraphError> {
        kernel.compute(context)
    }
}

/// Discovers every device of one type. Exactly one factory exists per type.
pub trait DeviceFactory: Send + Sync {
    fn discover_devices(&self) -> Result<Vec<Box<dyn DeviceBackend>>, GraphError>;
}

#[derive(Debug, Clone, Copy)]
struct LiveBlock {
    dtype: DataType,
    bytes: usize,
    layout: Layout,
}

#[derive(Debug, Default)]
struct AllocationTable {
    blocks: HashMap<usize, LiveBlock>,
    live_bytes: usize,
}

/// A registered device instance.
///
/// Devices are created by [`DeviceRegistry`] and shared as `Arc<Device>`; they
/// are never cloned.
pub struct Device {
    name: String,
    device_type: String,
    backend: Box<dyn DeviceBackend>,
    allocations: Mutex<AllocationTable>,
}

impl Device {
    pub(crate) fn new(name: String, device_type: String, backend: Box<dyn DeviceBackend>) -> Self {
        Self {
            name,
            device_type,
            backend,
            allocations: Mutex::new(AllocationTable::default()),
        }
    }

    /// Registry-assigned name, `"<type>:<index>"`.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn device_type(&self) -> &str {
        &self.device_type
    }

    pub fn status(&self) -> Result<(), GraphError> {
        self.backend.status()
    }

    /// Allocate `count` elements of `dtype`, aligned to the element size.
    ///
    /// A zero-element request still reserves one element so every live block
    /// has a distinct address.
    pub fn malloc(&self, dtype: DataType, count: usize) -> Result<NonNull<u8>, GraphError> {
        let element = dtype.size();
        let bytes = count
            .checked_mul(element)
            .ok_or_else(|| GraphError::ElementCountOverflow {
                shape: vec![count],
            })?;
        let limit = self.backend.max_allocation();
        if bytes > limit {
            return Err(GraphError::TensorLimit {
                device: self.name.clone(),
                bytes,
                limit,
            });
        }
        let layout = Layout::from_size_align(bytes.max(element), element).map_err(|_| {
            GraphError::AllocationFailed {
                device: self.name.clone(),
                bytes,
            }
        })?;

        let mut table = self.allocations.lock();
        let ptr = self
            .backend
            .malloc(layout)
            .ok_or_else(|| GraphError::AllocationFailed {
                device: self.name.clone(),
                bytes,
            })?;
        table.blocks.insert(
            ptr.as_ptr() as usize,
            LiveBlock {
                dtype,
                bytes,
                layout,
            },
        );
        table.live_bytes += bytes;
        log::trace!("{}: allocated {} bytes of {}", self.name, bytes, dtype);
        Ok(ptr)
    }

    /// Release a block returned by [`Device::malloc`] with the same `dtype`.
    ///
    /// Unknown pointers and dtype mismatches are reported and nothing is
    /// released. Never panics.
    pub fn free(&self, dtype: DataType, ptr: NonNull<u8>) -> Result<(), GraphError> {
        let mut table = self.allocations.lock();
        let key = ptr.as_ptr() as usize;
        let block = match table.blocks.get(&key) {
            Some(block) => *block,
            None => {
                return Err(GraphError::UnknownAllocation {
                    device: self.name.clone(),
                });
            }
        };
        if block.dtype != dtype {
            return Err(GraphError::FreeDtypeMismatch {
                device: self.name.clone(),
                allocated: block.dtype,
                freed: dtype,
            });
        }
        table.blocks.remove(&key);
        table.live_bytes -= block.bytes;
        // SAFETY: the table only holds blocks returned by this backend's malloc
        // with the recorded layout, and the entry was just removed.
        unsafe { self.backend.free(ptr, block.layout) };
        log::trace!("{}: freed {} bytes of {}", self.name, block.bytes, dtype);
        Ok(())
    }

    pub fn compute(
        &self,
        kernel: &mut dyn OpKernel,
        context: &mut ComputeContext,
    ) -> Result<(), GraphError> {
        self.backend.compute(kernel, context)
    }

    /// Number of outstanding blocks.
    pub fn live_allocations(&self) -> usize {
        self.allocations.lock().blocks.len()
    }

    /// Bytes requested by outstanding blocks.
    pub fn live_bytes(&self) -> usize {
        self.allocations.lock().live_bytes
    }
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("name", &self.name)
            .field("device_type", &self.device_type)
            .finish()
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        let table = self.allocations.get_mut();
        if table.blocks.is_empty() {
            return;
        }
        log::warn!(
            "{}: releasing {} leaked blocks ({} bytes)",
            self.name,
            table.blocks.len(),
            table.live_bytes
        );
        for (address, block) in table.blocks.drain() {
            if let Some(ptr) = NonNull::new(address as *mut u8) {
                // SAFETY: every entry came from this backend's malloc with the
                // recorded layout and was never released.
                unsafe { self.backend.free(ptr, block.layout) };
            }
        }
        table.live_bytes = 0;
    }
}
