//! Device-allocated tensor storage and strided views
//!
//! [`TensorBuffer`] owns a block obtained from a [`Device`] and returns it on
//! drop. [`TensorMap`] is a typed, strided view over a borrowed slice, used both
//! on top of a buffer and over plain host memory.

use std::fmt;
use std::mem::size_of;
use std::ops::Index;
use std::ptr::NonNull;
use std::sync::Arc;

use crate::data_type::{DataType, Element};
use crate::device::Device;
use crate::error::GraphError;

/// Largest supported tensor rank.
pub const MAX_RANK: usize = 16;

/// Fixed-capacity list of dimensions, used for shapes and strides.
///
/// Entries past `rank` are always zero, so equality compares only the used
/// prefix.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct LayoutArray {
    dims: [usize; MAX_RANK],
    rank: usize,
}

impl LayoutArray {
    /// Create a layout from `dims`.
    pub fn new(dims: &[usize]) -> Result<Self, GraphError> {
        let mut layout = LayoutArray::default();
        layout.set(dims)?;
        Ok(layout)
    }

    /// Replace the contents with `dims`. Fails without modification when
    /// `dims` holds more than [`MAX_RANK`] entries.
    pub fn set(&mut self, dims: &[usize]) -> Result<(), GraphError> {
        if dims.len() > MAX_RANK {
            return Err(GraphError::LayoutTooLarge {
                max: MAX_RANK,
                rank: dims.len(),
            });
        }
        self.dims = [0; MAX_RANK];
        self.dims[..dims.len()].copy_from_slice(dims);
        self.rank = dims.len();
        Ok(())
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.dims[..self.rank]
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.as_slice().iter().copied()
    }

    /// Product of all dimensions, or `None` on overflow. Rank 0 holds one
    /// element.
    pub fn checked_num_elements(&self) -> Option<usize> {
        self.iter().try_fold(1usize, |acc, dim| acc.checked_mul(dim))
    }

    /// Product of all dimensions, saturating at `usize::MAX`.
    pub fn num_elements(&self) -> usize {
        self.checked_num_elements().unwrap_or(usize::MAX)
    }

    /// Row-major strides for this shape.
    pub fn naive_strides(&self) -> LayoutArray {
        let mut strides = LayoutArray {
            dims: [0; MAX_RANK],
            rank: self.rank,
        };
        let mut stride = 1usize;
        for axis in (0..self.rank).rev() {
            strides.dims[axis] = stride;
            stride = stride.saturating_mul(self.dims[axis]);
        }
        strides
    }
}

impl fmt::Debug for LayoutArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.as_slice()).finish()
    }
}

impl Index<usize> for LayoutArray {
    type Output = usize;

    fn index(&self, axis: usize) -> &usize {
        &self.as_slice()[axis]
    }
}

/// Block of device memory holding `size` elements of `dtype`.
///
/// The buffer keeps its device alive through an `Arc`, so it stays valid
/// across a registry teardown.
pub struct TensorBuffer {
    dtype: DataType,
    shape: LayoutArray,
    size: usize,
    data: NonNull<u8>,
    device: Arc<Device>,
}

// SAFETY: the buffer exclusively owns its allocation; access to the memory
// goes through `&self`/`&mut self`, and the device serializes malloc/free.
unsafe impl Send for TensorBuffer {}

impl TensorBuffer {
    /// Allocate a buffer of `shape` on `device`.
    pub fn new(dtype: DataType, shape: LayoutArray, device: Arc<Device>) -> Result<Self, GraphError> {
        let size = checked_size(dtype, &shape)?;
        let data = device.malloc(dtype, size)?;
        log::trace!(
            "tensor buffer {:?} of {} on {} ({} bytes)",
            shape,
            dtype,
            device.name(),
            size * dtype.size()
        );
        Ok(Self {
            dtype,
            shape,
            size,
            data,
            device,
        })
    }

    pub fn dtype(&self) -> DataType {
        self.dtype
    }

    pub fn shape(&self) -> &LayoutArray {
        &self.shape
    }

    /// Number of elements.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn byte_size(&self) -> usize {
        self.size * self.dtype.size()
    }

    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    /// Raw pointer to the first byte of the block.
    pub fn data_ptr(&self) -> NonNull<u8> {
        self.data
    }

    /// Change the shape without touching the data.
    ///
    /// Only size-preserving reshapes are accepted; on mismatch the buffer
    /// keeps its current shape.
    pub fn reshape(&mut self, dims: &[usize]) -> Result<(), GraphError> {
        let shape = LayoutArray::new(dims)?;
        let size = checked_size(self.dtype, &shape)?;
        let current = self.byte_size();
        let requested = size * self.dtype.size();
        if current != requested {
            return Err(GraphError::ReshapeMismatch { current, requested });
        }
        self.shape = shape;
        Ok(())
    }

    /// Typed row-major view over the whole buffer.
    pub fn map<T: Element>(&mut self) -> Result<TensorMap<'_, T>, GraphError> {
        let element = size_of::<T>();
        if element != self.dtype.size() {
            return Err(GraphError::ElementSizeMismatch {
                dtype: self.dtype,
                element,
                expected: self.dtype.size(),
            });
        }
        if T::DTYPE != self.dtype {
            return Err(GraphError::ElementTypeMismatch {
                dtype: self.dtype,
                requested: T::DTYPE,
            });
        }
        // SAFETY: the block holds `size` elements of `T`, is aligned to the
        // element size and is borrowed mutably through `self`.
        let data = unsafe { std::slice::from_raw_parts_mut(self.data.as_ptr() as *mut T, self.size) };
        TensorMap::with_naive_strides(data, self.shape)
    }
}

impl fmt::Debug for TensorBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TensorBuffer")
            .field("dtype", &self.dtype)
            .field("shape", &self.shape)
            .field("device", &self.device.name())
            .finish()
    }
}

impl Drop for TensorBuffer {
    fn drop(&mut self) {
        if let Err(err) = self.device.free(self.dtype, self.data) {
            log::warn!("failed to release tensor buffer: {}", err);
        }
    }
}

fn checked_size(dtype: DataType, shape: &LayoutArray) -> Result<usize, GraphError> {
    shape
        .checked_num_elements()
        .filter(|size| size.checked_mul(dtype.size()).is_some())
        .ok_or_else(|| GraphError::ElementCountOverflow {
            shape: shape.as_slice().to_vec(),
        })
}

/// Strided view of `T` elements over a borrowed slice.
///
/// The flat offset of an index is `sum(index[i] * strides[i])`.
pub struct TensorMap<'a, T> {
    data: &'a mut [T],
    shape: LayoutArray,
    strides: LayoutArray,
}

impl<'a, T: Element> TensorMap<'a, T> {
    /// Create a view with explicit strides.
    ///
    /// Ranks must match, no dimension may be zero, and every addressable
    /// element must lie inside `data`.
    pub fn new(data: &'a mut [T], shape: LayoutArray, strides: LayoutArray) -> Result<Self, GraphError> {
        if shape.rank() != strides.rank() {
            return Err(GraphError::LayoutRankMismatch {
                shape: shape.rank(),
                strides: strides.rank(),
            });
        }
        if let Some(dim) = shape.iter().position(|d| d == 0) {
            return Err(GraphError::ZeroDimension { dim });
        }

        let furthest = shape
            .iter()
            .zip(strides.iter())
            .try_fold(0usize, |acc, (dim, stride)| {
                (dim - 1).checked_mul(stride).and_then(|step| acc.checked_add(step))
            });
        let required = furthest.and_then(|offset| offset.checked_add(1)).unwrap_or(usize::MAX);
        if required > data.len() {
            return Err(GraphError::MapOutOfBounds {
                required,
                available: data.len(),
            });
        }

        Ok(Self {
            data,
            shape,
            strides,
        })
    }

    /// Create a view with row-major strides.
    pub fn with_naive_strides(data: &'a mut [T], shape: LayoutArray) -> Result<Self, GraphError> {
        let strides = shape.naive_strides();
        Self::new(data, shape, strides)
    }

    pub fn shape(&self) -> &LayoutArray {
        &self.shape
    }

    pub fn strides(&self) -> &LayoutArray {
        &self.strides
    }

    pub fn rank(&self) -> usize {
        self.shape.rank()
    }

    /// Flat offset of `indices`.
    pub fn offset(&self, indices: &[usize]) -> Result<usize, GraphError> {
        let in_bounds = indices.len() == self.shape.rank()
            && indices.iter().zip(self.shape.iter()).all(|(&i, dim)| i < dim);
        if !in_bounds {
            return Err(GraphError::IndexOutOfBounds {
                indices: indices.to_vec(),
                shape: self.shape.as_slice().to_vec(),
            });
        }
        Ok(indices
            .iter()
            .zip(self.strides.iter())
            .map(|(&i, stride)| i * stride)
            .sum())
    }

    pub fn get(&self, indices: &[usize]) -> Result<T, GraphError> {
        let offset = self.offset(indices)?;
        Ok(self.data[offset])
    }

    pub fn get_mut(&mut self, indices: &[usize]) -> Result<&mut T, GraphError> {
        let offset = self.offset(indices)?;
        Ok(&mut self.data[offset])
    }

    pub fn set(&mut self, indices: &[usize], value: T) -> Result<(), GraphError> {
        *self.get_mut(indices)? = value;
        Ok(())
    }

    /// The underlying storage, including elements skipped by the strides.
    pub fn as_slice(&self) -> &[T] {
        self.data
    }
}
