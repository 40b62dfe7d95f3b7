//! Ops and their kernels.
//!
//! An [`Op`] is the abstract, device-agnostic description of an operation
//! (arity, required attributes, output shape functions). Each op carries an
//! ordered list of [`OpKernelDef`]s, the concrete implementations selected at
//! compile time by device type and dtype signature.

mod builder;
mod registry;

pub use builder::{OpBuilder, OpKernelDefBuilder};
pub use registry::OpRegistry;

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::context::{ComputeContext, OpKernelContext};
use crate::data_type::DataType;
use crate::error::GraphError;
use crate::tensor::LayoutArray;

/// Computes the shape of one op output.
pub type ShapeFn = Arc<dyn Fn(&ComputeContext) -> Result<LayoutArray, GraphError> + Send + Sync>;

/// Instantiates a kernel for one compiled node.
pub type KernelFactory =
    Arc<dyn Fn(&OpKernelContext<'_>) -> Result<Box<dyn OpKernel>, GraphError> + Send + Sync>;

/// Concrete compute unit owned by an executable node.
pub trait OpKernel: Send {
    fn compute(&mut self, context: &mut ComputeContext) -> Result<(), GraphError>;
}

/// Kernel types that can be registered through [`OpKernelDefBuilder`].
pub trait ConstructKernel: OpKernel + Sized + 'static {
    fn construct(context: &OpKernelContext<'_>) -> Result<Self, GraphError>;
}

/// One registered implementation of an op.
pub struct OpKernelDef {
    device_type: String,
    input_dtypes: Vec<DataType>,
    output_dtypes: Vec<DataType>,
    create_fn: KernelFactory,
}

impl OpKernelDef {
    pub(crate) fn new(
        device_type: String,
        input_dtypes: Vec<DataType>,
        output_dtypes: Vec<DataType>,
        create_fn: KernelFactory,
    ) -> Self {
        Self {
            device_type,
            input_dtypes,
            output_dtypes,
            create_fn,
        }
    }

    /// Device type the kernel runs on.
    pub fn device_type(&self) -> &str {
        &self.device_type
    }

    pub fn input_dtypes(&self) -> &[DataType] {
        &self.input_dtypes
    }

    pub fn output_dtypes(&self) -> &[DataType] {
        &self.output_dtypes
    }

    pub fn num_inputs(&self) -> usize {
        self.input_dtypes.len()
    }

    pub fn num_outputs(&self) -> usize {
        self.output_dtypes.len()
    }

    pub fn create(&self, context: &OpKernelContext<'_>) -> Result<Box<dyn OpKernel>, GraphError> {
        (self.create_fn)(context)
    }
}

impl fmt::Debug for OpKernelDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpKernelDef")
            .field("device_type", &self.device_type)
            .field("input_dtypes", &self.input_dtypes)
            .field("output_dtypes", &self.output_dtypes)
            .finish()
    }
}

/// Abstract operation.
pub struct Op {
    name: String,
    num_inputs: usize,
    attributes: BTreeSet<String>,
    out_shape_fns: Vec<ShapeFn>,
    kernels: RwLock<Vec<Arc<OpKernelDef>>>,
}

impl Op {
    pub(crate) fn new(
        name: String,
        num_inputs: usize,
        attributes: BTreeSet<String>,
        out_shape_fns: Vec<ShapeFn>,
    ) -> Self {
        Self {
            name,
            num_inputs,
            attributes,
            out_shape_fns,
            kernels: RwLock::new(Vec::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn num_inputs(&self) -> usize {
        self.num_inputs
    }

    pub fn num_outputs(&self) -> usize {
        self.out_shape_fns.len()
    }

    /// Required attribute names.
    pub fn attributes(&self) -> &BTreeSet<String> {
        &self.attributes
    }

    /// Evaluate the shape function of output `index`.
    pub fn out_shape(&self, index: usize, context: &ComputeContext) -> Result<LayoutArray, GraphError> {
        let shape_fn = self
            .out_shape_fns
            .get(index)
            .ok_or_else(|| GraphError::OutputSlotOutOfRange {
                node: self.name.clone(),
                outputs: self.num_outputs(),
                slot: index,
            })?;
        shape_fn(context)
    }

    /// Registered kernels in registration order.
    pub fn kernels(&self) -> Vec<Arc<OpKernelDef>> {
        self.kernels.read().clone()
    }

    pub fn num_kernels(&self) -> usize {
        self.kernels.read().len()
    }

    pub(crate) fn push_kernel(&self, kernel: OpKernelDef) {
        self.kernels.write().push(Arc::new(kernel));
    }
}

impl fmt::Debug for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Op")
            .field("name", &self.name)
            .field("num_inputs", &self.num_inputs)
            .field("num_outputs", &self.num_outputs())
            .field("attributes", &self.attributes)
            .field("kernels", &self.num_kernels())
            .finish()
    }
}
