//! A small computational-graph substrate.
//!
//! Ops describe operations abstractly; kernels implement them for a device
//! type and dtype signature. Callers assemble a [`GraphDef`] node by node with
//! [`NodeDefBuilder`], then [`GraphFactory`] compiles it into an executable
//! [`Graph`] whose nodes each own a resolved kernel instance. Tensors live in
//! device memory as [`TensorBuffer`]s and are read through [`TensorMap`]s.
//!
//! Registries are process-wide. Call [`init`] once at start-up, register ops
//! and kernels, then [`freeze`] before building graphs from several threads.

pub mod attr;
pub mod config;
pub mod context;
pub mod data_type;
pub mod device;
pub mod error;
pub mod factory;
pub mod graph;
pub mod graph_def;
pub mod graphviz;
pub mod node_def_builder;
pub mod op;
pub mod tensor;
pub mod validator;

#[cfg(test)]
mod test_support;

pub use attr::{AttrValue, AttributeMap};
pub use config::ContextProperties;
pub use context::{ComputeContext, OpKernelContext};
pub use data_type::{DataType, Element};
pub use device::{
    CPU_DEVICE_TYPE, CpuDevice, CpuFactory, Device, DeviceBackend, DeviceFactory, DeviceRegistry,
};
pub use error::{ErrorKind, GraphError};
pub use factory::GraphFactory;
pub use graph::{Edge, Graph, Node};
pub use graph_def::{EdgeDef, GraphDef, GraphId, NodeDef, NodeHandle};
pub use graphviz::graph_def_to_dot;
pub use node_def_builder::{BuilderState, NodeDefBuilder};
pub use op::{
    ConstructKernel, KernelFactory, Op, OpBuilder, OpKernel, OpKernelDef, OpKernelDefBuilder,
    OpRegistry, ShapeFn,
};
pub use tensor::{LayoutArray, MAX_RANK, TensorBuffer, TensorMap};
pub use validator::{GraphDefValidator, ValidationArtifacts};

/// Register the CPU device factory with default properties.
pub fn init() -> Result<(), GraphError> {
    init_with(&ContextProperties::default())
}

/// Register the CPU device factory configured by `properties`.
///
/// Calling it again once the CPU devices exist is a no-op.
pub fn init_with(properties: &ContextProperties) -> Result<(), GraphError> {
    let registry = DeviceRegistry::instance();
    if registry.has_device_type(CPU_DEVICE_TYPE) {
        return Ok(());
    }
    match registry.register_device(CPU_DEVICE_TYPE, Box::new(CpuFactory::new(properties))) {
        Ok(_) => Ok(()),
        Err(GraphError::DuplicateDeviceType { .. }) => {
            log::debug!("{} devices registered concurrently", CPU_DEVICE_TYPE);
            Ok(())
        }
        Err(err) => Err(err),
    }
}

/// End the registration phase of both process-wide registries.
pub fn freeze() {
    DeviceRegistry::instance().freeze();
    OpRegistry::instance().freeze();
}

/// Drop every registered op, kernel, device and factory and reopen both
/// registries.
pub fn teardown() {
    OpRegistry::instance().teardown();
    DeviceRegistry::instance().teardown();
}
