//! Contexts handed to kernels: one at construction time, one per compute call.

use crate::attr::{AttributeMap, attribute_path};
use crate::data_type::DataType;
use crate::error::GraphError;

/// Construction context of an op kernel.
///
/// Attribute lookups take a path relative to the node being compiled, so a
/// kernel asks for `"axis"` and receives the value stored at `"<node>/axis"`.
#[derive(Debug, Clone, Copy)]
pub struct OpKernelContext<'a> {
    node_name: &'a str,
    out_dtypes: &'a [DataType],
    attributes: &'a AttributeMap,
}

impl<'a> OpKernelContext<'a> {
    pub(crate) fn new(
        node_name: &'a str,
        out_dtypes: &'a [DataType],
        attributes: &'a AttributeMap,
    ) -> Self {
        Self {
            node_name,
            out_dtypes,
            attributes,
        }
    }

    pub fn node_name(&self) -> &str {
        self.node_name
    }

    /// Output element types requested for the node.
    pub fn out_dtypes(&self) -> &[DataType] {
        self.out_dtypes
    }

    pub fn has_attr(&self, path: &str) -> bool {
        self.attributes.contains(&self.absolute(path))
    }

    pub fn get_int32_attr(&self, path: &str) -> Result<i32, GraphError> {
        self.attributes.get_int32(&self.absolute(path))
    }

    pub fn get_int64_attr(&self, path: &str) -> Result<i64, GraphError> {
        self.attributes.get_int64(&self.absolute(path))
    }

    pub fn get_float_attr(&self, path: &str) -> Result<f32, GraphError> {
        self.attributes.get_float(&self.absolute(path))
    }

    pub fn get_double_attr(&self, path: &str) -> Result<f64, GraphError> {
        self.attributes.get_double(&self.absolute(path))
    }

    pub fn get_bool_attr(&self, path: &str) -> Result<bool, GraphError> {
        self.attributes.get_bool(&self.absolute(path))
    }

    fn absolute(&self, path: &str) -> String {
        attribute_path(self.node_name, path)
    }
}

/// Execution context passed to `OpKernel::compute`.
///
/// Carries nothing yet; a runner will use it to hand input and output tensors
/// to kernels.
#[derive(Debug, Default)]
pub struct ComputeContext {
    _private: (),
}

impl ComputeContext {
    pub fn new() -> Self {
        Self::default()
    }
}
