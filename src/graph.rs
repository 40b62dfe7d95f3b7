//! Executable graph produced by [`GraphFactory`](crate::GraphFactory).
//!
//! Shaped like the [`GraphDef`](crate::GraphDef) it was compiled from: node
//! `i` here is node `i` there, edges keep their indices, and attributes are
//! copied verbatim. Each node owns the kernel instance resolved for it.

use std::fmt;
use std::sync::Arc;

use crate::attr::AttributeMap;
use crate::context::ComputeContext;
use crate::data_type::DataType;
use crate::device::Device;
use crate::error::GraphError;
use crate::op::{Op, OpKernel, OpKernelDef};

/// Dataflow edge between two executable nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Edge {
    pub src: usize,
    pub src_slot: usize,
    pub dest: usize,
    pub dest_slot: usize,
}

/// A compiled node: op, device and the kernel instance that runs it.
pub struct Node {
    pub(crate) id: usize,
    pub(crate) name: String,
    pub(crate) op: Arc<Op>,
    pub(crate) device: Arc<Device>,
    pub(crate) kernel_def: Arc<OpKernelDef>,
    pub(crate) kernel: Box<dyn OpKernel>,
    pub(crate) out_dtypes: Vec<DataType>,
    pub(crate) in_edges: Vec<usize>,
    pub(crate) out_edges: Vec<usize>,
}

impl Node {
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn op(&self) -> &Arc<Op> {
        &self.op
    }

    pub fn op_name(&self) -> &str {
        self.op.name()
    }

    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    /// Device type of the selected kernel.
    pub fn kernel_device_type(&self) -> &str {
        self.kernel_def.device_type()
    }

    /// Definition the kernel was instantiated from.
    pub fn kernel_def(&self) -> &Arc<OpKernelDef> {
        &self.kernel_def
    }

    pub fn out_dtypes(&self) -> &[DataType] {
        &self.out_dtypes
    }

    pub fn in_edges(&self) -> &[usize] {
        &self.in_edges
    }

    pub fn out_edges(&self) -> &[usize] {
        &self.out_edges
    }

    /// Run the node's kernel on its device.
    pub fn compute(&mut self, context: &mut ComputeContext) -> Result<(), GraphError> {
        self.device.compute(self.kernel.as_mut(), context)
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("op", &self.op.name())
            .field("device", &self.device.name())
            .field("kernel", &self.kernel_def)
            .field("in_edges", &self.in_edges)
            .field("out_edges", &self.out_edges)
            .finish()
    }
}

/// Executable graph. Empty until filled by a factory.
#[derive(Debug, Default)]
pub struct Graph {
    pub(crate) nodes: Vec<Node>,
    pub(crate) edges: Vec<Edge>,
    pub(crate) attributes: AttributeMap,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn is_valid_node(&self, id: usize) -> bool {
        id < self.nodes.len()
    }

    pub fn node(&self, id: usize) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn node_mut(&mut self, id: usize) -> Option<&mut Node> {
        self.nodes.get_mut(id)
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn find_node(&self, name: &str) -> Option<&Node> {
        self.nodes.iter().find(|node| node.name == name)
    }

    pub fn attributes(&self) -> &AttributeMap {
        &self.attributes
    }

    pub fn has_attr(&self, path: &str) -> bool {
        self.attributes.contains(path)
    }

    pub fn get_int32_attr(&self, path: &str) -> Result<i32, GraphError> {
        self.attributes.get_int32(path)
    }

    pub fn get_int64_attr(&self, path: &str) -> Result<i64, GraphError> {
        self.attributes.get_int64(path)
    }

    pub fn get_float_attr(&self, path: &str) -> Result<f32, GraphError> {
        self.attributes.get_float(path)
    }

    pub fn get_double_attr(&self, path: &str) -> Result<f64, GraphError> {
        self.attributes.get_double(path)
    }

    pub fn get_bool_attr(&self, path: &str) -> Result<bool, GraphError> {
        self.attributes.get_bool(path)
    }

    /// Drop every node, kernel, edge and attribute.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.edges.clear();
        self.attributes.clear();
    }
}
