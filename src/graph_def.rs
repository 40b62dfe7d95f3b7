//! Graph IR: nodes, edges and attributes as assembled by callers.
//!
//! Nodes live in an arena addressed by index (`NodeDef::id` is always the
//! index). Edges refer to nodes by index and output/input slot. A
//! [`NodeHandle`] additionally carries the id of the graph it was issued by,
//! so handles from one graph are rejected by another.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::attr::{AttrValue, AttributeMap, attribute_path};
use crate::data_type::DataType;
use crate::error::GraphError;
use crate::op::Op;

static NEXT_GRAPH_ID: AtomicU64 = AtomicU64::new(0);

/// Process-unique identity of a [`GraphDef`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GraphId(u64);

impl GraphId {
    fn next() -> Self {
        GraphId(NEXT_GRAPH_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Reference to a node of one specific graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeHandle {
    graph: GraphId,
    index: usize,
}

impl NodeHandle {
    pub fn graph(&self) -> GraphId {
        self.graph
    }

    /// Node id inside its graph.
    pub fn index(&self) -> usize {
        self.index
    }
}

/// Directed dataflow edge: output `src_slot` of node `src` feeds input
/// `dest_slot` of node `dest`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EdgeDef {
    pub src: usize,
    pub src_slot: usize,
    pub dest: usize,
    pub dest_slot: usize,
}

/// One node of a [`GraphDef`].
pub struct NodeDef {
    pub(crate) id: usize,
    pub(crate) op: Arc<Op>,
    pub(crate) name: String,
    pub(crate) device: String,
    pub(crate) out_dtypes: Vec<DataType>,
    pub(crate) in_edges: Vec<usize>,
    pub(crate) out_edges: Vec<usize>,
}

impl NodeDef {
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn op(&self) -> &Arc<Op> {
        &self.op
    }

    pub fn op_name(&self) -> &str {
        self.op.name()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Requested device name, e.g. `"CPU:0"`.
    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn out_dtypes(&self) -> &[DataType] {
        &self.out_dtypes
    }

    /// Indices into [`GraphDef::edges`] of edges feeding this node, in input
    /// slot order.
    pub fn in_edges(&self) -> &[usize] {
        &self.in_edges
    }

    /// Indices into [`GraphDef::edges`] of edges leaving this node.
    pub fn out_edges(&self) -> &[usize] {
        &self.out_edges
    }
}

impl fmt::Debug for NodeDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeDef")
            .field("id", &self.id)
            .field("op", &self.op.name())
            .field("name", &self.name)
            .field("device", &self.device)
            .field("out_dtypes", &self.out_dtypes)
            .field("in_edges", &self.in_edges)
            .field("out_edges", &self.out_edges)
            .finish()
    }
}

/// Mutable graph definition, built node by node with
/// [`NodeDefBuilder`](crate::NodeDefBuilder).
#[derive(Debug)]
pub struct GraphDef {
    id: GraphId,
    pub(crate) nodes: Vec<NodeDef>,
    pub(crate) edges: Vec<EdgeDef>,
    pub(crate) attributes: AttributeMap,
    names: HashMap<String, usize>,
}

impl Default for GraphDef {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphDef {
    pub fn new() -> Self {
        Self {
            id: GraphId::next(),
            nodes: Vec::new(),
            edges: Vec::new(),
            attributes: AttributeMap::new(),
            names: HashMap::new(),
        }
    }

    pub fn id(&self) -> GraphId {
        self.id
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    /// True if `handle` was issued by this graph and addresses a node.
    pub fn is_valid_node(&self, handle: NodeHandle) -> bool {
        handle.graph == self.id && handle.index < self.nodes.len()
    }

    pub fn node(&self, handle: NodeHandle) -> Option<&NodeDef> {
        if self.is_valid_node(handle) {
            self.nodes.get(handle.index)
        } else {
            None
        }
    }

    pub fn node_at(&self, index: usize) -> Option<&NodeDef> {
        self.nodes.get(index)
    }

    /// Handle for the node at `index`, if it exists.
    pub fn handle(&self, index: usize) -> Option<NodeHandle> {
        (index < self.nodes.len()).then_some(NodeHandle {
            graph: self.id,
            index,
        })
    }

    pub fn nodes(&self) -> &[NodeDef] {
        &self.nodes
    }

    pub fn edges(&self) -> &[EdgeDef] {
        &self.edges
    }

    pub fn find_node(&self, name: &str) -> Option<NodeHandle> {
        self.names.get(name).map(|&index| NodeHandle {
            graph: self.id,
            index,
        })
    }

    pub fn attributes(&self) -> &AttributeMap {
        &self.attributes
    }

    /// `path` is absolute: `"<node-name>/<attribute-name>"`.
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

    /// First free name among `base`, `base_1`, `base_2`, ...
    pub(crate) fn unique_name(&self, base: &str) -> String {
        if !self.names.contains_key(base) {
            return base.to_string();
        }
        let mut suffix = 1usize;
        loop {
            let name = format!("{}_{}", base, suffix);
            if !self.names.contains_key(&name) {
                return name;
            }
            suffix += 1;
        }
    }

    /// Append a fully validated node with its in-edges and attributes.
    ///
    /// `inputs` holds `(src, src_slot)` per input slot; `name` must be unused.
    pub(crate) fn commit_node(
        &mut self,
        op: Arc<Op>,
        name: String,
        device: String,
        out_dtypes: Vec<DataType>,
        inputs: &[(usize, usize)],
        attributes: impl IntoIterator<Item = (String, AttrValue)>,
    ) -> NodeHandle {
        let id = self.nodes.len();
        let mut in_edges = Vec::with_capacity(inputs.len());
        for (dest_slot, &(src, src_slot)) in inputs.iter().enumerate() {
            let edge = self.edges.len();
            self.edges.push(EdgeDef {
                src,
                src_slot,
                dest: id,
                dest_slot,
            });
            self.nodes[src].out_edges.push(edge);
            in_edges.push(edge);
        }
        for (attribute, value) in attributes {
            self.attributes.insert(attribute_path(&name, &attribute), value);
        }
        self.names.insert(name.clone(), id);
        self.nodes.push(NodeDef {
            id,
            op,
            name,
            device,
            out_dtypes,
            in_edges,
            out_edges: Vec::new(),
        });
        NodeHandle {
            graph: self.id,
            index: id,
        }
    }
}
