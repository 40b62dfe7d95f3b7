use std::collections::BTreeMap;
use std::sync::Arc;

use crate::attr::{AttrValue, check_attribute_name};
use crate::data_type::DataType;
use crate::device::DeviceRegistry;
use crate::error::GraphError;
use crate::graph_def::{GraphDef, NodeHandle};
use crate::op::{Op, OpRegistry};

/// Lifecycle of a [`NodeDefBuilder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuilderState {
    Accumulating,
    Built,
    Failed,
}

impl BuilderState {
    fn name(self) -> &'static str {
        match self {
            BuilderState::Accumulating => "accumulating",
            BuilderState::Built => "built",
            BuilderState::Failed => "failed",
        }
    }
}

/// Stages one node of a [`GraphDef`] and commits it on [`build`].
///
/// Nothing reaches the graph until `build` succeeds. Any failing step moves
/// the builder to [`BuilderState::Failed`]; from there, and after a
/// successful build, every step is rejected until [`reset`].
///
/// ```
/// # use graphloom::{DataType, GraphDef, GraphError, LayoutArray, NodeDefBuilder, OpBuilder};
/// # fn main() -> Result<(), GraphError> {
/// # graphloom::init()?;
/// # OpBuilder::new("const").output(|_| LayoutArray::new(&[1])).attribute("value")?.build()?;
/// # OpBuilder::new("neg").input().output(|_| LayoutArray::new(&[1])).build()?;
/// let mut graph = GraphDef::new();
/// let a = NodeDefBuilder::new(&mut graph, "const", "CPU:0")?
///     .set_attr("value", 1.5f32)?
///     .build(&[DataType::Float])?;
/// let b = NodeDefBuilder::new(&mut graph, "neg", "CPU:0")?
///     .input(a, 0)?
///     .build(&[DataType::Float])?;
/// assert_eq!(graph.node(b).map(|node| node.in_edges().len()), Some(1));
/// # Ok(())
/// # }
/// ```
///
/// [`build`]: NodeDefBuilder::build
/// [`reset`]: NodeDefBuilder::reset
pub struct NodeDefBuilder<'g> {
    graph: &'g mut GraphDef,
    op: Arc<Op>,
    device: String,
    name: Option<String>,
    inputs: Vec<(usize, usize)>,
    attributes: BTreeMap<String, AttrValue>,
    state: BuilderState,
}

impl<'g> NodeDefBuilder<'g> {
    /// Bind a builder to `graph`, resolving `op_name` and `device` against the
    /// process-wide registries.
    pub fn new(graph: &'g mut GraphDef, op_name: &str, device: &str) -> Result<Self, GraphError> {
        Self::with_registries(
            graph,
            op_name,
            device,
            OpRegistry::instance(),
            DeviceRegistry::instance(),
        )
    }

    pub fn with_registries(
        graph: &'g mut GraphDef,
        op_name: &str,
        device: &str,
        ops: &OpRegistry,
        devices: &DeviceRegistry,
    ) -> Result<Self, GraphError> {
        let op = ops.get_op(op_name)?;
        if !devices.has_device(device) {
            return Err(GraphError::DeviceNotFound {
                name: device.to_string(),
            });
        }
        Ok(Self {
            graph,
            op,
            device: device.to_string(),
            name: None,
            inputs: Vec::new(),
            attributes: BTreeMap::new(),
            state: BuilderState::Accumulating,
        })
    }

    pub fn state(&self) -> BuilderState {
        self.state
    }

    pub fn op(&self) -> &Arc<Op> {
        &self.op
    }

    /// Feed the next input slot from output `slot` of `src`.
    pub fn input(&mut self, src: NodeHandle, slot: usize) -> Result<&mut Self, GraphError> {
        self.ensure_accumulating()?;
        let checked = self.check_input(src, slot);
        self.record(checked)?;
        self.inputs.push((src.index(), slot));
        Ok(self)
    }

    /// Node name; a unique suffix is appended on build if it is taken.
    pub fn name(&mut self, name: impl Into<String>) -> Result<&mut Self, GraphError> {
        self.ensure_accumulating()?;
        self.name = Some(name.into());
        Ok(self)
    }

    /// Set an attribute by its name relative to the node. Last write wins.
    pub fn set_attr(
        &mut self,
        name: impl Into<String>,
        value: impl Into<AttrValue>,
    ) -> Result<&mut Self, GraphError> {
        self.ensure_accumulating()?;
        let name = name.into();
        self.record(check_attribute_name(&name))?;
        self.attributes.insert(name, value.into());
        Ok(self)
    }

    /// Validate the staged node and append it to the graph.
    pub fn build(&mut self, out_dtypes: &[DataType]) -> Result<NodeHandle, GraphError> {
        self.ensure_accumulating()?;
        let checked = self.check_build(out_dtypes);
        self.record(checked)?;

        let base = self
            .name
            .clone()
            .unwrap_or_else(|| self.op.name().to_string());
        let name = self.graph.unique_name(&base);
        let attributes = std::mem::take(&mut self.attributes);
        let handle = self.graph.commit_node(
            Arc::clone(&self.op),
            name,
            self.device.clone(),
            out_dtypes.to_vec(),
            &self.inputs,
            attributes,
        );
        self.state = BuilderState::Built;
        log::trace!(
            "node {} `{}` ({}) added on {}",
            handle.index(),
            base,
            self.op.name(),
            self.device
        );
        Ok(handle)
    }

    /// Drop staged inputs, attributes and name and start over.
    pub fn reset(&mut self) -> &mut Self {
        self.name = None;
        self.inputs.clear();
        self.attributes.clear();
        self.state = BuilderState::Accumulating;
        self
    }

    fn ensure_accumulating(&self) -> Result<(), GraphError> {
        match self.state {
            BuilderState::Accumulating => Ok(()),
            state => Err(GraphError::BuilderNotAccumulating {
                state: state.name(),
            }),
        }
    }

    fn record(&mut self, checked: Result<(), GraphError>) -> Result<(), GraphError> {
        if checked.is_err() {
            self.state = BuilderState::Failed;
        }
        checked
    }

    fn check_input(&self, src: NodeHandle, slot: usize) -> Result<(), GraphError> {
        let node = self
            .graph
            .node(src)
            .ok_or(GraphError::InvalidInputNode)?;
        let outputs = node.op().num_outputs();
        if slot >= outputs {
            return Err(GraphError::OutputSlotOutOfRange {
                node: node.name().to_string(),
                outputs,
                slot,
            });
        }
        if self.inputs.len() >= self.op.num_inputs() {
            return Err(GraphError::TooManyInputs {
                op: self.op.name().to_string(),
                inputs: self.op.num_inputs(),
            });
        }
        Ok(())
    }

    fn check_build(&self, out_dtypes: &[DataType]) -> Result<(), GraphError> {
        let op = &self.op;
        if out_dtypes.len() != op.num_outputs() {
            return Err(GraphError::OutputDtypeCountMismatch {
                op: op.name().to_string(),
                expected: op.num_outputs(),
                actual: out_dtypes.len(),
            });
        }
        if self.inputs.len() != op.num_inputs() {
            return Err(GraphError::InputCountMismatch {
                op: op.name().to_string(),
                expected: op.num_inputs(),
                actual: self.inputs.len(),
            });
        }
        if self.attributes.len() != op.attributes().len() {
            return Err(GraphError::AttributeCountMismatch {
                op: op.name().to_string(),
                expected: op.attributes().len(),
                actual: self.attributes.len(),
            });
        }
        if let Some(missing) = op
            .attributes()
            .iter()
            .find(|attribute| !self.attributes.contains_key(*attribute))
        {
            return Err(GraphError::MissingAttribute {
                op: op.name().to_string(),
                attribute: missing.clone(),
            });
        }
        Ok(())
    }
}
