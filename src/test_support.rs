//! Registries and ops shared by unit tests.

use crate::config::ContextProperties;
use crate::context::{ComputeContext, OpKernelContext};
use crate::data_type::DataType;
use crate::device::{CPU_DEVICE_TYPE, CpuFactory, DeviceRegistry};
use crate::error::GraphError;
use crate::graph_def::{GraphDef, NodeHandle};
use crate::node_def_builder::NodeDefBuilder;
use crate::op::{ConstructKernel, OpBuilder, OpKernel, OpKernelDefBuilder, OpRegistry};
use crate::tensor::LayoutArray;

pub(crate) struct Noop;

impl OpKernel for Noop {
    fn compute(&mut self, _context: &mut ComputeContext) -> Result<(), GraphError> {
        Ok(())
    }
}

impl ConstructKernel for Noop {
    fn construct(_context: &OpKernelContext<'_>) -> Result<Self, GraphError> {
        Ok(Noop)
    }
}

fn scalar(_: &ComputeContext) -> Result<LayoutArray, GraphError> {
    LayoutArray::new(&[1])
}

/// Standalone registries with `const` (0 -> 1), `neg` (1 -> 1) and
/// `add` (2 -> 1) plus one `CPU:0` device.
pub(crate) struct Fixture {
    pub ops: OpRegistry,
    pub devices: DeviceRegistry,
}

impl Fixture {
    pub fn new() -> Self {
        let ops = OpRegistry::new();
        OpBuilder::new("const").output(scalar).build_into(&ops).unwrap();
        OpBuilder::new("neg")
            .input()
            .output(scalar)
            .build_into(&ops)
            .unwrap();
        OpBuilder::new("add")
            .input()
            .input()
            .output(scalar)
            .build_into(&ops)
            .unwrap();

        OpKernelDefBuilder::<Noop>::new("const", CPU_DEVICE_TYPE)
            .output(DataType::Float)
            .build_into(&ops)
            .unwrap();
        OpKernelDefBuilder::<Noop>::new("neg", CPU_DEVICE_TYPE)
            .input(DataType::Float)
            .output(DataType::Float)
            .build_into(&ops)
            .unwrap();
        OpKernelDefBuilder::<Noop>::new("add", CPU_DEVICE_TYPE)
            .input(DataType::Float)
            .input(DataType::Float)
            .output(DataType::Float)
            .build_into(&ops)
            .unwrap();

        let devices = DeviceRegistry::new();
        devices
            .register_device(
                CPU_DEVICE_TYPE,
                Box::new(CpuFactory::new(&ContextProperties::default())),
            )
            .unwrap();
        Fixture { ops, devices }
    }

    pub fn node(
        &self,
        graph: &mut GraphDef,
        op: &str,
        name: &str,
        inputs: &[NodeHandle],
    ) -> NodeHandle {
        let mut builder =
            NodeDefBuilder::with_registries(graph, op, "CPU:0", &self.ops, &self.devices).unwrap();
        builder.name(name).unwrap();
        for &input in inputs {
            builder.input(input, 0).unwrap();
        }
        builder.build(&[DataType::Float]).unwrap()
    }

    /// `a = const; b = const; sum = add(a, b); out = neg(sum)`.
    pub fn diamond(&self) -> GraphDef {
        let mut graph = GraphDef::new();
        let a = self.node(&mut graph, "const", "a", &[]);
        let b = self.node(&mut graph, "const", "b", &[]);
        let sum = self.node(&mut graph, "add", "sum", &[a, b]);
        self.node(&mut graph, "neg", "out", &[sum]);
        graph
    }
}
