//! Compilation of a [`GraphDef`] into an executable [`Graph`].
//!
//! Every node is bound to the first kernel of its op that targets the type of
//! the node's device and whose dtype signature matches:
//!
//! * an op without inputs is matched on the node's own output dtypes;
//! * otherwise the key is, per input slot, the dtype the producing node emits
//!   on the connected output slot, matched against the kernel's input dtypes.
//!
//! Registration order is therefore significant when signatures overlap.

use std::sync::Arc;

use crate::context::OpKernelContext;
use crate::data_type::DataType;
use crate::device::{Device, DeviceRegistry};
use crate::error::GraphError;
use crate::graph::{Edge, Graph, Node};
use crate::graph_def::{GraphDef, NodeDef};
use crate::op::OpKernelDef;
use crate::validator::GraphDefValidator;

/// Compiles graph definitions against a device registry.
#[derive(Clone, Copy)]
pub struct GraphFactory<'r> {
    devices: &'r DeviceRegistry,
}

impl Default for GraphFactory<'static> {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphFactory<'static> {
    /// Factory resolving devices through the process-wide registry.
    pub fn new() -> Self {
        Self {
            devices: DeviceRegistry::instance(),
        }
    }
}

impl<'r> GraphFactory<'r> {
    pub fn with_device_registry(devices: &'r DeviceRegistry) -> Self {
        Self { devices }
    }

    /// Rebuild `graph` from `graph_def`.
    ///
    /// Whatever `graph` held before is released first. The update is
    /// all-or-nothing: on error `graph` is left empty.
    pub fn update_graph(&self, graph_def: &GraphDef, graph: &mut Graph) -> Result<(), GraphError> {
        graph.clear();
        *graph = self.compile(graph_def)?;
        Ok(())
    }

    /// Compile `graph_def` into a new graph.
    pub fn compile(&self, graph_def: &GraphDef) -> Result<Graph, GraphError> {
        GraphDefValidator::new(graph_def).validate()?;

        let mut graph = Graph::new();
        graph.attributes = graph_def.attributes().clone();

        graph.nodes.reserve(graph_def.num_nodes());
        for node_def in graph_def.nodes() {
            let node = self.instantiate(graph_def, node_def)?;
            graph.nodes.push(node);
        }
        graph.edges = graph_def
            .edges()
            .iter()
            .map(|edge| Edge {
                src: edge.src,
                src_slot: edge.src_slot,
                dest: edge.dest,
                dest_slot: edge.dest_slot,
            })
            .collect();

        log::debug!(
            "compiled graph: {} nodes, {} edges",
            graph.num_nodes(),
            graph.num_edges()
        );
        Ok(graph)
    }

    fn instantiate(&self, graph_def: &GraphDef, node_def: &NodeDef) -> Result<Node, GraphError> {
        let device = self.devices.get_device(node_def.device())?;
        let kernel_def = resolve_kernel(graph_def, node_def, &device)?;

        let context = OpKernelContext::new(
            node_def.name(),
            node_def.out_dtypes(),
            graph_def.attributes(),
        );
        let kernel = kernel_def.create(&context)?;

        Ok(Node {
            id: node_def.id(),
            name: node_def.name().to_string(),
            op: Arc::clone(node_def.op()),
            device,
            kernel_def,
            kernel,
            out_dtypes: node_def.out_dtypes().to_vec(),
            in_edges: node_def.in_edges().to_vec(),
            out_edges: node_def.out_edges().to_vec(),
        })
    }
}

/// Dtypes reaching each input slot of `node_def`, in slot order.
fn input_dtypes(graph_def: &GraphDef, node_def: &NodeDef) -> Vec<DataType> {
    let mut fed: Vec<(usize, DataType)> = node_def
        .in_edges()
        .iter()
        .filter_map(|&index| graph_def.edges().get(index))
        .filter_map(|edge| {
            graph_def
                .node_at(edge.src)
                .and_then(|src| src.out_dtypes().get(edge.src_slot))
                .map(|&dtype| (edge.dest_slot, dtype))
        })
        .collect();
    fed.sort_by_key(|&(slot, _)| slot);
    fed.into_iter().map(|(_, dtype)| dtype).collect()
}

fn resolve_kernel(
    graph_def: &GraphDef,
    node_def: &NodeDef,
    device: &Device,
) -> Result<Arc<OpKernelDef>, GraphError> {
    let op = node_def.op();
    let by_outputs = op.num_inputs() == 0;
    let key = if by_outputs {
        node_def.out_dtypes().to_vec()
    } else {
        input_dtypes(graph_def, node_def)
    };

    let found = op
        .kernels()
        .into_iter()
        .filter(|kernel| kernel.device_type() == device.device_type())
        .find(|kernel| {
            let signature = if by_outputs {
                kernel.output_dtypes()
            } else {
                kernel.input_dtypes()
            };
            signature == key.as_slice()
        });

    match found {
        Some(kernel) => {
            log::debug!(
                "node `{}` ({}) on {}: kernel {:?} -> {:?}",
                node_def.name(),
                op.name(),
                device.name(),
                kernel.input_dtypes(),
                kernel.output_dtypes()
            );
            Ok(kernel)
        }
        None => Err(GraphError::KernelNotFound {
            node: node_def.name().to_string(),
            op: op.name().to_string(),
            device_type: device.device_type().to_string(),
            dtypes: key,
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::context::ComputeContext;
    use crate::error::ErrorKind;
    use crate::node_def_builder::NodeDefBuilder;
    use crate::op::{ConstructKernel, OpBuilder, OpKernel, OpKernelDefBuilder};
    use crate::tensor::LayoutArray;
    use crate::test_support::{Fixture, Noop};

    static DOUBLE_RUNS: AtomicUsize = AtomicUsize::new(0);

    struct Double;

    impl OpKernel for Double {
        fn compute(&mut self, _context: &mut ComputeContext) -> Result<(), GraphError> {
            DOUBLE_RUNS.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    impl ConstructKernel for Double {
        fn construct(_context: &OpKernelContext<'_>) -> Result<Self, GraphError> {
            Ok(Double)
        }
    }

    struct Gain {
        gain: i64,
    }

    impl OpKernel for Gain {
        fn compute(&mut self, _context: &mut ComputeContext) -> Result<(), GraphError> {
            Ok(())
        }
    }

    impl ConstructKernel for Gain {
        fn construct(context: &OpKernelContext<'_>) -> Result<Self, GraphError> {
            Ok(Gain {
                gain: context.get_int64_attr("gain")?,
            })
        }
    }

    fn scalar(_: &ComputeContext) -> Result<LayoutArray, GraphError> {
        LayoutArray::new(&[1])
    }

    #[test]
    fn float_input_resolves_float_kernel() {
        let fx = Fixture::new();
        OpKernelDefBuilder::<Double>::new("neg", "CPU")
            .input(DataType::Double)
            .output(DataType::Double)
            .build_into(&fx.ops)
            .unwrap();

        let mut graph_def = GraphDef::new();
        let a = fx.node(&mut graph_def, "const", "A", &[]);
        fx.node(&mut graph_def, "neg", "B", &[a]);

        let graph = GraphFactory::with_device_registry(&fx.devices)
            .compile(&graph_def)
            .unwrap();
        assert_eq!(graph.num_nodes(), 2);
        assert_eq!(graph.num_edges(), 1);

        let b = graph.find_node("B").unwrap();
        assert_eq!(b.kernel_def().input_dtypes(), &[DataType::Float]);
        assert_eq!(b.kernel_device_type(), "CPU");
        assert_eq!(b.device().name(), "CPU:0");
        assert_eq!(b.in_edges(), &[0]);
        assert_eq!(graph.node(0).unwrap().out_edges(), &[0]);
        assert_eq!(graph.edges()[0], Edge { src: 0, src_slot: 0, dest: 1, dest_slot: 0 });
    }

    #[test]
    fn double_producer_resolves_second_kernel() {
        let fx = Fixture::new();
        OpKernelDefBuilder::<Noop>::new("const", "CPU")
            .output(DataType::Double)
            .build_into(&fx.ops)
            .unwrap();
        OpKernelDefBuilder::<Double>::new("neg", "CPU")
            .input(DataType::Double)
            .output(DataType::Double)
            .build_into(&fx.ops)
            .unwrap();

        let mut graph_def = GraphDef::new();
        let a = NodeDefBuilder::with_registries(&mut graph_def, "const", "CPU:0", &fx.ops, &fx.devices)
            .unwrap()
            .build(&[DataType::Double])
            .unwrap();
        NodeDefBuilder::with_registries(&mut graph_def, "neg", "CPU:0", &fx.ops, &fx.devices)
            .unwrap()
            .input(a, 0)
            .unwrap()
            .build(&[DataType::Double])
            .unwrap();

        let mut graph = GraphFactory::with_device_registry(&fx.devices)
            .compile(&graph_def)
            .unwrap();
        let before = DOUBLE_RUNS.load(Ordering::SeqCst);
        let neg = graph.node_mut(1).unwrap();
        assert_eq!(neg.kernel_def().input_dtypes(), &[DataType::Double]);
        neg.compute(&mut ComputeContext::new()).unwrap();
        assert!(DOUBLE_RUNS.load(Ordering::SeqCst) > before);
    }

    #[test]
    fn first_registered_match_wins() {
        let fx = Fixture::new();
        OpKernelDefBuilder::<Double>::new("const", "CPU")
            .output(DataType::Float)
            .build_into(&fx.ops)
            .unwrap();

        let mut graph_def = GraphDef::new();
        fx.node(&mut graph_def, "const", "c", &[]);
        let graph = GraphFactory::with_device_registry(&fx.devices)
            .compile(&graph_def)
            .unwrap();

        let chosen = graph.node(0).unwrap().kernel_def();
        let kernels = fx.ops.get_op("const").unwrap().kernels();
        assert_eq!(kernels.len(), 2);
        assert!(Arc::ptr_eq(chosen, &kernels[0]));
    }

    #[test]
    fn kernels_for_other_device_types_are_skipped() {
        let fx = Fixture::new();
        OpBuilder::new("remote").output(scalar).build_into(&fx.ops).unwrap();
        OpKernelDefBuilder::<Noop>::new("remote", "GPU")
            .output(DataType::Float)
            .build_into(&fx.ops)
            .unwrap();

        let mut graph_def = GraphDef::new();
        fx.node(&mut graph_def, "remote", "r", &[]);
        let err = GraphFactory::with_device_registry(&fx.devices)
            .compile(&graph_def)
            .unwrap_err();
        assert!(matches!(err, GraphError::KernelNotFound { ref device_type, .. } if device_type == "CPU"));
    }

    #[test]
    fn unresolved_node_leaves_graph_empty() {
        let fx = Fixture::new();
        let mut graph_def = fx.diamond();
        let factory = GraphFactory::with_device_registry(&fx.devices);

        let mut graph = Graph::new();
        factory.update_graph(&graph_def, &mut graph).unwrap();
        assert_eq!(graph.num_nodes(), 4);

        let a = graph_def.find_node("a").unwrap();
        NodeDefBuilder::with_registries(&mut graph_def, "neg", "CPU:0", &fx.ops, &fx.devices)
            .unwrap()
            .input(a, 0)
            .unwrap()
            .build(&[DataType::Int32])
            .unwrap();
        let last = graph_def.num_nodes() - 1;
        let b = graph_def.handle(last).unwrap();
        NodeDefBuilder::with_registries(&mut graph_def, "neg", "CPU:0", &fx.ops, &fx.devices)
            .unwrap()
            .input(b, 0)
            .unwrap()
            .name("int_consumer")
            .unwrap()
            .build(&[DataType::Float])
            .unwrap();

        let err = factory.update_graph(&graph_def, &mut graph).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Resolution);
        assert!(matches!(
            err,
            GraphError::KernelNotFound { ref node, ref dtypes, .. }
                if node == "int_consumer" && dtypes == &vec![DataType::Int32]
        ));
        assert!(graph.is_empty());
        assert_eq!(graph.num_edges(), 0);
        assert!(graph.attributes().is_empty());
    }

    #[test]
    fn update_replaces_previous_contents() {
        let fx = Fixture::new();
        let factory = GraphFactory::with_device_registry(&fx.devices);
        let mut graph = Graph::new();

        factory.update_graph(&fx.diamond(), &mut graph).unwrap();
        assert_eq!(graph.num_nodes(), 4);

        let mut small = GraphDef::new();
        fx.node(&mut small, "const", "only", &[]);
        factory.update_graph(&small, &mut graph).unwrap();
        assert_eq!(graph.num_nodes(), 1);
        assert_eq!(graph.num_edges(), 0);
        assert_eq!(graph.node(0).unwrap().name(), "only");
    }

    #[test]
    fn kernels_see_node_attributes() {
        let fx = Fixture::new();
        OpBuilder::new("gain")
            .input()
            .output(scalar)
            .attribute("gain")
            .unwrap()
            .build_into(&fx.ops)
            .unwrap();
        OpKernelDefBuilder::<Gain>::new("gain", "CPU")
            .input(DataType::Float)
            .output(DataType::Float)
            .build_into(&fx.ops)
            .unwrap();

        let mut graph_def = GraphDef::new();
        let a = fx.node(&mut graph_def, "const", "a", &[]);
        NodeDefBuilder::with_registries(&mut graph_def, "gain", "CPU:0", &fx.ops, &fx.devices)
            .unwrap()
            .input(a, 0)
            .unwrap()
            .set_attr("gain", 4i64)
            .unwrap()
            .name("g")
            .unwrap()
            .build(&[DataType::Float])
            .unwrap();

        let graph = GraphFactory::with_device_registry(&fx.devices)
            .compile(&graph_def)
            .unwrap();
        assert_eq!(graph.get_int64_attr("g/gain").unwrap(), 4);
        assert_eq!(
            Gain::construct(&OpKernelContext::new("g", &[DataType::Float], graph.attributes()))
                .unwrap()
                .gain,
            4
        );
    }

    #[test]
    fn missing_device_fails_lookup() {
        let fx = Fixture::new();
        let graph_def = fx.diamond();
        let empty = DeviceRegistry::new();
        let err = GraphFactory::with_device_registry(&empty)
            .compile(&graph_def)
            .unwrap_err();
        assert!(matches!(err, GraphError::DeviceNotFound { .. }));
    }
}
