use std::collections::HashSet;

use crate::error::GraphError;
use crate::graph_def::GraphDef;

/// Structural facts gathered while validating a [`GraphDef`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationArtifacts {
    /// For every node, the ids of the nodes consuming one of its outputs, in
    /// edge order. A consumer fed twice by the same producer appears twice.
    pub node_to_consumers: Vec<Vec<usize>>,
    /// Nodes without inputs, in id order.
    pub source_nodes: Vec<usize>,
    /// Nodes whose outputs feed nothing, in id order.
    pub sink_nodes: Vec<usize>,
}

/// Re-checks the invariants `NodeDefBuilder` establishes, so a graph can be
/// trusted before it is compiled.
pub struct GraphDefValidator<'a> {
    graph: &'a GraphDef,
    fed_slots: HashSet<(usize, usize)>,
    node_to_consumers: Vec<Vec<usize>>,
}

impl<'a> GraphDefValidator<'a> {
    pub fn new(graph: &'a GraphDef) -> Self {
        Self {
            graph,
            fed_slots: HashSet::new(),
            node_to_consumers: vec![Vec::new(); graph.num_nodes()],
        }
    }

    pub fn validate(mut self) -> Result<ValidationArtifacts, GraphError> {
        self.validate_nodes()?;
        self.validate_edges()?;
        self.validate_arity()?;

        let source_nodes = self
            .graph
            .nodes()
            .iter()
            .filter(|node| node.in_edges().is_empty())
            .map(|node| node.id())
            .collect();
        let sink_nodes = self
            .node_to_consumers
            .iter()
            .enumerate()
            .filter(|(_, consumers)| consumers.is_empty())
            .map(|(id, _)| id)
            .collect();

        Ok(ValidationArtifacts {
            node_to_consumers: self.node_to_consumers,
            source_nodes,
            sink_nodes,
        })
    }

    fn validate_nodes(&self) -> Result<(), GraphError> {
        for (index, node) in self.graph.nodes().iter().enumerate() {
            if node.id() != index {
                return Err(malformed(index, format!("node id is {}", node.id())));
            }
            let outputs = node.op().num_outputs();
            if node.out_dtypes().len() != outputs {
                return Err(malformed(
                    index,
                    format!(
                        "{} output dtypes for op `{}` with {} outputs",
                        node.out_dtypes().len(),
                        node.op_name(),
                        outputs
                    ),
                ));
            }
        }
        Ok(())
    }

    fn validate_edges(&mut self) -> Result<(), GraphError> {
        let nodes = self.graph.nodes();
        for (index, edge) in self.graph.edges().iter().enumerate() {
            let src = nodes.get(edge.src).ok_or_else(|| {
                malformed(edge.dest, format!("edge {} leaves missing node {}", index, edge.src))
            })?;
            let dest = nodes.get(edge.dest).ok_or_else(|| {
                malformed(edge.src, format!("edge {} enters missing node {}", index, edge.dest))
            })?;

            if edge.src_slot >= src.op().num_outputs() {
                return Err(malformed(
                    edge.src,
                    format!("edge {} leaves output slot {}", index, edge.src_slot),
                ));
            }
            if edge.dest_slot >= dest.op().num_inputs() {
                return Err(malformed(
                    edge.dest,
                    format!("edge {} enters input slot {}", index, edge.dest_slot),
                ));
            }
            if !self.fed_slots.insert((edge.dest, edge.dest_slot)) {
                return Err(malformed(
                    edge.dest,
                    format!("input slot {} is fed more than once", edge.dest_slot),
                ));
            }
            if !src.out_edges().contains(&index) || !dest.in_edges().contains(&index) {
                return Err(malformed(
                    edge.dest,
                    format!("edge {} is not linked from both endpoints", index),
                ));
            }
            self.node_to_consumers[edge.src].push(edge.dest);
        }
        Ok(())
    }

    fn validate_arity(&self) -> Result<(), GraphError> {
        for node in self.graph.nodes() {
            let inputs = node.op().num_inputs();
            if node.in_edges().len() != inputs {
                return Err(malformed(
                    node.id(),
                    format!(
                        "{} in-edges for op `{}` with {} inputs",
                        node.in_edges().len(),
                        node.op_name(),
                        inputs
                    ),
                ));
            }
        }
        Ok(())
    }
}

fn malformed(node: usize, reason: String) -> GraphError {
    GraphError::MalformedGraph { node, reason }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph_def::EdgeDef;
    use crate::test_support::Fixture;

    #[test]
    fn test_validation_artifacts_created() {
        let fx = Fixture::new();
        let graph = fx.diamond();
        let artifacts = GraphDefValidator::new(&graph).validate().unwrap();

        assert_eq!(artifacts.node_to_consumers, vec![vec![2], vec![2], vec![3], vec![]]);
        assert_eq!(artifacts.source_nodes, vec![0, 1]);
        assert_eq!(artifacts.sink_nodes, vec![3]);
    }

    #[test]
    fn test_empty_graph_validates() {
        let graph = GraphDef::new();
        let artifacts = GraphDefValidator::new(&graph).validate().unwrap();
        assert!(artifacts.source_nodes.is_empty());
        assert!(artifacts.sink_nodes.is_empty());
    }

    #[test]
    fn test_fan_out_is_recorded() {
        let fx = Fixture::new();
        let mut graph = GraphDef::new();
        let a = fx.node(&mut graph, "const", "a", &[]);
        fx.node(&mut graph, "add", "twice", &[a, a]);
        fx.node(&mut graph, "neg", "negated", &[a]);

        let artifacts = GraphDefValidator::new(&graph).validate().unwrap();
        assert_eq!(artifacts.node_to_consumers[0], vec![1, 1, 2]);
        assert_eq!(artifacts.sink_nodes, vec![1, 2]);
    }

    #[test]
    fn test_slot_fed_twice_fails() {
        let fx = Fixture::new();
        let mut graph = fx.diamond();
        let edge = EdgeDef {
            src: 0,
            src_slot: 0,
            dest: 3,
            dest_slot: 0,
        };
        graph.edges.push(edge);
        graph.nodes[0].out_edges.push(3);
        graph.nodes[3].in_edges.push(3);

        let err = GraphDefValidator::new(&graph).validate().unwrap_err();
        assert!(matches!(err, GraphError::MalformedGraph { node: 3, .. }));
    }

    #[test]
    fn test_invalid_node_reference_fails() {
        let fx = Fixture::new();
        let mut graph = fx.diamond();
        graph.edges[0].src = 42;

        let err = GraphDefValidator::new(&graph).validate().unwrap_err();
        assert!(matches!(err, GraphError::MalformedGraph { .. }));
    }

    #[test]
    fn test_output_slot_out_of_range_fails() {
        let fx = Fixture::new();
        let mut graph = fx.diamond();
        graph.edges[0].src_slot = 1;

        let err = GraphDefValidator::new(&graph).validate().unwrap_err();
        assert!(matches!(err, GraphError::MalformedGraph { node: 0, .. }));
    }

    #[test]
    fn test_missing_in_edge_fails() {
        let fx = Fixture::new();
        let mut graph = fx.diamond();
        graph.edges.pop();
        graph.nodes[2].out_edges.clear();
        graph.nodes[3].in_edges.clear();

        let err = GraphDefValidator::new(&graph).validate().unwrap_err();
        assert!(matches!(err, GraphError::MalformedGraph { node: 3, .. }));
        assert!(err.to_string().contains("0 in-edges"));
    }

    #[test]
    fn test_out_dtype_count_mismatch_fails() {
        let fx = Fixture::new();
        let mut graph = fx.diamond();
        graph.nodes[1].out_dtypes.clear();

        let err = GraphDefValidator::new(&graph).validate().unwrap_err();
        assert!(matches!(err, GraphError::MalformedGraph { node: 1, .. }));
    }

    #[test]
    fn test_node_id_mismatch_fails() {
        let fx = Fixture::new();
        let mut graph = fx.diamond();
        graph.nodes[2].id = 7;

        let err = GraphDefValidator::new(&graph).validate().unwrap_err();
        assert!(matches!(err, GraphError::MalformedGraph { node: 2, .. }));
    }
}
