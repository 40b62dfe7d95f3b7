use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;

use super::{Op, OpKernelDef};
use crate::error::GraphError;

#[derive(Default)]
struct OpTable {
    ops: HashMap<String, Arc<Op>>,
    frozen: bool,
}

/// Registry of ops by name.
///
/// Same lifecycle as [`crate::DeviceRegistry`]: register during start-up,
/// [`freeze`](OpRegistry::freeze), then read.
#[derive(Default)]
pub struct OpRegistry {
    table: RwLock<OpTable>,
}

static OP_REGISTRY: OnceLock<OpRegistry> = OnceLock::new();

impl OpRegistry {
    /// A standalone registry, independent of the process-wide one.
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry.
    pub fn instance() -> &'static OpRegistry {
        OP_REGISTRY.get_or_init(OpRegistry::new)
    }

    pub(crate) fn register_op(&self, op: Op) -> Result<Arc<Op>, GraphError> {
        let mut table = self.table.write();
        if table.frozen {
            return Err(GraphError::frozen("op", op.name()));
        }
        if table.ops.contains_key(op.name()) {
            return Err(GraphError::DuplicateOp {
                op: op.name().to_string(),
            });
        }
        let op = Arc::new(op);
        table.ops.insert(op.name().to_string(), Arc::clone(&op));
        log::debug!(
            "registered op `{}` ({} inputs, {} outputs, {} attributes)",
            op.name(),
            op.num_inputs(),
            op.num_outputs(),
            op.attributes().len()
        );
        Ok(op)
    }

    pub(crate) fn register_kernel(&self, op_name: &str, kernel: OpKernelDef) -> Result<(), GraphError> {
        let table = self.table.read();
        if table.frozen {
            return Err(GraphError::frozen("op", op_name));
        }
        let op = table
            .ops
            .get(op_name)
            .ok_or_else(|| GraphError::OpNotFound {
                name: op_name.to_string(),
            })?;

        if op.num_inputs() != kernel.num_inputs() {
            return Err(GraphError::KernelArityMismatch {
                op: op_name.to_string(),
                slot: "inputs",
                expected: op.num_inputs(),
                actual: kernel.num_inputs(),
            });
        }
        if op.num_outputs() != kernel.num_outputs() {
            return Err(GraphError::KernelArityMismatch {
                op: op_name.to_string(),
                slot: "outputs",
                expected: op.num_outputs(),
                actual: kernel.num_outputs(),
            });
        }

        log::debug!(
            "registered kernel for `{}` on {}: {:?} -> {:?}",
            op_name,
            kernel.device_type(),
            kernel.input_dtypes(),
            kernel.output_dtypes()
        );
        op.push_kernel(kernel);
        Ok(())
    }

    pub fn get_op(&self, name: &str) -> Result<Arc<Op>, GraphError> {
        self.table
            .read()
            .ops
            .get(name)
            .cloned()
            .ok_or_else(|| GraphError::OpNotFound {
                name: name.to_string(),
            })
    }

    pub fn has_op(&self, name: &str) -> bool {
        self.table.read().ops.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.table.read().ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.read().ops.is_empty()
    }

    /// Registered op names, sorted.
    pub fn op_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.table.read().ops.keys().cloned().collect();
        names.sort_unstable();
        names
    }

    /// End the registration phase.
    pub fn freeze(&self) {
        self.table.write().frozen = true;
        log::debug!("op registry frozen");
    }

    pub fn is_frozen(&self) -> bool {
        self.table.read().frozen
    }

    /// Drop every op and reopen the registry for registration.
    pub fn teardown(&self) {
        let ops = {
            let mut table = self.table.write();
            table.frozen = false;
            std::mem::take(&mut table.ops)
        };
        log::info!("op registry teardown: {} op(s)", ops.len());
    }
}
