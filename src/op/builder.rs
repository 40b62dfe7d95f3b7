use std::collections::BTreeSet;
use std::marker::PhantomData;
use std::sync::Arc;

use super::{ConstructKernel, KernelFactory, Op, OpKernel, OpKernelDef, OpRegistry, ShapeFn};
use crate::attr::check_attribute_name;
use crate::context::{ComputeContext, OpKernelContext};
use crate::data_type::DataType;
use crate::error::GraphError;
use crate::tensor::LayoutArray;

/// Describes an op and commits it to a registry.
///
/// ```
/// # use graphloom::{GraphError, LayoutArray, OpBuilder};
/// # fn main() -> Result<(), GraphError> {
/// let op = OpBuilder::new("scale")
///     .input()
///     .output(|_| LayoutArray::new(&[1]))
///     .attribute("factor")?
///     .build()?;
/// assert_eq!(op.num_inputs(), 1);
/// # Ok(())
/// # }
/// ```
pub struct OpBuilder {
    name: String,
    num_inputs: usize,
    attributes: BTreeSet<String>,
    out_shape_fns: Vec<ShapeFn>,
}

impl OpBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            num_inputs: 0,
            attributes: BTreeSet::new(),
            out_shape_fns: Vec::new(),
        }
    }

    pub fn input(mut self) -> Self {
        self.num_inputs += 1;
        self
    }

    /// Declare an output together with the function computing its shape.
    pub fn output<F>(mut self, shape_fn: F) -> Self
    where
        F: Fn(&ComputeContext) -> Result<LayoutArray, GraphError> + Send + Sync + 'static,
    {
        self.out_shape_fns.push(Arc::new(shape_fn));
        self
    }

    /// Declare a required attribute.
    pub fn attribute(mut self, name: impl Into<String>) -> Result<Self, GraphError> {
        let name = name.into();
        check_attribute_name(&name)?;
        if self.attributes.contains(&name) {
            return Err(GraphError::DuplicateAttribute {
                op: self.name,
                attribute: name,
            });
        }
        self.attributes.insert(name);
        Ok(self)
    }

    /// Commit into the process-wide registry.
    pub fn build(self) -> Result<Arc<Op>, GraphError> {
        self.build_into(OpRegistry::instance())
    }

    pub fn build_into(self, registry: &OpRegistry) -> Result<Arc<Op>, GraphError> {
        registry.register_op(Op::new(
            self.name,
            self.num_inputs,
            self.attributes,
            self.out_shape_fns,
        ))
    }
}

/// Describes one kernel of an existing op.
///
/// `K` is instantiated once per compiled node through
/// [`ConstructKernel::construct`].
pub struct OpKernelDefBuilder<K> {
    op_name: String,
    device_type: String,
    input_dtypes: Vec<DataType>,
    output_dtypes: Vec<DataType>,
    _kernel: PhantomData<fn() -> K>,
}

impl<K: ConstructKernel> OpKernelDefBuilder<K> {
    pub fn new(op_name: impl Into<String>, device_type: impl Into<String>) -> Self {
        Self {
            op_name: op_name.into(),
            device_type: device_type.into(),
            input_dtypes: Vec::new(),
            output_dtypes: Vec::new(),
            _kernel: PhantomData,
        }
    }

    pub fn input(mut self, dtype: DataType) -> Self {
        self.input_dtypes.push(dtype);
        self
    }

    pub fn output(mut self, dtype: DataType) -> Self {
        self.output_dtypes.push(dtype);
        self
    }

    /// Attach the kernel to its op in the process-wide registry.
    pub fn build(self) -> Result<(), GraphError> {
        self.build_into(OpRegistry::instance())
    }

    pub fn build_into(self, registry: &OpRegistry) -> Result<(), GraphError> {
        let create_fn: KernelFactory = Arc::new(construct_boxed::<K>);
        let kernel = OpKernelDef::new(
            self.device_type,
            self.input_dtypes,
            self.output_dtypes,
            create_fn,
        );
        registry.register_kernel(&self.op_name, kernel)
    }
}

fn construct_boxed<K: ConstructKernel>(
    context: &OpKernelContext<'_>,
) -> Result<Box<dyn OpKernel>, GraphError> {
    Ok(Box::new(K::construct(context)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attr::AttributeMap;
    use crate::error::ErrorKind;

    struct Scale {
        factor: f32,
    }

    impl OpKernel for Scale {
        fn compute(&mut self, _context: &mut ComputeContext) -> Result<(), GraphError> {
            Ok(())
        }
    }

    impl ConstructKernel for Scale {
        fn construct(context: &OpKernelContext<'_>) -> Result<Self, GraphError> {
            let factor = if context.has_attr("factor") {
                context.get_float_attr("factor")?
            } else {
                1.0
            };
            Ok(Scale { factor })
        }
    }

    fn scalar(_: &ComputeContext) -> Result<LayoutArray, GraphError> {
        LayoutArray::new(&[1])
    }

    fn unary(registry: &OpRegistry, name: &str) -> Arc<Op> {
        OpBuilder::new(name)
            .input()
            .output(scalar)
            .build_into(registry)
            .unwrap()
    }

    #[test]
    fn op_descriptor_is_recorded() {
        let registry = OpRegistry::new();
        let op = OpBuilder::new("binary")
            .input()
            .input()
            .output(scalar)
            .attribute("alpha")
            .unwrap()
            .attribute("beta")
            .unwrap()
            .build_into(&registry)
            .unwrap();

        assert_eq!(op.name(), "binary");
        assert_eq!(op.num_inputs(), 2);
        assert_eq!(op.num_outputs(), 1);
        assert_eq!(op.attributes().len(), 2);
        assert_eq!(op.num_kernels(), 0);
        assert_eq!(op.out_shape(0, &ComputeContext::new()).unwrap().as_slice(), &[1]);
        assert!(op.out_shape(1, &ComputeContext::new()).is_err());

        assert!(registry.has_op("binary"));
        assert_eq!(registry.len(), 1);
        assert!(Arc::ptr_eq(&registry.get_op("binary").unwrap(), &op));
    }

    #[test]
    fn duplicate_attribute_fails_immediately() {
        let err = OpBuilder::new("dup")
            .attribute("x")
            .unwrap()
            .attribute("x")
            .err()
            .unwrap();
        assert!(matches!(err, GraphError::DuplicateAttribute { .. }));
    }

    #[test]
    fn attribute_names_reject_separator() {
        let err = OpBuilder::new("sep").attribute("a/b").err().unwrap();
        assert!(matches!(err, GraphError::InvalidAttributeName { .. }));
    }

    #[test]
    fn duplicate_op_fails() {
        let registry = OpRegistry::new();
        unary(&registry, "neg");
        let err = OpBuilder::new("neg").build_into(&registry).unwrap_err();
        assert!(matches!(err, GraphError::DuplicateOp { .. }));
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert_eq!(registry.get_op("neg").unwrap().num_inputs(), 1);
    }

    #[test]
    fn kernels_keep_registration_order() {
        let registry = OpRegistry::new();
        let op = unary(&registry, "scale");
        OpKernelDefBuilder::<Scale>::new("scale", "CPU")
            .input(DataType::Float)
            .output(DataType::Float)
            .build_into(&registry)
            .unwrap();
        OpKernelDefBuilder::<Scale>::new("scale", "CPU")
            .input(DataType::Double)
            .output(DataType::Double)
            .build_into(&registry)
            .unwrap();

        let kernels = op.kernels();
        assert_eq!(kernels.len(), 2);
        assert_eq!(kernels[0].input_dtypes(), &[DataType::Float]);
        assert_eq!(kernels[1].output_dtypes(), &[DataType::Double]);
        assert_eq!(kernels[1].device_type(), "CPU");
    }

    #[test]
    fn kernel_for_missing_op_fails() {
        let registry = OpRegistry::new();
        let err = OpKernelDefBuilder::<Scale>::new("nope", "CPU")
            .input(DataType::Float)
            .output(DataType::Float)
            .build_into(&registry)
            .unwrap_err();
        assert!(matches!(err, GraphError::OpNotFound { .. }));
    }

    #[test]
    fn kernel_arity_must_match() {
        let registry = OpRegistry::new();
        let op = unary(&registry, "scale");

        let err = OpKernelDefBuilder::<Scale>::new("scale", "CPU")
            .input(DataType::Float)
            .input(DataType::Float)
            .output(DataType::Float)
            .build_into(&registry)
            .unwrap_err();
        assert!(matches!(
            err,
            GraphError::KernelArityMismatch { slot: "inputs", expected: 1, actual: 2, .. }
        ));

        let err = OpKernelDefBuilder::<Scale>::new("scale", "CPU")
            .input(DataType::Float)
            .build_into(&registry)
            .unwrap_err();
        assert!(matches!(
            err,
            GraphError::KernelArityMismatch { slot: "outputs", expected: 1, actual: 0, .. }
        ));
        assert_eq!(op.num_kernels(), 0);
    }

    #[test]
    fn kernel_factory_reads_node_attributes() {
        let registry = OpRegistry::new();
        let op = unary(&registry, "scale");
        OpKernelDefBuilder::<Scale>::new("scale", "CPU")
            .input(DataType::Float)
            .output(DataType::Float)
            .build_into(&registry)
            .unwrap();

        let mut attrs = AttributeMap::new();
        attrs.insert("s1/factor".to_string(), 3.0f32.into());
        let dtypes = [DataType::Float];
        let context = OpKernelContext::new("s1", &dtypes, &attrs);

        let mut kernel = op.kernels()[0].create(&context).unwrap();
        assert!(kernel.compute(&mut ComputeContext::new()).is_ok());

        let scale = Scale::construct(&context).unwrap();
        assert_eq!(scale.factor, 3.0);
    }

    #[test]
    fn frozen_registry_rejects_ops_and_kernels() {
        let registry = OpRegistry::new();
        unary(&registry, "scale");
        registry.freeze();
        assert!(registry.is_frozen());

        let err = OpBuilder::new("late").build_into(&registry).unwrap_err();
        assert!(matches!(err, GraphError::RegistryFrozen { .. }));
        let err = OpKernelDefBuilder::<Scale>::new("scale", "CPU")
            .input(DataType::Float)
            .output(DataType::Float)
            .build_into(&registry)
            .unwrap_err();
        assert!(matches!(err, GraphError::RegistryFrozen { .. }));

        registry.teardown();
        assert!(registry.is_empty());
        assert!(!registry.is_frozen());
        unary(&registry, "scale");
        assert_eq!(registry.op_names(), vec!["scale"]);
    }

    #[test]
    fn instance_is_a_singleton() {
        assert!(std::ptr::eq(OpRegistry::instance(), OpRegistry::instance()));
    }
}
