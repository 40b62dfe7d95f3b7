use std::path::PathBuf;

use crate::data_type::DataType;
use serde_json::Error as JsonError;
use thiserror::Error;

/// Coarse classification of a [`GraphError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Registration problems: duplicates, missing targets, frozen registries.
    Configuration,
    /// Malformed requests: arity, attribute sets, foreign nodes, layouts.
    Validation,
    /// No kernel matches a node's dtype signature.
    Resolution,
    /// The device could not provide memory.
    Allocation,
    /// Element count mismatch on reshape.
    Resize,
    /// A named device, op, node or attribute does not exist.
    Lookup,
    /// Configuration files could not be read or parsed.
    Io,
}

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("properties file {path} could not be read: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("properties JSON could not be parsed: {source}")]
    Parse {
        #[from]
        source: JsonError,
    },
    #[error("environment variable {variable} has invalid value `{value}`")]
    InvalidEnvValue { variable: String, value: String },

    #[error("failed to register device type `{device_type}`, the name already exists")]
    DuplicateDeviceType { device_type: String },
    #[error("device discovery for type `{device_type}` failed: {reason}")]
    DiscoveryFailed { device_type: String, reason: String },
    #[error("failed to register op `{op}`, the name already exists")]
    DuplicateOp { op: String },
    #[error("failed to add attribute `{attribute}` to op `{op}`, it already exists")]
    DuplicateAttribute { op: String, attribute: String },
    #[error("failed to register kernel for `{op}`: number of {slot} mismatched ({expected} != {actual})")]
    KernelArityMismatch {
        op: String,
        slot: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("{registry} registry is frozen, cannot register `{name}`")]
    RegistryFrozen {
        registry: &'static str,
        name: String,
    },

    #[error("device `{name}` does not exist")]
    DeviceNotFound { name: String },
    #[error("op `{name}` does not exist")]
    OpNotFound { name: String },
    #[error("attribute `{path}` does not exist")]
    AttributeNotFound { path: String },
    #[error("attribute `{path}` holds {actual}, requested {expected}")]
    AttributeTypeMismatch {
        path: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("node builder is {state}, call reset() before reusing it")]
    BuilderNotAccumulating { state: &'static str },
    #[error("source node is not valid in this graph")]
    InvalidInputNode,
    #[error("source node `{node}` only has {outputs} outputs, slot={slot}")]
    OutputSlotOutOfRange {
        node: String,
        outputs: usize,
        slot: usize,
    },
    #[error("op `{op}` only has {inputs} inputs")]
    TooManyInputs { op: String, inputs: usize },
    #[error("op `{op}` requires {expected} output dtypes, got {actual}")]
    OutputDtypeCountMismatch {
        op: String,
        expected: usize,
        actual: usize,
    },
    #[error("op `{op}` requires {expected} inputs, got {actual}")]
    InputCountMismatch {
        op: String,
        expected: usize,
        actual: usize,
    },
    #[error("op `{op}` requires {expected} attributes, got {actual}")]
    AttributeCountMismatch {
        op: String,
        expected: usize,
        actual: usize,
    },
    #[error("op `{op}` requires attribute `{attribute}` which is missing")]
    MissingAttribute { op: String, attribute: String },
    #[error("graph structure is invalid at node {node}: {reason}")]
    MalformedGraph { node: usize, reason: String },

    #[error(
        "failed to resolve kernel for node `{node}` (op `{op}`, device type `{device_type}`, dtypes {dtypes:?})"
    )]
    KernelNotFound {
        node: String,
        op: String,
        device_type: String,
        dtypes: Vec<DataType>,
    },

    #[error("{device} memory allocation failure ({bytes} bytes)")]
    AllocationFailed { device: String, bytes: usize },
    #[error("{device} allocation of {bytes} bytes exceeds tensor byte limit {limit}")]
    TensorLimit {
        device: String,
        bytes: usize,
        limit: usize,
    },
    #[error("{device} does not own the block being freed")]
    UnknownAllocation { device: String },
    #[error("{device} block was allocated as {allocated}, freed as {freed}")]
    FreeDtypeMismatch {
        device: String,
        allocated: DataType,
        freed: DataType,
    },
    #[error("shape {shape:?} overflows the element count")]
    ElementCountOverflow { shape: Vec<usize> },

    #[error("cannot reshape size={current} into size={requested}")]
    ReshapeMismatch { current: usize, requested: usize },

    #[error("only layout rank {max} is supported, got {rank}")]
    LayoutTooLarge { max: usize, rank: usize },
    #[error("shape and stride ranks mismatched ({shape} != {strides})")]
    LayoutRankMismatch { shape: usize, strides: usize },
    #[error("shape cannot have 0 dim (dimension {dim})")]
    ZeroDimension { dim: usize },
    #[error("view needs {required} elements but the region holds {available}")]
    MapOutOfBounds { required: usize, available: usize },
    #[error("index {indices:?} is out of bounds for shape {shape:?}")]
    IndexOutOfBounds {
        indices: Vec<usize>,
        shape: Vec<usize>,
    },
    #[error("bad cast, element size {element} does not match {dtype} size {expected}")]
    ElementSizeMismatch {
        dtype: DataType,
        element: usize,
        expected: usize,
    },
    #[error("bad cast, {dtype} buffer mapped as {requested}")]
    ElementTypeMismatch {
        dtype: DataType,
        requested: DataType,
    },
    #[error("attribute name `{attribute}` must not contain `/`")]
    InvalidAttributeName { attribute: String },
}

impl GraphError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        GraphError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn frozen(registry: &'static str, name: impl Into<String>) -> Self {
        GraphError::RegistryFrozen {
            registry,
            name: name.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            GraphError::Io { .. } | GraphError::Parse { .. } | GraphError::InvalidEnvValue { .. } => {
                ErrorKind::Io
            }
            GraphError::DuplicateDeviceType { .. }
            | GraphError::DiscoveryFailed { .. }
            | GraphError::DuplicateOp { .. }
            | GraphError::DuplicateAttribute { .. }
            | GraphError::KernelArityMismatch { .. }
            | GraphError::RegistryFrozen { .. } => ErrorKind::Configuration,
            GraphError::DeviceNotFound { .. }
            | GraphError::OpNotFound { .. }
            | GraphError::AttributeNotFound { .. }
            | GraphError::AttributeTypeMismatch { .. } => ErrorKind::Lookup,
            GraphError::KernelNotFound { .. } => ErrorKind::Resolution,
            GraphError::AllocationFailed { .. }
            | GraphError::TensorLimit { .. }
            | GraphError::UnknownAllocation { .. }
            | GraphError::FreeDtypeMismatch { .. }
            | GraphError::ElementCountOverflow { .. } => ErrorKind::Allocation,
            GraphError::ReshapeMismatch { .. } => ErrorKind::Resize,
            GraphError::BuilderNotAccumulating { .. }
            | GraphError::InvalidInputNode
            | GraphError::OutputSlotOutOfRange { .. }
            | GraphError::TooManyInputs { .. }
            | GraphError::OutputDtypeCountMismatch { .. }
            | GraphError::InputCountMismatch { .. }
            | GraphError::AttributeCountMismatch { .. }
            | GraphError::MissingAttribute { .. }
            | GraphError::MalformedGraph { .. }
            | GraphError::LayoutTooLarge { .. }
            | GraphError::LayoutRankMismatch { .. }
            | GraphError::ZeroDimension { .. }
            | GraphError::MapOutOfBounds { .. }
            | GraphError::IndexOutOfBounds { .. }
            | GraphError::ElementSizeMismatch { .. }
            | GraphError::ElementTypeMismatch { .. }
            | GraphError::InvalidAttributeName { .. } => ErrorKind::Validation,
        }
    }
}
