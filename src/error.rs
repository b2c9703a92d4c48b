//! Error types for mesh, dof map and assembly operations.
use crate::mesh::CellType;
use std::fmt;
use std::fmt::{Display, Formatter};

/// Library-wide error type.
///
/// None of the errors are recoverable within the operation that produced them. In particular,
/// a global tensor that was being assembled when an error was returned holds unspecified values
/// and must be re-initialized before it is used again.
#[derive(Debug)]
#[non_exhaustive]
pub enum AssemblyError {
    /// The inputs to an operation are inconsistent with each other.
    Configuration(ConfigurationError),
    /// The mesh does not support the requested topological query.
    Topology(TopologyError),
    /// A global tensor was used in a state that does not permit the operation.
    State(StateError),
    /// A local kernel reported a failure.
    Kernel(eyre::Report),
}

/// The class of an [`AssemblyError`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Configuration,
    Topology,
    State,
    Kernel,
}

impl AssemblyError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Configuration(_) => ErrorCategory::Configuration,
            Self::Topology(_) => ErrorCategory::Topology,
            Self::State(_) => ErrorCategory::State,
            Self::Kernel(_) => ErrorCategory::Kernel,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigurationError {
    /// The number of dof maps does not match the form's rank plus its number of coefficients.
    ArgumentCountMismatch { expected: usize, actual: usize },
    /// The number of coefficient vectors does not match the form.
    CoefficientCountMismatch { expected: usize, actual: usize },
    /// A coefficient vector does not match the global dimension of its dof map.
    CoefficientSizeMismatch {
        coefficient: usize,
        expected: usize,
        actual: usize,
    },
    /// Only forms of rank 0, 1 and 2 can be assembled.
    UnsupportedRank(usize),
    /// The rank of the global tensor does not match the rank of the form.
    TensorRankMismatch { form_rank: usize, tensor_rank: usize },
    /// A dof layout or dof map was made for a different cell type than the mesh has.
    CellTypeMismatch { expected: CellType, actual: CellType },
    /// A dof map was built for a different mesh.
    ForeignDofMap,
    /// Subdomain markers have the wrong entity dimension or length.
    MarkerMismatch {
        expected_dim: usize,
        expected_len: usize,
        dim: usize,
        len: usize,
    },
    /// A cached dof map with the same signature has a different global numbering.
    SignatureCollision,
    /// The operation is not available on a dof map that is a view into a parent space.
    DofMapView { operation: &'static str },
    /// The requested component does not exist in the dof layout.
    InvalidComponent { component: usize, block_size: usize },
    /// The dof layout is not valid for its cell type.
    InvalidLayout(String),
    /// The mesh is not ordered, see [`Mesh::is_ordered`](crate::mesh::Mesh::is_ordered).
    UnorderedMesh,
    /// A string does not name a known cell type.
    UnknownCellType(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum TopologyError {
    /// The requested dimension exceeds the topological dimension of the mesh.
    InvalidDimension { dim: usize, topological_dim: usize },
    /// An entity index is out of bounds.
    EntityOutOfBounds { dim: usize, index: usize, count: usize },
    /// A facet is shared by more than two cells.
    NonManifoldFacet { facet: usize, num_cells: usize },
    /// The vertices or cells passed to a mesh constructor are inconsistent.
    InvalidMesh(String),
}

#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum StateError {
    /// The tensor has not been initialized.
    Uninitialized,
    /// The tensor has been finalized by `apply` and must be zeroed or re-initialized first.
    Finalized,
    /// The tensor must be finalized by `apply` before its values can be used.
    NotFinalized,
    /// The tensor cannot be initialized with the given layout.
    IncompatibleLayout(String),
    /// The multi-index has the wrong length or lies outside the tensor's dimensions.
    IndexOutOfBounds { index: Vec<usize>, dims: Vec<usize> },
    /// A sparse tensor has no stored entry at the given position.
    EntryOutsidePattern { row: usize, col: usize },
    /// The local block does not match the index arrays it is added with.
    BlockSizeMismatch { expected: usize, actual: usize },
    /// A sparsity pattern could not be constructed.
    InvalidPattern(String),
}

impl Display for AssemblyError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration(err) => write!(f, "invalid assembly configuration: {err}"),
            Self::Topology(err) => write!(f, "mesh topology error: {err}"),
            Self::State(err) => write!(f, "invalid tensor state: {err}"),
            Self::Kernel(err) => write!(f, "local kernel failed: {err}"),
        }
    }
}

impl Display for ConfigurationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::ArgumentCountMismatch { expected, actual } => write!(
                f,
                "form expects {expected} dof maps (rank + coefficients), got {actual}"
            ),
            Self::CoefficientCountMismatch { expected, actual } => {
                write!(f, "form expects {expected} coefficients, got {actual}")
            }
            Self::CoefficientSizeMismatch {
                coefficient,
                expected,
                actual,
            } => write!(
                f,
                "coefficient {coefficient} has length {actual}, but its dof map has global dimension {expected}"
            ),
            Self::UnsupportedRank(rank) => write!(f, "forms of rank {rank} are not supported"),
            Self::TensorRankMismatch { form_rank, tensor_rank } => write!(
                f,
                "cannot assemble form of rank {form_rank} into tensor of rank {tensor_rank}"
            ),
            Self::CellTypeMismatch { expected, actual } => {
                write!(f, "expected cell type {expected}, got {actual}")
            }
            Self::ForeignDofMap => write!(f, "dof map was built for a different mesh"),
            Self::MarkerMismatch {
                expected_dim,
                expected_len,
                dim,
                len,
            } => write!(
                f,
                "expected {expected_len} markers of dimension {expected_dim}, got {len} markers of dimension {dim}"
            ),
            Self::SignatureCollision => write!(
                f,
                "a dof map with the same signature but a different numbering is already cached"
            ),
            Self::DofMapView { operation } => {
                write!(f, "cannot {operation} on a sub dof map view")
            }
            Self::InvalidComponent { component, block_size } => write!(
                f,
                "component {component} out of bounds for block size {block_size}"
            ),
            Self::InvalidLayout(msg) => write!(f, "invalid dof layout: {msg}"),
            Self::UnorderedMesh => write!(f, "mesh is not ordered"),
            Self::UnknownCellType(name) => write!(f, "unknown cell type \"{name}\""),
        }
    }
}

impl Display for TopologyError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidDimension { dim, topological_dim } => write!(
                f,
                "dimension {dim} exceeds topological dimension {topological_dim}"
            ),
            Self::EntityOutOfBounds { dim, index, count } => write!(
                f,
                "entity {index} of dimension {dim} out of bounds ({count} entities)"
            ),
            Self::NonManifoldFacet { facet, num_cells } => {
                write!(f, "facet {facet} is shared by {num_cells} cells")
            }
            Self::InvalidMesh(msg) => write!(f, "invalid mesh: {msg}"),
        }
    }
}

impl Display for StateError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "tensor has not been initialized"),
            Self::Finalized => write!(f, "tensor has been finalized"),
            Self::NotFinalized => write!(f, "tensor has not been finalized with apply()"),
            Self::IncompatibleLayout(msg) => write!(f, "incompatible tensor layout: {msg}"),
            Self::IndexOutOfBounds { index, dims } => {
                write!(f, "index {index:?} out of bounds for dimensions {dims:?}")
            }
            Self::EntryOutsidePattern { row, col } => {
                write!(f, "entry ({row}, {col}) is not in the sparsity pattern")
            }
            Self::BlockSizeMismatch { expected, actual } => write!(
                f,
                "local block has {actual} entries, but indices describe {expected}"
            ),
            Self::InvalidPattern(err) => write!(f, "invalid sparsity pattern: {err}"),
        }
    }
}

impl std::error::Error for AssemblyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Configuration(err) => Some(err),
            Self::Topology(err) => Some(err),
            Self::State(err) => Some(err),
            Self::Kernel(err) => Some(&**err),
        }
    }
}

impl std::error::Error for ConfigurationError {}
impl std::error::Error for TopologyError {}
impl std::error::Error for StateError {}

impl From<ConfigurationError> for AssemblyError {
    fn from(err: ConfigurationError) -> Self {
        Self::Configuration(err)
    }
}

impl From<TopologyError> for AssemblyError {
    fn from(err: TopologyError) -> Self {
        Self::Topology(err)
    }
}

impl From<StateError> for AssemblyError {
    fn from(err: StateError) -> Self {
        Self::State(err)
    }
}
