//! Global tensors that local contributions are assembled into.
//!
//! The [`GlobalTensor`] trait is the accumulation target of the assembler. A tensor moves
//! through three states:
//!
//! - *uninitialized*: freshly constructed, no structure,
//! - *assembling*: after [`init`](GlobalTensor::init), [`zero`](GlobalTensor::zero) or
//!   [`resume`](GlobalTensor::resume), accepting
//!   [`add`](GlobalTensor::add) and [`set`](GlobalTensor::set),
//! - *finalized*: after [`apply`](GlobalTensor::apply), when its values may be used.
//!
//! Local blocks are flat row-major arrays, matching the local tensors filled by kernels.
use crate::error::{AssemblyError, StateError};
use crate::Real;
use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::pattern::SparsityPattern;
use nalgebra_sparse::CsrMatrix;

mod sparse;

pub use sparse::SparseMatrix;

/// The structure a global tensor is initialized with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TensorLayout {
    /// A dense tensor with the given dimensions (empty for a scalar).
    Dense(Vec<usize>),
    /// A rank-2 tensor whose nonzero entries are restricted to a sparsity pattern.
    Sparse(SparsityPattern),
}

impl TensorLayout {
    pub fn rank(&self) -> usize {
        match self {
            Self::Dense(dims) => dims.len(),
            Self::Sparse(_) => 2,
        }
    }

    pub fn dims(&self) -> Vec<usize> {
        match self {
            Self::Dense(dims) => dims.clone(),
            Self::Sparse(pattern) => vec![pattern.major_dim(), pattern.minor_dim()],
        }
    }

    /// The number of stored entries.
    pub fn nnz(&self) -> usize {
        match self {
            Self::Dense(dims) => dims.iter().product(),
            Self::Sparse(pattern) => pattern.nnz(),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum TensorState {
    Uninitialized,
    Assembling,
    Finalized,
}

/// An accumulation target for assembly.
pub trait GlobalTensor<T> {
    fn rank(&self) -> usize;

    fn state(&self) -> TensorState;

    /// The dimensions of the tensor, empty for a scalar.
    fn dims(&self) -> Vec<usize>;

    /// Allocate the tensor with the given structure and set all entries to zero.
    fn init(&mut self, layout: TensorLayout) -> Result<(), AssemblyError>;

    /// Add a local block to the entries at the outer product of `indices`, one index array per
    /// dimension of the tensor.
    fn add(&mut self, block: &[T], indices: &[&[usize]]) -> Result<(), AssemblyError>;

    fn get(&self, index: &[usize]) -> Result<T, AssemblyError>;

    fn set(&mut self, index: &[usize], value: T) -> Result<(), AssemblyError>;

    /// Set all entries to zero, keeping the structure.
    fn zero(&mut self) -> Result<(), AssemblyError>;

    /// Reopen an initialized tensor for further additions, keeping its values.
    fn resume(&mut self) -> Result<(), AssemblyError>;

    /// Finalize the tensor after assembly.
    fn apply(&mut self) -> Result<(), AssemblyError>;
}

pub(crate) fn check_assembling(state: TensorState) -> Result<(), StateError> {
    match state {
        TensorState::Uninitialized => Err(StateError::Uninitialized),
        TensorState::Assembling => Ok(()),
        TensorState::Finalized => Err(StateError::Finalized),
    }
}

pub(crate) fn check_initialized(state: TensorState) -> Result<(), StateError> {
    match state {
        TensorState::Uninitialized => Err(StateError::Uninitialized),
        _ => Ok(()),
    }
}

pub(crate) fn check_finalized(state: TensorState) -> Result<(), StateError> {
    match state {
        TensorState::Finalized => Ok(()),
        TensorState::Uninitialized => Err(StateError::Uninitialized),
        TensorState::Assembling => Err(StateError::NotFinalized),
    }
}

/// Checks that `indices` has one index array per dimension and describes a block of `block_len` entries.
pub(crate) fn check_block(block_len: usize, indices: &[&[usize]], rank: usize) -> Result<(), StateError> {
    if indices.len() != rank {
        return Err(StateError::IncompatibleLayout(format!(
            "expected {rank} index arrays, got {}",
            indices.len()
        )));
    }
    let expected: usize = indices.iter().map(|idx| idx.len()).product();
    if expected != block_len {
        return Err(StateError::BlockSizeMismatch {
            expected,
            actual: block_len,
        });
    }
    Ok(())
}

fn check_dense_layout(layout: &TensorLayout, rank: usize) -> Result<Vec<usize>, StateError> {
    if layout.rank() != rank {
        return Err(StateError::IncompatibleLayout(format!(
            "layout of rank {} for tensor of rank {rank}",
            layout.rank()
        )));
    }
    Ok(layout.dims())
}

fn out_of_bounds(index: &[usize], dims: &[usize]) -> StateError {
    StateError::IndexOutOfBounds {
        index: index.to_vec(),
        dims: dims.to_vec(),
    }
}

/// A rank-0 tensor.
#[derive(Debug, Clone)]
pub struct Scalar<T> {
    value: T,
    state: TensorState,
}

impl<T: Real> Default for Scalar<T> {
    fn default() -> Self {
        Self {
            value: T::zero(),
            state: TensorState::Uninitialized,
        }
    }
}

impl<T: Real> Scalar<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// The assembled value.
    pub fn value(&self) -> Result<T, AssemblyError> {
        check_finalized(self.state)?;
        Ok(self.value)
    }
}

impl<T: Real> GlobalTensor<T> for Scalar<T> {
    fn rank(&self) -> usize {
        0
    }

    fn state(&self) -> TensorState {
        self.state
    }

    fn dims(&self) -> Vec<usize> {
        Vec::new()
    }

    fn init(&mut self, layout: TensorLayout) -> Result<(), AssemblyError> {
        check_dense_layout(&layout, 0)?;
        self.value = T::zero();
        self.state = TensorState::Assembling;
        Ok(())
    }

    fn add(&mut self, block: &[T], indices: &[&[usize]]) -> Result<(), AssemblyError> {
        check_assembling(self.state)?;
        check_block(block.len(), indices, 0)?;
        self.value += block[0];
        Ok(())
    }

    fn get(&self, index: &[usize]) -> Result<T, AssemblyError> {
        check_initialized(self.state)?;
        if !index.is_empty() {
            return Err(out_of_bounds(index, &[]).into());
        }
        Ok(self.value)
    }

    fn set(&mut self, index: &[usize], value: T) -> Result<(), AssemblyError> {
        check_assembling(self.state)?;
        if !index.is_empty() {
            return Err(out_of_bounds(index, &[]).into());
        }
        self.value = value;
        Ok(())
    }

    fn zero(&mut self) -> Result<(), AssemblyError> {
        check_initialized(self.state)?;
        self.value = T::zero();
        self.state = TensorState::Assembling;
        Ok(())
    }

    fn resume(&mut self) -> Result<(), AssemblyError> {
        check_initialized(self.state)?;
        self.state = TensorState::Assembling;
        Ok(())
    }

    fn apply(&mut self) -> Result<(), AssemblyError> {
        check_initialized(self.state)?;
        self.state = TensorState::Finalized;
        Ok(())
    }
}

/// A dense rank-1 tensor.
#[derive(Debug, Clone)]
pub struct Vector<T: Real> {
    vector: DVector<T>,
    state: TensorState,
}

impl<T: Real> Default for Vector<T> {
    fn default() -> Self {
        Self {
            vector: DVector::zeros(0),
            state: TensorState::Uninitialized,
        }
    }
}

impl<T: Real> Vector<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// The assembled vector.
    pub fn vector(&self) -> Result<&DVector<T>, AssemblyError> {
        check_finalized(self.state)?;
        Ok(&self.vector)
    }

    pub fn into_vector(self) -> Result<DVector<T>, AssemblyError> {
        check_finalized(self.state)?;
        Ok(self.vector)
    }
}

impl<T: Real> GlobalTensor<T> for Vector<T> {
    fn rank(&self) -> usize {
        1
    }

    fn state(&self) -> TensorState {
        self.state
    }

    fn dims(&self) -> Vec<usize> {
        vec![self.vector.len()]
    }

    fn init(&mut self, layout: TensorLayout) -> Result<(), AssemblyError> {
        let dims = check_dense_layout(&layout, 1)?;
        self.vector = DVector::zeros(dims[0]);
        self.state = TensorState::Assembling;
        Ok(())
    }

    fn add(&mut self, block: &[T], indices: &[&[usize]]) -> Result<(), AssemblyError> {
        check_assembling(self.state)?;
        check_block(block.len(), indices, 1)?;
        let n = self.vector.len();
        for (&value, &i) in block.iter().zip(indices[0]) {
            if i >= n {
                return Err(out_of_bounds(&[i], &[n]).into());
            }
            self.vector[i] += value;
        }
        Ok(())
    }

    fn get(&self, index: &[usize]) -> Result<T, AssemblyError> {
        check_initialized(self.state)?;
        match *index {
            [i] if i < self.vector.len() => Ok(self.vector[i]),
            _ => Err(out_of_bounds(index, &[self.vector.len()]).into()),
        }
    }

    fn set(&mut self, index: &[usize], value: T) -> Result<(), AssemblyError> {
        check_assembling(self.state)?;
        match *index {
            [i] if i < self.vector.len() => {
                self.vector[i] = value;
                Ok(())
            }
            _ => Err(out_of_bounds(index, &[self.vector.len()]).into()),
        }
    }

    fn zero(&mut self) -> Result<(), AssemblyError> {
        check_initialized(self.state)?;
        self.vector.fill(T::zero());
        self.state = TensorState::Assembling;
        Ok(())
    }

    fn resume(&mut self) -> Result<(), AssemblyError> {
        check_initialized(self.state)?;
        self.state = TensorState::Assembling;
        Ok(())
    }

    fn apply(&mut self) -> Result<(), AssemblyError> {
        check_initialized(self.state)?;
        self.state = TensorState::Finalized;
        Ok(())
    }
}

/// A dense rank-2 tensor.
///
/// Accepts both dense and sparse layouts. A sparsity pattern only determines the dimensions.
#[derive(Debug, Clone)]
pub struct DenseMatrix<T: Real> {
    matrix: DMatrix<T>,
    state: TensorState,
}

impl<T: Real> Default for DenseMatrix<T> {
    fn default() -> Self {
        Self {
            matrix: DMatrix::zeros(0, 0),
            state: TensorState::Uninitialized,
        }
    }
}

impl<T: Real> DenseMatrix<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// The assembled matrix.
    pub fn matrix(&self) -> Result<&DMatrix<T>, AssemblyError> {
        check_finalized(self.state)?;
        Ok(&self.matrix)
    }

    pub fn into_matrix(self) -> Result<DMatrix<T>, AssemblyError> {
        check_finalized(self.state)?;
        Ok(self.matrix)
    }
}

impl<T: Real> GlobalTensor<T> for DenseMatrix<T> {
    fn rank(&self) -> usize {
        2
    }

    fn state(&self) -> TensorState {
        self.state
    }

    fn dims(&self) -> Vec<usize> {
        let (m, n) = self.matrix.shape();
        vec![m, n]
    }

    fn init(&mut self, layout: TensorLayout) -> Result<(), AssemblyError> {
        let dims = check_dense_layout(&layout, 2)?;
        self.matrix = DMatrix::zeros(dims[0], dims[1]);
        self.state = TensorState::Assembling;
        Ok(())
    }

    fn add(&mut self, block: &[T], indices: &[&[usize]]) -> Result<(), AssemblyError> {
        check_assembling(self.state)?;
        check_block(block.len(), indices, 2)?;
        let (rows, cols) = (indices[0], indices[1]);
        let (m, n) = self.matrix.shape();
        for (local_row, &i) in rows.iter().enumerate() {
            for (local_col, &j) in cols.iter().enumerate() {
                if i >= m || j >= n {
                    return Err(out_of_bounds(&[i, j], &[m, n]).into());
                }
                self.matrix[(i, j)] += block[local_row * cols.len() + local_col];
            }
        }
        Ok(())
    }

    fn get(&self, index: &[usize]) -> Result<T, AssemblyError> {
        check_initialized(self.state)?;
        let (m, n) = self.matrix.shape();
        match *index {
            [i, j] if i < m && j < n => Ok(self.matrix[(i, j)]),
            _ => Err(out_of_bounds(index, &[m, n]).into()),
        }
    }

    fn set(&mut self, index: &[usize], value: T) -> Result<(), AssemblyError> {
        check_assembling(self.state)?;
        let (m, n) = self.matrix.shape();
        match *index {
            [i, j] if i < m && j < n => {
                self.matrix[(i, j)] = value;
                Ok(())
            }
            _ => Err(out_of_bounds(index, &[m, n]).into()),
        }
    }

    fn zero(&mut self) -> Result<(), AssemblyError> {
        check_initialized(self.state)?;
        self.matrix.fill(T::zero());
        self.state = TensorState::Assembling;
        Ok(())
    }

    fn resume(&mut self) -> Result<(), AssemblyError> {
        check_initialized(self.state)?;
        self.state = TensorState::Assembling;
        Ok(())
    }

    fn apply(&mut self) -> Result<(), AssemblyError> {
        check_initialized(self.state)?;
        self.state = TensorState::Finalized;
        Ok(())
    }
}

/// Convert an assembled sparse matrix to a dense one, mostly useful for testing.
pub fn csr_to_dense<T: Real>(csr: &CsrMatrix<T>) -> DMatrix<T> {
    DMatrix::from(csr)
}
