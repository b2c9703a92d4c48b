use crate::error::{AssemblyError, StateError};
use crate::tensor::{check_assembling, check_block, check_finalized, check_initialized, GlobalTensor, TensorLayout, TensorState};
use crate::Real;
use nalgebra_sparse::csr::CsrRowMut;
use nalgebra_sparse::pattern::SparsityPattern;
use nalgebra_sparse::{CsrMatrix, SparseEntry, SparseEntryMut};

/// A sparse rank-2 tensor in CSR format.
///
/// The sparsity pattern is fixed at initialization. Adding to an entry outside the pattern
/// is an error.
#[derive(Debug, Clone)]
pub struct SparseMatrix<T: Real> {
    csr: CsrMatrix<T>,
    state: TensorState,
    // Buffer for sorting local column indices by global index
    column_permutation: Vec<usize>,
}

impl<T: Real> Default for SparseMatrix<T> {
    fn default() -> Self {
        Self {
            csr: CsrMatrix::zeros(0, 0),
            state: TensorState::Uninitialized,
            column_permutation: Vec::new(),
        }
    }
}

impl<T: Real> SparseMatrix<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// The assembled matrix.
    pub fn csr(&self) -> Result<&CsrMatrix<T>, AssemblyError> {
        check_finalized(self.state)?;
        Ok(&self.csr)
    }

    pub fn into_csr(self) -> Result<CsrMatrix<T>, AssemblyError> {
        check_finalized(self.state)?;
        Ok(self.csr)
    }

    /// The sparsity pattern, available once the matrix is initialized.
    pub fn pattern(&self) -> Result<&SparsityPattern, AssemblyError> {
        check_initialized(self.state)?;
        Ok(self.csr.pattern())
    }

    pub fn nnz(&self) -> usize {
        self.csr.nnz()
    }

    fn check_index(&self, index: &[usize]) -> Result<(usize, usize), StateError> {
        let (m, n) = (self.csr.nrows(), self.csr.ncols());
        match *index {
            [i, j] if i < m && j < n => Ok((i, j)),
            _ => Err(StateError::IndexOutOfBounds {
                index: index.to_vec(),
                dims: vec![m, n],
            }),
        }
    }
}

/// Add a row of a local block to a row of the CSR matrix.
///
/// `sorted_permutation` holds the local column indices ordered by their global column index,
/// so that the CSR row can be traversed once.
fn add_local_row_to_csr_row<T: Real>(
    row: &mut CsrRowMut<T>,
    global_row: usize,
    global_cols: &[usize],
    sorted_permutation: &[usize],
    local_row: &[T],
) -> Result<(), StateError> {
    debug_assert_eq!(global_cols.len(), local_row.len());
    let (csr_cols, values) = row.cols_and_values_mut();

    let mut pos = 0;
    for &local_col in sorted_permutation {
        let global_col = global_cols[local_col];
        // Duplicate global columns are sorted next to each other, so the search never
        // has to move backwards
        while pos < csr_cols.len() && csr_cols[pos] < global_col {
            pos += 1;
        }
        if pos == csr_cols.len() || csr_cols[pos] != global_col {
            return Err(StateError::EntryOutsidePattern {
                row: global_row,
                col: global_col,
            });
        }
        values[pos] += local_row[local_col];
    }
    Ok(())
}

impl<T: Real> GlobalTensor<T> for SparseMatrix<T> {
    fn rank(&self) -> usize {
        2
    }

    fn state(&self) -> TensorState {
        self.state
    }

    fn dims(&self) -> Vec<usize> {
        vec![self.csr.nrows(), self.csr.ncols()]
    }

    fn init(&mut self, layout: TensorLayout) -> Result<(), AssemblyError> {
        let pattern = match layout {
            TensorLayout::Sparse(pattern) => pattern,
            TensorLayout::Dense(dims) => {
                return Err(StateError::IncompatibleLayout(format!(
                    "sparse matrix requires a sparsity pattern, got dense layout with dimensions {dims:?}"
                ))
                .into())
            }
        };
        let values = vec![T::zero(); pattern.nnz()];
        self.csr = CsrMatrix::try_from_pattern_and_values(pattern, values)
            .map_err(|err| StateError::InvalidPattern(err.to_string()))?;
        self.state = TensorState::Assembling;
        Ok(())
    }

    fn add(&mut self, block: &[T], indices: &[&[usize]]) -> Result<(), AssemblyError> {
        check_assembling(self.state)?;
        check_block(block.len(), indices, 2)?;
        let (rows, cols) = (indices[0], indices[1]);
        if cols.is_empty() {
            return Ok(());
        }

        let dims = vec![self.csr.nrows(), self.csr.ncols()];
        let permutation = &mut self.column_permutation;
        permutation.clear();
        permutation.extend(0..cols.len());
        permutation.sort_unstable_by_key(|&local| cols[local]);

        for (&global_row, block_row) in rows.iter().zip(block.chunks_exact(cols.len())) {
            let mut csr_row = self
                .csr
                .get_row_mut(global_row)
                .ok_or_else(|| StateError::IndexOutOfBounds {
                    index: vec![global_row, cols[permutation[0]]],
                    dims: dims.clone(),
                })?;
            add_local_row_to_csr_row(&mut csr_row, global_row, cols, &permutation[..], block_row)?;
        }
        Ok(())
    }

    fn get(&self, index: &[usize]) -> Result<T, AssemblyError> {
        check_initialized(self.state)?;
        let (i, j) = self.check_index(index)?;
        match self.csr.get_entry(i, j) {
            Some(SparseEntry::NonZero(value)) => Ok(*value),
            _ => Ok(T::zero()),
        }
    }

    fn set(&mut self, index: &[usize], value: T) -> Result<(), AssemblyError> {
        check_assembling(self.state)?;
        let (i, j) = self.check_index(index)?;
        match self.csr.get_entry_mut(i, j) {
            Some(SparseEntryMut::NonZero(entry)) => {
                *entry = value;
                Ok(())
            }
            _ => Err(StateError::EntryOutsidePattern { row: i, col: j }.into()),
        }
    }

    fn zero(&mut self) -> Result<(), AssemblyError> {
        check_initialized(self.state)?;
        self.csr.values_mut().fill(T::zero());
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
