//! Construction of the nonzero structure of global tensors.
use crate::dofmap::{DofMap, DofMapSet};
use crate::error::{AssemblyError, StateError};
use crate::mesh::{FacetNeighbors, Mesh};
use crate::tensor::TensorLayout;
use log::debug;
use nalgebra::allocator::Allocator;
use nalgebra::{DefaultAllocator, DimName, Scalar};
use nalgebra_sparse::pattern::SparsityPattern;
use rayon::slice::ParallelSliceMut;

/// Collects the coupled (row, column) pairs of a rank-2 tensor.
///
/// Entries may be inserted any number of times. [`finish`](Self::finish) sorts and deduplicates
/// them into a CSR [`SparsityPattern`].
#[derive(Debug, Clone)]
pub struct SparsityPatternBuilder {
    num_rows: usize,
    num_cols: usize,
    entries: Vec<(usize, usize)>,
}

impl SparsityPatternBuilder {
    pub fn new(num_rows: usize, num_cols: usize) -> Self {
        Self {
            num_rows,
            num_cols,
            entries: Vec::new(),
        }
    }

    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    pub fn num_cols(&self) -> usize {
        self.num_cols
    }

    /// Mark all entries in the outer product `rows x cols` as nonzero.
    pub fn insert_block(&mut self, rows: &[usize], cols: &[usize]) -> Result<(), AssemblyError> {
        if let Some(&i) = rows.iter().find(|&&i| i >= self.num_rows) {
            return Err(self.out_of_bounds(i, cols.first().copied().unwrap_or(0)));
        }
        if let Some(&j) = cols.iter().find(|&&j| j >= self.num_cols) {
            return Err(self.out_of_bounds(rows.first().copied().unwrap_or(0), j));
        }
        self.entries.reserve(rows.len() * cols.len());
        for &i in rows {
            self.entries.extend(cols.iter().map(|&j| (i, j)));
        }
        Ok(())
    }

    fn out_of_bounds(&self, row: usize, col: usize) -> AssemblyError {
        StateError::IndexOutOfBounds {
            index: vec![row, col],
            dims: vec![self.num_rows, self.num_cols],
        }
        .into()
    }

    /// Couple the dofs of each cell in `row_map` with the dofs of the same cell in `col_map`.
    pub fn insert_cells<T, D>(&mut self, mesh: &Mesh<T, D>, row_map: &DofMap, col_map: &DofMap) -> Result<(), AssemblyError>
    where
        T: Scalar,
        D: DimName,
        DefaultAllocator: Allocator<T, D>,
    {
        for cell in 0..mesh.num_cells() {
            self.insert_block(row_map.tabulate_dofs(cell)?, col_map.tabulate_dofs(cell)?)?;
        }
        Ok(())
    }

    /// Couple the dofs of the two cells adjacent to each interior facet.
    ///
    /// Only the blocks between different cells are inserted: the block of a cell with itself
    /// comes from [`insert_cells`](Self::insert_cells).
    pub fn insert_interior_facets<T, D>(
        &mut self,
        mesh: &Mesh<T, D>,
        row_map: &DofMap,
        col_map: &DofMap,
    ) -> Result<(), AssemblyError>
    where
        T: Scalar,
        D: DimName,
        DefaultAllocator: Allocator<T, D>,
    {
        for facet in 0..mesh.num_facets()? {
            if let FacetNeighbors::Interior(first, second) = mesh.facet_neighbors(facet)? {
                let rows0 = row_map.tabulate_dofs(first.cell)?;
                let rows1 = row_map.tabulate_dofs(second.cell)?;
                let cols0 = col_map.tabulate_dofs(first.cell)?;
                let cols1 = col_map.tabulate_dofs(second.cell)?;
                self.insert_block(rows0, cols1)?;
                self.insert_block(rows1, cols0)?;
            }
        }
        Ok(())
    }

    /// The number of inserted entries, counting duplicates.
    pub fn num_inserted(&self) -> usize {
        self.entries.len()
    }

    pub fn finish(self) -> Result<SparsityPattern, AssemblyError> {
        let Self {
            num_rows,
            num_cols,
            mut entries,
        } = self;
        entries.par_sort_unstable();
        entries.dedup();

        let mut offsets = Vec::with_capacity(num_rows + 1);
        let mut column_indices = Vec::with_capacity(entries.len());

        offsets.push(0);
        for (i, j) in entries {
            // Loop to handle consecutive empty rows
            while i + 1 > offsets.len() {
                offsets.push(column_indices.len());
            }
            column_indices.push(j);
        }
        while offsets.len() < num_rows + 1 {
            offsets.push(column_indices.len());
        }

        SparsityPattern::try_from_offsets_and_indices(num_rows, num_cols, offsets, column_indices)
            .map_err(|err| StateError::InvalidPattern(err.to_string()).into())
    }
}

/// Build the layout of the global tensor of a form with the given dof maps.
///
/// Functionals and linear forms get dense layouts. For bilinear forms, `cells` couples the dofs
/// within each cell and `interior_facets` couples the dofs of cells sharing a facet.
///
/// The interior facet blocks only couple the two cells with each other. An interior facet
/// integral also writes into the block of each cell with itself, so a pattern for such a form
/// needs `cells` as well, even if the form has no cell integral.
pub fn build<T, D>(
    mesh: &Mesh<T, D>,
    dof_maps: &DofMapSet,
    cells: bool,
    interior_facets: bool,
) -> Result<TensorLayout, AssemblyError>
where
    T: Scalar,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    let dims = dof_maps.global_dimensions();
    if dims.len() < 2 {
        return Ok(TensorLayout::Dense(dims));
    }

    let (row_map, col_map) = (&dof_maps.arguments()[0], &dof_maps.arguments()[1]);
    let mut builder = SparsityPatternBuilder::new(dims[0], dims[1]);
    if cells {
        builder.insert_cells(mesh, row_map, col_map)?;
    }
    if interior_facets {
        builder.insert_interior_facets(mesh, row_map, col_map)?;
    }

    let num_inserted = builder.num_inserted();
    let pattern = builder.finish()?;
    debug!(
        "Built sparsity pattern of size {}x{} with {} nonzeros ({} inserted)",
        dims[0],
        dims[1],
        pattern.nnz(),
        num_inserted
    );
    Ok(TensorLayout::Sparse(pattern))
}
