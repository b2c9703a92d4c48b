//! Per-entity scratch state of the assembly loops.
use crate::dofmap::DofMapSet;
use crate::error::{AssemblyError, ConfigurationError};
use crate::form::{CellGeometry, CellIntegral, ExteriorFacetIntegral, InteriorFacetIntegral};
use crate::mesh::Mesh;
use crate::tensor::GlobalTensor;
use crate::Real;
use itertools::izip;
use nalgebra::allocator::Allocator;
use nalgebra::{DVector, DefaultAllocator, DimName};

/// Buffers for the local tensor, the local-to-global dof indices and the local coefficient
/// values of the entity currently being assembled.
///
/// The buffers are sized once from the dof maps and reused for every entity. Single cells use
/// the plain buffers, pairs of cells sharing an interior facet use the macro buffers, which hold
/// the data of the first cell followed by that of the second.
#[derive(Debug, Clone)]
pub struct LocalAssemblyContext<T: Real, D>
where
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    tensor: Vec<T>,
    macro_tensor: Vec<T>,
    dofs: Vec<Vec<usize>>,
    macro_dofs: Vec<Vec<usize>>,
    w: Vec<Vec<T>>,
    macro_w: Vec<Vec<T>>,
    cell: CellGeometry<T, D>,
    cell0: CellGeometry<T, D>,
    cell1: CellGeometry<T, D>,
}

impl<T, D> LocalAssemblyContext<T, D>
where
    T: Real,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    pub fn new(mesh: &Mesh<T, D>, dof_maps: &DofMapSet) -> Self {
        let local_dims = dof_maps.local_dimensions();
        let tensor_size: usize = local_dims.iter().product();
        let macro_tensor_size: usize = local_dims.iter().map(|n| 2 * n).product();
        let geometry = || CellGeometry::new(mesh.cell_type(), 0, Vec::new(), Vec::new());
        Self {
            tensor: vec![T::zero(); tensor_size],
            macro_tensor: vec![T::zero(); macro_tensor_size],
            dofs: local_dims.iter().map(|&n| Vec::with_capacity(n)).collect(),
            macro_dofs: local_dims.iter().map(|&n| Vec::with_capacity(2 * n)).collect(),
            w: dof_maps
                .coefficients()
                .iter()
                .map(|m| Vec::with_capacity(m.local_dimension()))
                .collect(),
            macro_w: dof_maps
                .coefficients()
                .iter()
                .map(|m| Vec::with_capacity(2 * m.local_dimension()))
                .collect(),
            cell: geometry(),
            cell0: geometry(),
            cell1: geometry(),
        }
    }

    /// Prepare the buffers for a single cell: zero the local tensor, gather the dofs of every
    /// argument and the local values of every coefficient, and load the cell geometry.
    pub fn update_cell(
        &mut self,
        mesh: &Mesh<T, D>,
        cell: usize,
        dof_maps: &DofMapSet,
        coefficients: &[&DVector<T>],
    ) -> Result<(), AssemblyError> {
        self.tensor.fill(T::zero());
        for (dofs, dof_map) in self.dofs.iter_mut().zip(dof_maps.arguments()) {
            dofs.clear();
            dofs.extend_from_slice(dof_map.tabulate_dofs(cell)?);
        }
        for (w, dof_map, coefficient) in izip!(&mut self.w, dof_maps.coefficients(), coefficients) {
            w.clear();
            w.extend(dof_map.tabulate_dofs(cell)?.iter().map(|&dof| coefficient[dof]));
        }
        self.cell
            .update(mesh.cell_type(), cell, mesh.cell_vertices(cell)?, mesh.vertices());
        Ok(())
    }

    /// Prepare the macro buffers for the two cells sharing an interior facet.
    pub fn update_cell_pair(
        &mut self,
        mesh: &Mesh<T, D>,
        cells: [usize; 2],
        dof_maps: &DofMapSet,
        coefficients: &[&DVector<T>],
    ) -> Result<(), AssemblyError> {
        self.macro_tensor.fill(T::zero());
        for (dofs, dof_map) in self.macro_dofs.iter_mut().zip(dof_maps.arguments()) {
            dofs.clear();
            for cell in cells {
                dofs.extend_from_slice(dof_map.tabulate_dofs(cell)?);
            }
        }
        for (w, dof_map, coefficient) in izip!(&mut self.macro_w, dof_maps.coefficients(), coefficients) {
            w.clear();
            for cell in cells {
                w.extend(dof_map.tabulate_dofs(cell)?.iter().map(|&dof| coefficient[dof]));
            }
        }
        let [c0, c1] = cells;
        self.cell0
            .update(mesh.cell_type(), c0, mesh.cell_vertices(c0)?, mesh.vertices());
        self.cell1
            .update(mesh.cell_type(), c1, mesh.cell_vertices(c1)?, mesh.vertices());
        Ok(())
    }

    pub fn tabulate_cell(&mut self, integral: &dyn CellIntegral<T, D>) -> Result<(), AssemblyError> {
        integral
            .tabulate_tensor(&mut self.tensor, &self.w, &self.cell)
            .map_err(AssemblyError::Kernel)
    }

    pub fn tabulate_exterior_facet(
        &mut self,
        integral: &dyn ExteriorFacetIntegral<T, D>,
        local_facet: usize,
    ) -> Result<(), AssemblyError> {
        integral
            .tabulate_tensor(&mut self.tensor, &self.w, &self.cell, local_facet)
            .map_err(AssemblyError::Kernel)
    }

    pub fn tabulate_interior_facet(
        &mut self,
        integral: &dyn InteriorFacetIntegral<T, D>,
        local_facets: [usize; 2],
    ) -> Result<(), AssemblyError> {
        integral
            .tabulate_tensor(
                &mut self.macro_tensor,
                &self.macro_w,
                &self.cell0,
                &self.cell1,
                local_facets[0],
                local_facets[1],
            )
            .map_err(AssemblyError::Kernel)
    }

    /// Add the local tensor of the current cell to `global`.
    pub fn add_to<G>(&self, global: &mut G) -> Result<(), AssemblyError>
    where
        G: ?Sized + GlobalTensor<T>,
    {
        scatter(global, &self.tensor, &self.dofs)
    }

    /// Add the macro tensor of the current cell pair to `global`.
    pub fn add_macro_to<G>(&self, global: &mut G) -> Result<(), AssemblyError>
    where
        G: ?Sized + GlobalTensor<T>,
    {
        scatter(global, &self.macro_tensor, &self.macro_dofs)
    }

    /// The local tensor, in row-major order.
    pub fn tensor(&self) -> &[T] {
        &self.tensor
    }

    pub fn macro_tensor(&self) -> &[T] {
        &self.macro_tensor
    }

    /// Global dofs of each argument on the current cell.
    pub fn dofs(&self) -> &[Vec<usize>] {
        &self.dofs
    }

    pub fn macro_dofs(&self) -> &[Vec<usize>] {
        &self.macro_dofs
    }

    /// Local coefficient values on the current cell.
    pub fn coefficients(&self) -> &[Vec<T>] {
        &self.w
    }

    pub fn macro_coefficients(&self) -> &[Vec<T>] {
        &self.macro_w
    }

    pub fn cell(&self) -> &CellGeometry<T, D> {
        &self.cell
    }

    pub fn cell_pair(&self) -> (&CellGeometry<T, D>, &CellGeometry<T, D>) {
        (&self.cell0, &self.cell1)
    }
}

fn scatter<T, G>(global: &mut G, block: &[T], dofs: &[Vec<usize>]) -> Result<(), AssemblyError>
where
    G: ?Sized + GlobalTensor<T>,
{
    match dofs {
        [] => global.add(block, &[]),
        [rows] => global.add(block, &[rows.as_slice()]),
        [rows, cols] => global.add(block, &[rows.as_slice(), cols.as_slice()]),
        _ => Err(ConfigurationError::UnsupportedRank(dofs.len()).into()),
    }
}
