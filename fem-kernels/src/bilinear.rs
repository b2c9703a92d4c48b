use crate::geometry::{barycentric_gradients, p1_mass_entry};
use crate::layouts::{dg1, p1};
use fem_assembly::dofmap::DofLayout;
use fem_assembly::form::{CellGeometry, CellIntegral, Form, InteriorFacetIntegral};
use fem_assembly::mesh::CellType;
use fem_assembly::nalgebra::allocator::Allocator;
use fem_assembly::nalgebra::{DefaultAllocator, DimName};
use fem_assembly::Real;
use serde::{Deserialize, Serialize};

fn check_tensor_size<T>(a: &[T], n: usize) -> eyre::Result<()> {
    if a.len() != n * n {
        eyre::bail!("expected local tensor of size {}x{}, got {} entries", n, n, a.len());
    }
    Ok(())
}

/// The P1 mass matrix `∫ u v dx`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MassForm {
    cell_type: CellType,
}

impl MassForm {
    pub fn new(cell_type: CellType) -> Self {
        Self { cell_type }
    }
}

impl<T, D> CellIntegral<T, D> for MassForm
where
    T: Real,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    fn tabulate_tensor(&self, a: &mut [T], _w: &[Vec<T>], cell: &CellGeometry<T, D>) -> eyre::Result<()> {
        let tdim = cell.cell_type().dim();
        let n = tdim + 1;
        check_tensor_size(a, n)?;
        let volume = cell.volume();
        for i in 0..n {
            for j in 0..n {
                a[i * n + j] = p1_mass_entry(volume, tdim, i, j);
            }
        }
        Ok(())
    }
}

impl<T, D> Form<T, D> for MassForm
where
    T: Real,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    fn rank(&self) -> usize {
        2
    }

    fn num_coefficients(&self) -> usize {
        0
    }

    fn argument_layout(&self, index: usize) -> Option<DofLayout> {
        (index < 2).then(|| p1(self.cell_type))
    }

    fn num_cell_integrals(&self) -> usize {
        1
    }

    fn cell_integral(&self, subdomain: usize) -> Option<&dyn CellIntegral<T, D>> {
        (subdomain == 0).then_some(self as &dyn CellIntegral<T, D>)
    }
}

/// The P1 stiffness matrix of the Laplacian `∫ ∇u · ∇v dx`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StiffnessForm {
    cell_type: CellType,
}

impl StiffnessForm {
    pub fn new(cell_type: CellType) -> Self {
        Self { cell_type }
    }
}

impl<T, D> CellIntegral<T, D> for StiffnessForm
where
    T: Real,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    fn tabulate_tensor(&self, a: &mut [T], _w: &[Vec<T>], cell: &CellGeometry<T, D>) -> eyre::Result<()> {
        let n = cell.cell_type().dim() + 1;
        check_tensor_size(a, n)?;
        let gradients = barycentric_gradients(cell.coordinates())?;
        let volume = cell.volume();
        for i in 0..n {
            for j in 0..n {
                a[i * n + j] = volume * gradients.column(i).dot(&gradients.column(j));
            }
        }
        Ok(())
    }
}

impl<T, D> Form<T, D> for StiffnessForm
where
    T: Real,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    fn rank(&self) -> usize {
        2
    }

    fn num_coefficients(&self) -> usize {
        0
    }

    fn argument_layout(&self, index: usize) -> Option<DofLayout> {
        (index < 2).then(|| p1(self.cell_type))
    }

    fn num_cell_integrals(&self) -> usize {
        1
    }

    fn cell_integral(&self, subdomain: usize) -> Option<&dyn CellIntegral<T, D>> {
        (subdomain == 0).then_some(self as &dyn CellIntegral<T, D>)
    }
}

/// The jump penalty `∑_F ∫_F γ [u] [v] ds` of discontinuous P1 functions over interior facets.
///
/// The jump across a facet is the value in the first cell minus the value in the second. The
/// form has no cell integral, so on its own it only couples the dofs of neighboring cells.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteriorPenaltyForm<T> {
    cell_type: CellType,
    penalty: T,
}

impl<T: Real> InteriorPenaltyForm<T> {
    pub fn new(cell_type: CellType, penalty: T) -> Self {
        Self { cell_type, penalty }
    }

    pub fn penalty(&self) -> T {
        self.penalty
    }
}

impl<T, D> InteriorFacetIntegral<T, D> for InteriorPenaltyForm<T>
where
    T: Real,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    fn tabulate_tensor(
        &self,
        a: &mut [T],
        _w: &[Vec<T>],
        cell0: &CellGeometry<T, D>,
        cell1: &CellGeometry<T, D>,
        local_facet0: usize,
        _local_facet1: usize,
    ) -> eyre::Result<()> {
        let tdim = cell0.cell_type().dim();
        let n = tdim + 1;
        check_tensor_size(a, 2 * n)?;
        let facet_volume = cell0.facet_volume(local_facet0);
        let facet_vertices = cell0.cell_type().entity_vertices(tdim - 1)[local_facet0];
        let on_facet = |v: usize| facet_vertices.iter().any(|&f| cell0.vertex_indices()[f] == v);

        // Macro dof k lives on global vertex `vertices[k]`, with sign +1 on the first cell
        // and -1 on the second
        let vertices: Vec<usize> = cell0
            .vertex_indices()
            .iter()
            .chain(cell1.vertex_indices())
            .copied()
            .collect();
        let sign = |k: usize| if k < n { T::one() } else { -T::one() };

        for k in 0..2 * n {
            for l in 0..2 * n {
                let (vk, vl) = (vertices[k], vertices[l]);
                a[k * 2 * n + l] = if on_facet(vk) && on_facet(vl) {
                    let (i, j) = if vk == vl { (0, 0) } else { (0, 1) };
                    self.penalty * sign(k) * sign(l) * p1_mass_entry(facet_volume, tdim - 1, i, j)
                } else {
                    T::zero()
                };
            }
        }
        Ok(())
    }
}

impl<T, D> Form<T, D> for InteriorPenaltyForm<T>
where
    T: Real,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    fn rank(&self) -> usize {
        2
    }

    fn num_coefficients(&self) -> usize {
        0
    }

    fn argument_layout(&self, index: usize) -> Option<DofLayout> {
        (index < 2).then(|| dg1(self.cell_type))
    }

    fn num_interior_facet_integrals(&self) -> usize {
        1
    }

    fn interior_facet_integral(&self, subdomain: usize) -> Option<&dyn InteriorFacetIntegral<T, D>> {
        (subdomain == 0).then_some(self as &dyn InteriorFacetIntegral<T, D>)
    }
}
