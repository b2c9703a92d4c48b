use crate::geometry::p1_mass_entry;
use crate::layouts::p1;
use fem_assembly::dofmap::DofLayout;
use fem_assembly::form::{CellGeometry, CellIntegral, Form};
use fem_assembly::mesh::CellType;
use fem_assembly::nalgebra::allocator::Allocator;
use fem_assembly::nalgebra::{DefaultAllocator, DimName};
use fem_assembly::Real;
use serde::{Deserialize, Serialize};

/// The P1 load vector `∫ f v dx` of a P1 coefficient `f`.
///
/// The coefficient is integrated exactly, so the load vector equals the mass matrix applied to
/// the nodal values of `f`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadForm {
    cell_type: CellType,
}

impl LoadForm {
    pub fn new(cell_type: CellType) -> Self {
        Self { cell_type }
    }
}

impl<T, D> CellIntegral<T, D> for LoadForm
where
    T: Real,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    fn tabulate_tensor(&self, a: &mut [T], w: &[Vec<T>], cell: &CellGeometry<T, D>) -> eyre::Result<()> {
        let tdim = cell.cell_type().dim();
        let n = tdim + 1;
        let f = match w {
            [f] if f.len() == n => f,
            _ => eyre::bail!("load form expects one coefficient with {} local values", n),
        };
        let volume = cell.volume();
        for (i, a_i) in a.iter_mut().enumerate() {
            *a_i = (0..n).fold(T::zero(), |acc, j| acc + p1_mass_entry(volume, tdim, i, j) * f[j]);
        }
        Ok(())
    }
}

impl<T, D> Form<T, D> for LoadForm
where
    T: Real,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    fn rank(&self) -> usize {
        1
    }

    fn num_coefficients(&self) -> usize {
        1
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
