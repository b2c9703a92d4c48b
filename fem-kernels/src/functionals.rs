use fem_assembly::dofmap::DofLayout;
use fem_assembly::form::{CellGeometry, CellIntegral, ExteriorFacetIntegral, Form};
use fem_assembly::nalgebra::allocator::Allocator;
use fem_assembly::nalgebra::{DefaultAllocator, DimName};
use fem_assembly::Real;
use serde::{Deserialize, Serialize};

/// The functional `∫ 1 dx`, the measure of the mesh.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeFunctional;

impl<T, D> CellIntegral<T, D> for VolumeFunctional
where
    T: Real,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    fn tabulate_tensor(&self, a: &mut [T], _w: &[Vec<T>], cell: &CellGeometry<T, D>) -> eyre::Result<()> {
        a[0] = cell.volume();
        Ok(())
    }
}

impl<T, D> Form<T, D> for VolumeFunctional
where
    T: Real,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    fn rank(&self) -> usize {
        0
    }

    fn num_coefficients(&self) -> usize {
        0
    }

    fn argument_layout(&self, _index: usize) -> Option<DofLayout> {
        None
    }

    fn num_cell_integrals(&self) -> usize {
        1
    }

    fn cell_integral(&self, subdomain: usize) -> Option<&dyn CellIntegral<T, D>> {
        (subdomain == 0).then_some(self as &dyn CellIntegral<T, D>)
    }
}

/// The cell integral of a constant weight.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
struct WeightedVolume<T> {
    weight: T,
}

impl<T, D> CellIntegral<T, D> for WeightedVolume<T>
where
    T: Real,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    fn tabulate_tensor(&self, a: &mut [T], _w: &[Vec<T>], cell: &CellGeometry<T, D>) -> eyre::Result<()> {
        a[0] = self.weight * cell.volume();
        Ok(())
    }
}

/// A functional with one cell integral per subdomain, integrating a subdomain-specific
/// constant weight.
///
/// Subdomains without a weight (`None`) declare an integral index but contribute nothing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubdomainIndicator<T> {
    weights: Vec<Option<WeightedVolume<T>>>,
}

impl<T: Real> SubdomainIndicator<T> {
    pub fn new(weights: impl IntoIterator<Item = Option<T>>) -> Self {
        Self {
            weights: weights
                .into_iter()
                .map(|weight| weight.map(|weight| WeightedVolume { weight }))
                .collect(),
        }
    }

    /// Weight 1 on subdomain `subdomain` and no integral on the subdomains before it.
    pub fn single(subdomain: usize) -> Self {
        Self::new((0..=subdomain).map(|i| (i == subdomain).then(T::one)))
    }
}

impl<T, D> Form<T, D> for SubdomainIndicator<T>
where
    T: Real,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    fn rank(&self) -> usize {
        0
    }

    fn num_coefficients(&self) -> usize {
        0
    }

    fn argument_layout(&self, _index: usize) -> Option<DofLayout> {
        None
    }

    fn num_cell_integrals(&self) -> usize {
        self.weights.len()
    }

    fn cell_integral(&self, subdomain: usize) -> Option<&dyn CellIntegral<T, D>> {
        let integral = self.weights.get(subdomain)?.as_ref()?;
        Some(integral)
    }
}

/// The functional `∫ 1 ds` over the boundary of the mesh.
///
/// For interval meshes, the boundary facets are points of measure one, so the functional
/// counts the boundary points.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundaryMeasure;

impl<T, D> ExteriorFacetIntegral<T, D> for BoundaryMeasure
where
    T: Real,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    fn tabulate_tensor(
        &self,
        a: &mut [T],
        _w: &[Vec<T>],
        cell: &CellGeometry<T, D>,
        local_facet: usize,
    ) -> eyre::Result<()> {
        if local_facet >= cell.cell_type().num_facets() {
            eyre::bail!("local facet {local_facet} out of bounds for {}", cell.cell_type());
        }
        a[0] = cell.facet_volume(local_facet);
        Ok(())
    }
}

impl<T, D> Form<T, D> for BoundaryMeasure
where
    T: Real,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    fn rank(&self) -> usize {
        0
    }

    fn num_coefficients(&self) -> usize {
        0
    }

    fn argument_layout(&self, _index: usize) -> Option<DofLayout> {
        None
    }

    fn num_exterior_facet_integrals(&self) -> usize {
        1
    }

    fn exterior_facet_integral(&self, subdomain: usize) -> Option<&dyn ExteriorFacetIntegral<T, D>> {
        (subdomain == 0).then_some(self as &dyn ExteriorFacetIntegral<T, D>)
    }
}
