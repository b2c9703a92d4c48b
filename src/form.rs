//! The interface between the assembler and local element kernels.
//!
//! A [`Form`] describes a multilinear form of rank 0 (functional), 1 (linear form) or
//! 2 (bilinear form), possibly depending on coefficient functions. It declares a [`DofLayout`]
//! for each of its arguments (first the `rank` test/trial spaces, then one per coefficient), and
//! provides the local kernels for each kind of integral.
//!
//! Kernels fill a local tensor, stored as a flat row-major array with
//! `product(local_dimension(i))` entries over the `rank` arguments. Coefficient values are
//! passed as one array per coefficient, in the local dof order of the coefficient's layout.
//! For interior facet integrals, the local tensor and the coefficient arrays cover the dofs of
//! both adjacent cells, those of the first cell followed by those of the second.
use crate::dofmap::DofLayout;
use crate::mesh::{simplex_measure, CellType};
use crate::Real;
use nalgebra::allocator::Allocator;
use nalgebra::{DefaultAllocator, DimName, OPoint, Scalar};

/// Geometry of a single cell as seen by a local kernel.
#[derive(Debug, Clone)]
pub struct CellGeometry<T: Scalar, D>
where
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    cell_type: CellType,
    index: usize,
    vertex_indices: Vec<usize>,
    coordinates: Vec<OPoint<T, D>>,
}

impl<T, D> CellGeometry<T, D>
where
    T: Scalar,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    pub fn new(cell_type: CellType, index: usize, vertex_indices: Vec<usize>, coordinates: Vec<OPoint<T, D>>) -> Self {
        Self {
            cell_type,
            index,
            vertex_indices,
            coordinates,
        }
    }

    pub fn cell_type(&self) -> CellType {
        self.cell_type
    }

    /// The index of the cell in the mesh.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Global indices of the vertices of the cell, in local order.
    pub fn vertex_indices(&self) -> &[usize] {
        &self.vertex_indices
    }

    /// Coordinates of the vertices of the cell, in local order.
    pub fn coordinates(&self) -> &[OPoint<T, D>] {
        &self.coordinates
    }

    /// Coordinates of the vertices of a local facet, in local order.
    ///
    /// # Panics
    ///
    /// Panics if `local_facet` is not a valid local facet index.
    pub fn facet_coordinates(&self, local_facet: usize) -> Vec<OPoint<T, D>> {
        let tdim = self.cell_type.dim();
        self.cell_type.entity_vertices(tdim - 1)[local_facet]
            .iter()
            .map(|&v| self.coordinates[v].clone())
            .collect()
    }

    pub(crate) fn update(&mut self, cell_type: CellType, index: usize, vertex_indices: &[usize], vertices: &[OPoint<T, D>]) {
        self.cell_type = cell_type;
        self.index = index;
        self.vertex_indices.clear();
        self.vertex_indices.extend_from_slice(vertex_indices);
        self.coordinates.clear();
        self.coordinates
            .extend(vertex_indices.iter().map(|&v| vertices[v].clone()));
    }
}

impl<T, D> CellGeometry<T, D>
where
    T: Real,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    /// The measure of the cell.
    pub fn volume(&self) -> T {
        simplex_measure(&self.coordinates)
    }

    /// The measure of a local facet.
    pub fn facet_volume(&self, local_facet: usize) -> T {
        simplex_measure(&self.facet_coordinates(local_facet))
    }
}

/// A local kernel for an integral over cells.
pub trait CellIntegral<T: Scalar, D>
where
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    /// Compute the local tensor `a` (initially zero) of a cell.
    fn tabulate_tensor(&self, a: &mut [T], w: &[Vec<T>], cell: &CellGeometry<T, D>) -> eyre::Result<()>;
}

/// A local kernel for an integral over exterior (boundary) facets.
pub trait ExteriorFacetIntegral<T: Scalar, D>
where
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    /// Compute the local tensor `a` (initially zero) of facet `local_facet` of a cell.
    fn tabulate_tensor(&self, a: &mut [T], w: &[Vec<T>], cell: &CellGeometry<T, D>, local_facet: usize) -> eyre::Result<()>;
}

/// A local kernel for an integral over interior facets, shared by two cells.
pub trait InteriorFacetIntegral<T: Scalar, D>
where
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    /// Compute the local (macro) tensor `a` (initially zero) of the facet shared by `cell0` and
    /// `cell1`, which is local facet `local_facet0` of `cell0` and `local_facet1` of `cell1`.
    fn tabulate_tensor(
        &self,
        a: &mut [T],
        w: &[Vec<T>],
        cell0: &CellGeometry<T, D>,
        cell1: &CellGeometry<T, D>,
        local_facet0: usize,
        local_facet1: usize,
    ) -> eyre::Result<()>;
}

/// A multilinear form with its local kernels.
///
/// Integrals of each kind are indexed by subdomain: when subdomain markers are given for
/// assembly, the marker of an entity selects the integral used on it. Without markers, the
/// integral with index 0 is used everywhere. A form may declare an integral but return `None`
/// for it, in which case the corresponding entities do not contribute.
pub trait Form<T: Scalar, D>
where
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    /// The number of arguments (0 for a functional, 1 for a linear form, 2 for a bilinear form).
    fn rank(&self) -> usize;

    fn num_coefficients(&self) -> usize;

    /// The dof layout of argument `index`, where indices `rank..rank + num_coefficients` refer
    /// to the coefficients.
    fn argument_layout(&self, index: usize) -> Option<DofLayout>;

    fn num_cell_integrals(&self) -> usize {
        0
    }

    fn num_exterior_facet_integrals(&self) -> usize {
        0
    }

    fn num_interior_facet_integrals(&self) -> usize {
        0
    }

    fn cell_integral(&self, _subdomain: usize) -> Option<&dyn CellIntegral<T, D>> {
        None
    }

    fn exterior_facet_integral(&self, _subdomain: usize) -> Option<&dyn ExteriorFacetIntegral<T, D>> {
        None
    }

    fn interior_facet_integral(&self, _subdomain: usize) -> Option<&dyn InteriorFacetIntegral<T, D>> {
        None
    }

    /// The number of integrals of the given kind.
    fn num_integrals(&self, kind: IntegralKind) -> usize {
        match kind {
            IntegralKind::Cell => self.num_cell_integrals(),
            IntegralKind::ExteriorFacet => self.num_exterior_facet_integrals(),
            IntegralKind::InteriorFacet => self.num_interior_facet_integrals(),
        }
    }
}

/// The kinds of integrals a form can declare.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum IntegralKind {
    Cell,
    ExteriorFacet,
    InteriorFacet,
}

impl IntegralKind {
    pub(crate) fn description(&self) -> &'static str {
        match self {
            Self::Cell => "cells",
            Self::ExteriorFacet => "exterior facets",
            Self::InteriorFacet => "interior facets",
        }
    }
}
