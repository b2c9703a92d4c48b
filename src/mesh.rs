use crate::error::{AssemblyError, TopologyError};
use crate::Real;
use nalgebra::allocator::Allocator;
use nalgebra::{DefaultAllocator, DimName, OPoint, Scalar, U1, U2, U3};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

pub mod cell_type;
pub mod editor;
pub mod markers;
pub mod procedural;
pub mod refinement;
pub mod topology;

pub use cell_type::{simplex_measure, CellType};
pub use editor::MeshEditor;
pub use markers::MeshMarkers;
pub use topology::{MeshConnectivity, MeshTopology};

/// Identifies a mesh (and its clones) for the purpose of caching data derived from its topology.
///
/// Every constructed mesh receives a fresh id. Clones share the id of the original, since
/// they share its topology. Operations that change the topology in place assign a new id.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeshId(u64);

impl MeshId {
    fn next() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(0);
        Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// A simplex mesh: vertex coordinates together with the topology of its cells.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(bound(serialize = "T: Serialize", deserialize = "T: Deserialize<'de>"))]
pub struct Mesh<T: Scalar, D>
where
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    #[serde(skip, default = "MeshId::next")]
    id: MeshId,
    // serde's not able correctly determine the necessary trait bounds in this case,
    // so write our own
    #[serde(bound(
        serialize = "<DefaultAllocator as Allocator<T, D>>::Buffer: Serialize",
        deserialize = "<DefaultAllocator as Allocator<T, D>>::Buffer: Deserialize<'de>"
    ))]
    vertices: Vec<OPoint<T, D>>,
    topology: MeshTopology,
}

pub type Mesh1d<T> = Mesh<T, U1>;
pub type Mesh2d<T> = Mesh<T, U2>;
pub type Mesh3d<T> = Mesh<T, U3>;

impl<T, D> PartialEq for Mesh<T, D>
where
    T: Scalar,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    fn eq(&self, other: &Self) -> bool {
        self.vertices == other.vertices && self.topology == other.topology
    }
}

/// A cell adjacent to a facet, with the local index of the facet within the cell.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct CellFacet {
    pub cell: usize,
    pub local_facet: usize,
}

/// The cells adjacent to a facet.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum FacetNeighbors {
    /// The facet belongs to no cell. Only vertices of an interval mesh that are not referenced
    /// by any cell end up here.
    Detached,
    /// The facet lies on the boundary of the mesh.
    Exterior(CellFacet),
    /// The facet is shared by two cells, the one with the smaller index first.
    Interior(CellFacet, CellFacet),
}

impl<T, D> Mesh<T, D>
where
    T: Scalar,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    /// Construct a mesh from vertices and the flattened vertex indices of its cells.
    pub fn from_vertices_and_cells(
        vertices: Vec<OPoint<T, D>>,
        cell_type: CellType,
        cells: Vec<usize>,
    ) -> Result<Self, AssemblyError> {
        let cell_size = cell_type.num_vertices(cell_type.dim());
        if cells.len() % cell_size != 0 {
            return Err(TopologyError::InvalidMesh(format!(
                "{} cell indices cannot be split into {cell_type} cells of {cell_size} vertices",
                cells.len()
            ))
            .into());
        }
        let cells = MeshConnectivity::from_uniform(cell_size, cells);
        let topology = MeshTopology::new(cell_type, vertices.len(), cells)?;
        Self::from_vertices_and_topology(vertices, topology)
    }

    pub fn from_vertices_and_topology(
        vertices: Vec<OPoint<T, D>>,
        topology: MeshTopology,
    ) -> Result<Self, AssemblyError> {
        if topology.num_vertices() != vertices.len() {
            return Err(TopologyError::InvalidMesh(format!(
                "topology has {} vertices, but {} coordinates were given",
                topology.num_vertices(),
                vertices.len()
            ))
            .into());
        }
        if topology.dim() > D::dim() {
            return Err(TopologyError::InvalidMesh(format!(
                "cannot embed {} cells in {} dimensions",
                topology.cell_type(),
                D::dim()
            ))
            .into());
        }
        Ok(Self {
            id: MeshId::next(),
            vertices,
            topology,
        })
    }

    /// Construct a mesh from flattened cells that are valid by construction.
    pub(crate) fn from_valid_parts(vertices: Vec<OPoint<T, D>>, cell_type: CellType, cells: Vec<usize>) -> Self {
        let cell_size = cell_type.num_vertices(cell_type.dim());
        let cells = MeshConnectivity::from_uniform(cell_size, cells);
        let topology = MeshTopology::from_valid_cells(cell_type, vertices.len(), cells);
        Self {
            id: MeshId::next(),
            vertices,
            topology,
        }
    }

    pub fn id(&self) -> MeshId {
        self.id
    }

    pub fn vertices(&self) -> &[OPoint<T, D>] {
        &self.vertices
    }

    pub fn vertices_mut(&mut self) -> &mut [OPoint<T, D>] {
        &mut self.vertices
    }

    pub fn topology(&self) -> &MeshTopology {
        &self.topology
    }

    pub fn cell_type(&self) -> CellType {
        self.topology.cell_type()
    }

    pub fn topological_dim(&self) -> usize {
        self.topology.dim()
    }

    pub fn geometric_dim(&self) -> usize {
        D::dim()
    }

    pub fn num_vertices(&self) -> usize {
        self.vertices.len()
    }

    pub fn num_cells(&self) -> usize {
        self.topology.num_cells()
    }

    /// Number of entities of the given dimension, computing them if necessary.
    pub fn num_entities(&self, dim: usize) -> Result<usize, AssemblyError> {
        self.topology.num_entities(dim)
    }

    pub fn num_facets(&self) -> Result<usize, AssemblyError> {
        self.num_entities(self.topological_dim() - 1)
    }

    /// Connectivity `(d0, d1)`, computing it if necessary.
    pub fn connectivity(&self, d0: usize, d1: usize) -> Result<&MeshConnectivity, AssemblyError> {
        self.topology.connectivity(d0, d1)
    }

    /// Compute all entities and connectivity of the mesh.
    pub fn init(&self) -> Result<(), AssemblyError> {
        self.topology.init()
    }

    pub fn cell_vertices(&self, cell: usize) -> Result<&[usize], AssemblyError> {
        self.topology.cells().get(cell).ok_or_else(|| {
            TopologyError::EntityOutOfBounds {
                dim: self.topological_dim(),
                index: cell,
                count: self.num_cells(),
            }
            .into()
        })
    }

    /// Coordinates of the vertices of a cell, in local order.
    pub fn cell_coordinates(&self, cell: usize) -> Result<Vec<OPoint<T, D>>, AssemblyError> {
        Ok(self
            .cell_vertices(cell)?
            .iter()
            .map(|&v| self.vertices[v].clone())
            .collect())
    }

    /// Coordinates of the vertices of an entity.
    pub fn entity_coordinates(&self, dim: usize, entity: usize) -> Result<Vec<OPoint<T, D>>, AssemblyError> {
        let connectivity = self.connectivity(dim, 0)?;
        let vertices = connectivity
            .get(entity)
            .ok_or(TopologyError::EntityOutOfBounds {
                dim,
                index: entity,
                count: connectivity.len(),
            })?;
        Ok(vertices.iter().map(|&v| self.vertices[v].clone()).collect())
    }

    /// Whether the vertices of every cell are listed in ascending global order.
    ///
    /// In an ordered mesh, the local vertex order of every sub-entity of a cell agrees with the
    /// global vertex order, so that neighboring cells see shared entities the same way. Local
    /// kernels and dof maps rely on this.
    pub fn is_ordered(&self) -> bool {
        self.topology
            .cells()
            .iter()
            .all(|cell| cell.windows(2).all(|w| w[0] < w[1]))
    }

    /// Sorts the vertices of every cell in ascending order.
    ///
    /// The computed topology is discarded and the mesh receives a new id.
    pub fn order(&mut self) {
        if self.is_ordered() {
            return;
        }
        let cells = self.topology.cells_mut();
        let offsets = cells.offsets().to_vec();
        let mut indices = cells.indices().to_vec();
        for w in offsets.windows(2) {
            indices[w[0]..w[1]].sort_unstable();
        }
        *cells = MeshConnectivity::from_offsets_and_indices(offsets, indices);
        self.id = MeshId::next();
    }

    /// The local index of `facet` among the facets of `cell`.
    pub fn local_facet_index(&self, cell: usize, facet: usize) -> Result<usize, AssemblyError> {
        let tdim = self.topological_dim();
        let cell_facets = self
            .connectivity(tdim, tdim - 1)?
            .get(cell)
            .ok_or(TopologyError::EntityOutOfBounds {
                dim: tdim,
                index: cell,
                count: self.num_cells(),
            })?;
        cell_facets.iter().position(|&f| f == facet).ok_or_else(|| {
            TopologyError::InvalidMesh(format!("facet {facet} is not a facet of cell {cell}")).into()
        })
    }

    /// The cells adjacent to a facet.
    ///
    /// Returns an error if the facet is shared by more than two cells.
    pub fn facet_neighbors(&self, facet: usize) -> Result<FacetNeighbors, AssemblyError> {
        let tdim = self.topological_dim();
        let facet_cells = self.connectivity(tdim - 1, tdim)?;
        let cells = facet_cells.get(facet).ok_or(TopologyError::EntityOutOfBounds {
            dim: tdim - 1,
            index: facet,
            count: facet_cells.len(),
        })?;
        let cell_facet = |cell: usize| -> Result<CellFacet, AssemblyError> {
            Ok(CellFacet {
                cell,
                local_facet: self.local_facet_index(cell, facet)?,
            })
        };
        match *cells {
            [] => Ok(FacetNeighbors::Detached),
            [cell] => Ok(FacetNeighbors::Exterior(cell_facet(cell)?)),
            [cell0, cell1] => Ok(FacetNeighbors::Interior(cell_facet(cell0)?, cell_facet(cell1)?)),
            _ => Err(TopologyError::NonManifoldFacet {
                facet,
                num_cells: cells.len(),
            }
            .into()),
        }
    }

    /// Facets on the boundary of the mesh, in ascending order, with their adjacent cell.
    pub fn exterior_facets(&self) -> Result<Vec<(usize, CellFacet)>, AssemblyError> {
        let mut facets = Vec::new();
        for facet in 0..self.num_facets()? {
            if let FacetNeighbors::Exterior(cell) = self.facet_neighbors(facet)? {
                facets.push((facet, cell));
            }
        }
        Ok(facets)
    }

    /// Facets shared by two cells, in ascending order, with their adjacent cells.
    pub fn interior_facets(&self) -> Result<Vec<(usize, CellFacet, CellFacet)>, AssemblyError> {
        let mut facets = Vec::new();
        for facet in 0..self.num_facets()? {
            if let FacetNeighbors::Interior(cell0, cell1) = self.facet_neighbors(facet)? {
                facets.push((facet, cell0, cell1));
            }
        }
        Ok(facets)
    }
}

impl<T, D> Mesh<T, D>
where
    T: Real,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    /// The barycenter of an entity.
    pub fn entity_midpoint(&self, dim: usize, entity: usize) -> Result<OPoint<T, D>, AssemblyError> {
        let coordinates = self.entity_coordinates(dim, entity)?;
        let mut sum = OPoint::<T, D>::origin();
        for point in &coordinates {
            sum.coords += &point.coords;
        }
        let n = T::from_usize(coordinates.len()).unwrap_or_else(T::one);
        Ok(OPoint::from(sum.coords / n))
    }

    /// The measure of a cell.
    pub fn cell_volume(&self, cell: usize) -> Result<T, AssemblyError> {
        let coordinates = self.entity_coordinates(self.topological_dim(), cell)?;
        Ok(self.cell_type().volume(&coordinates))
    }

    /// The sum of the measures of all cells.
    pub fn total_volume(&self) -> Result<T, AssemblyError> {
        (0..self.num_cells()).try_fold(T::zero(), |acc, cell| Ok(acc + self.cell_volume(cell)?))
    }
}
