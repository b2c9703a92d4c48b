use crate::error::{AssemblyError, ConfigurationError};
use crate::mesh::editor::MeshEditor;
use crate::Real;
use nalgebra::allocator::Allocator;
use nalgebra::{DMatrix, DefaultAllocator, DimName, OPoint, Scalar};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Local vertex indices of the sub-entities of each simplex, per dimension.
///
/// The tables follow the UFC reference convention: the vertices of each sub-entity are listed
/// in ascending local order, and facet `i` of a triangle or tetrahedron is the facet opposite
/// to local vertex `i`. Edges of a tetrahedron are numbered so that edge `i` and edge `5 - i`
/// do not share a vertex.
type EntityTable = &'static [&'static [usize]];

const INTERVAL_ENTITIES: [EntityTable; 2] = [&[&[0], &[1]], &[&[0, 1]]];

const TRIANGLE_ENTITIES: [EntityTable; 3] = [
    &[&[0], &[1], &[2]],
    &[&[1, 2], &[0, 2], &[0, 1]],
    &[&[0, 1, 2]],
];

const TETRAHEDRON_ENTITIES: [EntityTable; 4] = [
    &[&[0], &[1], &[2], &[3]],
    &[&[2, 3], &[1, 3], &[1, 2], &[0, 3], &[0, 2], &[0, 1]],
    &[&[1, 2, 3], &[0, 2, 3], &[0, 1, 3], &[0, 1, 2]],
    &[&[0, 1, 2, 3]],
];

/// The simplex cell types supported by [`Mesh`](crate::mesh::Mesh).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CellType {
    Interval,
    Triangle,
    Tetrahedron,
}

impl CellType {
    /// The topological dimension of the cell.
    pub fn dim(&self) -> usize {
        match self {
            Self::Interval => 1,
            Self::Triangle => 2,
            Self::Tetrahedron => 3,
        }
    }

    /// Local vertex indices of every sub-entity of the given dimension.
    ///
    /// # Panics
    ///
    /// Panics if `dim` exceeds the dimension of the cell.
    pub fn entity_vertices(&self, dim: usize) -> &'static [&'static [usize]] {
        assert!(dim <= self.dim(), "dimension {dim} exceeds cell dimension {}", self.dim());
        match self {
            Self::Interval => INTERVAL_ENTITIES[dim],
            Self::Triangle => TRIANGLE_ENTITIES[dim],
            Self::Tetrahedron => TETRAHEDRON_ENTITIES[dim],
        }
    }

    /// The number of sub-entities of the given dimension in a single cell.
    ///
    /// # Panics
    ///
    /// Panics if `dim` exceeds the dimension of the cell.
    pub fn num_entities(&self, dim: usize) -> usize {
        self.entity_vertices(dim).len()
    }

    /// The number of vertices of a sub-entity of the given dimension.
    ///
    /// # Panics
    ///
    /// Panics if `dim` exceeds the dimension of the cell.
    pub fn num_vertices(&self, dim: usize) -> usize {
        assert!(dim <= self.dim(), "dimension {dim} exceeds cell dimension {}", self.dim());
        dim + 1
    }

    /// The cell type of a sub-entity of the given dimension.
    ///
    /// Vertices have no cell type, so `None` is returned for `dim == 0` and for dimensions
    /// exceeding the dimension of the cell.
    pub fn entity_type(&self, dim: usize) -> Option<CellType> {
        if dim > self.dim() {
            return None;
        }
        match dim {
            1 => Some(Self::Interval),
            2 => Some(Self::Triangle),
            3 => Some(Self::Tetrahedron),
            _ => None,
        }
    }

    pub fn num_facets(&self) -> usize {
        self.num_entities(self.dim() - 1)
    }

    /// Sorted global vertex tuples of the sub-entities of dimension `dim` of a cell.
    ///
    /// The tuples are listed in the local entity order of the cell type.
    ///
    /// # Panics
    ///
    /// Panics if `dim` exceeds the dimension of the cell, or if `cell_vertices` has fewer
    /// vertices than the cell type.
    pub fn create_entities(&self, dim: usize, cell_vertices: &[usize]) -> Vec<Vec<usize>> {
        self.entity_vertices(dim)
            .iter()
            .map(|local| {
                let mut entity: Vec<_> = local.iter().map(|&v| cell_vertices[v]).collect();
                entity.sort_unstable();
                entity
            })
            .collect()
    }

    /// The number of cells a single cell is split into by uniform refinement.
    pub fn num_refined_cells(&self) -> usize {
        match self {
            Self::Interval => 2,
            Self::Triangle => 4,
            Self::Tetrahedron => 8,
        }
    }

    /// Adds the children of a uniformly refined cell to `editor`.
    ///
    /// `cell_vertices` are the (ordered) vertices of the parent cell and `cell_edges` its global
    /// edge indices in local edge order. The new vertex on edge `e` is expected at index
    /// `vertex_offset + e`. The children are added at consecutive indices starting at
    /// `*current_cell`, which is advanced past them.
    pub fn refine_cell<T, D>(
        &self,
        cell_vertices: &[usize],
        cell_edges: &[usize],
        vertex_offset: usize,
        editor: &mut MeshEditor<T, D>,
        current_cell: &mut usize,
    ) -> Result<(), AssemblyError>
    where
        T: Scalar,
        D: DimName,
        DefaultAllocator: Allocator<T, D>,
    {
        let v = cell_vertices;
        let e: Vec<_> = cell_edges.iter().map(|edge| vertex_offset + edge).collect();
        let children: Vec<Vec<usize>> = match self {
            Self::Interval => vec![vec![v[0], e[0]], vec![e[0], v[1]]],
            Self::Triangle => vec![
                vec![v[0], e[2], e[1]],
                vec![v[1], e[0], e[2]],
                vec![v[2], e[1], e[0]],
                vec![e[0], e[1], e[2]],
            ],
            Self::Tetrahedron => vec![
                vec![v[0], e[3], e[4], e[5]],
                vec![v[1], e[1], e[2], e[5]],
                vec![v[2], e[0], e[2], e[4]],
                vec![v[3], e[0], e[1], e[3]],
                // The inner octahedron is split along the diagonal between the midpoints of
                // edge 0 and edge 5
                vec![e[0], e[1], e[2], e[5]],
                vec![e[0], e[1], e[3], e[5]],
                vec![e[0], e[2], e[4], e[5]],
                vec![e[0], e[3], e[4], e[5]],
            ],
        };

        for child in children {
            editor.add_cell(*current_cell, &child)?;
            *current_cell += 1;
        }
        Ok(())
    }

    /// The measure (length, area or volume) of a cell given its vertex coordinates.
    ///
    /// The geometric dimension may exceed the topological dimension.
    pub fn volume<T, D>(&self, coordinates: &[OPoint<T, D>]) -> T
    where
        T: Real,
        D: DimName,
        DefaultAllocator: Allocator<T, D>,
    {
        debug_assert_eq!(coordinates.len(), self.num_vertices(self.dim()));
        simplex_measure(coordinates)
    }
}

/// The measure of the simplex spanned by the given points.
///
/// Computed from the Gram determinant of the edge vectors emanating from the first point,
/// so that it also holds for simplices embedded in a higher-dimensional space. A single point
/// has measure one.
pub fn simplex_measure<T, D>(points: &[OPoint<T, D>]) -> T
where
    T: Real,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    let k = points.len().saturating_sub(1);
    if k == 0 {
        return T::one();
    }
    let origin = &points[0];
    let jacobian = DMatrix::from_fn(D::dim(), k, |i, j| points[j + 1][i] - origin[i]);
    let gram = jacobian.transpose() * &jacobian;
    let factorial = (1..=k).fold(T::one(), |acc, n| acc * T::from_usize(n).unwrap_or_else(T::one));
    gram.determinant().max(T::zero()).sqrt() / factorial
}

impl Display for CellType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Interval => "interval",
            Self::Triangle => "triangle",
            Self::Tetrahedron => "tetrahedron",
        };
        write!(f, "{name}")
    }
}

impl FromStr for CellType {
    type Err = AssemblyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "interval" => Ok(Self::Interval),
            "triangle" => Ok(Self::Triangle),
            "tetrahedron" => Ok(Self::Tetrahedron),
            other => Err(ConfigurationError::UnknownCellType(other.to_string()).into()),
        }
    }
}
