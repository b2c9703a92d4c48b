use crate::error::{AssemblyError, TopologyError};
use crate::mesh::{CellType, Mesh, MeshConnectivity, MeshTopology};
use nalgebra::allocator::Allocator;
use nalgebra::{DefaultAllocator, DimName, OPoint, Scalar};

/// Incremental construction of a [`Mesh`].
///
/// The number of vertices and cells is declared up front, after which vertices and cells may
/// be added at arbitrary indices. [`close`](Self::close) validates that every declared vertex
/// and cell was added and produces the mesh.
#[derive(Debug, Clone)]
pub struct MeshEditor<T: Scalar, D>
where
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    cell_type: CellType,
    vertices: Vec<Option<OPoint<T, D>>>,
    cells: Vec<usize>,
    cell_added: Vec<bool>,
}

impl<T, D> MeshEditor<T, D>
where
    T: Scalar,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    pub fn new(cell_type: CellType) -> Self {
        Self {
            cell_type,
            vertices: Vec::new(),
            cells: Vec::new(),
            cell_added: Vec::new(),
        }
    }

    pub fn cell_type(&self) -> CellType {
        self.cell_type
    }

    /// Declare the number of vertices, discarding previously added vertices.
    pub fn init_vertices(&mut self, num_vertices: usize) {
        self.vertices = vec![None; num_vertices];
    }

    /// Declare the number of cells, discarding previously added cells.
    pub fn init_cells(&mut self, num_cells: usize) {
        let cell_size = self.cell_size();
        self.cells = vec![usize::MAX; num_cells * cell_size];
        self.cell_added = vec![false; num_cells];
    }

    pub fn num_vertices(&self) -> usize {
        self.vertices.len()
    }

    pub fn num_cells(&self) -> usize {
        self.cell_added.len()
    }

    fn cell_size(&self) -> usize {
        self.cell_type.num_vertices(self.cell_type.dim())
    }

    pub fn add_vertex(&mut self, index: usize, point: OPoint<T, D>) -> Result<(), AssemblyError> {
        let num_vertices = self.vertices.len();
        let slot = self
            .vertices
            .get_mut(index)
            .ok_or(TopologyError::EntityOutOfBounds {
                dim: 0,
                index,
                count: num_vertices,
            })?;
        *slot = Some(point);
        Ok(())
    }

    pub fn add_cell(&mut self, index: usize, vertices: &[usize]) -> Result<(), AssemblyError> {
        let cell_size = self.cell_size();
        if index >= self.num_cells() {
            return Err(TopologyError::EntityOutOfBounds {
                dim: self.cell_type.dim(),
                index,
                count: self.num_cells(),
            }
            .into());
        }
        if vertices.len() != cell_size {
            return Err(TopologyError::InvalidMesh(format!(
                "a {} has {cell_size} vertices, got {}",
                self.cell_type,
                vertices.len()
            ))
            .into());
        }
        if let Some(&v) = vertices.iter().find(|&&v| v >= self.num_vertices()) {
            return Err(TopologyError::EntityOutOfBounds {
                dim: 0,
                index: v,
                count: self.num_vertices(),
            }
            .into());
        }
        self.cells[index * cell_size..(index + 1) * cell_size].copy_from_slice(vertices);
        self.cell_added[index] = true;
        Ok(())
    }

    /// Finish editing and construct the mesh.
    pub fn close(self) -> Result<Mesh<T, D>, AssemblyError> {
        if let Some(cell) = self.cell_added.iter().position(|added| !added) {
            return Err(TopologyError::InvalidMesh(format!("cell {cell} was declared but never added")).into());
        }
        let num_vertices = self.vertices.len();
        let vertices = self
            .vertices
            .into_iter()
            .enumerate()
            .map(|(index, vertex)| {
                vertex.ok_or_else(|| TopologyError::InvalidMesh(format!("vertex {index} was declared but never added")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let cell_size = self.cell_type.num_vertices(self.cell_type.dim());
        let cells = MeshConnectivity::from_uniform(cell_size, self.cells);
        let topology = MeshTopology::new(self.cell_type, num_vertices, cells)?;
        Mesh::from_vertices_and_topology(vertices, topology)
    }
}
