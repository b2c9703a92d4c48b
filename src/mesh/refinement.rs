//! Uniform mesh refinement.
//!
//! Every cell is split by inserting a new vertex at the midpoint of each of its edges, see
//! [`CellType::refine_cell`](crate::mesh::CellType::refine_cell) for the subdivision of each
//! cell type.
use crate::error::AssemblyError;
use crate::mesh::{Mesh, MeshEditor};
use crate::Real;
use log::debug;
use nalgebra::allocator::Allocator;
use nalgebra::{DefaultAllocator, DimName, OPoint};
use numeric_literals::replace_float_literals;

/// Refine a mesh uniformly.
///
/// The vertices of the input mesh keep their indices. The midpoint of edge `e` becomes vertex
/// `num_vertices + e`. Children of cell `c` are numbered consecutively, starting at
/// `c * num_refined_cells`. The refined mesh is ordered.
#[replace_float_literals(T::from_f64(literal).expect("Literal must fit in T"))]
pub fn refine_uniformly<T, D>(mesh: &Mesh<T, D>) -> Result<Mesh<T, D>, AssemblyError>
where
    T: Real,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    let cell_type = mesh.cell_type();
    let tdim = mesh.topological_dim();
    let num_vertices = mesh.num_vertices();
    let edge_vertices = mesh.connectivity(1, 0)?;
    let cell_edges = mesh.connectivity(tdim, 1)?;

    let mut editor = MeshEditor::new(cell_type);
    editor.init_vertices(num_vertices + edge_vertices.len());
    for (index, vertex) in mesh.vertices().iter().enumerate() {
        editor.add_vertex(index, vertex.clone())?;
    }
    for (edge, vertices) in edge_vertices.iter().enumerate() {
        let a = &mesh.vertices()[vertices[0]].coords;
        let b = &mesh.vertices()[vertices[1]].coords;
        let midpoint = OPoint::from((a + b) * 0.5);
        editor.add_vertex(num_vertices + edge, midpoint)?;
    }

    editor.init_cells(cell_type.num_refined_cells() * mesh.num_cells());
    let mut current_cell = 0;
    for (cell_vertices, edges) in mesh.topology().cells().iter().zip(cell_edges.iter()) {
        cell_type.refine_cell(cell_vertices, edges, num_vertices, &mut editor, &mut current_cell)?;
    }

    let mut refined = editor.close()?;
    refined.order();
    debug!(
        "Refined mesh with {} cells into {} cells",
        mesh.num_cells(),
        refined.num_cells()
    );
    Ok(refined)
}
