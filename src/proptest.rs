//! Proptest strategies for meshes and subdomain markers.
use crate::mesh::procedural::{create_unit_cube_tet_mesh_3d, create_unit_interval_mesh, create_unit_square_tri_mesh_2d};
use crate::mesh::{Mesh1d, Mesh2d, Mesh3d, MeshMarkers};
use ::proptest::collection::vec;
use ::proptest::prelude::*;
use nalgebra::Vector2;

pub fn unit_interval_mesh_strategy(max_cells: usize) -> impl Strategy<Value = Mesh1d<f64>> {
    (1..=max_cells.max(1)).prop_map(create_unit_interval_mesh::<f64>)
}

/// Unit square meshes with between 1 and `max_cells_per_dim` squares along each axis.
pub fn unit_square_mesh_strategy(max_cells_per_dim: usize) -> impl Strategy<Value = Mesh2d<f64>> {
    let cells = 1..=max_cells_per_dim.max(1);
    (cells.clone(), cells).prop_map(|(cells_x, cells_y)| create_unit_square_tri_mesh_2d(cells_x, cells_y))
}

pub fn unit_cube_mesh_strategy(max_cells_per_dim: usize) -> impl Strategy<Value = Mesh3d<f64>> {
    (1..=max_cells_per_dim.max(1)).prop_map(create_unit_cube_tet_mesh_3d::<f64>)
}

/// Unit square meshes whose interior vertices are moved randomly.
///
/// Each interior vertex moves by less than 15% of the grid spacing in each direction, which
/// keeps every triangle positively oriented.
pub fn perturbed_unit_square_mesh_strategy(max_cells_per_dim: usize) -> impl Strategy<Value = Mesh2d<f64>> {
    unit_square_mesh_strategy(max_cells_per_dim)
        .prop_flat_map(|mesh| {
            let n = mesh.num_vertices();
            (Just(mesh), vec([-0.15..0.15, -0.15..0.15], n))
        })
        .prop_map(|(mut mesh, offsets)| {
            let (cells_x, cells_y) = grid_size(&mesh);
            let h = Vector2::new(1.0 / cells_x as f64, 1.0 / cells_y as f64);
            for (vertex, [dx, dy]) in mesh.vertices_mut().iter_mut().zip(offsets) {
                let on_boundary = [vertex.x, vertex.y]
                    .iter()
                    .any(|&c| c.abs() < 1e-12 || (c - 1.0).abs() < 1e-12);
                if !on_boundary {
                    vertex.x += dx * h.x;
                    vertex.y += dy * h.y;
                }
            }
            mesh
        })
}

/// Recover the grid size of a generated unit square mesh from its vertex count and its first
/// row of vertices.
fn grid_size(mesh: &Mesh2d<f64>) -> (usize, usize) {
    let vertices_x = mesh
        .vertices()
        .iter()
        .take_while(|v| v.y.abs() < 1e-12)
        .count();
    let vertices_y = mesh.num_vertices() / vertices_x.max(1);
    (vertices_x.saturating_sub(1).max(1), vertices_y.saturating_sub(1).max(1))
}

/// Markers for `num_entities` entities of dimension `dim` with values in `0..num_values`.
pub fn markers_strategy(dim: usize, num_entities: usize, num_values: usize) -> impl Strategy<Value = MeshMarkers> {
    vec(0..num_values.max(1), num_entities).prop_map(move |values| MeshMarkers::new(dim, values))
}

/// A unit square mesh together with random cell markers in `0..num_values`.
pub fn unit_square_mesh_with_cell_markers_strategy(
    max_cells_per_dim: usize,
    num_values: usize,
) -> impl Strategy<Value = (Mesh2d<f64>, MeshMarkers)> {
    unit_square_mesh_strategy(max_cells_per_dim).prop_flat_map(move |mesh| {
        let markers = markers_strategy(2, mesh.num_cells(), num_values);
        (Just(mesh), markers)
    })
}
