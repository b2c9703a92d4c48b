//! Basic procedural mesh generation routines.
//!
//! All generated meshes are ordered (see [`Mesh::is_ordered`]).
use crate::mesh::{CellType, Mesh1d, Mesh2d, Mesh3d};
use crate::Real;
use nalgebra::{convert, Point1, Point2, Point3};

fn lerp<T: Real>(a: T, b: T, i: usize, n: usize) -> T {
    let s: T = convert(i as f64 / n as f64);
    a + (b - a) * s
}

pub fn create_unit_interval_mesh<T: Real>(num_cells: usize) -> Mesh1d<T> {
    create_interval_mesh(T::zero(), T::one(), num_cells)
}

/// Uniform mesh of the interval `[a, b]`.
pub fn create_interval_mesh<T: Real>(a: T, b: T, num_cells: usize) -> Mesh1d<T> {
    if num_cells == 0 {
        return Mesh1d::from_valid_parts(Vec::new(), CellType::Interval, Vec::new());
    }
    let vertices = (0..=num_cells)
        .map(|i| Point1::new(lerp(a, b, i, num_cells)))
        .collect();
    let cells = (0..num_cells).flat_map(|i| [i, i + 1]).collect();
    Mesh1d::from_valid_parts(vertices, CellType::Interval, cells)
}

pub fn create_unit_square_tri_mesh_2d<T: Real>(cells_x: usize, cells_y: usize) -> Mesh2d<T> {
    create_rectangular_tri_mesh_2d(&Point2::origin(), &Point2::new(T::one(), T::one()), cells_x, cells_y)
}

/// Uniform triangle mesh of the axis-aligned rectangle spanned by `lower` and `upper`.
///
/// The rectangle is divided into `cells_x * cells_y` squares, each of which is split into two
/// triangles along the diagonal from its lower left to its upper right corner. Vertices are
/// numbered row by row, starting in the lower left corner.
pub fn create_rectangular_tri_mesh_2d<T: Real>(
    lower: &Point2<T>,
    upper: &Point2<T>,
    cells_x: usize,
    cells_y: usize,
) -> Mesh2d<T> {
    if cells_x == 0 || cells_y == 0 {
        return Mesh2d::from_valid_parts(Vec::new(), CellType::Triangle, Vec::new());
    }

    let mut vertices = Vec::with_capacity((cells_x + 1) * (cells_y + 1));
    for j in 0..=cells_y {
        for i in 0..=cells_x {
            let x = lerp(lower.x, upper.x, i, cells_x);
            let y = lerp(lower.y, upper.y, j, cells_y);
            vertices.push(Point2::new(x, y));
        }
    }

    let to_global_vertex_index = |i, j| (cells_x + 1) * j + i;
    let mut cells = Vec::with_capacity(6 * cells_x * cells_y);
    for j in 0..cells_y {
        for i in 0..cells_x {
            let v0 = to_global_vertex_index(i, j);
            let v1 = to_global_vertex_index(i + 1, j);
            let v2 = to_global_vertex_index(i, j + 1);
            let v3 = to_global_vertex_index(i + 1, j + 1);
            cells.extend_from_slice(&[v0, v1, v3, v0, v2, v3]);
        }
    }

    Mesh2d::from_valid_parts(vertices, CellType::Triangle, cells)
}

pub fn create_unit_cube_tet_mesh_3d<T: Real>(cells_per_dim: usize) -> Mesh3d<T> {
    let n = cells_per_dim;
    create_box_tet_mesh_3d(&Point3::origin(), &Point3::new(T::one(), T::one(), T::one()), [n, n, n])
}

/// Uniform tetrahedral mesh of the axis-aligned box spanned by `lower` and `upper`.
///
/// Each of the `cells[0] * cells[1] * cells[2]` hexahedra is split into the six tetrahedra that
/// share its diagonal from the lower to the upper corner. Since every hexahedron is split the
/// same way, the resulting mesh is conforming.
pub fn create_box_tet_mesh_3d<T: Real>(lower: &Point3<T>, upper: &Point3<T>, cells: [usize; 3]) -> Mesh3d<T> {
    let [nx, ny, nz] = cells;
    if nx == 0 || ny == 0 || nz == 0 {
        return Mesh3d::from_valid_parts(Vec::new(), CellType::Tetrahedron, Vec::new());
    }

    let mut vertices = Vec::with_capacity((nx + 1) * (ny + 1) * (nz + 1));
    for k in 0..=nz {
        for j in 0..=ny {
            for i in 0..=nx {
                let x = lerp(lower.x, upper.x, i, nx);
                let y = lerp(lower.y, upper.y, j, ny);
                let z = lerp(lower.z, upper.z, k, nz);
                vertices.push(Point3::new(x, y, z));
            }
        }
    }

    let to_global_vertex_index = |i: usize, j: usize, k: usize| (nx + 1) * (ny + 1) * k + (nx + 1) * j + i;
    // Each tetrahedron follows a path from the lower to the upper corner of the hexahedron,
    // stepping along the axes in one of the six possible orders. Vertex indices increase
    // along the path, so the cells are ordered
    const AXIS_ORDERS: [[usize; 3]; 6] = [[0, 1, 2], [0, 2, 1], [1, 0, 2], [1, 2, 0], [2, 0, 1], [2, 1, 0]];
    let mut connectivity = Vec::with_capacity(24 * nx * ny * nz);
    for k in 0..nz {
        for j in 0..ny {
            for i in 0..nx {
                for axes in &AXIS_ORDERS {
                    let mut corner = [i, j, k];
                    connectivity.push(to_global_vertex_index(corner[0], corner[1], corner[2]));
                    for &axis in axes {
                        corner[axis] += 1;
                        connectivity.push(to_global_vertex_index(corner[0], corner[1], corner[2]));
                    }
                }
            }
        }
    }

    Mesh3d::from_valid_parts(vertices, CellType::Tetrahedron, connectivity)
}
