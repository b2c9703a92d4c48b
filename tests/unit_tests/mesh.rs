use fem_assembly::error::{AssemblyError, ErrorCategory, TopologyError};
use fem_assembly::mesh::procedural::{
    create_box_tet_mesh_3d, create_interval_mesh, create_rectangular_tri_mesh_2d, create_unit_cube_tet_mesh_3d,
    create_unit_square_tri_mesh_2d,
};
use fem_assembly::mesh::{CellFacet, CellType, FacetNeighbors, Mesh2d, Mesh3d, MeshEditor, MeshMarkers};
use fem_assembly::nalgebra::{Point2, Point3};
use fem_assembly::proptest::unit_square_mesh_strategy;
use matrixcompare::assert_scalar_eq;
use proptest::prelude::*;

fn two_triangles() -> Mesh2d<f64> {
    let vertices = vec![
        Point2::new(0.0, 0.0),
        Point2::new(1.0, 0.0),
        Point2::new(0.0, 1.0),
        Point2::new(1.0, 1.0),
    ];
    Mesh2d::from_vertices_and_cells(vertices, CellType::Triangle, vec![0, 1, 3, 0, 2, 3]).unwrap()
}

#[test]
fn construct_mesh_from_vertices_and_cells() {
    let mesh = two_triangles();
    assert_eq!(mesh.num_vertices(), 4);
    assert_eq!(mesh.num_cells(), 2);
    assert_eq!(mesh.topological_dim(), 2);
    assert_eq!(mesh.geometric_dim(), 2);
    assert_eq!(mesh.cell_vertices(1).unwrap(), &[0, 2, 3]);
    assert_eq!(
        mesh.cell_coordinates(0).unwrap(),
        vec![Point2::new(0.0, 0.0), Point2::new(1.0, 0.0), Point2::new(1.0, 1.0)]
    );
    assert!(mesh.cell_vertices(2).is_err());
}

#[test]
fn invalid_meshes_are_rejected() {
    let vertices = vec![Point2::new(0.0, 0.0), Point2::new(1.0, 0.0), Point2::new(0.0, 1.0)];

    // Not a multiple of the cell size
    let err = Mesh2d::from_vertices_and_cells(vertices.clone(), CellType::Triangle, vec![0, 1]).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Topology);

    // Vertex out of bounds
    assert!(Mesh2d::from_vertices_and_cells(vertices.clone(), CellType::Triangle, vec![0, 1, 3]).is_err());

    // Tetrahedra cannot be embedded in 2D
    let vertices4 = vec![
        Point2::new(0.0, 0.0),
        Point2::new(1.0, 0.0),
        Point2::new(0.0, 1.0),
        Point2::new(1.0, 1.0),
    ];
    assert!(Mesh2d::from_vertices_and_cells(vertices4, CellType::Tetrahedron, vec![0, 1, 2, 3]).is_err());
}

#[test]
fn embedded_triangle_mesh() {
    let vertices = vec![Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 0.0, 0.0), Point3::new(0.0, 1.0, 1.0)];
    let mesh = Mesh3d::from_vertices_and_cells(vertices, CellType::Triangle, vec![0, 1, 2]).unwrap();
    assert_eq!(mesh.topological_dim(), 2);
    assert_eq!(mesh.geometric_dim(), 3);
    assert_scalar_eq!(mesh.total_volume().unwrap(), f64::sqrt(2.0) / 2.0, comp = abs, tol = 1e-14);
}

#[test]
fn mesh_ids_are_unique() {
    let a = two_triangles();
    let b = two_triangles();
    assert_ne!(a.id(), b.id());
    assert_eq!(a, b);
    assert_eq!(a.clone().id(), a.id());
}

#[test]
fn ordering() {
    let vertices = vec![
        Point2::new(0.0, 0.0),
        Point2::new(1.0, 0.0),
        Point2::new(0.0, 1.0),
        Point2::new(1.0, 1.0),
    ];
    let mut mesh = Mesh2d::from_vertices_and_cells(vertices, CellType::Triangle, vec![3, 1, 0, 0, 2, 3]).unwrap();
    assert!(!mesh.is_ordered());
    let id = mesh.id();

    mesh.order();
    assert!(mesh.is_ordered());
    assert_ne!(mesh.id(), id);
    assert_eq!(mesh.cell_vertices(0).unwrap(), &[0, 1, 3]);
    assert_eq!(mesh, two_triangles());
}

#[test]
fn generated_meshes_are_ordered() {
    assert!(create_interval_mesh(-1.0, 2.0, 5).is_ordered());
    assert!(create_unit_square_tri_mesh_2d::<f64>(3, 4).is_ordered());
    assert!(create_unit_cube_tet_mesh_3d::<f64>(2).is_ordered());
}

#[test]
fn generated_mesh_volumes() {
    let interval = create_interval_mesh(-1.0, 2.0, 5);
    assert_scalar_eq!(interval.total_volume().unwrap(), 3.0, comp = abs, tol = 1e-12);

    let rectangle = create_rectangular_tri_mesh_2d(&Point2::new(-1.0, 0.0), &Point2::new(1.0, 3.0), 4, 3);
    assert_eq!(rectangle.num_cells(), 24);
    assert_scalar_eq!(rectangle.total_volume().unwrap(), 6.0, comp = abs, tol = 1e-12);

    let cube = create_unit_cube_tet_mesh_3d::<f64>(3);
    assert_eq!(cube.num_cells(), 6 * 27);
    assert_scalar_eq!(cube.total_volume().unwrap(), 1.0, comp = abs, tol = 1e-12);

    let block = create_box_tet_mesh_3d(&Point3::new(0.0, 0.0, 0.0), &Point3::new(2.0, 1.0, 1.0), [2, 1, 3]);
    assert_eq!(block.num_vertices(), 3 * 2 * 4);
    assert_scalar_eq!(block.total_volume().unwrap(), 2.0, comp = abs, tol = 1e-12);
}

#[test]
fn facet_neighbors() {
    let mesh = two_triangles();
    // Edge 2 is the diagonal from vertex 0 to vertex 3, local edge 1 in both cells
    assert_eq!(
        mesh.facet_neighbors(2).unwrap(),
        FacetNeighbors::Interior(
            CellFacet {
                cell: 0,
                local_facet: 1
            },
            CellFacet {
                cell: 1,
                local_facet: 1
            }
        )
    );
    assert_eq!(
        mesh.facet_neighbors(0).unwrap(),
        FacetNeighbors::Exterior(CellFacet {
            cell: 0,
            local_facet: 2
        })
    );

    let exterior: Vec<_> = mesh.exterior_facets().unwrap().iter().map(|(f, _)| *f).collect();
    assert_eq!(exterior, [0, 1, 3, 4]);
    let interior = mesh.interior_facets().unwrap();
    assert_eq!(interior.len(), 1);
    assert_eq!(interior[0].0, 2);
}

#[test]
fn non_manifold_facet_is_an_error() {
    // Three triangles sharing the edge between vertices 0 and 1
    let vertices = vec![
        Point2::new(0.0, 0.0),
        Point2::new(1.0, 0.0),
        Point2::new(0.5, 1.0),
        Point2::new(0.5, -1.0),
        Point2::new(0.5, 2.0),
    ];
    let mesh =
        Mesh2d::from_vertices_and_cells(vertices, CellType::Triangle, vec![0, 1, 2, 0, 1, 3, 0, 1, 4]).unwrap();
    let err = mesh.facet_neighbors(0).unwrap_err();
    assert!(matches!(
        err,
        AssemblyError::Topology(TopologyError::NonManifoldFacet { facet: 0, num_cells: 3 })
    ));
    assert!(mesh.interior_facets().is_err());
}

#[test]
fn entity_midpoints() {
    let mesh = two_triangles();
    assert_eq!(mesh.entity_midpoint(1, 2).unwrap(), Point2::new(0.5, 0.5));
    let centroid = mesh.entity_midpoint(2, 0).unwrap();
    assert_scalar_eq!(centroid.x, 2.0 / 3.0, comp = abs, tol = 1e-14);
    assert_scalar_eq!(centroid.y, 1.0 / 3.0, comp = abs, tol = 1e-14);
}

#[test]
fn mesh_editor_builds_mesh() {
    let mut editor = MeshEditor::new(CellType::Triangle);
    editor.init_vertices(4);
    editor.init_cells(2);
    editor.add_vertex(0, Point2::new(0.0, 0.0)).unwrap();
    editor.add_vertex(1, Point2::new(1.0, 0.0)).unwrap();
    editor.add_vertex(2, Point2::new(0.0, 1.0)).unwrap();
    editor.add_vertex(3, Point2::new(1.0, 1.0)).unwrap();
    editor.add_cell(0, &[0, 1, 3]).unwrap();
    editor.add_cell(1, &[0, 2, 3]).unwrap();

    assert!(editor.add_vertex(4, Point2::new(2.0, 2.0)).is_err());
    assert!(editor.add_cell(2, &[0, 1, 2]).is_err());
    assert!(editor.add_cell(0, &[0, 1]).is_err());
    assert!(editor.add_cell(0, &[0, 1, 7]).is_err());

    let mesh = editor.close().unwrap();
    assert_eq!(mesh, two_triangles());
}

#[test]
fn mesh_editor_requires_all_entities() {
    let mut editor = MeshEditor::new(CellType::Interval);
    editor.init_vertices(2);
    editor.init_cells(1);
    editor.add_vertex(0, fem_assembly::nalgebra::Point1::new(0.0)).unwrap();
    editor.add_cell(0, &[0, 1]).unwrap();
    assert!(editor.close().is_err());
}

#[test]
fn markers_from_midpoints() {
    let mesh = create_unit_square_tri_mesh_2d::<f64>(2, 2);
    let markers = MeshMarkers::from_fn(&mesh, 2, |p| usize::from(p.x > 0.5)).unwrap();
    assert_eq!(markers.dim(), 2);
    assert_eq!(markers.len(), 8);
    assert_eq!(markers.values().iter().filter(|&&m| m == 1).count(), 4);

    let mut facet_markers = MeshMarkers::constant(&mesh, 1, 0).unwrap();
    assert_eq!(facet_markers.len(), mesh.num_facets().unwrap());
    facet_markers
        .mark(&mesh, 3, |p| p.y.abs() < 1e-12)
        .unwrap();
    assert_eq!(facet_markers.values().iter().filter(|&&m| m == 3).count(), 2);
    assert_eq!(facet_markers.value(1000), None);
}

#[test]
fn serialization_skips_computed_topology() {
    let mesh = create_unit_square_tri_mesh_2d::<f64>(2, 1);
    mesh.init().unwrap();
    let json = serde_json::to_string(&mesh).unwrap();
    let deserialized: Mesh2d<f64> = serde_json::from_str(&json).unwrap();
    assert_eq!(deserialized, mesh);
    assert_ne!(deserialized.id(), mesh.id());
    assert!(!deserialized.topology().is_computed(1, 0));
    assert_eq!(deserialized.num_facets().unwrap(), mesh.num_facets().unwrap());
}

proptest! {
    #[test]
    fn every_facet_is_exterior_or_interior(mesh in unit_square_mesh_strategy(5)) {
        let num_exterior = mesh.exterior_facets().unwrap().len();
        let num_interior = mesh.interior_facets().unwrap().len();
        prop_assert_eq!(num_exterior + num_interior, mesh.num_facets().unwrap());
        // Each cell has three facets, interior facets are counted twice
        prop_assert_eq!(num_exterior + 2 * num_interior, 3 * mesh.num_cells());
    }
}
