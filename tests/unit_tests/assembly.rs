use fem_assembly::assembler::{Assembler, AssemblyDomains};
use fem_assembly::dofmap::{DofLayout, DofMapCache, DofMapSet};
use fem_assembly::error::{AssemblyError, ConfigurationError, StateError};
use fem_assembly::form::{CellGeometry, CellIntegral, Form};
use fem_assembly::mesh::procedural::{
    create_interval_mesh, create_unit_cube_tet_mesh_3d, create_unit_interval_mesh, create_unit_square_tri_mesh_2d,
};
use fem_assembly::mesh::{CellType, Mesh2d, MeshMarkers};
use fem_assembly::nalgebra::{DMatrix, DVector, Point2, U2};
use fem_assembly::nalgebra_sparse::SparseEntry;
use fem_assembly::proptest::unit_square_mesh_with_cell_markers_strategy;
use fem_assembly::sparsity;
use fem_assembly::tensor::{
    csr_to_dense, DenseMatrix, GlobalTensor, Scalar, SparseMatrix, TensorLayout, Vector,
};
use fem_kernels::layouts::{dg1, p1};
use fem_kernels::{
    BoundaryMeasure, InteriorPenaltyForm, LoadForm, MassForm, StiffnessForm, SubdomainIndicator, VolumeFunctional,
};
use matrixcompare::{assert_matrix_eq, assert_scalar_eq};
use proptest::prelude::*;

fn assemble_scalar<F: ?Sized + Form<f64, U2>>(
    form: &F,
    mesh: &Mesh2d<f64>,
    domains: AssemblyDomains,
) -> Result<f64, AssemblyError> {
    let cache = DofMapCache::new();
    let mut scalar = Scalar::new();
    Assembler::new(&cache).assemble(&mut scalar, form, mesh, &[], domains)?;
    scalar.value()
}

#[test]
fn volume_of_generated_meshes() {
    let cache = DofMapCache::new();
    let assembler = Assembler::new(&cache);

    let square = create_unit_square_tri_mesh_2d::<f64>(3, 2);
    let area = assemble_scalar(&VolumeFunctional, &square, AssemblyDomains::new()).unwrap();
    assert_scalar_eq!(area, 1.0, comp = abs, tol = 1e-12);

    let cube = create_unit_cube_tet_mesh_3d::<f64>(2);
    let mut volume = Scalar::new();
    assembler
        .assemble(&mut volume, &VolumeFunctional, &cube, &[], AssemblyDomains::new())
        .unwrap();
    assert_scalar_eq!(volume.value().unwrap(), 1.0, comp = abs, tol = 1e-12);
}

#[test]
fn boundary_measure() {
    let cache = DofMapCache::new();
    let assembler = Assembler::new(&cache);

    let square = create_unit_square_tri_mesh_2d::<f64>(2, 3);
    let length = assemble_scalar(&BoundaryMeasure, &square, AssemblyDomains::new()).unwrap();
    assert_scalar_eq!(length, 4.0, comp = abs, tol = 1e-12);

    let interval = create_unit_interval_mesh::<f64>(4);
    let mut points = Scalar::new();
    assembler
        .assemble(&mut points, &BoundaryMeasure, &interval, &[], AssemblyDomains::new())
        .unwrap();
    assert_eq!(points.value().unwrap(), 2.0);

    let cube = create_unit_cube_tet_mesh_3d::<f64>(2);
    let mut area = Scalar::new();
    assembler
        .assemble(&mut area, &BoundaryMeasure, &cube, &[], AssemblyDomains::new())
        .unwrap();
    assert_scalar_eq!(area.value().unwrap(), 6.0, comp = abs, tol = 1e-12);
}

#[test]
fn mass_matrix_on_unit_square() {
    let mesh = create_unit_square_tri_mesh_2d::<f64>(1, 1);
    let cache = DofMapCache::new();
    let mut mass = SparseMatrix::new();
    Assembler::new(&cache)
        .assemble(&mut mass, &MassForm::new(CellType::Triangle), &mesh, &[], AssemblyDomains::new())
        .unwrap();

    let csr = mass.csr().unwrap();
    assert_eq!(csr.nnz(), 14);
    #[rustfmt::skip]
    let expected = DMatrix::from_row_slice(4, 4, &[
        4.0, 1.0, 1.0, 2.0,
        1.0, 2.0, 0.0, 1.0,
        1.0, 0.0, 2.0, 1.0,
        2.0, 1.0, 1.0, 4.0,
    ]) / 24.0;
    assert_matrix_eq!(csr_to_dense(csr), expected, comp = abs, tol = 1e-14);
    // The entries of the mass matrix sum to the area
    assert_scalar_eq!(csr.values().iter().sum::<f64>(), 1.0, comp = abs, tol = 1e-14);
}

#[test]
fn stiffness_matrix_on_unit_square() {
    let mesh = create_unit_square_tri_mesh_2d::<f64>(1, 1);
    let cache = DofMapCache::new();
    let mut stiffness = SparseMatrix::new();
    Assembler::new(&cache)
        .assemble(
            &mut stiffness,
            &StiffnessForm::new(CellType::Triangle),
            &mesh,
            &[],
            AssemblyDomains::new(),
        )
        .unwrap();

    let csr = stiffness.csr().unwrap();
    #[rustfmt::skip]
    let expected = DMatrix::from_row_slice(4, 4, &[
         1.0, -0.5, -0.5,  0.0,
        -0.5,  1.0,  0.0, -0.5,
        -0.5,  0.0,  1.0, -0.5,
         0.0, -0.5, -0.5,  1.0,
    ]);
    assert_matrix_eq!(csr_to_dense(csr), expected, comp = abs, tol = 1e-14);

    // Vertices 0 and 3 share an edge, so the entry is stored even though it vanishes
    assert!(matches!(csr.get_entry(0, 3), Some(SparseEntry::NonZero(_))));
    assert!(matches!(csr.get_entry(1, 2), Some(SparseEntry::Zero)));
}

#[test]
fn dense_and_sparse_assembly_agree() {
    let mesh = create_unit_square_tri_mesh_2d::<f64>(3, 3);
    let cache = DofMapCache::new();
    let assembler = Assembler::new(&cache);
    let form = StiffnessForm::new(CellType::Triangle);

    let mut sparse = SparseMatrix::new();
    let mut dense = DenseMatrix::new();
    assembler
        .assemble(&mut sparse, &form, &mesh, &[], AssemblyDomains::new())
        .unwrap();
    assembler
        .assemble(&mut dense, &form, &mesh, &[], AssemblyDomains::new())
        .unwrap();
    assert_matrix_eq!(
        csr_to_dense(sparse.csr().unwrap()),
        dense.into_matrix().unwrap(),
        comp = abs,
        tol = 1e-14
    );
}

#[test]
fn load_vector_of_constant() {
    let mesh = create_unit_square_tri_mesh_2d::<f64>(1, 1);
    let cache = DofMapCache::new();
    let f = DVector::repeat(4, 1.0);
    let mut b = Vector::new();
    Assembler::new(&cache)
        .assemble(&mut b, &LoadForm::new(CellType::Triangle), &mesh, &[&f], AssemblyDomains::new())
        .unwrap();
    let expected = DVector::from_vec(vec![1.0 / 3.0, 1.0 / 6.0, 1.0 / 6.0, 1.0 / 3.0]);
    assert_matrix_eq!(b.into_vector().unwrap(), expected, comp = abs, tol = 1e-14);
}

#[test]
fn load_vector_is_mass_matrix_times_coefficient() {
    let mesh = create_unit_square_tri_mesh_2d::<f64>(3, 2);
    let cache = DofMapCache::new();
    let assembler = Assembler::new(&cache);
    let f = DVector::from_fn(mesh.num_vertices(), |i, _| (i as f64).sin());

    let mut mass = SparseMatrix::new();
    assembler
        .assemble(&mut mass, &MassForm::new(CellType::Triangle), &mesh, &[], AssemblyDomains::new())
        .unwrap();
    let mut b = Vector::new();
    assembler
        .assemble(&mut b, &LoadForm::new(CellType::Triangle), &mesh, &[&f], AssemblyDomains::new())
        .unwrap();

    let expected = csr_to_dense(mass.csr().unwrap()) * &f;
    assert_matrix_eq!(b.vector().unwrap().clone(), expected, comp = abs, tol = 1e-12);
    // Both forms share the P1 dof map
    assert_eq!(cache.len(), 1);
}

#[test]
fn cell_markers_select_integrals() {
    let mesh = create_unit_square_tri_mesh_2d::<f64>(2, 2);
    let markers = MeshMarkers::from_fn(&mesh, 2, |p| usize::from(p.x > 0.5)).unwrap();
    let domains = AssemblyDomains::new().with_cells(&markers);

    let left = assemble_scalar(&SubdomainIndicator::<f64>::single(0), &mesh, domains).unwrap();
    let right = assemble_scalar(&SubdomainIndicator::<f64>::single(1), &mesh, domains).unwrap();
    assert_scalar_eq!(left, 0.5, comp = abs, tol = 1e-12);
    assert_scalar_eq!(right, 0.5, comp = abs, tol = 1e-12);

    let weighted = SubdomainIndicator::new([Some(1.0), Some(3.0)]);
    assert_scalar_eq!(assemble_scalar(&weighted, &mesh, domains).unwrap(), 2.0, comp = abs, tol = 1e-12);

    // Without markers, integral 0 is used everywhere
    let unrestricted = assemble_scalar(&weighted, &mesh, AssemblyDomains::new()).unwrap();
    assert_scalar_eq!(unrestricted, 1.0, comp = abs, tol = 1e-12);
}

#[test]
fn markers_without_integral_are_skipped() {
    let mesh = create_unit_square_tri_mesh_2d::<f64>(2, 2);
    let markers = MeshMarkers::constant(&mesh, 2, 5).unwrap();
    let domains = AssemblyDomains::new().with_cells(&markers);
    assert_eq!(assemble_scalar(&VolumeFunctional, &mesh, domains).unwrap(), 0.0);

    // Integral 0 is declared but missing
    let markers = MeshMarkers::constant(&mesh, 2, 0).unwrap();
    let domains = AssemblyDomains::new().with_cells(&markers);
    let form = SubdomainIndicator::<f64>::single(1);
    assert_eq!(assemble_scalar(&form, &mesh, domains).unwrap(), 0.0);
}

#[test]
fn exterior_facet_markers() {
    let mesh = create_unit_square_tri_mesh_2d::<f64>(2, 2);
    let mut markers = MeshMarkers::constant(&mesh, 1, 1).unwrap();
    markers.mark(&mesh, 0, |p| p.y.abs() < 1e-12).unwrap();
    let domains = AssemblyDomains::new().with_exterior_facets(&markers);
    let bottom = assemble_scalar(&BoundaryMeasure, &mesh, domains).unwrap();
    assert_scalar_eq!(bottom, 1.0, comp = abs, tol = 1e-12);
}

#[test]
fn marker_dimension_mismatch() {
    let mesh = create_unit_square_tri_mesh_2d::<f64>(2, 2);
    let facet_markers = MeshMarkers::constant(&mesh, 1, 0).unwrap();
    let domains = AssemblyDomains::new().with_cells(&facet_markers);
    let err = assemble_scalar(&VolumeFunctional, &mesh, domains).unwrap_err();
    assert!(matches!(
        err,
        AssemblyError::Configuration(ConfigurationError::MarkerMismatch {
            expected_dim: 2,
            expected_len: 8,
            dim: 1,
            len: 16
        })
    ));

    let short = MeshMarkers::new(1, vec![0; 3]);
    let domains = AssemblyDomains::new().with_exterior_facets(&short);
    assert!(assemble_scalar(&BoundaryMeasure, &mesh, domains).is_err());
}

#[test]
fn reassembly_without_reset_keeps_pattern() {
    let mesh = create_unit_square_tri_mesh_2d::<f64>(2, 2);
    let cache = DofMapCache::new();
    let mut matrix = SparseMatrix::new();
    Assembler::new(&cache)
        .assemble(&mut matrix, &MassForm::new(CellType::Triangle), &mesh, &[], AssemblyDomains::new())
        .unwrap();
    let pattern = matrix.pattern().unwrap().clone();

    let reassembling = Assembler::new(&cache).with_reset_tensor(false);
    assert!(!reassembling.reset_tensor());
    assert!(!reassembling.add_values());
    reassembling
        .assemble(&mut matrix, &StiffnessForm::new(CellType::Triangle), &mesh, &[], AssemblyDomains::new())
        .unwrap();

    let mut stiffness = SparseMatrix::new();
    Assembler::new(&cache)
        .assemble(&mut stiffness, &StiffnessForm::new(CellType::Triangle), &mesh, &[], AssemblyDomains::new())
        .unwrap();
    // The mass matrix values are gone, the pattern is the one from the first assembly
    assert_eq!(matrix.pattern().unwrap(), &pattern);
    assert_matrix_eq!(
        csr_to_dense(matrix.csr().unwrap()),
        csr_to_dense(stiffness.csr().unwrap()),
        comp = abs,
        tol = 1e-14
    );
}

#[test]
fn values_are_added_on_request() {
    let mesh = create_unit_square_tri_mesh_2d::<f64>(2, 2);
    let cache = DofMapCache::new();
    let form = MassForm::new(CellType::Triangle);
    let mut matrix = SparseMatrix::new();
    Assembler::new(&cache)
        .assemble(&mut matrix, &form, &mesh, &[], AssemblyDomains::new())
        .unwrap();
    let once = csr_to_dense(matrix.csr().unwrap());

    for adding in [
        Assembler::new(&cache).with_add_values(true),
        Assembler::new(&cache).with_reset_tensor(false).with_add_values(true),
    ] {
        assert!(adding.add_values());
        let mut twice = matrix.clone();
        adding
            .assemble(&mut twice, &form, &mesh, &[], AssemblyDomains::new())
            .unwrap();
        assert_matrix_eq!(csr_to_dense(twice.csr().unwrap()), &once * 2.0, comp = abs, tol = 1e-14);
    }

    // Adding into a fresh tensor initializes it when reset is enabled
    let mut fresh = SparseMatrix::new();
    Assembler::new(&cache)
        .with_add_values(true)
        .assemble(&mut fresh, &form, &mesh, &[], AssemblyDomains::new())
        .unwrap();
    assert_matrix_eq!(csr_to_dense(fresh.csr().unwrap()), once, comp = abs, tol = 1e-14);

    // Resetting starts over
    Assembler::new(&cache)
        .assemble(&mut matrix, &form, &mesh, &[], AssemblyDomains::new())
        .unwrap();
    assert_matrix_eq!(csr_to_dense(matrix.csr().unwrap()), once, comp = abs, tol = 1e-14);
}

#[test]
fn tensor_dimensions_are_checked_without_reset() {
    let mesh = create_unit_square_tri_mesh_2d::<f64>(2, 2);
    let cache = DofMapCache::new();
    let load = LoadForm::new(CellType::Triangle);
    let f = DVector::zeros(9);

    for assembler in [
        Assembler::new(&cache).with_reset_tensor(false),
        Assembler::new(&cache).with_reset_tensor(false).with_add_values(true),
        Assembler::new(&cache).with_add_values(true),
    ] {
        let mut b = Vector::new();
        b.init(TensorLayout::Dense(vec![100])).unwrap();
        let err = assembler
            .assemble(&mut b, &load, &mesh, &[&f], AssemblyDomains::new())
            .unwrap_err();
        assert!(matches!(err, AssemblyError::State(StateError::IncompatibleLayout(_))));
        // The tensor was rejected before it was touched
        assert_eq!(b.dims(), vec![100]);
        assert!(b.vector().is_err());
    }

    // A sparse matrix built for a coarser mesh
    let coarse = create_unit_square_tri_mesh_2d::<f64>(1, 1);
    let mut matrix = SparseMatrix::new();
    Assembler::new(&cache)
        .assemble(&mut matrix, &MassForm::new(CellType::Triangle), &coarse, &[], AssemblyDomains::new())
        .unwrap();
    let err = Assembler::new(&cache)
        .with_reset_tensor(false)
        .assemble(&mut matrix, &MassForm::new(CellType::Triangle), &mesh, &[], AssemblyDomains::new())
        .unwrap_err();
    assert!(matches!(err, AssemblyError::State(StateError::IncompatibleLayout(_))));

    // Matching dimensions pass the check
    let mut b = Vector::new();
    b.init(TensorLayout::Dense(vec![9])).unwrap();
    Assembler::new(&cache)
        .with_reset_tensor(false)
        .assemble(&mut b, &load, &mesh, &[&f], AssemblyDomains::new())
        .unwrap();
}

#[test]
fn accumulate_requires_initialized_tensor() {
    let mesh = create_unit_square_tri_mesh_2d::<f64>(1, 1);
    let cache = DofMapCache::new();
    let mut matrix = SparseMatrix::new();
    let err = Assembler::new(&cache)
        .with_reset_tensor(false)
        .assemble(&mut matrix, &MassForm::new(CellType::Triangle), &mesh, &[], AssemblyDomains::new())
        .unwrap_err();
    assert!(matches!(err, AssemblyError::State(StateError::Uninitialized)));
}

#[test]
fn interior_penalty_annihilates_constants() {
    let mesh = create_unit_square_tri_mesh_2d::<f64>(1, 1);
    let cache = DofMapCache::new();
    let gamma = 10.0;
    let mut matrix = SparseMatrix::new();
    Assembler::new(&cache)
        .assemble(
            &mut matrix,
            &InteriorPenaltyForm::new(CellType::Triangle, gamma),
            &mesh,
            &[],
            AssemblyDomains::new(),
        )
        .unwrap();

    let csr = matrix.csr().unwrap();
    // Cell blocks plus the blocks between the two cells
    assert_eq!(csr.nnz(), 36);
    let a = csr_to_dense(csr);
    let ones = DVector::repeat(6, 1.0);
    assert_matrix_eq!(&a * &ones, DVector::zeros(6), comp = abs, tol = 1e-12);

    // A function that is one on the first cell and zero on the second jumps by one across the
    // diagonal of length sqrt(2)
    let u = DVector::from_vec(vec![1.0, 1.0, 1.0, 0.0, 0.0, 0.0]);
    assert_scalar_eq!(u.dot(&(&a * &u)), gamma * f64::sqrt(2.0), comp = abs, tol = 1e-12);
}

#[test]
fn interior_facet_markers_select_facets() {
    let mesh = create_interval_mesh::<f64>(0.0, 1.0, 4);
    let cache = DofMapCache::new();
    let gamma = 3.0;
    let form = InteriorPenaltyForm::new(CellType::Interval, gamma);
    let dof_map = cache.get_or_create(&dg1(CellType::Interval), &mesh).unwrap();

    // Piecewise constant with a unit jump at every interior vertex
    let mut u = DVector::zeros(dof_map.global_dimension());
    for cell in 0..mesh.num_cells() {
        for &dof in dof_map.tabulate_dofs(cell).unwrap() {
            u[dof] = cell as f64;
        }
    }

    let assemble = |domains: AssemblyDomains| {
        let mut matrix = SparseMatrix::new();
        Assembler::new(&cache)
            .assemble(&mut matrix, &form, &mesh, &[], domains)
            .unwrap();
        csr_to_dense(matrix.csr().unwrap())
    };

    // The interior facets at 0.25 and 0.5 keep integral 0, the one at 0.75 is marked out
    let markers = MeshMarkers::from_fn(&mesh, 0, |p| usize::from(p.x > 0.6)).unwrap();
    let complement = MeshMarkers::new(0, markers.values().iter().map(|&m| 1 - m).collect());
    let full = assemble(AssemblyDomains::new());
    let left = assemble(AssemblyDomains::new().with_interior_facets(&markers));
    let right = assemble(AssemblyDomains::new().with_interior_facets(&complement));

    assert_scalar_eq!(u.dot(&(&full * &u)), 3.0 * gamma, comp = abs, tol = 1e-12);
    assert_scalar_eq!(u.dot(&(&left * &u)), 2.0 * gamma, comp = abs, tol = 1e-12);
    assert_scalar_eq!(u.dot(&(&right * &u)), gamma, comp = abs, tol = 1e-12);
    assert_matrix_eq!(&left + &right, full, comp = abs, tol = 1e-14);

    // Markers on every facet except x = 0.5 remove the middle jump in two dimensions
    let square = create_unit_square_tri_mesh_2d::<f64>(2, 2);
    let markers = MeshMarkers::from_fn(&square, 1, |p| usize::from((p.x - 0.5).abs() > 1e-12)).unwrap();
    let dof_map = cache.get_or_create(&dg1(CellType::Triangle), &square).unwrap();
    let mut step = DVector::zeros(dof_map.global_dimension());
    for cell in 0..square.num_cells() {
        let midpoint = square.entity_midpoint(2, cell).unwrap();
        for &dof in dof_map.tabulate_dofs(cell).unwrap() {
            step[dof] = if midpoint.x > 0.5 { 1.0 } else { 0.0 };
        }
    }
    let triangle_form = InteriorPenaltyForm::new(CellType::Triangle, gamma);
    let mut matrix = SparseMatrix::new();
    let mut complement_matrix = SparseMatrix::new();
    let complement = MeshMarkers::new(1, markers.values().iter().map(|&m| 1 - m).collect());
    Assembler::new(&cache)
        .assemble(&mut matrix, &triangle_form, &square, &[], AssemblyDomains::new().with_interior_facets(&markers))
        .unwrap();
    Assembler::new(&cache)
        .assemble(
            &mut complement_matrix,
            &triangle_form,
            &square,
            &[],
            AssemblyDomains::new().with_interior_facets(&complement),
        )
        .unwrap();
    // The jump of the step is one along the unit length of x = 0.5
    let marked = csr_to_dense(matrix.csr().unwrap());
    let unmarked = csr_to_dense(complement_matrix.csr().unwrap());
    assert_scalar_eq!(step.dot(&(&marked * &step)), gamma, comp = abs, tol = 1e-12);
    assert_scalar_eq!(step.dot(&(&unmarked * &step)), 0.0, comp = abs, tol = 1e-12);
}

#[test]
fn interior_facet_pattern_lacks_cell_blocks() {
    let mesh = create_unit_square_tri_mesh_2d::<f64>(1, 1);
    let cache = DofMapCache::new();
    let dof_map = cache.get_or_create(&dg1(CellType::Triangle), &mesh).unwrap();
    let dof_maps = DofMapSet::new(2, vec![dof_map.clone(), dof_map]).unwrap();

    let mut matrix = SparseMatrix::new();
    matrix.init(sparsity::build(&mesh, &dof_maps, false, true).unwrap()).unwrap();
    let err = Assembler::new(&cache)
        .with_add_values(true)
        .assemble(
            &mut matrix,
            &InteriorPenaltyForm::new(CellType::Triangle, 1.0),
            &mesh,
            &[],
            AssemblyDomains::new(),
        )
        .unwrap_err();
    assert!(matches!(err, AssemblyError::State(StateError::EntryOutsidePattern { .. })));
}

#[test]
fn cell_values() {
    let mesh = create_unit_square_tri_mesh_2d::<f64>(2, 2);
    let cache = DofMapCache::new();
    let assembler = Assembler::new(&cache);
    let values = assembler.assemble_cell_values(&VolumeFunctional, &mesh, &[]).unwrap();
    assert_eq!(values.len(), 8);
    assert!(values.iter().all(|&v| (v - 0.125).abs() < 1e-14));

    let err = assembler
        .assemble_cell_values(&MassForm::new(CellType::Triangle), &mesh, &[])
        .unwrap_err();
    assert!(matches!(
        err,
        AssemblyError::Configuration(ConfigurationError::TensorRankMismatch { form_rank: 2, .. })
    ));
}

#[test]
fn assembly_through_trait_objects() {
    let mesh = create_unit_square_tri_mesh_2d::<f64>(2, 2);
    let cache = DofMapCache::new();
    let forms: Vec<Box<dyn Form<f64, U2>>> = vec![Box::new(VolumeFunctional), Box::new(BoundaryMeasure)];
    let mut results = Vec::new();
    for form in &forms {
        let mut tensor: Box<dyn GlobalTensor<f64>> = Box::new(Scalar::new());
        Assembler::new(&cache)
            .assemble(tensor.as_mut(), form.as_ref(), &mesh, &[], AssemblyDomains::new())
            .unwrap();
        results.push(tensor.get(&[]).unwrap());
    }
    assert_scalar_eq!(results[0], 1.0, comp = abs, tol = 1e-12);
    assert_scalar_eq!(results[1], 4.0, comp = abs, tol = 1e-12);
}

#[test]
fn input_validation() {
    let mesh = create_unit_square_tri_mesh_2d::<f64>(1, 1);
    let cache = DofMapCache::new();
    let assembler = Assembler::new(&cache);
    let load = LoadForm::new(CellType::Triangle);

    let mut b = Vector::new();
    let err = assembler
        .assemble(&mut b, &load, &mesh, &[], AssemblyDomains::new())
        .unwrap_err();
    assert!(matches!(
        err,
        AssemblyError::Configuration(ConfigurationError::CoefficientCountMismatch { expected: 1, actual: 0 })
    ));

    let f = DVector::zeros(3);
    let err = assembler
        .assemble(&mut b, &load, &mesh, &[&f], AssemblyDomains::new())
        .unwrap_err();
    assert!(matches!(
        err,
        AssemblyError::Configuration(ConfigurationError::CoefficientSizeMismatch {
            coefficient: 0,
            expected: 4,
            actual: 3
        })
    ));

    let mut scalar = Scalar::new();
    let err = assembler
        .assemble(&mut scalar, &MassForm::new(CellType::Triangle), &mesh, &[], AssemblyDomains::new())
        .unwrap_err();
    assert!(matches!(
        err,
        AssemblyError::Configuration(ConfigurationError::TensorRankMismatch {
            form_rank: 2,
            tensor_rank: 0
        })
    ));

    let mut b3 = Vector::new();
    let f = DVector::zeros(4);
    let err = assembler
        .assemble(&mut b3, &LoadForm::new(CellType::Tetrahedron), &mesh, &[&f], AssemblyDomains::new())
        .unwrap_err();
    assert!(matches!(
        err,
        AssemblyError::Configuration(ConfigurationError::CellTypeMismatch { .. })
    ));
    // The failed assemblies left the tensors untouched
    assert!(b.vector().is_err());
}

#[test]
fn unordered_mesh_is_rejected() {
    let vertices = vec![
        Point2::new(0.0, 0.0),
        Point2::new(1.0, 0.0),
        Point2::new(0.0, 1.0),
        Point2::new(1.0, 1.0),
    ];
    let mut mesh = Mesh2d::from_vertices_and_cells(vertices, CellType::Triangle, vec![0, 1, 3, 3, 2, 0]).unwrap();
    let err = assemble_scalar(&VolumeFunctional, &mesh, AssemblyDomains::new()).unwrap_err();
    assert!(matches!(
        err,
        AssemblyError::Configuration(ConfigurationError::UnorderedMesh)
    ));

    mesh.order();
    assert_scalar_eq!(
        assemble_scalar(&VolumeFunctional, &mesh, AssemblyDomains::new()).unwrap(),
        1.0,
        comp = abs,
        tol = 1e-14
    );
}

#[test]
fn foreign_dof_maps_are_rejected() {
    let mesh = create_unit_square_tri_mesh_2d::<f64>(1, 1);
    let other = create_unit_square_tri_mesh_2d::<f64>(1, 1);
    let cache = DofMapCache::new();
    let form = MassForm::new(CellType::Triangle);
    let dof_maps = DofMapSet::from_form(&form, &other, &cache).unwrap();

    let mut matrix = SparseMatrix::new();
    let err = Assembler::new(&cache)
        .assemble_with_dof_maps(&mut matrix, &form, &mesh, &dof_maps, &[], AssemblyDomains::new())
        .unwrap_err();
    assert!(matches!(err, AssemblyError::Configuration(ConfigurationError::ForeignDofMap)));

    let own = DofMapSet::from_form(&form, &mesh, &cache).unwrap();
    Assembler::new(&cache)
        .assemble_with_dof_maps(&mut matrix, &form, &mesh, &own, &[], AssemblyDomains::new())
        .unwrap();
    assert_eq!(matrix.nnz(), 14);
}

/// A linear form without integrals.
struct EmptyForm;

impl Form<f64, U2> for EmptyForm {
    fn rank(&self) -> usize {
        1
    }

    fn num_coefficients(&self) -> usize {
        0
    }

    fn argument_layout(&self, index: usize) -> Option<DofLayout> {
        (index == 0).then(|| p1(CellType::Triangle))
    }
}

/// A trilinear form, which cannot be assembled.
struct TrilinearForm;

impl Form<f64, U2> for TrilinearForm {
    fn rank(&self) -> usize {
        3
    }

    fn num_coefficients(&self) -> usize {
        0
    }

    fn argument_layout(&self, index: usize) -> Option<DofLayout> {
        (index < 3).then(|| p1(CellType::Triangle))
    }
}

/// A functional whose kernel rejects cells reaching beyond `x = 0.75`.
struct FailingFunctional;

impl CellIntegral<f64, U2> for FailingFunctional {
    fn tabulate_tensor(&self, a: &mut [f64], _w: &[Vec<f64>], cell: &CellGeometry<f64, U2>) -> eyre::Result<()> {
        if cell.coordinates().iter().any(|p| p.x > 0.75) {
            eyre::bail!("cell {} is outside the supported region", cell.index());
        }
        a[0] = cell.volume();
        Ok(())
    }
}

impl Form<f64, U2> for FailingFunctional {
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

    fn cell_integral(&self, subdomain: usize) -> Option<&dyn CellIntegral<f64, U2>> {
        (subdomain == 0).then_some(self as &dyn CellIntegral<f64, U2>)
    }
}

#[test]
fn form_without_integrals_assembles_to_zero() {
    let mesh = create_unit_square_tri_mesh_2d::<f64>(1, 1);
    let cache = DofMapCache::new();
    let mut b = Vector::new();
    Assembler::new(&cache)
        .assemble(&mut b, &EmptyForm, &mesh, &[], AssemblyDomains::new())
        .unwrap();
    assert_eq!(b.into_vector().unwrap(), DVector::zeros(4));
}

#[test]
fn rank_three_is_unsupported() {
    let mesh = create_unit_square_tri_mesh_2d::<f64>(1, 1);
    let err = assemble_scalar(&TrilinearForm, &mesh, AssemblyDomains::new()).unwrap_err();
    assert!(matches!(
        err,
        AssemblyError::Configuration(ConfigurationError::UnsupportedRank(3))
    ));
}

#[test]
fn kernel_errors_abort_assembly() {
    let mesh = create_unit_square_tri_mesh_2d::<f64>(2, 2);
    let err = assemble_scalar(&FailingFunctional, &mesh, AssemblyDomains::new()).unwrap_err();
    let AssemblyError::Kernel(report) = err else {
        panic!("expected kernel error");
    };
    assert!(report.to_string().contains("outside the supported region"));

    // Restricted to the cells the kernel accepts, assembly succeeds
    let markers = MeshMarkers::from_fn(&mesh, 2, |p| usize::from(p.x > 0.5)).unwrap();
    let domains = AssemblyDomains::new().with_cells(&markers);
    let area = assemble_scalar(&FailingFunctional, &mesh, domains).unwrap();
    assert_scalar_eq!(area, 0.5, comp = abs, tol = 1e-12);
}

proptest! {
    #[test]
    fn subdomain_integrals_add_up_to_total(
        (mesh, markers) in unit_square_mesh_with_cell_markers_strategy(4, 3)
    ) {
        let domains = AssemblyDomains::new().with_cells(&markers);
        let parts: Vec<f64> = (0..3)
            .map(|i| assemble_scalar(&SubdomainIndicator::<f64>::single(i), &mesh, domains).unwrap())
            .collect();
        let total: f64 = parts.iter().sum();
        prop_assert!((total - 1.0).abs() < 1e-12);

        let weighted = SubdomainIndicator::new([Some(1.0), Some(2.0), Some(4.0)]);
        let weighted_total = assemble_scalar(&weighted, &mesh, domains).unwrap();
        let expected = parts[0] + 2.0 * parts[1] + 4.0 * parts[2];
        prop_assert!((weighted_total - expected).abs() < 1e-12);
    }
}

proptest! {
    #[test]
    fn matrices_and_vectors_add_up_over_split_cells(
        (mesh, markers) in unit_square_mesh_with_cell_markers_strategy(4, 2)
    ) {
        let cache = DofMapCache::new();
        let assembler = Assembler::new(&cache);
        let complement = MeshMarkers::new(2, markers.values().iter().map(|&m| 1 - m).collect());
        let mass = MassForm::new(CellType::Triangle);

        let assemble_matrix = |domains: AssemblyDomains| {
            let mut matrix = SparseMatrix::new();
            assembler.assemble(&mut matrix, &mass, &mesh, &[], domains).unwrap();
            csr_to_dense(matrix.csr().unwrap())
        };
        let full = assemble_matrix(AssemblyDomains::new());
        let first = assemble_matrix(AssemblyDomains::new().with_cells(&markers));
        let second = assemble_matrix(AssemblyDomains::new().with_cells(&complement));
        let sum = &first + &second;
        prop_assert!((sum - &full).abs().max() < 1e-12);

        let load = LoadForm::new(CellType::Triangle);
        let f = DVector::from_fn(mesh.num_vertices(), |i, _| 1.0 + i as f64);
        let assemble_vector = |domains: AssemblyDomains| {
            let mut b = Vector::new();
            assembler.assemble(&mut b, &load, &mesh, &[&f], domains).unwrap();
            b.into_vector().unwrap()
        };
        let full = assemble_vector(AssemblyDomains::new());
        let sum = assemble_vector(AssemblyDomains::new().with_cells(&markers))
            + assemble_vector(AssemblyDomains::new().with_cells(&complement));
        prop_assert!((sum - &full).abs().max() < 1e-12);
    }
}
